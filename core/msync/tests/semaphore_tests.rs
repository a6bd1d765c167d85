//! Permit-style semaphore tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::channel;
use std::sync::{Arc, Once};
use std::time::Duration;

use msync::Semaphore;

static INIT: Once = Once::new();

fn run_kernel<F: FnOnce() + Send + 'static>(f: F) {
    INIT.call_once(mkern::init_scheduler);
    let (tx, rx) = channel();
    mkern::spawn("test-driver", mcfg::PRI_DEFAULT, move || {
        f();
        tx.send(()).unwrap();
    })
    .unwrap();
    rx.recv_timeout(Duration::from_secs(120))
        .expect("kernel test timed out");
}

#[test]
fn semaphore_basic() {
    run_kernel(|| {
        let sem = Semaphore::new(3);

        assert_eq!(sem.available_permits(), 3);

        let _g1 = sem.acquire_guard();
        assert_eq!(sem.available_permits(), 2);

        let _g2 = sem.acquire_guard();
        assert_eq!(sem.available_permits(), 1);

        let _g3 = sem.acquire_guard();
        assert_eq!(sem.available_permits(), 0);

        // All permits used
        assert!(!sem.try_acquire());

        drop(_g1);
        assert_eq!(sem.available_permits(), 1);

        // One permit released
        assert!(sem.try_acquire());
    });
}

#[test]
fn semaphore_acquire_release() {
    run_kernel(|| {
        let sem = Semaphore::new(2);

        sem.acquire();
        assert_eq!(sem.available_permits(), 1);

        sem.acquire();
        assert_eq!(sem.available_permits(), 0);

        sem.release();
        assert_eq!(sem.available_permits(), 1);

        sem.release();
        assert_eq!(sem.available_permits(), 2);
    });
}

#[test]
fn semaphore_concurrent() {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    static MAX_COUNTER: AtomicU32 = AtomicU32::new(0);
    run_kernel(|| {
        let sem = Arc::new(Semaphore::new(3));
        let mut handles = vec![];

        for _ in 0..10 {
            let sem = sem.clone();
            let handle = mkern::spawn("worker", mcfg::PRI_DEFAULT, move || {
                let _g = sem.acquire_guard();

                let count = COUNTER.fetch_add(1, Ordering::SeqCst) + 1;

                // Update max counter
                loop {
                    let max = MAX_COUNTER.load(Ordering::SeqCst);
                    if count <= max {
                        break;
                    }
                    if MAX_COUNTER
                        .compare_exchange(max, count, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                    {
                        break;
                    }
                }

                // Verify at most 3 concurrent holders
                assert!(count <= 3, "too many concurrent permits: {}", count);

                mkern::yield_now();

                COUNTER.fetch_sub(1, Ordering::SeqCst);
            })
            .unwrap();
            handles.push(handle);
        }

        for h in handles {
            h.join();
        }

        assert!(MAX_COUNTER.load(Ordering::SeqCst) <= 3);
        assert_eq!(COUNTER.load(Ordering::SeqCst), 0);
    });
}

#[test]
fn semaphore_guard_drop() {
    run_kernel(|| {
        let sem = Semaphore::new(1);

        {
            let _g = sem.acquire_guard();
            assert_eq!(sem.available_permits(), 0);
        }

        // Guard dropped, permit released
        assert_eq!(sem.available_permits(), 1);
    });
}
