//! Mutex tests, including the chaos-yield stress test.

use std::sync::mpsc::channel;
use std::sync::Once;
use std::time::Duration;

use msync::Mutex;

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

fn may_interrupt() {
    // simulate interrupts
    if fastrand::u8(0..3) == 0 {
        mkern::yield_now();
    }
}

#[test]
fn lots_and_lots() {
    const NUM_TASKS: u32 = 10;
    const NUM_ITERS: u32 = 1000;
    static M: Mutex<u32> = Mutex::new(0);

    fn inc(delta: u32) {
        for _ in 0..NUM_ITERS {
            let mut val = M.lock();
            *val += delta;
            may_interrupt();
            drop(val);
            may_interrupt();
        }
    }

    run_kernel(|| {
        let mut handles = Vec::new();
        for _ in 0..NUM_TASKS {
            handles.push(mkern::spawn("inc1", mcfg::PRI_DEFAULT, || inc(1)).unwrap());
            handles.push(mkern::spawn("inc2", mcfg::PRI_DEFAULT, || inc(2)).unwrap());
        }
        for h in handles {
            h.join();
        }
        assert_eq!(*M.lock(), NUM_ITERS * NUM_TASKS * 3);
    });
}

#[test]
fn guard_gives_mutable_access() {
    static M: Mutex<Vec<u8>> = Mutex::new(Vec::new());
    run_kernel(|| {
        {
            let mut data = M.lock();
            data.push(1);
            data.push(2);
        }
        assert_eq!(M.lock().as_slice(), [1, 2]);
    });
}

#[test]
fn try_lock_fails_across_threads() {
    static M: Mutex<u32> = Mutex::new(7);
    run_kernel(|| {
        let guard = M.lock();
        let (tx, rx) = channel();
        let h = mkern::spawn("prober", 50, move || {
            tx.send(M.try_lock().is_some()).unwrap();
        })
        .unwrap();
        // the prober outranks us and already ran
        assert_eq!(rx.recv().unwrap(), false);
        drop(guard);
        h.join();
        assert!(M.try_lock().is_some());
    });
}

#[test]
fn donation_flows_through_the_raii_wrapper() {
    static M: Mutex<u32> = Mutex::new(0);
    run_kernel(|| {
        mkern::set_priority(30);
        let guard = M.lock();
        let h = mkern::spawn("urgent", 50, || {
            let mut val = M.lock();
            *val += 1;
        })
        .unwrap();
        // "urgent" is blocked on the mutex and donates to us
        assert_eq!(mkern::priority(), 50);
        drop(guard);
        assert_eq!(mkern::priority(), 30);
        h.join();
        assert_eq!(*M.lock(), 1);
        mkern::set_priority(mcfg::PRI_DEFAULT);
    });
}
