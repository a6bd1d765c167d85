//! Priority donation: simple, chained, multiple, and the depth clamp.

use std::sync::mpsc::channel;
use std::sync::{Mutex, MutexGuard, Once};
use std::time::Duration;

use mkern::{Lock, Semaphore};

static INIT: Once = Once::new();
static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    INIT.call_once(mkern::init_scheduler);
    SERIAL.lock().unwrap_or_else(|e| e.into_inner())
}

fn run_at<F: FnOnce() + Send + 'static>(priority: u8, f: F) {
    let (tx, rx) = channel();
    mkern::spawn("test-driver", priority, move || {
        f();
        tx.send(()).unwrap();
    })
    .unwrap();
    rx.recv_timeout(Duration::from_secs(60))
        .expect("kernel test timed out");
}

#[test]
fn simple_donation() {
    static L: Lock = Lock::new();
    let _s = serial();
    run_at(30, || {
        L.acquire();
        let (tx, rx) = channel();
        let high = mkern::spawn("high", 50, move || {
            L.acquire();
            tx.send(mkern::priority()).unwrap();
            L.release();
        })
        .unwrap();
        // "high" preempted us at spawn and is now blocked on L, lending us
        // its urgency
        assert_eq!(mkern::priority(), 50);
        assert_eq!(mkern::base_priority(), 30);
        L.release();
        assert_eq!(mkern::priority(), 30);
        assert_eq!(rx.recv().unwrap(), 50);
        high.join();
    });
}

#[test]
fn chained_donation() {
    static A: Lock = Lock::new();
    static B: Lock = Lock::new();
    let _s = serial();
    run_at(10, || {
        A.acquire();
        let (tx, rx) = channel();
        let tx_med = tx.clone();
        let med = mkern::spawn("med", 20, move || {
            B.acquire();
            A.acquire();
            tx_med.send(("med-got-a", mkern::priority())).unwrap();
            A.release();
            B.release();
        })
        .unwrap();
        // med holds B and is blocked on A
        assert_eq!(mkern::priority(), 20);
        let tx_high = tx.clone();
        let high = mkern::spawn("high", 30, move || {
            B.acquire();
            tx_high.send(("high-got-b", mkern::priority())).unwrap();
            B.release();
        })
        .unwrap();
        // high -> med -> us: the donation walked the whole chain
        assert_eq!(mkern::priority(), 30);
        A.release();
        assert_eq!(mkern::priority(), 10);
        med.join();
        high.join();
        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            [("med-got-a", 30), ("high-got-b", 30)]
        );
    });
}

#[test]
fn multiple_donations_to_one_holder() {
    static A: Lock = Lock::new();
    static B: Lock = Lock::new();
    let _s = serial();
    run_at(30, || {
        A.acquire();
        B.acquire();
        let wa = mkern::spawn("wa", 40, || {
            A.acquire();
            A.release();
        })
        .unwrap();
        assert_eq!(mkern::priority(), 40);
        let wb = mkern::spawn("wb", 35, || {
            B.acquire();
            B.release();
        })
        .unwrap();
        // wb is ready but below our donated 40, so it has not run yet
        assert_eq!(mkern::priority(), 40);
        A.release();
        // wa finished; wb then got the CPU and is now blocked on B
        assert_eq!(mkern::priority(), 35);
        B.release();
        assert_eq!(mkern::priority(), 30);
        wa.join();
        wb.join();
    });
}

#[test]
fn try_acquire_does_no_donation() {
    static L: Lock = Lock::new();
    let _s = serial();
    run_at(30, || {
        L.acquire();
        let (tx, rx) = channel();
        let high = mkern::spawn("high", 50, move || {
            tx.send(L.try_acquire()).unwrap();
        })
        .unwrap();
        // high ran, failed to take L, and donated nothing
        assert_eq!(rx.recv().unwrap(), false);
        assert_eq!(mkern::priority(), 30);
        L.release();
        high.join();

        // an uncontended try_acquire takes the lock for real
        assert!(L.try_acquire());
        assert!(L.held_by_current_thread());
        L.release();
        assert!(!L.held_by_current_thread());
    });
}

/// Ten threads, ten locks, one donation chain deeper than the walk bound.
///
/// Thread `t[i]` (base priority 10+i) holds `CHAIN[i]` and waits for
/// `CHAIN[i-1]`; `t0` parks on a semaphore while holding `CHAIN[0]`. A
/// priority-60 thread then blocks on `CHAIN[9]`. The walk may raise at most
/// eight holders (t9 down to t2); t1 and t0 keep what earlier, shallower
/// walks gave them.
#[test]
fn donation_chain_is_depth_clamped() {
    static CHAIN: [Lock; 10] = [const { Lock::new() }; 10];
    static PARK: Semaphore = Semaphore::new(0);
    static NAMES: [&str; 10] = ["t0", "t1", "t2", "t3", "t4", "t5", "t6", "t7", "t8", "t9"];
    let _s = serial();
    run_at(5, || {
        let (tx, rx) = channel();
        let mut handles = Vec::new();
        let tx0 = tx.clone();
        handles.push(
            mkern::spawn(NAMES[0], 10, move || {
                CHAIN[0].acquire();
                PARK.down();
                tx0.send((NAMES[0], mkern::priority())).unwrap();
                CHAIN[0].release();
            })
            .unwrap(),
        );
        for i in 1..10 {
            let tx = tx.clone();
            handles.push(
                mkern::spawn(NAMES[i], 10 + i as u8, move || {
                    CHAIN[i].acquire();
                    CHAIN[i - 1].acquire();
                    tx.send((NAMES[i], mkern::priority())).unwrap();
                    CHAIN[i - 1].release();
                    CHAIN[i].release();
                })
                .unwrap(),
            );
        }
        let tx_big = tx.clone();
        handles.push(
            mkern::spawn("big", 60, move || {
                CHAIN[9].acquire();
                tx_big.send(("big", mkern::priority())).unwrap();
                CHAIN[9].release();
            })
            .unwrap(),
        );
        // everyone is parked; let t0 go and unwind the chain
        PARK.up();
        for h in handles {
            h.join();
        }
        let events: Vec<_> = rx.try_iter().collect();
        // t8's walk (donor priority 18) was the deepest to reach t0; t9's
        // (19) stopped at t1; big's (60) stopped at t2.
        let mut expected = vec![("t0", 18), ("t1", 19)];
        expected.extend(NAMES[2..].iter().map(|n| (*n, 60)));
        expected.push(("big", 60));
        assert_eq!(events, expected);
    });
}
