//! Test suite for mspin.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use super::*;

/// Fake IRQ guard that counts critical-section depth.
struct TestGuardIrq;

static IRQ_DEPTH: AtomicUsize = AtomicUsize::new(0);

impl BaseGuard for TestGuardIrq {
    type State = usize;

    fn acquire() -> Self::State {
        IRQ_DEPTH.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn release(_: Self::State) {
        IRQ_DEPTH.fetch_sub(1, Ordering::SeqCst);
    }
}

type TestSpinIrq<T> = SpinLock<TestGuardIrq, T>;

/// Host-side `KernelGuardIf`: a software interrupt flag, so [`IrqSave`]
/// itself can be exercised without a kernel port.
struct HostGuardIf;

static IRQS_ON: AtomicUsize = AtomicUsize::new(1);

#[crate_interface::impl_interface]
impl KernelGuardIf for HostGuardIf {
    fn local_irq_save_and_disable() -> usize {
        IRQS_ON.swap(0, Ordering::SeqCst)
    }

    fn local_irq_restore(flags: usize) {
        if flags != 0 {
            IRQS_ON.store(1, Ordering::SeqCst);
        }
    }
}

#[derive(Eq, PartialEq, Debug)]
struct NonCopy(i32);

#[test]
fn irq_save_nests_and_restores() {
    // one test owns IRQS_ON; asserts would race if this were split up
    let outer = IrqSave::new();
    assert_eq!(IRQS_ON.load(Ordering::SeqCst), 0);
    {
        let _inner = IrqSave::new();
        assert_eq!(IRQS_ON.load(Ordering::SeqCst), 0);
    }
    // the inner guard saw interrupts already off and must not re-enable
    assert_eq!(IRQS_ON.load(Ordering::SeqCst), 0);
    drop(outer);
    assert_eq!(IRQS_ON.load(Ordering::SeqCst), 1);

    let m = SpinNoIrq::new(5);
    {
        let guard = m.lock();
        assert_eq!(*guard, 5);
        assert_eq!(IRQS_ON.load(Ordering::SeqCst), 0);
    }
    assert_eq!(IRQS_ON.load(Ordering::SeqCst), 1);
}

#[test]
fn smoke() {
    let m = SpinRaw::new(());
    drop(m.lock());
    drop(m.lock());
}

#[test]
fn guard_state_restored() {
    let m = TestSpinIrq::new(());
    let a = m.lock();
    assert_eq!(IRQ_DEPTH.load(Ordering::SeqCst), 1);
    drop(a);
    assert_eq!(IRQ_DEPTH.load(Ordering::SeqCst), 0);
}

#[test]
fn nested_sections() {
    let m = TestSpinIrq::new(1);
    let n = TestSpinIrq::new(2);
    let a = m.lock();
    let b = n.lock();
    assert_eq!(IRQ_DEPTH.load(Ordering::SeqCst), 2);
    assert_eq!(*a + *b, 3);
    drop(b);
    assert_eq!(IRQ_DEPTH.load(Ordering::SeqCst), 1);
    drop(a);
    assert_eq!(IRQ_DEPTH.load(Ordering::SeqCst), 0);
}

#[test]
fn into_inner_works() {
    let m = SpinRaw::new(NonCopy(10));
    assert_eq!(m.into_inner(), NonCopy(10));
}

#[test]
fn into_inner_drops() {
    struct Foo(Arc<AtomicUsize>);
    impl Drop for Foo {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let num_drops = Arc::new(AtomicUsize::new(0));
    let m = SpinRaw::new(Foo(num_drops.clone()));
    assert_eq!(num_drops.load(Ordering::SeqCst), 0);

    {
        let _inner = m.into_inner();
        assert_eq!(num_drops.load(Ordering::SeqCst), 0);
    }

    assert_eq!(num_drops.load(Ordering::SeqCst), 1);
}

#[test]
fn get_mut_bypasses_guard() {
    let mut m = TestSpinIrq::new(7);
    *m.get_mut() = 8;
    assert_eq!(IRQ_DEPTH.load(Ordering::SeqCst), 0);
    assert_eq!(*m.lock(), 8);
}

#[test]
fn unsized_types() {
    let m: &SpinRaw<[i32]> = &SpinRaw::new([1, 2, 3]);
    {
        let mut b = m.lock();
        b[0] = 4;
        b[2] = 5;
    }
    let expected: &[i32] = &[4, 2, 5];
    assert_eq!(&*m.lock(), expected);
}

#[test]
fn debug_output() {
    let m = SpinRaw::new(42);
    let s = format!("{:?}", m);
    assert!(s.contains("42"));
}
