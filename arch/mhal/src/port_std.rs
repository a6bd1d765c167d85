//! Hosted port: the kernel on OS threads, one simulated CPU.
//!
//! Every kernel thread is backed by an OS thread that is parked whenever the
//! scheduler switches away from it, so exactly one kernel thread executes
//! kernel code at a time, like on the real single CPU. The CPU's interrupt
//! flag becomes an owner-tracked critical section: `save_disable` from a
//! second OS thread blocks until the first one restores, which also lets
//! outside harness threads (the test runner) call non-blocking kernel
//! entry points safely.
//!
//! Timer interrupts are raised by a host timer thread as *pending* ticks and
//! are serviced by the running kernel thread the next time it enables
//! interrupts, or by the idle thread in [`wait_for_irq`]. That mirrors the
//! hardware rule that interrupts are only taken while the interrupt flag is
//! set. A deferred yield requested from a handler runs at the simulated
//! interrupt return, once the flag is back on.

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock};
use std::thread::{self, ThreadId};
use std::time::Duration;

struct CpuState {
    /// The simulated interrupt flag.
    irq_on: bool,
    /// Host thread currently inside an interrupts-disabled section.
    owner: Option<ThreadId>,
    /// Nesting depth of the owner's section.
    depth: usize,
    /// Timer interrupts raised but not yet serviced.
    pending_ticks: u64,
    /// A handler is currently running.
    in_handler: bool,
    /// A handler asked the interrupted thread to yield at interrupt return.
    yield_requested: bool,
}

static CPU: Mutex<CpuState> = Mutex::new(CpuState {
    irq_on: false,
    owner: None,
    depth: 0,
    pending_ticks: 0,
    in_handler: false,
    yield_requested: false,
});
static CPU_CV: Condvar = Condvar::new();

thread_local! {
    static KERNEL_THREAD: Cell<bool> = const { Cell::new(false) };
}

pub(crate) fn on_kernel_thread() -> bool {
    KERNEL_THREAD.with(|k| k.get())
}

pub(crate) fn irq_save_and_disable() -> usize {
    let me = thread::current().id();
    let mut cpu = CPU.lock().unwrap();
    loop {
        match cpu.owner {
            None => {
                cpu.owner = Some(me);
                cpu.depth = 1;
                let was_on = cpu.irq_on;
                cpu.irq_on = false;
                return was_on as usize;
            }
            Some(owner) if owner == me => {
                cpu.depth += 1;
                return 0;
            }
            Some(_) => cpu = CPU_CV.wait(cpu).unwrap(),
        }
    }
}

pub(crate) fn irq_restore(flags: usize) {
    let me = thread::current().id();
    let mut cpu = CPU.lock().unwrap();
    assert_eq!(
        cpu.owner,
        Some(me),
        "interrupt state restored outside the owning critical section"
    );
    if cpu.depth > 1 {
        debug_assert_eq!(flags, 0, "nested interrupt save observed interrupts on");
        cpu.depth -= 1;
        return;
    }
    cpu.depth = 0;
    cpu.owner = None;
    if flags != 0 {
        cpu.irq_on = true;
        if on_kernel_thread() {
            cpu = service_interrupts(cpu);
        }
    }
    drop(cpu);
    CPU_CV.notify_all();
}

pub(crate) fn irq_enable() {
    let me = thread::current().id();
    let mut cpu = CPU.lock().unwrap();
    assert!(!cpu.in_handler, "interrupts enabled inside an interrupt handler");
    assert_eq!(cpu.owner, Some(me), "interrupt enable outside a critical section");
    assert_eq!(cpu.depth, 1, "unbalanced interrupt enable");
    cpu.depth = 0;
    cpu.owner = None;
    cpu.irq_on = true;
    if on_kernel_thread() {
        cpu = service_interrupts(cpu);
    }
    drop(cpu);
    CPU_CV.notify_all();
}

pub(crate) fn irqs_enabled() -> bool {
    CPU.lock().unwrap().irq_on
}

pub(crate) fn in_irq() -> bool {
    CPU.lock().unwrap().in_handler
}

pub(crate) fn request_yield_on_return() {
    let mut cpu = CPU.lock().unwrap();
    assert!(
        cpu.in_handler,
        "deferred yield requested outside interrupt context"
    );
    cpu.yield_requested = true;
}

pub(crate) fn wait_for_irq() {
    debug_assert!(on_kernel_thread());
    let mut cpu = CPU.lock().unwrap();
    assert!(cpu.irq_on, "waiting for interrupts with interrupts disabled");
    while cpu.pending_ticks == 0 || cpu.owner.is_some() {
        cpu = CPU_CV.wait(cpu).unwrap();
    }
    cpu = service_interrupts(cpu);
    drop(cpu);
    CPU_CV.notify_all();
}

/// Take pending timer interrupts, then honor a deferred yield.
///
/// Entered with the interrupt flag on and no section owner; returns in the
/// same state. Each delivery mirrors hardware vectoring: the flag goes off,
/// the running host thread becomes the section owner, and the handler runs
/// to completion before the flag comes back on.
fn service_interrupts(mut cpu: MutexGuard<'static, CpuState>) -> MutexGuard<'static, CpuState> {
    let me = thread::current().id();
    loop {
        while cpu.irq_on && cpu.owner.is_none() && cpu.pending_ticks > 0 {
            cpu.pending_ticks -= 1;
            cpu.irq_on = false;
            cpu.owner = Some(me);
            cpu.depth = 1;
            cpu.in_handler = true;
            drop(cpu);
            crate::irq::dispatch_tick();
            cpu = CPU.lock().unwrap();
            assert_eq!(cpu.owner, Some(me));
            assert_eq!(cpu.depth, 1, "interrupt handler left a critical section open");
            cpu.in_handler = false;
            cpu.depth = 0;
            cpu.owner = None;
            cpu.irq_on = true;
        }
        if cpu.yield_requested && cpu.irq_on && cpu.owner.is_none() {
            cpu.yield_requested = false;
            drop(cpu);
            CPU_CV.notify_all();
            crate::irq::run_deferred_yield();
            cpu = CPU.lock().unwrap();
            continue;
        }
        return cpu;
    }
}

pub(crate) fn start_tick() {
    static STARTED: OnceLock<()> = OnceLock::new();
    STARTED.get_or_init(|| {
        let period = Duration::from_nanos(1_000_000_000 / mcfg::TICK_HZ);
        thread::Builder::new()
            .name("tick-source".into())
            .spawn(move || loop {
                thread::sleep(period);
                let mut cpu = CPU.lock().unwrap();
                cpu.pending_ticks += 1;
                drop(cpu);
                CPU_CV.notify_all();
            })
            .expect("failed to start the tick source");
        log::debug!("tick source running at {} Hz", mcfg::TICK_HZ);
    });
}

struct CtxShared {
    /// True while the scheduler wants this thread on the CPU.
    run: Mutex<bool>,
    cv: Condvar,
    host: OnceLock<ThreadId>,
    /// Critical-section depth saved across a switch-out.
    saved_depth: AtomicUsize,
}

/// Handle to one kernel thread's execution state.
#[derive(Clone)]
pub struct ThreadContext(Arc<CtxShared>);

impl ThreadContext {
    fn resume(&self) {
        let mut run = self.0.run.lock().unwrap();
        *run = true;
        self.0.cv.notify_one();
    }

    fn suspend(&self) {
        let mut run = self.0.run.lock().unwrap();
        while !*run {
            run = self.0.cv.wait(run).unwrap();
        }
        *run = false;
    }
}

pub(crate) fn new_context(entry: Box<dyn FnOnce() + Send + 'static>) -> ThreadContext {
    let ctx = ThreadContext(Arc::new(CtxShared {
        run: Mutex::new(false),
        cv: Condvar::new(),
        host: OnceLock::new(),
        saved_depth: AtomicUsize::new(1),
    }));
    let shared = ctx.0.clone();
    let handle = thread::Builder::new()
        .name("kthread".into())
        .spawn(move || {
            KERNEL_THREAD.with(|k| k.set(true));
            ThreadContext(shared).suspend();
            entry();
            unreachable!("kernel thread entry returned");
        })
        .expect("failed to spawn host thread for kernel thread");
    ctx.0
        .host
        .set(handle.thread().id())
        .expect("context already started");
    ctx
}

/// Move the critical section from the calling thread to `next`'s host
/// thread, saving the caller's nesting depth into `prev`.
fn transfer_cpu(prev: Option<&ThreadContext>, next: &ThreadContext) {
    let me = thread::current().id();
    let next_host = *next
        .0
        .host
        .get()
        .expect("switching to a context that was never created");
    let mut cpu = CPU.lock().unwrap();
    assert!(!cpu.irq_on, "context switch with interrupts enabled");
    assert_eq!(cpu.owner, Some(me), "context switch outside a critical section");
    if let Some(prev) = prev {
        prev.0.saved_depth.store(cpu.depth, Ordering::Relaxed);
    }
    cpu.depth = next.0.saved_depth.load(Ordering::Relaxed);
    cpu.owner = Some(next_host);
}

pub(crate) fn switch(prev: &ThreadContext, next: &ThreadContext) {
    transfer_cpu(Some(prev), next);
    next.resume();
    prev.suspend();
}

pub(crate) fn switch_and_exit(next: &ThreadContext) -> ! {
    transfer_cpu(None, next);
    next.resume();
    // This host thread backs a dead kernel thread; it is never scheduled
    // again and the process reclaims it at exit.
    loop {
        thread::park();
    }
}

pub(crate) fn start(first: &ThreadContext) {
    let host = *first.0.host.get().expect("starting a context that was never created");
    let mut cpu = CPU.lock().unwrap();
    while cpu.owner.is_some() {
        cpu = CPU_CV.wait(cpu).unwrap();
    }
    assert!(!cpu.irq_on, "kernel started with interrupts already enabled");
    cpu.owner = Some(host);
    cpu.depth = first.0.saved_depth.load(Ordering::Relaxed);
    drop(cpu);
    first.resume();
}
