//! The public face of the concurrency core: boot, thread lifecycle, and
//! priorities.

use alloc::boxed::Box;
use alloc::string::String;

use mspin::IrqSave;

use crate::run_queue::ReadyQueue;
use crate::sched::{self, preempt_check, sched, Scheduler};
use crate::semaphore::Semaphore;
use crate::task::{SpawnError, ThreadRef, ThreadState, ThreadTable, Tid};
use crate::timers::{self, SleepQueue};

/// Bring up the scheduler: thread table, idle thread, tick source. Must be
/// called exactly once, before any other entry point.
pub fn init_scheduler() {
    assert!(!sched::is_inited(), "scheduler already initialized");

    let mut table = ThreadTable::new();
    let idle = table
        .alloc("idle", mcfg::PRI_MIN, None)
        .expect("fresh thread table");
    table.get_mut(idle).state = ThreadState::Running;

    sched::install(Scheduler {
        table,
        ready: ReadyQueue::new(),
        sleepers: SleepQueue::new(),
        current: idle,
        idle,
        prev: None,
        ticks: 0,
        idle_ticks: 0,
        kernel_ticks: 0,
        switches: 0,
    });

    assert!(
        mhal::irq::register_tick_handler(timers::on_timer_tick),
        "tick handler already registered"
    );
    assert!(
        mhal::irq::register_deferred_yield(sched::yield_now),
        "deferred-yield hook already registered"
    );

    let ctx = mhal::context::new_context(Box::new(|| {
        sched::finish_switch();
        mhal::irq::enable();
        sched::idle_loop();
    }));
    {
        let _irq = IrqSave::new();
        sched().lock().table.get_mut(idle).ctx = Some(ctx.clone());
    }

    mhal::time::start_tick();
    mhal::context::start(&ctx);
    debug!("scheduler ready at {} Hz", mcfg::TICK_HZ);
}

/// Handle to a spawned thread, for joining it later.
pub struct JoinHandle {
    thread: ThreadRef,
    tid: Tid,
}

/// Create a thread running `f` at `priority` and make it runnable. The new
/// thread starts as soon as it outranks the running one.
///
/// If the caller is a kernel thread it becomes the parent and may
/// [`JoinHandle::join`] the child; otherwise the child is detached and
/// cleans up after itself.
pub fn spawn<F>(name: &str, priority: u8, f: F) -> Result<JoinHandle, SpawnError>
where
    F: FnOnce() + Send + 'static,
{
    assert!(!mhal::irq::in_irq(), "thread creation in interrupt context");
    assert!(
        priority <= mcfg::PRI_MAX,
        "priority {} out of range",
        priority
    );
    let parent = if mhal::context::on_kernel_thread() && sched::is_inited() {
        let _irq = IrqSave::new();
        Some(sched().lock().current)
    } else {
        None
    };

    let (thread, tid) = {
        let _irq = IrqSave::new();
        let mut guard = sched().lock();
        let s = &mut *guard;
        let r = s.table.alloc(name, priority, parent)?;
        if let Some(p) = parent {
            s.table
                .get_mut(p)
                .children
                .push(r)
                .expect("child list capacity matches the thread table");
        }
        (r, s.table.get(r).tid)
    };

    let entry = Box::new(move || {
        sched::finish_switch();
        mhal::irq::enable();
        f();
        exit(0);
    });
    let ctx = mhal::context::new_context(entry);
    {
        let _irq = IrqSave::new();
        let mut guard = sched().lock();
        let s = &mut *guard;
        let t = s.table.get_mut(thread);
        t.ctx = Some(ctx);
        t.state = ThreadState::Ready;
        s.ready.enqueue(&mut s.table, thread);
    }
    debug!("spawned {} ({}) at priority {}", name, tid, priority);
    preempt_check();
    Ok(JoinHandle { thread, tid })
}

impl JoinHandle {
    /// Wait for the thread to exit and return its status. Only the parent
    /// may join, and a joined thread is gone: its slot is reclaimed at the
    /// next switch after it dies.
    pub fn join(self) -> i32 {
        assert!(
            mhal::context::on_kernel_thread(),
            "join from outside the kernel"
        );
        let child = self.thread;
        let (exit_done, reap_ack): (*const Semaphore, *const Semaphore) = {
            let _irq = IrqSave::new();
            let guard = sched().lock();
            assert!(
                guard.table.is_valid(child),
                "joining a thread that was already reaped"
            );
            let t = guard.table.get(child);
            assert_eq!(
                t.parent,
                Some(guard.current),
                "joining a thread spawned by someone else"
            );
            (&t.exit_done as *const _, &t.reap_ack as *const _)
        };
        // Safety: the child cannot be reaped before it gets the
        // acknowledgement we send below, so its control block outlives
        // both pointer uses.
        unsafe { (*exit_done).down() };
        let status = {
            let _irq = IrqSave::new();
            sched().lock().table.get(child).exit_status
        };
        unsafe { (*reap_ack).up() };
        status
    }

    /// The thread this handle refers to.
    pub fn thread(&self) -> ThreadRef {
        self.thread
    }

    /// Its printable identifier.
    pub fn tid(&self) -> Tid {
        self.tid
    }
}

/// Terminate the calling thread with `status`. Never returns.
///
/// The thread announces its exit for a joining parent, waits to be reaped
/// (immediately, if detached), and leaves the CPU for good; the next thread
/// to run frees its slot.
pub fn exit(status: i32) -> ! {
    assert!(!mhal::irq::in_irq(), "exit from interrupt context");
    assert!(
        mhal::context::on_kernel_thread(),
        "exit from outside the kernel"
    );

    let exit_done: *const Semaphore;
    let reap_ack: *const Semaphore;
    let mut child_acks: heapless::Vec<*const Semaphore, { mcfg::MAX_THREADS }> =
        heapless::Vec::new();
    {
        let _irq = IrqSave::new();
        let mut guard = sched().lock();
        let s = &mut *guard;
        let cur = s.current;
        assert!(cur != s.idle, "idle thread exiting");
        s.table.get_mut(cur).exit_status = status;
        // Orphaned children reap themselves: pre-credit their
        // acknowledgement and cut the lineage.
        let children = s.table.get(cur).children.clone();
        for c in children {
            if s.table.is_valid(c) && s.table.get(c).parent == Some(cur) {
                let t = s.table.get_mut(c);
                t.parent = None;
                child_acks
                    .push(&t.reap_ack as *const _)
                    .expect("bounded by the thread table");
            }
        }
        let t = s.table.get(cur);
        exit_done = &t.exit_done as *const _;
        reap_ack = &t.reap_ack as *const _;
    }
    for ack in &child_acks {
        // Safety: a detached child cannot die before this credit arrives —
        // dying is gated on exactly this semaphore.
        unsafe { (**ack).up() };
    }

    debug!("{} exiting with status {}", current_name(), status);
    // Safety: our own control block cannot be reaped before the
    // acknowledgement below is consumed.
    unsafe { (*exit_done).up() };
    unsafe { (*reap_ack).down() };

    // Final descent: interrupts stay off from here until another thread
    // restores them.
    mhal::irq::save_disable();
    let next_ctx = {
        let mut guard = sched().lock();
        let s = &mut *guard;
        let cur = s.current;
        s.table.get_mut(cur).state = ThreadState::Dying;
        let next = match s.ready.pop_highest(&mut s.table) {
            Some(n) => n,
            None => s.idle,
        };
        debug_assert!(next != cur);
        {
            let t = s.table.get_mut(next);
            t.state = ThreadState::Running;
            t.slice_used = 0;
        }
        s.current = next;
        s.switches += 1;
        s.prev = Some(cur);
        s.table.get(next).ctx.clone().expect("thread without context")
    };
    mhal::context::switch_and_exit(&next_ctx)
}

/// Handle to the calling thread.
pub fn current() -> ThreadRef {
    assert!(
        mhal::context::on_kernel_thread(),
        "no current thread outside the kernel"
    );
    let _irq = IrqSave::new();
    sched().lock().current
}

/// Name of the calling thread, or a placeholder for outside callers.
pub fn current_name() -> String {
    if !mhal::context::on_kernel_thread() {
        return "<host>".into();
    }
    let _irq = IrqSave::new();
    let guard = sched().lock();
    guard.table.get(guard.current).name.as_str().into()
}

/// Set the calling thread's base priority. Its effective priority never
/// drops below what donations currently sustain, and the CPU is handed
/// over at once if the change leaves someone else more urgent.
pub fn set_priority(priority: u8) {
    assert!(
        priority <= mcfg::PRI_MAX,
        "priority {} out of range",
        priority
    );
    {
        let _irq = IrqSave::new();
        let mut guard = sched().lock();
        let s = &mut *guard;
        let cur = s.current;
        s.table.get_mut(cur).base_priority = priority;
        s.recompute_effective(cur);
    }
    preempt_check();
}

/// The calling thread's effective priority: its base, or higher while it
/// receives donations.
pub fn priority() -> u8 {
    let _irq = IrqSave::new();
    let guard = sched().lock();
    guard.table.get(guard.current).effective_priority
}

/// The calling thread's base priority.
pub fn base_priority() -> u8 {
    let _irq = IrqSave::new();
    let guard = sched().lock();
    guard.table.get(guard.current).base_priority
}

/// A snapshot of scheduler counters.
#[derive(Debug, Clone, Copy)]
pub struct KernelStats {
    /// Ticks since boot.
    pub ticks: u64,
    /// Ticks spent in the idle thread.
    pub idle_ticks: u64,
    /// Ticks spent in other threads.
    pub kernel_ticks: u64,
    /// Context switches performed.
    pub context_switches: u64,
    /// Live threads, idle included.
    pub live_threads: usize,
}

/// Read the scheduler counters.
pub fn stats() -> KernelStats {
    let _irq = IrqSave::new();
    let guard = sched().lock();
    KernelStats {
        ticks: guard.ticks,
        idle_ticks: guard.idle_ticks,
        kernel_ticks: guard.kernel_ticks,
        context_switches: guard.switches,
        live_threads: guard.table.live(),
    }
}
