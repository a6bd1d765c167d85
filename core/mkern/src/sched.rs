//! The scheduler: dispatch, yield, unblock, priority donation.
//!
//! All scheduler state lives behind a single `SpinRaw`, and every entry
//! point opens an `IrqSave` section first — on one CPU, masked interrupts
//! *are* the lock. The only rule that takes care is the context switch
//! itself: the `SpinRaw` guard is dropped before switching so that no borrow
//! of the scheduler outlives the thread's time on the CPU; interrupts stay
//! masked across the switch and are restored by whatever the next thread was
//! doing when it suspended.

use lazyinit::LazyInit;
use mspin::{IrqSave, SpinRaw};

use crate::run_queue::ReadyQueue;
use crate::task::{ThreadRef, ThreadState, ThreadTable};
use crate::timers::SleepQueue;

pub(crate) struct Scheduler {
    pub table: ThreadTable,
    pub ready: ReadyQueue,
    pub sleepers: SleepQueue,
    pub current: ThreadRef,
    pub idle: ThreadRef,
    /// Thread we just switched away from; inspected by [`finish_switch`].
    pub prev: Option<ThreadRef>,
    pub ticks: u64,
    pub idle_ticks: u64,
    pub kernel_ticks: u64,
    pub switches: u64,
}

static SCHED: LazyInit<SpinRaw<Scheduler>> = LazyInit::new();

pub(crate) fn sched() -> &'static SpinRaw<Scheduler> {
    SCHED
        .get()
        .expect("scheduler not initialized; call init_scheduler() first")
}

pub(crate) fn install(scheduler: Scheduler) {
    SCHED.init_once(SpinRaw::new(scheduler));
}

pub(crate) fn is_inited() -> bool {
    SCHED.is_inited()
}

impl Scheduler {
    /// Make a blocked thread runnable. The caller must already have removed
    /// it from whatever wait structure held it. Does not preempt.
    pub fn unblock(&mut self, r: ThreadRef) {
        let t = self.table.get_mut(r);
        assert_eq!(
            t.state,
            ThreadState::Blocked,
            "unblocking a thread that is not blocked"
        );
        debug_assert!(
            t.in_queue.is_none(),
            "unblocking a thread still linked into a wait structure"
        );
        t.state = ThreadState::Ready;
        self.ready.enqueue(&mut self.table, r);
    }

    /// Whether the head of the ready queue should displace the running
    /// thread. The idle thread is displaced by anything.
    pub fn should_preempt(&self) -> bool {
        match self.ready.head_priority() {
            None => false,
            Some(_) if self.current == self.idle => true,
            Some(p) => p > self.table.get(self.current).effective_priority,
        }
    }

    /// Raise priorities along the chain of lock holders starting at `start`
    /// until a holder at least as urgent as the donor is found, the chain
    /// ends, or the depth bound trips.
    pub fn donate_chain(&mut self, donor_priority: u8, start: ThreadRef) {
        let mut target = start;
        for _ in 0..mcfg::DONATION_DEPTH_MAX {
            let old = self.table.get(target).effective_priority;
            if old >= donor_priority {
                return;
            }
            trace!(
                "donating priority {} to {} (was {})",
                donor_priority,
                self.table.get(target).tid,
                old
            );
            self.table.get_mut(target).effective_priority = donor_priority;
            if self.table.get(target).state == ThreadState::Ready {
                self.ready.remove(&mut self.table, target, old);
                self.ready.enqueue(&mut self.table, target);
            }
            // Safety: a lock with a waiter cannot be moved or dropped, and
            // `target` is blocked on this one.
            let next = match self.table.get(target).blocked_on_lock {
                Some(ptr) => unsafe { ptr.holder() },
                None => return,
            };
            match next {
                Some(holder) => target = holder,
                None => return,
            }
        }
        warn!(
            "priority donation chain deeper than {}; stopping the walk",
            mcfg::DONATION_DEPTH_MAX
        );
    }

    /// Recompute a thread's effective priority from its base and the
    /// current waiters of every lock it still holds. The waiter lists are
    /// scanned rather than trusted: their sort order is advisory.
    pub fn recompute_effective(&mut self, r: ThreadRef) {
        let held = self.table.get(r).held_locks.clone();
        let mut prio = self.table.get(r).base_priority;
        for lock in &held {
            // Safety: we hold each of these locks, so none can go away.
            if let Some(p) = unsafe { lock.max_waiter_priority(&self.table) } {
                prio = prio.max(p);
            }
        }
        self.table.get_mut(r).effective_priority = prio;
    }
}

/// Pick the highest-priority ready thread (idle if none) and switch to it.
///
/// Interrupts must be disabled. The current thread must already be
/// accounted for: re-enqueued if yielding, or marked blocked and parked in
/// a wait structure. Returns when the caller is next scheduled.
pub(crate) fn reschedule() {
    debug_assert!(!mhal::irq::is_enabled(), "reschedule with interrupts on");
    let (prev_ctx, next_ctx) = {
        let mut guard = sched().lock();
        let s = &mut *guard;
        let prev = s.current;
        let next = match s.ready.pop_highest(&mut s.table) {
            Some(n) => n,
            None => s.idle,
        };
        if next == prev {
            s.table.get_mut(prev).state = ThreadState::Running;
            return;
        }
        {
            let t = s.table.get_mut(next);
            t.state = ThreadState::Running;
            t.slice_used = 0;
        }
        s.current = next;
        s.switches += 1;
        s.prev = Some(prev);
        let prev_ctx = s.table.get(prev).ctx.clone().expect("thread without context");
        let next_ctx = s.table.get(next).ctx.clone().expect("thread without context");
        (prev_ctx, next_ctx)
    };
    mhal::context::switch(&prev_ctx, &next_ctx);
    finish_switch();
}

/// Bookkeeping on the far side of a context switch: if the thread we came
/// from was dying, its slot is reclaimed here, where it is guaranteed to be
/// off the CPU for good.
pub(crate) fn finish_switch() {
    let mut guard = sched().lock();
    let s = &mut *guard;
    if let Some(prev) = s.prev.take() {
        if s.table.get(prev).state == ThreadState::Dying {
            let tcb = s.table.free(prev);
            debug!("reaped thread {} ({})", tcb.name, tcb.tid);
        }
    }
}

/// Give up the CPU, keeping the current thread runnable behind its equals.
pub fn yield_now() {
    assert!(!mhal::irq::in_irq(), "yield from interrupt context");
    if !mhal::context::on_kernel_thread() {
        return;
    }
    let _irq = IrqSave::new();
    {
        let mut guard = sched().lock();
        let s = &mut *guard;
        let cur = s.current;
        debug_assert_eq!(s.table.get(cur).state, ThreadState::Running);
        s.table.get_mut(cur).state = ThreadState::Ready;
        if cur != s.idle {
            s.ready.enqueue(&mut s.table, cur);
        }
    }
    reschedule();
}

/// Whether a strictly more urgent thread is ready to run.
pub fn should_preempt() -> bool {
    let _irq = IrqSave::new();
    sched().lock().should_preempt()
}

/// Yield if a more urgent thread is ready — directly in thread context,
/// deferred to interrupt return in interrupt context.
pub(crate) fn preempt_check() {
    if should_preempt() {
        if mhal::irq::in_irq() {
            mhal::irq::yield_on_return();
        } else if mhal::context::on_kernel_thread() {
            yield_now();
        }
    }
}

/// The idle thread: halt until something happens, then get out of the way.
pub(crate) fn idle_loop() -> ! {
    loop {
        mhal::irq::wait_for_irq();
        preempt_check();
    }
}
