//! Thread control blocks and the thread table.
//!
//! Threads live in a fixed arena of slots. The rest of the kernel refers to
//! them by [`ThreadRef`], a slot index plus a generation counter that is
//! bumped when the slot is reused, so a stale reference to a reaped thread
//! is caught instead of silently naming its successor. The printable
//! [`Tid`] is independent of slots and increases monotonically.

use alloc::boxed::Box;
use core::fmt;

use crate::lock::LockPtr;
use crate::semaphore::Semaphore;

/// Monotonic thread identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tid(pub(crate) u64);

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a slot in the thread table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadRef {
    pub(crate) slot: u16,
    pub(crate) gen: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ThreadState {
    Running,
    Ready,
    Blocked,
    Dying,
}

/// Which scheduler-owned structure a thread is currently linked into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueueId {
    Ready,
    Sleep,
    Wait,
}

/// Intrusive list linkage. A thread is in at most one queue at a time, so
/// one pair of links serves the ready queue, the sleep queue, and every
/// waiter list.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Link {
    pub prev: Option<ThreadRef>,
    pub next: Option<ThreadRef>,
}

pub(crate) struct Tcb {
    pub tid: Tid,
    pub name: heapless::String<{ mcfg::THREAD_NAME_LEN }>,
    pub state: ThreadState,
    /// The priority this thread asked for.
    pub base_priority: u8,
    /// What it is scheduled at right now: base plus any donations received
    /// through locks it holds.
    pub effective_priority: u8,
    /// Ticks consumed of the current quantum.
    pub slice_used: u32,
    /// Wake deadline; meaningful only while on the sleep queue.
    pub wake_at: u64,
    pub link: Link,
    pub in_queue: Option<QueueId>,
    /// The lock this thread is blocked on, if any. Donation chains walk
    /// waiter -> holder through this.
    pub blocked_on_lock: Option<LockPtr>,
    pub held_locks: heapless::Vec<LockPtr, { mcfg::MAX_HELD_LOCKS }>,
    pub parent: Option<ThreadRef>,
    pub children: heapless::Vec<ThreadRef, { mcfg::MAX_THREADS }>,
    pub exit_status: i32,
    /// Upped once when this thread announces its exit.
    pub exit_done: Semaphore,
    /// Downed by the dying thread; the parent (or the detach pre-credit)
    /// ups it to let the thread die.
    pub reap_ack: Semaphore,
    pub ctx: Option<mhal::context::ThreadContext>,
}

impl Tcb {
    pub(crate) fn new(tid: Tid, name: &str, priority: u8, parent: Option<ThreadRef>) -> Self {
        let mut short: heapless::String<{ mcfg::THREAD_NAME_LEN }> = heapless::String::new();
        for c in name.chars() {
            if short.push(c).is_err() {
                break;
            }
        }
        Self {
            tid,
            name: short,
            state: ThreadState::Blocked,
            base_priority: priority,
            effective_priority: priority,
            slice_used: 0,
            wake_at: 0,
            link: Link {
                prev: None,
                next: None,
            },
            in_queue: None,
            blocked_on_lock: None,
            held_locks: heapless::Vec::new(),
            children: heapless::Vec::new(),
            parent,
            exit_status: 0,
            exit_done: Semaphore::new(0),
            // A thread with no parent has nobody to reap it; pre-credit the
            // acknowledgement so it reaps itself.
            reap_ack: Semaphore::new(if parent.is_some() { 0 } else { 1 }),
            ctx: None,
        }
    }
}

/// Thread creation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// The thread table is full.
    NoThreadSlot,
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::NoThreadSlot => write!(f, "thread table is full"),
        }
    }
}

struct Slot {
    gen: u16,
    tcb: Option<Box<Tcb>>,
}

/// Fixed arena of thread slots.
pub(crate) struct ThreadTable {
    slots: [Slot; mcfg::MAX_THREADS],
    next_tid: u64,
}

impl ThreadTable {
    pub fn new() -> Self {
        Self {
            slots: [const {
                Slot {
                    gen: 0,
                    tcb: None,
                }
            }; mcfg::MAX_THREADS],
            next_tid: 1,
        }
    }

    pub fn alloc(
        &mut self,
        name: &str,
        priority: u8,
        parent: Option<ThreadRef>,
    ) -> Result<ThreadRef, SpawnError> {
        let slot = self
            .slots
            .iter()
            .position(|s| s.tcb.is_none())
            .ok_or(SpawnError::NoThreadSlot)?;
        let tid = Tid(self.next_tid);
        self.next_tid += 1;
        self.slots[slot].tcb = Some(Box::new(Tcb::new(tid, name, priority, parent)));
        Ok(ThreadRef {
            slot: slot as u16,
            gen: self.slots[slot].gen,
        })
    }

    /// Release a slot, invalidating every outstanding `ThreadRef` to it.
    pub fn free(&mut self, r: ThreadRef) -> Box<Tcb> {
        assert!(self.is_valid(r), "freeing a stale thread reference");
        let slot = &mut self.slots[r.slot as usize];
        slot.gen = slot.gen.wrapping_add(1);
        slot.tcb.take().expect("freeing an empty thread slot")
    }

    pub fn is_valid(&self, r: ThreadRef) -> bool {
        let slot = &self.slots[r.slot as usize];
        slot.gen == r.gen && slot.tcb.is_some()
    }

    pub fn get(&self, r: ThreadRef) -> &Tcb {
        let slot = &self.slots[r.slot as usize];
        assert!(
            slot.gen == r.gen,
            "stale thread reference (slot {} gen {})",
            r.slot,
            r.gen
        );
        slot.tcb.as_ref().expect("empty thread slot")
    }

    pub fn get_mut(&mut self, r: ThreadRef) -> &mut Tcb {
        let slot = &mut self.slots[r.slot as usize];
        assert!(
            slot.gen == r.gen,
            "stale thread reference (slot {} gen {})",
            r.slot,
            r.gen
        );
        slot.tcb.as_mut().expect("empty thread slot")
    }

    /// Number of live threads.
    pub fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.tcb.is_some()).count()
    }
}
