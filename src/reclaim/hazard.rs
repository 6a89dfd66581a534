use super::{free_node, Reclaim};
use crate::stack::Node;
use crate::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use crate::sync::yield_now;
use crate::Tid;
use std::fmt;
use std::ptr;

/// Hazard-pointer reclamation.
///
/// The reclaimer owns a fixed table of hazard slots. Before dereferencing a
/// candidate head node, a popper claims a slot, publishes the node's address
/// into it, and re-reads head to confirm the published value is still
/// current: a competing popper cannot have freed a node that was still the
/// head when the publication became visible. After detaching a node, the
/// popper clears its slot and frees the node immediately unless some other
/// slot still publishes its address, in which case the node parks on a
/// pending list that is re-scanned on every later retirement.
///
/// Compared to [`RefCount`](super::RefCount), the retired backlog is bounded
/// by the slot count rather than by contention, at the cost of a table scan
/// per retirement and a table that must be sized to the maximum number of
/// *concurrent* poppers: a popper that finds every slot claimed spins
/// (yielding) until one frees. [`DEFAULT_SLOTS`](Hazard::DEFAULT_SLOTS) is
/// plenty for typical thread counts; use [`with_slots`](Hazard::with_slots)
/// to size the table explicitly.
pub struct Hazard {
    slots: Box<[Slot]>,
    /// Nodes that still had an outstanding hazard when retired, threaded
    /// through their own `next` fields.
    pending: AtomicPtr<()>,
    /// Gauge of nodes on `pending`.
    count: AtomicUsize,
}

/// One hazard slot: the owning thread's ID and the node address it is
/// currently reading.
struct Slot {
    owner: AtomicUsize,
    protected: AtomicPtr<()>,
}

const FREE: usize = std::usize::MAX;

// === impl Hazard ===

impl Hazard {
    /// The slot-table size used by [`Hazard::new`].
    pub const DEFAULT_SLOTS: usize = 64;

    /// Returns a new reclaimer with [`DEFAULT_SLOTS`](Self::DEFAULT_SLOTS)
    /// hazard slots.
    pub fn new() -> Self {
        Self::with_slots(Self::DEFAULT_SLOTS)
    }

    /// Returns a new reclaimer with a table of `slots` hazard slots.
    ///
    /// `slots` bounds the number of *concurrent* poppers the table can serve
    /// without stalling; a pop beyond that spins until a slot frees.
    ///
    /// # Panics
    ///
    /// If `slots` is zero.
    pub fn with_slots(slots: usize) -> Self {
        assert!(slots > 0, "hazard table must have at least one slot");
        let mut table = Vec::with_capacity(slots);
        table.resize_with(slots, Slot::new);
        Self {
            slots: table.into_boxed_slice(),
            pending: AtomicPtr::new(ptr::null_mut()),
            count: AtomicUsize::new(0),
        }
    }

    /// Claims a free slot for the calling thread, spinning until one is
    /// available.
    fn claim(&self) -> usize {
        let tid = Tid::current();
        // a poisoned Tid is usize::MAX, which would alias the FREE sentinel
        let owner = if tid.is_poisoned() {
            FREE - 1
        } else {
            tid.as_usize()
        };
        loop {
            for (idx, slot) in self.slots.iter().enumerate() {
                if slot.owner.load(Ordering::Relaxed) == FREE
                    && slot
                        .owner
                        .compare_exchange(FREE, owner, Ordering::Acquire, Ordering::Relaxed)
                        .is_ok()
                {
                    test_println!("-> claimed slot {}", idx);
                    return idx;
                }
            }
            test_println!("-> hazard table full; spinning");
            yield_now();
        }
    }

    /// Clears and releases a claimed slot.
    fn release(&self, idx: usize) {
        let slot = &self.slots[idx];
        slot.protected.store(ptr::null_mut(), Ordering::SeqCst);
        slot.owner.store(FREE, Ordering::Release);
    }

    /// Returns `true` if any slot currently publishes `node`. Callers have
    /// already cleared their own slot, so no index is skipped.
    fn watched(&self, node: *mut ()) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.protected.load(Ordering::SeqCst) == node)
    }

    /// Pushes a node onto the pending list. Does not touch the gauge;
    /// callers account for what they add.
    fn defer<T>(&self, node: *mut Node<T>) {
        let mut head = self.pending.load(Ordering::Relaxed);
        loop {
            unsafe { (*node).next.store(head as *mut Node<T>, Ordering::Relaxed) };
            match self.pending.compare_exchange_weak(
                head,
                node as *mut (),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                // lost the race!
                Err(actual) => head = actual,
            }
        }
    }

    /// One pass over the pending list: frees every node no slot publishes,
    /// re-defers the rest. Returns the number freed.
    unsafe fn scan<T>(&self) -> usize {
        let mut node = self.pending.swap(ptr::null_mut(), Ordering::SeqCst) as *mut Node<T>;
        let mut freed = 0;
        while !node.is_null() {
            let next = (*node).next.load(Ordering::Relaxed);
            if self.watched(node as *mut ()) {
                self.defer(node);
            } else {
                free_node(node);
                self.count.fetch_sub(1, Ordering::Relaxed);
                freed += 1;
            }
            node = next;
        }
        if freed > 0 {
            test_println!("-> scan freed {}", freed);
        }
        freed
    }
}

impl Reclaim for Hazard {
    /// The claimed slot index.
    type Session = usize;

    fn begin(&self) -> usize {
        self.claim()
    }

    fn protect<T>(&self, session: usize, head: &AtomicPtr<Node<T>>) -> *mut Node<T> {
        let slot = &self.slots[session];
        let mut node = head.load(Ordering::Acquire);
        loop {
            // SeqCst store/load pair: the publication must be totally ordered
            // with the head re-read, and with the detach and slot scan on the
            // retiring side. A published pointer that head no longer refers
            // to may already be freed and must not be returned.
            slot.protected.store(node as *mut (), Ordering::SeqCst);
            let current = head.load(Ordering::SeqCst);
            if current == node {
                return node;
            }
            node = current;
        }
    }

    fn cancel(&self, session: usize) {
        self.release(session);
    }

    unsafe fn retire<T>(&self, session: usize, node: *mut Node<T>) {
        // done reading the node; unpublish before asking who else still is
        self.slots[session]
            .protected
            .store(ptr::null_mut(), Ordering::SeqCst);
        if self.watched(node as *mut ()) {
            self.count.fetch_add(1, Ordering::Relaxed);
            self.defer(node);
            test_println!("-> deferred {:p}", node);
        } else {
            free_node(node);
        }
        // opportunistic pass over earlier deferrals
        self.scan::<T>();
        self.release(session);
    }

    unsafe fn drain<T>(&self) -> usize {
        self.scan::<T>()
    }

    fn retired(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    fn take_retired(&mut self) -> *mut () {
        self.count.store(0, Ordering::Relaxed);
        self.pending.swap(ptr::null_mut(), Ordering::Relaxed)
    }
}

impl Default for Hazard {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Hazard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let claimed = self
            .slots
            .iter()
            .filter(|slot| slot.owner.load(Ordering::Relaxed) != FREE)
            .count();
        f.debug_struct("Hazard")
            .field("slots", &self.slots.len())
            .field("claimed", &claimed)
            .field("retired", &self.count.load(Ordering::Relaxed))
            .finish()
    }
}

// === impl Slot ===

impl Slot {
    fn new() -> Self {
        Self {
            owner: AtomicUsize::new(FREE),
            protected: AtomicPtr::new(ptr::null_mut()),
        }
    }
}
