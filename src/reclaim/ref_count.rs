use super::{free_chain, free_node, Reclaim};
use crate::stack::Node;
use crate::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::fmt;
use std::ptr;

/// Deferred reference-counted reclamation.
///
/// A shared counter tracks how many threads are inside a pop's unsafe window
/// (from before the first head read until retirement bookkeeping completes).
/// A retiring thread that observes the counter at exactly 1 is the only
/// popper alive at that instant, so no other thread can hold a stale
/// reference to *any* detached node; it claims the entire pending chain and,
/// if the counter confirms nobody arrived in the interim, frees the chain
/// and its own node outright. Any other outcome parks the node(s) on the
/// pending list for a later attempt.
///
/// The quiescent point may never arrive while pops are continuously in
/// flight, in which case the pending list keeps growing until contention
/// subsides, an accepted property of the scheme. Call
/// [`Stack::drain_retired`](crate::Stack::drain_retired) at a quiescent
/// point to release the backlog deterministically.
pub struct RefCount {
    /// Threads currently inside a pop's unsafe window.
    in_pop: AtomicUsize,
    /// Detached nodes awaiting a quiescent point, threaded through their own
    /// `next` fields.
    pending: AtomicPtr<()>,
    /// Gauge of nodes on `pending`.
    count: AtomicUsize,
}

// === impl RefCount ===

impl RefCount {
    /// Returns a new reclaimer with no pending nodes.
    pub fn new() -> Self {
        Self {
            in_pop: AtomicUsize::new(0),
            pending: AtomicPtr::new(ptr::null_mut()),
            count: AtomicUsize::new(0),
        }
    }

    /// Splices the chain `[first, last]` onto the pending list. Does not
    /// touch the gauge; callers account for what they add.
    fn splice<T>(&self, first: *mut Node<T>, last: *mut Node<T>) {
        let mut head = self.pending.load(Ordering::Relaxed);
        loop {
            unsafe { (*last).next.store(head as *mut Node<T>, Ordering::Relaxed) };
            match self.pending.compare_exchange_weak(
                head,
                first as *mut (),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                // lost the race!
                Err(actual) => head = actual,
            }
        }
    }

    /// Splices a whole chain starting at `first`, walking it to find the
    /// tail.
    fn splice_all<T>(&self, first: *mut Node<T>) {
        let mut last = first;
        loop {
            let next = unsafe { (*last).next.load(Ordering::Relaxed) };
            if next.is_null() {
                break;
            }
            last = next;
        }
        self.splice(first, last);
    }
}

impl Reclaim for RefCount {
    type Session = ();

    fn begin(&self) {
        self.in_pop.fetch_add(1, Ordering::SeqCst);
    }

    fn protect<T>(&self, _: (), head: &AtomicPtr<Node<T>>) -> *mut Node<T> {
        // the in-pop counter is the protection; a plain acquire load suffices
        head.load(Ordering::Acquire)
    }

    fn cancel(&self, _: ()) {
        self.in_pop.fetch_sub(1, Ordering::SeqCst);
    }

    unsafe fn retire<T>(&self, _: (), node: *mut Node<T>) {
        if self.in_pop.load(Ordering::SeqCst) == 1 {
            // Sole popper at this instant: claim the whole pending chain.
            // Anything detached before now is unreachable from head, and no
            // other thread is inside a pop to hold a stale reference.
            let claimed = self.pending.swap(ptr::null_mut(), Ordering::SeqCst) as *mut Node<T>;
            if self.in_pop.fetch_sub(1, Ordering::SeqCst) == 1 {
                // nobody arrived in the interim: the chain and our node are dead
                let freed = free_chain(claimed);
                self.count.fetch_sub(freed, Ordering::Relaxed);
                free_node(node);
                test_println!("-> freed {} pending + 1", freed);
            } else {
                // Another popper arrived between the load and the decrement,
                // so the claim is no longer provably safe. Put the chain
                // back, deferring our node along with it.
                (*node).next.store(claimed, Ordering::Relaxed);
                self.count.fetch_add(1, Ordering::Relaxed);
                self.splice_all(node);
                test_println!("-> re-deferred chain");
            }
        } else {
            self.count.fetch_add(1, Ordering::Relaxed);
            self.splice(node, node);
            self.in_pop.fetch_sub(1, Ordering::SeqCst);
            test_println!("-> deferred {:p}", node);
        }
    }

    unsafe fn drain<T>(&self) -> usize {
        // Same claim protocol as a retiring pop, minus the node: enter the
        // counted window, and free the chain only if we were provably alone
        // for the whole claim.
        if self.in_pop.fetch_add(1, Ordering::SeqCst) == 0 {
            let claimed = self.pending.swap(ptr::null_mut(), Ordering::SeqCst) as *mut Node<T>;
            if self.in_pop.fetch_sub(1, Ordering::SeqCst) == 1 {
                let freed = free_chain(claimed);
                self.count.fetch_sub(freed, Ordering::Relaxed);
                return freed;
            }
            if !claimed.is_null() {
                self.splice_all(claimed);
            }
        } else {
            self.in_pop.fetch_sub(1, Ordering::SeqCst);
        }
        0
    }

    fn retired(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    fn take_retired(&mut self) -> *mut () {
        self.count.store(0, Ordering::Relaxed);
        self.pending.swap(ptr::null_mut(), Ordering::Relaxed)
    }
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RefCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefCount")
            .field("in_pop", &self.in_pop.load(Ordering::Relaxed))
            .field("retired", &self.count.load(Ordering::Relaxed))
            .finish()
    }
}
