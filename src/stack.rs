use crate::reclaim::{self, Reclaim};
use crate::sync::atomic::{AtomicPtr, Ordering};
use std::fmt;
use std::mem::ManuallyDrop;
use std::ptr;

/// A lock-free LIFO stack, generic over its [reclamation strategy].
///
/// Any number of threads may call [`push`] and [`pop`] concurrently through a
/// shared reference. Both operations are lock-free compare-and-swap retry
/// loops on the head pointer: a failed CAS means another thread changed the
/// stack in the meantime, and the operation simply retries. The loops are
/// unbounded; progress relies on the scheduler being fair, not on an explicit
/// retry limit.
///
/// Popping a node does not immediately free it, since another thread may have
/// read the same head pointer and still be about to dereference it. Detached
/// nodes
/// are instead handed to the stack's reclaimer, which frees each node once it
/// can prove no concurrent reader still observes it. The reclaimer is fixed
/// at construction time: [`reclaim::RefCount`] (the default) defers frees to
/// quiescent points of a global in-pop counter, while [`reclaim::Hazard`]
/// tracks per-access published pointers. See the [`reclaim`] module docs for
/// the trade-offs.
///
/// # Examples
///
/// ```
/// use reclaim_stack::Stack;
///
/// let stack = Stack::new();
/// stack.push("hello");
/// stack.push("world");
///
/// assert_eq!(stack.pop(), Some("world"));
/// assert_eq!(stack.pop(), Some("hello"));
/// assert_eq!(stack.pop(), None);
/// ```
///
/// Selecting hazard-pointer reclamation instead:
///
/// ```
/// use reclaim_stack::{reclaim::Hazard, Stack};
///
/// let stack: Stack<u64, Hazard> = Stack::with_reclaimer(Hazard::new());
/// stack.push(1);
/// assert_eq!(stack.pop(), Some(1));
/// ```
///
/// [reclamation strategy]: crate::reclaim
/// [`push`]: Stack::push
/// [`pop`]: Stack::pop
pub struct Stack<T, R: Reclaim = reclaim::RefCount> {
    head: AtomicPtr<Node<T>>,
    reclaim: R,
}

/// A node in a stack's singly-linked chain.
///
/// Nodes are heap-allocated on push and handed to the active [`Reclaim`]
/// implementation when a pop detaches them; they are freed only once the
/// reclaimer has proven that no concurrent reader can still observe them.
/// The `next` pointer is atomic because a detached node's link may be
/// rewritten (to thread it onto a retire list) while a popper that lost the
/// CAS race still holds a stale reference to the node.
pub struct Node<T> {
    pub(crate) value: ManuallyDrop<T>,
    pub(crate) next: AtomicPtr<Node<T>>,
}

// === impl Node ===

impl<T> Node<T> {
    fn alloc(value: T) -> *mut Self {
        Box::into_raw(Box::new(Node {
            value: ManuallyDrop::new(value),
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }
}

// === impl Stack ===

impl<T> Stack<T> {
    /// Returns a new, empty stack using the default [`reclaim::RefCount`]
    /// strategy.
    pub fn new() -> Self {
        Self::with_reclaimer(reclaim::RefCount::new())
    }
}

impl<T, R: Reclaim> Stack<T, R> {
    /// Returns a new, empty stack using the given reclaimer.
    ///
    /// This is how a non-default reclaimer configuration is selected:
    ///
    /// ```
    /// use reclaim_stack::{reclaim::Hazard, Stack};
    ///
    /// let stack: Stack<u64, Hazard> = Stack::with_reclaimer(Hazard::with_slots(256));
    /// stack.push(1);
    /// ```
    pub fn with_reclaimer(reclaim: R) -> Self {
        Stack {
            head: AtomicPtr::new(ptr::null_mut()),
            reclaim,
        }
    }

    /// Pushes `value` onto the top of the stack.
    ///
    /// This allocates; if the allocation fails, the global allocation error
    /// handler aborts the process. There is no other failure path.
    pub fn push(&self, value: T) {
        let node = Node::alloc(value);
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            // not yet shared, so the relaxed store can't race
            unsafe { (*node).next.store(head, Ordering::Relaxed) };
            match self
                .head
                .compare_exchange_weak(head, node, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => {
                    test_println!("-> pushed {:p}", node);
                    return;
                }
                // lost the race!
                Err(actual) => head = actual,
            }
        }
    }

    /// Pops the value on top of the stack, or returns `None` if the stack was
    /// observed empty.
    ///
    /// `None` means the stack was empty at some instant during this call; a
    /// concurrent push that hasn't completed yet is not waited for. This
    /// never blocks.
    pub fn pop(&self) -> Option<T> {
        let session = self.reclaim.begin();
        loop {
            let head = self.reclaim.protect(session, &self.head);
            if head.is_null() {
                self.reclaim.cancel(session);
                return None;
            }
            let next = unsafe { (*head).next.load(Ordering::Relaxed) };
            // SeqCst: the detach must be totally ordered with hazard
            // publication (slot store / head re-read on the reading side,
            // slot scan on this side).
            match self
                .head
                .compare_exchange_weak(head, next, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => {
                    test_println!("-> popped {:p}", head);
                    // This thread detached the node, so the payload is
                    // exclusively ours; the node itself may still be observed
                    // by poppers that lost the race, which is the reclaimer's
                    // problem from here on.
                    let value = unsafe { ManuallyDrop::into_inner(ptr::read(&(*head).value)) };
                    unsafe { self.reclaim.retire(session, head) };
                    return Some(value);
                }
                Err(_) => {}
            }
        }
    }

    /// Returns `true` if the stack contained no values at the observed
    /// instant.
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }

    /// Runs one reclamation pass over nodes whose deallocation was deferred,
    /// returning the number of nodes freed.
    ///
    /// Popped nodes that could not be freed on the spot accumulate inside the
    /// reclaimer until some later pop proves them dead. Once activity on the
    /// stack ceases, that proof may never be attempted again; calling this at
    /// a quiescent point releases the backlog. Calling it concurrently with
    /// other operations is safe and at worst frees nothing.
    pub fn drain_retired(&self) -> usize {
        unsafe { self.reclaim.drain::<T>() }
    }

    /// Returns the number of popped nodes whose deallocation is currently
    /// deferred.
    ///
    /// The count is approximate under concurrent activity; it is exact once
    /// the stack is quiescent. Intended for monitoring and tests.
    pub fn retired(&self) -> usize {
        self.reclaim.retired()
    }
}

impl<T, R: Reclaim + Default> Default for Stack<T, R> {
    fn default() -> Self {
        Self::with_reclaimer(R::default())
    }
}

impl<T, R: Reclaim + fmt::Debug> fmt::Debug for Stack<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field(
                "head",
                &format_args!("{:p}", self.head.load(Ordering::Relaxed)),
            )
            .field("reclaim", &self.reclaim)
            .finish()
    }
}

impl<T, R: Reclaim> Drop for Stack<T, R> {
    fn drop(&mut self) {
        // Exclusive access: no pop is in flight anywhere, so both the live
        // chain and the retired nodes can be freed directly.
        let mut node = self.head.load(Ordering::Relaxed);
        while !node.is_null() {
            let next = unsafe { (*node).next.load(Ordering::Relaxed) };
            unsafe {
                // still live, so the payload has not been taken
                ManuallyDrop::drop(&mut (*node).value);
                reclaim::free_node(node);
            }
            node = next;
        }
        // retired nodes had their payloads moved out when they were popped
        let retired = self.reclaim.take_retired() as *mut Node<T>;
        unsafe {
            reclaim::free_chain(retired);
        }
    }
}

unsafe impl<T: Send, R: Reclaim + Send> Send for Stack<T, R> {}
unsafe impl<T: Send, R: Reclaim + Sync> Sync for Stack<T, R> {}
