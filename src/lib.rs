//! A lock-free stack with safe memory reclamation.
//!
//! This crate provides [`Stack`], a [Treiber stack]: an atomic singly-linked
//! LIFO shared by any number of threads, where push and pop are
//! compare-and-swap retry loops on the head pointer and nothing ever takes a
//! lock. The interesting part is not the CAS loop but what happens to a node
//! *after* it is popped: another thread may have read the same head pointer
//! an instant earlier and still be about to dereference it, so the node
//! cannot simply be freed. The stack therefore hands every detached node to
//! a reclamation strategy that defers the free until no concurrent reader
//! can still observe the node. Without such a strategy a lock-free stack is
//! unsound, which is why the reclaimer is part of the stack's type.
//!
//! Two strategies are provided in the [`reclaim`] module:
//!
//! - [`reclaim::RefCount`] (the default): a global count of threads inside
//!   pop gates batch frees at quiescent points. Cheap per operation, but the
//!   backlog of unfreed nodes is bounded only by contention.
//! - [`reclaim::Hazard`]: classic [hazard pointers]: each popper publishes
//!   the node it is reading in a shared slot table, and a node is freed as
//!   soon as no slot publishes it. Tighter reclamation, pricier pops.
//!
//! # Examples
//!
//! ```
//! use reclaim_stack::Stack;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let stack = Arc::new(Stack::new());
//!
//! let threads: Vec<_> = (0..4)
//!     .map(|i| {
//!         let stack = stack.clone();
//!         thread::spawn(move || {
//!             stack.push(i);
//!             stack.pop()
//!         })
//!     })
//!     .collect();
//!
//! let mut popped = 0;
//! for thread in threads {
//!     if thread.join().unwrap().is_some() {
//!         popped += 1;
//!     }
//! }
//! // every pop got a value: pushes and pops were balanced
//! assert_eq!(popped, 4);
//! assert!(stack.is_empty());
//! ```
//!
//! # Ordering guarantees
//!
//! Each push and pop is linearizable: it takes effect atomically at some
//! instant between its invocation and return. Values pushed by a single
//! thread are popped in LIFO order *relative to each other*; operations from
//! different threads may interleave in any order consistent with that.
//! [`Stack::pop`] returns `None` when the stack was empty at the observed
//! instant; it never waits for a concurrent push to finish. There is no
//! blocking variant.
//!
//! # Implementation notes
//!
//! Retry loops are unbounded; the stack is lock-free but not wait-free, and
//! freedom from starvation relies on the scheduler being fair. Reclamation
//! is *deferred*, not immediate: nodes whose free could not be proven safe
//! accumulate inside the reclaimer, and [`Stack::drain_retired`] releases
//! the backlog once activity subsides. Dropping the stack frees everything
//! still live or pending.
//!
//! The concurrent internals are model-checked with [`loom`]: running
//! `RUSTFLAGS="--cfg loom" cargo test --lib` swaps every atomic for loom's
//! instrumented versions and runs the models in `src/tests.rs` under
//! exhaustive interleaving.
//!
//! [Treiber stack]: https://en.wikipedia.org/wiki/Treiber_stack
//! [hazard pointers]: https://en.wikipedia.org/wiki/Hazard_pointer
//! [`loom`]: https://docs.rs/loom
#[macro_use]
mod macros;

pub mod reclaim;
mod stack;
pub(crate) mod sync;
mod tid;

pub(crate) use tid::Tid;

pub use self::reclaim::Reclaim;
pub use self::stack::{Node, Stack};
