use crate::sync::{lazy_static, thread_local, Mutex};
use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Uniquely identifies a thread that has touched the reclamation machinery.
///
/// IDs are compact and reused: a thread claims the lowest free ID the first
/// time it needs one, and returns it to the registry when it exits, so the
/// ID space stays bounded by the maximum number of *live* threads rather
/// than growing for the lifetime of the process.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub(crate) struct Tid {
    id: usize,
}

struct Registry {
    next: AtomicUsize,
    free: Mutex<Vec<usize>>,
}

lazy_static! {
    static ref REGISTRY: Registry = Registry {
        next: AtomicUsize::new(0),
        free: Mutex::new(Vec::new()),
    };
}

thread_local! {
    static REGISTRATION: Registration = Registration::new();
}

struct Registration(Cell<Option<usize>>);

// === impl Tid ===

impl Tid {
    pub(crate) fn current() -> Self {
        REGISTRATION
            .try_with(Registration::current)
            .unwrap_or_else(|_| Self::poisoned())
    }

    pub(crate) fn as_usize(self) -> usize {
        self.id
    }

    #[cold]
    fn poisoned() -> Self {
        Self {
            id: std::usize::MAX,
        }
    }

    /// Returns true if the local thread ID was accessed while unwinding.
    pub(crate) fn is_poisoned(self) -> bool {
        self.id == std::usize::MAX
    }
}

impl fmt::Debug for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_poisoned() {
            f.debug_tuple("Tid")
                .field(&format_args!("<poisoned>"))
                .finish()
        } else {
            f.debug_tuple("Tid")
                .field(&format_args!("{}", self.id))
                .finish()
        }
    }
}

// === impl Registration ===

impl Registration {
    fn new() -> Self {
        Registration(Cell::new(None))
    }

    fn current(&self) -> Tid {
        if let Some(id) = self.0.get() {
            return Tid { id };
        }
        self.register()
    }

    #[cold]
    fn register(&self) -> Tid {
        let id = REGISTRY
            .free
            .lock()
            .ok()
            .and_then(|mut free| free.pop())
            .unwrap_or_else(|| REGISTRY.next.fetch_add(1, Ordering::AcqRel));
        self.0.set(Some(id));
        Tid { id }
    }
}

// Returning the ID on thread exit keeps the registry dense; a poisoned
// free-list lock just leaks the ID, which is harmless.
impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(id) = self.0.get() {
            if let Ok(mut free) = REGISTRY.free.lock() {
                free.push(id);
            }
        }
    }
}
