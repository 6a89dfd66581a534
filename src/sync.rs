pub(crate) use self::inner::*;

#[cfg(loom)]
mod inner {
    pub(crate) use loom::lazy_static;
    pub(crate) use loom::sync::Mutex;
    pub(crate) mod atomic {
        pub use loom::sync::atomic::*;
        pub use std::sync::atomic::Ordering;
    }
    pub(crate) use loom::thread::yield_now;
    pub(crate) use loom::thread_local;
}

#[cfg(not(loom))]
mod inner {
    #![allow(dead_code)]
    pub(crate) use lazy_static::lazy_static;
    pub(crate) use std::sync::{atomic, Mutex};
    pub(crate) use std::thread::yield_now;
    pub(crate) use std::thread_local;
}
