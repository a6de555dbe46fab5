//! Runner lifecycle state machine.
//!
//! One [`Controller`] per process. It owns the supervised agent handle, the
//! in-flight job set, the idle and platform-ceiling timers, and the shutdown
//! protocol; collaborators (CI driver, provisioner, supervisor, pre-emption
//! watcher) are injected at construction time.

mod core;
pub use core::{Controller, Deps};

mod jobs;
mod shutdown;
mod signals;
