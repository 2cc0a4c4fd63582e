//! Lifecycle management for the relayer's long running tasks.
//!
//! Critical tasks are spawned through a [`TaskExecutor`]; a failure or panic in any of them
//! brings the whole process down through [`TaskManager::monitor`], while a shutdown signal lets
//! tasks holding a [`ShutdownGuard`] wind down gracefully.

mod manager;
mod pending_tasks;
mod print_panic;
mod shutdown;

pub use manager::{TaskError, TaskExecutor, TaskManager};
pub use pending_tasks::{PendingTasks, WaitForZero};
pub use print_panic::set_panic_hook;
pub use shutdown::{ShutdownGuard, ShutdownSignal};
