//! Error classification, escalating recovery and the retry loop.

pub mod classify;
pub mod coordinator;
pub mod retry;

pub use classify::{classify, ErrorClassification};
pub use coordinator::{decide, RecoveryBudget, RecoveryContext, RecoveryCoordinator, RecoveryLevel};
pub use retry::{RetryExecutor, RetryPolicy};
