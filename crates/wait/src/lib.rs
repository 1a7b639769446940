//! Settle wait: block until an asynchronously reconciled resource converges.
//!
//! A [`Waiter`] fetches the resource, returns immediately if the snapshot already
//! reports the target generation as Ready (or NotReady), and otherwise follows a
//! [`WatchSession`] until the Ready condition settles, extra checks pass, or the
//! [`WaitContext`] is cancelled or reaches its deadline.

#![forbid(unsafe_code)]

pub mod checks;
pub mod config;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod session;
pub mod waiter;

pub use checks::{CheckError, CheckPipeline, ConditionCheck, RequireCondition};
pub use config::WaiterConfig;
pub use context::{Interrupt, WaitContext};
pub use error::WaitError;
pub use evaluator::{evaluate, Convergence};
pub use session::WatchSession;
pub use waiter::{WaitState, Waiter};
