//! Worker adapters.
//!
//! Implementations of the `Worker` port plus the roster that owns them.

pub mod http;
pub mod roster;
pub mod scripted;

pub use http::HttpWorker;
pub use roster::WorkerRoster;
pub use scripted::{ConcurrencyTracker, ScriptedBehavior, ScriptedWorker};
