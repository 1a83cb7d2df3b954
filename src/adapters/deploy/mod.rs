//! Deployment adapters.

pub mod file;

pub use file::FileDeployer;
