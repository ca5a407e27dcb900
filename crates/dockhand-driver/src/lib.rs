//! Driver contract and SSH plumbing for dockhand machines.
//!
//! This crate defines what a virtualization or cloud backend must provide to
//! be managed by dockhand: the `Driver` trait (state query, start/stop/kill,
//! SSH coordinates, engine URL), the observed `MachineState`, an SSH session
//! factory backed by the system `ssh` binary, driver selection from persisted
//! configuration, and an in-memory `MockDriver` for tests.

pub mod driver;
pub mod mock;
pub mod ssh;
pub mod state;

pub use driver::{select_driver, Driver};
pub use mock::{DriverCall, MockAction, MockDriver};
pub use ssh::{new_client, ExternalClient, SshAuth, SshClient};
pub use state::MachineState;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{action} failed: {reason}")]
    ActionFailed { action: String, reason: String },
    #[error("state query failed: {0}")]
    StateQuery(String),
    #[error("ssh error: {0}")]
    Ssh(String),
    #[error("{operation} is not supported by the {driver} driver")]
    NotSupported { driver: String, operation: String },
    #[error("driver '{0}' is not available")]
    DriverNotFound(String),
    #[error("invalid driver configuration: {0}")]
    InvalidConfig(String),
}
