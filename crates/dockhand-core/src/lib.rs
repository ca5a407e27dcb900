//! Lifecycle orchestration for dockhand machines.
//!
//! This crate ties drivers, provisioners, and the metadata store together
//! into `Machine`, the per-machine API for start, stop, kill, restart,
//! upgrade and credential re-provisioning. Every transition is guarded
//! against redundant dispatch and confirmed by polling the driver until the
//! target state is observed or the poll budget runs out.

pub mod concurrency;
pub mod lifecycle;
pub mod machine;
pub mod poll;
pub mod version;

pub use concurrency::MachineLock;
pub use lifecycle::{guard_transition, machine_in_state, run_action_for_state};
pub use machine::{Machine, ENGINE_PACKAGE, ENGINE_SERVICE};
pub use poll::{wait_for, wait_for_specific, PollError, PollPolicy};
pub use version::{HttpVersionProbe, SshVersionProbe, VersionProbe};

use dockhand_driver::MachineState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("machine \"{name}\" is already {state}")]
    AlreadyInState { name: String, state: MachineState },
    #[error("machine \"{0}\" must be running to upgrade")]
    NotRunning(String),
    #[error("invalid machine name: {0}")]
    InvalidName(String),
    #[error("timed out waiting for machine state: {0}")]
    Timeout(#[from] PollError),
    #[error(transparent)]
    Driver(#[from] dockhand_driver::DriverError),
    #[error(transparent)]
    Provision(#[from] dockhand_provision::ProvisionError),
    #[error("store error: {0}")]
    Store(#[from] dockhand_store::StoreError),
    #[error(transparent)]
    Schema(#[from] dockhand_schema::SchemaError),
    #[error("engine version query failed: {0}")]
    Version(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
