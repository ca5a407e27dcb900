//! OS-level provisioning for dockhand machines.
//!
//! A `Provisioner` manages packages and services on one machine and
//! (re-)materializes the engine configuration and TLS setup. Which
//! provisioner applies is decided at runtime by a `DetectProvisioner`,
//! normally the `ProvisionerRegistry`, which inspects `/etc/os-release` over
//! SSH and picks the first compatible factory.

pub mod actions;
pub mod generic;
pub mod mock;
pub mod os_release;
pub mod registry;

pub use actions::{PackageAction, ServiceAction};
pub use generic::{GenericLinuxFactory, GenericLinuxProvisioner, PackageManager};
pub use mock::{MockProvisioner, ProvisionCall};
pub use os_release::OsRelease;
pub use registry::{ProvisionerFactory, ProvisionerRegistry};

use dockhand_driver::{Driver, DriverError};
use dockhand_schema::{AuthOptions, EngineOptions, SwarmOptions};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("provisioner detection failed: {0}")]
    Detection(String),
    #[error("no provisioner is compatible with host OS '{0}'")]
    NoCompatibleProvisioner(String),
    #[error("{operation} failed: {reason}")]
    ActionFailed { operation: String, reason: String },
    #[error("{0} is not supported by this provisioner")]
    Unsupported(String),
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
}

/// Package, service, and provisioning operations for one machine.
pub trait Provisioner {
    fn name(&self) -> &str;

    fn package(&self, name: &str, action: PackageAction) -> Result<(), ProvisionError>;

    fn service(&self, name: &str, action: ServiceAction) -> Result<(), ProvisionError>;

    /// Bring the engine to the configuration described by the options. Also
    /// the path used to re-apply TLS material on an existing machine.
    fn provision(
        &self,
        swarm: &SwarmOptions,
        auth: &AuthOptions,
        engine: &EngineOptions,
    ) -> Result<(), ProvisionError>;
}

/// Picks the provisioner for a machine.
pub trait DetectProvisioner: Send + Sync {
    fn detect<'d>(
        &self,
        driver: &'d dyn Driver,
    ) -> Result<Box<dyn Provisioner + 'd>, ProvisionError>;
}
