use crate::generic::GenericLinuxFactory;
use crate::os_release::OsRelease;
use crate::{DetectProvisioner, ProvisionError, Provisioner};
use dockhand_driver::Driver;
use tracing::debug;

const OS_RELEASE_COMMAND: &str = "cat /etc/os-release";

/// Builds provisioners for the operating systems it recognises.
pub trait ProvisionerFactory: Send + Sync {
    fn name(&self) -> &str;

    fn compatible_with(&self, release: &OsRelease) -> bool;

    fn create<'d>(&self, driver: &'d dyn Driver, release: &OsRelease)
        -> Box<dyn Provisioner + 'd>;
}

/// Detects a provisioner by reading `/etc/os-release` on the machine and
/// asking each registered factory whether it applies.
pub struct ProvisionerRegistry {
    factories: Vec<Box<dyn ProvisionerFactory>>,
}

impl Default for ProvisionerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ProvisionerRegistry {
    pub fn empty() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(GenericLinuxFactory));
        registry
    }

    /// Add a factory. Later registrations are consulted first, so specific
    /// provisioners can shadow the generic one.
    pub fn register(&mut self, factory: Box<dyn ProvisionerFactory>) {
        self.factories.insert(0, factory);
    }

    pub fn factory_names(&self) -> Vec<&str> {
        self.factories.iter().map(|f| f.name()).collect()
    }
}

impl DetectProvisioner for ProvisionerRegistry {
    fn detect<'d>(
        &self,
        driver: &'d dyn Driver,
    ) -> Result<Box<dyn Provisioner + 'd>, ProvisionError> {
        debug!("detecting provisioner for {}", driver.machine_name());
        let content = driver
            .run_ssh_command(OS_RELEASE_COMMAND)
            .map_err(|e| ProvisionError::Detection(format!("reading os-release: {e}")))?;
        let release = OsRelease::parse(&content);
        if release.id.is_empty() {
            return Err(ProvisionError::Detection(
                "os-release did not contain an ID".to_owned(),
            ));
        }

        for factory in &self.factories {
            if factory.compatible_with(&release) {
                debug!(
                    "using {} provisioner for {} ({})",
                    factory.name(),
                    driver.machine_name(),
                    release.id
                );
                return Ok(factory.create(driver, &release));
            }
        }

        Err(ProvisionError::NoCompatibleProvisioner(release.id))
    }
}
