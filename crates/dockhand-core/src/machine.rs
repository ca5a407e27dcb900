use crate::lifecycle::{machine_in_state, run_action_for_state};
use crate::poll::{wait_for_specific, PollPolicy};
use crate::version::{SshVersionProbe, VersionProbe};
use crate::CoreError;
use dockhand_driver::{new_client, select_driver, Driver, MachineState, SshAuth, SshClient};
use dockhand_provision::{DetectProvisioner, PackageAction, ProvisionerRegistry, ServiceAction};
use dockhand_schema::{AuthOptions, HostOptions, MachineMetadata, MachineName, SwarmOptions};
use dockhand_store::MachineStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Package and service name of the container engine on the machine.
pub const ENGINE_PACKAGE: &str = "docker";
pub const ENGINE_SERVICE: &str = "docker";

/// One managed machine: its driver, options, and the collaborators used to
/// provision it.
///
/// Operations on a single machine are not internally synchronized. Callers
/// that can race (threads, or processes sharing a store) should hold a
/// [`crate::MachineLock`] around them.
pub struct Machine {
    name: MachineName,
    config_version: u32,
    driver: Box<dyn Driver>,
    options: HostOptions,
    poll_policy: PollPolicy,
    provisioners: Arc<dyn DetectProvisioner>,
    version_probe: Arc<dyn VersionProbe>,
    created_at: Option<String>,
}

impl Machine {
    pub fn new(
        name: &str,
        driver: Box<dyn Driver>,
        options: HostOptions,
    ) -> Result<Self, CoreError> {
        let name = MachineName::new(name).map_err(|_| CoreError::InvalidName(name.to_owned()))?;
        Ok(Self {
            name,
            config_version: dockhand_schema::CONFIG_VERSION,
            driver,
            options,
            poll_policy: PollPolicy::default(),
            provisioners: Arc::new(ProvisionerRegistry::with_defaults()),
            version_probe: Arc::new(SshVersionProbe),
            created_at: None,
        })
    }

    #[must_use]
    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    #[must_use]
    pub fn with_provisioners(mut self, provisioners: Arc<dyn DetectProvisioner>) -> Self {
        self.provisioners = provisioners;
        self
    }

    #[must_use]
    pub fn with_version_probe(mut self, probe: Arc<dyn VersionProbe>) -> Self {
        self.version_probe = probe;
        self
    }

    /// Rebuild a machine from its persisted record.
    pub fn from_metadata(meta: &MachineMetadata) -> Result<Self, CoreError> {
        let driver = select_driver(&meta.driver_name, &meta.driver)?;
        let mut machine = Self::new(meta.name.as_str(), driver, meta.host_options.clone())?;
        machine.config_version = meta.config_version;
        machine.created_at = Some(meta.created_at.clone());
        Ok(machine)
    }

    /// Snapshot for persistence. Timestamps and checksum are filled in by
    /// the store on write.
    pub fn to_metadata(&self) -> Result<MachineMetadata, CoreError> {
        Ok(MachineMetadata {
            config_version: dockhand_schema::CONFIG_VERSION,
            name: self.name.clone(),
            driver_name: self.driver.driver_name().to_owned(),
            driver: self.driver.config()?,
            host_options: self.options.clone(),
            created_at: self.created_at.clone().unwrap_or_default(),
            updated_at: String::new(),
            checksum: None,
        })
    }

    pub fn save(&self, store: &MachineStore) -> Result<(), CoreError> {
        store.put(&self.to_metadata()?)?;
        Ok(())
    }

    pub fn load(store: &MachineStore, name: &str) -> Result<Self, CoreError> {
        Self::from_metadata(&store.get(name)?)
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Metadata format version the machine was loaded with.
    pub fn config_version(&self) -> u32 {
        self.config_version
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    pub fn driver_name(&self) -> &str {
        self.driver.driver_name()
    }

    pub fn options(&self) -> &HostOptions {
        &self.options
    }

    pub fn auth_options(&self) -> &AuthOptions {
        &self.options.auth
    }

    pub fn poll_policy(&self) -> PollPolicy {
        self.poll_policy
    }

    pub fn state(&self) -> Result<MachineState, CoreError> {
        Ok(self.driver.get_state()?)
    }

    pub fn start(&self) -> Result<(), CoreError> {
        info!("starting {}", self.name);
        self.run_for_state(MachineState::Running, |d| d.start())?;
        info!("{} is running", self.name);
        Ok(())
    }

    pub fn stop(&self) -> Result<(), CoreError> {
        info!("stopping {}", self.name);
        self.run_for_state(MachineState::Stopped, |d| d.stop())?;
        info!("{} stopped", self.name);
        Ok(())
    }

    pub fn kill(&self) -> Result<(), CoreError> {
        info!("killing {}", self.name);
        self.run_for_state(MachineState::Stopped, |d| d.kill())?;
        info!("{} killed", self.name);
        Ok(())
    }

    /// Stop the machine if it is running, then start it again.
    ///
    /// Only the stop phase tolerates `AlreadyInState`; the machine may stop
    /// on its own between the running check and the stop. An
    /// `AlreadyInState` from the start phase is returned to the caller.
    pub fn restart(&self) -> Result<(), CoreError> {
        info!("restarting {}", self.name);

        let running = match machine_in_state(self.driver(), MachineState::Running)() {
            Ok(running) => running,
            Err(e) => {
                warn!("state query for {} failed before restart: {e}", self.name);
                false
            }
        };

        if running {
            match self.stop() {
                Ok(()) => {}
                Err(CoreError::AlreadyInState { .. }) => {
                    debug!("{} stopped before restart could stop it", self.name);
                }
                Err(e) => return Err(e),
            }
            self.wait_for_state(MachineState::Stopped)?;
        }

        self.start()?;
        self.wait_for_state(MachineState::Running)?;
        Ok(())
    }

    /// Upgrade the engine package and restart the engine service. The
    /// machine must be running.
    pub fn upgrade(&self) -> Result<(), CoreError> {
        let state = self.driver.get_state()?;
        if state != MachineState::Running {
            return Err(CoreError::NotRunning(self.name.to_string()));
        }

        let provisioner = self.provisioners.detect(self.driver())?;
        info!("upgrading engine on {} via {}", self.name, provisioner.name());
        provisioner.package(ENGINE_PACKAGE, PackageAction::Upgrade)?;
        info!("restarting engine on {}", self.name);
        provisioner.service(ENGINE_SERVICE, ServiceAction::Restart)?;
        Ok(())
    }

    /// Re-apply TLS material and engine configuration to the machine.
    pub fn configure_auth(&self) -> Result<(), CoreError> {
        let provisioner = self.provisioners.detect(self.driver())?;
        info!("configuring auth on {}", self.name);
        provisioner.provision(
            &SwarmOptions::default(),
            &self.options.auth,
            &self.options.engine,
        )?;
        Ok(())
    }

    pub fn url(&self) -> Result<String, CoreError> {
        Ok(self.driver.get_url()?)
    }

    pub fn docker_version(&self) -> Result<String, CoreError> {
        self.version_probe.engine_version(self)
    }

    pub fn run_ssh_command(&self, command: &str) -> Result<String, CoreError> {
        Ok(self.driver.run_ssh_command(command)?)
    }

    /// Open an SSH session handle using the driver's coordinates.
    pub fn create_ssh_client(&self) -> Result<Box<dyn SshClient>, CoreError> {
        let host = self.driver.get_ssh_hostname()?;
        let port = self.driver.get_ssh_port()?;
        let auth = SshAuth::with_key(self.driver.get_ssh_key_path());
        Ok(new_client(
            &self.driver.get_ssh_username(),
            &host,
            port,
            &auth,
        )?)
    }

    fn run_for_state<F>(&self, desired: MachineState, action: F) -> Result<(), CoreError>
    where
        F: FnOnce(&dyn Driver) -> Result<(), dockhand_driver::DriverError>,
    {
        run_action_for_state(
            self.name(),
            self.driver(),
            desired,
            self.poll_policy,
            action,
        )
    }

    fn wait_for_state(&self, desired: MachineState) -> Result<(), CoreError> {
        wait_for_specific(self.poll_policy, machine_in_state(self.driver(), desired))?;
        Ok(())
    }
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("name", &self.name)
            .field("driver", &self.driver.driver_name())
            .field("config_version", &self.config_version)
            .field("poll_policy", &self.poll_policy)
            .finish_non_exhaustive()
    }
}
