use crate::ssh::{new_client, SshAuth};
use crate::state::MachineState;
use crate::DriverError;
use tracing::debug;

/// Capabilities a virtualization or cloud backend exposes for one machine.
///
/// Mechanical actions (`start`, `stop`, `kill`) are not required to block
/// until the new state is observable; confirming the transition is the
/// caller's job.
pub trait Driver: Send + Sync {
    fn driver_name(&self) -> &str;

    fn machine_name(&self) -> &str;

    /// Report the current state. Expected to be cheap.
    fn get_state(&self) -> Result<MachineState, DriverError>;

    fn start(&self) -> Result<(), DriverError>;

    /// Graceful shutdown.
    fn stop(&self) -> Result<(), DriverError>;

    /// Forced shutdown.
    fn kill(&self) -> Result<(), DriverError>;

    fn get_ssh_hostname(&self) -> Result<String, DriverError>;

    fn get_ssh_port(&self) -> Result<u16, DriverError>;

    fn get_ssh_username(&self) -> String;

    fn get_ssh_key_path(&self) -> String;

    /// Engine endpoint, e.g. `tcp://192.168.99.100:2376`.
    fn get_url(&self) -> Result<String, DriverError>;

    /// Run a command on the machine over SSH and return its captured output.
    fn run_ssh_command(&self, command: &str) -> Result<String, DriverError> {
        let host = self.get_ssh_hostname()?;
        let port = self.get_ssh_port()?;
        let auth = SshAuth::with_key(self.get_ssh_key_path());
        let client = new_client(&self.get_ssh_username(), &host, port, &auth)?;
        debug!("ssh {}@{host}:{port}: {command}", self.get_ssh_username());
        client.output(command)
    }

    /// Driver-specific configuration, persisted alongside the machine metadata
    /// and handed back to [`select_driver`] on load.
    fn config(&self) -> Result<serde_json::Value, DriverError> {
        Err(DriverError::NotSupported {
            driver: self.driver_name().to_owned(),
            operation: "config export".to_owned(),
        })
    }
}

/// Rebuild a driver from its name and persisted configuration.
pub fn select_driver(
    name: &str,
    config: &serde_json::Value,
) -> Result<Box<dyn Driver>, DriverError> {
    match name {
        "mock" => Ok(Box::new(crate::mock::MockDriver::from_config(config)?)),
        other => Err(DriverError::DriverNotFound(other.to_owned())),
    }
}
