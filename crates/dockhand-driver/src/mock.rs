use crate::driver::Driver;
use crate::state::MachineState;
use crate::DriverError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Mechanical actions whose outcome can be scripted on a [`MockDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockAction {
    Start,
    Stop,
    Kill,
}

/// One recorded call against a [`MockDriver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    GetState,
    Start,
    Stop,
    Kill,
    GetSshHostname,
    GetSshPort,
    GetUrl,
    RunSshCommand(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MockConfig {
    machine_name: String,
    #[serde(default)]
    state: MachineState,
    #[serde(default)]
    settle_polls: u32,
    #[serde(default = "default_url")]
    url: String,
    #[serde(default = "default_ssh_hostname")]
    ssh_hostname: String,
    #[serde(default = "default_ssh_port")]
    ssh_port: u16,
    #[serde(default = "default_ssh_username")]
    ssh_username: String,
    #[serde(default)]
    ssh_key_path: String,
}

fn default_url() -> String {
    "tcp://127.0.0.1:2376".to_owned()
}

fn default_ssh_hostname() -> String {
    "127.0.0.1".to_owned()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_ssh_username() -> String {
    "docker".to_owned()
}

#[derive(Default)]
struct MockInner {
    state: MachineState,
    /// Requested state and the number of queries that will still report the old one.
    pending: Option<(MachineState, u32)>,
    action_failures: HashMap<MockAction, String>,
    state_query_failures: u32,
    hostname_failure: Option<String>,
    port_failure: Option<String>,
    ssh_failure: Option<String>,
    ssh_responses: HashMap<String, String>,
    calls: Vec<DriverCall>,
}

/// In-memory driver with scriptable behaviour.
///
/// Actions succeed immediately, but the requested state only becomes visible
/// after `settle_polls` further state queries, which models backends whose
/// `start`/`stop` return before the transition is observable.
pub struct MockDriver {
    config: MockConfig,
    inner: Mutex<MockInner>,
}

impl MockDriver {
    pub fn new(machine_name: &str) -> Self {
        Self::from_mock_config(MockConfig {
            machine_name: machine_name.to_owned(),
            state: MachineState::Stopped,
            settle_polls: 0,
            url: default_url(),
            ssh_hostname: default_ssh_hostname(),
            ssh_port: default_ssh_port(),
            ssh_username: default_ssh_username(),
            ssh_key_path: String::new(),
        })
    }

    pub fn from_config(config: &serde_json::Value) -> Result<Self, DriverError> {
        let config: MockConfig = serde_json::from_value(config.clone())
            .map_err(|e| DriverError::InvalidConfig(format!("mock driver: {e}")))?;
        Ok(Self::from_mock_config(config))
    }

    fn from_mock_config(config: MockConfig) -> Self {
        let inner = MockInner {
            state: config.state,
            ..MockInner::default()
        };
        Self {
            config,
            inner: Mutex::new(inner),
        }
    }

    #[must_use]
    pub fn with_state(self, state: MachineState) -> Self {
        self.set_state(state);
        self
    }

    #[must_use]
    pub fn with_settle_polls(mut self, polls: u32) -> Self {
        self.config.settle_polls = polls;
        self
    }

    #[must_use]
    pub fn with_url(mut self, url: &str) -> Self {
        url.clone_into(&mut self.config.url);
        self
    }

    #[must_use]
    pub fn with_ssh(mut self, hostname: &str, port: u16, username: &str, key_path: &str) -> Self {
        hostname.clone_into(&mut self.config.ssh_hostname);
        self.config.ssh_port = port;
        username.clone_into(&mut self.config.ssh_username);
        key_path.clone_into(&mut self.config.ssh_key_path);
        self
    }

    #[must_use]
    pub fn with_ssh_response(self, command: &str, output: &str) -> Self {
        self.inner()
            .ssh_responses
            .insert(command.to_owned(), output.to_owned());
        self
    }

    #[must_use]
    pub fn failing_action(self, action: MockAction, reason: &str) -> Self {
        self.fail_action(action, reason);
        self
    }

    #[must_use]
    pub fn failing_state_queries(self, count: u32) -> Self {
        self.inner().state_query_failures = count;
        self
    }

    #[must_use]
    pub fn failing_hostname(self, reason: &str) -> Self {
        self.inner().hostname_failure = Some(reason.to_owned());
        self
    }

    #[must_use]
    pub fn failing_port(self, reason: &str) -> Self {
        self.inner().port_failure = Some(reason.to_owned());
        self
    }

    #[must_use]
    pub fn failing_ssh(self, reason: &str) -> Self {
        self.inner().ssh_failure = Some(reason.to_owned());
        self
    }

    /// Force the observed state, discarding any pending transition. Models a
    /// change made behind the orchestrator's back.
    pub fn set_state(&self, state: MachineState) {
        let mut inner = self.inner();
        inner.state = state;
        inner.pending = None;
    }

    pub fn fail_action(&self, action: MockAction, reason: &str) {
        self.inner()
            .action_failures
            .insert(action, reason.to_owned());
    }

    pub fn clear_failures(&self) {
        let mut inner = self.inner();
        inner.action_failures.clear();
        inner.state_query_failures = 0;
        inner.hostname_failure = None;
        inner.port_failure = None;
        inner.ssh_failure = None;
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.inner().calls.clone()
    }

    pub fn call_count(&self, call: &DriverCall) -> usize {
        self.inner().calls.iter().filter(|c| *c == call).count()
    }

    pub fn clear_calls(&self) {
        self.inner().calls.clear();
    }

    /// Calls other than state queries, in order.
    pub fn actions(&self) -> Vec<DriverCall> {
        self.inner()
            .calls
            .iter()
            .filter(|c| **c != DriverCall::GetState)
            .cloned()
            .collect()
    }

    // A panic inside a test must not hide the call log from later assertions.
    fn inner(&self) -> MutexGuard<'_, MockInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn request(
        &self,
        action: MockAction,
        call: DriverCall,
        target: MachineState,
    ) -> Result<(), DriverError> {
        let mut inner = self.inner();
        inner.calls.push(call);
        if let Some(reason) = inner.action_failures.get(&action) {
            return Err(DriverError::ActionFailed {
                action: format!("{action:?}").to_lowercase(),
                reason: reason.clone(),
            });
        }
        if self.config.settle_polls == 0 {
            inner.state = target;
            inner.pending = None;
        } else {
            inner.pending = Some((target, self.config.settle_polls));
        }
        Ok(())
    }
}

impl Driver for MockDriver {
    fn driver_name(&self) -> &'static str {
        "mock"
    }

    fn machine_name(&self) -> &str {
        &self.config.machine_name
    }

    fn get_state(&self) -> Result<MachineState, DriverError> {
        let mut inner = self.inner();
        inner.calls.push(DriverCall::GetState);
        if inner.state_query_failures > 0 {
            inner.state_query_failures -= 1;
            return Err(DriverError::StateQuery("mock state query failure".to_owned()));
        }
        let pending = inner.pending;
        match pending {
            Some((target, 0)) => {
                inner.state = target;
                inner.pending = None;
            }
            Some((target, remaining)) => inner.pending = Some((target, remaining - 1)),
            None => {}
        }
        Ok(inner.state)
    }

    fn start(&self) -> Result<(), DriverError> {
        self.request(MockAction::Start, DriverCall::Start, MachineState::Running)
    }

    fn stop(&self) -> Result<(), DriverError> {
        self.request(MockAction::Stop, DriverCall::Stop, MachineState::Stopped)
    }

    fn kill(&self) -> Result<(), DriverError> {
        self.request(MockAction::Kill, DriverCall::Kill, MachineState::Stopped)
    }

    fn get_ssh_hostname(&self) -> Result<String, DriverError> {
        let mut inner = self.inner();
        inner.calls.push(DriverCall::GetSshHostname);
        match inner.hostname_failure {
            Some(ref reason) => Err(DriverError::Ssh(reason.clone())),
            None => Ok(self.config.ssh_hostname.clone()),
        }
    }

    fn get_ssh_port(&self) -> Result<u16, DriverError> {
        let mut inner = self.inner();
        inner.calls.push(DriverCall::GetSshPort);
        match inner.port_failure {
            Some(ref reason) => Err(DriverError::Ssh(reason.clone())),
            None => Ok(self.config.ssh_port),
        }
    }

    fn get_ssh_username(&self) -> String {
        self.config.ssh_username.clone()
    }

    fn get_ssh_key_path(&self) -> String {
        self.config.ssh_key_path.clone()
    }

    fn get_url(&self) -> Result<String, DriverError> {
        self.inner().calls.push(DriverCall::GetUrl);
        Ok(self.config.url.clone())
    }

    fn run_ssh_command(&self, command: &str) -> Result<String, DriverError> {
        let mut inner = self.inner();
        inner.calls.push(DriverCall::RunSshCommand(command.to_owned()));
        if let Some(ref reason) = inner.ssh_failure {
            return Err(DriverError::Ssh(reason.clone()));
        }
        Ok(inner.ssh_responses.get(command).cloned().unwrap_or_default())
    }

    fn config(&self) -> Result<serde_json::Value, DriverError> {
        let mut config = self.config.clone();
        config.state = self.inner().state;
        serde_json::to_value(config)
            .map_err(|e| DriverError::InvalidConfig(format!("mock driver: {e}")))
    }
}
