use crate::actions::{PackageAction, ServiceAction};
use crate::{DetectProvisioner, ProvisionError, Provisioner};
use dockhand_driver::Driver;
use dockhand_schema::{AuthOptions, EngineOptions, SwarmOptions};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One recorded call against a [`MockProvisioner`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionCall {
    Detect(String),
    Package(String, PackageAction),
    Service(String, ServiceAction),
    Provision {
        swarm: SwarmOptions,
        auth: AuthOptions,
        engine: EngineOptions,
    },
}

#[derive(Default)]
struct MockInner {
    calls: Vec<ProvisionCall>,
    detect_failure: Option<String>,
    package_failure: Option<String>,
    service_failure: Option<String>,
    provision_failure: Option<String>,
}

/// Provisioner that records every call. Clones share the same log, so a
/// test can keep one handle while the machine owns another as its detector.
#[derive(Clone, Default)]
pub struct MockProvisioner {
    inner: Arc<Mutex<MockInner>>,
}

impl MockProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failing_detect(self, reason: &str) -> Self {
        self.inner().detect_failure = Some(reason.to_owned());
        self
    }

    #[must_use]
    pub fn failing_package(self, reason: &str) -> Self {
        self.inner().package_failure = Some(reason.to_owned());
        self
    }

    #[must_use]
    pub fn failing_service(self, reason: &str) -> Self {
        self.inner().service_failure = Some(reason.to_owned());
        self
    }

    #[must_use]
    pub fn failing_provision(self, reason: &str) -> Self {
        self.inner().provision_failure = Some(reason.to_owned());
        self
    }

    pub fn calls(&self) -> Vec<ProvisionCall> {
        self.inner().calls.clone()
    }

    fn inner(&self) -> MutexGuard<'_, MockInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(
        &self,
        call: ProvisionCall,
        operation: &str,
        failure: impl Fn(&MockInner) -> Option<String>,
    ) -> Result<(), ProvisionError> {
        let mut inner = self.inner();
        inner.calls.push(call);
        match failure(&inner) {
            Some(reason) => Err(ProvisionError::ActionFailed {
                operation: operation.to_owned(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

impl Provisioner for MockProvisioner {
    fn name(&self) -> &str {
        "mock"
    }

    fn package(&self, name: &str, action: PackageAction) -> Result<(), ProvisionError> {
        self.record(
            ProvisionCall::Package(name.to_owned(), action),
            &format!("package {action} {name}"),
            |i| i.package_failure.clone(),
        )
    }

    fn service(&self, name: &str, action: ServiceAction) -> Result<(), ProvisionError> {
        self.record(
            ProvisionCall::Service(name.to_owned(), action),
            &format!("service {action} {name}"),
            |i| i.service_failure.clone(),
        )
    }

    fn provision(
        &self,
        swarm: &SwarmOptions,
        auth: &AuthOptions,
        engine: &EngineOptions,
    ) -> Result<(), ProvisionError> {
        self.record(
            ProvisionCall::Provision {
                swarm: swarm.clone(),
                auth: auth.clone(),
                engine: engine.clone(),
            },
            "provision",
            |i| i.provision_failure.clone(),
        )
    }
}

impl DetectProvisioner for MockProvisioner {
    fn detect<'d>(
        &self,
        driver: &'d dyn Driver,
    ) -> Result<Box<dyn Provisioner + 'd>, ProvisionError> {
        let mut inner = self.inner();
        inner
            .calls
            .push(ProvisionCall::Detect(driver.machine_name().to_owned()));
        if let Some(ref reason) = inner.detect_failure {
            return Err(ProvisionError::Detection(reason.clone()));
        }
        Ok(Box::new(self.clone()))
    }
}
