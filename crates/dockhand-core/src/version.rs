//! Engine version queries.
//!
//! The default probe asks the engine CLI on the machine over SSH. The HTTP
//! probe talks to the engine API directly, which only works when the daemon
//! listens without client-certificate verification.

use crate::machine::Machine;
use crate::CoreError;
use std::io::Read;
use tracing::debug;

pub const VERSION_COMMAND: &str = "docker version --format '{{.Server.Version}}'";

/// Reports the engine version running on a machine.
pub trait VersionProbe: Send + Sync {
    fn engine_version(&self, machine: &Machine) -> Result<String, CoreError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SshVersionProbe;

impl VersionProbe for SshVersionProbe {
    fn engine_version(&self, machine: &Machine) -> Result<String, CoreError> {
        let output = machine.run_ssh_command(VERSION_COMMAND)?;
        let version = output.trim();
        if version.is_empty() {
            return Err(CoreError::Version(format!(
                "engine on {} reported no version",
                machine.name()
            )));
        }
        Ok(version.to_owned())
    }
}

/// Queries `GET /version` on the engine endpoint.
pub struct HttpVersionProbe {
    agent: ureq::Agent,
}

impl Default for HttpVersionProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpVersionProbe {
    pub fn new() -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
        }
    }

    fn fetch(&self, url: &str) -> Result<String, CoreError> {
        let resp = match self.agent.get(url).call() {
            Ok(r) => r,
            Err(ureq::Error::StatusCode(code)) => {
                return Err(CoreError::Version(format!("HTTP {code} for {url}")));
            }
            Err(e) => return Err(CoreError::Version(e.to_string())),
        };

        let mut body = String::new();
        resp.into_body()
            .into_reader()
            .read_to_string(&mut body)
            .map_err(|e| CoreError::Version(format!("reading {url}: {e}")))?;

        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| CoreError::Version(format!("decoding {url}: {e}")))?;
        value
            .get("Version")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| CoreError::Version(format!("no Version field in response from {url}")))
    }
}

impl VersionProbe for HttpVersionProbe {
    fn engine_version(&self, machine: &Machine) -> Result<String, CoreError> {
        let url = version_url(&machine.url()?)?;
        debug!("querying engine version at {url}");
        self.fetch(&url)
    }
}

/// Map an engine endpoint such as `tcp://10.0.0.5:2376` to its version
/// resource over plain HTTP.
pub fn version_url(engine_url: &str) -> Result<String, CoreError> {
    let rest = engine_url
        .strip_prefix("tcp://")
        .or_else(|| engine_url.strip_prefix("http://"))
        .ok_or_else(|| CoreError::Version(format!("unsupported engine URL: {engine_url}")))?;
    let authority = rest.trim_end_matches('/');
    if authority.is_empty() {
        return Err(CoreError::Version(format!(
            "engine URL has no address: {engine_url}"
        )));
    }
    Ok(format!("http://{authority}/version"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tcp_endpoint_maps_to_http_version() {
        assert_eq!(
            version_url("tcp://192.168.99.100:2376").unwrap(),
            "http://192.168.99.100:2376/version"
        );
        assert_eq!(
            version_url("http://localhost:2375/").unwrap(),
            "http://localhost:2375/version"
        );
    }

    #[test]
    fn unsupported_endpoints_are_rejected() {
        assert!(version_url("unix:///var/run/docker.sock").is_err());
        assert!(version_url("tcp://").is_err());
        assert!(version_url("").is_err());
    }
}
