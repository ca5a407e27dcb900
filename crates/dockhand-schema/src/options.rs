use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Option bundle attached to a machine when it is created or loaded.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HostOptions {
    #[serde(default)]
    pub driver: String,
    /// Memory sizing hint in megabytes.
    #[serde(default)]
    pub memory: u32,
    /// Disk sizing hint in megabytes.
    #[serde(default)]
    pub disk: u32,
    #[serde(default)]
    pub engine: EngineOptions,
    #[serde(default)]
    pub swarm: SwarmOptions,
    #[serde(default)]
    pub auth: AuthOptions,
}

/// Container engine daemon settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineOptions {
    #[serde(default)]
    pub arbitrary_flags: Vec<String>,
    #[serde(default)]
    pub dns: Vec<String>,
    #[serde(default)]
    pub graph_dir: Option<String>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub insecure_registry: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub storage_driver: Option<String>,
    #[serde(default)]
    pub selinux_enabled: bool,
    #[serde(default = "default_true")]
    pub tls_verify: bool,
    #[serde(default)]
    pub registry_mirror: Vec<String>,
    #[serde(default = "default_install_url")]
    pub install_url: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            arbitrary_flags: Vec::new(),
            dns: Vec::new(),
            graph_dir: None,
            env: Vec::new(),
            insecure_registry: Vec::new(),
            labels: Vec::new(),
            log_level: None,
            storage_driver: None,
            selinux_enabled: false,
            tls_verify: true,
            registry_mirror: Vec::new(),
            install_url: default_install_url(),
        }
    }
}

/// Clustering settings. The default value is the empty set of options used
/// when credentials are re-provisioned outside of initial creation.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SwarmOptions {
    #[serde(default)]
    pub is_swarm: bool,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub discovery: String,
    #[serde(default)]
    pub master: bool,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub strategy: String,
    #[serde(default)]
    pub heartbeat: u32,
    #[serde(default)]
    pub overcommit: f32,
    #[serde(default)]
    pub arbitrary_flags: Vec<String>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub is_experimental: bool,
}

/// Locations of the TLS material used to secure the engine endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AuthOptions {
    #[serde(default)]
    pub cert_dir: String,
    #[serde(default)]
    pub ca_cert_path: String,
    #[serde(default)]
    pub ca_private_key_path: String,
    #[serde(default = "default_ca_cert_remote_path")]
    pub ca_cert_remote_path: String,
    #[serde(default)]
    pub server_cert_path: String,
    #[serde(default)]
    pub server_key_path: String,
    #[serde(default = "default_server_cert_remote_path")]
    pub server_cert_remote_path: String,
    #[serde(default = "default_server_key_remote_path")]
    pub server_key_remote_path: String,
    #[serde(default)]
    pub client_cert_path: String,
    #[serde(default)]
    pub client_key_path: String,
    #[serde(default)]
    pub server_cert_sans: Vec<String>,
    #[serde(default)]
    pub store_path: String,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            cert_dir: String::new(),
            ca_cert_path: String::new(),
            ca_private_key_path: String::new(),
            ca_cert_remote_path: default_ca_cert_remote_path(),
            server_cert_path: String::new(),
            server_key_path: String::new(),
            server_cert_remote_path: default_server_cert_remote_path(),
            server_key_remote_path: default_server_key_remote_path(),
            client_cert_path: String::new(),
            client_key_path: String::new(),
            server_cert_sans: Vec::new(),
            store_path: String::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_install_url() -> String {
    "https://get.docker.com".to_owned()
}

fn default_ca_cert_remote_path() -> String {
    "/etc/docker/ca.pem".to_owned()
}

fn default_server_cert_remote_path() -> String {
    "/etc/docker/server.pem".to_owned()
}

fn default_server_key_remote_path() -> String {
    "/etc/docker/server-key.pem".to_owned()
}

pub fn parse_options_str(input: &str) -> Result<HostOptions, SchemaError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_options_file(path: impl AsRef<Path>) -> Result<HostOptions, SchemaError> {
    let content = fs::read_to_string(path)?;
    parse_options_str(&content)
}
