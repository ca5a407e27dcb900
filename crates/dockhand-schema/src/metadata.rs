use crate::name::MachineName;
use crate::options::HostOptions;
use serde::{Deserialize, Serialize};

/// Current metadata format version. Records written by a newer version are
/// refused on load.
pub const CONFIG_VERSION: u32 = 3;

/// Persisted description of one machine: enough to rebuild its driver and
/// options in a later session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MachineMetadata {
    pub config_version: u32,
    pub name: MachineName,
    pub driver_name: String,
    /// Driver-specific configuration, opaque to everything but the driver.
    #[serde(default)]
    pub driver: serde_json::Value,
    #[serde(default)]
    pub host_options: HostOptions,
    pub created_at: String,
    pub updated_at: String,
    /// blake3 checksum for integrity verification. `None` for legacy records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}
