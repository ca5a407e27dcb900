//! Machine names, host options, and metadata records for dockhand.
//!
//! This crate defines the schema layer: validated machine names (`MachineName`),
//! the option bundle attached to every machine (`HostOptions` with its engine,
//! swarm and auth sections), TOML option file parsing, and the `MachineMetadata`
//! record persisted by the store.

pub mod metadata;
pub mod name;
pub mod options;

pub use metadata::{MachineMetadata, CONFIG_VERSION};
pub use name::{validate_machine_name, MachineName};
pub use options::{
    parse_options_file, parse_options_str, AuthOptions, EngineOptions, HostOptions, SwarmOptions,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid machine name '{0}': must start with [a-zA-Z0-9] followed by [a-zA-Z0-9.-]")]
    InvalidName(String),
    #[error("failed to read options file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse options: {0}")]
    ParseToml(#[from] toml::de::Error),
}
