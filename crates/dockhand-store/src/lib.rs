//! Machine metadata persistence for dockhand.
//!
//! `StoreLayout` owns the directory structure under the store root and the
//! format version marker. `MachineStore` reads and writes one checksummed
//! `config.json` per machine using atomic temp-file renames.

pub mod layout;
pub mod machines;

pub use layout::{StoreLayout, STORE_FORMAT_VERSION};
pub use machines::MachineStore;

use std::path::Path;
use thiserror::Error;

/// Fsync a directory so that a preceding `rename()` is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("integrity check failed for machine '{name}': expected {expected}, got {actual}")]
    IntegrityFailure {
        name: String,
        expected: String,
        actual: String,
    },
    #[error("machine not found: {0}")]
    MachineNotFound(String),
    #[error("invalid machine name: '{0}'")]
    InvalidName(String),
    #[error("record under '{requested}' belongs to machine '{found}'")]
    NameMismatch { requested: String, found: String },
    #[error("store format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("machine '{name}' uses config version {found}, newest supported is {supported}")]
    UnsupportedConfigVersion {
        name: String,
        found: u32,
        supported: u32,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Schema(#[from] dockhand_schema::SchemaError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display_machine_not_found() {
        let e = StoreError::MachineNotFound("dev".to_owned());
        assert!(e.to_string().contains("dev"));
    }

    #[test]
    fn store_error_display_name_mismatch() {
        let e = StoreError::NameMismatch {
            requested: "web".to_owned(),
            found: "db".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("web"));
        assert!(msg.contains("db"));
    }

    #[test]
    fn store_error_display_unsupported_config_version() {
        let e = StoreError::UnsupportedConfigVersion {
            name: "dev".to_owned(),
            found: 9,
            supported: 3,
        };
        let msg = e.to_string();
        assert!(msg.contains('9'));
        assert!(msg.contains('3'));
    }

    #[test]
    fn store_error_display_integrity_failure() {
        let e = StoreError::IntegrityFailure {
            name: "h".to_owned(),
            expected: "exp".to_owned(),
            actual: "act".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("exp"));
        assert!(msg.contains("act"));
    }
}
