use crate::layout::StoreLayout;
use crate::{fsync_dir, StoreError};
use dockhand_schema::{validate_machine_name, MachineMetadata, CONFIG_VERSION};
use std::fs;
use std::io::Write;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Compute the checksum over the record content, excluding the checksum field itself.
fn compute_checksum(meta: &MachineMetadata) -> Result<String, StoreError> {
    let mut copy = meta.clone();
    copy.checksum = None;
    let json = serde_json::to_string_pretty(&copy)?;
    Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
}

/// Names are joined onto the store root, so anything that is not a valid
/// machine name is refused before touching the filesystem.
fn validate_name(name: &str) -> Result<(), StoreError> {
    if validate_machine_name(name) {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_owned()))
    }
}

pub struct MachineStore {
    layout: StoreLayout,
}

impl MachineStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn put(&self, meta: &MachineMetadata) -> Result<(), StoreError> {
        validate_name(&meta.name)?;
        let dir = self.layout.machine_dir(&meta.name);
        fs::create_dir_all(&dir)?;

        let mut stamped = meta.clone();
        stamped.updated_at = chrono::Utc::now().to_rfc3339();
        if stamped.created_at.is_empty() {
            stamped.created_at.clone_from(&stamped.updated_at);
        }
        stamped.checksum = Some(compute_checksum(&stamped)?);
        let content = serde_json::to_string_pretty(&stamped)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.layout.config_file(&meta.name))
            .map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;

        debug!("saved metadata for machine {}", meta.name);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<MachineMetadata, StoreError> {
        validate_name(name)?;
        let path = self.layout.config_file(name);
        if !path.exists() {
            return Err(StoreError::MachineNotFound(name.to_owned()));
        }
        let content = fs::read_to_string(&path)?;
        let meta: MachineMetadata = serde_json::from_str(&content)?;

        if meta.config_version > CONFIG_VERSION {
            return Err(StoreError::UnsupportedConfigVersion {
                name: name.to_owned(),
                found: meta.config_version,
                supported: CONFIG_VERSION,
            });
        }

        // Legacy records carry no checksum and are accepted as-is.
        if let Some(ref expected) = meta.checksum {
            let actual = compute_checksum(&meta)?;
            if actual != *expected {
                return Err(StoreError::IntegrityFailure {
                    name: name.to_owned(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        if meta.name != name {
            return Err(StoreError::NameMismatch {
                requested: name.to_owned(),
                found: meta.name.to_string(),
            });
        }

        Ok(meta)
    }

    pub fn exists(&self, name: &str) -> bool {
        validate_machine_name(name) && self.layout.config_file(name).exists()
    }

    /// Forget a machine. This removes local metadata only; the underlying
    /// resource is left untouched.
    pub fn remove(&self, name: &str) -> Result<(), StoreError> {
        validate_name(name)?;
        let dir = self.layout.machine_dir(name);
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<MachineMetadata>, StoreError> {
        let dir = self.layout.machines_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut results = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let name_str = name.to_str().unwrap_or("");
            if name_str.is_empty() || name_str.starts_with('.') {
                continue;
            }
            match self.get(name_str) {
                Ok(meta) => results.push(meta),
                Err(e) => warn!("skipping unreadable machine entry '{name_str}': {e}"),
            }
        }
        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockhand_schema::{HostOptions, MachineName};

    fn test_store() -> (tempfile::TempDir, MachineStore) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        (dir, MachineStore::new(layout))
    }

    fn sample_meta(name: &str) -> MachineMetadata {
        let mut host_options = HostOptions {
            driver: "mock".to_owned(),
            memory: 1024,
            ..HostOptions::default()
        };
        host_options.engine.labels.push("role=test".to_owned());
        MachineMetadata {
            config_version: CONFIG_VERSION,
            name: MachineName::new(name).unwrap(),
            driver_name: "mock".to_owned(),
            driver: serde_json::json!({ "machine_name": name, "state": "stopped" }),
            host_options,
            created_at: "2025-01-01T00:00:00Z".to_owned(),
            updated_at: "2025-01-01T00:00:00Z".to_owned(),
            checksum: None,
        }
    }

    #[test]
    fn metadata_roundtrip() {
        let (_dir, store) = test_store();
        let meta = sample_meta("dev");
        store.put(&meta).unwrap();

        let retrieved = store.get("dev").unwrap();
        assert_eq!(retrieved.name, meta.name);
        assert_eq!(retrieved.driver, meta.driver);
        assert_eq!(retrieved.host_options, meta.host_options);
        assert_eq!(retrieved.created_at, meta.created_at);
        assert!(retrieved.checksum.is_some(), "put() must embed a checksum");
    }

    #[test]
    fn put_fills_missing_created_at() {
        let (_dir, store) = test_store();
        let mut meta = sample_meta("fresh");
        meta.created_at = String::new();
        store.put(&meta).unwrap();
        let retrieved = store.get("fresh").unwrap();
        assert!(!retrieved.created_at.is_empty());
        assert_eq!(retrieved.created_at, retrieved.updated_at);
    }

    #[test]
    fn tampered_record_fails_integrity() {
        let (_dir, store) = test_store();
        store.put(&sample_meta("dev")).unwrap();

        let path = store.layout().config_file("dev");
        let content = fs::read_to_string(&path).unwrap();
        fs::write(&path, content.replace("\"memory\": 1024", "\"memory\": 4096")).unwrap();

        assert!(matches!(
            store.get("dev"),
            Err(StoreError::IntegrityFailure { .. })
        ));
    }

    #[test]
    fn newer_config_version_is_refused() {
        let (_dir, store) = test_store();
        let mut meta = sample_meta("future");
        meta.config_version = CONFIG_VERSION + 1;
        store.put(&meta).unwrap();
        assert!(matches!(
            store.get("future"),
            Err(StoreError::UnsupportedConfigVersion { .. })
        ));
    }

    #[test]
    fn missing_machine_is_not_found() {
        let (_dir, store) = test_store();
        assert!(matches!(
            store.get("ghost"),
            Err(StoreError::MachineNotFound(_))
        ));
        assert!(!store.exists("ghost"));
    }

    #[test]
    fn list_is_sorted_and_skips_corrupt_entries() {
        let (_dir, store) = test_store();
        store.put(&sample_meta("zeta")).unwrap();
        store.put(&sample_meta("alpha")).unwrap();

        let broken = store.layout().machine_dir("broken");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join("config.json"), "not json").unwrap();

        let names: Vec<String> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|m| m.name.to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn remove_deletes_machine_dir() {
        let (_dir, store) = test_store();
        store.put(&sample_meta("dev")).unwrap();
        assert!(store.exists("dev"));
        store.remove("dev").unwrap();
        assert!(!store.exists("dev"));
        assert!(!store.layout().machine_dir("dev").exists());
        store.remove("dev").unwrap();
    }

    #[test]
    fn traversal_names_are_refused() {
        let (dir, store) = test_store();
        let victim = dir.path().join("victim");
        fs::create_dir_all(&victim).unwrap();
        fs::write(victim.join("config.json"), "{}").unwrap();

        for name in ["..", "../victim", "a/b", "", ".hidden"] {
            assert!(matches!(
                store.get(name),
                Err(StoreError::InvalidName(_))
            ));
            assert!(matches!(
                store.remove(name),
                Err(StoreError::InvalidName(_))
            ));
            assert!(!store.exists(name));
        }

        assert!(victim.join("config.json").exists());
        assert!(dir.path().join("version").exists());
        assert!(store.layout().machines_dir().exists());
    }

    #[test]
    fn record_under_wrong_directory_is_rejected() {
        let (_dir, store) = test_store();
        store.put(&sample_meta("db")).unwrap();

        let web = store.layout().machine_dir("web");
        fs::create_dir_all(&web).unwrap();
        fs::copy(store.layout().config_file("db"), web.join("config.json")).unwrap();

        let err = store.get("web").unwrap_err();
        assert!(matches!(
            err,
            StoreError::NameMismatch { ref requested, ref found }
                if requested == "web" && found == "db"
        ));

        let names: Vec<String> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|m| m.name.to_string())
            .collect();
        assert_eq!(names, vec!["db"]);
    }
}
