use crate::CoreError;
use dockhand_schema::validate_machine_name;
use dockhand_store::StoreLayout;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Advisory exclusive lock serializing operations on one machine across
/// processes. Released when dropped.
pub struct MachineLock {
    lock_file: File,
    path: PathBuf,
}

impl MachineLock {
    /// Block until the lock at `lock_path` is held.
    pub fn acquire(lock_path: &Path) -> Result<Self, CoreError> {
        let file = open_lock_file(lock_path)?;
        file.lock_exclusive()
            .map_err(|e| CoreError::Io(std::io::Error::new(std::io::ErrorKind::WouldBlock, e)))?;
        debug!("acquired machine lock {}", lock_path.display());
        Ok(Self {
            lock_file: file,
            path: lock_path.to_path_buf(),
        })
    }

    /// Take the lock if nobody else holds it.
    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, CoreError> {
        let file = open_lock_file(lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                lock_file: file,
                path: lock_path.to_path_buf(),
            })),
            Err(_) => Ok(None),
        }
    }

    /// Blocking lock on the machine's lock file inside a store.
    pub fn for_machine(layout: &StoreLayout, name: &str) -> Result<Self, CoreError> {
        if !validate_machine_name(name) {
            return Err(CoreError::InvalidName(name.to_owned()));
        }
        Self::acquire(&layout.lock_file(name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_lock_file(lock_path: &Path) -> Result<File, CoreError> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path)?)
}

impl Drop for MachineLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}
