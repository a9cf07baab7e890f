//! Content-addressed store of compiled binaries.
//!
//! Keys are SHA-256 over (language, flags, source). Entries are written to a
//! temporary name and renamed into place so concurrent writers never expose a
//! partial binary.

use crate::config::types::{JudgeError, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct BinaryStore {
    root: PathBuf,
}

impl BinaryStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root).map_err(|e| {
            JudgeError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create binary store {}: {}", root.display(), e),
            ))
        })?;
        Ok(Self { root })
    }

    /// Sub-store for one batch job.
    pub fn namespace(&self, name: &str) -> Result<Self> {
        Self::new(self.root.join(name))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn key(language: &str, flags: &[String], source: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(language.as_bytes());
        hasher.update([0u8]);
        for flag in flags {
            hasher.update(flag.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(source.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    pub fn lookup(&self, key: &str) -> Option<PathBuf> {
        let path = self.path_for(key);
        path.is_file().then_some(path)
    }

    /// Copy a freshly built binary into the store.
    pub fn insert(&self, key: &str, built: &Path) -> Result<PathBuf> {
        let target = self.path_for(key);
        let staging = self.root.join(format!(".{}.{}", key, uuid::Uuid::new_v4()));
        fs::copy(built, &staging)?;
        if let Err(e) = fs::rename(&staging, &target) {
            let _ = fs::remove_file(&staging);
            return Err(JudgeError::Io(e));
        }
        Ok(target)
    }
}
