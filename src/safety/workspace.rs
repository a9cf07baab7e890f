/// Scratch workspaces for compile and profiling runs.
/// Each run gets a uuid-named directory that is removed on drop.
use crate::config::types::{JudgeError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub struct Workspace {
    run_id: String,
    run_dir: PathBuf,
    source_file: Option<PathBuf>,
    binary_file: Option<PathBuf>,
}

impl Workspace {
    /// Create new workspace for a run
    pub fn new(base_dir: &Path) -> Result<Self> {
        let run_id = Uuid::new_v4().to_string();
        let run_dir = base_dir.join(&run_id);

        fs::create_dir_all(&run_dir).map_err(|e| {
            JudgeError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create workspace directory {}: {}", run_dir.display(), e),
            ))
        })?;

        Ok(Self {
            run_id,
            run_dir,
            source_file: None,
            binary_file: None,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Write the source artifact into the workspace
    pub fn create_source_file(&mut self, extension: &str, content: &[u8]) -> Result<PathBuf> {
        let source_path = self.run_dir.join(format!("source.{}", extension));

        fs::write(&source_path, content).map_err(|e| {
            JudgeError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to write source file {}: {}", source_path.display(), e),
            ))
        })?;

        self.source_file = Some(source_path.clone());
        Ok(source_path)
    }

    pub fn create_binary_path(&mut self, name: &str) -> PathBuf {
        let binary_path = self.run_dir.join(name);
        self.binary_file = Some(binary_path.clone());
        binary_path
    }

    /// Path for an auxiliary file (instrument stats, profiler output).
    pub fn scratch_path(&self, name: &str) -> PathBuf {
        self.run_dir.join(name)
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    pub fn binary_file(&self) -> Option<&Path> {
        self.binary_file.as_deref()
    }

    /// Cleanup workspace (idempotent)
    pub fn cleanup(&self) {
        if self.run_dir.exists() {
            if let Err(e) = fs::remove_dir_all(&self.run_dir) {
                log::warn!("Failed to remove run directory {}: {}", self.run_dir.display(), e);
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Creates workspaces under one base directory
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    base_dir: PathBuf,
}

impl WorkspaceManager {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir).map_err(|e| {
            JudgeError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create workspace base directory {}: {}", base_dir.display(), e),
            ))
        })?;

        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn create_workspace(&self) -> Result<Workspace> {
        Workspace::new(&self.base_dir)
    }
}

/// Directories private to one namespaced run, removed when the run ends.
#[derive(Debug)]
pub struct NamespaceDirs {
    dirs: Vec<PathBuf>,
}

impl NamespaceDirs {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }
}

impl Drop for NamespaceDirs {
    fn drop(&mut self) {
        for dir in &self.dirs {
            match fs::remove_dir_all(dir) {
                Ok(()) => log::debug!("Removed namespace directory {}", dir.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to remove namespace directory {}: {}", dir.display(), e),
            }
        }
    }
}
