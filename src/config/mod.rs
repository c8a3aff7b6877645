//! Workspace discovery and configuration.
//!
//! A workspace is a directory containing a `.packbox/` subdirectory
//! with the database, the photo files, and an optional `config.yaml`:
//!
//! ```yaml
//! # .packbox/config.yaml
//! export_dir: ~/exports
//! ```
//!
//! Discovery walks up from the starting directory, git-style, so
//! commands work from anywhere inside a workspace.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PackboxError, Result};
use crate::store::STORE_FILE;

/// Workspace marker directory.
pub const WORKSPACE_DIR: &str = ".packbox";

/// Config file name inside the workspace directory.
pub const CONFIG_FILE: &str = "config.yaml";

/// Photo directory name inside the workspace directory.
pub const PHOTOS_DIR_NAME: &str = "photos";

/// Optional user settings, all defaulted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Default directory for export archives; the current directory
    /// when unset.
    pub export_dir: Option<PathBuf>,
}

/// A resolved workspace root.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Walk up from `start` to the first directory containing
    /// [`WORKSPACE_DIR`].
    #[must_use]
    pub fn discover(start: &Path) -> Option<Self> {
        let mut current = start;
        loop {
            if current.join(WORKSPACE_DIR).is_dir() {
                debug!(root = %current.display(), "workspace found");
                return Some(Self {
                    root: current.to_path_buf(),
                });
            }
            current = current.parent()?;
        }
    }

    /// Discover from the current directory, or fail with a pointer to
    /// `init`.
    ///
    /// # Errors
    ///
    /// Returns `StoreNotFound` when no workspace is in scope.
    pub fn require() -> Result<Self> {
        let cwd = std::env::current_dir()?;
        Self::discover(&cwd).ok_or(PackboxError::StoreNotFound { path: cwd })
    }

    /// Create the workspace directory structure under `root`.
    ///
    /// Existing workspaces are left as they are; `init` is idempotent.
    ///
    /// # Errors
    ///
    /// Returns `Io` on filesystem failure.
    pub fn init(root: &Path) -> Result<Self> {
        let dir = root.join(WORKSPACE_DIR);
        fs::create_dir_all(dir.join(PHOTOS_DIR_NAME))?;

        let config_path = dir.join(CONFIG_FILE);
        if !config_path.exists() {
            let template = "# packbox workspace configuration\n# export_dir: ~/exports\n";
            fs::write(&config_path, template)?;
        }

        let gitignore = dir.join(".gitignore");
        if !gitignore.exists() {
            fs::write(
                &gitignore,
                "*.sqlite\n*.sqlite-wal\n*.sqlite-shm\npending-restore.sqlite\n",
            )?;
        }

        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn dir(&self) -> PathBuf {
        self.root.join(WORKSPACE_DIR)
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.dir().join(STORE_FILE)
    }

    #[must_use]
    pub fn photos_dir(&self) -> PathBuf {
        self.dir().join(PHOTOS_DIR_NAME)
    }

    /// Load `config.yaml`, tolerating its absence.
    ///
    /// # Errors
    ///
    /// Returns `Yaml` for a malformed file.
    pub fn load_config(&self) -> Result<WorkspaceConfig> {
        let path = self.dir().join(CONFIG_FILE);
        if !path.is_file() {
            return Ok(WorkspaceConfig::default());
        }
        let text = fs::read_to_string(&path)?;
        // A comments-only file parses as YAML null.
        let config: Option<WorkspaceConfig> = serde_yaml::from_str(&text)?;
        Ok(config.unwrap_or_default())
    }

    /// Resolve where an export archive should land when the user gave
    /// a bare file name.
    #[must_use]
    pub fn resolve_export_path(&self, config: &WorkspaceConfig, output: &Path) -> PathBuf {
        if output.is_absolute() || output.components().count() > 1 {
            return output.to_path_buf();
        }
        match &config.export_dir {
            Some(dir) => dir.join(output),
            None => output.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_discover() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::init(dir.path()).unwrap();
        assert!(workspace.dir().is_dir());
        assert!(workspace.photos_dir().is_dir());
        assert!(workspace.dir().join(CONFIG_FILE).is_file());

        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        let found = Workspace::discover(&nested).unwrap();
        assert_eq!(found.root(), dir.path());
    }

    #[test]
    fn test_discover_outside_workspace_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Workspace::discover(dir.path()).is_none());
    }

    #[test]
    fn test_init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        Workspace::init(dir.path()).unwrap();
        let config_path = dir.path().join(WORKSPACE_DIR).join(CONFIG_FILE);
        fs::write(&config_path, "export_dir: /tmp/exports\n").unwrap();

        let workspace = Workspace::init(dir.path()).unwrap();
        let config = workspace.load_config().unwrap();
        assert_eq!(config.export_dir.as_deref(), Some(Path::new("/tmp/exports")));
    }

    #[test]
    fn test_empty_config_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::init(dir.path()).unwrap();
        let config = workspace.load_config().unwrap();
        assert!(config.export_dir.is_none());
    }

    #[test]
    fn test_export_path_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::init(dir.path()).unwrap();
        let config = WorkspaceConfig {
            export_dir: Some(PathBuf::from("/exports")),
        };

        assert_eq!(
            workspace.resolve_export_path(&config, Path::new("backup.zip")),
            Path::new("/exports/backup.zip")
        );
        assert_eq!(
            workspace.resolve_export_path(&config, Path::new("/tmp/backup.zip")),
            Path::new("/tmp/backup.zip")
        );
        assert_eq!(
            workspace.resolve_export_path(&WorkspaceConfig::default(), Path::new("backup.zip")),
            Path::new("backup.zip")
        );
    }
}
