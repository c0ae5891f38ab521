//! The workspace lock file listing installed mod dependencies
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const WORKSPACE_LOCK_FILE: &str = ".mod.cache.json";

/// A dependency mod resolved and installed into the workspace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledMod {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceLock {
    /// installed dependencies keyed by the requiring mod, then by dependency name
    #[serde(default)]
    pub install_cache: BTreeMap<String, BTreeMap<String, InstalledMod>>,
}

impl WorkspaceLock {
    /// Reads the lock file of `workspace`; a workspace without one has an empty lock
    pub fn load(workspace: &Path) -> Result<Self, WorkspaceLockError> {
        let path = workspace.join(WORKSPACE_LOCK_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        tracing::debug!(path=%path.display(), "loading workspace lock");
        let contents =
            std::fs::read_to_string(&path).map_err(|source| WorkspaceLockError::Read {
                path: path.clone(),
                source,
            })?;
        serde_json::from_str(&contents).map_err(|source| WorkspaceLockError::Parse { path, source })
    }

    /// The installed version of the dependency `name`, whichever mod requires it
    pub fn installed(&self, name: &str) -> Option<&InstalledMod> {
        self.install_cache.values().find_map(|deps| deps.get(name))
    }

    pub fn is_empty(&self) -> bool {
        self.install_cache.values().all(BTreeMap::is_empty)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum WorkspaceLockError {
    #[error("failed to read workspace lock {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid workspace lock {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_lock_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let lock = WorkspaceLock::load(dir.path()).unwrap();
        assert!(lock.is_empty());
    }

    #[test]
    fn finds_installed_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(WORKSPACE_LOCK_FILE),
            r#"{
                "install_cache": {
                    "mod.dashboards": {
                        "github.com/acme/mod-common": { "name": "github.com/acme/mod-common", "version": "1.2.0" }
                    }
                }
            }"#,
        )
        .unwrap();

        let lock = WorkspaceLock::load(dir.path()).unwrap();
        assert_eq!(
            lock.installed("github.com/acme/mod-common").map(|m| m.version.as_str()),
            Some("1.2.0")
        );
        assert_eq!(lock.installed("github.com/acme/other"), None);
    }

    #[test]
    fn invalid_lock_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(WORKSPACE_LOCK_FILE), "not json").unwrap();
        assert!(matches!(
            WorkspaceLock::load(dir.path()),
            Err(WorkspaceLockError::Parse { .. })
        ));
    }
}
