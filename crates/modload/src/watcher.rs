//! File watching for live reload
//!
//! A thin wrapper around [notify]: events are filtered through the same include and exclude patterns that
//! select the files of a load, so only changes to files that could affect the mod trigger the callback.
use crate::hcl_documents::LoadError;
use crate::listing::{FileMatcher, ListOptions};
use notify::{EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum WatchError {
    #[error("failed to watch {}", path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    #[error(transparent)]
    Pattern(#[from] LoadError),
}

/// Watches a root folder until dropped
pub struct FileWatcher {
    root: PathBuf,
    _watcher: notify::RecommendedWatcher,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher").field("root", &self.root).finish()
    }
}

impl FileWatcher {
    /// Starts watching `root`; `on_change` is called from the watcher thread with the changed files
    pub fn new<F>(root: &Path, options: &ListOptions, on_change: F) -> Result<Self, WatchError>
    where
        F: Fn(Vec<PathBuf>) + Send + 'static,
    {
        let root = root.canonicalize().map_err(|source| WatchError::Watch {
            path: root.to_owned(),
            source: notify::Error::io(source),
        })?;
        let filter = ChangeFilter {
            root: root.clone(),
            matcher: options.matcher()?,
            recursive: options.recursive,
        };

        let mut watcher =
            notify::recommended_watcher(move |event: notify::Result<notify::Event>| match event {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }
                    let changed = filter.relevant(&event.paths);
                    if !changed.is_empty() {
                        tracing::debug!(?changed, "watched files changed");
                        on_change(changed);
                    }
                }
                Err(err) => tracing::warn!(%err, "file watcher error"),
            })
            .map_err(|source| WatchError::Watch {
                path: root.clone(),
                source,
            })?;

        let mode = if options.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(&root, mode)
            .map_err(|source| WatchError::Watch {
                path: root.clone(),
                source,
            })?;
        tracing::info!(root = %root.display(), recursive = options.recursive, "watching files");

        Ok(Self {
            root,
            _watcher: watcher,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

struct ChangeFilter {
    root: PathBuf,
    matcher: FileMatcher,
    recursive: bool,
}

impl ChangeFilter {
    /// Paths below the root that a load would pick up
    fn relevant(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        paths
            .iter()
            .filter(|path| {
                let Ok(relative) = path.strip_prefix(&self.root) else {
                    return false;
                };
                if !self.recursive && relative.components().count() > 1 {
                    return false;
                }
                // every parent directory is checked as well, like the listing does
                let excluded = relative
                    .ancestors()
                    .filter(|a| !a.as_os_str().is_empty())
                    .any(|a| self.matcher.is_excluded(a));
                !excluded && self.matcher.is_match(relative)
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::listing::MOD_DATA_EXTENSION;
    use pretty_assertions::assert_eq;

    fn filter(recursive: bool) -> ChangeFilter {
        let options = ListOptions::for_extensions(&[MOD_DATA_EXTENSION, "sql"], recursive)
            .with_exclusions(["vendor".to_string()]);
        ChangeFilter {
            root: PathBuf::from("/ws"),
            matcher: options.matcher().unwrap(),
            recursive,
        }
    }

    #[test]
    fn only_loadable_files_are_relevant() {
        let paths = [
            "/ws/a.sp",
            "/ws/notes.md",
            "/ws/.hidden.sp",
            "/ws/nested/b.sql",
            "/ws/vendor/c.sp",
            "/elsewhere/d.sp",
        ]
        .map(PathBuf::from);

        assert_eq!(
            filter(true).relevant(&paths),
            vec![PathBuf::from("/ws/a.sp"), PathBuf::from("/ws/nested/b.sql")]
        );
        assert_eq!(filter(false).relevant(&paths), vec![PathBuf::from("/ws/a.sp")]);
    }
}
