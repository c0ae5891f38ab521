//! Candidate file listing for a mod root
use crate::hcl_documents::LoadError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};

/// Extension of mod declaration files
pub const MOD_DATA_EXTENSION: &str = "sp";
/// Extension of files turned into pseudo query resources
pub const SQL_EXTENSION: &str = "sql";
/// Name of the file declaring the mod block
pub const MOD_FILE_NAME: &str = "mod.sp";

/// Hidden files and directories are never loaded
pub const DEFAULT_EXCLUSIONS: [&str; 2] = [".*", "**/.*"];

/// Which files below a root directory are candidates for loading
#[derive(Debug, Clone, derive_new::new)]
pub struct ListOptions {
    /// glob patterns matched against the path relative to the root
    pub include: Vec<String>,
    /// glob patterns matched against the path relative to the root and each of its parent directories
    pub exclude: Vec<String>,
    /// descend into sub directories
    pub recursive: bool,
}

impl ListOptions {
    /// Options matching files with any of the given extensions
    pub fn for_extensions(extensions: &[&str], recursive: bool) -> Self {
        Self::new(
            extensions.iter().map(|ext| format!("**/*.{ext}")).collect(),
            DEFAULT_EXCLUSIONS.iter().map(|s| s.to_string()).collect(),
            recursive,
        )
    }

    pub fn with_exclusions(mut self, exclusions: impl IntoIterator<Item = String>) -> Self {
        self.exclude.extend(exclusions);
        self
    }

    pub fn matcher(&self) -> Result<FileMatcher, LoadError> {
        Ok(FileMatcher {
            include: build_glob_set(&self.include)?,
            exclude: build_glob_set(&self.exclude)?,
        })
    }

    /// Lists matching files, sorted by path
    pub fn list_files(&self, root: &Path) -> Result<Vec<PathBuf>, LoadError> {
        let matcher = self.matcher()?;
        let max_depth = if self.recursive { usize::MAX } else { 1 };

        let mut files = vec![];
        let walker = walkdir::WalkDir::new(root)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry
                        .path()
                        .strip_prefix(root)
                        .map(|relative| matcher.is_excluded(relative))
                        .unwrap_or(false)
            });

        for entry in walker {
            let entry = entry.map_err(|source| LoadError::ListFailed {
                path: root.to_owned(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            if matcher.is_match(relative) {
                files.push(entry.path().to_owned());
            }
        }

        files.sort();
        tracing::debug!(root=%root.display(), count = files.len(), "listed files");
        Ok(files)
    }
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet, LoadError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| LoadError::InvalidPattern {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| LoadError::InvalidPattern {
        pattern: patterns.join(","),
        source,
    })
}

/// Compiled include/exclude patterns
#[derive(Debug, Clone)]
pub struct FileMatcher {
    include: GlobSet,
    exclude: GlobSet,
}

impl FileMatcher {
    /// `relative` is a path relative to the listing root
    pub fn is_match(&self, relative: &Path) -> bool {
        self.include.is_match(relative) && !self.is_excluded(relative)
    }

    pub fn is_excluded(&self, relative: &Path) -> bool {
        self.exclude.is_match(relative)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    fn names(root: &Path, files: Vec<PathBuf>) -> Vec<String> {
        files
            .into_iter()
            .map(|f| f.strip_prefix(root).unwrap().display().to_string())
            .collect()
    }

    #[test]
    fn flat_listing_ignores_sub_directories() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.sp");
        touch(dir.path(), "a.sp");
        touch(dir.path(), "notes.md");
        touch(dir.path(), "nested/c.sp");

        let options = ListOptions::for_extensions(&[MOD_DATA_EXTENSION], false);
        let files = options.list_files(dir.path()).unwrap();

        assert_eq!(names(dir.path(), files), vec!["a.sp", "b.sp"]);
    }

    #[test]
    fn recursive_listing_skips_hidden_and_excluded() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.sp");
        touch(dir.path(), "nested/c.sp");
        touch(dir.path(), ".hidden/d.sp");
        touch(dir.path(), "skip/e.sp");

        let options = ListOptions::for_extensions(&[MOD_DATA_EXTENSION], true)
            .with_exclusions(["skip".to_string()]);
        let files = options.list_files(dir.path()).unwrap();

        assert_eq!(
            names(dir.path(), files),
            vec!["a.sp", &format!("nested{}c.sp", std::path::MAIN_SEPARATOR)]
        );
    }
}
