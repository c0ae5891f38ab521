//! collection of hcl documents ([Body], source path and source text)
//!
//! [HclDocuments] tracks
//! - the source path and the file contents (used to turn spans into line numbers)
//! - the root blocks
//! - the root attributes
//! and defines a numeric index for each. Once added those indices are stable (removal is not possible)
use crate::diagnostics::{Position, SourceRange};
use crate::listing::ListOptions;
use hcl_edit::structure::{Attribute, Block, Body, Structure};
use std::ops::Range;
use std::path::{Path, PathBuf};

#[derive(Default, Debug)]
pub struct HclDocuments {
    sources: Vec<Source>,
    root_attributes: Vec<(usize, Attribute)>,
    root_blocks: Vec<(usize, Block)>,
}

/// A loaded declaration file
#[derive(Debug)]
pub struct Source {
    pub path: Option<PathBuf>,
    pub contents: String,
    line_starts: Vec<usize>,
}

impl Source {
    fn new(path: Option<PathBuf>, contents: String) -> Self {
        let line_starts = std::iter::once(0)
            .chain(contents.match_indices('\n').map(|(idx, _)| idx + 1))
            .collect();
        Self {
            path,
            contents,
            line_starts,
        }
    }

    fn position(&self, byte: usize) -> Position {
        let line = match self.line_starts.binary_search(&byte) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        Position {
            line: line + 1,
            column: byte - self.line_starts[line] + 1,
            byte,
        }
    }
}

impl HclDocuments {
    /// Inserts and indexes an hcl document
    pub fn insert(&mut self, document: Body, path: impl Into<Option<PathBuf>>, contents: String) {
        let source_index = self.sources.len();
        self.sources.push(Source::new(path.into(), contents));

        for structure in document.into_iter() {
            match structure {
                Structure::Block(block) => self.root_blocks.push((source_index, block)),
                Structure::Attribute(attribute) => {
                    self.root_attributes.push((source_index, attribute))
                }
            }
        }
    }

    /// Parses `contents` and inserts the resulting document
    pub fn insert_source(
        &mut self,
        contents: &str,
        path: impl Into<Option<PathBuf>>,
    ) -> Result<(), LoadError> {
        let path = path.into();
        let body = hcl_edit::parser::parse_body(contents).map_err(|source| {
            LoadError::HclParseFailed {
                path: path.clone().unwrap_or_default(),
                source,
            }
        })?;
        self.insert(body, path, contents.to_string());
        Ok(())
    }

    pub fn get_attribute(&self, index: usize) -> SourceAttribute {
        let (source_index, attribute) = &self.root_attributes[index];
        (*source_index, &self.sources[*source_index], attribute)
    }

    pub fn attributes(&self) -> impl Iterator<Item = SourceAttribute> {
        self.root_attributes
            .iter()
            .map(|(source_index, attribute)| {
                (*source_index, &self.sources[*source_index], attribute)
            })
    }

    pub fn get_block(&self, index: usize) -> SourceBlock {
        let (source_index, block) = &self.root_blocks[index];
        (*source_index, &self.sources[*source_index], block)
    }

    /// Root blocks with their stable index
    pub fn blocks(&self) -> impl Iterator<Item = (usize, SourceBlock)> {
        self.root_blocks
            .iter()
            .enumerate()
            .map(|(index, (source_index, block))| {
                (index, (*source_index, &self.sources[*source_index], block))
            })
    }

    pub fn source(&self, index: usize) -> &Source {
        &self.sources[index]
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Converts a byte span inside source `source_index` into a [SourceRange]
    pub fn range(&self, source_index: usize, span: Option<Range<usize>>) -> SourceRange {
        let source = &self.sources[source_index];
        let Some(span) = span else {
            return SourceRange {
                file: source.path.clone(),
                ..Default::default()
            };
        };

        SourceRange {
            file: source.path.clone(),
            start: source.position(span.start),
            end: source.position(span.end),
        }
    }

    /// The source text covered by `span`
    pub fn text(&self, source_index: usize, span: Option<Range<usize>>) -> Option<&str> {
        span.and_then(|span| self.sources[source_index].contents.get(span))
    }
}

impl HclDocuments {
    pub fn load_file(&mut self, file_path: &Path) -> Result<(), LoadError> {
        tracing::info!(path=%file_path.display(), "loading file");

        let file_contents =
            std::fs::read_to_string(file_path).map_err(|source| LoadError::IoError {
                path: file_path.to_owned(),
                source,
            })?;
        self.insert_source(&file_contents, Some(file_path.to_owned()))
    }

    /// Loads every declaration file below `dir_path` selected by `options`
    pub fn load_directory(&mut self, dir_path: &Path, options: &ListOptions) -> Result<(), LoadError> {
        for file_path in options.list_files(dir_path)? {
            self.load_file(&file_path)?;
        }

        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("failed to read {}", path.display())]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to list files in {}", path.display())]
    ListFailed {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("invalid file pattern '{pattern}'")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("unable to parse hcl file {}", path.display())]
    HclParseFailed {
        path: PathBuf,
        #[source]
        source: hcl_edit::parser::Error,
    },
}

/// Utility macro to create [HclDocuments]
///
/// Create from a single document
/// ```
/// # use modload::hcl_documents;
/// hcl_documents!(r#"query "q1" { sql = "select 1" }"#);
/// ```
///
/// Create from multiple documents (path required)
/// ```
/// # use modload::hcl_documents;
/// hcl_documents! {
///   "one.sp" => r#"query "one" { sql = "select 1" }"#,
///   "two.sp" => r#"query "two" { sql = "select 2" }"#
/// };
/// ```
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use modload::hcl_documents;
/// hcl_documents!("not = valid = hcl");
/// ```
#[macro_export]
macro_rules! hcl_documents {
    // single document without source
    { $expr:expr } => {{
        let mut docs = $crate::hcl_documents::HclDocuments::default();
        docs.insert_source($expr, None).expect("body must parse");
        docs
    }};
    // multi document with sources
    { $($source:expr => $expr:expr),+ } => {{
        let mut docs = $crate::hcl_documents::HclDocuments::default();
        $(
            docs.insert_source($expr, Some(std::path::PathBuf::from($source))).expect("body must parse");
        )+

        docs
    }};
}

pub type SourceAttribute<'a> = (usize, &'a Source, &'a Attribute);
pub type SourceBlock<'a> = (usize, &'a Source, &'a Block);

#[cfg(test)]
pub(crate) mod test {
    use pretty_assertions::assert_eq;

    #[test]
    fn iterators() {
        let hcl_documents = hcl_documents! {r#"
        attr_1 = 1
        one two {}
        three four five {}
        attr_2 = 2
        attr_3 = 3
        "#};

        assert_eq!(hcl_documents.attributes().count(), 3);
        assert_eq!(hcl_documents.blocks().count(), 2);
    }

    #[test]
    fn ranges_are_one_based_lines() {
        let hcl_documents = hcl_documents! {
            "a.sp" => "\nquery \"q1\" {\n  sql = \"select 1\"\n}\n"
        };

        let (_, (source_index, _, block)) = hcl_documents.blocks().next().unwrap();
        use hcl_edit::repr::Span;
        let range = hcl_documents.range(source_index, block.span());

        assert_eq!(range.start.line, 2);
        assert_eq!(range.start.column, 1);
        assert_eq!(range.end.line, 4);
        assert_eq!(range.file.as_deref(), Some(std::path::Path::new("a.sp")));
    }
}
