//! Input markup adapters.
//!
//! A [MarkupFormat] turns source text into a [Document] whose links,
//! images, footnotes and citations are still unresolved reference spans.
//! Adapters stop at syntax: everything that needs knowledge of other
//! documents (or of other parts of the same document) is left for the
//! resolve phase, so a format never looks past the text it was handed.

pub mod md;

use crate::error::WeftError;
use crate::paths::TreePath;
use crate::tree::document::{Document, DocumentTreeRoot};

/// A markup front end producing unresolved document content.
pub trait MarkupFormat {
    /// File suffixes claimed by this format, without the leading dot.
    fn suffixes(&self) -> &[&str];

    /// Parses `source` into the document at `path`. Links, images and
    /// footnotes come out as reference variants; malformed embedded
    /// configuration becomes an invalid block rather than an error.
    fn parse(&self, path: TreePath, source: &str) -> Result<Document, WeftError>;
}

/// Parses `(path, source)` pairs with one format and assembles the virtual
/// tree, creating intermediate trees for every ancestor directory.
pub fn parse_tree(
    format: &dyn MarkupFormat,
    sources: &[(&str, &str)],
) -> Result<DocumentTreeRoot, WeftError> {
    let documents = sources
        .iter()
        .map(|(path, source)| format.parse(TreePath::parse(path), source))
        .collect::<Result<Vec<_>, _>>()?;
    DocumentTreeRoot::from_documents(documents)
}
