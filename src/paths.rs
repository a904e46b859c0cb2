//! Virtual path algebra for the document tree.
//!
//! Every document and subtree lives at a [TreePath], an absolute path inside
//! the virtual root of the input tree. Markup sources reference each other
//! with [RelativePath]s which only become absolute once we know the location
//! of the referencing document. Both types treat the part of the file name
//! after the *first* dot as the suffix, so `doc.epub.xhtml` has the suffix
//! `epub.xhtml` and the basename `doc`.

use std::borrow::Cow;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::error::WeftError;

/// An absolute path inside the virtual tree, always rooted at `/`.
///
/// The root itself is represented by an empty segment list. A trailing
/// fragment identifies a section or other named target inside the document
/// at the path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct TreePath {
    segments: Vec<String>,
    fragment: Option<String>,
}

impl TreePath {
    pub fn root() -> Self {
        TreePath {
            segments: Vec::new(),
            fragment: None,
        }
    }

    /// Parses an absolute path. The leading `/` is optional so that
    /// configuration values like `target = "doc.md"` still land in the root.
    /// Empty and `.` segments are dropped, `..` pops (never above the root).
    pub fn parse(input: &str) -> Self {
        let (path_part, fragment) = split_fragment(input);
        let mut segments = Vec::new();
        for seg in path_part.split('/') {
            match seg {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                other => segments.push(other.to_string()),
            }
        }
        TreePath { segments, fragment }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments, i.e. the nesting depth below the virtual root.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    pub fn with_fragment(&self, fragment: impl Into<String>) -> Self {
        TreePath {
            segments: self.segments.clone(),
            fragment: Some(fragment.into()),
        }
    }

    pub fn without_fragment(&self) -> Self {
        TreePath {
            segments: self.segments.clone(),
            fragment: None,
        }
    }

    /// Last segment, or the empty string for the root.
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// Name up to the first dot. Hidden names like `.gitignore` keep their
    /// leading dot and count as having no suffix.
    pub fn basename(&self) -> &str {
        split_suffix(self.name()).0
    }

    /// Everything after the first dot of the name.
    pub fn suffix(&self) -> Option<&str> {
        split_suffix(self.name()).1
    }

    /// Replaces the suffix of the last segment, attaching one if the name had
    /// none. The fragment is preserved.
    pub fn with_suffix(&self, suffix: &str) -> Self {
        if self.is_root() {
            return self.clone();
        }
        let mut segments = self.segments.clone();
        let name = segments.pop().unwrap_or_default();
        let base = split_suffix(&name).0.to_string();
        segments.push(format!("{base}.{suffix}"));
        TreePath {
            segments,
            fragment: self.fragment.clone(),
        }
    }

    /// Replaces the basename of the last segment, keeping its suffix.
    pub fn with_basename(&self, basename: &str) -> Self {
        if self.is_root() {
            return self.clone();
        }
        let mut segments = self.segments.clone();
        let name = segments.pop().unwrap_or_default();
        let renamed = match split_suffix(&name).1 {
            Some(suffix) => format!("{basename}.{suffix}"),
            None => basename.to_string(),
        };
        segments.push(renamed);
        TreePath {
            segments,
            fragment: self.fragment.clone(),
        }
    }

    /// Parent tree of this path. The root is its own parent.
    pub fn parent(&self) -> Self {
        let mut segments = self.segments.clone();
        segments.pop();
        TreePath {
            segments,
            fragment: None,
        }
    }

    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.into());
        TreePath {
            segments,
            fragment: None,
        }
    }

    /// Inserts a segment directly below the virtual root, shifting the rest
    /// down. Used to prefix a version segment onto rendered paths.
    pub fn prepend(&self, segment: impl Into<String>) -> Self {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.push(segment.into());
        segments.extend(self.segments.iter().cloned());
        TreePath {
            segments,
            fragment: self.fragment.clone(),
        }
    }

    pub fn is_ancestor_of(&self, other: &TreePath) -> bool {
        self.segments.len() < other.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }

    /// All paths from the root down to this one, root first.
    pub fn ancestors(&self) -> Vec<TreePath> {
        let mut out = Vec::with_capacity(self.segments.len() + 1);
        for end in 0..=self.segments.len() {
            out.push(TreePath {
                segments: self.segments[..end].to_vec(),
                fragment: None,
            });
        }
        out
    }

    /// Re-derives the relative path from `ref_doc` to `self`, where
    /// `ref_doc` is the path of the referencing *document*. Relative paths
    /// in markup are written from the document's parent tree, so
    /// `/a/b.md` seen from `/a/c.md` is just `b.md` while `/b.md` seen from
    /// `/a/c.md` is `../b.md`.
    pub fn relative_to(&self, ref_doc: &TreePath) -> RelativePath {
        if self.segments == ref_doc.segments {
            return RelativePath {
                up: 0,
                segments: Vec::new(),
                fragment: self.fragment.clone(),
            };
        }
        let from_dir = &ref_doc.segments[..ref_doc.segments.len().saturating_sub(1)];
        let common = from_dir
            .iter()
            .zip(self.segments.iter())
            .take_while(|(a, b)| a == b)
            .count()
            // never swallow the target name into the common prefix
            .min(self.segments.len().saturating_sub(1));
        RelativePath {
            up: from_dir.len() - common,
            segments: self.segments[common..].to_vec(),
            fragment: self.fragment.clone(),
        }
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))?;
        if let Some(fragment) = &self.fragment {
            write!(f, "#{fragment}")?;
        }
        Ok(())
    }
}

impl From<&str> for TreePath {
    fn from(input: &str) -> Self {
        TreePath::parse(input)
    }
}

impl From<TreePath> for String {
    fn from(path: TreePath) -> String {
        path.to_string()
    }
}

impl TryFrom<String> for TreePath {
    type Error = WeftError;

    fn try_from(input: String) -> Result<Self, Self::Error> {
        if !input.starts_with('/') {
            return Err(WeftError::Tree(format!(
                "absolute path must start with '/': {input}"
            )));
        }
        Ok(TreePath::parse(&input))
    }
}

/// A path relative to the parent tree of some document, as written in
/// markup sources. `up` counts leading `../` steps that were not cancelled
/// by later segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct RelativePath {
    up: usize,
    segments: Vec<String>,
    fragment: Option<String>,
}

impl RelativePath {
    /// A reference into the current document, carrying only a fragment.
    pub fn current_document(fragment: impl Into<String>) -> Self {
        RelativePath {
            up: 0,
            segments: Vec::new(),
            fragment: Some(fragment.into()),
        }
    }

    /// Parses a relative path, normalizing `.` and interior `..` away.
    pub fn parse(input: &str) -> Self {
        let (path_part, fragment) = split_fragment(input);
        let mut up = 0usize;
        let mut segments: Vec<String> = Vec::new();
        for seg in path_part.split('/') {
            match seg {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        up += 1;
                    }
                }
                other => segments.push(other.to_string()),
            }
        }
        RelativePath {
            up,
            segments,
            fragment,
        }
    }

    pub fn up_levels(&self) -> usize {
        self.up
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// True for references that stay within the current document.
    pub fn is_current_document(&self) -> bool {
        self.up == 0 && self.segments.is_empty()
    }

    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    pub fn suffix(&self) -> Option<&str> {
        split_suffix(self.name()).1
    }

    pub fn with_suffix(&self, suffix: &str) -> Self {
        if self.segments.is_empty() {
            return self.clone();
        }
        let mut segments = self.segments.clone();
        let name = segments.pop().unwrap_or_default();
        let base = split_suffix(&name).0.to_string();
        segments.push(format!("{base}.{suffix}"));
        RelativePath {
            up: self.up,
            segments,
            fragment: self.fragment.clone(),
        }
    }

    pub fn without_fragment(&self) -> Self {
        RelativePath {
            up: self.up,
            segments: self.segments.clone(),
            fragment: None,
        }
    }

    /// Resolves this path against the parent tree of `ref_doc`. Returns
    /// `None` when the `../` steps climb above the virtual root, which marks
    /// the reference as pointing outside the tree.
    pub fn canonicalize(&self, ref_doc: &TreePath) -> Option<TreePath> {
        if self.is_current_document() {
            let mut doc = ref_doc.without_fragment();
            doc.fragment = self.fragment.clone();
            return Some(doc);
        }
        let mut segments: Vec<String> =
            ref_doc.segments[..ref_doc.segments.len().saturating_sub(1)].to_vec();
        for _ in 0..self.up {
            if segments.pop().is_none() {
                return None;
            }
        }
        segments.extend(self.segments.iter().cloned());
        Some(TreePath {
            segments,
            fragment: self.fragment.clone(),
        })
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for _ in 0..self.up {
            write!(f, "../")?;
        }
        write!(f, "{}", self.segments.join("/"))?;
        if let Some(fragment) = &self.fragment {
            write!(f, "#{fragment}")?;
        }
        Ok(())
    }
}

impl From<&str> for RelativePath {
    fn from(input: &str) -> Self {
        RelativePath::parse(input)
    }
}

impl From<RelativePath> for String {
    fn from(path: RelativePath) -> String {
        path.to_string()
    }
}

impl TryFrom<String> for RelativePath {
    type Error = WeftError;

    fn try_from(input: String) -> Result<Self, Self::Error> {
        if input.starts_with('/') {
            return Err(WeftError::Tree(format!(
                "relative path must not start with '/': {input}"
            )));
        }
        Ok(RelativePath::parse(&input))
    }
}

/// A path as written in a link target, before we know whether it is
/// absolute within the virtual tree or relative to the source document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathRef {
    Absolute(TreePath),
    Relative(RelativePath),
}

impl PathRef {
    pub fn parse(input: &str) -> Self {
        if input.starts_with('/') {
            PathRef::Absolute(TreePath::parse(input))
        } else {
            PathRef::Relative(RelativePath::parse(input))
        }
    }

    /// Resolves against the referencing document, `None` when the path
    /// escapes the virtual root.
    pub fn canonicalize(&self, ref_doc: &TreePath) -> Option<TreePath> {
        match self {
            PathRef::Absolute(path) => Some(path.clone()),
            PathRef::Relative(path) => path.canonicalize(ref_doc),
        }
    }

    pub fn fragment(&self) -> Option<&str> {
        match self {
            PathRef::Absolute(path) => path.fragment(),
            PathRef::Relative(path) => path.fragment(),
        }
    }
}

impl fmt::Display for PathRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathRef::Absolute(path) => path.fmt(f),
            PathRef::Relative(path) => path.fmt(f),
        }
    }
}

fn split_fragment(input: &str) -> (&str, Option<String>) {
    match input.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment.to_string())),
        None => (input, None),
    }
}

/// Splits a name at the first dot. A leading dot does not start a suffix.
fn split_suffix(name: &str) -> (&str, Option<&str>) {
    match name[1.min(name.len())..].find('.') {
        Some(idx) => (&name[..idx + 1], Some(&name[idx + 2..])),
        None => (name, None),
    }
}

static DASH_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"-{2,}").expect("valid regex"));

/// Derives a URL-safe slug from header text: NFKD-normalized, combining
/// marks stripped, lowercased, everything but alphanumerics collapsed to
/// single dashes.
pub fn slugify(text: &str) -> String {
    let folded: String = text
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();
    let squeezed: Cow<'_, str> = DASH_RUNS.replace_all(&folded, "-");
    squeezed.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_segments() {
        assert_eq!(TreePath::parse("/a//b/./c.md").to_string(), "/a/b/c.md");
        assert_eq!(TreePath::parse("a/b.md").to_string(), "/a/b.md");
        assert_eq!(TreePath::parse("/a/../b.md").to_string(), "/b.md");
        assert_eq!(TreePath::parse("/../../a.md").to_string(), "/a.md");
        assert_eq!(TreePath::parse("/").to_string(), "/");
        assert!(TreePath::parse("/").is_root());
    }

    #[test]
    fn fragments_round_trip() {
        let path = TreePath::parse("/a/doc.md#intro");
        assert_eq!(path.fragment(), Some("intro"));
        assert_eq!(path.to_string(), "/a/doc.md#intro");
        assert_eq!(path.without_fragment().to_string(), "/a/doc.md");
        assert_eq!(
            TreePath::parse("/a/doc.md").with_fragment("x").to_string(),
            "/a/doc.md#x"
        );
    }

    #[test]
    fn suffix_splits_at_first_dot() {
        let path = TreePath::parse("/dir/doc.epub.xhtml");
        assert_eq!(path.basename(), "doc");
        assert_eq!(path.suffix(), Some("epub.xhtml"));
        assert_eq!(TreePath::parse("/dir/doc").suffix(), None);
        assert_eq!(TreePath::parse("/dir/.gitignore").suffix(), None);
        assert_eq!(TreePath::parse("/dir/.hidden.md").suffix(), Some("md"));
    }

    #[test]
    fn with_suffix_replaces_everything_after_first_dot() {
        assert_eq!(
            TreePath::parse("/a/doc.md").with_suffix("html").to_string(),
            "/a/doc.html"
        );
        assert_eq!(
            TreePath::parse("/a/doc.epub.xhtml")
                .with_suffix("html")
                .to_string(),
            "/a/doc.html"
        );
        assert_eq!(
            TreePath::parse("/a/doc").with_suffix("html").to_string(),
            "/a/doc.html"
        );
        assert_eq!(
            TreePath::parse("/a/doc.md#frag")
                .with_suffix("html")
                .to_string(),
            "/a/doc.html#frag"
        );
    }

    #[test]
    fn parents_and_ancestors() {
        let path = TreePath::parse("/a/b/c.md");
        assert_eq!(path.parent().to_string(), "/a/b");
        assert_eq!(TreePath::root().parent(), TreePath::root());
        assert!(TreePath::parse("/a").is_ancestor_of(&path));
        assert!(!path.is_ancestor_of(&path));
        let ancestors: Vec<String> = path.ancestors().iter().map(|p| p.to_string()).collect();
        assert_eq!(ancestors, ["/", "/a", "/a/b", "/a/b/c.md"]);
    }

    #[test]
    fn relative_parse_counts_up_levels() {
        let rel = RelativePath::parse("../../a/b.md#sec");
        assert_eq!(rel.up_levels(), 2);
        assert_eq!(rel.segments(), ["a", "b.md"]);
        assert_eq!(rel.fragment(), Some("sec"));
        assert_eq!(rel.to_string(), "../../a/b.md#sec");
        assert_eq!(RelativePath::parse("a/../b.md").to_string(), "b.md");
        assert_eq!(RelativePath::parse("a/../../b.md").to_string(), "../b.md");
        assert!(RelativePath::parse("#frag").is_current_document());
    }

    #[test]
    fn canonicalize_resolves_against_document_parent() {
        let doc = TreePath::parse("/tree-1/doc.md");
        assert_eq!(
            RelativePath::parse("other.md").canonicalize(&doc),
            Some(TreePath::parse("/tree-1/other.md"))
        );
        assert_eq!(
            RelativePath::parse("../doc-2.md").canonicalize(&doc),
            Some(TreePath::parse("/doc-2.md"))
        );
        assert_eq!(
            RelativePath::parse("../../doc-2.md").canonicalize(&doc),
            None
        );
        assert_eq!(
            RelativePath::parse("#sec").canonicalize(&doc),
            Some(TreePath::parse("/tree-1/doc.md#sec"))
        );
    }

    #[test]
    fn relative_to_rebases_from_document_parent() {
        let from = TreePath::parse("/tree-1/doc.md");
        assert_eq!(
            TreePath::parse("/tree-1/other.md")
                .relative_to(&from)
                .to_string(),
            "other.md"
        );
        assert_eq!(
            TreePath::parse("/tree-2/doc-5.md")
                .relative_to(&from)
                .to_string(),
            "../tree-2/doc-5.md"
        );
        assert_eq!(
            TreePath::parse("/doc-2.md").relative_to(&from).to_string(),
            "../doc-2.md"
        );
        assert_eq!(
            TreePath::parse("/tree-1/doc.md#sec")
                .relative_to(&from)
                .to_string(),
            "#sec"
        );
        // same directory name as target name must not be swallowed
        assert_eq!(
            TreePath::parse("/a/a")
                .relative_to(&TreePath::parse("/a/b"))
                .to_string(),
            "a"
        );
    }

    #[test]
    fn path_ref_distinguishes_absolute_and_relative() {
        let doc = TreePath::parse("/tree-1/doc.md");
        assert_eq!(
            PathRef::parse("/doc-2.md#sec").canonicalize(&doc),
            Some(TreePath::parse("/doc-2.md#sec"))
        );
        assert_eq!(
            PathRef::parse("doc-2.md").canonicalize(&doc),
            Some(TreePath::parse("/tree-1/doc-2.md"))
        );
    }

    #[test]
    fn serde_uses_display_form() {
        let path = TreePath::parse("/a/b.md#frag");
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"/a/b.md#frag\"");
        let back: TreePath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
        assert!(serde_json::from_str::<TreePath>("\"a/b.md\"").is_err());
        let rel: RelativePath = serde_json::from_str("\"../x.md\"").unwrap();
        assert_eq!(rel.up_levels(), 1);
    }

    #[test]
    fn slugify_folds_unicode_and_squeezes_dashes() {
        assert_eq!(slugify("Section One"), "section-one");
        assert_eq!(slugify("  What's New?  "), "what-s-new");
        assert_eq!(slugify("Café Déjà Vu"), "cafe-deja-vu");
        assert_eq!(slugify("a - b -- c"), "a-b-c");
        assert_eq!(slugify("!!!"), "");
    }
}
