//! Documents and the multi-document tree.
//!
//! A [DocumentTreeRoot] owns one [DocumentTree] rooted at `/` plus the
//! registry of static (non-markup) documents. Trees nest arbitrarily and
//! hold their members in navigation order, which drives both anonymous
//! reference ordering inside a document and tree-wide autonumbering.

use serde::{Deserialize, Serialize};
use titlecase::titlecase;

use crate::config::Config;
use crate::error::WeftError;
use crate::paths::TreePath;
use crate::tree::element::{
    extract_text, Block, MessageFilter, RuntimeMessage, Span, TargetFormats,
};

/// Basename that marks a document as the title document of its tree.
pub const TITLE_DOCUMENT_NAME: &str = "title";

/// The root container of a single document's block content. May be empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RootElement {
    pub content: Vec<Block>,
}

impl RootElement {
    pub fn new(content: Vec<Block>) -> Self {
        RootElement { content }
    }
}

/// One parsed markup document at a fixed position in the virtual tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub path: TreePath,
    pub content: RootElement,
    #[serde(default)]
    pub config: Config,
}

impl Document {
    pub fn new(path: impl Into<TreePath>, content: Vec<Block>) -> Self {
        Document {
            path: path.into(),
            content: RootElement::new(content),
            config: Config::default(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Content of the [Block::Title] element, once the first header has been
    /// promoted.
    pub fn title_spans(&self) -> Option<&[Span]> {
        self.content.content.iter().find_map(|block| match block {
            Block::Title { content, .. } => Some(content.as_slice()),
            _ => None,
        })
    }

    /// Display title: the promoted title's text, falling back to the
    /// title-cased basename.
    pub fn title_text(&self) -> String {
        match self.title_spans() {
            Some(spans) => extract_text(spans),
            None => name_to_title(self.path.basename()),
        }
    }

    pub fn is_title_document(&self) -> bool {
        self.path.basename() == TITLE_DOCUMENT_NAME
    }

    /// Messages of all invalid elements passing `filter`, in document order.
    /// Fallback content is searched too, since a replaced element may wrap
    /// further invalid ones.
    pub fn runtime_messages(&self, filter: &MessageFilter) -> Vec<&RuntimeMessage> {
        let mut messages = Vec::new();
        for block in &self.content.content {
            block_messages(block, filter, &mut messages);
        }
        messages
    }
}

fn block_messages<'a>(
    block: &'a Block,
    filter: &MessageFilter,
    messages: &mut Vec<&'a RuntimeMessage>,
) {
    if let Block::InvalidBlock {
        message, fallback, ..
    } = block
    {
        if filter.visible(message) {
            messages.push(message);
        }
        block_messages(fallback, filter, messages);
    }
    for child in block.child_blocks() {
        block_messages(child, filter, messages);
    }
    for span in block.child_spans() {
        span_messages(span, filter, messages);
    }
}

fn span_messages<'a>(
    span: &'a Span,
    filter: &MessageFilter,
    messages: &mut Vec<&'a RuntimeMessage>,
) {
    if let Span::InvalidSpan {
        message, fallback, ..
    } = span
    {
        if filter.visible(message) {
            messages.push(message);
        }
        span_messages(fallback, filter, messages);
    }
    for child in span.child_spans() {
        span_messages(child, filter, messages);
    }
}

/// Derives a display title from a file basename.
pub fn name_to_title(name: &str) -> String {
    let spaced: String = name
        .chars()
        .map(|c| if c == '-' || c == '_' { ' ' } else { c })
        .collect();
    titlecase(spaced.trim())
}

/// A member of a [DocumentTree], in navigation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeContent {
    Doc(Document),
    Tree(DocumentTree),
}

impl TreeContent {
    pub fn path(&self) -> &TreePath {
        match self {
            TreeContent::Doc(doc) => &doc.path,
            TreeContent::Tree(tree) => &tree.path,
        }
    }
}

/// A directory-like grouping of documents and nested trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTree {
    pub path: TreePath,
    #[serde(default)]
    pub config: Config,
    pub content: Vec<TreeContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_document: Option<Box<Document>>,
}

impl DocumentTree {
    pub fn empty(path: impl Into<TreePath>) -> Self {
        DocumentTree {
            path: path.into(),
            config: Config::default(),
            content: Vec::new(),
            title_document: None,
        }
    }

    /// All documents in this tree, title document first, depth-first in
    /// navigation order.
    pub fn all_documents(&self) -> Vec<&Document> {
        let mut docs = Vec::new();
        if let Some(title) = &self.title_document {
            docs.push(title.as_ref());
        }
        for member in &self.content {
            match member {
                TreeContent::Doc(doc) => docs.push(doc),
                TreeContent::Tree(tree) => docs.extend(tree.all_documents()),
            }
        }
        docs
    }

    pub fn document(&self, path: &TreePath) -> Option<&Document> {
        self.all_documents()
            .into_iter()
            .find(|doc| doc.path.without_fragment() == path.without_fragment())
    }

    pub fn subtree(&self, path: &TreePath) -> Option<&DocumentTree> {
        if &self.path == path {
            return Some(self);
        }
        self.content.iter().find_map(|member| match member {
            TreeContent::Tree(tree) => tree.subtree(path),
            TreeContent::Doc(_) => None,
        })
    }

    fn subtree_mut(&mut self, path: &TreePath) -> Option<&mut DocumentTree> {
        if &self.path == path {
            return Some(self);
        }
        self.content.iter_mut().find_map(|member| match member {
            TreeContent::Tree(tree) => tree.subtree_mut(path),
            TreeContent::Doc(_) => None,
        })
    }

    /// Rebuilds the tree with every document passed through `f`, preserving
    /// order and nesting.
    pub fn map_documents(self, f: &mut impl FnMut(Document) -> Document) -> Self {
        let title_document = self.title_document.map(|doc| Box::new(f(*doc)));
        let content = self
            .content
            .into_iter()
            .map(|member| match member {
                TreeContent::Doc(doc) => TreeContent::Doc(f(doc)),
                TreeContent::Tree(tree) => TreeContent::Tree(tree.map_documents(f)),
            })
            .collect();
        DocumentTree {
            path: self.path,
            config: self.config,
            content,
            title_document,
        }
    }
}

/// A document copied into the output without markup processing. Still
/// participates in path translation and format validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticDocument {
    pub path: TreePath,
    #[serde(default)]
    pub formats: TargetFormats,
}

impl StaticDocument {
    pub fn new(path: impl Into<TreePath>) -> Self {
        StaticDocument {
            path: path.into(),
            formats: TargetFormats::All,
        }
    }

    pub fn for_formats(path: impl Into<TreePath>, formats: TargetFormats) -> Self {
        StaticDocument {
            path: path.into(),
            formats,
        }
    }
}

/// The whole input tree: the root [DocumentTree] plus static documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTreeRoot {
    pub tree: DocumentTree,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub static_documents: Vec<StaticDocument>,
}

impl DocumentTreeRoot {
    pub fn new(tree: DocumentTree) -> Self {
        DocumentTreeRoot {
            tree,
            static_documents: Vec::new(),
        }
    }

    /// Assembles a root from a flat document list, creating intermediate
    /// trees for every ancestor directory. Documents named
    /// [TITLE_DOCUMENT_NAME] become their tree's title document. Navigation
    /// order follows the input order.
    pub fn from_documents(documents: Vec<Document>) -> Result<Self, WeftError> {
        let mut root = DocumentTree::empty(TreePath::root());
        for doc in documents {
            if doc.path.is_root() {
                return Err(WeftError::Tree(
                    "a document cannot sit at the virtual root itself".to_string(),
                ));
            }
            let parent = doc.path.without_fragment().parent();
            ensure_tree(&mut root, &parent)?;
            let tree = root
                .subtree_mut(&parent)
                .ok_or_else(|| WeftError::Tree(format!("missing tree for {parent}")))?;
            if doc.is_title_document() {
                tree.title_document = Some(Box::new(doc));
            } else {
                tree.content.push(TreeContent::Doc(doc));
            }
        }
        Ok(DocumentTreeRoot::new(root))
    }

    pub fn with_static_documents(mut self, static_documents: Vec<StaticDocument>) -> Self {
        self.static_documents = static_documents;
        self
    }

    /// Root configuration, i.e. the root tree's config.
    pub fn config(&self) -> &Config {
        &self.tree.config
    }

    pub fn set_tree_config(&mut self, path: &TreePath, config: Config) -> Result<(), WeftError> {
        match self.tree.subtree_mut(path) {
            Some(tree) => {
                tree.config = config;
                Ok(())
            }
            None => Err(WeftError::NotFound(format!("tree {path}"))),
        }
    }

    pub fn all_documents(&self) -> Vec<&Document> {
        self.tree.all_documents()
    }

    pub fn document(&self, path: &TreePath) -> Option<&Document> {
        self.tree.document(path)
    }

    pub fn static_document(&self, path: &TreePath) -> Option<&StaticDocument> {
        let wanted = path.without_fragment();
        self.static_documents
            .iter()
            .find(|doc| doc.path.without_fragment() == wanted)
    }

    /// True when the path names a markup or static document in the tree.
    pub fn contains(&self, path: &TreePath) -> bool {
        self.document(path).is_some() || self.static_document(path).is_some()
    }

    pub fn map_documents(self, mut f: impl FnMut(Document) -> Document) -> Self {
        DocumentTreeRoot {
            tree: self.tree.map_documents(&mut f),
            static_documents: self.static_documents,
        }
    }

    /// Pretty-printed JSON rendition of the whole tree. External renderers
    /// and debugging sessions consume the AST through this.
    pub fn to_json_string(&self) -> Result<String, WeftError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Visible messages of every document, in navigation order. Callers
    /// gating a build on rewrite problems check this after the resolve
    /// phases instead of inspecting documents one by one.
    pub fn runtime_messages(
        &self,
        filter: &MessageFilter,
    ) -> Vec<(&TreePath, &RuntimeMessage)> {
        self.all_documents()
            .into_iter()
            .flat_map(|document| {
                document
                    .runtime_messages(filter)
                    .into_iter()
                    .map(move |message| (&document.path, message))
            })
            .collect()
    }
}

fn ensure_tree(root: &mut DocumentTree, path: &TreePath) -> Result<(), WeftError> {
    for ancestor in path.ancestors() {
        if root.subtree(&ancestor).is_some() {
            continue;
        }
        let parent = ancestor.parent();
        let tree = root
            .subtree_mut(&parent)
            .ok_or_else(|| WeftError::Tree(format!("missing tree for {parent}")))?;
        tree.content
            .push(TreeContent::Tree(DocumentTree::empty(ancestor)));
    }
    Ok(())
}

/// Position of a document or tree in depth-first navigation order, used as
/// the prefix for tree-scoped section numbering. The root has no digits.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct TreePosition(Vec<u32>);

impl TreePosition {
    pub fn root() -> Self {
        TreePosition(Vec::new())
    }

    /// Position of the 1-based `index`-th member below `self`.
    pub fn child(&self, index: u32) -> Self {
        let mut digits = self.0.clone();
        digits.push(index);
        TreePosition(digits)
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}
