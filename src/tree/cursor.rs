//! Indexed navigation over a [DocumentTreeRoot].
//!
//! Rewrite phases that need a whole-tree view (cross-document reference
//! resolution, link validation) first build a [TreeIndex]: a snapshot of
//! every document's symbol tables, position and configuration, keyed by
//! path. A [DocumentCursor] is then just a cheap value combining the index
//! with one document's identity. Nothing here points back into the tree
//! itself, so the tree can be consumed and rebuilt while an index from its
//! previous state is still alive.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use tracing::warn;
use url::Url;

use crate::config::{
    default_link_precedence, AutonumberConfig, Config, LookupScope, Versions,
};
use crate::error::WeftError;
use crate::paths::TreePath;
use crate::resolve::collect::DocumentTargets;
use crate::tree::document::{
    Document, DocumentTree, DocumentTreeRoot, StaticDocument, TreeContent, TreePosition,
};
use crate::tree::element::TargetFormats;

/// Per-document snapshot inside a [TreeIndex].
#[derive(Debug)]
pub struct DocumentMeta {
    pub position: TreePosition,
    pub config: Config,
    pub targets: DocumentTargets,
}

#[derive(Debug)]
struct TreeMeta {
    config: Config,
    /// Every document under this tree, navigation order, title first.
    documents: Vec<TreePath>,
}

/// Immutable snapshot of a tree's navigable state, keyed by path.
#[derive(Debug)]
pub struct TreeIndex {
    documents: BTreeMap<TreePath, DocumentMeta>,
    trees: BTreeMap<TreePath, TreeMeta>,
    static_documents: Vec<StaticDocument>,
}

impl TreeIndex {
    pub fn new(root: &DocumentTreeRoot) -> Self {
        let mut index = TreeIndex {
            documents: BTreeMap::new(),
            trees: BTreeMap::new(),
            static_documents: root.static_documents.clone(),
        };
        index.index_tree(&root.tree, TreePosition::root());
        index
    }

    fn index_tree(&mut self, tree: &DocumentTree, position: TreePosition) -> Vec<TreePath> {
        let mut documents = Vec::new();
        if let Some(title) = &tree.title_document {
            // a title document shares its tree's position
            self.index_document(title, position.clone());
            documents.push(title.path.without_fragment());
        }
        for (idx, member) in tree.content.iter().enumerate() {
            let member_position = position.child(idx as u32 + 1);
            match member {
                TreeContent::Doc(doc) => {
                    self.index_document(doc, member_position);
                    documents.push(doc.path.without_fragment());
                }
                TreeContent::Tree(subtree) => {
                    documents.extend(self.index_tree(subtree, member_position));
                }
            }
        }
        self.trees.insert(
            tree.path.without_fragment(),
            TreeMeta {
                config: tree.config.clone(),
                documents: documents.clone(),
            },
        );
        documents
    }

    fn index_document(&mut self, document: &Document, position: TreePosition) {
        self.documents.insert(
            document.path.without_fragment(),
            DocumentMeta {
                position,
                config: document.config.clone(),
                targets: DocumentTargets::collect(document),
            },
        );
    }

    pub fn document(&self, path: &TreePath) -> Option<&DocumentMeta> {
        self.documents.get(&path.without_fragment())
    }

    pub fn is_markup_document(&self, path: &TreePath) -> bool {
        self.documents.contains_key(&path.without_fragment())
    }

    pub fn static_document(&self, path: &TreePath) -> Option<&StaticDocument> {
        let wanted = path.without_fragment();
        self.static_documents
            .iter()
            .find(|doc| doc.path.without_fragment() == wanted)
    }

    /// Documents under the tree at `path`, navigation order.
    pub fn tree_documents(&self, path: &TreePath) -> &[TreePath] {
        self.trees
            .get(&path.without_fragment())
            .map(|meta| meta.documents.as_slice())
            .unwrap_or(&[])
    }

    pub fn tree_config(&self, path: &TreePath) -> Option<&Config> {
        self.trees.get(&path.without_fragment()).map(|meta| &meta.config)
    }

    /// First hit of `get` walking the ancestor tree configs of `path`, from
    /// the parent tree up to the root.
    pub fn ancestor_lookup<T>(
        &self,
        path: &TreePath,
        get: impl Fn(&Config) -> Option<T>,
    ) -> Option<T> {
        let mut tree = path.without_fragment().parent();
        loop {
            if let Some(meta) = self.trees.get(&tree) {
                if let Some(value) = get(&meta.config) {
                    return Some(value);
                }
            }
            if tree.is_root() {
                return None;
            }
            tree = tree.parent();
        }
    }

    /// Version configuration, carried by the root tree only.
    pub fn versions(&self) -> Option<&Versions> {
        self.trees
            .get(&TreePath::root())
            .and_then(|meta| meta.config.versions.as_ref())
    }

    /// Whether the document at `path` participates in versioned output.
    /// Requires versions at the root and a `versioned` flag on the document
    /// or one of its ancestor trees.
    pub fn is_versioned(&self, path: &TreePath) -> bool {
        if self.versions().is_none() {
            return false;
        }
        let own = self
            .document(path)
            .and_then(|meta| meta.config.versioned);
        own.or_else(|| self.ancestor_lookup(path, |config| config.versioned))
            .unwrap_or(false)
    }

    /// Effective target formats for any path in the tree: markup documents
    /// inherit through their ancestor trees, static documents carry their
    /// own. `None` means the path does not exist.
    pub fn target_formats_of(&self, path: &TreePath) -> Option<TargetFormats> {
        let clean = path.without_fragment();
        if let Some(meta) = self.documents.get(&clean) {
            let formats = meta
                .config
                .target_formats
                .clone()
                .or_else(|| self.ancestor_lookup(&clean, |config| config.target_formats.clone()))
                .unwrap_or_default();
            return Some(formats);
        }
        self.static_document(&clean).map(|doc| doc.formats.clone())
    }

    /// True when the document at `path` exposes the given target id.
    pub fn has_target_id(&self, path: &TreePath, id: &str) -> bool {
        self.document(path)
            .map(|meta| meta.targets.has_id(id))
            .unwrap_or(false)
    }
}

static EMPTY_TARGETS: Lazy<DocumentTargets> = Lazy::new(DocumentTargets::default);

/// A read-only handle on one document inside an indexed tree: the arena
/// reference plus the document's path, position and configuration.
#[derive(Clone)]
pub struct DocumentCursor<'i> {
    pub index: &'i TreeIndex,
    pub path: TreePath,
    pub config: Config,
    pub position: TreePosition,
    targets: &'i DocumentTargets,
}

impl<'i> DocumentCursor<'i> {
    /// Cursor for a document that is part of the indexed tree. A document
    /// unknown to the index gets an empty symbol table and a root position.
    pub fn for_document(index: &'i TreeIndex, document: &Document) -> Self {
        let path = document.path.without_fragment();
        match index.document(&path) {
            Some(meta) => DocumentCursor {
                index,
                path,
                config: document.config.clone(),
                position: meta.position.clone(),
                targets: &meta.targets,
            },
            None => {
                warn!("[DocumentCursor::for_document] {path} is not part of the indexed tree");
                DocumentCursor {
                    index,
                    path,
                    config: document.config.clone(),
                    position: TreePosition::root(),
                    targets: &EMPTY_TARGETS,
                }
            }
        }
    }

    pub fn new(index: &'i TreeIndex, path: &TreePath) -> Result<Self, WeftError> {
        let clean = path.without_fragment();
        let meta = index
            .document(&clean)
            .ok_or_else(|| WeftError::NotFound(format!("document {clean}")))?;
        Ok(DocumentCursor {
            index,
            path: clean,
            config: meta.config.clone(),
            position: meta.position.clone(),
            targets: &meta.targets,
        })
    }

    /// Symbol tables of this document, living as long as the index.
    pub fn targets(&self) -> &'i DocumentTargets {
        self.targets
    }

    pub fn parent(&self) -> TreePath {
        self.path.parent()
    }

    /// Nearest configured value: the document's own config first, then each
    /// ancestor tree outward.
    pub fn lookup_config<T>(&self, get: impl Fn(&Config) -> Option<T>) -> Option<T> {
        if let Some(value) = get(&self.config) {
            return Some(value);
        }
        self.index.ancestor_lookup(&self.path, get)
    }

    pub fn first_header_as_title(&self) -> bool {
        self.lookup_config(|config| config.first_header_as_title)
            .unwrap_or(true)
    }

    pub fn site_base_url(&self) -> Option<Url> {
        self.lookup_config(|config| config.site_base_url.clone())
    }

    /// The formats this document is rendered to.
    pub fn target_formats(&self) -> TargetFormats {
        self.lookup_config(|config| config.target_formats.clone())
            .unwrap_or_default()
    }

    /// Numbering settings, nearest non-default wins so a root-level scope
    /// reaches every document.
    pub fn autonumbering(&self) -> AutonumberConfig {
        self.lookup_config(|config| {
            if config.autonumbering == AutonumberConfig::default() {
                None
            } else {
                Some(config.autonumbering.clone())
            }
        })
        .unwrap_or_default()
    }

    pub fn link_precedence(&self) -> Vec<LookupScope> {
        self.lookup_config(|config| config.link_precedence.clone())
            .unwrap_or_else(default_link_precedence)
    }

    /// Tree-wide link definition from `links.targets`, nearest table wins.
    pub fn global_link_target(&self, id: &str) -> Option<String> {
        self.lookup_config(|config| config.links.targets.get(id).cloned())
    }
}
