//! The rewrite machinery: a generic tree walk driven by partial rules, and
//! the phase driver applying a [RuleRegistry] to every document of a tree.
//!
//! A full transformation is two fixed phases plus one per output format:
//! `Build` establishes local structure, `Resolve` replaces every reference
//! using a fresh [TreeIndex](crate::tree::cursor::TreeIndex) snapshot, and
//! `Render` maps resolved links to output locations. Rule builders that
//! fail contribute an invalid element at the start of the affected document
//! instead of aborting the phase.

pub mod engine;
pub mod registry;

pub use engine::{BlockRule, RewriteAction, RewriteRules, RootRule, RuleSet, SpanRule, TraversalOrder};
pub use registry::{OutputContext, PhaseKind, RewritePhase, RuleRegistry};

use tracing::debug;

use crate::tree::cursor::{DocumentCursor, TreeIndex};
use crate::tree::document::{Document, DocumentTreeRoot};
use crate::tree::element::{Block, Options, RuntimeMessage};

/// Runs one phase over every document. The index is snapshotted before the
/// first document is rewritten, so rules observe the tree as it stood at
/// the start of the phase regardless of rewrite order.
pub fn run_phase(
    root: DocumentTreeRoot,
    registry: &RuleRegistry,
    phase: &RewritePhase,
) -> DocumentTreeRoot {
    let index = TreeIndex::new(&root);
    root.map_documents(|document| {
        let cursor = DocumentCursor::for_document(&index, &document);
        let (sets, errors) = registry.build_for(&cursor, phase);
        let mut rules = RewriteRules::from_rule_sets(sets);
        let Document {
            path,
            content,
            config,
        } = document;
        let (mut content, changed) = rules.rewrite_root(content);
        if changed {
            debug!("[run_phase] {path} rewritten in {:?}", phase.kind());
        }
        // builder failures become leading diagnostics of the document
        for error in errors.into_iter().rev() {
            content.content.insert(
                0,
                Block::InvalidBlock {
                    message: RuntimeMessage::error(error.to_string()),
                    fallback: Box::new(Block::BlockSequence {
                        content: Vec::new(),
                        options: Options::empty(),
                    }),
                    options: Options::empty(),
                },
            );
        }
        Document {
            path,
            content,
            config,
        }
    })
}

impl DocumentTreeRoot {
    /// The two format-independent phases in order: structure building, then
    /// reference resolution.
    pub fn rewrite(self, registry: &RuleRegistry) -> Self {
        let built = run_phase(self, registry, &RewritePhase::Build);
        run_phase(built, registry, &RewritePhase::Resolve)
    }

    /// The render phase for one output format, on an already resolved tree.
    pub fn rewrite_for_render(self, registry: &RuleRegistry, output: OutputContext) -> Self {
        run_phase(self, registry, &RewritePhase::Render(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::paths::TreePath;
    use crate::tree::element::Span;

    #[test]
    fn rewrite_runs_build_then_resolve() {
        let root = DocumentTreeRoot::from_documents(vec![Document::new(
            "/doc.md",
            vec![
                Block::header(1, "The Title"),
                Block::header(2, "Details"),
                Block::paragraph("body"),
            ],
        )])
        .unwrap();
        let rewritten = root.rewrite(&RuleRegistry::with_defaults());
        let doc = rewritten.document(&TreePath::parse("/doc.md")).unwrap();
        assert!(matches!(doc.content.content[0], Block::Title { .. }));
        match &doc.content.content[1] {
            Block::Section { header, .. } => {
                assert_eq!(header.options.id.as_deref(), Some("details"))
            }
            other => panic!("expected section, got {other:?}"),
        }
    }

    #[test]
    fn builder_errors_surface_inside_the_document() {
        let mut config = Config::default();
        config.autonumbering.scope = "sideways".to_string();
        let root = DocumentTreeRoot::from_documents(vec![Document::new(
            "/doc.md",
            vec![Block::paragraph("body")],
        )
        .with_config(config)])
        .unwrap();
        let rewritten = root.rewrite(&RuleRegistry::with_defaults());
        let doc = rewritten.document(&TreePath::parse("/doc.md")).unwrap();
        match &doc.content.content[0] {
            Block::InvalidBlock { message, .. } => {
                assert!(message
                    .content
                    .contains("invalid autonumbering scope: sideways"));
            }
            other => panic!("expected invalid block, got {other:?}"),
        }
        // the rest of the document is untouched
        assert!(matches!(doc.content.content[1], Block::Paragraph { .. }));
    }

    #[test]
    fn render_phase_translates_resolved_links() {
        let root = DocumentTreeRoot::from_documents(vec![
            Document::new(
                "/here.md",
                vec![Block::paragraph_of(vec![Span::LinkPathReference {
                    content: vec![Span::text("over")],
                    path: crate::paths::PathRef::parse("there.md"),
                    source: "[over](there.md)".to_string(),
                    options: Options::empty(),
                }])],
            ),
            Document::new("/there.md", vec![Block::paragraph("there")]),
        ])
        .unwrap();
        let registry = RuleRegistry::with_defaults();
        let resolved = root.rewrite(&registry);
        let rendered = resolved.rewrite_for_render(&registry, OutputContext::html());
        let doc = rendered.document(&TreePath::parse("/here.md")).unwrap();
        match &doc.content.content[0] {
            Block::Paragraph { content, .. } => match &content[0] {
                Span::SpanLink {
                    target: crate::tree::element::LinkTarget::Internal(target),
                    ..
                } => {
                    assert_eq!(target.absolute, TreePath::parse("/there.html"));
                    assert_eq!(target.relative.to_string(), "there.html");
                }
                other => panic!("expected link, got {other:?}"),
            },
            other => panic!("expected paragraph, got {other:?}"),
        }
    }
}
