//! End-to-end behavior of the parse, rewrite and render stages working
//! together. Module-level tests cover each rule set in isolation; these
//! pin the handshakes between them.

use test_log::test;

use super::helpers::{first_block, flatten_spans, init_logging, markdown_tree};
use crate::error::WeftError;
use crate::paths::{RelativePath, TreePath};
use crate::rewrite::{
    run_phase, OutputContext, PhaseKind, RewriteAction, RewritePhase, RuleRegistry, RuleSet,
};
use crate::tree::document::{Document, DocumentTreeRoot, StaticDocument};
use crate::tree::element::{Block, LinkTarget, MessageFilter, Options, Span};

const INDEX: &str = "\
# Home

Welcome. See the [guide](guide.md#details) and the [api][api-ref].

A claim[^1].

[^1]: A footnote.

[api-ref]: https://api.example.com/ \"API\"
";

const GUIDE: &str = "\
# Guide

## Details

Back to [home](index.md). Logo: ![logo](img/logo.png)
";

fn site() -> DocumentTreeRoot {
    markdown_tree(&[("/index.md", INDEX), ("/guide.md", GUIDE)])
        .with_static_documents(vec![StaticDocument::new("/img/logo.png")])
}

#[test]
fn markdown_sources_resolve_without_messages() {
    let resolved = site().rewrite(&RuleRegistry::default());
    let messages = resolved.runtime_messages(&MessageFilter::default());
    assert!(messages.is_empty(), "unexpected diagnostics: {messages:?}");

    let index = resolved.document(&TreePath::parse("/index.md")).unwrap();
    assert_eq!(index.title_text(), "Home");

    // reference syntax is gone, only resolved variants and targets remain
    assert!(index.content.content.iter().all(|block| !matches!(
        block,
        Block::LinkDefinition { .. } | Block::FootnoteDefinition { .. }
    )));
    assert!(flatten_spans(index)
        .iter()
        .all(|span| !span.is_reference()));

    let spans = flatten_spans(index);
    let guide_link = spans
        .iter()
        .find_map(|span| match span {
            Span::SpanLink {
                target: LinkTarget::Internal(target),
                ..
            } => Some(target),
            _ => None,
        })
        .expect("internal link to the guide");
    assert_eq!(guide_link.absolute, TreePath::parse("/guide.md#details"));
    assert_eq!(guide_link.relative, RelativePath::parse("guide.md#details"));

    let api_link = spans
        .iter()
        .find_map(|span| match span {
            Span::SpanLink {
                target: LinkTarget::External(external),
                title,
                ..
            } => Some((external, title)),
            _ => None,
        })
        .expect("external link from the definition");
    assert_eq!(api_link.0.url, "https://api.example.com/");
    assert_eq!(api_link.1.as_deref(), Some("API"));

    let footnote_link = spans
        .iter()
        .find_map(|span| match span {
            Span::FootnoteLink { ref_id, label, .. } => Some((ref_id, label)),
            _ => None,
        })
        .expect("resolved footnote link");
    assert_eq!(footnote_link.0, "__fn-1");
    assert_eq!(footnote_link.1, "1");
    assert!(index.content.content.iter().any(|block| matches!(
        block,
        Block::Footnote { label, options, .. }
            if label == "1" && options.id.as_deref() == Some("__fn-1")
    )));
}

#[test]
fn render_translation_maps_links_to_output_locations() {
    let registry = RuleRegistry::default();
    let rendered = site()
        .rewrite(&registry)
        .rewrite_for_render(&registry, OutputContext::html());

    let index = rendered.document(&TreePath::parse("/index.md")).unwrap();
    let spans = flatten_spans(index);
    let guide_link = spans
        .iter()
        .find_map(|span| match span {
            Span::SpanLink {
                target: LinkTarget::Internal(target),
                ..
            } => Some(target),
            _ => None,
        })
        .expect("internal link to the guide");
    assert_eq!(guide_link.absolute, TreePath::parse("/guide.html#details"));
    assert_eq!(guide_link.relative, RelativePath::parse("guide.html#details"));

    let guide = rendered.document(&TreePath::parse("/guide.md")).unwrap();
    let spans = flatten_spans(guide);
    let home_link = spans
        .iter()
        .find_map(|span| match span {
            Span::SpanLink {
                target: LinkTarget::Internal(target),
                ..
            } => Some(target),
            _ => None,
        })
        .expect("link back home");
    assert_eq!(home_link.absolute, TreePath::parse("/index.html"));
    // static files keep their suffix even in html output
    let logo = spans
        .iter()
        .find_map(|span| match span {
            Span::Image {
                target: LinkTarget::Internal(target),
                ..
            } => Some(target),
            _ => None,
        })
        .expect("image span");
    assert_eq!(logo.absolute, TreePath::parse("/img/logo.png"));
}

#[test]
fn rule_builder_failures_degrade_to_invalid_blocks() {
    let tree = markdown_tree(&[("/a.md", "Body.\n")]);
    let mut registry = RuleRegistry::empty();
    registry.register("broken", PhaseKind::Build.into(), |_cursor, _phase| {
        Err(WeftError::Rule("no section data for this document".into()))
    });

    let rewritten = run_phase(tree, &registry, &RewritePhase::Build);
    let doc = rewritten.document(&TreePath::parse("/a.md")).unwrap();
    match first_block(doc) {
        Block::InvalidBlock { message, .. } => {
            assert!(message.content.contains("no section data"));
        }
        other => panic!("expected a leading diagnostic, got {other:?}"),
    }
    assert_eq!(doc.content.content[1], Block::paragraph("Body."));
}

#[test]
fn rule_builders_observe_the_phase_snapshot() {
    init_logging();
    let root = DocumentTreeRoot::from_documents(vec![
        Document::new(
            "/a.md",
            vec![
                Block::InternalLinkTarget {
                    options: Options::with_id("mark"),
                },
                Block::paragraph("alpha"),
            ],
        ),
        Document::new("/b.md", vec![Block::paragraph("beta")]),
    ])
    .unwrap();

    let mut registry = RuleRegistry::empty();
    registry.register("strip-mark", PhaseKind::Build.into(), |cursor, _phase| {
        if cursor.path != TreePath::parse("/a.md") {
            return Ok(RuleSet::bottom_up());
        }
        Ok(RuleSet::bottom_up().with_block_rule(|block| match block {
            Block::InternalLinkTarget { .. } => Some(RewriteAction::Remove),
            _ => None,
        }))
    });
    registry.register("probe", PhaseKind::Build.into(), |cursor, _phase| {
        if cursor.path != TreePath::parse("/b.md") {
            return Ok(RuleSet::bottom_up());
        }
        let visible = cursor
            .index
            .has_target_id(&TreePath::parse("/a.md"), "mark");
        Ok(RuleSet::bottom_up().with_root_rule(move |mut blocks| {
            blocks.push(Block::paragraph(format!("mark-visible: {visible}")));
            (blocks, true)
        }))
    });

    let rewritten = run_phase(root, &registry, &RewritePhase::Build);
    let a = rewritten.document(&TreePath::parse("/a.md")).unwrap();
    assert_eq!(a.content.content, vec![Block::paragraph("alpha")]);
    // /b.md is rewritten after /a.md, yet its builder saw the index as it
    // stood when the phase began
    let b = rewritten.document(&TreePath::parse("/b.md")).unwrap();
    assert_eq!(
        b.content.content[1],
        Block::paragraph("mark-visible: true")
    );
}
