//! Shared fixtures for whole-pipeline tests.

use crate::markup::md::Markdown;
use crate::markup::parse_tree;
use crate::tree::document::{Document, DocumentTreeRoot};
use crate::tree::element::{Block, Span};

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Parses markdown sources into an unresolved tree.
pub fn markdown_tree(sources: &[(&str, &str)]) -> DocumentTreeRoot {
    init_logging();
    parse_tree(&Markdown, sources).expect("tree assembles")
}

/// Every span of the document in depth-first order, nested ones included.
pub fn flatten_spans(document: &Document) -> Vec<&Span> {
    let mut spans = Vec::new();
    for block in &document.content.content {
        collect_block_spans(block, &mut spans);
    }
    spans
}

fn collect_block_spans<'a>(block: &'a Block, spans: &mut Vec<&'a Span>) {
    for span in block.child_spans() {
        collect_span(span, spans);
    }
    for child in block.child_blocks() {
        collect_block_spans(child, spans);
    }
}

fn collect_span<'a>(span: &'a Span, spans: &mut Vec<&'a Span>) {
    spans.push(span);
    for child in span.child_spans() {
        collect_span(child, spans);
    }
}

/// First block of the document, panicking with context when absent.
pub fn first_block(document: &Document) -> &Block {
    document
        .content
        .content
        .first()
        .unwrap_or_else(|| panic!("{} has no content", document.path))
}
