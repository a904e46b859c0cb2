//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use weft_core::markup::md::Markdown;
use weft_core::markup::parse_tree;
use weft_core::tree::document::{Document, DocumentTreeRoot};
use weft_core::tree::element::{Block, MessageFilter, Severity, Span};

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Parses markdown sources into an unresolved tree.
#[allow(dead_code)]
pub fn markdown_tree(sources: &[(&str, &str)]) -> DocumentTreeRoot {
    init_logging();
    parse_tree(&Markdown, sources).expect("tree assembles")
}

/// Assembles a tree from documents built directly out of elements.
#[allow(dead_code)]
pub fn tree_of(documents: Vec<Document>) -> DocumentTreeRoot {
    init_logging();
    DocumentTreeRoot::from_documents(documents).expect("tree assembles")
}

/// Every span of the document in depth-first order, nested ones included.
#[allow(dead_code)]
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

/// Message text of every invalid element in the document, any severity.
#[allow(dead_code)]
pub fn invalid_messages(document: &Document) -> Vec<String> {
    document
        .runtime_messages(&MessageFilter::Threshold(Severity::Debug))
        .into_iter()
        .map(|message| message.content.clone())
        .collect()
}
