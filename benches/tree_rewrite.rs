//! Performance benchmarks for tree rewriting
//!
//! These benchmarks build a synthetic multi-document markdown corpus with
//! cross-document links, footnotes and nested sections, then measure:
//! - Markdown parsing into the document tree
//! - The two format-independent rewrite phases (build + resolve)
//! - One html render pass over an already-resolved tree
//!
//! Run with: cargo bench

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use weft_core::markup::{md::Markdown, parse_tree};
use weft_core::rewrite::{OutputContext, RuleRegistry};
use weft_core::tree::document::DocumentTreeRoot;

const DOCUMENTS: usize = 24;
const SECTIONS_PER_DOCUMENT: usize = 8;

// Every document links to its neighbor, references a shared link id and
// defines a couple of footnotes, so the resolve phase exercises each of the
// symbol tables it maintains.
fn corpus() -> Vec<(String, String)> {
    (0..DOCUMENTS)
        .map(|doc| {
            let path = format!("/chapter-{doc:02}.md");
            let next = (doc + 1) % DOCUMENTS;
            let mut source = format!("# Chapter {doc}\n\n");
            for section in 0..SECTIONS_PER_DOCUMENT {
                source.push_str(&format!("## Topic {section}\n\n"));
                source.push_str(&format!(
                    "Continue in [the next chapter](chapter-{next:02}.md#topic-{section}) \
                     or consult [the index][idx]. A claim[^note-{section}] needs backing.\n\n",
                ));
                source.push_str(&format!("[^note-{section}]: Supporting detail.\n\n"));
            }
            source.push_str("[idx]: chapter-00.md \"Index\"\n");
            (path, source)
        })
        .collect()
}

fn parse_corpus(sources: &[(String, String)]) -> DocumentTreeRoot {
    let borrowed: Vec<(&str, &str)> = sources
        .iter()
        .map(|(path, source)| (path.as_str(), source.as_str()))
        .collect();
    parse_tree(&Markdown, &borrowed).expect("corpus parses")
}

fn bench_parse(c: &mut Criterion) {
    let sources = corpus();
    c.bench_function("parse_markdown_corpus", |b| {
        b.iter(|| parse_corpus(&sources));
    });
}

fn bench_build_and_resolve(c: &mut Criterion) {
    let registry = RuleRegistry::default();
    let parsed = parse_corpus(&corpus());
    c.bench_function("build_and_resolve_phases", |b| {
        b.iter_batched(
            || parsed.clone(),
            |tree| tree.rewrite(&registry),
            BatchSize::SmallInput,
        );
    });
}

fn bench_render(c: &mut Criterion) {
    let registry = RuleRegistry::default();
    let resolved = parse_corpus(&corpus()).rewrite(&registry);
    c.bench_function("html_render_phase", |b| {
        b.iter_batched(
            || resolved.clone(),
            |tree| tree.rewrite_for_render(&registry, OutputContext::html()),
            BatchSize::SmallInput,
        );
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(50);
    targets = bench_parse, bench_build_and_resolve, bench_render
}

criterion_main!(benches);
