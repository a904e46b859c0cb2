//! # weft-core
//!
//! A rewrite engine for trees of lightweight markup documents.
//!
//! ## Overview
//!
//! weft-core parses markup sources into a uniform document tree, then rewrites
//! that tree in phases until every cross-reference is resolved and every link
//! points at the right output location. Rules are **partial functions** over
//! blocks and spans: each rule claims the elements it understands and defers
//! the rest, and the engine folds all active rules into a single traversal.
//!
//! ### Key Features
//!
//! - **Partial rewrite rules**: compose independent transformations without
//!   coordinating traversal logic
//! - **Collect-then-resolve**: per-document symbol tables are built before any
//!   rule runs, so references can point forward or across documents
//! - **Errors as elements**: a failed resolution becomes an invalid block or
//!   span carrying a fallback, never an aborted rewrite
//! - **Section structure**: flat header sequences become nested sections with
//!   stable slug ids, optional title promotion and autonumbering
//! - **Footnote sequencing**: autonumber and autosymbol labels are assigned
//!   document-wide, skipping explicitly claimed numbers
//! - **Link validation**: internal targets are checked against the tree,
//!   including per-format availability of their destinations
//! - **Path translation**: one render pass per output format maps resolved
//!   links to that format's file layout
//!
//! ## Architecture
//!
//! - [`tree`]: the block and span vocabulary, the virtual document tree, and
//!   the cursors rules observe it through
//! - [`rewrite`]: the traversal engine, the phase driver and the rule registry
//! - [`resolve`]: symbol tables plus the reference, duplicate-id and section
//!   rules
//! - [`link`]: target validation and render-time path translation
//! - [`markup`]: markup front ends (markdown via pulldown-cmark)
//! - [`paths`]: virtual tree paths, relative path arithmetic and slugs
//! - [`config`]: TOML configuration, embeddable in document front matter
//!
//! ## Quick Start
//!
//! Parse a handful of sources, resolve them, and translate for one output
//! format:
//!
//! ```rust
//! use weft_core::markup::{md::Markdown, parse_tree};
//! use weft_core::paths::TreePath;
//! use weft_core::rewrite::{OutputContext, RuleRegistry};
//!
//! fn main() -> Result<(), weft_core::WeftError> {
//!     let tree = parse_tree(
//!         &Markdown,
//!         &[
//!             ("/intro.md", "# Introduction\n\nRead the [setup guide](guides/setup.md).\n"),
//!             ("/guides/setup.md", "# Setup\n\nInstall the toolchain.\n"),
//!         ],
//!     )?;
//!
//!     // Two format-independent phases, then one render pass per format.
//!     let registry = RuleRegistry::default();
//!     let resolved = tree.rewrite(&registry);
//!     let site = resolved.rewrite_for_render(&registry, OutputContext::html());
//!
//!     let intro = site
//!         .document(&TreePath::parse("/intro.md"))
//!         .expect("documents survive rewriting");
//!     assert_eq!(intro.title_text(), "Introduction");
//!     Ok(())
//! }
//! ```
//!
//! ### Custom Rules
//!
//! Registered builders run once per document and phase; the rule sets they
//! return are folded into the same walk as the defaults:
//!
//! ```rust,no_run
//! use weft_core::rewrite::{PhaseKind, RewriteAction, RuleRegistry, RuleSet};
//! use weft_core::tree::element::Span;
//!
//! let mut registry = RuleRegistry::with_defaults();
//! registry.register("expand-tabs", PhaseKind::Build.into(), |_cursor, _phase| {
//!     Ok(RuleSet::bottom_up().with_span_rule(|span| match span {
//!         Span::Text { content, options } if content.contains('\t') => {
//!             Some(RewriteAction::Replace(Span::Text {
//!                 content: content.replace('\t', "    "),
//!                 options: options.clone(),
//!             }))
//!         }
//!         _ => None,
//!     }))
//! });
//! ```
//!
//! ## Core Concepts
//!
//! ### Phases
//!
//! A full transformation is `Build` (local structure, no knowledge of other
//! documents), `Resolve` (references replaced against a tree-wide snapshot),
//! and one `Render` per output format (resolved links mapped to that format's
//! layout). Each phase sees the tree exactly as the previous phase left it;
//! within a phase, every document observes the same snapshot no matter the
//! rewrite order.
//!
//! ### Collect then resolve
//!
//! Before the resolve phase touches a document, the
//! [`TreeIndex`](tree::cursor::TreeIndex) has already tabulated every id,
//! link definition, alias and footnote assignment in the tree. Rules look
//! targets up instead of searching for them, which is what makes forward and
//! cross-document references no different from local ones.
//!
//! ### Errors as elements
//!
//! Anything that goes wrong inside a document lands in the tree as an
//! [`InvalidBlock`](tree::element::Block::InvalidBlock) or
//! [`InvalidSpan`](tree::element::Span::InvalidSpan) wrapping a fallback
//! rendition, so one bad reference never takes down a build. Rewriting is
//! idempotent: running a phase twice leaves the tree unchanged, invalid
//! elements included.

pub mod config;
pub mod error;
pub mod link;
pub mod markup;
pub mod paths;
pub mod resolve;
pub mod rewrite;
#[cfg(test)]
mod tests;
pub mod tree;

pub use error::*;
