//! Symbol-table collection, the first half of collect-then-resolve.
//!
//! References may precede their targets in document order, so resolution
//! never scans on demand: one pre-order traversal per document gathers
//! every id, link definition, alias, citation and footnote definition, and
//! assigns footnote numbers and symbols up front. The resolve rules then
//! only consult these tables.
//!
//! Fallback content of invalid elements is frozen and deliberately not
//! collected, which keeps a second resolve pass over an already resolved
//! tree a no-op.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::tree::document::Document;
use crate::tree::element::{Block, FootnoteLabel, Span};

/// The autosymbol alphabet. Definitions past the end repeat the glyph, so
/// the 11th symbol is `**` and the 21st `***`.
pub const FOOTNOTE_SYMBOLS: [&str; 10] =
    ["*", "†", "‡", "§", "¶", "#", "♠", "♥", "♦", "♣"];

/// Symbol for the `index`-th (0-based) autosymbol definition.
pub fn autosymbol(index: usize) -> String {
    FOOTNOTE_SYMBOLS[index % FOOTNOTE_SYMBOLS.len()].repeat(index / FOOTNOTE_SYMBOLS.len() + 1)
}

pub fn footnote_number_id(number: u32) -> String {
    format!("__fn-{number}")
}

pub fn footnote_name_id(name: &str) -> String {
    format!("__fn-{}", name.to_lowercase())
}

pub fn footnote_symbol_id(ordinal: usize) -> String {
    format!("__fns-{ordinal}")
}

pub fn citation_id(label: &str) -> String {
    format!("__cit-{}", label.to_lowercase())
}

/// What an id resolves to inside one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetKind {
    /// An element carrying the id; links point at the fragment.
    Fragment,
    /// A link definition with its raw target and optional title.
    Definition {
        target: String,
        title: Option<String>,
    },
    /// An alias redirecting to another id.
    Alias { target: String },
}

/// Footnote lookup tables with numbering already assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FootnoteTable {
    /// Explicit numeric labels plus numbers assigned to unnamed autonumber
    /// definitions.
    pub by_number: BTreeMap<u32, String>,
    /// Lowercased autonumber-label name to (id, assigned number).
    pub by_name: BTreeMap<String, (String, u32)>,
    /// Unnamed autonumber definitions in document order, consumed
    /// positionally by autonumber references.
    pub autonumber_sequence: Vec<(String, u32)>,
    /// Autosymbol definitions in document order: (id, symbol).
    pub autosymbol_sequence: Vec<(String, String)>,
}

/// All reference targets of one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentTargets {
    /// Occurrence count per id, including ids resolution will assign.
    /// A count above one marks a duplicate.
    pub ids: BTreeMap<String, u32>,
    /// First-wins map from id to target kind. Link definition keys are
    /// stored lowercased and matched case-insensitively.
    pub link_targets: BTreeMap<String, TargetKind>,
    /// Lowercased citation label to assigned citation id.
    pub citations: BTreeMap<String, String>,
    pub footnotes: FootnoteTable,
    /// Raw targets of anonymous link definitions, in document order.
    pub anonymous_definitions: Vec<String>,
}

impl DocumentTargets {
    pub fn collect(document: &Document) -> Self {
        let mut collector = Collector::default();
        for block in &document.content.content {
            collector.visit_block(block);
        }
        collector.assign_footnotes();
        collector.targets
    }

    pub fn has_id(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    pub fn is_duplicate(&self, id: &str) -> bool {
        self.ids.get(id).copied().unwrap_or(0) > 1
    }

    /// Target for an id reference: exact ids win, link definitions are
    /// found case-insensitively.
    pub fn lookup(&self, id: &str) -> Option<&TargetKind> {
        self.link_targets
            .get(id)
            .or_else(|| self.link_targets.get(&id.to_lowercase()))
    }
}

#[derive(Default)]
struct Collector {
    targets: DocumentTargets,
    /// Footnote definitions in document order, numbering deferred.
    footnote_labels: Vec<FootnoteLabel>,
    claimed_numbers: BTreeSet<u32>,
}

impl Collector {
    fn record_id(&mut self, id: &str) {
        *self.targets.ids.entry(id.to_string()).or_insert(0) += 1;
        self.record_target(id.to_string(), TargetKind::Fragment);
    }

    fn record_target(&mut self, key: String, kind: TargetKind) {
        if let Some(existing) = self.targets.link_targets.get(&key) {
            if existing != &kind {
                debug!("[DocumentTargets::collect] dropping shadowed target for id '{key}'");
            }
            return;
        }
        self.targets.link_targets.insert(key, kind);
    }

    fn visit_block(&mut self, block: &Block) {
        match block {
            // frozen fallbacks stay out of the tables
            Block::InvalidBlock { .. } => return,
            Block::FootnoteDefinition { label, .. } => {
                if let FootnoteLabel::NumericLabel(number) = label {
                    self.claimed_numbers.insert(*number);
                }
                self.footnote_labels.push(label.clone());
            }
            Block::Citation { label, options, .. } => {
                let id = options
                    .id
                    .clone()
                    .unwrap_or_else(|| citation_id(label));
                if options.id.is_none() {
                    self.record_id(&id);
                }
                self.targets.citations.insert(label.to_lowercase(), id);
            }
            Block::LinkDefinition {
                id, target, title, ..
            } => {
                if id.is_empty() {
                    self.targets.anonymous_definitions.push(target.clone());
                } else {
                    self.record_target(
                        id.to_lowercase(),
                        TargetKind::Definition {
                            target: target.clone(),
                            title: title.clone(),
                        },
                    );
                }
            }
            Block::LinkAlias { id, target, .. } => {
                self.record_target(
                    id.clone(),
                    TargetKind::Alias {
                        target: target.clone(),
                    },
                );
            }
            Block::Section { header, .. } => {
                // the embedded header is not a child block, its id still counts
                if let Some(id) = &header.options.id {
                    self.record_id(id);
                }
            }
            _ => {}
        }
        if let Some(id) = block.id() {
            self.record_id(id);
        }
        for span in block.child_spans() {
            self.visit_span(span);
        }
        for child in block.child_blocks() {
            self.visit_block(child);
        }
    }

    fn visit_span(&mut self, span: &Span) {
        if matches!(span, Span::InvalidSpan { .. }) {
            return;
        }
        if let Some(id) = span.id() {
            self.record_id(id);
        }
        for child in span.child_spans() {
            self.visit_span(child);
        }
    }

    /// Assigns numbers, symbols and ids to the collected footnote
    /// definitions. Autonumber definitions take the lowest numbers not
    /// claimed by an explicit numeric label.
    fn assign_footnotes(&mut self) {
        let mut next_number = 1u32;
        let mut symbol_count = 0usize;
        let mut ids_to_record = Vec::new();
        for label in std::mem::take(&mut self.footnote_labels) {
            match label {
                FootnoteLabel::NumericLabel(number) => {
                    let id = footnote_number_id(number);
                    self.targets
                        .footnotes
                        .by_number
                        .entry(number)
                        .or_insert_with(|| id.clone());
                    ids_to_record.push(id);
                }
                FootnoteLabel::Autonumber => {
                    while self.claimed_numbers.contains(&next_number) {
                        next_number += 1;
                    }
                    let number = next_number;
                    next_number += 1;
                    let id = footnote_number_id(number);
                    self.targets
                        .footnotes
                        .by_number
                        .entry(number)
                        .or_insert_with(|| id.clone());
                    self.targets
                        .footnotes
                        .autonumber_sequence
                        .push((id.clone(), number));
                    ids_to_record.push(id);
                }
                FootnoteLabel::AutonumberLabel(name) => {
                    while self.claimed_numbers.contains(&next_number) {
                        next_number += 1;
                    }
                    let number = next_number;
                    next_number += 1;
                    let id = footnote_name_id(&name);
                    self.targets
                        .footnotes
                        .by_name
                        .entry(name.to_lowercase())
                        .or_insert_with(|| (id.clone(), number));
                    ids_to_record.push(id);
                }
                FootnoteLabel::Autosymbol => {
                    let symbol = autosymbol(symbol_count);
                    symbol_count += 1;
                    let id = footnote_symbol_id(symbol_count);
                    self.targets
                        .footnotes
                        .autosymbol_sequence
                        .push((id.clone(), symbol));
                    ids_to_record.push(id);
                }
            }
        }
        for id in ids_to_record {
            self.record_id(&id);
        }
    }
}
