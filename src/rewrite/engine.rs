//! The generic tree-rewriting walk.
//!
//! Rules are partial: a rule returning `None` defers to the next rule in the
//! chain, and an exhausted chain retains the node, so the combined rule is
//! total and the walk never fails. One walk serves both traversal orders:
//! top-down rules run when a node is entered, before its children, and their
//! replacements are walked again so freshly built structure is still
//! processed; bottom-up rules run after the children and their replacements
//! are final.
//!
//! The walk consumes the tree and moves untouched elements into the result,
//! so unchanged subtrees are never deep-copied. The `changed` flag returned
//! alongside lets callers detect a no-op rewrite without comparing trees.

use tracing::error;

use crate::tree::document::RootElement;
use crate::tree::element::{Block, HeaderData, ListItem, Span};

/// Outcome of applying one rule to one node.
#[derive(Debug, Clone, PartialEq)]
pub enum RewriteAction<T> {
    Retain,
    Replace(T),
    ReplaceMany(Vec<T>),
    Remove,
}

pub type BlockRule<'i> = Box<dyn FnMut(&Block) -> Option<RewriteAction<Block>> + 'i>;
pub type SpanRule<'i> = Box<dyn FnMut(&Span) -> Option<RewriteAction<Span>> + 'i>;
/// Rewrites a document's whole root sequence at once, for structural
/// transforms that consume siblings (section nesting, numbering). Returns
/// the new sequence and whether anything changed.
pub type RootRule<'i> = Box<dyn FnMut(Vec<Block>) -> (Vec<Block>, bool) + 'i>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalOrder {
    TopDown,
    #[default]
    BottomUp,
}

/// One concern's rules: block and span chains sharing a traversal order,
/// plus optional root-sequence rules. Root rules of a top-down set run
/// before the node walk, those of a bottom-up set after it.
#[derive(Default)]
pub struct RuleSet<'i> {
    pub order: TraversalOrder,
    pub root: Vec<RootRule<'i>>,
    pub blocks: Vec<BlockRule<'i>>,
    pub spans: Vec<SpanRule<'i>>,
}

impl<'i> RuleSet<'i> {
    pub fn bottom_up() -> Self {
        RuleSet {
            order: TraversalOrder::BottomUp,
            ..Default::default()
        }
    }

    pub fn top_down() -> Self {
        RuleSet {
            order: TraversalOrder::TopDown,
            ..Default::default()
        }
    }

    pub fn with_block_rule(
        mut self,
        rule: impl FnMut(&Block) -> Option<RewriteAction<Block>> + 'i,
    ) -> Self {
        self.blocks.push(Box::new(rule));
        self
    }

    pub fn with_span_rule(
        mut self,
        rule: impl FnMut(&Span) -> Option<RewriteAction<Span>> + 'i,
    ) -> Self {
        self.spans.push(Box::new(rule));
        self
    }

    pub fn with_root_rule(mut self, rule: impl FnMut(Vec<Block>) -> (Vec<Block>, bool) + 'i) -> Self {
        self.root.push(Box::new(rule));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty() && self.blocks.is_empty() && self.spans.is_empty()
    }
}

#[derive(Default)]
struct RuleChains<'i> {
    root: Vec<RootRule<'i>>,
    blocks: Vec<BlockRule<'i>>,
    spans: Vec<SpanRule<'i>>,
}

impl<'i> RuleChains<'i> {
    fn apply_block(&mut self, block: &Block) -> RewriteAction<Block> {
        for rule in &mut self.blocks {
            if let Some(action) = rule(block) {
                return action;
            }
        }
        RewriteAction::Retain
    }

    fn apply_span(&mut self, span: &Span) -> RewriteAction<Span> {
        for rule in &mut self.spans {
            if let Some(action) = rule(span) {
                return action;
            }
        }
        RewriteAction::Retain
    }
}

/// All rules of one phase, compiled into the two per-order chains the walk
/// consults. Chains keep the registration order, so earlier rule sets win
/// on nodes they match.
#[derive(Default)]
pub struct RewriteRules<'i> {
    top_down: RuleChains<'i>,
    bottom_up: RuleChains<'i>,
}

impl<'i> RewriteRules<'i> {
    pub fn from_rule_sets(sets: Vec<RuleSet<'i>>) -> Self {
        let mut rules = RewriteRules::default();
        for set in sets {
            let chains = match set.order {
                TraversalOrder::TopDown => &mut rules.top_down,
                TraversalOrder::BottomUp => &mut rules.bottom_up,
            };
            chains.root.extend(set.root);
            chains.blocks.extend(set.blocks);
            chains.spans.extend(set.spans);
        }
        rules
    }

    pub fn is_empty(&self) -> bool {
        self.top_down.root.is_empty()
            && self.top_down.blocks.is_empty()
            && self.top_down.spans.is_empty()
            && self.bottom_up.root.is_empty()
            && self.bottom_up.blocks.is_empty()
            && self.bottom_up.spans.is_empty()
    }

    /// Rewrites a document's root content. Returns the new root and whether
    /// any rule changed anything.
    pub fn rewrite_root(&mut self, root: RootElement) -> (RootElement, bool) {
        let mut changed = false;
        let mut content = root.content;
        for rule in &mut self.top_down.root {
            let (next, rule_changed) = rule(content);
            content = next;
            changed |= rule_changed;
        }
        content = self.walk_blocks(content, &mut changed);
        for rule in &mut self.bottom_up.root {
            let (next, rule_changed) = rule(content);
            content = next;
            changed |= rule_changed;
        }
        (RootElement { content }, changed)
    }

    pub fn rewrite_blocks(&mut self, blocks: Vec<Block>) -> (Vec<Block>, bool) {
        let mut changed = false;
        let blocks = self.walk_blocks(blocks, &mut changed);
        (blocks, changed)
    }

    pub fn rewrite_spans(&mut self, spans: Vec<Span>) -> (Vec<Span>, bool) {
        let mut changed = false;
        let spans = self.walk_spans(spans, &mut changed);
        (spans, changed)
    }

    fn walk_blocks(&mut self, blocks: Vec<Block>, changed: &mut bool) -> Vec<Block> {
        let mut out = Vec::with_capacity(blocks.len());
        for block in blocks {
            match self.top_down.apply_block(&block) {
                RewriteAction::Retain => self.walk_block_into(block, &mut out, changed),
                RewriteAction::Replace(replacement) => {
                    *changed = true;
                    self.walk_block_into(replacement, &mut out, changed);
                }
                RewriteAction::ReplaceMany(replacements) => {
                    *changed = true;
                    for replacement in replacements {
                        self.walk_block_into(replacement, &mut out, changed);
                    }
                }
                RewriteAction::Remove => *changed = true,
            }
        }
        out
    }

    fn walk_block_into(&mut self, block: Block, out: &mut Vec<Block>, changed: &mut bool) {
        let block = self.rewrite_block_children(block, changed);
        match self.bottom_up.apply_block(&block) {
            RewriteAction::Retain => out.push(block),
            RewriteAction::Replace(replacement) => {
                *changed = true;
                out.push(replacement);
            }
            RewriteAction::ReplaceMany(replacements) => {
                *changed = true;
                out.extend(replacements);
            }
            RewriteAction::Remove => *changed = true,
        }
    }

    fn rewrite_block_children(&mut self, block: Block, changed: &mut bool) -> Block {
        match block {
            Block::Paragraph { content, options } => Block::Paragraph {
                content: self.walk_spans(content, changed),
                options,
            },
            Block::Header(header) => Block::Header(HeaderData {
                level: header.level,
                content: self.walk_spans(header.content, changed),
                options: header.options,
            }),
            Block::Title { content, options } => Block::Title {
                content: self.walk_spans(content, changed),
                options,
            },
            Block::Section {
                header,
                content,
                options,
            } => {
                let header = self.rewrite_section_header(header, changed);
                Block::Section {
                    header,
                    content: self.walk_blocks(content, changed),
                    options,
                }
            }
            Block::BlockSequence { content, options } => Block::BlockSequence {
                content: self.walk_blocks(content, changed),
                options,
            },
            Block::QuotedBlock {
                content,
                attribution,
                options,
            } => Block::QuotedBlock {
                content: self.walk_blocks(content, changed),
                attribution: self.walk_spans(attribution, changed),
                options,
            },
            Block::BulletList { items, options } => Block::BulletList {
                items: self.walk_list_items(items, changed),
                options,
            },
            Block::EnumList {
                items,
                start,
                options,
            } => Block::EnumList {
                items: self.walk_list_items(items, changed),
                start,
                options,
            },
            Block::FootnoteDefinition {
                label,
                content,
                options,
            } => Block::FootnoteDefinition {
                label,
                content: self.walk_blocks(content, changed),
                options,
            },
            Block::Footnote {
                label,
                content,
                options,
            } => Block::Footnote {
                label,
                content: self.walk_blocks(content, changed),
                options,
            },
            Block::Citation {
                label,
                content,
                options,
            } => Block::Citation {
                label,
                content: self.walk_blocks(content, changed),
                options,
            },
            // leaves, and invalid fallbacks which stay frozen
            other @ (Block::LiteralBlock { .. }
            | Block::Rule { .. }
            | Block::LinkDefinition { .. }
            | Block::LinkAlias { .. }
            | Block::InternalLinkTarget { .. }
            | Block::InvalidBlock { .. }) => other,
        }
    }

    /// A section's header is structurally mandatory. A rule that removes it
    /// or replaces it with anything but a single header is a design error;
    /// the walk keeps the original header in that case.
    fn rewrite_section_header(&mut self, header: HeaderData, changed: &mut bool) -> HeaderData {
        let keep = header.clone();
        let mut results = Vec::with_capacity(1);
        self.walk_block_into(Block::Header(header), &mut results, changed);
        match results.pop() {
            Some(Block::Header(rewritten)) if results.is_empty() => rewritten,
            _ => {
                error!(
                    "[RewriteRules::rewrite] rule removed or retyped a section header at {:?}, \
                     retaining the original",
                    keep.options.id
                );
                keep
            }
        }
    }

    fn walk_list_items(&mut self, items: Vec<ListItem>, changed: &mut bool) -> Vec<ListItem> {
        items
            .into_iter()
            .map(|item| ListItem {
                content: self.walk_blocks(item.content, changed),
                options: item.options,
            })
            .collect()
    }

    fn walk_spans(&mut self, spans: Vec<Span>, changed: &mut bool) -> Vec<Span> {
        let mut out = Vec::with_capacity(spans.len());
        for span in spans {
            match self.top_down.apply_span(&span) {
                RewriteAction::Retain => self.walk_span_into(span, &mut out, changed),
                RewriteAction::Replace(replacement) => {
                    *changed = true;
                    self.walk_span_into(replacement, &mut out, changed);
                }
                RewriteAction::ReplaceMany(replacements) => {
                    *changed = true;
                    for replacement in replacements {
                        self.walk_span_into(replacement, &mut out, changed);
                    }
                }
                RewriteAction::Remove => *changed = true,
            }
        }
        out
    }

    fn walk_span_into(&mut self, span: Span, out: &mut Vec<Span>, changed: &mut bool) {
        let span = self.rewrite_span_children(span, changed);
        match self.bottom_up.apply_span(&span) {
            RewriteAction::Retain => out.push(span),
            RewriteAction::Replace(replacement) => {
                *changed = true;
                out.push(replacement);
            }
            RewriteAction::ReplaceMany(replacements) => {
                *changed = true;
                out.extend(replacements);
            }
            RewriteAction::Remove => *changed = true,
        }
    }

    fn rewrite_span_children(&mut self, span: Span, changed: &mut bool) -> Span {
        match span {
            Span::Emphasized { content, options } => Span::Emphasized {
                content: self.walk_spans(content, changed),
                options,
            },
            Span::Strong { content, options } => Span::Strong {
                content: self.walk_spans(content, changed),
                options,
            },
            Span::SpanSequence { content, options } => Span::SpanSequence {
                content: self.walk_spans(content, changed),
                options,
            },
            Span::SpanLink {
                content,
                target,
                title,
                options,
            } => Span::SpanLink {
                content: self.walk_spans(content, changed),
                target,
                title,
                options,
            },
            Span::LinkIdReference {
                content,
                id,
                source,
                options,
            } => Span::LinkIdReference {
                content: self.walk_spans(content, changed),
                id,
                source,
                options,
            },
            Span::LinkPathReference {
                content,
                path,
                source,
                options,
            } => Span::LinkPathReference {
                content: self.walk_spans(content, changed),
                path,
                source,
                options,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::element::Options;

    fn sample_root() -> RootElement {
        RootElement::new(vec![
            Block::paragraph("one"),
            Block::QuotedBlock {
                content: vec![Block::paragraph("two")],
                attribution: vec![Span::text("someone")],
                options: Options::empty(),
            },
            Block::BulletList {
                items: vec![
                    ListItem::new(vec![Block::paragraph("three")]),
                    ListItem::new(vec![Block::paragraph("four")]),
                ],
                options: Options::empty(),
            },
        ])
    }

    fn text_contents(root: &RootElement) -> Vec<String> {
        let mut out = Vec::new();
        fn visit_blocks(blocks: &[Block], out: &mut Vec<String>) {
            for block in blocks {
                for span in block.child_spans() {
                    if let Span::Text { content, .. } = span {
                        out.push(content.clone());
                    }
                }
                visit_blocks(
                    &block
                        .child_blocks()
                        .into_iter()
                        .cloned()
                        .collect::<Vec<_>>(),
                    out,
                );
            }
        }
        visit_blocks(&root.content, &mut out);
        out
    }

    #[test]
    fn empty_rules_change_nothing() {
        let root = sample_root();
        let mut rules = RewriteRules::from_rule_sets(vec![]);
        let (rewritten, changed) = rules.rewrite_root(root.clone());
        assert!(!changed);
        assert_eq!(rewritten, root);
    }

    #[test]
    fn non_matching_rules_report_unchanged() {
        let root = sample_root();
        let set = RuleSet::bottom_up().with_span_rule(|span| match span {
            Span::Literal { .. } => Some(RewriteAction::Remove),
            _ => None,
        });
        let mut rules = RewriteRules::from_rule_sets(vec![set]);
        let (rewritten, changed) = rules.rewrite_root(root.clone());
        assert!(!changed);
        assert_eq!(rewritten, root);
    }

    #[test]
    fn bottom_up_replacement_is_not_revisited() {
        let set = RuleSet::bottom_up().with_span_rule(|span| match span {
            Span::Text { content, .. } => Some(RewriteAction::Replace(Span::text(format!(
                "{content}{content}"
            )))),
            _ => None,
        });
        let mut rules = RewriteRules::from_rule_sets(vec![set]);
        let (root, changed) = rules.rewrite_root(RootElement::new(vec![Block::paragraph("ab")]));
        assert!(changed);
        assert_eq!(text_contents(&root), ["abab"]);
    }

    #[test]
    fn replace_many_splices_blocks_in_place() {
        let set = RuleSet::bottom_up().with_block_rule(|block| match block {
            Block::QuotedBlock { content, .. } => {
                Some(RewriteAction::ReplaceMany(content.clone()))
            }
            _ => None,
        });
        let mut rules = RewriteRules::from_rule_sets(vec![set]);
        let (root, changed) = rules.rewrite_root(sample_root());
        assert!(changed);
        assert_eq!(root.content.len(), 3);
        assert!(matches!(root.content[1], Block::Paragraph { .. }));
    }

    #[test]
    fn remove_drops_nodes_everywhere() {
        let set = RuleSet::bottom_up().with_block_rule(|block| match block {
            Block::Paragraph { .. } => Some(RewriteAction::Remove),
            _ => None,
        });
        let mut rules = RewriteRules::from_rule_sets(vec![set]);
        let (root, changed) = rules.rewrite_root(sample_root());
        assert!(changed);
        // the quoted block and list survive, their paragraphs do not
        assert_eq!(root.content.len(), 2);
        assert!(text_contents(&root).iter().all(|t| t == "someone"));
    }

    #[test]
    fn first_matching_rule_wins() {
        let set = RuleSet::bottom_up()
            .with_span_rule(|span| match span {
                Span::Text { .. } => Some(RewriteAction::Replace(Span::text("first"))),
                _ => None,
            })
            .with_span_rule(|span| match span {
                Span::Text { .. } => Some(RewriteAction::Replace(Span::text("second"))),
                _ => None,
            });
        let mut rules = RewriteRules::from_rule_sets(vec![set]);
        let (root, _) = rules.rewrite_root(RootElement::new(vec![Block::paragraph("x")]));
        assert_eq!(text_contents(&root), ["first"]);
    }

    #[test]
    fn deferring_rule_falls_through_to_next_set() {
        let first = RuleSet::bottom_up().with_span_rule(|span| match span {
            Span::Text { content, .. } if content == "match" => {
                Some(RewriteAction::Replace(Span::text("hit")))
            }
            _ => None,
        });
        let second = RuleSet::bottom_up().with_span_rule(|span| match span {
            Span::Text { .. } => Some(RewriteAction::Replace(Span::text("fallback"))),
            _ => None,
        });
        let mut rules = RewriteRules::from_rule_sets(vec![first, second]);
        let (root, _) = rules.rewrite_root(RootElement::new(vec![
            Block::paragraph("match"),
            Block::paragraph("other"),
        ]));
        assert_eq!(text_contents(&root), ["hit", "fallback"]);
    }

    #[test]
    fn top_down_runs_before_children_bottom_up_after() {
        // the top-down rule rewrites the quote's attribution marker; a
        // bottom-up rule then sees the already-rewritten child text
        let top = RuleSet::top_down().with_block_rule(|block| match block {
            Block::QuotedBlock {
                content, options, ..
            } => Some(RewriteAction::Replace(Block::QuotedBlock {
                content: content.clone(),
                attribution: vec![Span::text("rewritten")],
                options: options.clone(),
            })),
            _ => None,
        });
        let bottom = RuleSet::bottom_up().with_span_rule(|span| match span {
            Span::Text { content, .. } if content == "rewritten" => {
                Some(RewriteAction::Replace(Span::text("seen")))
            }
            _ => None,
        });
        let mut rules = RewriteRules::from_rule_sets(vec![top, bottom]);
        let (root, changed) = rules.rewrite_root(sample_root());
        assert!(changed);
        assert!(text_contents(&root).contains(&"seen".to_string()));
    }

    #[test]
    fn section_headers_survive_hostile_rules() {
        let section = Block::Section {
            header: HeaderData {
                level: 2,
                content: vec![Span::text("kept")],
                options: Options::with_id("kept"),
            },
            content: vec![Block::paragraph("body")],
            options: Options::empty(),
        };
        let set = RuleSet::bottom_up().with_block_rule(|block| match block {
            Block::Header(_) => Some(RewriteAction::Remove),
            _ => None,
        });
        let mut rules = RewriteRules::from_rule_sets(vec![set]);
        let (root, _) = rules.rewrite_root(RootElement::new(vec![section]));
        match &root.content[0] {
            Block::Section { header, .. } => {
                assert_eq!(header.options.id.as_deref(), Some("kept"))
            }
            other => panic!("expected section, got {other:?}"),
        }
    }

    #[test]
    fn root_rules_see_the_whole_sequence() {
        let top = RuleSet::top_down().with_root_rule(|mut blocks| {
            let count = blocks.len();
            blocks.insert(0, Block::paragraph(format!("{count}")));
            (blocks, true)
        });
        // the walk still visits what the root rule inserted
        let bottom = RuleSet::bottom_up().with_span_rule(|span| match span {
            Span::Text { content, .. } if content == "3" => {
                Some(RewriteAction::Replace(Span::text("three")))
            }
            _ => None,
        });
        let mut rules = RewriteRules::from_rule_sets(vec![top, bottom]);
        let (root, changed) = rules.rewrite_root(sample_root());
        assert!(changed);
        assert_eq!(root.content.len(), 4);
        assert_eq!(text_contents(&root)[0], "three");
    }

    #[test]
    fn rule_state_accumulates_across_nodes() {
        let mut count = 0u32;
        let set = RuleSet::bottom_up().with_span_rule(move |span| match span {
            Span::Text { .. } => {
                count += 1;
                Some(RewriteAction::Replace(Span::text(format!("{count}"))))
            }
            _ => None,
        });
        let mut rules = RewriteRules::from_rule_sets(vec![set]);
        let (root, _) = rules.rewrite_root(RootElement::new(vec![
            Block::paragraph("a"),
            Block::paragraph("b"),
            Block::paragraph("c"),
        ]));
        assert_eq!(text_contents(&root), ["1", "2", "3"]);
    }
}
