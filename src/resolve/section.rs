//! Section structure and numbering.
//!
//! Parsers emit headers as flat siblings of their content. The build phase
//! turns that sequence into nested sections, gives every header a stable
//! slug id, and can promote the leading header to the document title. The
//! resolve phase then prefixes headers with their section number according
//! to the configured numbering scope.

use std::collections::BTreeSet;

use crate::config::{AutonumberConfig, NumberingScope};
use crate::error::WeftError;
use crate::paths::slugify;
use crate::rewrite::engine::RuleSet;
use crate::rewrite::registry::RewritePhase;
use crate::tree::cursor::DocumentCursor;
use crate::tree::document::TreePosition;
use crate::tree::element::{extract_text, Block, HeaderData, Options, Span};

/// Build-phase restructuring: headers and their following siblings become
/// nested sections.
pub fn structure_rules<'i>(
    cursor: &DocumentCursor<'i>,
    _phase: &RewritePhase,
) -> Result<RuleSet<'i>, WeftError> {
    let promote_title = cursor.first_header_as_title();
    Ok(RuleSet::top_down().with_root_rule(move |blocks| restructure(blocks, promote_title)))
}

fn restructure(blocks: Vec<Block>, promote_title: bool) -> (Vec<Block>, bool) {
    if !blocks.iter().any(|block| matches!(block, Block::Header(_))) {
        return (blocks, false);
    }
    let mut used = BTreeSet::new();
    collect_block_ids(&blocks, &mut used);
    let mut blocks = blocks;
    for block in &mut blocks {
        if let Block::Header(header) = block {
            if header.options.id.is_none() {
                header.options.id =
                    Some(unique_slug(&extract_text(&header.content), &mut used));
            }
        }
    }
    if promote_title {
        promote_first_header(&mut blocks);
    }
    (nest_sections(blocks), true)
}

fn collect_block_ids(blocks: &[Block], used: &mut BTreeSet<String>) {
    for block in blocks {
        if let Some(id) = block.id() {
            used.insert(id.to_string());
        }
        if let Block::Section { header, .. } = block {
            if let Some(id) = &header.options.id {
                used.insert(id.clone());
            }
        }
        for span in block.child_spans() {
            collect_span_ids(span, used);
        }
        for child in block.child_blocks() {
            collect_block_ids(std::slice::from_ref(child), used);
        }
    }
}

fn collect_span_ids(span: &Span, used: &mut BTreeSet<String>) {
    if let Some(id) = span.id() {
        used.insert(id.to_string());
    }
    for child in span.child_spans() {
        collect_span_ids(child, used);
    }
}

/// Slug for a header text, extended by a counter until it is unique within
/// the document.
fn unique_slug(text: &str, used: &mut BTreeSet<String>) -> String {
    let base = match slugify(text) {
        slug if slug.is_empty() => "section".to_string(),
        slug => slug,
    };
    let mut candidate = base.clone();
    let mut counter = 1;
    while used.contains(&candidate) {
        candidate = format!("{base}-{counter}");
        counter += 1;
    }
    used.insert(candidate.clone());
    candidate
}

/// Turns the first header into the document title when it is the only
/// header on the document's highest level.
fn promote_first_header(blocks: &mut [Block]) {
    let levels: Vec<u32> = blocks
        .iter()
        .filter_map(|block| match block {
            Block::Header(header) => Some(header.level),
            _ => None,
        })
        .collect();
    let Some(&min_level) = levels.iter().min() else {
        return;
    };
    if levels.iter().filter(|&&level| level == min_level).count() != 1
        || levels.first() != Some(&min_level)
    {
        return;
    }
    for block in blocks.iter_mut() {
        if let Block::Header(header) = block {
            *block = Block::Title {
                content: std::mem::take(&mut header.content),
                options: std::mem::take(&mut header.options),
            };
            return;
        }
    }
}

fn nest_sections(blocks: Vec<Block>) -> Vec<Block> {
    struct Open {
        level: u32,
        header: HeaderData,
        content: Vec<Block>,
    }
    fn close(open: Open, stack: &mut Vec<Open>, out: &mut Vec<Block>) {
        let section = Block::Section {
            header: open.header,
            content: open.content,
            options: Options::empty(),
        };
        match stack.last_mut() {
            Some(parent) => parent.content.push(section),
            None => out.push(section),
        }
    }
    let mut out = Vec::new();
    let mut stack: Vec<Open> = Vec::new();
    for block in blocks {
        match block {
            Block::Header(header) => {
                while let Some(open) = stack.pop() {
                    if open.level >= header.level {
                        close(open, &mut stack, &mut out);
                    } else {
                        stack.push(open);
                        break;
                    }
                }
                stack.push(Open {
                    level: header.level,
                    header,
                    content: Vec::new(),
                });
            }
            other => match stack.last_mut() {
                Some(open) => open.content.push(other),
                None => out.push(other),
            },
        }
    }
    while let Some(open) = stack.pop() {
        close(open, &mut stack, &mut out);
    }
    out
}

/// Resolve-phase numbering. An invalid scope fails the builder, which
/// surfaces as an invalid element at the start of the document.
pub fn numbering_rules<'i>(
    cursor: &DocumentCursor<'i>,
    _phase: &RewritePhase,
) -> Result<RuleSet<'i>, WeftError> {
    let config = cursor.autonumbering();
    let scope = config.parsed_scope()?;
    if scope == NumberingScope::None {
        return Ok(RuleSet::top_down());
    }
    let position = cursor.position.clone();
    Ok(RuleSet::top_down()
        .with_root_rule(move |blocks| number_document(blocks, scope, &config, &position)))
}

fn number_document(
    mut blocks: Vec<Block>,
    scope: NumberingScope,
    config: &AutonumberConfig,
    position: &TreePosition,
) -> (Vec<Block>, bool) {
    let mut changed = false;
    let prefix: Vec<u32> = if scope.numbers_documents() {
        position.as_slice().to_vec()
    } else {
        Vec::new()
    };
    if scope.numbers_documents() && config.within_depth(prefix.len() as u32) {
        if let Some(Block::Title { content, .. }) = blocks
            .iter_mut()
            .find(|block| matches!(block, Block::Title { .. }))
        {
            changed |= insert_number(content, prefix.clone());
        }
    }
    if scope.numbers_sections() {
        changed |= number_sections(&mut blocks, &prefix, config);
    }
    (blocks, changed)
}

fn number_sections(blocks: &mut [Block], prefix: &[u32], config: &AutonumberConfig) -> bool {
    let mut changed = false;
    let mut index = 0u32;
    for block in blocks {
        if let Block::Section {
            header, content, ..
        } = block
        {
            index += 1;
            let mut position = prefix.to_vec();
            position.push(index);
            if config.within_depth(position.len() as u32) {
                changed |= insert_number(&mut header.content, position.clone());
                changed |= number_sections(content, &position, config);
            }
        }
    }
    changed
}

/// Prepends the number span unless the header is already numbered.
fn insert_number(content: &mut Vec<Span>, position: Vec<u32>) -> bool {
    if matches!(content.first(), Some(Span::SectionNumber { .. })) {
        return false;
    }
    content.insert(
        0,
        Span::SectionNumber {
            position,
            options: Options::empty(),
        },
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn section_ids(blocks: &[Block]) -> Vec<String> {
        let mut out = Vec::new();
        for block in blocks {
            if let Block::Section {
                header, content, ..
            } = block
            {
                out.push(header.options.id.clone().unwrap_or_default());
                out.extend(section_ids(content));
            }
        }
        out
    }

    #[test]
    fn headers_nest_into_sections() {
        let (blocks, changed) = restructure(
            vec![
                Block::header(1, "Top"),
                Block::paragraph("intro"),
                Block::header(2, "First"),
                Block::paragraph("a"),
                Block::header(3, "Deep"),
                Block::paragraph("b"),
                Block::header(2, "Second"),
                Block::paragraph("c"),
            ],
            false,
        );
        assert!(changed);
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            Block::Section {
                header, content, ..
            } => {
                assert_eq!(header.level, 1);
                // intro paragraph plus the two level-2 sections
                assert_eq!(content.len(), 3);
                assert!(matches!(content[0], Block::Paragraph { .. }));
                match &content[1] {
                    Block::Section { content, .. } => {
                        assert!(matches!(content[1], Block::Section { .. }))
                    }
                    other => panic!("expected section, got {other:?}"),
                }
            }
            other => panic!("expected section, got {other:?}"),
        }
    }

    #[test]
    fn title_promotion_flattens_the_root() {
        let (blocks, _) = restructure(
            vec![
                Block::header(1, "Title"),
                Block::header(2, "First"),
                Block::header(3, "Inner"),
                Block::header(2, "Second"),
                Block::header(3, "Other"),
            ],
            true,
        );
        assert!(matches!(blocks[0], Block::Title { .. }));
        assert_eq!(blocks.len(), 3);
        assert_eq!(
            section_ids(&blocks),
            vec!["first", "inner", "second", "other"]
        );
    }

    #[test]
    fn title_is_not_promoted_among_peers() {
        let (blocks, _) = restructure(
            vec![
                Block::header(1, "One"),
                Block::header(1, "Two"),
            ],
            true,
        );
        assert!(blocks.iter().all(|b| matches!(b, Block::Section { .. })));
    }

    #[test]
    fn slugs_are_deduplicated() {
        let (blocks, _) = restructure(
            vec![
                Block::header(2, "Setup"),
                Block::header(2, "Setup"),
                Block::header(2, "Setup"),
            ],
            false,
        );
        assert_eq!(section_ids(&blocks), vec!["setup", "setup-1", "setup-2"]);
    }

    #[test]
    fn explicit_header_ids_survive() {
        let mut custom = Block::header(2, "Custom");
        if let Block::Header(header) = &mut custom {
            header.options.id = Some("kept".to_string());
        }
        let (blocks, _) = restructure(vec![custom, Block::header(2, "Kept")], false);
        // the explicit id wins, the slug of the second header steps aside
        assert_eq!(section_ids(&blocks), vec!["kept", "kept-1"]);
    }

    #[test]
    fn restructuring_is_idempotent() {
        let (once, _) = restructure(
            vec![
                Block::header(1, "Title"),
                Block::header(2, "Section"),
                Block::paragraph("body"),
            ],
            true,
        );
        let (twice, changed) = restructure(once.clone(), true);
        assert!(!changed);
        assert_eq!(once, twice);
    }

    fn sample_sections() -> Vec<Block> {
        let (blocks, _) = restructure(
            vec![
                Block::header(1, "Title"),
                Block::header(2, "First"),
                Block::header(3, "Deep"),
                Block::header(2, "Second"),
            ],
            true,
        );
        blocks
    }

    fn header_numbers(blocks: &[Block]) -> Vec<Vec<u32>> {
        let mut out = Vec::new();
        for block in blocks {
            if let Block::Section {
                header, content, ..
            } = block
            {
                if let Some(Span::SectionNumber { position, .. }) = header.content.first() {
                    out.push(position.clone());
                }
                out.extend(header_numbers(content));
            }
        }
        out
    }

    #[test]
    fn sections_scope_numbers_without_document_position() {
        let config = AutonumberConfig {
            scope: "sections".to_string(),
            depth: 0,
        };
        let (blocks, changed) = number_document(
            sample_sections(),
            NumberingScope::Sections,
            &config,
            &TreePosition::root().child(3),
        );
        assert!(changed);
        assert_eq!(header_numbers(&blocks), vec![vec![1], vec![1, 1], vec![2]]);
        // the title stays unnumbered in sections scope
        assert!(matches!(
            &blocks[0],
            Block::Title { content, .. } if !matches!(content.first(), Some(Span::SectionNumber { .. }))
        ));
    }

    #[test]
    fn all_scope_prefixes_the_document_position() {
        let config = AutonumberConfig {
            scope: "all".to_string(),
            depth: 0,
        };
        let (blocks, _) = number_document(
            sample_sections(),
            NumberingScope::All,
            &config,
            &TreePosition::root().child(2),
        );
        assert_eq!(
            header_numbers(&blocks),
            vec![vec![2, 1], vec![2, 1, 1], vec![2, 2]]
        );
        assert!(matches!(
            &blocks[0],
            Block::Title { content, .. }
                if matches!(content.first(), Some(Span::SectionNumber { position, .. }) if position == &vec![2])
        ));
    }

    #[test]
    fn depth_limits_total_digits() {
        let config = AutonumberConfig {
            scope: "all".to_string(),
            depth: 2,
        };
        let (blocks, _) = number_document(
            sample_sections(),
            NumberingScope::All,
            &config,
            &TreePosition::root().child(2),
        );
        // [2,1,1] has three digits and stays unnumbered
        assert_eq!(header_numbers(&blocks), vec![vec![2, 1], vec![2, 2]]);
    }

    #[test]
    fn numbering_is_idempotent() {
        let config = AutonumberConfig {
            scope: "sections".to_string(),
            depth: 0,
        };
        let (once, _) = number_document(
            sample_sections(),
            NumberingScope::Sections,
            &config,
            &TreePosition::root().child(1),
        );
        let (twice, changed) = number_document(
            once.clone(),
            NumberingScope::Sections,
            &config,
            &TreePosition::root().child(1),
        );
        assert!(!changed);
        assert_eq!(once, twice);
    }
}
