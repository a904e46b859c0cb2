//! Reference resolution rules for the resolve phase.
//!
//! Every lookup goes through the tables collected before the phase started,
//! so no rule ever scans the tree. A reference that cannot be resolved is
//! replaced by an invalid span carrying the exact failure and the original
//! source text, never an error: one dead link must not abort a rewrite.

use std::collections::VecDeque;

use tracing::debug;

use crate::config::LookupScope;
use crate::error::WeftError;
use crate::link::validate::{self, TargetLookup};
use crate::paths::{PathRef, TreePath};
use crate::resolve::collect::{citation_id, footnote_number_id, DocumentTargets, TargetKind};
use crate::rewrite::engine::{RewriteAction, RuleSet};
use crate::rewrite::registry::RewritePhase;
use crate::tree::cursor::DocumentCursor;
use crate::tree::element::{
    Block, FootnoteLabel, InternalTarget, LinkTarget, Options, Span,
};

fn duplicate_message(id: &str) -> String {
    format!("more than one target with id '{id}'")
}

fn ambiguous_message(id: &str) -> String {
    format!("ambiguous reference: more than one target with id '{id}'")
}

/// Converts every element carrying a duplicated explicit id into an invalid
/// element, so none of the claimants silently wins. Ids assigned during
/// footnote and citation conversion are checked by those rules instead.
pub fn duplicate_id_rules<'i>(
    cursor: &DocumentCursor<'i>,
    _phase: &RewritePhase,
) -> Result<RuleSet<'i>, WeftError> {
    let targets = cursor.targets();
    Ok(RuleSet::bottom_up()
        .with_block_rule(move |block| {
            // a header swapped for an invalid block would break the section
            // invariant, so headers are left to reference-side handling
            if matches!(block, Block::InvalidBlock { .. } | Block::Header(_)) {
                return None;
            }
            let id = block.id()?;
            targets.is_duplicate(id).then(|| {
                RewriteAction::Replace(Block::invalid(duplicate_message(id), block.clone()))
            })
        })
        .with_span_rule(move |span| {
            if matches!(span, Span::InvalidSpan { .. }) || span.is_reference() {
                return None;
            }
            let id = span.id()?;
            targets.is_duplicate(id).then(|| {
                RewriteAction::Replace(Span::invalid(duplicate_message(id), span.clone()))
            })
        }))
}

/// Footnote and citation conversion plus resolution of every reference
/// span. Definitions and references consume the positional autonumber and
/// autosymbol queues independently, both in document order.
pub fn reference_rules<'i>(
    cursor: &DocumentCursor<'i>,
    _phase: &RewritePhase,
) -> Result<RuleSet<'i>, WeftError> {
    let targets = cursor.targets();
    let mut autonumber_defs: VecDeque<(String, u32)> =
        targets.footnotes.autonumber_sequence.iter().cloned().collect();
    let mut autosymbol_defs: VecDeque<(String, String)> =
        targets.footnotes.autosymbol_sequence.iter().cloned().collect();
    let mut autonumber_refs: VecDeque<(String, u32)> =
        targets.footnotes.autonumber_sequence.iter().cloned().collect();
    let mut autosymbol_refs: VecDeque<(String, String)> =
        targets.footnotes.autosymbol_sequence.iter().cloned().collect();
    let mut anonymous_refs: VecDeque<String> =
        targets.anonymous_definitions.iter().cloned().collect();
    let block_cursor = cursor.clone();
    let span_cursor = cursor.clone();
    Ok(RuleSet::bottom_up()
        .with_block_rule(move |block| {
            resolve_block(&block_cursor, block, &mut autonumber_defs, &mut autosymbol_defs)
        })
        .with_span_rule(move |span| {
            resolve_span(
                &span_cursor,
                span,
                &mut autonumber_refs,
                &mut autosymbol_refs,
                &mut anonymous_refs,
            )
        }))
}

fn resolve_block(
    cursor: &DocumentCursor<'_>,
    block: &Block,
    autonumber_defs: &mut VecDeque<(String, u32)>,
    autosymbol_defs: &mut VecDeque<(String, String)>,
) -> Option<RewriteAction<Block>> {
    let targets = cursor.targets();
    match block {
        Block::FootnoteDefinition {
            label,
            content,
            options,
        } => {
            let resolved = match label {
                FootnoteLabel::NumericLabel(number) => {
                    Some((footnote_number_id(*number), number.to_string()))
                }
                FootnoteLabel::AutonumberLabel(name) => targets
                    .footnotes
                    .by_name
                    .get(&name.to_lowercase())
                    .map(|(id, number)| (id.clone(), number.to_string())),
                FootnoteLabel::Autonumber => autonumber_defs
                    .pop_front()
                    .map(|(id, number)| (id, number.to_string())),
                FootnoteLabel::Autosymbol => autosymbol_defs.pop_front(),
            };
            let Some((id, display)) = resolved else {
                debug!(
                    "[resolve_block] footnote definition in {} has no collected assignment",
                    cursor.path
                );
                return None;
            };
            if targets.is_duplicate(&id) {
                return Some(RewriteAction::Replace(Block::invalid(
                    duplicate_message(&id),
                    block.clone(),
                )));
            }
            let mut options = options.clone();
            options.id = Some(id);
            Some(RewriteAction::Replace(Block::Footnote {
                label: display,
                content: content.clone(),
                options,
            }))
        }
        Block::Citation {
            label,
            content,
            options,
        } if options.id.is_none() => {
            let id = citation_id(label);
            if targets.is_duplicate(&id) {
                return Some(RewriteAction::Replace(Block::invalid(
                    duplicate_message(&id),
                    block.clone(),
                )));
            }
            let mut options = options.clone();
            options.id = Some(id);
            Some(RewriteAction::Replace(Block::Citation {
                label: label.clone(),
                content: content.clone(),
                options,
            }))
        }
        // consumed by resolution, gone from the output tree
        Block::LinkDefinition { .. } | Block::LinkAlias { .. } => Some(RewriteAction::Remove),
        _ => None,
    }
}

fn resolve_span(
    cursor: &DocumentCursor<'_>,
    span: &Span,
    autonumber_refs: &mut VecDeque<(String, u32)>,
    autosymbol_refs: &mut VecDeque<(String, String)>,
    anonymous_refs: &mut VecDeque<String>,
) -> Option<RewriteAction<Span>> {
    let replacement = match span {
        Span::FootnoteReference { label, source, .. } => {
            resolve_footnote_reference(cursor, label, source, autonumber_refs, autosymbol_refs)
        }
        Span::CitationReference { label, source, .. } => {
            resolve_citation_reference(cursor, label, source)
        }
        Span::LinkIdReference {
            content,
            id,
            source,
            ..
        } => resolve_link_id(cursor, content, id, source, anonymous_refs),
        Span::ImageIdReference {
            text, id, source, ..
        } => resolve_image_id(cursor, text, id, source),
        Span::LinkPathReference {
            content,
            path,
            source,
            ..
        } => resolve_link_path(cursor, content, path, source),
        Span::ImagePathReference {
            text, path, source, ..
        } => resolve_image_path(cursor, text, path, source),
        _ => return None,
    };
    Some(RewriteAction::Replace(replacement))
}

fn resolve_footnote_reference(
    cursor: &DocumentCursor<'_>,
    label: &FootnoteLabel,
    source: &str,
    autonumber_refs: &mut VecDeque<(String, u32)>,
    autosymbol_refs: &mut VecDeque<(String, String)>,
) -> Span {
    let targets = cursor.targets();
    let resolved = match label {
        FootnoteLabel::NumericLabel(number) => match targets.footnotes.by_number.get(number) {
            Some(id) => Ok((id.clone(), number.to_string())),
            None => Err(format!("unresolved footnote reference: {label}")),
        },
        FootnoteLabel::AutonumberLabel(name) => {
            match targets.footnotes.by_name.get(&name.to_lowercase()) {
                Some((id, number)) => Ok((id.clone(), number.to_string())),
                None => Err(format!("unresolved footnote reference: {label}")),
            }
        }
        FootnoteLabel::Autonumber => match autonumber_refs.pop_front() {
            Some((id, number)) => Ok((id, number.to_string())),
            None => Err("too many autonumber references".to_string()),
        },
        FootnoteLabel::Autosymbol => match autosymbol_refs.pop_front() {
            Some((id, symbol)) => Ok((id, symbol)),
            None => Err("too many autosymbol references".to_string()),
        },
    };
    match resolved {
        Ok((ref_id, _)) if targets.is_duplicate(&ref_id) => {
            Span::invalid_source(ambiguous_message(&ref_id), source)
        }
        Ok((ref_id, label)) => Span::FootnoteLink {
            ref_id,
            label,
            options: Options::empty(),
        },
        Err(message) => Span::invalid_source(message, source),
    }
}

fn resolve_citation_reference(cursor: &DocumentCursor<'_>, label: &str, source: &str) -> Span {
    let targets = cursor.targets();
    match targets.citations.get(&label.to_lowercase()) {
        Some(id) if targets.is_duplicate(id) => {
            Span::invalid_source(ambiguous_message(id), source)
        }
        Some(id) => Span::CitationLink {
            ref_id: id.clone(),
            label: label.to_string(),
            options: Options::empty(),
        },
        None => Span::invalid_source(format!("unresolved citation reference: {label}"), source),
    }
}

/// Resolution of an id within one document's tables, following alias
/// redirects until an actual target or a cycle shows up.
enum DocResolution {
    Fragment(String),
    Definition {
        target: String,
        title: Option<String>,
    },
    /// Cycle detected; carries the last alias followed.
    Circular(String),
    NotFound,
}

fn resolve_in_document(targets: &DocumentTargets, id: &str) -> DocResolution {
    let mut current = id.to_string();
    let mut visited: Vec<String> = Vec::new();
    loop {
        match targets.lookup(&current) {
            Some(TargetKind::Alias { target }) => {
                if target == &current || visited.contains(target) {
                    return DocResolution::Circular(current);
                }
                visited.push(std::mem::replace(&mut current, target.clone()));
            }
            Some(TargetKind::Fragment) => return DocResolution::Fragment(current),
            Some(TargetKind::Definition { target, title }) => {
                return DocResolution::Definition {
                    target: target.clone(),
                    title: title.clone(),
                }
            }
            None => return DocResolution::NotFound,
        }
    }
}

fn resolve_link_id(
    cursor: &DocumentCursor<'_>,
    content: &[Span],
    id: &str,
    source: &str,
    anonymous_refs: &mut VecDeque<String>,
) -> Span {
    if id.is_empty() {
        return match anonymous_refs.pop_front() {
            Some(raw) => link_to_raw_target(cursor, content, &raw, None, source),
            None => Span::invalid_source("too many anonymous references", source),
        };
    }
    let targets = cursor.targets();
    for scope in cursor.link_precedence() {
        match scope {
            LookupScope::Document => match resolve_in_document(targets, id) {
                DocResolution::Fragment(fragment) => {
                    if targets.is_duplicate(&fragment) {
                        return Span::invalid_source(ambiguous_message(&fragment), source);
                    }
                    let mut target = InternalTarget::from_absolute(
                        cursor.path.with_fragment(fragment),
                        &cursor.path,
                    );
                    target.formats = cursor
                        .index
                        .target_formats_of(&cursor.path)
                        .unwrap_or_default();
                    return span_link(content, LinkTarget::Internal(target), None);
                }
                DocResolution::Definition { target, title } => {
                    return link_to_raw_target(cursor, content, &target, title, source);
                }
                DocResolution::Circular(alias) => {
                    return Span::invalid_source(
                        format!("circular link reference: {alias}"),
                        source,
                    );
                }
                DocResolution::NotFound => {}
            },
            LookupScope::Tree => {
                if let Some(resolved) =
                    resolve_in_tree(cursor, content, id, source, &cursor.parent())
                {
                    return resolved;
                }
            }
            LookupScope::Ancestors => {
                let mut tree = cursor.parent();
                while !tree.is_root() {
                    tree = tree.parent();
                    if let Some(resolved) = resolve_in_tree(cursor, content, id, source, &tree) {
                        return resolved;
                    }
                }
            }
        }
    }
    if let Some(raw) = cursor.global_link_target(id) {
        return link_to_raw_target(cursor, content, &raw, None, source);
    }
    Span::invalid_source(format!("unresolved link id reference: {id}"), source)
}

/// Looks for an element carrying `id` in the other documents of the tree at
/// `tree`, navigation order. Only element ids participate here, link
/// definitions stay local to their document.
fn resolve_in_tree(
    cursor: &DocumentCursor<'_>,
    content: &[Span],
    id: &str,
    source: &str,
    tree: &TreePath,
) -> Option<Span> {
    for doc_path in cursor.index.tree_documents(tree) {
        if *doc_path == cursor.path {
            continue;
        }
        let Some(meta) = cursor.index.document(doc_path) else {
            continue;
        };
        if !meta.targets.has_id(id) {
            continue;
        }
        if meta.targets.is_duplicate(id) {
            return Some(Span::invalid_source(ambiguous_message(id), source));
        }
        return Some(build_internal_link(
            cursor,
            content,
            doc_path.with_fragment(id),
            None,
            source,
        ));
    }
    None
}

fn resolve_image_id(cursor: &DocumentCursor<'_>, text: &str, id: &str, source: &str) -> Span {
    match resolve_in_document(cursor.targets(), id) {
        DocResolution::Definition { target, title } => {
            image_to_raw_target(cursor, text, &target, title, source)
        }
        DocResolution::Circular(alias) => {
            Span::invalid_source(format!("circular link reference: {alias}"), source)
        }
        DocResolution::NotFound => match cursor.global_link_target(id) {
            Some(raw) => image_to_raw_target(cursor, text, &raw, None, source),
            None => Span::invalid_source(
                format!("unresolved image id reference: {id}"),
                source,
            ),
        },
        // a fragment is not an image source
        DocResolution::Fragment(_) => Span::invalid_source(
            format!("unresolved image id reference: {id}"),
            source,
        ),
    }
}

fn resolve_link_path(
    cursor: &DocumentCursor<'_>,
    content: &[Span],
    path: &PathRef,
    source: &str,
) -> Span {
    match path.canonicalize(&cursor.path) {
        Some(absolute) => build_internal_link(cursor, content, absolute, None, source),
        // climbing above the virtual root addresses something outside the
        // tree, rendered verbatim as an external link
        None => span_link(content, LinkTarget::external(path.to_string()), None),
    }
}

fn resolve_image_path(
    cursor: &DocumentCursor<'_>,
    text: &str,
    path: &PathRef,
    source: &str,
) -> Span {
    match path.canonicalize(&cursor.path) {
        Some(absolute) => match internal_span_target(cursor, absolute, true, source) {
            Ok(target) => image_span(text, LinkTarget::Internal(target), None),
            Err(invalid) => invalid,
        },
        None => image_span(text, LinkTarget::external(path.to_string()), None),
    }
}

/// Builds a link from a raw definition target, which is either an external
/// URL or a path into the tree.
fn link_to_raw_target(
    cursor: &DocumentCursor<'_>,
    content: &[Span],
    raw: &str,
    title: Option<String>,
    source: &str,
) -> Span {
    if LinkTarget::is_external_form(raw) {
        return span_link(content, LinkTarget::external(raw), title);
    }
    match PathRef::parse(raw).canonicalize(&cursor.path) {
        Some(absolute) => match internal_span_target(cursor, absolute, false, source) {
            Ok(target) => span_link(content, LinkTarget::Internal(target), title),
            Err(invalid) => invalid,
        },
        None => span_link(content, LinkTarget::external(raw), title),
    }
}

fn image_to_raw_target(
    cursor: &DocumentCursor<'_>,
    text: &str,
    raw: &str,
    title: Option<String>,
    source: &str,
) -> Span {
    if LinkTarget::is_external_form(raw) {
        return image_span(text, LinkTarget::external(raw), title);
    }
    match PathRef::parse(raw).canonicalize(&cursor.path) {
        Some(absolute) => match internal_span_target(cursor, absolute, true, source) {
            Ok(target) => image_span(text, LinkTarget::Internal(target), title),
            Err(invalid) => invalid,
        },
        None => image_span(text, LinkTarget::external(raw), title),
    }
}

fn build_internal_link(
    cursor: &DocumentCursor<'_>,
    content: &[Span],
    absolute: TreePath,
    title: Option<String>,
    source: &str,
) -> Span {
    match internal_span_target(cursor, absolute, false, source) {
        Ok(target) => span_link(content, LinkTarget::Internal(target), title),
        Err(invalid) => invalid,
    }
}

/// Validates and assembles an internal target, or the invalid span standing
/// in for the reference.
fn internal_span_target(
    cursor: &DocumentCursor<'_>,
    absolute: TreePath,
    is_image: bool,
    source: &str,
) -> Result<InternalTarget, Span> {
    match validate::internal_target(cursor, &absolute, is_image) {
        TargetLookup::Valid { formats } => {
            let mut target = InternalTarget::from_absolute(absolute, &cursor.path);
            target.formats = formats;
            Ok(target)
        }
        TargetLookup::Recovered { url, formats } => {
            let mut target = InternalTarget::from_absolute(absolute, &cursor.path);
            target.formats = formats;
            target.external_fallback = Some(url);
            Ok(target)
        }
        TargetLookup::Invalid { message } => Err(Span::invalid_source(message, source)),
    }
}

fn span_link(content: &[Span], target: LinkTarget, title: Option<String>) -> Span {
    Span::SpanLink {
        content: content.to_vec(),
        target,
        title,
        options: Options::empty(),
    }
}

fn image_span(text: &str, target: LinkTarget, title: Option<String>) -> Span {
    Span::Image {
        text: text.to_string(),
        target,
        title,
        options: Options::empty(),
    }
}
