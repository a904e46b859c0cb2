//! Render-phase translation of resolved links into output locations.
//!
//! Resolution works entirely on source paths. Once an output format is
//! fixed, every internal target is mapped to where the rendered file will
//! actually live: markup suffixes become the output suffix, versioned
//! documents gain the current version segment in HTML, and targets not
//! rendered to this format switch to their published fallback URL.

use crate::error::WeftError;
use crate::paths::TreePath;
use crate::rewrite::engine::{RewriteAction, RuleSet};
use crate::rewrite::registry::{OutputContext, RewritePhase};
use crate::tree::cursor::{DocumentCursor, TreeIndex};
use crate::tree::element::{InternalTarget, LinkTarget, Span};

pub fn translation_rules<'i>(
    cursor: &DocumentCursor<'i>,
    phase: &RewritePhase,
) -> Result<RuleSet<'i>, WeftError> {
    let Some(output) = phase.output().cloned() else {
        return Ok(RuleSet::bottom_up());
    };
    let cursor = cursor.clone();
    Ok(RuleSet::bottom_up().with_span_rule(move |span| match span {
        Span::SpanLink {
            content,
            target: LinkTarget::Internal(internal),
            title,
            options,
        } => translate_target(&cursor, &output, internal).map(|target| {
            RewriteAction::Replace(Span::SpanLink {
                content: content.clone(),
                target,
                title: title.clone(),
                options: options.clone(),
            })
        }),
        Span::Image {
            text,
            target: LinkTarget::Internal(internal),
            title,
            options,
        } => translate_target(&cursor, &output, internal).map(|target| {
            RewriteAction::Replace(Span::Image {
                text: text.clone(),
                target,
                title: title.clone(),
                options: options.clone(),
            })
        }),
        _ => None,
    }))
}

/// The rewritten target, or `None` when the link is already in output form.
fn translate_target(
    cursor: &DocumentCursor<'_>,
    output: &OutputContext,
    internal: &InternalTarget,
) -> Option<LinkTarget> {
    if !internal.formats.contains(&output.format) {
        // the fallback URL was provided by validation; a link without one
        // was already reported there and stays untouched
        return internal
            .external_fallback
            .as_ref()
            .map(|url| LinkTarget::external(url.clone()));
    }
    let absolute = translate_path(cursor.index, &internal.absolute, output);
    let ref_doc = translate_path(cursor.index, &cursor.path, output);
    let relative = absolute.relative_to(&ref_doc);
    if absolute == internal.absolute && relative == internal.relative {
        return None;
    }
    Some(LinkTarget::Internal(InternalTarget {
        absolute,
        relative,
        formats: internal.formats.clone(),
        external_fallback: internal.external_fallback.clone(),
    }))
}

/// Output location of a source path. Markup suffixes are replaced, static
/// files keep theirs.
pub fn translate_path(index: &TreeIndex, path: &TreePath, output: &OutputContext) -> TreePath {
    let mut translated = if index.is_markup_document(path) {
        path.with_suffix(&output.file_suffix)
    } else {
        path.clone()
    };
    if output.is_html() && index.is_versioned(path) {
        if let Some(versions) = index.versions() {
            if translated.segments().first() != Some(&versions.current) {
                translated = translated.prepend(versions.current.clone());
            }
        }
    }
    translated
}
