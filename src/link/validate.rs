//! Format-aware validation of internal references.
//!
//! A link is only valid when its target is rendered to every output format
//! of the referencing document, otherwise the rendered output would contain
//! a dead link in the formats the target skips. When the target is at least
//! published as HTML and a site base URL is configured, the link degrades
//! to an absolute URL into the published site instead of failing.

use tracing::trace;
use url::Url;

use crate::paths::TreePath;
use crate::tree::cursor::{DocumentCursor, TreeIndex};
use crate::tree::element::TargetFormats;

/// Outcome of validating one internal reference.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetLookup {
    /// The target exists and covers every format this document renders to.
    Valid { formats: TargetFormats },
    /// Restricted target reachable through its published HTML location.
    Recovered { url: String, formats: TargetFormats },
    Invalid { message: String },
}

/// Validates `target` as referenced from the cursor's document.
pub fn internal_target(
    cursor: &DocumentCursor<'_>,
    target: &TreePath,
    is_image: bool,
) -> TargetLookup {
    let clean = target.without_fragment();
    let is_markup = cursor.index.is_markup_document(&clean);
    let exists = if is_markup {
        match target.fragment() {
            Some(id) => cursor.index.has_target_id(&clean, id),
            None => true,
        }
    } else {
        cursor.index.static_document(&clean).is_some()
    };
    if !exists {
        return TargetLookup::Invalid {
            message: format!("unresolved internal reference: {target}"),
        };
    }
    let target_formats = cursor.index.target_formats_of(&clean).unwrap_or_default();
    let source_formats = cursor.target_formats();
    if target_formats.covers(&source_formats) {
        return TargetLookup::Valid {
            formats: target_formats,
        };
    }
    if !is_image && target_formats.contains("html") {
        if let Some(base) = cursor.site_base_url() {
            let url = published_url(&base, target, is_markup, cursor.index);
            trace!(
                "[validate::internal_target] {} -> {clean} downgraded to {url}",
                cursor.path
            );
            return TargetLookup::Recovered {
                url,
                formats: TargetFormats::selected(["html"]),
            };
        }
    }
    let message = if is_image {
        format!("cannot reference image '{clean}' with restricted output formats")
    } else {
        format!(
            "document for {} cannot reference document '{clean}' with restricted output \
             formats unless html is one of the formats and siteBaseUrl is defined",
            source_formats.describe()
        )
    };
    TargetLookup::Invalid { message }
}

/// Absolute URL of the published HTML form of `target`.
fn published_url(base: &Url, target: &TreePath, is_markup: bool, index: &TreeIndex) -> String {
    let clean = target.without_fragment();
    let mut path = if is_markup {
        clean.with_suffix("html")
    } else {
        clean.clone()
    };
    if index.is_versioned(&clean) {
        if let Some(versions) = index.versions() {
            path = path.prepend(versions.current.clone());
        }
    }
    let mut url = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.to_string().trim_start_matches('/')
    );
    if let Some(fragment) = target.fragment() {
        url.push('#');
        url.push_str(fragment);
    }
    url
}
