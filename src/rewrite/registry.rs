//! Registration and composition of rewrite rule sets.
//!
//! Each concern (section structure, reference resolution, numbering, path
//! translation) registers a builder together with the set of phases it
//! participates in. For one document and one phase the registry calls every
//! matching builder with the document's cursor, giving it the chance to
//! compute symbol tables once, and hands the resulting rule sets to the
//! engine in registration order. Library defaults are registered first so
//! user rules compose behind them and see what the defaults left untouched.
//!
//! A failing builder does not abort the document: the error is reported
//! back to the rewrite driver, which prepends an invalid block to the
//! document instead.

use enumset::{EnumSet, EnumSetType};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::WeftError;
use crate::rewrite::engine::RuleSet;
use crate::tree::cursor::DocumentCursor;

/// Phase tags rule sets declare themselves for.
#[derive(EnumSetType, Debug)]
pub enum PhaseKind {
    /// Local structure building, before any symbol table exists.
    Build,
    /// Cross-document reference resolution and validation.
    Resolve,
    /// Output-format-specific rewriting of an already resolved tree.
    Render,
}

/// Rendering parameters for the [Render](RewritePhase::Render) phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputContext {
    /// Output file suffix, possibly composite, e.g. `epub.xhtml`.
    pub file_suffix: String,
    /// Format selector matched against `TargetFormats` entries.
    pub format: String,
}

impl OutputContext {
    pub fn new(file_suffix: impl Into<String>, format: impl Into<String>) -> Self {
        OutputContext {
            file_suffix: file_suffix.into(),
            format: format.into(),
        }
    }

    pub fn html() -> Self {
        OutputContext::new("html", "html")
    }

    pub fn epub() -> Self {
        OutputContext::new("epub.xhtml", "epub")
    }

    pub fn xsl_fo() -> Self {
        OutputContext::new("fo", "fo")
    }

    pub fn is_html(&self) -> bool {
        self.format == "html"
    }
}

/// The phase a rewrite pass runs in, in strict order: documents are built,
/// then resolved, then rewritten once per output format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewritePhase {
    Build,
    Resolve,
    Render(OutputContext),
}

impl RewritePhase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            RewritePhase::Build => PhaseKind::Build,
            RewritePhase::Resolve => PhaseKind::Resolve,
            RewritePhase::Render(_) => PhaseKind::Render,
        }
    }

    /// The output context, present only while rendering.
    pub fn output(&self) -> Option<&OutputContext> {
        match self {
            RewritePhase::Render(context) => Some(context),
            _ => None,
        }
    }
}

type BuilderFn =
    Box<dyn for<'i> Fn(&DocumentCursor<'i>, &RewritePhase) -> Result<RuleSet<'i>, WeftError>>;

struct RegistryEntry {
    name: String,
    phases: EnumSet<PhaseKind>,
    builder: BuilderFn,
}

/// Ordered collection of rule-set builders.
pub struct RuleRegistry {
    entries: Vec<RegistryEntry>,
}

impl Default for RuleRegistry {
    fn default() -> Self {
        RuleRegistry::with_defaults()
    }
}

impl RuleRegistry {
    /// A registry without any rules, for callers composing from scratch.
    pub fn empty() -> Self {
        RuleRegistry {
            entries: Vec::new(),
        }
    }

    /// The library defaults: section structure in the build phase,
    /// duplicate-id conversion, reference resolution and section numbering
    /// in the resolve phase, path translation in the render phase.
    pub fn with_defaults() -> Self {
        let mut registry = RuleRegistry::empty();
        registry.register(
            "section-structure",
            PhaseKind::Build.into(),
            crate::resolve::section::structure_rules,
        );
        registry.register(
            "duplicate-ids",
            PhaseKind::Resolve.into(),
            crate::resolve::rules::duplicate_id_rules,
        );
        registry.register(
            "references",
            PhaseKind::Resolve.into(),
            crate::resolve::rules::reference_rules,
        );
        registry.register(
            "section-numbers",
            PhaseKind::Resolve.into(),
            crate::resolve::section::numbering_rules,
        );
        registry.register(
            "path-translation",
            PhaseKind::Render.into(),
            crate::link::translate::translation_rules,
        );
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, phases: EnumSet<PhaseKind>, builder: F)
    where
        F: for<'i> Fn(&DocumentCursor<'i>, &RewritePhase) -> Result<RuleSet<'i>, WeftError>
            + 'static,
    {
        self.entries.push(RegistryEntry {
            name: name.into(),
            phases,
            builder: Box::new(builder),
        });
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.name.as_str()).collect()
    }

    /// Builds the rule sets participating in `phase` for one document.
    /// Builder failures are collected rather than propagated so a bad
    /// configuration degrades to an in-tree diagnostic.
    pub fn build_for<'i>(
        &self,
        cursor: &DocumentCursor<'i>,
        phase: &RewritePhase,
    ) -> (Vec<RuleSet<'i>>, Vec<WeftError>) {
        let mut sets = Vec::new();
        let mut errors = Vec::new();
        for entry in &self.entries {
            if !entry.phases.contains(phase.kind()) {
                continue;
            }
            match (entry.builder)(cursor, phase) {
                Ok(set) => {
                    if !set.is_empty() {
                        sets.push(set);
                    }
                }
                Err(err) => {
                    debug!(
                        "[RuleRegistry::build_for] builder '{}' failed for {}: {err}",
                        entry.name, cursor.path
                    );
                    errors.push(err);
                }
            }
        }
        (sets, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_are_strictly_ordered_tags() {
        assert_eq!(RewritePhase::Build.kind(), PhaseKind::Build);
        assert_eq!(RewritePhase::Resolve.kind(), PhaseKind::Resolve);
        assert_eq!(
            RewritePhase::Render(OutputContext::html()).kind(),
            PhaseKind::Render
        );
        let both = PhaseKind::Build | PhaseKind::Resolve;
        assert!(both.contains(PhaseKind::Build));
        assert!(!both.contains(PhaseKind::Render));
    }

    #[test]
    fn output_context_selectors() {
        assert!(OutputContext::html().is_html());
        assert!(!OutputContext::epub().is_html());
        assert_eq!(OutputContext::epub().file_suffix, "epub.xhtml");
        assert_eq!(RewritePhase::Resolve.output(), None);
    }

    #[test]
    fn default_registry_lists_core_concerns() {
        let registry = RuleRegistry::with_defaults();
        let names = registry.names();
        assert_eq!(
            names,
            [
                "section-structure",
                "duplicate-ids",
                "references",
                "section-numbers",
                "path-translation"
            ]
        );
    }
}
