//! Typed per-document and per-tree configuration.
//!
//! Markup front matter and directory configuration files carry a `[weft]`
//! TOML table. Fields that inherit through the tree are `Option`s; the
//! [DocumentCursor](crate::tree::cursor::DocumentCursor) climbs from the
//! document through its ancestor trees to find the nearest value.
//!
//! The autonumbering scope is kept as the raw string on purpose: an
//! unrecognized value must surface as an invalid block inside the document,
//! not abort the transformation, so validation happens when the numbering
//! rule is built.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::WeftError;
use crate::tree::element::TargetFormats;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub autonumbering: AutonumberConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_header_as_title: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_base_url: Option<Url>,
    pub links: LinkConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_formats: Option<TargetFormats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versioned: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versions: Option<Versions>,
    #[serde(skip_serializing_if = "Selections::is_empty")]
    pub selections: Selections,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_precedence: Option<Vec<LookupScope>>,
}

impl Config {
    /// Reads the `[weft]` table from a TOML document, tolerating absent
    /// tables and foreign keys outside the namespace.
    pub fn from_toml_str(input: &str) -> Result<Self, WeftError> {
        #[derive(Deserialize, Default)]
        #[serde(default)]
        struct Namespaced {
            weft: Config,
        }
        let parsed: Namespaced = toml::from_str(input)?;
        Ok(parsed.weft)
    }

    pub fn to_toml_string(&self) -> Result<String, WeftError> {
        #[derive(Serialize)]
        struct Namespaced<'a> {
            weft: &'a Config,
        }
        Ok(toml::to_string(&Namespaced { weft: self })?)
    }
}

/// Raw autonumbering settings. `scope` is validated by
/// [parsed_scope](AutonumberConfig::parsed_scope) when the numbering rule is
/// constructed; `depth` 0 means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AutonumberConfig {
    pub scope: String,
    pub depth: u32,
}

impl Default for AutonumberConfig {
    fn default() -> Self {
        AutonumberConfig {
            scope: "none".to_string(),
            depth: 0,
        }
    }
}

impl AutonumberConfig {
    pub fn parsed_scope(&self) -> Result<NumberingScope, WeftError> {
        match self.scope.as_str() {
            "all" => Ok(NumberingScope::All),
            "documents" => Ok(NumberingScope::Documents),
            "sections" => Ok(NumberingScope::Sections),
            "none" => Ok(NumberingScope::None),
            other => Err(WeftError::Config(format!(
                "invalid autonumbering scope: {other}"
            ))),
        }
    }

    /// True when `level` is within the configured numbering depth.
    pub fn within_depth(&self, level: u32) -> bool {
        self.depth == 0 || level <= self.depth
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberingScope {
    All,
    Documents,
    Sections,
    None,
}

impl NumberingScope {
    pub fn numbers_documents(&self) -> bool {
        matches!(self, NumberingScope::All | NumberingScope::Documents)
    }

    pub fn numbers_sections(&self) -> bool {
        matches!(self, NumberingScope::All | NumberingScope::Sections)
    }
}

/// Tree-wide link definitions, keyed by reference id. Values are raw
/// targets: URL forms become external links, the rest resolve as paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LinkConfig {
    pub targets: BTreeMap<String, String>,
}

/// Version configuration carried by the root tree. The current version's
/// path segment is inserted into rendered HTML paths of versioned documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Versions {
    pub current: String,
    #[serde(default)]
    pub older: Vec<String>,
}

/// Scopes a generic id reference is matched against, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupScope {
    /// Targets inside the referencing document itself.
    Document,
    /// Documents of the same tree, in navigation order.
    Tree,
    /// Each ancestor tree outward to the root.
    Ancestors,
}

pub fn default_link_precedence() -> Vec<LookupScope> {
    vec![LookupScope::Document, LookupScope::Tree, LookupScope::Ancestors]
}

/// Selection groups for producing alternative e-book renderings, e.g. a
/// manual offering sbt and CLI flavors of every snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Selections(pub Vec<SelectionConfig>);

impl Selections {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn group(&self, name: &str) -> Option<&SelectionConfig> {
        self.0.iter().find(|group| group.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "kebab-case")]
pub struct SelectionConfig {
    pub name: String,
    pub choices: Vec<ChoiceConfig>,
    pub separate_ebooks: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "kebab-case")]
pub struct ChoiceConfig {
    pub name: String,
    pub label: String,
    pub selected: bool,
}

/// Names of the choices selected in one combination, in group declaration
/// order. E-book packagers append them to artifact basenames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Classifiers {
    pub value: Vec<String>,
}

/// Expands a configuration into one copy per combination of choices across
/// all selection groups marked `separate-ebooks`, in declaration order.
/// Each copy has exactly one choice selected per such group. Groups without
/// the flag pass through untouched, and a configuration without any flagged
/// group yields itself once with empty classifiers.
pub fn create_choice_combinations(config: &Config) -> Vec<(Config, Classifiers)> {
    let mut combinations = vec![(config.clone(), Classifiers::default())];
    for (group_idx, group) in config.selections.0.iter().enumerate() {
        if !group.separate_ebooks || group.choices.is_empty() {
            continue;
        }
        let mut expanded = Vec::with_capacity(combinations.len() * group.choices.len());
        for (combo, classifiers) in &combinations {
            for (choice_idx, choice) in group.choices.iter().enumerate() {
                let mut next = combo.clone();
                let target = &mut next.selections.0[group_idx];
                for (idx, entry) in target.choices.iter_mut().enumerate() {
                    entry.selected = idx == choice_idx;
                }
                let mut next_classifiers = classifiers.clone();
                next_classifiers.value.push(choice.name.clone());
                expanded.push((next, next_classifiers));
            }
        }
        combinations = expanded;
    }
    combinations
}
