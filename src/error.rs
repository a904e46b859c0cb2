use std::fmt;

use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;
use url::ParseError as UrlParseError;

/// Crate-level error type for failures outside the tree-as-data channel.
///
/// Reference and validation problems never surface here — they are encoded
/// as `Invalid` elements inside the rewritten tree so a single bad reference
/// cannot abort a transformation. `WeftError` covers the remaining
/// programming-error and interface-boundary failures: looking up a cursor
/// for a path that is not part of the tree, a markup adapter rejecting its
/// input, or configuration that cannot be decoded at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum WeftError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Markup adapter error: {0}")]
    Markup(String),
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Rewrite rule error: {0}")]
    Rule(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Tree structure error: {0}")]
    Tree(String),
}

impl From<toml::de::Error> for WeftError {
    fn from(src: toml::de::Error) -> WeftError {
        WeftError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for WeftError {
    fn from(src: toml::ser::Error) -> WeftError {
        WeftError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for WeftError {
    fn from(src: JsonError) -> WeftError {
        WeftError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<UrlParseError> for WeftError {
    fn from(src: UrlParseError) -> WeftError {
        WeftError::Serialization(format!("Invalid URL: {src}"))
    }
}

impl From<RegexError> for WeftError {
    fn from(src: RegexError) -> WeftError {
        WeftError::Serialization(format!("Regex parse failed: {src}"))
    }
}

impl From<fmt::Error> for WeftError {
    fn from(src: fmt::Error) -> Self {
        WeftError::Markup(format!("{src}"))
    }
}
