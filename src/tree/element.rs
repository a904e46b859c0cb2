//! The document AST: a closed universe of [Block] and [Span] variants.
//!
//! Elements are plain values with structural equality. Construction happens
//! in markup adapters, everything afterwards is produced by rewriting whole
//! nodes, never by mutation in place. Each unresolved [reference
//! variant](Span::FootnoteReference) carries the original source fragment so
//! a failed resolution can fall back to rendering the raw markup.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::paths::{PathRef, RelativePath, TreePath};

/// Identity and styling shared by every element: an optional stable id used
/// for cross-reference linking and a set of CSS-class-like style names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub styles: BTreeSet<String>,
}

impl Options {
    pub fn empty() -> Self {
        Options::default()
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Options {
            id: Some(id.into()),
            styles: BTreeSet::new(),
        }
    }

    pub fn with_style(style: impl Into<String>) -> Self {
        let mut styles = BTreeSet::new();
        styles.insert(style.into());
        Options { id: None, styles }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.styles.is_empty()
    }

    /// Same options with the id replaced.
    pub fn set_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn add_style(mut self, style: impl Into<String>) -> Self {
        self.styles.insert(style.into());
        self
    }
}

/// Severity attached to a [RuntimeMessage]. Ordered so render-time filters
/// can express thresholds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum Severity {
    Debug,
    Info,
    #[default]
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        write!(f, "{name}")
    }
}

/// A diagnostic produced during rewriting, carried inside the tree by
/// [Block::InvalidBlock] and [Span::InvalidSpan] rather than thrown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeMessage {
    pub severity: Severity,
    pub content: String,
}

impl RuntimeMessage {
    pub fn error(content: impl Into<String>) -> Self {
        RuntimeMessage {
            severity: Severity::Error,
            content: content.into(),
        }
    }

    pub fn new(severity: Severity, content: impl Into<String>) -> Self {
        RuntimeMessage {
            severity,
            content: content.into(),
        }
    }
}

impl fmt::Display for RuntimeMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.content)
    }
}

/// Render-time visibility threshold for [RuntimeMessage]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageFilter {
    Off,
    Threshold(Severity),
}

impl Default for MessageFilter {
    fn default() -> Self {
        MessageFilter::Threshold(Severity::Warning)
    }
}

impl MessageFilter {
    pub fn visible(&self, message: &RuntimeMessage) -> bool {
        match self {
            MessageFilter::Off => false,
            MessageFilter::Threshold(min) => message.severity >= *min,
        }
    }
}

/// The label of a footnote reference or definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FootnoteLabel {
    /// `[#]` markers numbered sequentially in document order.
    Autonumber,
    /// `[*]` markers drawing from the symbol alphabet.
    Autosymbol,
    /// An explicit number like `[4]`.
    NumericLabel(u32),
    /// A named autonumber label like `[#note]`, matched case-insensitively.
    AutonumberLabel(String),
}

impl fmt::Display for FootnoteLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FootnoteLabel::Autonumber => write!(f, "autonumber"),
            FootnoteLabel::Autosymbol => write!(f, "autosymbol"),
            FootnoteLabel::NumericLabel(num) => write!(f, "{num}"),
            FootnoteLabel::AutonumberLabel(name) => write!(f, "{name}"),
        }
    }
}

/// Output formats a document or target is available in. `Selected` keeps the
/// names sorted so equality and display are deterministic. Serializes as the
/// keyword `"all"` or a list of format names, matching the config syntax
/// `target-formats = ["html"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(into = "TargetFormatsRepr", try_from = "TargetFormatsRepr")]
pub enum TargetFormats {
    #[default]
    All,
    Selected(BTreeSet<String>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum TargetFormatsRepr {
    Keyword(String),
    List(BTreeSet<String>),
}

impl From<TargetFormats> for TargetFormatsRepr {
    fn from(formats: TargetFormats) -> Self {
        match formats {
            TargetFormats::All => TargetFormatsRepr::Keyword("all".to_string()),
            TargetFormats::Selected(set) => TargetFormatsRepr::List(set),
        }
    }
}

impl TryFrom<TargetFormatsRepr> for TargetFormats {
    type Error = String;

    fn try_from(repr: TargetFormatsRepr) -> Result<Self, Self::Error> {
        match repr {
            TargetFormatsRepr::Keyword(word) if word == "all" => Ok(TargetFormats::All),
            TargetFormatsRepr::Keyword(word) => {
                Err(format!("unknown target formats keyword: {word}"))
            }
            TargetFormatsRepr::List(set) => Ok(TargetFormats::Selected(set)),
        }
    }
}

impl TargetFormats {
    pub fn selected<I, S>(formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TargetFormats::Selected(formats.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, format: &str) -> bool {
        match self {
            TargetFormats::All => true,
            TargetFormats::Selected(formats) => formats.contains(format),
        }
    }

    /// True when `self` supports every format `other` is rendered to.
    pub fn covers(&self, other: &TargetFormats) -> bool {
        match (self, other) {
            (TargetFormats::All, _) => true,
            (TargetFormats::Selected(_), TargetFormats::All) => false,
            (TargetFormats::Selected(own), TargetFormats::Selected(required)) => {
                required.is_subset(own)
            }
        }
    }

    /// Message prefix describing a referencing document's formats.
    pub fn describe(&self) -> String {
        match self {
            TargetFormats::All => "all output formats".to_string(),
            TargetFormats::Selected(formats) => {
                let names: Vec<&str> = formats.iter().map(String::as_str).collect();
                format!("output formats {}", names.join(","))
            }
        }
    }
}

/// A fully resolved internal link destination.
///
/// `external_fallback` is populated when format validation downgraded the
/// link to an absolute URL built from the site base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalTarget {
    pub absolute: TreePath,
    pub relative: RelativePath,
    #[serde(default)]
    pub formats: TargetFormats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_fallback: Option<String>,
}

impl InternalTarget {
    /// Builds the target for `absolute` as seen from the document at
    /// `ref_doc`, deriving the relative form.
    pub fn from_absolute(absolute: TreePath, ref_doc: &TreePath) -> Self {
        let relative = absolute.relative_to(ref_doc);
        InternalTarget {
            absolute,
            relative,
            formats: TargetFormats::All,
            external_fallback: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalTarget {
    pub url: String,
}

/// Destination of a resolved link or image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkTarget {
    Internal(InternalTarget),
    External(ExternalTarget),
}

impl LinkTarget {
    pub fn external(url: impl Into<String>) -> Self {
        LinkTarget::External(ExternalTarget { url: url.into() })
    }

    /// Parses a raw link destination: anything with a URL scheme or
    /// protocol-relative form is external, the rest is a path reference.
    pub fn is_external_form(raw: &str) -> bool {
        raw.starts_with("//") || raw.contains("://") || raw.starts_with("mailto:")
    }
}

/// A header before section restructuring, also embedded in [Block::Section].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderData {
    pub level: u32,
    pub content: Vec<Span>,
    #[serde(default, skip_serializing_if = "Options::is_empty")]
    pub options: Options,
}

/// One item of a bullet or enumerated list, itself a block container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListItem {
    pub content: Vec<Block>,
    #[serde(default, skip_serializing_if = "Options::is_empty")]
    pub options: Options,
}

impl ListItem {
    pub fn new(content: Vec<Block>) -> Self {
        ListItem {
            content,
            options: Options::empty(),
        }
    }
}

/// Block-level element. A block may contain blocks or spans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Block {
    Paragraph {
        content: Vec<Span>,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    Header(HeaderData),
    /// The document title, promoted from the first header.
    Title {
        content: Vec<Span>,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    /// A header with the sibling blocks that follow it, nested by level.
    Section {
        header: HeaderData,
        content: Vec<Block>,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    BlockSequence {
        content: Vec<Block>,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    QuotedBlock {
        content: Vec<Block>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attribution: Vec<Span>,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    BulletList {
        items: Vec<ListItem>,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    EnumList {
        items: Vec<ListItem>,
        start: u64,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    LiteralBlock {
        content: String,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    Rule {
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    /// An unresolved footnote body. Resolution converts it to [Block::Footnote].
    FootnoteDefinition {
        label: FootnoteLabel,
        content: Vec<Block>,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    /// A resolved footnote carrying its display label and a stable id.
    Footnote {
        label: String,
        content: Vec<Block>,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    Citation {
        label: String,
        content: Vec<Block>,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    /// `[id]: target` definition. The raw target is interpreted during
    /// resolution (URL scheme makes it external). Hidden from output.
    LinkDefinition {
        id: String,
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    /// Indirect reference redirecting one id to another. Hidden from output.
    LinkAlias {
        id: String,
        target: String,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    /// An invisible, linkable anchor between blocks.
    InternalLinkTarget {
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    InvalidBlock {
        message: RuntimeMessage,
        fallback: Box<Block>,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
}

impl Block {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Block::paragraph_of(vec![Span::text(text)])
    }

    pub fn paragraph_of(content: Vec<Span>) -> Self {
        Block::Paragraph {
            content,
            options: Options::empty(),
        }
    }

    pub fn header(level: u32, text: impl Into<String>) -> Self {
        Block::Header(HeaderData {
            level,
            content: vec![Span::text(text)],
            options: Options::empty(),
        })
    }

    pub fn invalid(message: impl Into<String>, fallback: Block) -> Self {
        Block::InvalidBlock {
            message: RuntimeMessage::error(message),
            fallback: Box::new(fallback),
            options: Options::empty(),
        }
    }

    pub fn options(&self) -> &Options {
        match self {
            Block::Paragraph { options, .. }
            | Block::Title { options, .. }
            | Block::Section { options, .. }
            | Block::BlockSequence { options, .. }
            | Block::QuotedBlock { options, .. }
            | Block::BulletList { options, .. }
            | Block::EnumList { options, .. }
            | Block::LiteralBlock { options, .. }
            | Block::Rule { options }
            | Block::FootnoteDefinition { options, .. }
            | Block::Footnote { options, .. }
            | Block::Citation { options, .. }
            | Block::LinkDefinition { options, .. }
            | Block::LinkAlias { options, .. }
            | Block::InternalLinkTarget { options }
            | Block::InvalidBlock { options, .. } => options,
            Block::Header(header) => &header.options,
        }
    }

    pub fn options_mut(&mut self) -> &mut Options {
        match self {
            Block::Paragraph { options, .. }
            | Block::Title { options, .. }
            | Block::Section { options, .. }
            | Block::BlockSequence { options, .. }
            | Block::QuotedBlock { options, .. }
            | Block::BulletList { options, .. }
            | Block::EnumList { options, .. }
            | Block::LiteralBlock { options, .. }
            | Block::Rule { options }
            | Block::FootnoteDefinition { options, .. }
            | Block::Footnote { options, .. }
            | Block::Citation { options, .. }
            | Block::LinkDefinition { options, .. }
            | Block::LinkAlias { options, .. }
            | Block::InternalLinkTarget { options }
            | Block::InvalidBlock { options, .. } => options,
            Block::Header(header) => &mut header.options,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.options().id.as_deref()
    }

    /// Ordered child blocks, for read-only traversals. The rewrite engine
    /// walks owned values instead and does not use this accessor.
    pub fn child_blocks(&self) -> Vec<&Block> {
        match self {
            Block::Section { content, .. }
            | Block::BlockSequence { content, .. }
            | Block::QuotedBlock { content, .. }
            | Block::FootnoteDefinition { content, .. }
            | Block::Footnote { content, .. }
            | Block::Citation { content, .. } => content.iter().collect(),
            Block::BulletList { items, .. } | Block::EnumList { items, .. } => items
                .iter()
                .flat_map(|item| item.content.iter())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Ordered child spans directly owned by this block.
    pub fn child_spans(&self) -> Vec<&Span> {
        match self {
            Block::Paragraph { content, .. } | Block::Title { content, .. } => {
                content.iter().collect()
            }
            Block::Header(header) => header.content.iter().collect(),
            Block::Section { header, .. } => header.content.iter().collect(),
            Block::QuotedBlock { attribution, .. } => attribution.iter().collect(),
            _ => Vec::new(),
        }
    }
}

/// Inline element. A span may contain spans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Span {
    Text {
        content: String,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    /// Inline code.
    Literal {
        content: String,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    Emphasized {
        content: Vec<Span>,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    Strong {
        content: Vec<Span>,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    SpanSequence {
        content: Vec<Span>,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    /// A resolved link.
    SpanLink {
        content: Vec<Span>,
        target: LinkTarget,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    /// A resolved image. `text` is the alt text.
    Image {
        text: String,
        target: LinkTarget,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    /// A resolved reference to a footnote, pointing at its id.
    FootnoteLink {
        ref_id: String,
        label: String,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    CitationLink {
        ref_id: String,
        label: String,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    /// Section number prefix inserted by autonumbering.
    SectionNumber {
        position: Vec<u32>,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    /// An invisible, linkable anchor between spans.
    InternalLinkTarget {
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    FootnoteReference {
        label: FootnoteLabel,
        source: String,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    CitationReference {
        label: String,
        source: String,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    /// `[content][id]`, or anonymous when `id` is empty.
    LinkIdReference {
        content: Vec<Span>,
        id: String,
        source: String,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    /// `[content](path)` pointing into the virtual tree.
    LinkPathReference {
        content: Vec<Span>,
        path: PathRef,
        source: String,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    ImageIdReference {
        text: String,
        id: String,
        source: String,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    ImagePathReference {
        text: String,
        path: PathRef,
        source: String,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
    InvalidSpan {
        message: RuntimeMessage,
        fallback: Box<Span>,
        #[serde(default, skip_serializing_if = "Options::is_empty")]
        options: Options,
    },
}

impl Span {
    pub fn text(content: impl Into<String>) -> Self {
        Span::Text {
            content: content.into(),
            options: Options::empty(),
        }
    }

    pub fn invalid(message: impl Into<String>, fallback: Span) -> Self {
        Span::InvalidSpan {
            message: RuntimeMessage::error(message),
            fallback: Box::new(fallback),
            options: Options::empty(),
        }
    }

    /// Invalid span falling back to the reference's source fragment.
    pub fn invalid_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        Span::invalid(message, Span::text(source))
    }

    pub fn options(&self) -> &Options {
        match self {
            Span::Text { options, .. }
            | Span::Literal { options, .. }
            | Span::Emphasized { options, .. }
            | Span::Strong { options, .. }
            | Span::SpanSequence { options, .. }
            | Span::SpanLink { options, .. }
            | Span::Image { options, .. }
            | Span::FootnoteLink { options, .. }
            | Span::CitationLink { options, .. }
            | Span::SectionNumber { options, .. }
            | Span::InternalLinkTarget { options }
            | Span::FootnoteReference { options, .. }
            | Span::CitationReference { options, .. }
            | Span::LinkIdReference { options, .. }
            | Span::LinkPathReference { options, .. }
            | Span::ImageIdReference { options, .. }
            | Span::ImagePathReference { options, .. }
            | Span::InvalidSpan { options, .. } => options,
        }
    }

    pub fn options_mut(&mut self) -> &mut Options {
        match self {
            Span::Text { options, .. }
            | Span::Literal { options, .. }
            | Span::Emphasized { options, .. }
            | Span::Strong { options, .. }
            | Span::SpanSequence { options, .. }
            | Span::SpanLink { options, .. }
            | Span::Image { options, .. }
            | Span::FootnoteLink { options, .. }
            | Span::CitationLink { options, .. }
            | Span::SectionNumber { options, .. }
            | Span::InternalLinkTarget { options }
            | Span::FootnoteReference { options, .. }
            | Span::CitationReference { options, .. }
            | Span::LinkIdReference { options, .. }
            | Span::LinkPathReference { options, .. }
            | Span::ImageIdReference { options, .. }
            | Span::ImagePathReference { options, .. }
            | Span::InvalidSpan { options, .. } => options,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.options().id.as_deref()
    }

    /// True for the unresolved reference variants. After the resolve phase
    /// no span in the tree satisfies this.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Span::FootnoteReference { .. }
                | Span::CitationReference { .. }
                | Span::LinkIdReference { .. }
                | Span::LinkPathReference { .. }
                | Span::ImageIdReference { .. }
                | Span::ImagePathReference { .. }
        )
    }

    pub fn child_spans(&self) -> Vec<&Span> {
        match self {
            Span::Emphasized { content, .. }
            | Span::Strong { content, .. }
            | Span::SpanSequence { content, .. }
            | Span::SpanLink { content, .. }
            | Span::LinkIdReference { content, .. }
            | Span::LinkPathReference { content, .. } => content.iter().collect(),
            _ => Vec::new(),
        }
    }
}

/// Concatenated plain text of a span sequence, used for slugs and titles.
pub fn extract_text(spans: &[Span]) -> String {
    let mut out = String::new();
    push_text(spans, &mut out);
    out
}

fn push_text(spans: &[Span], out: &mut String) {
    for span in spans {
        match span {
            Span::Text { content, .. } | Span::Literal { content, .. } => out.push_str(content),
            Span::Image { text, .. }
            | Span::ImageIdReference { text, .. }
            | Span::ImagePathReference { text, .. } => out.push_str(text),
            Span::SectionNumber { position, .. } => {
                out.push_str(&section_number_text(position));
            }
            Span::Emphasized { content, .. }
            | Span::Strong { content, .. }
            | Span::SpanSequence { content, .. }
            | Span::SpanLink { content, .. }
            | Span::LinkIdReference { content, .. }
            | Span::LinkPathReference { content, .. } => push_text(content, out),
            Span::FootnoteLink { label, .. } | Span::CitationLink { label, .. } => {
                out.push_str(label)
            }
            Span::InvalidSpan { fallback, .. } => {
                push_text(std::slice::from_ref(fallback.as_ref()), out)
            }
            Span::FootnoteReference { .. }
            | Span::CitationReference { .. }
            | Span::InternalLinkTarget { .. } => {}
        }
    }
}

/// Display form of a section number position, e.g. `1.2.3 `.
pub fn section_number_text(position: &[u32]) -> String {
    let mut out = String::new();
    for num in position {
        out.push_str(&num.to_string());
        out.push('.');
    }
    if !out.is_empty() {
        out.pop();
        out.push(' ');
    }
    out
}
