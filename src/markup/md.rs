//! Markdown front end built on pulldown-cmark.
//!
//! The event stream is folded into [Block]/[Span] trees with an explicit
//! stack per nesting level. Link and image syntax never resolves here:
//! direct destinations become external links or path references, label
//! forms stay [Span::LinkIdReference] so the resolve phase can apply its
//! own lookup precedence. Reference definitions collected by the parser
//! are appended as [Block::LinkDefinition] elements in source order.
//!
//! Front matter (either fence style) is read as TOML and the `[weft]`
//! table becomes the document config; a malformed table turns into an
//! invalid block carrying the raw text instead of failing the parse.

use std::ops::Range;

use pulldown_cmark::{
    BrokenLink, CodeBlockKind, Event as MdEvent, HeadingLevel, LinkType, Options as MdOptions,
    Parser as MdParser, Tag as MdTag, TagEnd as MdTagEnd,
};

use crate::config::Config;
use crate::error::WeftError;
use crate::markup::MarkupFormat;
use crate::paths::{PathRef, TreePath};
use crate::tree::document::Document;
use crate::tree::element::{
    extract_text, Block, FootnoteLabel, HeaderData, LinkTarget, ListItem, Options, Span,
};

pub use pulldown_cmark;

/// Extensions the tree model can represent. Explicit inserts instead of
/// `Options::all()`: tables, math and task lists have no tree counterpart
/// and stay off.
pub fn markdown_options() -> MdOptions {
    let mut options = MdOptions::empty();
    options.insert(MdOptions::ENABLE_FOOTNOTES);
    // `{#id .class}` heading attributes feed Options directly.
    options.insert(MdOptions::ENABLE_HEADING_ATTRIBUTES);
    options.insert(MdOptions::ENABLE_STRIKETHROUGH);
    // Front matter carries the `[weft]` config table, TOML in either fence.
    options.insert(MdOptions::ENABLE_YAML_STYLE_METADATA_BLOCKS);
    options.insert(MdOptions::ENABLE_PLUSES_DELIMITED_METADATA_BLOCKS);
    // `[[page]]` targets are paths in the virtual tree.
    options.insert(MdOptions::ENABLE_WIKILINKS);
    options
}

/// The built-in markdown format.
#[derive(Debug, Clone, Copy, Default)]
pub struct Markdown;

impl MarkupFormat for Markdown {
    fn suffixes(&self) -> &[&str] {
        &["md", "markdown"]
    }

    fn parse(&self, path: TreePath, source: &str) -> Result<Document, WeftError> {
        Ok(parse_document(path, source))
    }
}

/// Parses markdown into a document whose references are still unresolved.
pub fn parse_document(path: TreePath, source: &str) -> Document {
    let parser = MdParser::new_with_broken_link_callback(
        source,
        markdown_options(),
        // Undefined references must survive into the event stream; they are
        // resolved later against the collected symbol tables, not dropped.
        Some(|link: BrokenLink<'_>| {
            let reference = link.reference.into_static();
            Some((reference.clone(), reference))
        }),
    );

    let mut definitions: Vec<(usize, Block)> = parser
        .reference_definitions()
        .iter()
        .map(|(label, definition)| {
            let block = Block::LinkDefinition {
                id: label.to_string(),
                target: definition.dest.to_string(),
                title: definition.title.as_ref().map(|title| title.to_string()),
                options: Options::empty(),
            };
            (definition.span.start, block)
        })
        .collect();
    definitions.sort_by_key(|(start, _)| *start);

    let mut builder = TreeBuilder::new(source);
    for (event, range) in parser.into_offset_iter() {
        builder.event(event, range);
    }
    let (mut content, config) = builder.finish();
    content.extend(definitions.into_iter().map(|(_, block)| block));
    Document::new(path, content).with_config(config)
}

/// An open block container.
struct BlockFrame {
    kind: ScopeKind,
    blocks: Vec<Block>,
    /// Loose spans from tight list items, wrapped into a paragraph when the
    /// next block starts or the frame closes.
    pending: Vec<Span>,
}

impl BlockFrame {
    fn new(kind: ScopeKind) -> Self {
        BlockFrame {
            kind,
            blocks: Vec::new(),
            pending: Vec::new(),
        }
    }
}

enum ScopeKind {
    Root,
    Quote,
    List {
        start: Option<u64>,
        items: Vec<ListItem>,
    },
    Item,
    Footnote {
        label: FootnoteLabel,
    },
}

/// An open inline container.
struct InlineFrame {
    kind: InlineKind,
    spans: Vec<Span>,
}

impl InlineFrame {
    fn new(kind: InlineKind) -> Self {
        InlineFrame {
            kind,
            spans: Vec::new(),
        }
    }
}

enum InlineKind {
    Paragraph,
    Heading {
        level: u32,
        options: Options,
    },
    Emphasis,
    Strong,
    Strikethrough,
    Link {
        link_type: LinkType,
        dest: String,
        title: Option<String>,
        label: String,
        source: String,
    },
    Image {
        link_type: LinkType,
        dest: String,
        title: Option<String>,
        label: String,
        source: String,
    },
}

struct TreeBuilder<'s> {
    source: &'s str,
    scopes: Vec<BlockFrame>,
    inline: Vec<InlineFrame>,
    code: Option<CodeFrame>,
    html: Option<String>,
    metadata: Option<String>,
    config: Config,
}

struct CodeFrame {
    language: Option<String>,
    text: String,
}

impl<'s> TreeBuilder<'s> {
    fn new(source: &'s str) -> Self {
        TreeBuilder {
            source,
            scopes: vec![BlockFrame::new(ScopeKind::Root)],
            inline: Vec::new(),
            code: None,
            html: None,
            metadata: None,
            config: Config::default(),
        }
    }

    fn event(&mut self, event: MdEvent<'_>, range: Range<usize>) {
        match event {
            MdEvent::Start(tag) => self.start_tag(tag, range),
            MdEvent::End(tag) => self.end_tag(tag),
            MdEvent::Text(text) => self.text(&text),
            MdEvent::Code(code) => self.push_span(Span::Literal {
                content: code.to_string(),
                options: Options::empty(),
            }),
            MdEvent::Html(html) => self.block_html(&html),
            MdEvent::InlineHtml(html) => self.push_span(Span::Literal {
                content: html.to_string(),
                options: Options::with_style("html"),
            }),
            MdEvent::FootnoteReference(label) => {
                let source = self.slice(range);
                self.push_span(Span::FootnoteReference {
                    label: footnote_label(&label),
                    source,
                    options: Options::empty(),
                });
            }
            MdEvent::SoftBreak => self.push_span(Span::text(" ")),
            MdEvent::HardBreak => self.push_span(Span::text("\n")),
            MdEvent::Rule => self.push_block(Block::Rule {
                options: Options::empty(),
            }),
            other => {
                tracing::debug!("ignoring unsupported markdown event {other:?}");
            }
        }
    }

    fn start_tag(&mut self, tag: MdTag<'_>, range: Range<usize>) {
        match tag {
            MdTag::Paragraph => self.inline.push(InlineFrame::new(InlineKind::Paragraph)),
            MdTag::Heading {
                level, id, classes, ..
            } => {
                let mut options = Options::empty();
                options.id = id.map(|id| id.to_string());
                for class in classes {
                    options.styles.insert(class.to_string());
                }
                self.inline.push(InlineFrame::new(InlineKind::Heading {
                    level: heading_level(level),
                    options,
                }));
            }
            MdTag::BlockQuote(_) => self.scopes.push(BlockFrame::new(ScopeKind::Quote)),
            MdTag::CodeBlock(kind) => {
                let language = match kind {
                    CodeBlockKind::Fenced(info) => {
                        info.split_whitespace().next().map(str::to_string)
                    }
                    CodeBlockKind::Indented => None,
                };
                self.code = Some(CodeFrame {
                    language,
                    text: String::new(),
                });
            }
            MdTag::HtmlBlock => self.html = Some(String::new()),
            MdTag::List(start) => self.scopes.push(BlockFrame::new(ScopeKind::List {
                start,
                items: Vec::new(),
            })),
            MdTag::Item => self.scopes.push(BlockFrame::new(ScopeKind::Item)),
            MdTag::FootnoteDefinition(label) => {
                self.scopes.push(BlockFrame::new(ScopeKind::Footnote {
                    label: footnote_label(&label),
                }))
            }
            MdTag::Emphasis => self.inline.push(InlineFrame::new(InlineKind::Emphasis)),
            MdTag::Strong => self.inline.push(InlineFrame::new(InlineKind::Strong)),
            MdTag::Strikethrough => {
                self.inline.push(InlineFrame::new(InlineKind::Strikethrough))
            }
            MdTag::Link {
                link_type,
                dest_url,
                title,
                id,
            } => {
                let source = self.slice(range);
                self.inline.push(InlineFrame::new(InlineKind::Link {
                    link_type,
                    dest: dest_url.to_string(),
                    title: (!title.is_empty()).then(|| title.to_string()),
                    label: id.to_string(),
                    source,
                }));
            }
            MdTag::Image {
                link_type,
                dest_url,
                title,
                id,
            } => {
                let source = self.slice(range);
                self.inline.push(InlineFrame::new(InlineKind::Image {
                    link_type,
                    dest: dest_url.to_string(),
                    title: (!title.is_empty()).then(|| title.to_string()),
                    label: id.to_string(),
                    source,
                }));
            }
            MdTag::MetadataBlock(_) => self.metadata = Some(String::new()),
            other => {
                tracing::debug!("ignoring unsupported markdown tag {other:?}");
            }
        }
    }

    fn end_tag(&mut self, tag: MdTagEnd) {
        match tag {
            MdTagEnd::Paragraph
            | MdTagEnd::Heading(_)
            | MdTagEnd::Emphasis
            | MdTagEnd::Strong
            | MdTagEnd::Strikethrough
            | MdTagEnd::Link
            | MdTagEnd::Image => self.close_inline(),
            MdTagEnd::BlockQuote(_) | MdTagEnd::List(_) | MdTagEnd::Item
            | MdTagEnd::FootnoteDefinition => self.close_scope(),
            MdTagEnd::CodeBlock => {
                if let Some(code) = self.code.take() {
                    let options = match code.language {
                        Some(language) => Options::with_style(language),
                        None => Options::empty(),
                    };
                    self.push_block(Block::LiteralBlock {
                        content: code.text,
                        options,
                    });
                }
            }
            MdTagEnd::HtmlBlock => {
                if let Some(html) = self.html.take() {
                    self.push_block(Block::LiteralBlock {
                        content: html,
                        options: Options::with_style("html"),
                    });
                }
            }
            MdTagEnd::MetadataBlock(_) => {
                let Some(text) = self.metadata.take() else {
                    return;
                };
                match Config::from_toml_str(&text) {
                    Ok(config) => self.config = config,
                    Err(err) => {
                        let fallback = Block::LiteralBlock {
                            content: text,
                            options: Options::empty(),
                        };
                        self.push_block(Block::invalid(
                            format!("invalid front matter: {err}"),
                            fallback,
                        ));
                    }
                }
            }
            other => {
                tracing::debug!("ignoring unsupported markdown end tag {other:?}");
            }
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(code) = self.code.as_mut() {
            code.text.push_str(text);
            return;
        }
        if let Some(metadata) = self.metadata.as_mut() {
            metadata.push_str(text);
            return;
        }
        self.push_span(Span::text(text));
    }

    fn block_html(&mut self, html: &str) {
        match self.html.as_mut() {
            Some(buffer) => buffer.push_str(html),
            None => self.push_block(Block::LiteralBlock {
                content: html.to_string(),
                options: Options::with_style("html"),
            }),
        }
    }

    fn push_span(&mut self, span: Span) {
        if let Some(frame) = self.inline.last_mut() {
            frame.spans.push(span);
        } else if let Some(scope) = self.scopes.last_mut() {
            scope.pending.push(span);
        }
    }

    fn push_block(&mut self, block: Block) {
        self.flush_pending();
        if let Some(scope) = self.scopes.last_mut() {
            scope.blocks.push(block);
        }
    }

    fn flush_pending(&mut self) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };
        if scope.pending.is_empty() {
            return;
        }
        let spans = std::mem::take(&mut scope.pending);
        scope.blocks.push(Block::paragraph_of(spans));
    }

    fn close_inline(&mut self) {
        let Some(InlineFrame { kind, spans }) = self.inline.pop() else {
            tracing::warn!("unbalanced inline end tag");
            return;
        };
        match kind {
            InlineKind::Paragraph => self.push_block(Block::paragraph_of(spans)),
            InlineKind::Heading { level, options } => {
                self.push_block(Block::Header(HeaderData {
                    level,
                    content: spans,
                    options,
                }))
            }
            InlineKind::Emphasis => self.push_span(Span::Emphasized {
                content: spans,
                options: Options::empty(),
            }),
            InlineKind::Strong => self.push_span(Span::Strong {
                content: spans,
                options: Options::empty(),
            }),
            InlineKind::Strikethrough => self.push_span(Span::SpanSequence {
                content: spans,
                options: Options::with_style("strikethrough"),
            }),
            InlineKind::Link {
                link_type,
                dest,
                title,
                label,
                source,
            } => {
                let span = link_span(link_type, dest, title, label, source, spans);
                self.push_span(span);
            }
            InlineKind::Image {
                link_type,
                dest,
                title,
                label,
                source,
            } => {
                let span = image_span(link_type, dest, title, label, source, spans);
                self.push_span(span);
            }
        }
    }

    fn close_scope(&mut self) {
        let Some(frame) = self.scopes.pop() else {
            tracing::warn!("unbalanced block end tag");
            return;
        };
        let BlockFrame {
            kind,
            mut blocks,
            pending,
        } = frame;
        if !pending.is_empty() {
            blocks.push(Block::paragraph_of(pending));
        }
        match kind {
            ScopeKind::Root => {
                tracing::warn!("unbalanced block end tag at document root");
                self.scopes.push(BlockFrame {
                    kind: ScopeKind::Root,
                    blocks,
                    pending: Vec::new(),
                });
            }
            ScopeKind::Quote => self.push_block(Block::QuotedBlock {
                content: blocks,
                attribution: Vec::new(),
                options: Options::empty(),
            }),
            ScopeKind::List { start: None, items } => self.push_block(Block::BulletList {
                items,
                options: Options::empty(),
            }),
            ScopeKind::List {
                start: Some(start),
                items,
            } => self.push_block(Block::EnumList {
                items,
                start,
                options: Options::empty(),
            }),
            ScopeKind::Item => match self.scopes.last_mut().map(|frame| &mut frame.kind) {
                Some(ScopeKind::List { items, .. }) => items.push(ListItem::new(blocks)),
                _ => {
                    tracing::warn!("list item closed outside a list");
                    self.push_block(Block::BlockSequence {
                        content: blocks,
                        options: Options::empty(),
                    });
                }
            },
            ScopeKind::Footnote { label } => self.push_block(Block::FootnoteDefinition {
                label,
                content: blocks,
                options: Options::empty(),
            }),
        }
    }

    fn slice(&self, range: Range<usize>) -> String {
        self.source.get(range).unwrap_or_default().to_string()
    }

    fn finish(mut self) -> (Vec<Block>, Config) {
        self.flush_pending();
        let mut blocks = Vec::new();
        for frame in self.scopes {
            let BlockFrame {
                blocks: mut scope_blocks,
                pending,
                ..
            } = frame;
            if !pending.is_empty() {
                scope_blocks.push(Block::paragraph_of(pending));
            }
            blocks.extend(scope_blocks);
        }
        (blocks, self.config)
    }
}

/// Maps a raw footnote label to its semantic form. Bare `#` and `*` are the
/// autonumber and autosymbol markers, a leading `#` names an autonumber
/// label, digits are an explicit number. Plain names share the autonumber
/// sequence, so `[^note]` is numbered in document order like any `[^#]`.
fn footnote_label(raw: &str) -> FootnoteLabel {
    match raw {
        "#" => FootnoteLabel::Autonumber,
        "*" => FootnoteLabel::Autosymbol,
        _ => {
            if let Ok(number) = raw.parse::<u32>() {
                FootnoteLabel::NumericLabel(number)
            } else if let Some(name) = raw.strip_prefix('#') {
                FootnoteLabel::AutonumberLabel(name.to_string())
            } else {
                FootnoteLabel::AutonumberLabel(raw.to_string())
            }
        }
    }
}

fn heading_level(level: HeadingLevel) -> u32 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Builds the span for a closed link. Direct destinations become external
/// links or path references on the spot; label forms stay symbolic.
fn link_span(
    link_type: LinkType,
    dest: String,
    title: Option<String>,
    label: String,
    source: String,
    content: Vec<Span>,
) -> Span {
    match link_type {
        LinkType::Inline | LinkType::Autolink | LinkType::Email | LinkType::WikiLink { .. } => {
            if LinkTarget::is_external_form(&dest) {
                Span::SpanLink {
                    content,
                    target: LinkTarget::external(dest),
                    title,
                    options: Options::empty(),
                }
            } else {
                Span::LinkPathReference {
                    content,
                    path: PathRef::parse(&dest),
                    source,
                    options: Options::empty(),
                }
            }
        }
        LinkType::Reference
        | LinkType::ReferenceUnknown
        | LinkType::Collapsed
        | LinkType::CollapsedUnknown
        | LinkType::Shortcut
        | LinkType::ShortcutUnknown => {
            let id = if label.is_empty() { dest } else { label };
            Span::LinkIdReference {
                content,
                id,
                source,
                options: Options::empty(),
            }
        }
    }
}

fn image_span(
    link_type: LinkType,
    dest: String,
    title: Option<String>,
    label: String,
    source: String,
    content: Vec<Span>,
) -> Span {
    let text = extract_text(&content);
    match link_type {
        LinkType::Inline | LinkType::Autolink | LinkType::Email | LinkType::WikiLink { .. } => {
            if LinkTarget::is_external_form(&dest) {
                Span::Image {
                    text,
                    target: LinkTarget::external(dest),
                    title,
                    options: Options::empty(),
                }
            } else {
                Span::ImagePathReference {
                    text,
                    path: PathRef::parse(&dest),
                    source,
                    options: Options::empty(),
                }
            }
        }
        LinkType::Reference
        | LinkType::ReferenceUnknown
        | LinkType::Collapsed
        | LinkType::CollapsedUnknown
        | LinkType::Shortcut
        | LinkType::ShortcutUnknown => {
            let id = if label.is_empty() { dest } else { label };
            Span::ImageIdReference {
                text,
                id,
                source,
                options: Options::empty(),
            }
        }
    }
}
