//! Layout templates.
//!
//! A template is ordinary HTML with placeholders delimited by `<%` and `%>`:
//!
//! | Token | Expands to |
//! |-------|------------|
//! | `<%title%>` | title of the page being rendered |
//! | `<%url%>` | its URL |
//! | `<%namespace%>` | its namespace character |
//! | `<%content%>` | the page itself, rendered without layout |
//! | `<%/N/Title%>` | the page titled `Title` in namespace `N`, rendered without layout |
//!
//! Anything else between the delimiters is written back out unchanged and
//! logged. Input that ends inside a token is emitted verbatim.
//!
//! ## Recursion
//!
//! `content` and link tokens render other pages, which may themselves be
//! templates. Each such expansion costs one unit of the budget passed to
//! [`render`]; a page that needs to expand with an empty budget fails with
//! [`TemplateError::RecursionLimit`]. This bounds link cycles such as a
//! template that includes itself.
//!
//! ```text
//! render(page, layout = true, budget = 2)
//!   layout  <%content%>     budget 2 → 1
//!     page (template)  <%/A/Sidebar%>   budget 1 → 0
//!       Sidebar (template)  <%/A/Footer%>   budget 0 → error
//! ```

use crate::mime;
use std::io;
use thiserror::Error;
use tracing::{trace, warn};

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("maximum recursive limit is reached while rendering {url}")]
    RecursionLimit { url: String },
    #[error("template link to unknown page {namespace}/{title}")]
    UnknownLink { namespace: char, title: String },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// The fields of an entry a template can refer to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub namespace: char,
    pub url: String,
    pub title: String,
    pub mime_type: String,
}

/// Where the renderer looks up pages and their raw bytes.
pub trait PageStore {
    /// The configured layout page, if any.
    fn layout_page(&self) -> Option<Page>;

    /// Page in `namespace` with the given title (or URL).
    fn find(&self, namespace: char, title: &str) -> Option<Page>;

    /// Raw, unrendered bytes of a page.
    fn data(&self, page: &Page) -> io::Result<Vec<u8>>;
}

/// Render `page`.
///
/// HTML and HTML-template pages are wrapped in the layout when `layout` is
/// set and the store has one. Otherwise a template renders itself, and every
/// other page is returned as its raw bytes.
pub fn render<S: PageStore + ?Sized>(
    store: &S,
    page: &Page,
    layout: bool,
    max_recurse: u32,
) -> Result<Vec<u8>, TemplateError> {
    let mut out = Vec::new();
    render_into(store, page, layout, max_recurse, &mut out)?;
    Ok(out)
}

fn render_into<S: PageStore + ?Sized>(
    store: &S,
    page: &Page,
    layout: bool,
    budget: u32,
    out: &mut Vec<u8>,
) -> Result<(), TemplateError> {
    let html = mime::is_html(&page.mime_type);
    let template = mime::is_html_template(&page.mime_type);

    if html || template {
        if layout && let Some(layout_page) = store.layout_page() {
            trace!(url = %page.url, layout = %layout_page.url, "rendering through layout");
            let source = store.data(&layout_page)?;
            return expand(store, page, &source, budget, out);
        }
        if template {
            let source = store.data(page)?;
            return expand(store, page, &source, budget, out);
        }
    }

    out.extend_from_slice(&store.data(page)?);
    Ok(())
}

/// Expand `source` with `subject` as the page tokens refer to.
fn expand<S: PageStore + ?Sized>(
    store: &S,
    subject: &Page,
    source: &[u8],
    budget: u32,
    out: &mut Vec<u8>,
) -> Result<(), TemplateError> {
    for segment in parse(source) {
        match segment {
            Segment::Data(bytes) => out.extend_from_slice(&bytes),
            Segment::Token(token) => match token.as_str() {
                "title" => out.extend_from_slice(subject.title.as_bytes()),
                "url" => out.extend_from_slice(subject.url.as_bytes()),
                "namespace" => {
                    let mut buf = [0; 4];
                    out.extend_from_slice(subject.namespace.encode_utf8(&mut buf).as_bytes());
                }
                "content" => {
                    let budget = descend(subject, budget)?;
                    render_into(store, subject, false, budget, out)?;
                }
                _ => {
                    warn!(token = %token, url = %subject.url, "unknown token found in template");
                    out.extend_from_slice(format!("<%{token}%>").as_bytes());
                }
            },
            Segment::Link { namespace, title } => {
                let budget = descend(subject, budget)?;
                let target = store
                    .find(namespace, &title)
                    .ok_or(TemplateError::UnknownLink { namespace, title })?;
                render_into(store, &target, false, budget, out)?;
            }
        }
    }
    Ok(())
}

fn descend(subject: &Page, budget: u32) -> Result<u32, TemplateError> {
    budget
        .checked_sub(1)
        .ok_or_else(|| TemplateError::RecursionLimit {
            url: subject.url.clone(),
        })
}

// ============================================================================
// Parser
// ============================================================================

/// A piece of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Data(Vec<u8>),
    Token(String),
    Link { namespace: char, title: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Data,
    /// Seen `<`.
    Open,
    /// Seen `<%`.
    TokenStart,
    Token,
    /// Seen `%` inside a token.
    TokenEnd,
    /// Seen `<%/`, next byte is the namespace.
    LinkNamespace,
    /// Namespace read, expecting `/`.
    LinkSlash,
    LinkTitle,
    /// Seen `%` inside a link title.
    LinkTitleEnd,
}

/// Byte-at-a-time template tokenizer.
#[derive(Debug)]
struct Parser {
    state: State,
    segments: Vec<Segment>,
    data: Vec<u8>,
    /// Bytes consumed since the opening `<`, for verbatim fallback.
    pending: Vec<u8>,
    name: Vec<u8>,
    namespace: char,
}

impl Parser {
    fn new() -> Self {
        Self {
            state: State::Data,
            segments: Vec::new(),
            data: Vec::new(),
            pending: Vec::new(),
            name: Vec::new(),
            namespace: '\0',
        }
    }

    fn feed(&mut self, byte: u8) {
        match self.state {
            State::Data => {
                if byte == b'<' {
                    self.pending.push(byte);
                    self.state = State::Open;
                } else {
                    self.data.push(byte);
                }
            }
            State::Open => {
                if byte == b'%' {
                    self.pending.push(byte);
                    self.state = State::TokenStart;
                } else {
                    self.abandon();
                    self.feed(byte);
                }
            }
            State::TokenStart => {
                self.pending.push(byte);
                if byte == b'/' {
                    self.state = State::LinkNamespace;
                } else if byte == b'%' {
                    self.state = State::TokenEnd;
                } else {
                    self.name.push(byte);
                    self.state = State::Token;
                }
            }
            State::Token => {
                self.pending.push(byte);
                if byte == b'%' {
                    self.state = State::TokenEnd;
                } else {
                    self.name.push(byte);
                }
            }
            State::TokenEnd => {
                self.pending.push(byte);
                if byte == b'>' {
                    let token = String::from_utf8_lossy(&self.name).into_owned();
                    self.emit(Segment::Token(token));
                } else if byte != b'%' {
                    self.name.push(b'%');
                    self.name.push(byte);
                    self.state = State::Token;
                } else {
                    self.name.push(b'%');
                }
            }
            State::LinkNamespace => {
                self.pending.push(byte);
                self.namespace = byte as char;
                self.state = State::LinkSlash;
            }
            State::LinkSlash => {
                if byte == b'/' {
                    self.pending.push(byte);
                    self.state = State::LinkTitle;
                } else {
                    self.abandon();
                    self.feed(byte);
                }
            }
            State::LinkTitle => {
                self.pending.push(byte);
                if byte == b'%' {
                    self.state = State::LinkTitleEnd;
                } else {
                    self.name.push(byte);
                }
            }
            State::LinkTitleEnd => {
                self.pending.push(byte);
                if byte == b'>' {
                    let title = String::from_utf8_lossy(&self.name).into_owned();
                    let namespace = self.namespace;
                    self.emit(Segment::Link { namespace, title });
                } else if byte != b'%' {
                    self.name.push(b'%');
                    self.name.push(byte);
                    self.state = State::LinkTitle;
                } else {
                    self.name.push(b'%');
                }
            }
        }
    }

    /// Give up on the current token and treat what was consumed as text.
    fn abandon(&mut self) {
        self.data.append(&mut self.pending);
        self.name.clear();
        self.state = State::Data;
    }

    fn emit(&mut self, segment: Segment) {
        if !self.data.is_empty() {
            self.segments.push(Segment::Data(std::mem::take(&mut self.data)));
        }
        self.segments.push(segment);
        self.pending.clear();
        self.name.clear();
        self.state = State::Data;
    }

    fn finish(mut self) -> Vec<Segment> {
        self.abandon();
        if !self.data.is_empty() {
            self.segments.push(Segment::Data(self.data));
        }
        self.segments
    }
}

/// Split a template into text, tokens and links.
pub fn parse(source: &[u8]) -> Vec<Segment> {
    let mut parser = Parser::new();
    for &byte in source {
        parser.feed(byte);
    }
    parser.finish()
}
