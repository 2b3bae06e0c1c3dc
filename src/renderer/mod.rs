//! Gemtext rendering.
//!
//! [`GemtextRenderer`] consumes the [`Event`]s of one page and produces
//! Gemtext. Gemtext only allows links on their own `=>` lines, so inline
//! links are numbered in the text (`label[1]`) and collected; the collected
//! list is written as a block of link lines at every section boundary and at
//! the end of the document, after which numbering starts again at 1.
//!
//! # Examples
//!
//! ```rust,ignore
//! use gemwiki::renderer::{Event, GemtextRenderer};
//!
//! let events = vec![
//!     Event::Header { text: "Hello".into(), level: 1 },
//!     Event::ParagraphOpen,
//!     Event::ExternalLink { url: "gemini://example.org/".into(), title: Some("elsewhere".into()) },
//!     Event::ParagraphClose,
//!     Event::SectionClose,
//! ];
//!
//! let gemtext = GemtextRenderer::render_document("start", &context, &store, &events);
//! assert!(gemtext.contains("=> gemini://example.org/ [1] elsewhere"));
//! ```

use log::trace;

use crate::server::context::RequestContext;

mod event;
mod typography;

pub use event::{Event, FormatStyle, LinkTitle, MediaKind, MediaTitle};

const NL: char = '\n';
const FENCE: &str = "```";

/// Outcome of looking up an interwiki shortcut.
#[derive(Clone, Debug, PartialEq)]
pub enum InterwikiTarget {
    /// The shortcut expands to a foreign URL.
    External(String),
    /// The shortcut points back into this wiki, at the given page.
    Internal(String),
    /// The shortcut is not configured.
    Unknown,
}

/// Link target lookups the renderer delegates to the content engine.
pub trait LinkResolver {
    /// Resolves `link`, written on page `current`, to the canonical id of an
    /// existing page.
    fn resolve_page(&self, current: &str, link: &str) -> Option<String>;

    /// Resolves `src`, written on page `current`, to the canonical id of an
    /// existing media item.
    fn resolve_media(&self, current: &str, src: &str) -> Option<String>;

    fn interwiki(&self, _wiki_name: &str, _wiki_ref: &str) -> InterwikiTarget {
        InterwikiTarget::Unknown
    }
}

/// A deferred link, listed at the end of its section.
#[derive(Clone, Debug, PartialEq)]
pub struct Link {
    pub url: String,
    pub title: String,
}

/// Output and pending links of one page render.
#[derive(Debug, Default)]
pub struct RenderState {
    doc: String,
    links: Vec<Link>,
}

impl RenderState {
    fn push(&mut self, text: &str) {
        self.doc
            .push_str(text);
    }

    fn at_line_start(&self) -> bool {
        self.doc
            .is_empty()
            || self
                .doc
                .ends_with(NL)
    }

    /// Appends a link and returns its 1-based number.
    fn add_link(&mut self, url: &str, title: &str) -> usize {
        self.links
            .push(Link { url: url.to_string(), title: title.to_string() });
        self.links
            .len()
    }

    pub fn output(&self) -> &str {
        &self.doc
    }

    pub fn pending_links(&self) -> &[Link] {
        &self.links
    }
}

/// Stateful visitor turning document events into Gemtext.
pub struct GemtextRenderer<'a> {
    page_id: String,
    context: &'a RequestContext,
    resolver: &'a dyn LinkResolver,
    state: RenderState,
}

impl<'a> GemtextRenderer<'a> {
    pub fn new(page_id: &str, context: &'a RequestContext, resolver: &'a dyn LinkResolver) -> Self {
        GemtextRenderer {
            page_id: page_id.to_string(),
            context,
            resolver,
            state: RenderState::default(),
        }
    }

    /// Renders a whole event sequence with a fresh state.
    pub fn render_document(
        page_id: &str,
        context: &'a RequestContext,
        resolver: &'a dyn LinkResolver,
        events: &[Event],
    ) -> String {
        let mut renderer = GemtextRenderer::new(page_id, context, resolver);
        for event in events {
            renderer.render(event);
        }
        renderer.finish()
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    /// Writes any links still pending and returns the document.
    pub fn finish(mut self) -> String {
        self.flush_links();
        self.state.doc
    }

    pub fn render(&mut self, event: &Event) {
        match event {
            Event::Header { text, level } => self.header(text, *level),
            Event::SectionClose | Event::DocumentEnd => self.flush_links(),
            Event::Cdata { text } | Event::Unformatted { text } => self.cdata(text),
            Event::ParagraphClose => {
                self.linebreak(false);
                self.linebreak(false);
            }
            Event::Linebreak => self.linebreak(false),
            Event::Hr => self.hr(),
            Event::FootnoteOpen => self.cdata(typography::FOOTNOTE_OPEN),
            Event::FootnoteClose => self.cdata(typography::FOOTNOTE_CLOSE),
            Event::ListuClose | Event::ListoClose | Event::ListcontentClose => {
                self.linebreak(false)
            }
            Event::ListitemOpen { .. } => self.cdata("* "),
            Event::Preformatted { text }
            | Event::HtmlBlock { text }
            | Event::PhpBlock { text } => self.fenced(text, None),
            Event::File { text, file, .. } | Event::Code { text, file, .. } => {
                self.fenced(text, file.as_deref())
            }
            Event::QuoteOpen => self.cdata("> "),
            Event::QuoteClose => self.linebreak(true),
            Event::Html { text } | Event::Php { text } => self.cdata(text),
            Event::Plugin { name, matched } => {
                trace!("passing through {} plugin output", name);
                self.cdata(matched)
            }
            Event::Acronym { text } | Event::Smiley { text } => self.cdata(text),
            Event::Entity { text } => match typography::entity(text) {
                Some(replacement) => self.cdata(replacement),
                None => self.cdata(text),
            },
            Event::MultiplyEntity { x, y } => self.cdata(&format!("{}×{}", x, y)),
            Event::SingleQuoteOpening => self.cdata(typography::SINGLE_QUOTE_OPENING),
            Event::SingleQuoteClosing => self.cdata(typography::SINGLE_QUOTE_CLOSING),
            Event::Apostrophe => self.cdata(typography::APOSTROPHE),
            Event::DoubleQuoteOpening => self.cdata(typography::DOUBLE_QUOTE_OPENING),
            Event::DoubleQuoteClosing => self.cdata(typography::DOUBLE_QUOTE_CLOSING),
            Event::CamelCaseLink { link } => self.internal_link(link, None),
            Event::LocalLink { hash, name } => self.cdata(name.as_deref().unwrap_or(hash.as_str())),
            Event::InternalLink { id, title } => self.internal_link(id, title.as_ref()),
            Event::ExternalLink { url, title } => self.external_link(url, title.as_ref()),
            Event::InterwikiLink { wiki_name, wiki_ref, title } => {
                self.interwiki_link(wiki_name, wiki_ref, title.as_deref())
            }
            Event::WindowsShareLink { url, title } => {
                self.cdata(title.as_deref().unwrap_or(url.as_str()))
            }
            Event::EmailLink { address, name } => {
                let name = LinkTitle::from(name.as_deref().unwrap_or(address.as_str()));
                self.external_link(&format!("mailto:{}", address), Some(&name))
            }
            Event::InternalMedia { src, title } | Event::InternalMediaLink { src, title } => {
                self.internal_media(src, title.as_deref());
            }
            Event::ExternalMedia { src, title } | Event::ExternalMediaLink { src, title } => {
                self.external_media(src, title.as_deref())
            }
            // Structure Gemtext cannot express. Tables are consumed
            // silently; their cell text still arrives as cdata.
            Event::DocumentStart
            | Event::SectionOpen { .. }
            | Event::ParagraphOpen
            | Event::ListuOpen
            | Event::ListoOpen
            | Event::ListitemClose
            | Event::ListcontentOpen
            | Event::Formatting { .. }
            | Event::TableOpen
            | Event::TableClose
            | Event::TableRowOpen
            | Event::TableRowClose
            | Event::TableHeaderOpen
            | Event::TableHeaderClose
            | Event::TableCellOpen
            | Event::TableCellClose => {}
        }
    }

    fn cdata(&mut self, text: &str) {
        self.state
            .push(text);
    }

    /// With `optional`, only breaks when the output is not already at the
    /// start of a line.
    fn linebreak(&mut self, optional: bool) {
        if optional
            && self
                .state
                .at_line_start()
        {
            return;
        }
        self.state
            .doc
            .push(NL);
    }

    fn header(&mut self, text: &str, level: u8) {
        let level = level.clamp(1, 3) as usize;
        self.cdata(&"#".repeat(level));
        self.cdata(" ");
        self.cdata(text);
        self.linebreak(false);
    }

    fn hr(&mut self) {
        self.linebreak(false);
        let rule: String = std::iter::repeat(typography::RULE_CHAR)
            .take(typography::RULE_WIDTH)
            .collect();
        self.cdata(&rule);
        self.linebreak(false);
    }

    /// Payload lines that would toggle preformatting are shifted by one
    /// space so the block closes only at its own fence.
    fn fenced(&mut self, text: &str, file: Option<&str>) {
        self.linebreak(true);
        self.cdata(FENCE);
        if let Some(file) = file {
            self.cdata(&file.replace(['\r', NL], " "));
        }
        self.linebreak(false);
        for line in text.split_inclusive(NL) {
            if line.starts_with(FENCE) {
                self.cdata(" ");
            }
            self.cdata(line);
        }
        self.linebreak(true);
        self.cdata(FENCE);
        self.linebreak(false);
    }

    fn flush_links(&mut self) {
        if self
            .state
            .links
            .is_empty()
        {
            return;
        }

        self.linebreak(false);
        let links = std::mem::take(&mut self.state.links);
        for (index, link) in links
            .iter()
            .enumerate()
        {
            self.cdata(&format!("=> {} [{}] {}", link.url, index + 1, link.title));
            self.linebreak(false);
        }
        self.linebreak(false);
    }

    fn internal_link(&mut self, id: &str, title: Option<&LinkTitle>) {
        let target = id
            .split(['?', '#'])
            .next()
            .unwrap_or("");
        let target = if target.is_empty() { self.page_id.clone() } else { target.to_string() };

        let url = match self
            .resolver
            .resolve_page(&self.page_id, &target)
        {
            Some(resolved) => self
                .context
                .page_url(&resolved),
            None => String::new(),
        };

        let fallback = LinkTitle::from(id);
        self.external_link(&url, Some(title.unwrap_or(&fallback)));
    }

    /// `url` is empty for internal targets that do not exist; the label is
    /// then printed without a reference number.
    fn external_link(&mut self, url: &str, title: Option<&LinkTitle>) {
        let (label, is_media) = match title {
            Some(LinkTitle::Media(media)) => {
                let shown = match media.kind {
                    MediaKind::Internal => self.internal_media(&media.src, media.title.as_deref()),
                    MediaKind::External => {
                        self.external_media(&media.src, media.title.as_deref());
                        true
                    }
                };
                let title = media
                    .title
                    .clone()
                    .filter(|title| !title.is_empty());
                if shown {
                    (title.unwrap_or_default(), true)
                } else {
                    // Media that cannot be shown leaves its name as the label.
                    (title.unwrap_or_else(|| basename(&media.src).to_string()), false)
                }
            }
            Some(LinkTitle::Text(text)) => (text.clone(), false),
            None => (String::new(), false),
        };
        let label = if label.is_empty() { url.to_string() } else { label };

        let number = if url.is_empty() {
            None
        } else {
            Some(
                self.state
                    .add_link(url, &label),
            )
        };

        if !is_media {
            self.cdata(&label);
            if let Some(number) = number {
                self.cdata(&format!("[{}]", number));
            }
        } else if let Some(number) = number {
            if self
                .state
                .doc
                .ends_with(NL)
            {
                self.state
                    .doc
                    .pop();
            }
            self.cdata(&format!("[{}]", number));
            self.linebreak(false);
        }
    }

    fn interwiki_link(&mut self, wiki_name: &str, wiki_ref: &str, title: Option<&str>) {
        let title = LinkTitle::from(
            title
                .filter(|title| !title.is_empty())
                .unwrap_or(wiki_ref),
        );
        match self
            .resolver
            .interwiki(wiki_name, wiki_ref)
        {
            InterwikiTarget::External(url) => self.external_link(&url, Some(&title)),
            InterwikiTarget::Internal(id) => self.internal_link(&format!(":{}", id), Some(&title)),
            InterwikiTarget::Unknown => {
                if let LinkTitle::Text(text) = title {
                    self.cdata(&text);
                }
            }
        }
    }

    /// Returns false when `src` names no existing media item.
    fn internal_media(&mut self, src: &str, title: Option<&str>) -> bool {
        let Some(id) = self
            .resolver
            .resolve_media(&self.page_id, src)
        else {
            return false;
        };
        let url = self
            .context
            .media_url(&id);
        self.external_media(&url, title);
        true
    }

    fn external_media(&mut self, src: &str, title: Option<&str>) {
        let title = match title.filter(|title| !title.is_empty()) {
            Some(title) => title.to_string(),
            None => basename(src).to_string(),
        };

        self.linebreak(true);
        self.cdata(&format!("=> {} [{}]", src, title));
        self.linebreak(false);
    }
}

fn basename(src: &str) -> &str {
    let src = src.trim_end_matches('/');
    src.rsplit('/')
        .next()
        .unwrap_or(src)
}
