//! Structural document events.
//!
//! A content engine parses its native markup and hands the result to the
//! renderer as an ordered list of these events. They deserialize from an
//! internally tagged form, which is also how [`FsStore`](crate::store::fs::FsStore)
//! keeps pre-parsed pages on disk:
//!
//! ```yaml
//! - type: header
//!   text: Welcome
//!   level: 1
//! - type: section_open
//!   level: 1
//! - type: paragraph_open
//! - type: cdata
//!   text: "See "
//! - type: internal_link
//!   id: wiki:syntax
//!   title: the syntax page
//! - type: paragraph_close
//! - type: section_close
//! ```

use serde::Deserialize;

/// Whether a media reference points into the store or to a foreign URL.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Internal,
    External,
}

/// Media shown in place of a link label.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MediaTitle {
    pub kind: MediaKind,
    pub src: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Label of a link: plain text, or media rendered in the label slot.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LinkTitle {
    Text(String),
    Media(MediaTitle),
}

impl From<&str> for LinkTitle {
    fn from(text: &str) -> Self {
        LinkTitle::Text(text.to_string())
    }
}

/// Inline formatting styles. Gemtext has none of them.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FormatStyle {
    Strong,
    Emphasis,
    Underline,
    Monospace,
    Subscript,
    Superscript,
    Deleted,
}

/// One structural callback of a parsed document.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    DocumentStart,
    DocumentEnd,

    Header {
        text: String,
        level: u8,
    },
    SectionOpen {
        #[serde(default)]
        level: u8,
    },
    /// Section boundary; pending links are written here.
    SectionClose,

    Cdata {
        text: String,
    },
    ParagraphOpen,
    ParagraphClose,
    Linebreak,
    Hr,
    FootnoteOpen,
    FootnoteClose,

    ListuOpen,
    ListuClose,
    ListoOpen,
    ListoClose,
    ListitemOpen {
        #[serde(default)]
        level: u8,
    },
    ListitemClose,
    ListcontentOpen,
    ListcontentClose,

    Unformatted {
        text: String,
    },
    Preformatted {
        text: String,
    },
    File {
        text: String,
        #[serde(default)]
        lang: Option<String>,
        #[serde(default)]
        file: Option<String>,
    },
    Code {
        text: String,
        #[serde(default)]
        lang: Option<String>,
        #[serde(default)]
        file: Option<String>,
    },
    QuoteOpen,
    QuoteClose,

    Html {
        text: String,
    },
    HtmlBlock {
        text: String,
    },
    Php {
        text: String,
    },
    PhpBlock {
        text: String,
    },
    /// Syntax handled by an extension of the content engine. Only the
    /// matched source text is kept.
    Plugin {
        name: String,
        #[serde(default)]
        matched: String,
    },

    Acronym {
        text: String,
    },
    Smiley {
        text: String,
    },
    Entity {
        text: String,
    },
    MultiplyEntity {
        x: String,
        y: String,
    },
    SingleQuoteOpening,
    SingleQuoteClosing,
    Apostrophe,
    DoubleQuoteOpening,
    DoubleQuoteClosing,

    CamelCaseLink {
        link: String,
    },
    LocalLink {
        hash: String,
        #[serde(default)]
        name: Option<String>,
    },
    InternalLink {
        id: String,
        #[serde(default)]
        title: Option<LinkTitle>,
    },
    ExternalLink {
        url: String,
        #[serde(default)]
        title: Option<LinkTitle>,
    },
    InterwikiLink {
        wiki_name: String,
        wiki_ref: String,
        #[serde(default)]
        title: Option<String>,
    },
    WindowsShareLink {
        url: String,
        #[serde(default)]
        title: Option<String>,
    },
    EmailLink {
        address: String,
        #[serde(default)]
        name: Option<String>,
    },
    InternalMedia {
        src: String,
        #[serde(default)]
        title: Option<String>,
    },
    ExternalMedia {
        src: String,
        #[serde(default)]
        title: Option<String>,
    },
    InternalMediaLink {
        src: String,
        #[serde(default)]
        title: Option<String>,
    },
    ExternalMediaLink {
        src: String,
        #[serde(default)]
        title: Option<String>,
    },

    Formatting {
        style: FormatStyle,
        open: bool,
    },

    TableOpen,
    TableClose,
    TableRowOpen,
    TableRowClose,
    TableHeaderOpen,
    TableHeaderClose,
    TableCellOpen,
    TableCellClose,
}
