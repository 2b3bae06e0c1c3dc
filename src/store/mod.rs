//! Content store interface.
//!
//! The server does not know how pages are stored or how their markup is
//! parsed. It talks to a [`ContentStore`], which answers existence questions,
//! locates media files and renders pages by driving a
//! [`GemtextRenderer`](crate::renderer::GemtextRenderer).
//!
//! [`fs::FsStore`] is a directory-backed implementation.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use mime::Mime;

use crate::{errors::StoreError, renderer::LinkResolver, server::context::RequestContext};

pub mod fs;

/// Media type information for a stored file.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaType {
    extension: Option<String>,
    mime: Mime,
    download: bool,
}

impl MediaType {
    /// Guesses the type from the file extension.
    pub fn from_path(path: &Path) -> Self {
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let extension = path
            .extension()
            .map(|ext| {
                ext.to_string_lossy()
                    .to_lowercase()
            });
        let kind = mime.type_();
        let inline =
            kind == mime::TEXT || kind == mime::IMAGE || kind == mime::AUDIO || kind == mime::VIDEO;
        MediaType { extension, mime, download: !inline }
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension
            .as_deref()
    }

    pub fn mime(&self) -> &Mime {
        &self.mime
    }

    /// Whether clients should save the file rather than display it.
    pub fn download(&self) -> bool {
        self.download
    }
}

/// Everything the server needs from the content engine.
pub trait ContentStore: LinkResolver + Send + Sync {
    /// Normalizes a raw identifier (namespace separators already applied).
    fn clean_id(&self, raw: &str) -> String;

    fn page_exists(&self, id: &str) -> bool;

    /// Location of a media item, if it exists.
    fn resolve_media_path(&self, id: &str) -> Option<PathBuf>;

    fn identifier_exists(&self, id: &str) -> bool {
        self.page_exists(id)
            || self
                .resolve_media_path(id)
                .is_some()
    }

    /// Renders page `id` to Gemtext.
    fn render_page(&self, id: &str, context: &RequestContext) -> Result<Bytes, StoreError>;

    fn mime_type_for_file(&self, path: &Path) -> MediaType {
        MediaType::from_path(path)
    }
}
