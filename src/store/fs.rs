//! Directory-backed content store.
//!
//! Layout under the content root:
//!
//! ```text
//! pages/<ns>/<page>.yaml   pre-parsed documents, one YAML list of events
//! media/<ns>/<file>        raw media files
//! ```
//!
//! Identifiers use `:` as namespace separator, so `wiki:syntax` lives at
//! `pages/wiki/syntax.yaml`.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use log::debug;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::{
    config::StoreConfig,
    errors::{ConfigError, GemwikiError, StoreError},
    renderer::{Event, GemtextRenderer, InterwikiTarget, LinkResolver},
    server::context::RequestContext,
    store::ContentStore,
};

const PAGES_DIR: &str = "pages";
const MEDIA_DIR: &str = "media";
const PAGE_EXTENSION: &str = "yaml";

/// Characters kept verbatim when an interwiki reference is substituted.
const INTERWIKI_REF: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Clone, Debug)]
pub struct FsStore {
    root: PathBuf,
    start_page: String,
    interwiki: BTreeMap<String, String>,
}

impl FsStore {
    /// Opens the store rooted at the configured directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is not a directory.
    pub fn open(config: &StoreConfig) -> Result<FsStore, GemwikiError> {
        let root = config.root();
        if !root.is_dir() {
            return Err(GemwikiError::Config(ConfigError::Store(format!(
                "content root {} is not a directory",
                root.display()
            ))));
        }

        Ok(FsStore {
            root: root.to_path_buf(),
            start_page: config
                .start_page()
                .to_string(),
            interwiki: config
                .interwiki()
                .clone(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn start_page(&self) -> &str {
        &self.start_page
    }

    /// File holding page `id`. The file need not exist.
    pub fn page_path(&self, id: &str) -> PathBuf {
        let path = self.id_path(PAGES_DIR, id);
        match path.file_name() {
            Some(name) => {
                let mut name = name.to_os_string();
                name.push(".");
                name.push(PAGE_EXTENSION);
                path.with_file_name(name)
            }
            None => path,
        }
    }

    /// File holding media item `id`. The file need not exist.
    pub fn media_path(&self, id: &str) -> PathBuf {
        self.id_path(MEDIA_DIR, id)
    }

    fn id_path(&self, dir: &str, id: &str) -> PathBuf {
        let mut path = self.root.join(dir);
        for segment in id
            .split(':')
            .filter(|segment| !segment.is_empty())
        {
            path.push(segment);
        }
        path
    }

    /// Reads the event list of page `id`. An empty file is an empty page.
    pub fn load_events(&self, id: &str) -> Result<Vec<Event>, StoreError> {
        let path = self.page_path(id);
        if !path.is_file() {
            return Err(StoreError::NotFound(id.to_string()));
        }

        debug!("Loading page {} from {}", id, path.display());
        let source = fs::read_to_string(&path)?;
        if source
            .trim()
            .is_empty()
        {
            return Ok(Vec::new());
        }

        serde_yaml_ng::from_str::<Vec<Event>>(&source)
            .map_err(|e| StoreError::Document(id.to_string(), e.to_string()))
    }

    /// Turns a link written on page `current` into a clean absolute id.
    ///
    /// A leading `:` is absolute, a leading `.` or `..` climbs from the
    /// namespace of `current`, a bare name stays in that namespace and any
    /// other name containing `:` is absolute.
    pub fn absolute_id(&self, current: &str, link: &str) -> String {
        let link = link
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim();
        if link.is_empty() {
            return current.to_string();
        }

        let namespace = current
            .rsplit_once(':')
            .map(|(namespace, _)| namespace)
            .unwrap_or_default();

        let joined = if let Some(absolute) = link.strip_prefix(':') {
            absolute.to_string()
        } else if link.starts_with('.') {
            relative_id(namespace, link)
        } else if link.contains(':') || namespace.is_empty() {
            link.to_string()
        } else {
            format!("{}:{}", namespace, link)
        };

        self.clean_id(&joined)
    }
}

/// Applies `.`/`..` segments of `link` to `namespace`.
fn relative_id(namespace: &str, link: &str) -> String {
    let mut segments: Vec<&str> = namespace
        .split(':')
        .filter(|segment| !segment.is_empty())
        .collect();

    for part in link.split(':') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            name => segments.push(name.trim_start_matches('.')),
        }
    }

    let mut id = segments.join(":");
    if link.ends_with(':') {
        id.push(':');
    }
    id
}

fn clean_segment(segment: &str) -> String {
    let mut cleaned = String::with_capacity(segment.len());
    for c in segment.chars() {
        let c = if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' };
        if c == '_' && cleaned.ends_with('_') {
            continue;
        }
        cleaned.push(c);
    }

    cleaned
        .trim_matches(['.', '_', '-'])
        .to_string()
}

impl LinkResolver for FsStore {
    fn resolve_page(&self, current: &str, link: &str) -> Option<String> {
        let id = self.absolute_id(current, link);
        self.page_exists(&id)
            .then_some(id)
    }

    fn resolve_media(&self, current: &str, src: &str) -> Option<String> {
        let id = self.absolute_id(current, src);
        self.resolve_media_path(&id)
            .map(|_| id)
    }

    fn interwiki(&self, wiki_name: &str, wiki_ref: &str) -> InterwikiTarget {
        let Some(template) = self
            .interwiki
            .get(&wiki_name.to_lowercase())
        else {
            return InterwikiTarget::Unknown;
        };

        if let Some(page) = template.strip_prefix(':') {
            let id = if page.contains("{NAME}") {
                page.replace("{NAME}", wiki_ref)
            } else {
                format!("{}{}", page, wiki_ref)
            };
            return InterwikiTarget::Internal(self.clean_id(&id));
        }

        let encoded = utf8_percent_encode(wiki_ref, INTERWIKI_REF).to_string();
        let url = if template.contains("{NAME}") {
            template.replace("{NAME}", &encoded)
        } else {
            format!("{}{}", template, encoded)
        };
        InterwikiTarget::External(url)
    }
}

impl ContentStore for FsStore {
    /// Lowercases, splits on `:`, `/` and `;`, replaces characters outside
    /// letters, digits, `.`, `-` and `_` with `_` and drops empty segments.
    /// An empty id or one naming a namespace (trailing `:`) points at the
    /// start page.
    fn clean_id(&self, raw: &str) -> String {
        let raw = raw
            .trim()
            .to_lowercase();
        let mut segments: Vec<String> = raw
            .split([':', '/', ';'])
            .map(clean_segment)
            .filter(|segment| !segment.is_empty())
            .collect();

        let names_namespace = raw.ends_with([':', '/', ';']);
        if segments.is_empty() || names_namespace {
            segments.push(
                self.start_page
                    .clone(),
            );
        }

        segments.join(":")
    }

    fn page_exists(&self, id: &str) -> bool {
        self.page_path(id)
            .is_file()
    }

    fn resolve_media_path(&self, id: &str) -> Option<PathBuf> {
        let path = self.media_path(id);
        path.is_file()
            .then_some(path)
    }

    fn render_page(&self, id: &str, context: &RequestContext) -> Result<Bytes, StoreError> {
        let events = self.load_events(id)?;
        let gemtext = GemtextRenderer::render_document(id, context, self, &events);
        Ok(Bytes::from(gemtext))
    }
}
