use crate::{config::DEFAULT_MEDIA_PREFIX, store::ContentStore};

/// What a request path points at.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResourceKind {
    Page,
    Media,
}

/// A classified request path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Resource {
    kind: ResourceKind,
    id: String,
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Canonical content identifier.
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Maps sanitized request paths to content identifiers.
#[derive(Clone, Debug)]
pub struct PathResolver {
    media_prefix: String,
}

impl Default for PathResolver {
    fn default() -> Self {
        PathResolver::new(DEFAULT_MEDIA_PREFIX)
    }
}

impl PathResolver {
    pub fn new(media_prefix: &str) -> Self {
        PathResolver { media_prefix: media_prefix.to_string() }
    }

    pub fn media_prefix(&self) -> &str {
        &self.media_prefix
    }

    /// Splits off the media prefix, turns path separators into namespace
    /// separators and lets the store clean the result.
    pub fn classify(&self, path: &str, store: &dyn ContentStore) -> Resource {
        let (kind, rest) = match path.strip_prefix(self.media_prefix.as_str()) {
            Some(rest) => (ResourceKind::Media, rest),
            None => (ResourceKind::Page, path),
        };

        let id = store.clean_id(&rest.replace('/', ":"));
        Resource { kind, id }
    }
}
