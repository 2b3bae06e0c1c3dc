use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use tempfile::TempDir;

use crate::{
    config::StoreConfig,
    renderer::LinkResolver,
    server::context::RequestContext,
    store::fs::FsStore,
};

pub fn peer() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 40000))
}

pub fn local() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 1965))
}

pub fn context(path: &str) -> RequestContext {
    RequestContext::new("example.org", path, peer(), local())
}

/// Writes `contents` to `relative` under `root`, creating directories.
pub fn write_file(root: &Path, relative: &str, contents: &[u8]) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

/// A content directory with a small wiki in it.
pub fn wiki() -> (TempDir, FsStore) {
    let dir = tempfile::tempdir().unwrap();
    write_file(
        dir.path(),
        "pages/start.yaml",
        br#"
- type: header
  text: Welcome
  level: 1
- type: paragraph_open
- type: cdata
  text: "Read the "
- type: internal_link
  id: wiki:syntax
  title: syntax guide
- type: paragraph_close
- type: section_close
"#,
    );
    write_file(dir.path(), "pages/wiki/syntax.yaml", b"");
    write_file(dir.path(), "pages/broken.yaml", b"- type: [not an event");
    write_file(dir.path(), "media/wiki/logo.png", b"\x89PNG\r\n\x1a\nlogo");

    let config = StoreConfig::builder()
        .root(dir.path())
        .interwiki("wp", "https://en.wikipedia.org/wiki/{NAME}")
        .interwiki("search", "https://search.example/?q=")
        .interwiki("local", ":wiki:{NAME}")
        .build()
        .unwrap();
    let store = FsStore::open(&config).unwrap();
    (dir, store)
}

/// Resolver knowing a fixed set of absolute ids.
pub struct FixedResolver {
    pub pages: Vec<&'static str>,
    pub media: Vec<&'static str>,
}

impl LinkResolver for FixedResolver {
    fn resolve_page(&self, _current: &str, link: &str) -> Option<String> {
        let id = link.trim_start_matches(':');
        self.pages
            .contains(&id)
            .then(|| id.to_string())
    }

    fn resolve_media(&self, _current: &str, src: &str) -> Option<String> {
        let id = src.trim_start_matches(':');
        self.media
            .contains(&id)
            .then(|| id.to_string())
    }
}
