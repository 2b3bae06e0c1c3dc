//! Gemini request line parsing.
//!
//! A request is a single absolute URL terminated by CRLF. Parsing validates
//! the URL with the `url` crate, but the path is taken from the raw line:
//! URL normalisation would silently remove `..` segments, and a request
//! that tries to climb out of the document root must be refused rather than
//! quietly rewritten.

use percent_encoding::percent_decode_str;
use thiserror::Error;
use url::Url;

use crate::server::response::Response;

/// Reasons a request line is refused before any lookup happens.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RequestError {
    #[error("BAD REQUEST")]
    Malformed,

    #[error("BAD REQUEST")]
    NotUtf8,

    #[error("REQUEST TOO LONG")]
    TooLong,

    /// Decoded path contains a parent directory segment
    #[error("BAD URL")]
    BadUrl,

    /// Scheme present and not `gemini`
    #[error("BAD PROTOCOL")]
    BadProtocol,
}

impl From<RequestError> for Response {
    fn from(err: RequestError) -> Self {
        Response::bad_request(&err.to_string())
    }
}

/// A parsed request line.
#[derive(Clone, Debug, PartialEq)]
pub struct GeminiRequest {
    raw: String,
    scheme: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    path: String,
    query: Option<String>,
}

impl GeminiRequest {
    /// Parses a request line. The first failing check wins:
    /// malformed URL, then path traversal, then foreign scheme.
    pub fn parse(raw: &str) -> Result<GeminiRequest, RequestError> {
        let line = raw.trim_end_matches(['\r', '\n']);

        let (scheme, host, port, query) = match Url::parse(line) {
            Ok(url) => (
                Some(
                    url.scheme()
                        .to_string(),
                ),
                url.host_str()
                    .map(str::to_string),
                url.port(),
                url.query()
                    .map(str::to_string),
            ),
            Err(url::ParseError::RelativeUrlWithoutBase) => parse_schemeless(line)?,
            Err(_) => return Err(RequestError::Malformed),
        };

        let path = raw_path(line);
        let path = if path.is_empty() { "/" } else { path };
        let path = percent_decode_str(path)
            .decode_utf8()
            .map_err(|_| RequestError::NotUtf8)?
            .replace('\\', "/");

        if path.contains("/..") {
            return Err(RequestError::BadUrl);
        }

        if let Some(scheme) = &scheme {
            if scheme != "gemini" {
                return Err(RequestError::BadProtocol);
            }
        }

        Ok(GeminiRequest { raw: line.to_string(), scheme, host, port, path, query })
    }

    /// The request line without its terminator.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme
            .as_deref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host
            .as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Decoded path with backslashes turned into slashes.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query
            .as_deref()
    }
}

type UrlParts = (Option<String>, Option<String>, Option<u16>, Option<String>);

/// Handles `//host/path` and `/path` request lines.
fn parse_schemeless(line: &str) -> Result<UrlParts, RequestError> {
    if !line.starts_with('/') {
        return Err(RequestError::Malformed);
    }
    let base = Url::parse("gemini://localhost/").map_err(|_| RequestError::Malformed)?;
    let url = base
        .join(line)
        .map_err(|_| RequestError::Malformed)?;
    let host = if line.starts_with("//") {
        url.host_str()
            .map(str::to_string)
    } else {
        None
    };
    let port = if host.is_some() { url.port() } else { None };
    Ok((
        None,
        host,
        port,
        url.query()
            .map(str::to_string),
    ))
}

/// Path component of a request line exactly as the client sent it.
fn raw_path(line: &str) -> &str {
    let rest = match scheme_end(line) {
        Some(end) => &line[end + 1..],
        None => line,
    };

    let rest = match rest.strip_prefix("//") {
        Some(authority_and_path) => match authority_and_path.find(['/', '?', '#']) {
            Some(start) => &authority_and_path[start..],
            None => "",
        },
        None => rest,
    };

    match rest.find(['?', '#']) {
        Some(end) => &rest[..end],
        None => rest,
    }
}

/// Index of the `:` ending a URL scheme, if the line starts with one.
fn scheme_end(line: &str) -> Option<usize> {
    let colon = line.find(':')?;
    let scheme = &line[..colon];
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        Some(colon)
    } else {
        None
    }
}
