use bytes::Bytes;

/// Gemini status codes this server answers with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    Success,
    TemporaryFailure,
    NotFound,
    BadRequest,
}

impl Status {
    pub fn code(&self) -> u8 {
        match self {
            Status::Success => 20,
            Status::TemporaryFailure => 40,
            Status::NotFound => 51,
            Status::BadRequest => 59,
        }
    }
}

/// Status line plus optional body.
///
/// Only [`Status::Success`] responses carry a body; the constructors are the
/// only way to build one.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    status: Status,
    meta: String,
    body: Option<Bytes>,
}

impl Response {
    pub fn success(mime: &str, body: Bytes) -> Self {
        Response { status: Status::Success, meta: clean_meta(mime), body: Some(body) }
    }

    pub fn not_found() -> Self {
        Response { status: Status::NotFound, meta: "NOT FOUND".to_string(), body: None }
    }

    pub fn bad_request(message: &str) -> Self {
        Response { status: Status::BadRequest, meta: clean_meta(message), body: None }
    }

    pub fn temporary_failure() -> Self {
        Response {
            status: Status::TemporaryFailure,
            meta: "TEMPORARY FAILURE".to_string(),
            body: None,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn meta(&self) -> &str {
        &self.meta
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body
            .as_ref()
    }

    /// The CRLF-terminated status line.
    pub fn header(&self) -> String {
        if self
            .meta
            .is_empty()
        {
            format!("{}\r\n", self.status.code())
        } else {
            format!("{} {}\r\n", self.status.code(), self.meta)
        }
    }
}

/// Meta text must stay on the status line.
fn clean_meta(meta: &str) -> String {
    meta.chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}
