//! Server responses.

use std::fmt;

/// Completion status of a tagged response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    No,
    Bad,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Ok => "OK",
            Status::No => "NO",
            Status::Bad => "BAD",
        })
    }
}

/// One response line. `Display` renders the line including its CRLF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `+ text`
    Continuation(String),
    /// `* text`
    Untagged(String),
    /// `tag STATUS text`
    Tagged {
        tag: String,
        status: Status,
        text: String,
    },
}

impl Response {
    pub fn tagged(tag: &str, status: Status, text: impl Into<String>) -> Self {
        Response::Tagged {
            tag: tag.to_string(),
            status,
            text: text.into(),
        }
    }

    /// The status of a tagged response, `None` for the other kinds.
    pub fn status(&self) -> Option<Status> {
        match self {
            Response::Tagged { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Response::Continuation(text) | Response::Untagged(text) => text,
            Response::Tagged { text, .. } => text,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Continuation(text) => write!(f, "+ {}\r\n", text),
            Response::Untagged(text) => write!(f, "* {}\r\n", text),
            Response::Tagged { tag, status, text } => write!(f, "{} {} {}\r\n", tag, status, text),
        }
    }
}
