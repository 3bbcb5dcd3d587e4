//! IMAP response parser.
//!
//! Sans-I/O: takes one complete response as produced by
//! [`FramedStream::read_response`](crate::FramedStream::read_response) and
//! turns it into a [`Response`]. Only status responses, CAPABILITY data and
//! continuation requests are given structure; any other untagged data is
//! kept as raw text.
//!
//! # Example
//!
//! ```
//! use mailprobe_imap::parser::{ResponseParser, Response, UntaggedResponse};
//!
//! let response = ResponseParser::parse(b"* OK IMAP4rev2 server ready\r\n").unwrap();
//!
//! match response {
//!     Response::Untagged(UntaggedResponse::Ok { text, .. }) => {
//!         assert!(text.contains("IMAP4rev2"));
//!     }
//!     _ => panic!("Expected untagged OK"),
//! }
//! ```

use crate::types::{Capability, ResponseCode, Status};
use crate::{Error, Result};

/// A parsed IMAP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Tagged response (command completion).
    Tagged {
        /// The command tag.
        tag: String,
        /// Response status.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// Untagged response (server data).
    Untagged(UntaggedResponse),
    /// Continuation request.
    Continuation {
        /// Optional text/data.
        text: Option<String>,
    },
}

/// Untagged server data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UntaggedResponse {
    /// `* OK`
    Ok {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* NO`
    No {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* BAD`
    Bad {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* PREAUTH`
    PreAuth {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* BYE`
    Bye {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* CAPABILITY ...`
    Capability(Vec<Capability>),
    /// Any other untagged data, verbatim without the leading `* `.
    Other(String),
}

/// Response parser.
pub struct ResponseParser;

impl ResponseParser {
    /// Parses a complete response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the input is not a recognizable response.
    pub fn parse(input: &[u8]) -> Result<Response> {
        let line = String::from_utf8_lossy(input);
        let line = line.trim_end_matches(['\r', '\n']);

        if let Some(rest) = line.strip_prefix('+') {
            let text = rest.trim_start();
            return Ok(Response::Continuation {
                text: (!text.is_empty()).then(|| text.to_string()),
            });
        }

        if let Some(rest) = line.strip_prefix("* ") {
            return Ok(Response::Untagged(Self::parse_untagged(rest)));
        }

        Self::parse_tagged(line)
    }

    fn parse_tagged(line: &str) -> Result<Response> {
        let (tag, rest) = line
            .split_once(' ')
            .ok_or_else(|| Error::Parse(format!("missing status after tag: {line}")))?;
        if tag.is_empty() || !tag.bytes().all(is_tag_char) {
            return Err(Error::Parse(format!("invalid tag: {tag}")));
        }

        let (word, rest) = rest.split_once(' ').unwrap_or((rest, ""));
        let status = Status::parse(word)
            .ok_or_else(|| Error::Parse(format!("invalid status: {word}")))?;
        let (code, text) = parse_resp_text(rest);

        Ok(Response::Tagged {
            tag: tag.to_string(),
            status,
            code,
            text,
        })
    }

    fn parse_untagged(rest: &str) -> UntaggedResponse {
        let (word, tail) = rest.split_once(' ').unwrap_or((rest, ""));

        if word.eq_ignore_ascii_case("CAPABILITY") {
            return UntaggedResponse::Capability(Capability::parse_list(tail));
        }

        let Some(status) = Status::parse(word) else {
            return UntaggedResponse::Other(rest.to_string());
        };
        let (code, text) = parse_resp_text(tail);
        match status {
            Status::Ok => UntaggedResponse::Ok { code, text },
            Status::No => UntaggedResponse::No { code, text },
            Status::Bad => UntaggedResponse::Bad { code, text },
            Status::PreAuth => UntaggedResponse::PreAuth { code, text },
            Status::Bye => UntaggedResponse::Bye { code, text },
        }
    }
}

/// Splits `[CODE args] text` into its parts.
fn parse_resp_text(s: &str) -> (Option<ResponseCode>, String) {
    let s = s.trim_start();
    if let Some(inner) = s.strip_prefix('[')
        && let Some(end) = inner.find(']')
    {
        let code = ResponseCode::parse(&inner[..end]);
        let text = inner[end + 1..].trim_start().to_string();
        return (Some(code), text);
    }
    (None, s.to_string())
}

const fn is_tag_char(b: u8) -> bool {
    b.is_ascii_graphic() && !matches!(b, b'+' | b'(' | b')' | b'{' | b'%' | b'*' | b'"' | b'\\' | b']')
}
