//! SMTP reply parser.

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// Parses an SMTP reply from its lines (CRLF already stripped).
///
/// ```text
/// 250-mx.example.com
/// 250-AUTH PLAIN LOGIN
/// 250 STARTTLS
/// ```
///
/// Every line must carry the same three-digit code.
///
/// # Errors
///
/// Returns an error if the reply is malformed.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let first = lines
        .first()
        .ok_or_else(|| Error::Protocol("Empty reply".into()))?;
    let code = parse_code(first)?;

    let mut message = Vec::with_capacity(lines.len());
    for line in lines {
        if parse_code(line)? != code {
            return Err(Error::Protocol(format!(
                "Reply code changed mid-reply: {line}"
            )));
        }
        let text = line
            .get(4..)
            .or_else(|| (line.len() == 3).then_some(""))
            .ok_or_else(|| Error::Protocol(format!("Malformed reply line: {line}")))?;
        message.push(text.to_string());
    }

    Ok(Reply::new(code, message))
}

fn parse_code(line: &str) -> Result<ReplyCode> {
    let digits = line
        .get(0..3)
        .filter(|d| d.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| Error::Protocol(format!("Invalid reply line: {line}")))?;
    let code = digits
        .parse::<u16>()
        .map_err(|_| Error::Protocol(format!("Invalid reply code: {digits}")))?;
    Ok(ReplyCode::new(code))
}

/// Checks if a line is the last line of a reply.
///
/// Continuation lines use `-` after the code; the final line uses a space
/// or ends right after the code.
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    match line.as_bytes().get(3) {
        Some(b' ') => true,
        Some(_) => false,
        None => line.len() == 3,
    }
}
