//! Framed I/O for IMAP protocol.
//!
//! Responses are CRLF-terminated lines that may embed `{n}` literals.

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{Error, Result};

const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Longest line accepted before the peer is treated as broken.
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Largest literal accepted. Nothing in a login exchange needs more.
const MAX_LITERAL_SIZE: usize = 1024 * 1024;

/// Framed connection for IMAP protocol.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    write_buffer: BytesMut,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            write_buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
        }
    }

    /// Reads one complete response, including any embedded literals.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, EOF, or an oversized line or literal.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut response = Vec::new();

        loop {
            let line = self.read_line().await?;
            response.extend_from_slice(&line);

            let Some(literal_len) = parse_literal_length(&line) else {
                break;
            };
            if literal_len > MAX_LITERAL_SIZE {
                return Err(Error::Protocol(format!(
                    "literal too large: {literal_len} bytes (max {MAX_LITERAL_SIZE})"
                )));
            }
            let mut literal = vec![0u8; literal_len];
            self.reader.read_exact(&mut literal).await?;
            response.extend_from_slice(&literal);
        }

        Ok(response)
    }

    async fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();

        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }

            if let Some(pos) = memchr_lf(buf) {
                line.extend_from_slice(&buf[..=pos]);
                self.reader.consume(pos + 1);
                break;
            }

            let len = buf.len();
            line.extend_from_slice(buf);
            self.reader.consume(len);

            if line.len() > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }
        }

        if line.len() > MAX_LINE_LENGTH {
            return Err(Error::Protocol("line too long".to_string()));
        }
        Ok(line)
    }

    /// Writes a command to the stream and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        self.write_buffer.clear();
        self.write_buffer.extend_from_slice(data);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buffer).await?;
        stream.flush().await?;

        Ok(())
    }

    /// Returns true if bytes were received that have not been consumed yet.
    ///
    /// After STARTTLS any such bytes would be injected plaintext.
    #[must_use]
    pub fn has_buffered_input(&self) -> bool {
        !self.reader.buffer().is_empty()
    }

    /// Consumes the framed stream and returns the inner stream.
    ///
    /// Any buffered input is dropped.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

/// Finds the first LF. Servers in the wild sometimes send bare LF.
fn memchr_lf(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}

/// Parses a literal length from the end of a line: `{123}` or `{123+}`.
fn parse_literal_length(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\n")?;
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let line = line.strip_suffix(b"}")?;
    let line = line.strip_suffix(b"+").unwrap_or(line);
    let open = line.iter().rposition(|&b| b == b'{')?;
    let digits = &line[open + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Collects responses until the tagged completion for one command.
pub struct ResponseAccumulator {
    tag: String,
    responses: Vec<Vec<u8>>,
}

impl ResponseAccumulator {
    /// Creates a new response accumulator for the given tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            responses: Vec::new(),
        }
    }

    /// Reads responses until the tagged response matching our tag arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails before the tagged response.
    pub async fn read_until_tagged<S>(
        &mut self,
        framed: &mut FramedStream<S>,
    ) -> Result<Vec<Vec<u8>>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let response = framed.read_response().await?;
            let is_tagged = response
                .strip_prefix(self.tag.as_bytes())
                .is_some_and(|rest| rest.first() == Some(&b' '));

            self.responses.push(response);

            if is_tagged {
                break;
            }
        }

        Ok(std::mem::take(&mut self.responses))
    }
}
