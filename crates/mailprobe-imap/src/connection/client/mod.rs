//! Type-state IMAP client connection.
//!
//! - `NotAuthenticated`: initial state after the greeting
//! - `Authenticated`: after a successful LOGIN/AUTHENTICATE

mod not_authenticated;
mod states;

use std::marker::PhantomData;

use tokio::io::{AsyncRead, AsyncWrite};

pub use self::states::{Authenticated, NotAuthenticated};
use super::framed::{FramedStream, ResponseAccumulator};
use super::stream::ImapStream;
use crate::command::{Command, TagGenerator};
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{Capability, ResponseCode, Status};
use crate::{Error, Result};

/// IMAP client connection with type-state.
pub struct Client<S, State> {
    pub(crate) stream: FramedStream<ImapStream<S>>,
    pub(crate) tag_gen: TagGenerator,
    pub(crate) capabilities: Vec<Capability>,
    pub(crate) is_tls: bool,
    _state: PhantomData<State>,
}

// Manual Debug implementation since FramedStream doesn't implement Debug
impl<S, State> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("tag_gen", &self.tag_gen)
            .field("capabilities", &self.capabilities)
            .field("is_tls", &self.is_tls)
            .finish_non_exhaustive()
    }
}

/// Shared implementation for all states.
impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the server capabilities.
    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Checks if the server has a specific capability.
    #[must_use]
    pub fn has_capability(&self, cap: &Capability) -> bool {
        self.capabilities.contains(cap)
    }

    /// Returns true if LOGIN is disabled (e.g., before STARTTLS).
    #[must_use]
    pub fn login_disabled(&self) -> bool {
        self.has_capability(&Capability::LoginDisabled)
    }

    /// Returns true if the server supports AUTH=PLAIN.
    #[must_use]
    pub fn supports_auth_plain(&self) -> bool {
        self.capabilities
            .iter()
            .any(|c| matches!(c, Capability::Auth(m) if m.eq_ignore_ascii_case("PLAIN")))
    }

    /// Returns true if the session is running over TLS.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        self.is_tls
    }

    /// Sends a NOOP command.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer OK.
    pub async fn noop(&mut self) -> Result<()> {
        let tag = self.send(&Command::Noop).await?;
        let responses = self.read_until_tagged(&tag).await?;
        check_tagged_ok(&responses, &tag)
    }

    /// Sends a CAPABILITY command and updates the stored capabilities.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn capability(&mut self) -> Result<Vec<Capability>> {
        let tag = self.send(&Command::Capability).await?;
        let responses = self.read_until_tagged(&tag).await?;
        check_tagged_ok(&responses, &tag)?;

        if let Some(caps) = find_capabilities(&responses) {
            self.capabilities = caps;
        }
        Ok(self.capabilities.clone())
    }

    /// Sends LOGOUT and closes the session (available in any state).
    ///
    /// # Errors
    ///
    /// Returns an error only if the command cannot be written.
    pub async fn logout(mut self) -> Result<()> {
        let tag = self.send(&Command::Logout).await?;
        // Servers may drop the connection right after BYE
        if let Err(e) = self.read_until_tagged(&tag).await {
            tracing::trace!(error = %e, "connection closed during LOGOUT");
        }
        Ok(())
    }

    pub(crate) async fn send(&mut self, cmd: &Command) -> Result<String> {
        let tag = self.tag_gen.next();
        if cmd.is_sensitive() {
            tracing::trace!(%tag, "C: <credentials redacted>");
        } else {
            tracing::trace!(%tag, command = ?cmd, "C:");
        }
        self.stream.write_command(&cmd.serialize(&tag)).await?;
        Ok(tag)
    }

    pub(crate) async fn read_until_tagged(&mut self, tag: &str) -> Result<Vec<Vec<u8>>> {
        ResponseAccumulator::new(tag)
            .read_until_tagged(&mut self.stream)
            .await
    }

    pub(crate) fn transition<Next>(self) -> Client<S, Next> {
        Client {
            stream: self.stream,
            tag_gen: self.tag_gen,
            capabilities: self.capabilities,
            is_tls: self.is_tls,
            _state: PhantomData,
        }
    }
}

/// Extracts capabilities from untagged CAPABILITY data or a `[CAPABILITY]` code.
pub(crate) fn find_capabilities(responses: &[Vec<u8>]) -> Option<Vec<Capability>> {
    responses
        .iter()
        .filter_map(|bytes| ResponseParser::parse(bytes).ok())
        .find_map(|response| match response {
            Response::Untagged(UntaggedResponse::Capability(caps))
            | Response::Tagged {
                code: Some(ResponseCode::Capability(caps)),
                ..
            } => Some(caps),
            _ => None,
        })
}

/// Finds the tagged completion for `tag`.
pub(crate) fn tagged_completion(
    responses: &[Vec<u8>],
    tag: &str,
) -> Result<(Status, Option<ResponseCode>, String)> {
    for bytes in responses.iter().rev() {
        if let Ok(Response::Tagged {
            tag: resp_tag,
            status,
            code,
            text,
        }) = ResponseParser::parse(bytes)
            && resp_tag == tag
        {
            return Ok((status, code, text));
        }
    }
    Err(Error::Protocol("missing tagged response".to_string()))
}

/// Checks that the tagged response is OK.
pub(crate) fn check_tagged_ok(responses: &[Vec<u8>], tag: &str) -> Result<()> {
    let (status, _, text) = tagged_completion(responses, tag)?;
    match status {
        Status::Ok | Status::PreAuth => Ok(()),
        Status::No => Err(Error::No(text)),
        Status::Bad => Err(Error::Bad(text)),
        Status::Bye => Err(Error::Bye(text)),
    }
}
