//! Implementation for the not-authenticated state.

use std::marker::PhantomData;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector;

use super::states::{Authenticated, NotAuthenticated};
use super::{Client, check_tagged_ok, find_capabilities, tagged_completion};
use crate::command::{Command, TagGenerator};
use crate::connection::framed::FramedStream;
use crate::connection::stream::ImapStream;
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{Capability, ResponseCode, Status};
use crate::{Error, Result};

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new client from a connected stream and reads the greeting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bye`] if the server refuses the connection, and
    /// [`Error::InvalidState`] on a PREAUTH greeting since no credentials
    /// would be checked on such a session.
    pub async fn from_stream(stream: ImapStream<S>) -> Result<Self> {
        let is_tls = stream.is_tls();
        let mut framed = FramedStream::new(stream);

        let greeting = framed.read_response().await?;
        let capabilities = match ResponseParser::parse(&greeting)? {
            Response::Untagged(UntaggedResponse::Ok { code, .. }) => match code {
                Some(ResponseCode::Capability(caps)) => caps,
                _ => Vec::new(),
            },
            Response::Untagged(UntaggedResponse::PreAuth { .. }) => {
                return Err(Error::InvalidState(
                    "server pre-authenticated the session".to_string(),
                ));
            }
            Response::Untagged(UntaggedResponse::Bye { text, .. }) => {
                return Err(Error::Bye(text));
            }
            other => {
                return Err(Error::Protocol(format!("unexpected greeting: {other:?}")));
            }
        };

        Ok(Self {
            stream: framed,
            tag_gen: TagGenerator::default(),
            capabilities,
            is_tls,
            _state: PhantomData,
        })
    }

    /// Upgrades the session with STARTTLS and refreshes the capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] if STARTTLS is not advertised, or an
    /// error if the upgrade fails.
    pub async fn starttls(mut self, host: &str, connector: &TlsConnector) -> Result<Self> {
        if self.capabilities.is_empty() {
            self.capability().await?;
        }
        if !self.has_capability(&Capability::StartTls) {
            return Err(Error::NotSupported("STARTTLS".into()));
        }

        let tag = self.send(&Command::StartTls).await?;
        let responses = self.read_until_tagged(&tag).await?;
        check_tagged_ok(&responses, &tag)?;

        if self.stream.has_buffered_input() {
            return Err(Error::Protocol(
                "plaintext data received after STARTTLS".to_string(),
            ));
        }

        let stream = self
            .stream
            .into_inner()
            .upgrade_to_tls(host, connector)
            .await?;

        let mut client = Self {
            stream: FramedStream::new(stream),
            tag_gen: self.tag_gen,
            capabilities: Vec::new(),
            is_tls: true,
            _state: PhantomData,
        };
        client.capability().await?;
        Ok(client)
    }

    /// Authenticates with LOGIN, falling back to AUTHENTICATE PLAIN when the
    /// server disables LOGIN but offers PLAIN.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if the credentials are refused.
    pub async fn login(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<S, Authenticated>> {
        if self.capabilities.is_empty() {
            self.capability().await?;
        }
        if self.login_disabled() {
            if self.supports_auth_plain() {
                return self.authenticate_plain(username, password).await;
            }
            return Err(Error::NotSupported("LOGIN".into()));
        }

        let tag = self
            .send(&Command::Login {
                username: username.to_string(),
                password: password.to_string(),
            })
            .await?;
        let responses = self.read_until_tagged(&tag).await?;
        self.finish_auth(&responses, &tag)
    }

    /// Authenticates with SASL PLAIN.
    ///
    /// Uses the initial-response form when SASL-IR is advertised, otherwise
    /// waits for the continuation request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if the credentials are refused.
    pub async fn authenticate_plain(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<S, Authenticated>> {
        let encoded = BASE64.encode(format!("\0{username}\0{password}"));

        let tag = if self.has_capability(&Capability::SaslIr) {
            self.send(&Command::Authenticate {
                mechanism: "PLAIN".into(),
                initial_response: Some(encoded),
            })
            .await?
        } else {
            let tag = self
                .send(&Command::Authenticate {
                    mechanism: "PLAIN".into(),
                    initial_response: None,
                })
                .await?;
            let response = self.stream.read_response().await?;
            match ResponseParser::parse(&response)? {
                Response::Continuation { .. } => {
                    let mut line = encoded.into_bytes();
                    line.extend_from_slice(b"\r\n");
                    self.stream.write_command(&line).await?;
                }
                Response::Tagged { .. } => return self.finish_auth(&[response], &tag),
                Response::Untagged(_) => {
                    return Err(Error::Protocol(
                        "expected continuation after AUTHENTICATE".into(),
                    ));
                }
            }
            tag
        };

        let responses = self.read_until_tagged(&tag).await?;
        self.finish_auth(&responses, &tag)
    }

    fn finish_auth(
        mut self,
        responses: &[Vec<u8>],
        tag: &str,
    ) -> Result<Client<S, Authenticated>> {
        let (status, code, text) = tagged_completion(responses, tag)?;
        match status {
            Status::Ok => {
                if let Some(caps) = find_capabilities(responses) {
                    self.capabilities = caps;
                }
                Ok(self.transition())
            }
            Status::No => match code {
                Some(code) if code.is_server_side() => Err(Error::No(text)),
                _ => Err(Error::Auth(text)),
            },
            Status::Bad => Err(Error::Bad(text)),
            Status::Bye => Err(Error::Bye(text)),
            Status::PreAuth => Err(Error::Protocol("PREAUTH as command completion".into())),
        }
    }
}
