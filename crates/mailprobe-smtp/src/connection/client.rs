//! Type-state SMTP client.

use super::{ServerInfo, SmtpStream};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{AuthMechanism, Extension, Reply, ReplyCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::collections::HashSet;
use std::marker::PhantomData;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector;

/// Upper bound on lines in a single multi-line reply.
const MAX_REPLY_LINES: usize = 128;

/// Type-state marker for connected state.
#[derive(Debug)]
pub struct Connected;

/// Type-state marker for authenticated state.
#[derive(Debug)]
pub struct Authenticated;

/// SMTP client with type-state pattern.
#[derive(Debug)]
pub struct Client<S, State> {
    stream: SmtpStream<S>,
    server_info: ServerInfo,
    _state: PhantomData<State>,
}

/// Connection trait for all states.
pub trait SmtpConnection {
    /// Returns the server information.
    fn server_info(&self) -> &ServerInfo;
}

impl<S, State> SmtpConnection for Client<S, State> {
    fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }
}

impl<S> Client<S, Connected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a client from a stream and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the greeting fails or if the server returns an error.
    pub async fn from_stream(mut stream: SmtpStream<S>) -> Result<Self> {
        let greeting = read_reply(&mut stream).await?;
        if greeting.code != ReplyCode::SERVICE_READY {
            return Err(Error::smtp_error(
                greeting.code.as_u16(),
                greeting.message_text(),
            ));
        }

        let hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();

        Ok(Self {
            stream,
            server_info: ServerInfo {
                hostname,
                extensions: HashSet::new(),
            },
            _state: PhantomData,
        })
    }

    /// Sends EHLO and records the advertised extensions.
    ///
    /// Falls back to HELO when the server does not understand EHLO.
    ///
    /// # Errors
    ///
    /// Returns an error if both EHLO and HELO are rejected.
    pub async fn ehlo(mut self, client_hostname: &str) -> Result<Self> {
        let reply = self
            .send_command(Command::Ehlo {
                hostname: client_hostname.to_string(),
            })
            .await?;

        if reply.is_success() {
            self.server_info.extensions = parse_extensions(&reply);
            return Ok(self);
        }

        if reply.code == ReplyCode::SYNTAX_ERROR || reply.code == ReplyCode::NOT_IMPLEMENTED {
            tracing::debug!(code = %reply.code, "EHLO rejected, falling back to HELO");
            let reply = self
                .send_command(Command::Helo {
                    hostname: client_hostname.to_string(),
                })
                .await?;
            if reply.is_success() {
                self.server_info.extensions.clear();
                return Ok(self);
            }
            return Err(Error::smtp_error(reply.code.as_u16(), reply.message_text()));
        }

        Err(Error::smtp_error(reply.code.as_u16(), reply.message_text()))
    }

    /// Upgrades the connection to TLS using STARTTLS and repeats EHLO.
    ///
    /// # Errors
    ///
    /// Returns an error if STARTTLS is not advertised or if the upgrade fails.
    pub async fn starttls(
        mut self,
        hostname: &str,
        connector: &TlsConnector,
        client_hostname: &str,
    ) -> Result<Self> {
        if !self.server_info.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".into()));
        }

        let reply = self.send_command(Command::StartTls).await?;
        if reply.code != ReplyCode::SERVICE_READY {
            return Err(Error::smtp_error(reply.code.as_u16(), reply.message_text()));
        }

        self.stream = self.stream.upgrade_to_tls(hostname, connector).await?;
        self.server_info.extensions.clear();
        self.ehlo(client_hostname).await
    }

    /// Authenticates with the mechanism the server prefers for passwords.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthRejected`] if the credentials are refused.
    pub async fn auth(self, username: &str, password: &str) -> Result<Client<S, Authenticated>> {
        match self.server_info.preferred_password_mechanism() {
            AuthMechanism::Login => self.auth_login(username, password).await,
            _ => self.auth_plain(username, password).await,
        }
    }

    /// Authenticates using PLAIN mechanism.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthRejected`] if the credentials are refused.
    pub async fn auth_plain(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<S, Authenticated>> {
        let credentials = format!("\0{username}\0{password}");
        let encoded = BASE64.encode(credentials.as_bytes());

        let reply = self
            .send_command(Command::Auth {
                mechanism: AuthMechanism::Plain,
                initial_response: Some(encoded),
            })
            .await?;

        self.finish_auth(&reply)
    }

    /// Authenticates using the legacy LOGIN mechanism.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthRejected`] if the credentials are refused.
    pub async fn auth_login(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<S, Authenticated>> {
        let reply = self
            .send_command(Command::Auth {
                mechanism: AuthMechanism::Login,
                initial_response: None,
            })
            .await?;
        if reply.code != ReplyCode::AUTH_CONTINUE {
            return self.finish_auth(&reply);
        }

        let reply = self.send_line(BASE64.encode(username.as_bytes())).await?;
        if reply.code != ReplyCode::AUTH_CONTINUE {
            return self.finish_auth(&reply);
        }

        let reply = self.send_line(BASE64.encode(password.as_bytes())).await?;
        self.finish_auth(&reply)
    }

    fn finish_auth(self, reply: &Reply) -> Result<Client<S, Authenticated>> {
        if reply.code == ReplyCode::AUTH_SUCCESS {
            return Ok(Client {
                stream: self.stream,
                server_info: self.server_info,
                _state: PhantomData,
            });
        }

        if reply.is_credential_rejection() {
            return Err(Error::AuthRejected {
                code: reply.code.as_u16(),
                message: reply.message_text(),
            });
        }

        Err(Error::smtp_error(reply.code.as_u16(), reply.message_text()))
    }
}

// Common implementation for all states
impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    async fn send_command(&mut self, cmd: Command) -> Result<Reply> {
        let data = cmd.serialize();
        self.stream.write_all(&data).await?;
        read_reply(&mut self.stream).await
    }

    async fn send_line(&mut self, line: String) -> Result<Reply> {
        let mut data = line.into_bytes();
        data.extend_from_slice(b"\r\n");
        self.stream.write_all(&data).await?;
        read_reply(&mut self.stream).await
    }

    /// Returns true if the session is running over TLS.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        self.stream.is_tls()
    }

    /// Sends NOOP to check the session is still alive.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer 250.
    pub async fn noop(&mut self) -> Result<()> {
        let reply = self.send_command(Command::Noop).await?;
        if reply.is_success() {
            Ok(())
        } else {
            Err(Error::smtp_error(reply.code.as_u16(), reply.message_text()))
        }
    }

    /// Sends QUIT and closes the connection (available in any state).
    ///
    /// # Errors
    ///
    /// Returns an error if the QUIT command fails.
    pub async fn quit(mut self) -> Result<()> {
        let reply = self.send_command(Command::Quit).await?;

        if !reply.is_success() && reply.code != ReplyCode::CLOSING {
            return Err(Error::smtp_error(reply.code.as_u16(), reply.message_text()));
        }

        Ok(())
    }
}

async fn read_reply<S>(stream: &mut SmtpStream<S>) -> Result<Reply>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut lines = Vec::new();
    loop {
        let line = stream.read_line().await?;
        if line.is_empty() {
            continue;
        }

        let is_last = is_last_reply_line(&line);
        lines.push(line);

        if is_last {
            break;
        }
        if lines.len() > MAX_REPLY_LINES {
            return Err(Error::Protocol("reply has too many lines".into()));
        }
    }

    parse_reply(&lines)
}

fn parse_extensions(reply: &Reply) -> HashSet<Extension> {
    // First line echoes the server's name
    reply
        .message
        .iter()
        .skip(1)
        .map(|line| Extension::parse(line))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn plain_auth_success() {
        let mock = Builder::new()
            .read(b"220 mx.example.com ESMTP\r\n")
            .write(b"EHLO probe.local\r\n")
            .read(b"250-mx.example.com\r\n250-AUTH PLAIN LOGIN\r\n250 8BITMIME\r\n")
            .write(b"AUTH PLAIN AHVzZXJAZXhhbXBsZS5jb20Ac2VjcmV0\r\n")
            .read(b"235 2.7.0 Authentication successful\r\n")
            .write(b"QUIT\r\n")
            .read(b"221 2.0.0 Bye\r\n")
            .build();

        let client = Client::from_stream(SmtpStream::plain(mock)).await.unwrap();
        assert_eq!(client.server_info().hostname, "mx.example.com");
        let client = client.ehlo("probe.local").await.unwrap();
        assert!(
            client
                .server_info()
                .auth_mechanisms()
                .contains(&AuthMechanism::Plain)
        );
        let client = client.auth("user@example.com", "secret").await.unwrap();
        client.quit().await.unwrap();
    }

    #[tokio::test]
    async fn plain_auth_rejected() {
        let mock = Builder::new()
            .read(b"220 mx.example.com ESMTP\r\n")
            .write(b"EHLO probe.local\r\n")
            .read(b"250-mx.example.com\r\n250 AUTH PLAIN\r\n")
            .write(b"AUTH PLAIN AHVzZXJAZXhhbXBsZS5jb20Ad3Jvbmc=\r\n")
            .read(b"535 5.7.8 Authentication credentials invalid\r\n")
            .build();

        let client = Client::from_stream(SmtpStream::plain(mock)).await.unwrap();
        let client = client.ehlo("probe.local").await.unwrap();
        let err = client.auth("user@example.com", "wrong").await.unwrap_err();
        assert!(err.is_auth_rejection());
    }

    #[tokio::test]
    async fn login_auth_when_plain_missing() {
        // dXNlcg== is "user", cGFzcw== is "pass"
        let mock = Builder::new()
            .read(b"220 legacy.example.com\r\n")
            .write(b"EHLO probe.local\r\n")
            .read(b"250-legacy.example.com\r\n250 AUTH LOGIN\r\n")
            .write(b"AUTH LOGIN\r\n")
            .read(b"334 VXNlcm5hbWU6\r\n")
            .write(b"dXNlcg==\r\n")
            .read(b"334 UGFzc3dvcmQ6\r\n")
            .write(b"cGFzcw==\r\n")
            .read(b"235 ok\r\n")
            .build();

        let client = Client::from_stream(SmtpStream::plain(mock)).await.unwrap();
        let client = client.ehlo("probe.local").await.unwrap();
        assert!(client.auth("user", "pass").await.is_ok());
    }

    #[tokio::test]
    async fn helo_fallback() {
        let mock = Builder::new()
            .read(b"220 old.example.com\r\n")
            .write(b"EHLO probe.local\r\n")
            .read(b"502 command not implemented\r\n")
            .write(b"HELO probe.local\r\n")
            .read(b"250 old.example.com\r\n")
            .build();

        let client = Client::from_stream(SmtpStream::plain(mock)).await.unwrap();
        let client = client.ehlo("probe.local").await.unwrap();
        assert!(client.server_info().extensions.is_empty());
    }

    #[tokio::test]
    async fn rejecting_greeting() {
        let mock = Builder::new()
            .read(b"554 no service for you\r\n")
            .build();
        let err = Client::from_stream(SmtpStream::plain(mock))
            .await
            .unwrap_err();
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn starttls_not_advertised() {
        let mock = Builder::new()
            .read(b"220 mx.example.com\r\n")
            .write(b"EHLO probe.local\r\n")
            .read(b"250 mx.example.com\r\n")
            .build();

        let client = Client::from_stream(SmtpStream::plain(mock)).await.unwrap();
        let client = client.ehlo("probe.local").await.unwrap();
        let connector = crate::create_tls_connector();
        let err = client
            .starttls("mx.example.com", &connector, "probe.local")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotSupported(_)));
    }
}
