//! Commands issued during a verification session.

use crate::types::AuthMechanism;

/// SMTP command.
///
/// Only the commands needed to greet, secure and authenticate a session are
/// modelled; nothing here opens a mail transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// HELO - fallback greeting for servers without ESMTP.
    Helo {
        /// Name we announce ourselves as.
        hostname: String,
    },
    /// EHLO - extended greeting.
    Ehlo {
        /// Name we announce ourselves as.
        hostname: String,
    },
    /// STARTTLS - upgrade to TLS.
    StartTls,
    /// AUTH - begin a SASL exchange.
    Auth {
        /// Mechanism to use.
        mechanism: AuthMechanism,
        /// Initial response (SASL-IR), already base64 encoded.
        initial_response: Option<String>,
    },
    /// NOOP
    Noop,
    /// QUIT
    Quit,
}

impl Command {
    /// Returns the command verb.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Helo { .. } => "HELO",
            Self::Ehlo { .. } => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::Auth { .. } => "AUTH",
            Self::Noop => "NOOP",
            Self::Quit => "QUIT",
        }
    }

    /// Serializes the command to a CRLF-terminated line.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut line = String::from(self.verb());

        match self {
            Self::Helo { hostname } | Self::Ehlo { hostname } => {
                line.push(' ');
                line.push_str(hostname);
            }
            Self::Auth {
                mechanism,
                initial_response,
            } => {
                line.push(' ');
                line.push_str(mechanism.as_str());
                if let Some(resp) = initial_response {
                    line.push(' ');
                    line.push_str(resp);
                }
            }
            Self::StartTls | Self::Noop | Self::Quit => {}
        }

        line.push_str("\r\n");
        line.into_bytes()
    }
}
