//! Error types for SMTP operations.

use std::io;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Server returned an error reply.
    #[error("SMTP error {code}: {message}")]
    SmtpError {
        /// Reply code (e.g., 550).
        code: u16,
        /// Error message from server.
        message: String,
    },

    /// Server rejected the supplied credentials.
    #[error("Authentication rejected ({code}): {message}")]
    AuthRejected {
        /// Reply code (usually 535).
        code: u16,
        /// Error message from server.
        message: String,
    },

    /// Protocol error (unexpected response).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Feature not supported by server.
    #[error("Server does not support {0}")]
    NotSupported(String),

    /// Connection closed by the server mid-conversation.
    #[error("Connection closed by server")]
    ConnectionClosed,
}

impl Error {
    /// Creates an SMTP error from a reply code and message.
    #[must_use]
    pub fn smtp_error(code: u16, message: impl Into<String>) -> Self {
        Self::SmtpError {
            code,
            message: message.into(),
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::SmtpError { code, .. } | Self::AuthRejected { code, .. }
                if *code >= 500 && *code < 600
        )
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::SmtpError { code, .. } | Self::AuthRejected { code, .. }
                if *code >= 400 && *code < 500
        )
    }

    /// Returns true if the server refused the credentials themselves.
    #[must_use]
    pub const fn is_auth_rejection(&self) -> bool {
        matches!(self, Self::AuthRejected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_rejection_is_permanent() {
        let err = Error::AuthRejected {
            code: 535,
            message: "5.7.8 bad credentials".into(),
        };
        assert!(err.is_auth_rejection());
        assert!(err.is_permanent());
        assert!(!err.is_transient());
    }

    #[test]
    fn transient_reply() {
        let err = Error::smtp_error(421, "try later");
        assert!(err.is_transient());
        assert!(!err.is_auth_rejection());
    }
}
