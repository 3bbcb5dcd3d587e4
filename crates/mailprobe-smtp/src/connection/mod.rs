//! SMTP connection management with type-state pattern.

mod client;
mod stream;

pub use client::{Authenticated, Client, Connected, SmtpConnection};
pub use stream::{SmtpStream, create_tls_connector};

use crate::types::{AuthMechanism, Extension};
use std::collections::HashSet;

/// Server capabilities from the greeting and EHLO response.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from greeting.
    pub hostname: String,
    /// Supported extensions.
    pub extensions: HashSet<Extension>,
}

impl ServerInfo {
    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Returns supported authentication mechanisms.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<AuthMechanism> {
        self.extensions
            .iter()
            .find_map(|ext| match ext {
                Extension::Auth(mechanisms) => Some(mechanisms.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Picks the mechanism used for password verification.
    ///
    /// PLAIN wins when advertised, LOGIN is the fallback. Servers that do not
    /// advertise AUTH at all get PLAIN.
    #[must_use]
    pub fn preferred_password_mechanism(&self) -> AuthMechanism {
        let mechanisms = self.auth_mechanisms();
        if mechanisms.is_empty() || mechanisms.contains(&AuthMechanism::Plain) {
            AuthMechanism::Plain
        } else if mechanisms.contains(&AuthMechanism::Login) {
            AuthMechanism::Login
        } else {
            AuthMechanism::Plain
        }
    }
}
