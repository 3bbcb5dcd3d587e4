//! IMAP commands used while verifying a login.

mod tag_generator;

pub use tag_generator::TagGenerator;

/// IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPABILITY
    Capability,
    /// STARTTLS
    StartTls,
    /// LOGIN with username and password.
    Login {
        /// Username
        username: String,
        /// Password
        password: String,
    },
    /// AUTHENTICATE with a SASL mechanism.
    Authenticate {
        /// Mechanism name (e.g., "PLAIN").
        mechanism: String,
        /// Initial response for SASL-IR, already base64 encoded.
        initial_response: Option<String>,
    },
    /// NOOP
    Noop,
    /// LOGOUT
    Logout,
}

impl Command {
    /// Serializes the command with the given tag to a CRLF-terminated line.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(tag.as_bytes());
        buf.push(b' ');

        match self {
            Self::Capability => buf.extend_from_slice(b"CAPABILITY"),
            Self::StartTls => buf.extend_from_slice(b"STARTTLS"),
            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username);
                buf.push(b' ');
                write_astring(&mut buf, password);
            }
            Self::Authenticate {
                mechanism,
                initial_response,
            } => {
                buf.extend_from_slice(b"AUTHENTICATE ");
                buf.extend_from_slice(mechanism.as_bytes());
                if let Some(resp) = initial_response {
                    buf.push(b' ');
                    buf.extend_from_slice(resp.as_bytes());
                }
            }
            Self::Noop => buf.extend_from_slice(b"NOOP"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Returns true if serializing this command would expose a secret in logs.
    #[must_use]
    pub const fn is_sensitive(&self) -> bool {
        matches!(self, Self::Login { .. } | Self::Authenticate { .. })
    }
}

/// Writes an astring (atom or quoted string).
///
/// Passwords regularly contain spaces, quotes and backslashes, so anything
/// outside the atom charset is quoted and escaped.
fn write_astring(buf: &mut Vec<u8>, s: &str) {
    if s.is_empty() || s.bytes().any(needs_quoting) {
        buf.push(b'"');
        for b in s.bytes() {
            if b == b'"' || b == b'\\' {
                buf.push(b'\\');
            }
            buf.push(b);
        }
        buf.push(b'"');
    } else {
        buf.extend_from_slice(s.as_bytes());
    }
}

const fn needs_quoting(b: u8) -> bool {
    matches!(b, b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*' | b']') || b < 0x20 || b == 0x7F
}
