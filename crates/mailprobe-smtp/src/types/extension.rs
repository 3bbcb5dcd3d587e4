//! EHLO keywords the verifier cares about.

/// SMTP extension advertised in an EHLO reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Extension {
    /// STARTTLS - TLS upgrade
    StartTls,
    /// AUTH - advertised SASL mechanisms
    Auth(Vec<AuthMechanism>),
    /// PIPELINING
    Pipelining,
    /// SIZE - maximum message size
    Size(Option<usize>),
    /// Anything else, kept verbatim.
    Other(String),
}

impl Extension {
    /// Parses an extension line from an EHLO reply.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let Some(keyword) = words.next() else {
            return Self::Other(line.to_string());
        };

        match keyword.to_ascii_uppercase().as_str() {
            "STARTTLS" => Self::StartTls,
            "PIPELINING" => Self::Pipelining,
            "SIZE" => Self::Size(words.next().and_then(|s| s.parse().ok())),
            "AUTH" => Self::Auth(words.filter_map(AuthMechanism::parse).collect()),
            // Pre-RFC servers advertise "AUTH=LOGIN PLAIN"
            kw if kw.starts_with("AUTH=") => {
                let mechanisms = std::iter::once(&keyword[5..])
                    .chain(words)
                    .filter_map(AuthMechanism::parse)
                    .collect();
                Self::Auth(mechanisms)
            }
            _ => Self::Other(line.to_string()),
        }
    }
}

/// SASL authentication mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// PLAIN
    Plain,
    /// LOGIN (legacy)
    Login,
    /// CRAM-MD5
    CramMd5,
    /// `XOAUTH2`
    XOAuth2,
}

impl AuthMechanism {
    /// Parses a mechanism name, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "LOGIN" => Some(Self::Login),
            "CRAM-MD5" => Some(Self::CramMd5),
            "XOAUTH2" => Some(Self::XOAuth2),
            _ => None,
        }
    }

    /// Returns the mechanism name as sent on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
            Self::CramMd5 => "CRAM-MD5",
            Self::XOAuth2 => "XOAUTH2",
        }
    }
}
