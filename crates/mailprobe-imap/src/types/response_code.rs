//! Response codes.

use super::Capability;

/// Bracketed response code carried by a status response.
///
/// Besides CAPABILITY, only the RFC 5530 codes that tell a refused password
/// apart from a server-side problem are modelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// ALERT: Human-readable message that MUST be shown to user.
    Alert,
    /// CAPABILITY response.
    Capability(Vec<Capability>),
    /// AUTHENTICATIONFAILED: credentials were wrong.
    AuthenticationFailed,
    /// AUTHORIZATIONFAILED: credentials fine, access denied.
    AuthorizationFailed,
    /// EXPIRED: credentials have expired.
    Expired,
    /// PRIVACYREQUIRED: operation needs an encrypted session.
    PrivacyRequired,
    /// CONTACTADMIN: account needs administrator attention.
    ContactAdmin,
    /// UNAVAILABLE: temporary server-side failure.
    Unavailable,
    /// SERVERBUG: the server hit an internal error.
    ServerBug,
    /// Unknown response code.
    Unknown(String),
}

impl ResponseCode {
    /// Parses the text between the brackets.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let (name, rest) = s.split_once(' ').unwrap_or((s, ""));
        match name.to_ascii_uppercase().as_str() {
            "ALERT" => Self::Alert,
            "CAPABILITY" => Self::Capability(Capability::parse_list(rest)),
            "AUTHENTICATIONFAILED" => Self::AuthenticationFailed,
            "AUTHORIZATIONFAILED" => Self::AuthorizationFailed,
            "EXPIRED" => Self::Expired,
            "PRIVACYREQUIRED" => Self::PrivacyRequired,
            "CONTACTADMIN" => Self::ContactAdmin,
            "UNAVAILABLE" => Self::Unavailable,
            "SERVERBUG" => Self::ServerBug,
            _ => Self::Unknown(s.to_string()),
        }
    }

    /// Returns true if the code points at the server rather than the credentials.
    #[must_use]
    pub const fn is_server_side(&self) -> bool {
        matches!(
            self,
            Self::Unavailable | Self::ServerBug | Self::PrivacyRequired
        )
    }
}
