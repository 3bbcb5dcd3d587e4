//! Type-state markers for IMAP client connection states.

/// Marker type for the not-authenticated state.
///
/// In this state, only capability negotiation and authentication are valid.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotAuthenticated;

/// Marker type for the authenticated state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Authenticated;
