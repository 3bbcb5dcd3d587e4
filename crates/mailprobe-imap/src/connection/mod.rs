//! IMAP connection management.
//!
//! - TLS/plaintext stream abstraction over any transport
//! - Framed I/O for the IMAP protocol
//! - Type-state client

mod client;
mod framed;
mod stream;

pub use client::{Authenticated, Client, NotAuthenticated};
pub use framed::{FramedStream, ResponseAccumulator};
pub use stream::{ImapStream, create_tls_connector};
