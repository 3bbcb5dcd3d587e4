//! # mailprobe-imap
//!
//! A small IMAP client covering the part of RFC 9051 / RFC 3501 needed to
//! prove that a set of credentials opens a mailbox: read the greeting,
//! query capabilities, upgrade with STARTTLS, LOGIN (or AUTHENTICATE PLAIN
//! when LOGIN is disabled) and LOGOUT.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailprobe_imap::{Client, ImapStream, create_tls_connector};
//!
//! let tcp = tokio::net::TcpStream::connect(("imap.example.com", 993)).await?;
//! let connector = create_tls_connector();
//! let stream = ImapStream::connect_tls(tcp, "imap.example.com", &connector).await?;
//!
//! let client = Client::from_stream(stream).await?;
//! let client = client.login("user@example.com", "secret").await?;
//! client.logout().await?;
//! ```
//!
//! ## Connection States
//!
//! ```text
//! ┌─────────────────────┐
//! │   NotAuthenticated  │ ─── login() / authenticate_plain() ───→ Authenticated
//! └─────────────────────┘
//! ```
//!
//! Both states can `logout()`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use command::{Command, TagGenerator};
pub use connection::{
    Authenticated, Client, FramedStream, ImapStream, NotAuthenticated, ResponseAccumulator,
    create_tls_connector,
};
pub use error::{Error, Result};
pub use parser::{Response, ResponseParser, UntaggedResponse};
pub use types::{Capability, ResponseCode, Status};
