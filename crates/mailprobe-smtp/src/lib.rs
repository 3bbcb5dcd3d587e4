//! # mailprobe-smtp
//!
//! A small SMTP client that does exactly what account verification needs:
//! read the greeting, say EHLO, optionally upgrade with STARTTLS, authenticate,
//! and QUIT. It never opens a mail transaction.
//!
//! The client is generic over its transport, so the same code runs over a
//! plain TCP socket, a SOCKS tunnel, or an in-memory mock.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailprobe_smtp::{Client, SmtpStream, create_tls_connector};
//!
//! let tcp = tokio::net::TcpStream::connect(("smtp.example.com", 587)).await?;
//! let connector = create_tls_connector();
//!
//! let client = Client::from_stream(SmtpStream::plain(tcp)).await?;
//! let client = client.ehlo("probe.local").await?;
//! let client = client.starttls("smtp.example.com", &connector, "probe.local").await?;
//! let client = client.auth("user@example.com", "secret").await?;
//! client.quit().await?;
//! ```
//!
//! ## Connection States
//!
//! ```text
//! ┌──────────────┐
//! │  Connected   │ ─── auth() / auth_plain() / auth_login() ───→ Authenticated
//! └──────────────┘
//! ```
//!
//! Both states can `quit()`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use connection::{
    Authenticated, Client, Connected, ServerInfo, SmtpConnection, SmtpStream,
    create_tls_connector,
};
pub use error::{Error, Result};
pub use types::{AuthMechanism, EnhancedStatus, Extension, Reply, ReplyCode};
