//! Integration tests for the IMAP client.
//!
//! A scripted mock stream stands in for the server.

use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use mailprobe_imap::{Capability, Client, Error, ImapStream};

/// Mock stream that returns predefined responses and records what was sent.
struct MockStream {
    responses: Cursor<Vec<u8>>,
    sent: Arc<Mutex<Vec<u8>>>,
}

impl MockStream {
    fn new(responses: &[u8]) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let stream = Self {
            responses: Cursor::new(responses.to_vec()),
            sent: Arc::clone(&sent),
        };
        (stream, sent)
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let data = self.responses.get_ref();
        let pos = usize::try_from(self.responses.position()).unwrap();

        if pos >= data.len() {
            return Poll::Ready(Ok(()));
        }

        let remaining = &data[pos..];
        let to_read = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..to_read]);
        self.responses.set_position((pos + to_read) as u64);

        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.sent.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn sent_text(sent: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8(sent.lock().unwrap().clone()).unwrap()
}

#[tokio::test]
async fn login_and_logout() {
    let (mock, sent) = MockStream::new(
        b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] ready\r\n\
          A0000 OK [CAPABILITY IMAP4rev1 IDLE] Logged in\r\n\
          * BYE see you\r\n\
          A0001 OK LOGOUT completed\r\n",
    );

    let client = Client::from_stream(ImapStream::plain(mock)).await.unwrap();
    assert!(client.supports_auth_plain());
    assert!(!client.is_tls());

    let client = client.login("user@example.com", "secret").await.unwrap();
    assert!(client.has_capability(&Capability::Unknown("IDLE".into())));
    client.logout().await.unwrap();

    assert_eq!(
        sent_text(&sent),
        "A0000 LOGIN user@example.com secret\r\nA0001 LOGOUT\r\n"
    );
}

#[tokio::test]
async fn wrong_password_is_auth_failure() {
    let (mock, _) = MockStream::new(
        b"* OK [CAPABILITY IMAP4rev1] ready\r\n\
          A0000 NO [AUTHENTICATIONFAILED] Invalid credentials (Failure)\r\n",
    );

    let client = Client::from_stream(ImapStream::plain(mock)).await.unwrap();
    let err = client.login("user", "wrong").await.unwrap_err();
    assert!(err.is_auth_rejection(), "got {err:?}");
}

#[tokio::test]
async fn plain_no_without_code_is_auth_failure() {
    let (mock, _) = MockStream::new(
        b"* OK [CAPABILITY IMAP4rev1] ready\r\n\
          A0000 NO LOGIN failed.\r\n",
    );

    let client = Client::from_stream(ImapStream::plain(mock)).await.unwrap();
    assert!(matches!(
        client.login("user", "wrong").await,
        Err(Error::Auth(_))
    ));
}

#[tokio::test]
async fn unavailable_is_not_auth_failure() {
    let (mock, _) = MockStream::new(
        b"* OK [CAPABILITY IMAP4rev1] ready\r\n\
          A0000 NO [UNAVAILABLE] Backend down\r\n",
    );

    let client = Client::from_stream(ImapStream::plain(mock)).await.unwrap();
    assert!(matches!(
        client.login("user", "pass").await,
        Err(Error::No(_))
    ));
}

#[tokio::test]
async fn capability_queried_when_greeting_has_none() {
    let (mock, sent) = MockStream::new(
        b"* OK Dovecot ready.\r\n\
          * CAPABILITY IMAP4rev1 STARTTLS\r\n\
          A0000 OK Capability completed.\r\n\
          A0001 OK Logged in\r\n",
    );

    let client = Client::from_stream(ImapStream::plain(mock)).await.unwrap();
    assert!(client.capabilities().is_empty());
    client.login("user", "pass word").await.unwrap();

    assert_eq!(
        sent_text(&sent),
        "A0000 CAPABILITY\r\nA0001 LOGIN user \"pass word\"\r\n"
    );
}

#[tokio::test]
async fn login_disabled_uses_sasl_plain_ir() {
    let (mock, sent) = MockStream::new(
        b"* OK [CAPABILITY IMAP4rev1 LOGINDISABLED AUTH=PLAIN SASL-IR] ready\r\n\
          A0000 OK Authenticated\r\n",
    );

    let client = Client::from_stream(ImapStream::plain(mock)).await.unwrap();
    client.login("user", "pass").await.unwrap();

    assert_eq!(
        sent_text(&sent),
        "A0000 AUTHENTICATE PLAIN AHVzZXIAcGFzcw==\r\n"
    );
}

#[tokio::test]
async fn sasl_plain_with_continuation() {
    let (mock, sent) = MockStream::new(
        b"* OK [CAPABILITY IMAP4rev1 LOGINDISABLED AUTH=PLAIN] ready\r\n\
          + \r\n\
          A0000 NO [AUTHENTICATIONFAILED] nope\r\n",
    );

    let client = Client::from_stream(ImapStream::plain(mock)).await.unwrap();
    let err = client.login("user", "pass").await.unwrap_err();
    assert!(err.is_auth_rejection());

    assert_eq!(
        sent_text(&sent),
        "A0000 AUTHENTICATE PLAIN\r\nAHVzZXIAcGFzcw==\r\n"
    );
}

#[tokio::test]
async fn login_disabled_without_plain() {
    let (mock, _) = MockStream::new(b"* OK [CAPABILITY IMAP4rev1 LOGINDISABLED] ready\r\n");

    let client = Client::from_stream(ImapStream::plain(mock)).await.unwrap();
    assert!(matches!(
        client.login("user", "pass").await,
        Err(Error::NotSupported(_))
    ));
}

#[tokio::test]
async fn starttls_requires_capability() {
    let (mock, _) = MockStream::new(b"* OK [CAPABILITY IMAP4rev1] ready\r\n");

    let client = Client::from_stream(ImapStream::plain(mock)).await.unwrap();
    let connector = mailprobe_imap::create_tls_connector();
    assert!(matches!(
        client.starttls("imap.example.com", &connector).await,
        Err(Error::NotSupported(_))
    ));
}

#[tokio::test]
async fn bye_greeting() {
    let (mock, _) = MockStream::new(b"* BYE Too many connections\r\n");
    assert!(matches!(
        Client::from_stream(ImapStream::plain(mock)).await,
        Err(Error::Bye(_))
    ));
}

#[tokio::test]
async fn non_imap_greeting() {
    let (mock, _) = MockStream::new(b"220 smtp.example.com ESMTP\r\n");
    assert!(Client::from_stream(ImapStream::plain(mock)).await.is_err());
}
