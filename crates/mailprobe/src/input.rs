//! Input list loading.

use mailprobe_core::{Credential, Protocol, ProxyEndpoint, Subject};

/// Parsed input list.
#[derive(Debug)]
pub struct Loaded<T> {
    /// Entries that parsed.
    pub items: Vec<T>,
    /// Line numbers (1-based) that did not.
    pub rejected: Vec<usize>,
}

impl<T> Loaded<T> {
    const fn new() -> Self {
        Self {
            items: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

fn lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

/// Parses the subjects of a batch. SOCKS batches read proxies, the others
/// read `email:password` lines.
#[must_use]
pub fn parse_subjects(content: &str, protocol: Protocol) -> Loaded<Subject> {
    let mut loaded = Loaded::new();
    for (number, line) in lines(content) {
        let subject = match protocol {
            Protocol::Socks => line.parse::<ProxyEndpoint>().map(Subject::Proxy),
            kind => Credential::parse_line(kind, line).map(Subject::Account),
        };
        match subject {
            Ok(subject) => loaded.items.push(subject),
            Err(e) => {
                tracing::debug!(line = number, %e, "skipping input line");
                loaded.rejected.push(number);
            }
        }
    }
    loaded
}

/// Parses a proxy list.
#[must_use]
pub fn parse_proxies(content: &str) -> Loaded<ProxyEndpoint> {
    let mut loaded = Loaded::new();
    for (number, line) in lines(content) {
        match line.parse() {
            Ok(proxy) => loaded.items.push(proxy),
            Err(e) => {
                tracing::debug!(line = number, %e, "skipping proxy line");
                loaded.rejected.push(number);
            }
        }
    }
    loaded
}
