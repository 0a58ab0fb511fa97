//! Inbound message and per-delivery routing metadata.

use mail_parser::MessageParser;
use serde::{Deserialize, Serialize};

/// An email message as seen by the chains.
///
/// Headers are an ordered multimap: names compare case-insensitively and
/// may repeat. Rules only read messages; headers are added between chain
/// steps by the dispatcher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    headers: Vec<(String, String)>,
    body: String,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style header append.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.add_header(name, value);
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    /// Parse a raw RFC 5322 message.
    ///
    /// Header values are unfolded and trimmed. Returns `None` when the input
    /// is not a message at all.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let parsed = MessageParser::default().parse(raw)?;

        let headers = parsed
            .headers()
            .iter()
            .map(|h| {
                let value = raw
                    .get(h.offset_start as usize..h.offset_end as usize)
                    .map(|bytes| unfold(&String::from_utf8_lossy(bytes)))
                    .unwrap_or_default();
                (h.name.as_str().to_string(), value)
            })
            .collect();

        let body = parsed
            .body_text(0)
            .map(|text| text.to_string())
            .unwrap_or_default();

        Some(Self { headers, body })
    }

    /// All values of a header, in message order.
    pub fn get_all<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a str> + use<'a, 'n> {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// First value of a header.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).next()
    }

    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    /// Remove every occurrence of a header.
    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// The sender address, from `From` with `Sender` as fallback.
    pub fn sender(&self) -> Option<String> {
        ["from", "sender"]
            .iter()
            .filter_map(|name| self.get(name))
            .find_map(extract_address)
    }
}

/// Routing metadata for a single delivery attempt. Never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageData {
    /// Destined for the list administrators.
    #[serde(default)]
    pub to_admin: bool,
    /// Destined for the list owners. Treated like `to_admin`.
    #[serde(default)]
    pub to_owner: bool,
    /// Destined for the request address.
    #[serde(default)]
    pub to_request: bool,
    /// Suppress automatic acknowledgements.
    #[serde(default)]
    pub noack: bool,
    /// Names of recording rules that matched, in walk order.
    #[serde(default)]
    pub rule_hits: Vec<String>,
    /// Names of recording rules that did not match, in walk order.
    #[serde(default)]
    pub rule_misses: Vec<String>,
}

impl MessageData {
    /// Routing flags from `LIST_TO_ADMIN`, `LIST_TO_OWNER`, `LIST_TO_REQUEST`
    /// and `LIST_NOACK`.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Routing flags read through `var`. A flag is set by `1`, `true` or
    /// `yes`, in any case.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| {
            var(key)
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false)
        };
        Self {
            to_admin: flag("LIST_TO_ADMIN"),
            to_owner: flag("LIST_TO_OWNER"),
            to_request: flag("LIST_TO_REQUEST"),
            noack: flag("LIST_NOACK"),
            ..Default::default()
        }
    }
}

/// Pull the bare address out of a `From`-style header value.
///
/// `"Anne Person" <anne@example.com>` → `anne@example.com`.
pub fn extract_address(value: &str) -> Option<String> {
    let candidate = match (value.rfind('<'), value.rfind('>')) {
        (Some(open), Some(close)) if open < close => &value[open + 1..close],
        _ => value,
    };
    let candidate = candidate.trim();
    if candidate.is_empty() || !candidate.contains('@') || candidate.contains(char::is_whitespace) {
        return None;
    }
    Some(candidate.to_string())
}

fn unfold(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
