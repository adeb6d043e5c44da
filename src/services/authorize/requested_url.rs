use std::fmt;

use serde::{Deserialize, Serialize};

/// The request the reverse proxy is asking about, as reported by `X-Forwarded-*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestedUrl {
    pub protocol: String,
    pub host: String,
    pub uri: String,
    pub method: String,
}

impl RequestedUrl {
    pub fn new(
        protocol: impl Into<String>,
        host: impl Into<String>,
        uri: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            host: host.into(),
            uri: uri.into(),
            method: method.into(),
        }
    }

    /// Case-insensitive prefix match on `protocol://host/uri`.
    pub fn starts_with(&self, prefix: &str) -> bool {
        let url = self.to_string();
        url.len() >= prefix.len()
            && url.is_char_boundary(prefix.len())
            && url[..prefix.len()].eq_ignore_ascii_case(prefix)
    }
}

impl fmt::Display for RequestedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let url = format!("{}://{}{}", self.protocol, self.host, self.uri);
        f.write_str(&url.to_lowercase())
    }
}

impl PartialEq for RequestedUrl {
    fn eq(&self, other: &Self) -> bool {
        self.protocol.eq_ignore_ascii_case(&other.protocol)
            && self.host.eq_ignore_ascii_case(&other.host)
            && self.uri.eq_ignore_ascii_case(&other.uri)
            && self.method.eq_ignore_ascii_case(&other.method)
    }
}

impl Eq for RequestedUrl {}
