// Proxy string parsing: `[scheme://]host[:port]`.

use crate::error::{DriveError, DriveResult};
use std::fmt;

const DEFAULT_PORT: u16 = 1080;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyScheme {
    Http,
    Https,
    Socks4,
    Socks5,
}

impl ProxyScheme {
    fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "https" => ProxyScheme::Https,
            "socks4" => ProxyScheme::Socks4,
            "socks" | "socks5" => ProxyScheme::Socks5,
            // unknown schemes fall back to plain http
            _ => ProxyScheme::Http,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyScheme::Http => "http",
            ProxyScheme::Https => "https",
            ProxyScheme::Socks4 => "socks4",
            ProxyScheme::Socks5 => "socks5",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub scheme: ProxyScheme,
    pub host: String,
    pub port: u16,
}

impl ProxyConfig {
    /// Parse a proxy setting. `None` means a direct connection: the input
    /// was empty or the literal `off`.
    pub fn parse(raw: &str) -> DriveResult<Option<Self>> {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("off") {
            return Ok(None);
        }

        let (scheme, rest) = match raw.split_once("://") {
            Some((label, rest)) => (ProxyScheme::from_label(label), rest),
            None => (ProxyScheme::Http, raw),
        };

        let (host, port) = match rest.split_once(':') {
            Some((host, port)) => {
                let port = port
                    .trim_end_matches('/')
                    .parse::<u16>()
                    .map_err(|_| DriveError::Config(format!("invalid proxy port in {raw:?}")))?;
                (host, port)
            }
            None => (rest.trim_end_matches('/'), DEFAULT_PORT),
        };

        if host.is_empty() {
            return Err(DriveError::Config(format!("missing proxy host in {raw:?}")));
        }

        Ok(Some(ProxyConfig {
            scheme,
            host: host.to_string(),
            port,
        }))
    }

    /// Proxy URL in the form reqwest expects. Both http flavours tunnel
    /// through a plain http proxy.
    pub fn url(&self) -> String {
        let scheme = match self.scheme {
            ProxyScheme::Http | ProxyScheme::Https => "http",
            other => other.as_str(),
        };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// The HTTP client speaks http and socks5 proxies only; socks4 is
    /// parsed so the setting can be reported, then refused here.
    pub fn to_reqwest(&self) -> DriveResult<reqwest::Proxy> {
        if self.scheme == ProxyScheme::Socks4 {
            return Err(DriveError::Config(format!(
                "socks4 proxies are not supported ({self}), use socks5 or http"
            )));
        }
        reqwest::Proxy::all(self.url())
            .map_err(|e| DriveError::Config(format!("unsupported proxy {self}: {e}")))
    }
}

impl fmt::Display for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}
