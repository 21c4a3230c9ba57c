//! Proxy resolution hook and HTTP CONNECT tunnelling.
//!
//! # Data Flow
//! ```text
//! DialRequest → ProxyResolver
//!     → Ok(None): dial host:port directly
//!     → Ok(Some(url)): TCP to proxy → CONNECT host:port → 2xx → TLS over tunnel
//!     → Err(e): dial fails, nothing opened
//! ```

use std::env;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use url::Url;

use crate::net::error::{BoxError, ProxyError};
use crate::net::network::NetworkType;

/// Largest proxy response head accepted before the tunnel is established.
pub const MAX_RESPONSE_HEAD: usize = 8 * 1024;

/// Outbound request descriptor handed to a [`ProxyResolver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialRequest {
    pub network: NetworkType,
    pub host: String,
    pub port: u16,
}

impl DialRequest {
    /// `host:port` with IPv6 literals bracketed.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Maps an outbound request to the proxy that should carry it.
///
/// `Ok(None)` selects a direct connection.
pub type ProxyResolver =
    Arc<dyn Fn(&DialRequest) -> Result<Option<Url>, BoxError> + Send + Sync>;

/// Route every request through `proxy`.
pub fn fixed(proxy: Url) -> ProxyResolver {
    Arc::new(move |_req: &DialRequest| -> Result<Option<Url>, BoxError> {
        Ok(Some(proxy.clone()))
    })
}

/// Resolve proxies from `HTTPS_PROXY` and `NO_PROXY` (or their lowercase forms).
///
/// The environment is read once, when the resolver is built.
pub fn from_env() -> Result<ProxyResolver, BoxError> {
    let proxy = match env_var("HTTPS_PROXY") {
        Some(raw) if !raw.is_empty() => Some(Url::parse(&raw)?),
        _ => None,
    };
    let rules = NoProxy::parse(&env_var("NO_PROXY").unwrap_or_default());

    Ok(Arc::new(move |req: &DialRequest| -> Result<Option<Url>, BoxError> {
        match &proxy {
            Some(url) if !rules.matches(&req.host) => Ok(Some(url.clone())),
            _ => Ok(None),
        }
    }))
}

fn env_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .or_else(|| env::var(name.to_ascii_lowercase()).ok())
}

/// Hosts that bypass the proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoProxy {
    all: bool,
    entries: Vec<String>,
}

impl NoProxy {
    /// Parse a comma separated `NO_PROXY` value.
    pub fn parse(raw: &str) -> Self {
        let mut rules = NoProxy::default();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            if entry == "*" {
                rules.all = true;
            } else {
                rules
                    .entries
                    .push(entry.trim_start_matches('.').to_ascii_lowercase());
            }
        }
        rules
    }

    /// True when `host` equals an entry or is a subdomain of one.
    pub fn matches(&self, host: &str) -> bool {
        if self.all {
            return true;
        }
        let host = host.to_ascii_lowercase();
        self.entries.iter().any(|entry| {
            host == *entry
                || (host.len() > entry.len()
                    && host.ends_with(entry.as_str())
                    && host.as_bytes()[host.len() - entry.len() - 1] == b'.')
        })
    }
}

/// Proxy `host:port` derived from its URL.
pub(crate) fn proxy_authority(proxy: &Url) -> Result<String, ProxyError> {
    if proxy.scheme() != "http" {
        return Err(ProxyError::UnsupportedScheme(proxy.scheme().to_string()));
    }
    let host = proxy
        .host_str()
        .ok_or_else(|| ProxyError::MissingHost(proxy.to_string()))?;
    let port = proxy.port_or_known_default().unwrap_or(80);
    Ok(format!("{}:{}", host, port))
}

/// Ask the proxy on `stream` to open a tunnel to `target` (`host:port`).
pub(crate) async fn establish_tunnel(stream: &mut TcpStream, target: &str) -> Result<(), ProxyError> {
    let request = format!(
        "CONNECT {target} HTTP/1.1\r\nHost: {target}\r\nProxy-Connection: Keep-Alive\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await?;

    let head = read_response_head(stream).await?;
    let status = parse_status(&head)?;

    if !(200..300).contains(&status) {
        let line = head.lines().next().unwrap_or_default().to_string();
        return Err(ProxyError::Refused(line));
    }

    tracing::debug!(destination = %target, status, "Proxy tunnel established");
    Ok(())
}

/// Read up to and including the blank line ending the response head.
///
/// Reads byte by byte so no tunnelled bytes are consumed.
async fn read_response_head(stream: &mut TcpStream) -> Result<String, ProxyError> {
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];

    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_RESPONSE_HEAD {
            return Err(ProxyError::ResponseTooLarge(MAX_RESPONSE_HEAD));
        }
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(ProxyError::MalformedResponse(
                String::from_utf8_lossy(&head).into_owned(),
            ));
        }
        head.push(byte[0]);
    }

    Ok(String::from_utf8_lossy(&head).into_owned())
}

fn parse_status(head: &str) -> Result<u16, ProxyError> {
    let line = head.lines().next().unwrap_or_default();
    let mut parts = line.split_whitespace();

    match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/1.") => code
            .parse::<u16>()
            .map_err(|_| ProxyError::MalformedResponse(line.to_string())),
        _ => Err(ProxyError::MalformedResponse(line.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(host: &str) -> DialRequest {
        DialRequest {
            network: NetworkType::Tcp,
            host: host.to_string(),
            port: 443,
        }
    }

    #[test]
    fn test_authority_brackets_ipv6() {
        assert_eq!(request("example.org").authority(), "example.org:443");
        assert_eq!(request("::1").authority(), "[::1]:443");
    }

    #[test]
    fn test_fixed_resolver() {
        let url = Url::parse("http://proxy.internal:3128").unwrap();
        let resolver = fixed(url.clone());
        assert_eq!(resolver(&request("example.org")).unwrap(), Some(url));
    }

    #[test]
    fn test_no_proxy_matching() {
        let rules = NoProxy::parse("localhost, .internal.example.com,10.0.0.1");
        assert!(rules.matches("localhost"));
        assert!(rules.matches("internal.example.com"));
        assert!(rules.matches("api.internal.example.com"));
        assert!(rules.matches("10.0.0.1"));
        assert!(!rules.matches("notinternal.example.com"));
        assert!(!rules.matches("example.com"));

        assert!(NoProxy::parse("*").matches("anything.example"));
        assert!(!NoProxy::parse("").matches("example.com"));
    }

    #[test]
    fn test_proxy_authority() {
        let url = Url::parse("http://proxy.internal:3128").unwrap();
        assert_eq!(proxy_authority(&url).unwrap(), "proxy.internal:3128");

        let url = Url::parse("http://proxy.internal").unwrap();
        assert_eq!(proxy_authority(&url).unwrap(), "proxy.internal:80");

        let url = Url::parse("socks5://proxy.internal:1080").unwrap();
        assert!(matches!(proxy_authority(&url), Err(ProxyError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("HTTP/1.1 200 Connection established\r\n\r\n").unwrap(), 200);
        assert_eq!(parse_status("HTTP/1.0 407 Proxy Authentication Required\r\n\r\n").unwrap(), 407);
        assert!(parse_status("SSH-2.0-OpenSSH\r\n\r\n").is_err());
    }
}
