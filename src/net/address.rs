//! Destination address parsing.

use crate::net::error::DialError;

/// Split `"host:port"` into its parts.
///
/// IPv6 literals must be bracketed (`[::1]:443`); the brackets are stripped
/// from the returned host.
pub fn split_host_port(address: &str) -> Result<(&str, u16), DialError> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| DialError::invalid_address(address, "missing port"))?;

    let host = match host.strip_prefix('[') {
        Some(inner) => inner
            .strip_suffix(']')
            .ok_or_else(|| DialError::invalid_address(address, "unterminated '['"))?,
        None if host.contains(':') => {
            return Err(DialError::invalid_address(address, "IPv6 host must be bracketed"));
        }
        None => host,
    };

    if host.is_empty() {
        return Err(DialError::invalid_address(address, "missing host"));
    }

    let port = port
        .parse::<u16>()
        .map_err(|e| DialError::invalid_address(address, format!("invalid port: {}", e)))?;

    Ok((host, port))
}
