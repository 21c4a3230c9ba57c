//! Network type identifiers accepted by the dialer.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::net::error::DialError;

/// A TCP-family transport identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkType {
    /// Any address family.
    Tcp,
    /// IPv4 only.
    Tcp4,
    /// IPv6 only.
    Tcp6,
}

impl NetworkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkType::Tcp => "tcp",
            NetworkType::Tcp4 => "tcp4",
            NetworkType::Tcp6 => "tcp6",
        }
    }

    /// Whether a resolved address belongs to this network's family.
    pub fn admits(&self, addr: &SocketAddr) -> bool {
        match self {
            NetworkType::Tcp => true,
            NetworkType::Tcp4 => addr.is_ipv4(),
            NetworkType::Tcp6 => addr.is_ipv6(),
        }
    }

    pub(crate) fn family(&self) -> &'static str {
        match self {
            NetworkType::Tcp => "IP",
            NetworkType::Tcp4 => "IPv4",
            NetworkType::Tcp6 => "IPv6",
        }
    }
}

impl FromStr for NetworkType {
    type Err = DialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(NetworkType::Tcp),
            "tcp4" => Ok(NetworkType::Tcp4),
            "tcp6" => Ok(NetworkType::Tcp6),
            other => Err(DialError::UnsupportedNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp_family() {
        assert_eq!("tcp".parse::<NetworkType>().unwrap(), NetworkType::Tcp);
        assert_eq!("tcp4".parse::<NetworkType>().unwrap(), NetworkType::Tcp4);
        assert_eq!("tcp6".parse::<NetworkType>().unwrap(), NetworkType::Tcp6);
    }

    #[test]
    fn test_rejects_other_networks() {
        for bogus in ["bogus", "udp", "unix", "", "TCP"] {
            let err = bogus.parse::<NetworkType>().unwrap_err();
            assert!(matches!(err, DialError::UnsupportedNetwork(ref n) if n == bogus));
        }
    }

    #[test]
    fn test_family_filter() {
        let v4: SocketAddr = "127.0.0.1:443".parse().unwrap();
        let v6: SocketAddr = "[::1]:443".parse().unwrap();
        assert!(NetworkType::Tcp.admits(&v4) && NetworkType::Tcp.admits(&v6));
        assert!(NetworkType::Tcp4.admits(&v4) && !NetworkType::Tcp4.admits(&v6));
        assert!(NetworkType::Tcp6.admits(&v6) && !NetworkType::Tcp6.admits(&v4));
    }
}
