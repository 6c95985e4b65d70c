//! Resolved network destination.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};

use crate::error::TransportError;
use crate::TransportResult;

/// A resolved address frames are sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Destination {
    addr: SocketAddr,
}

impl Destination {
    /// Wrap an already resolved address.
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Resolve `host:port`, preferring an IPv4 result.
    pub fn resolve(host: &str, port: u16) -> TransportResult<Self> {
        if host.is_empty() {
            return Err(TransportError::InvalidDestination("Missing host".to_string()));
        }

        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|e| TransportError::InvalidDestination(format!("{}:{}: {}", host, port, e)))?
            .collect();

        addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .map(|addr| Self::new(*addr))
            .ok_or_else(|| {
                TransportError::InvalidDestination(format!("{}:{}: no addresses", host, port))
            })
    }

    /// The destination address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wildcard local address in the same family, with an ephemeral port.
    pub fn local_wildcard(&self) -> SocketAddr {
        match self.addr {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        }
    }
}

impl From<SocketAddr> for Destination {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.addr.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_literal() {
        let dest = Destination::resolve("127.0.0.1", 5000).unwrap();
        assert_eq!(dest.addr(), "127.0.0.1:5000".parse::<SocketAddr>().unwrap());
        assert_eq!(dest.to_string(), "127.0.0.1:5000");
    }

    #[test]
    fn test_local_wildcard_matches_family() {
        let v4 = Destination::new("10.1.2.3:9".parse().unwrap());
        assert_eq!(v4.local_wildcard(), "0.0.0.0:0".parse::<SocketAddr>().unwrap());

        let v6 = Destination::new("[::1]:9".parse().unwrap());
        assert_eq!(v6.local_wildcard(), "[::]:0".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_resolve_rejects_empty_host() {
        assert!(matches!(
            Destination::resolve("", 5000),
            Err(TransportError::InvalidDestination(_))
        ));
    }
}
