//! Async name resolution
//!
//! Thin wrapper over the runtime's resolver; the proxy core only needs
//! resolve-by-name returning candidate endpoints.

use std::net::SocketAddr;

use tokio::net::lookup_host;

use crate::error::ConnectionError;
use pm_protocol::Address;

/// Resolve a host/port pair to candidate endpoints
pub async fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, ConnectionError> {
    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|e| ConnectionError::Resolve {
            host: host.to_string(),
            source: e,
        })?
        .collect();

    if addrs.is_empty() {
        return Err(ConnectionError::NoEndpoints(host.to_string()));
    }
    Ok(addrs)
}

/// Resolve a session target to one endpoint. IP literals pass through
/// without a resolver round trip.
pub async fn resolve_target(target: &Address) -> Result<SocketAddr, ConnectionError> {
    if let Some(addr) = target.socket_addr() {
        return Ok(addr);
    }
    match target {
        Address::Domain(domain, port) => {
            let addrs = resolve(domain, *port).await?;
            Ok(addrs[0])
        }
        // socket_addr() covered the literal cases
        _ => unreachable!("IP targets resolve without lookup"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[tokio::test]
    async fn test_resolve_localhost() {
        let addrs = resolve("localhost", 80).await.unwrap();
        assert!(!addrs.is_empty());
        assert!(addrs.iter().all(|a| a.port() == 80));
    }

    #[tokio::test]
    async fn test_resolve_target_ip_literal() {
        let target = Address::Ipv4(Ipv4Addr::new(192, 0, 2, 1), 9000);
        let addr = resolve_target(&target).await.unwrap();
        assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)));
        assert_eq!(addr.port(), 9000);
    }
}
