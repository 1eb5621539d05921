use crate::addresses::parse_ip;
use crate::interface::Resolve;
use crate::{Error, Result};
use async_trait::async_trait;
use std::io;
use std::net::{IpAddr, SocketAddr};
use tokio::net;

/// Resolves through the operating system, see `tokio::net::lookup_host`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolve for SystemResolver {
    async fn resolve(
        &self,
        host: &str,
    ) -> io::Result<Vec<IpAddr>> {
        let addresses = net::lookup_host((host, 0)).await?;
        Ok(addresses.map(|a| a.ip()).collect())
    }
}

///
///
///
pub async fn resolve_addr(
    host: &str,
    port: u16,
    resolver: &dyn Resolve,
) -> Result<SocketAddr> {
    // First, try to parse address as an IP literal.
    if let Some(ip) = parse_ip(host) {
        return Ok(SocketAddr::new(ip, port));
    }

    // Otherwise, address is probably a domain name.
    let addresses = resolver.resolve(host).await.map_err(|e| {
        debug!("Lookup of {} failed: {}", host, e);
        Error::ProxyUnreachable(host.to_string())
    })?;

    match addresses[..] {
        [first, ..] => Ok(SocketAddr::new(first, port)),
        [] => Err(Error::ProxyUnreachable(host.to_string())),
    }
}
