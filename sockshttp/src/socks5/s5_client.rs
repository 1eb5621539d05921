use crate::interface::Resolve;
use crate::socks5::Socks5Tunnel;
use crate::util::{self, SystemResolver};
use crate::{Address, Error, ProxyAddress, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time;

#[derive(Clone)]
pub struct Socks5Client {
    proxy: ProxyAddress,
    resolver: Arc<dyn Resolve>,
    connect_timeout: Option<Duration>,
}

impl Socks5Client {
    ///
    ///
    ///
    pub fn new(proxy: ProxyAddress) -> Self {
        Socks5Client {
            proxy,
            resolver: Arc::new(SystemResolver),
            connect_timeout: None,
        }
    }

    pub fn with_resolver(
        mut self,
        resolver: Arc<dyn Resolve>,
    ) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_connect_timeout(
        mut self,
        timeout: Option<Duration>,
    ) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn proxy(&self) -> &ProxyAddress {
        &self.proxy
    }

    /// Opens a connection to the proxy and tunnels it to `destination`.
    ///
    /// [rfc1928] https://tools.ietf.org/html/rfc1928
    pub async fn connect(
        &self,
        destination: &Address,
    ) -> Result<(TcpStream, Address)> {
        let stream = self.open().await?;

        let mut tunnel = Socks5Tunnel::new(stream);
        tunnel.handshake(self.proxy.credentials.as_ref()).await?;
        let binding = tunnel.connect(destination).await?;

        Ok((tunnel.into_inner()?, binding))
    }

    /// Resolves the proxy host and opens the raw TCP connection to it.
    async fn open(&self) -> Result<TcpStream> {
        let proxy_addr = util::resolve_addr(&self.proxy.host, self.proxy.port, self.resolver.as_ref()).await?;
        debug!("Connecting to proxy {} at {}", self.proxy, proxy_addr);

        let connect = TcpStream::connect(proxy_addr);
        let stream = match self.connect_timeout {
            Some(timeout) => time::timeout(timeout, connect)
                .await
                .map_err(|_| Error::ProxyUnreachable(self.proxy.to_string()))??,
            None => connect.await?,
        };
        stream.set_nodelay(true)?;

        Ok(stream)
    }
}
