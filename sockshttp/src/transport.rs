use crate::http::{self, Request, Response};
use crate::interface::{CookieStore, Resolve};
use crate::socks5::Socks5Client;
use crate::tls::{Connection, TlsConnector};
use crate::util::SystemResolver;
use crate::{Address, Error, ProxyAddress, Result};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Duration;
use tokio_rustls::rustls::ClientConfig;
use tokio_util::sync::CancellationToken;

/// Sends HTTP/1.1 requests, one fresh SOCKS5 tunnel per request.
///
/// A transport holds configuration only and can be shared between tasks.
#[derive(Clone)]
pub struct Socks5Transport {
    client: Socks5Client,
    resolver: Arc<dyn Resolve>,
    resolve_dns_locally: bool,
    cookie_store: Option<Arc<dyn CookieStore>>,
    tls_config: Option<Arc<ClientConfig>>,
    tls: Arc<OnceCell<TlsConnector>>,
}

impl Socks5Transport {
    ///
    ///
    ///
    pub fn new(proxy: ProxyAddress) -> Self {
        let resolver: Arc<dyn Resolve> = Arc::new(SystemResolver);

        Socks5Transport {
            client: Socks5Client::new(proxy).with_resolver(Arc::clone(&resolver)),
            resolver,
            resolve_dns_locally: true,
            cookie_store: None,
            tls_config: None,
            tls: Arc::new(OnceCell::new()),
        }
    }

    /// Resolve target hostnames here and send the proxy an IP address
    /// (the default), or leave resolution to the proxy.
    pub fn resolve_dns_locally(
        mut self,
        resolve_dns_locally: bool,
    ) -> Self {
        self.resolve_dns_locally = resolve_dns_locally;
        self
    }

    /// Used for the proxy host and, when resolving locally, for targets.
    pub fn resolver(
        mut self,
        resolver: Arc<dyn Resolve>,
    ) -> Self {
        self.client = self.client.with_resolver(Arc::clone(&resolver));
        self.resolver = resolver;
        self
    }

    pub fn cookie_store(
        mut self,
        cookie_store: Arc<dyn CookieStore>,
    ) -> Self {
        self.cookie_store = Some(cookie_store);
        self
    }

    /// Replaces the default client config (webpki roots, no client auth).
    pub fn tls_config(
        mut self,
        config: Arc<ClientConfig>,
    ) -> Self {
        self.tls_config = Some(config);
        self.tls = Arc::new(OnceCell::new());
        self
    }

    /// Bounds opening the TCP connection to the proxy.
    pub fn connect_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.client = self.client.with_connect_timeout(Some(timeout));
        self
    }

    pub fn proxy(&self) -> &ProxyAddress {
        self.client.proxy()
    }

    /// Tunnels to the request's host, writes the request, and parses the
    /// response head. The body stream in the response owns the connection.
    pub async fn send(
        &self,
        request: Request,
    ) -> Result<Response> {
        let url = request.url().clone();

        let https = match url.scheme() {
            "http" => false,
            "https" => true,
            scheme => return Err(Error::InvalidRequest(format!("unsupported scheme: {}", scheme))),
        };
        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidRequest(format!("missing host: {}", url)))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::InvalidRequest(format!("missing port: {}", url)))?;

        let destination = Address::resolve(host, port, self.resolve_dns_locally, self.resolver.as_ref()).await?;
        let (stream, binding) = self.client.connect(&destination).await?;
        debug!("Tunneled to {} through {} (bound at {})", destination, self.proxy(), binding);

        let mut connection = if https {
            let stream = self.tls_connector()?.connect(host, stream).await?;
            Connection::Tls(Box::new(stream))
        } else {
            Connection::Plain(stream)
        };

        let cookies = self.cookie_store.as_deref();
        http::write_request(&mut connection, request, cookies).await?;

        http::read_response(connection, &url, cookies).await
    }

    /// Like `send`, but gives up as soon as `token` is cancelled. Whatever
    /// was acquired by then is dropped.
    pub async fn send_with_cancellation(
        &self,
        request: Request,
        token: &CancellationToken,
    ) -> Result<Response> {
        tokio::select! {
            biased;

            _ = token.cancelled() => {
                debug!("Request was cancelled");
                Err(Error::Cancelled)
            }
            result = self.send(request) => result,
        }
    }

    fn tls_connector(&self) -> Result<&TlsConnector> {
        self.tls.get_or_try_init(|| match &self.tls_config {
            Some(config) => Ok(TlsConnector::with_config(Arc::clone(config))),
            None => TlsConnector::new(),
        })
    }
}
