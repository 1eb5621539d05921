use async_trait::async_trait;
use std::io;
use std::net::IpAddr;
use url::Url;

/// Hostname lookup, used for the proxy itself and for targets that are
/// resolved on this side of the tunnel.
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve(
        &self,
        host: &str,
    ) -> io::Result<Vec<IpAddr>>;
}

/// Source of outgoing `Cookie` values and sink for `Set-Cookie` headers.
pub trait CookieStore: Send + Sync {
    /// Name/value pairs that apply to `url`, in sending order.
    fn cookies(
        &self,
        url: &Url,
    ) -> Vec<(String, String)>;

    /// Raw `Set-Cookie` header values received from `url`.
    fn set_cookies(
        &self,
        url: &Url,
        headers: &[String],
    );
}
