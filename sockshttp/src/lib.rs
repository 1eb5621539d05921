#[macro_use]
extern crate log;
#[macro_use]
extern crate num_derive;

mod common;
mod error;

pub mod cookies;
pub mod http;
pub mod socks5;
pub mod stream;
pub mod tls;
pub mod transport;

pub use common::{addresses, constants, credentials, interface, util};

pub use addresses::{Address, ProxyAddress};
pub use cookies::CookieJar;
pub use credentials::Credentials;
pub use error::{Error, Result};
pub use self::http::{Request, RequestBody, Response};
pub use socks5::{Socks5Client, Socks5Tunnel};
pub use transport::Socks5Transport;

pub use tokio_rustls::rustls;
pub use tokio_util::sync::CancellationToken;
