use crate::socks5::Socks5Reply;
use num_traits::FromPrimitive;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Unexpected bytes during a SOCKS exchange. The connection must be discarded.
    #[error("SOCKS protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("malformed HTTP response: {0}")]
    MalformedResponse(String),

    #[error("proxy demands authentication, but no credentials are provided")]
    AuthenticationRequired,

    #[error("proxy rejected the provided credentials")]
    AuthenticationRejected,

    /// The proxy answered CONNECT with a non-zero reply code.
    #[error("proxy replied with error code {code} ({})", describe_reply(.code))]
    SocksServer { code: u8 },

    #[error("unable to resolve host '{0}'")]
    HostResolutionFailed(String),

    #[error("proxy '{0}' is unreachable")]
    ProxyUnreachable(String),

    #[error("unsupported HTTP version: {0:?}")]
    UnsupportedVersion(http::Version),

    #[error("not supported: {0}")]
    UnsupportedFeature(String),

    #[error("unknown content encoding '{0}'")]
    UnsupportedEncoding(String),

    #[error("{field} is {length} bytes long, the maximum is 255")]
    ValueTooLong { field: &'static str, length: usize },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid proxy address: {0}")]
    InvalidProxyUri(String),

    #[error("TLS handshake failed: {0}")]
    Tls(#[source] io::Error),

    #[error("request was cancelled")]
    Cancelled,
}

impl Error {
    /// The named reply for a `SocksServer` error, if the code is assigned.
    pub fn reply(&self) -> Option<Socks5Reply> {
        match self {
            Error::SocksServer { code } => Socks5Reply::from_u8(*code),
            _ => None,
        }
    }
}

fn describe_reply(code: &u8) -> String {
    match Socks5Reply::from_u8(*code) {
        Some(reply) => format!("{:?}", reply),
        None => String::from("unassigned"),
    }
}
