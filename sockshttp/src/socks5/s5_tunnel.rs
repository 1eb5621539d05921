use crate::socks5::{self, AuthMethod, Socks5Request};
use crate::{constants::*, Address, Credentials, Error, Result};
use num_traits::FromPrimitive;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Progress of a tunnel through the SOCKS5 exchange.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TunnelState {
    Idle,
    HandshakeSent,
    MethodChosen(AuthMethod),
    AuthSent,
    HandshakeComplete,
    ConnectSent,
    Tunneled,
    Failed,
}

/// Client side of RFC 1928 over a stream it owns exclusively.
///
/// `handshake` must run before `connect`, each exactly once. Any failure
/// leaves the tunnel `Failed`; the stream is then in an unknown state and
/// should be dropped rather than reused.
///
/// [rfc1928] https://tools.ietf.org/html/rfc1928
#[derive(Debug)]
pub struct Socks5Tunnel<S> {
    stream: S,
    state: TunnelState,
}

impl<S> Socks5Tunnel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Socks5Tunnel {
            stream,
            state: TunnelState::Idle,
        }
    }

    pub fn state(&self) -> TunnelState {
        self.state
    }

    /// Negotiates the authentication method, and authenticates if the proxy asks for it.
    pub async fn handshake(
        &mut self,
        credentials: Option<&Credentials>,
    ) -> Result<AuthMethod> {
        self.expect_state(TunnelState::Idle, "handshake")?;

        let result = self.negotiate(credentials).await;
        self.settle(result)
    }

    /// Issues CONNECT for `destination`. The stream is a plain pipe to the
    /// destination afterwards, see `into_inner`.
    pub async fn connect(
        &mut self,
        destination: &Address,
    ) -> Result<Address> {
        self.expect_state(TunnelState::HandshakeComplete, "connect")?;

        let result = self.request_connect(destination).await;
        self.settle(result)
    }

    /// Hands back the stream once CONNECT succeeded.
    pub fn into_inner(self) -> Result<S> {
        match self.state {
            TunnelState::Tunneled => Ok(self.stream),
            state => Err(Error::ProtocolViolation(format!(
                "tunnel is not established (state: {:?})",
                state
            ))),
        }
    }

    fn expect_state(
        &mut self,
        expected: TunnelState,
        operation: &str,
    ) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            let state = self.state;
            self.state = TunnelState::Failed;

            Err(Error::ProtocolViolation(format!(
                "{} is not allowed in state {:?}",
                operation, state
            )))
        }
    }

    fn settle<T>(
        &mut self,
        result: Result<T>,
    ) -> Result<T> {
        if result.is_err() {
            self.state = TunnelState::Failed;
        }

        result
    }

    async fn negotiate(
        &mut self,
        credentials: Option<&Credentials>,
    ) -> Result<AuthMethod> {
        // Nothing goes on the wire unless the credentials can be encoded.
        if let Some(credentials) = credentials {
            credentials.validate()?;
        }

        let mut request = vec![SOCKS_VER_5, 0x01, SOCKS_AUTH_NOT_REQUIRED];
        if credentials.is_some() {
            request[1] = 0x02;
            request.push(SOCKS_AUTH_USERNAME_PASSWORD);
        }

        self.stream.write_all(&request).await?;
        self.stream.flush().await?;
        self.state = TunnelState::HandshakeSent;

        let mut reply = [0; 2];
        self.stream.read_exact(&mut reply).await?;

        let [socks_version, method] = reply;
        if socks_version != SOCKS_VER_5 {
            return Err(Error::ProtocolViolation(format!(
                "proxy uses a different SOCKS version: {}",
                socks_version
            )));
        }

        if method == SOCKS_AUTH_NO_ACCEPTABLE_METHODS {
            return Err(match credentials {
                Some(_) => Error::AuthenticationRejected,
                None => Error::AuthenticationRequired,
            });
        }

        // The proxy may only pick one of the methods we offered.
        if !request[2..].contains(&method) {
            return Err(Error::ProtocolViolation(format!(
                "proxy chose an authentication method that was not offered: {:#04x}",
                method
            )));
        }

        let auth_method = AuthMethod::from_u8(method).ok_or_else(|| {
            Error::ProtocolViolation(format!("unrecognized authentication method: {:#04x}", method))
        })?;

        debug!("Use authentication method: {:?}", auth_method);
        self.state = TunnelState::MethodChosen(auth_method);

        match (auth_method, credentials) {
            (AuthMethod::NoAuthentication, _) => {}
            (AuthMethod::UsernamePassword, Some(credentials)) => self.authenticate(credentials).await?,
            (AuthMethod::UsernamePassword, None) => return Err(Error::AuthenticationRequired),
            (other, _) => {
                return Err(Error::ProtocolViolation(format!(
                    "unsupported authentication method: {:?}",
                    other
                )))
            }
        }

        self.state = TunnelState::HandshakeComplete;

        Ok(auth_method)
    }

    /// [rfc1929] https://tools.ietf.org/html/rfc1929
    async fn authenticate(
        &mut self,
        credentials: &Credentials,
    ) -> Result<()> {
        let mut request = vec![SOCKS_AUTH_VER];
        request.extend(credentials.as_socks_bytes()?);

        self.stream.write_all(&request).await?;
        self.stream.flush().await?;
        self.state = TunnelState::AuthSent;

        let mut reply = [0; 2];
        self.stream.read_exact(&mut reply).await?;

        let [auth_version, status] = reply;
        if auth_version != SOCKS_AUTH_VER {
            return Err(Error::ProtocolViolation(format!(
                "proxy uses a different authentication method version: {}",
                auth_version
            )));
        }

        // Check if status indicates success. If not, bail to close the connection.
        if status != SOCKS_AUTH_SUCCESS {
            warn!("Proxy rejected credentials with status {}", status);
            return Err(Error::AuthenticationRejected);
        }

        Ok(())
    }

    async fn request_connect(
        &mut self,
        destination: &Address,
    ) -> Result<Address> {
        let request = Socks5Request::connect(destination.clone());
        let request_bytes = request.as_socks_bytes()?;

        trace!("CONNECT {} ({} bytes)", destination, request_bytes.len());
        self.stream.write_all(&request_bytes).await?;
        self.stream.flush().await?;
        self.state = TunnelState::ConnectSent;

        // The bind address only matters for BIND; it is read to drain the reply.
        let binding = socks5::read_reply(&mut self.stream).await?;

        debug!("Tunnel to {} established (bound to {})", destination, binding);
        self.state = TunnelState::Tunneled;

        Ok(binding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    const CONNECT_OK: &[u8] = &[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0];

    #[tokio::test]
    async fn handshake_without_credentials() {
        let mock = Builder::new().write(&[0x05, 0x01, 0x00]).read(&[0x05, 0x00]).build();

        let mut tunnel = Socks5Tunnel::new(mock);
        let method = tunnel.handshake(None).await.unwrap();

        assert_eq!(method, AuthMethod::NoAuthentication);
        assert_eq!(tunnel.state(), TunnelState::HandshakeComplete);
    }

    #[tokio::test]
    async fn handshake_with_credentials() {
        let mock = Builder::new()
            .write(&[0x05, 0x02, 0x00, 0x02])
            .read(&[0x05, 0x02])
            .write(b"\x01\x05alice\x06secret")
            .read(&[0x01, 0x00])
            .build();

        let credentials = Credentials::new("alice", "secret");
        let mut tunnel = Socks5Tunnel::new(mock);
        let method = tunnel.handshake(Some(&credentials)).await.unwrap();

        assert_eq!(method, AuthMethod::UsernamePassword);
    }

    #[tokio::test]
    async fn proxy_may_skip_authentication_even_if_offered() {
        let mock = Builder::new().write(&[0x05, 0x02, 0x00, 0x02]).read(&[0x05, 0x00]).build();

        let credentials = Credentials::new("alice", "secret");
        let mut tunnel = Socks5Tunnel::new(mock);
        let method = tunnel.handshake(Some(&credentials)).await.unwrap();

        assert_eq!(method, AuthMethod::NoAuthentication);
    }

    #[tokio::test]
    async fn unoffered_method_is_a_violation() {
        let mock = Builder::new().write(&[0x05, 0x01, 0x00]).read(&[0x05, 0x02]).build();

        let mut tunnel = Socks5Tunnel::new(mock);
        let result = tunnel.handshake(None).await;

        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
        assert_eq!(tunnel.state(), TunnelState::Failed);
    }

    #[tokio::test]
    async fn wrong_version_in_handshake_reply() {
        let mock = Builder::new().write(&[0x05, 0x01, 0x00]).read(&[0x04, 0x00]).build();

        let mut tunnel = Socks5Tunnel::new(mock);
        let result = tunnel.handshake(None).await;

        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    }

    #[tokio::test]
    async fn no_acceptable_methods_without_credentials() {
        let mock = Builder::new().write(&[0x05, 0x01, 0x00]).read(&[0x05, 0xFF]).build();

        let mut tunnel = Socks5Tunnel::new(mock);
        let result = tunnel.handshake(None).await;

        assert!(matches!(result, Err(Error::AuthenticationRequired)));
    }

    #[tokio::test]
    async fn rejected_credentials() {
        let mock = Builder::new()
            .write(&[0x05, 0x02, 0x00, 0x02])
            .read(&[0x05, 0x02])
            .write(b"\x01\x03bob\x05wrong")
            .read(&[0x01, 0x01])
            .build();

        let credentials = Credentials::new("bob", "wrong");
        let mut tunnel = Socks5Tunnel::new(mock);
        let result = tunnel.handshake(Some(&credentials)).await;

        assert!(matches!(result, Err(Error::AuthenticationRejected)));
    }

    #[tokio::test]
    async fn oversized_username_writes_nothing() {
        // A mock without actions panics on any write.
        let mock = Builder::new().build();

        let credentials = Credentials::new("u".repeat(256), String::from("pw"));
        let mut tunnel = Socks5Tunnel::new(mock);
        let result = tunnel.handshake(Some(&credentials)).await;

        assert!(matches!(result, Err(Error::ValueTooLong { field: "username", length: 256 })));
    }

    #[tokio::test]
    async fn connect_to_ip_literal() {
        let mock = Builder::new()
            .write(&[0x05, 0x01, 0x00])
            .read(&[0x05, 0x00])
            .write(&[0x05, 0x01, 0x00, 0x01, 0x5D, 0xB8, 0xD8, 0x22, 0x01, 0xBB])
            .read(CONNECT_OK)
            .build();

        let mut tunnel = Socks5Tunnel::new(mock);
        tunnel.handshake(None).await.unwrap();
        tunnel.connect(&Address::new("93.184.216.34", 443)).await.unwrap();

        assert_eq!(tunnel.state(), TunnelState::Tunneled);
        assert!(tunnel.into_inner().is_ok());
    }

    #[tokio::test]
    async fn connect_drains_domain_binding() {
        let mut request = vec![0x05, 0x01, 0x00, 0x03, 0x0B];
        request.extend(b"example.com");
        request.extend(&[0x00, 0x50]);

        let mock = Builder::new()
            .write(&[0x05, 0x01, 0x00])
            .read(&[0x05, 0x00])
            .write(&request)
            .read(b"\x05\x00\x00\x03\x05proxy\x04\x38")
            .build();

        let mut tunnel = Socks5Tunnel::new(mock);
        tunnel.handshake(None).await.unwrap();
        let binding = tunnel.connect(&Address::new("example.com", 80)).await.unwrap();

        assert_eq!(binding, Address::new("proxy", 1080));
    }

    #[tokio::test]
    async fn connect_refused_by_proxy() {
        let mock = Builder::new()
            .write(&[0x05, 0x01, 0x00])
            .read(&[0x05, 0x00])
            .write(&[0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50])
            .read(&[0x05, 0x04, 0x00])
            .build();

        let mut tunnel = Socks5Tunnel::new(mock);
        tunnel.handshake(None).await.unwrap();
        let error = tunnel.connect(&Address::new("127.0.0.1", 80)).await.unwrap_err();

        assert!(matches!(error, Error::SocksServer { code: 4 }));
        assert_eq!(tunnel.state(), TunnelState::Failed);
        assert!(tunnel.into_inner().is_err());
    }

    #[tokio::test]
    async fn connect_before_handshake_is_rejected() {
        let mock = Builder::new().build();

        let mut tunnel = Socks5Tunnel::new(mock);
        let result = tunnel.connect(&Address::new("127.0.0.1", 80)).await;

        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
        assert_eq!(tunnel.state(), TunnelState::Failed);
    }
}
