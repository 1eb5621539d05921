use crate::addresses::{self, Address};
use crate::constants::*;
use crate::{Error, Result};
use num_traits::FromPrimitive;
use tokio::io::{AsyncRead, AsyncReadExt};

mod s5_client;
mod s5_tunnel;

pub use s5_client::Socks5Client;
pub use s5_tunnel::{Socks5Tunnel, TunnelState};

#[repr(u8)]
#[derive(Clone, Copy, Debug, FromPrimitive, PartialEq)]
pub enum AuthMethod {
    NoAuthentication = 0x00,
    Gssapi = 0x01,
    UsernamePassword = 0x02,
    NoAcceptableMethods = 0xFF,
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, FromPrimitive, PartialEq)]
pub enum AddressType {
    Ipv4 = 0x01,
    Domainname = 0x03,
    Ipv6 = 0x04,
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, FromPrimitive, PartialEq)]
pub enum Socks5Command {
    Connect = 0x01,
    Bind = 0x02,
    UdpAssociate = 0x03,
}

/// Reply codes of RFC 1928, section 6.
#[repr(u8)]
#[derive(Clone, Copy, Debug, FromPrimitive, PartialEq)]
pub enum Socks5Reply {
    Success = 0x00,
    GeneralFailure = 0x01,
    ConnectionNotAllowed = 0x02,
    NetworkUnreachable = 0x03,
    HostUnreachable = 0x04,
    ConnectionRefused = 0x05,
    TTLExpired = 0x06,
    CommandNotSupported = 0x07,
    AddressTypeNotSupported = 0x08,
}

#[derive(Clone, Debug)]
pub struct Socks5Request {
    pub command: Socks5Command,
    pub destination: Address,
}

impl Socks5Request {
    ///
    ///
    ///
    pub fn new(
        command: Socks5Command,
        destination: Address,
    ) -> Self {
        Socks5Request { command, destination }
    }

    pub fn connect(destination: Address) -> Self {
        Self::new(Socks5Command::Connect, destination)
    }

    ///
    ///
    ///
    pub fn as_socks_bytes(&self) -> Result<Vec<u8>> {
        let mut data = vec![SOCKS_VER_5, self.command as u8, SOCKS_RSV];
        data.extend(self.destination.as_socks_bytes()?);

        Ok(data)
    }
}

/// Reads a complete operation reply and returns the bind address.
pub async fn read_reply<S>(stream: &mut S) -> Result<Address>
where
    S: AsyncRead + Unpin,
{
    let mut operation_reply = [0; 3];
    stream.read_exact(&mut operation_reply).await?;

    let [version, reply_code, _reserved] = operation_reply;
    if version != SOCKS_VER_5 {
        return Err(Error::ProtocolViolation(format!(
            "proxy uses a different SOCKS version: {}",
            version
        )));
    }

    if reply_code != SOCKS_REP_SUCCEEDED {
        warn!(
            "CONNECT operation failed: {} ({:?})",
            reply_code,
            Socks5Reply::from_u8(reply_code)
        );
        return Err(Error::SocksServer { code: reply_code });
    }

    let binding = addresses::read_address(stream).await?;

    Ok(binding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn connect_request_for_ip_literal() {
        let request = Socks5Request::connect(Address::new("93.184.216.34", 443));
        let bytes = request.as_socks_bytes().unwrap();

        assert_eq!(
            bytes,
            vec![0x05, 0x01, 0x00, 0x01, 0x5D, 0xB8, 0xD8, 0x22, 0x01, 0xBB]
        );
    }

    #[test]
    fn connect_request_for_domain() {
        let request = Socks5Request::connect(Address::new("example.com", 80));
        let bytes = request.as_socks_bytes().unwrap();

        let mut expected = vec![0x05, 0x01, 0x00, 0x03, 0x0B];
        expected.extend(b"example.com");
        expected.extend(&[0x00, 0x50]);

        assert_eq!(bytes, expected);
    }

    #[tokio::test]
    async fn failed_reply_carries_code() {
        let mut reply = Cursor::new(vec![0x05, 0x05, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
        let error = read_reply(&mut reply).await.unwrap_err();

        assert!(matches!(error, Error::SocksServer { code: 5 }));
        assert_eq!(error.reply(), Some(Socks5Reply::ConnectionRefused));
    }

    #[tokio::test]
    async fn reply_with_wrong_version_is_a_violation() {
        let mut reply = Cursor::new(vec![0x04, 0x00, 0x00]);
        let result = read_reply(&mut reply).await;

        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    }

    #[tokio::test]
    async fn successful_reply_yields_binding() {
        let mut reply = Cursor::new(vec![0x05, 0x00, 0x00, 0x01, 10, 0, 0, 7, 0x1F, 0x90]);
        let binding = read_reply(&mut reply).await.unwrap();

        assert_eq!(binding.to_string(), "10.0.0.7:8080");
    }
}
