use crate::constants::SOCKS_MAX_FIELD_LEN;
use crate::{Error, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct Credentials {
    pub username: Vec<u8>,
    pub password: Vec<u8>,
}

impl Credentials {
    ///
    ///
    ///
    pub fn new<S: Into<Vec<u8>>>(
        username: S,
        password: S,
    ) -> Self {
        let username = username.into();
        let password = password.into();

        Credentials { username, password }
    }

    /// Both fields travel with a one-byte length prefix, see RFC 1929.
    pub fn validate(&self) -> Result<()> {
        if self.username.len() > SOCKS_MAX_FIELD_LEN {
            return Err(Error::ValueTooLong {
                field: "username",
                length: self.username.len(),
            });
        }
        if self.password.len() > SOCKS_MAX_FIELD_LEN {
            return Err(Error::ValueTooLong {
                field: "password",
                length: self.password.len(),
            });
        }

        Ok(())
    }

    ///
    ///
    ///
    pub fn as_socks_bytes(&self) -> Result<Vec<u8>> {
        self.validate()?;

        // Append username
        let mut bytes = vec![self.username.len() as u8];
        bytes.extend(self.username.iter());

        // Append password
        bytes.push(self.password.len() as u8);
        bytes.extend(self.password.iter());

        Ok(bytes)
    }
}
