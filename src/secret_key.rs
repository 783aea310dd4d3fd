//! Redacted in-memory container for the root private key
//!
//! The key is held as DER bytes behind the `secrecy` crate so it is zeroized
//! on drop and never shows up in `Debug` output or logs.

use openssl::pkey::{PKey, Private};
use secrecy::zeroize::Zeroize;
use secrecy::{ExposeSecret, Secret};
use std::fmt;

use crate::error::{RegistryError, RegistryResult};

#[derive(Clone)]
struct KeyMaterial {
    der_bytes: Vec<u8>,
}

impl Zeroize for KeyMaterial {
    fn zeroize(&mut self) {
        self.der_bytes.zeroize();
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("der_bytes", &"<redacted>")
            .finish()
    }
}

/// DER-encoded EC private key of the root authority.
pub struct RootKeyBytes {
    material: Secret<KeyMaterial>,
}

impl RootKeyBytes {
    /// Wrap already-encoded key bytes without parsing them.
    pub fn from_der(der_bytes: Vec<u8>) -> Self {
        Self {
            material: Secret::new(KeyMaterial { der_bytes }),
        }
    }

    /// Encode `key` as DER and wrap it.
    pub fn from_pkey(key: &PKey<Private>) -> RegistryResult<Self> {
        let der_bytes = match key.ec_key() {
            // SEC1 encoding for EC keys
            Ok(ec) => ec.private_key_to_der()?,
            Err(_) => key.private_key_to_der()?,
        };
        Ok(Self::from_der(der_bytes))
    }

    pub fn expose_der(&self) -> &[u8] {
        &self.material.expose_secret().der_bytes
    }

    /// Parse the wrapped bytes into an OpenSSL key
    pub fn to_pkey(&self) -> RegistryResult<PKey<Private>> {
        PKey::private_key_from_der(self.expose_der())
            .map_err(|e| RegistryError::Parse(format!("root private key: {}", e)))
    }
}

impl fmt::Debug for RootKeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootKeyBytes")
            .field("material", &"<securely stored>")
            .finish()
    }
}
