//! Root authority persistence
//!
//! The root certificate and root private key live under two fixed store keys.
//! Both are DER: the certificate as X.509, the key as SEC1 (or PKCS#8).
//! Every write checks that the two halves pair up, and every read checks it
//! again, so a registry never signs with a key that does not belong to the
//! certificate it hands out as the root.

use chrono::{DateTime, Utc};
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use tracing::{info, warn};

use crate::error::{RegistryError, RegistryResult};
use crate::generate_root_ca::{generate_root, key_matches_certificate, RootSubject};
use crate::secret_key::RootKeyBytes;
use crate::storage::KeyValueStore;

pub const ROOT_CERTIFICATE_KEY: &str = "federation-root-certificate";
pub const ROOT_PRIVATE_KEY_KEY: &str = "federation-root-private-key";

/// Root authority rehydrated from the store.
pub struct RootAuthority {
    pub certificate: X509,
    pub private_key: PKey<Private>,
    /// Certificate bytes exactly as stored
    pub certificate_der: Vec<u8>,
}

impl std::fmt::Debug for RootAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootAuthority")
            .field("certificate_der_len", &self.certificate_der.len())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

fn parse_certificate(der: &[u8]) -> RegistryResult<X509> {
    X509::from_der(der).map_err(|e| RegistryError::Parse(format!("root certificate: {}", e)))
}

/// Load and parse the root pair.
///
/// # Errors
/// * [`RegistryError::NotFound`] - either half is missing
/// * [`RegistryError::Parse`] - either half does not decode
/// * [`RegistryError::RootKeyMismatch`] - the halves do not pair up
pub fn get_root<S: KeyValueStore + ?Sized>(store: &S) -> RegistryResult<RootAuthority> {
    let certificate_der = store
        .get(ROOT_CERTIFICATE_KEY)?
        .ok_or_else(|| RegistryError::NotFound("root certificate is not set".to_string()))?;
    let key_der = store
        .get(ROOT_PRIVATE_KEY_KEY)?
        .ok_or_else(|| RegistryError::NotFound("root private key is not set".to_string()))?;

    let certificate = parse_certificate(&certificate_der)?;
    let private_key = RootKeyBytes::from_der(key_der).to_pkey()?;
    if !key_matches_certificate(&private_key, &certificate)? {
        return Err(RegistryError::RootKeyMismatch);
    }

    Ok(RootAuthority {
        certificate,
        private_key,
        certificate_der,
    })
}

/// Stored root certificate bytes.
pub fn get_root_certificate<S: KeyValueStore + ?Sized>(store: &S) -> RegistryResult<Vec<u8>> {
    store
        .get(ROOT_CERTIFICATE_KEY)?
        .ok_or_else(|| RegistryError::NotFound("root certificate is not set".to_string()))
}

pub fn has_root<S: KeyValueStore + ?Sized>(store: &S) -> RegistryResult<bool> {
    Ok(store.get(ROOT_CERTIFICATE_KEY)?.is_some() && store.get(ROOT_PRIVATE_KEY_KEY)?.is_some())
}

/// Install the root certificate half.
///
/// If a root private key is already stored and parses, the certificate must
/// carry its public key; otherwise nothing is written.
pub fn store_root_certificate<S: KeyValueStore + ?Sized>(
    store: &mut S,
    certificate_der: &[u8],
) -> RegistryResult<()> {
    let certificate = parse_certificate(certificate_der)?;
    if let Some(key_der) = store.get(ROOT_PRIVATE_KEY_KEY)? {
        let key = RootKeyBytes::from_der(key_der).to_pkey()?;
        if !key_matches_certificate(&key, &certificate)? {
            warn!("Rejected root certificate that does not match the stored root key");
            return Err(RegistryError::RootKeyMismatch);
        }
    }
    store.put(ROOT_CERTIFICATE_KEY, certificate_der)?;
    info!("Root certificate installed");
    Ok(())
}

/// Install the root private key half, with the same pairing check as
/// [`store_root_certificate`].
pub fn store_root_private_key<S: KeyValueStore + ?Sized>(
    store: &mut S,
    key: &RootKeyBytes,
) -> RegistryResult<()> {
    let private_key = key.to_pkey()?;
    if let Some(certificate_der) = store.get(ROOT_CERTIFICATE_KEY)? {
        let certificate = parse_certificate(&certificate_der)?;
        if !key_matches_certificate(&private_key, &certificate)? {
            warn!("Rejected root private key that does not match the stored root certificate");
            return Err(RegistryError::RootKeyMismatch);
        }
    }
    store.put(ROOT_PRIVATE_KEY_KEY, key.expose_der())?;
    info!("Root private key installed");
    Ok(())
}

/// Install a complete root pair, replacing whatever was stored.
///
/// Certificates issued under a previous root stay parseable but no longer
/// verify against the new one.
pub fn install_root<S: KeyValueStore + ?Sized>(
    store: &mut S,
    certificate_der: &[u8],
    key: &RootKeyBytes,
) -> RegistryResult<()> {
    let certificate = parse_certificate(certificate_der)?;
    if !key_matches_certificate(&key.to_pkey()?, &certificate)? {
        return Err(RegistryError::RootKeyMismatch);
    }

    store.put(ROOT_CERTIFICATE_KEY, certificate_der)?;
    store.put(ROOT_PRIVATE_KEY_KEY, key.expose_der()).map_err(|e| {
        RegistryError::Consistency(format!(
            "root certificate written but root private key write failed: {}",
            e
        ))
    })?;
    info!("Root authority installed");
    Ok(())
}

/// Generate a root with `subject` valid from `issued_at` and install it.
///
/// Returns the new root certificate DER.
pub fn generate_and_install<S: KeyValueStore + ?Sized>(
    store: &mut S,
    subject: &RootSubject,
    issued_at: DateTime<Utc>,
) -> RegistryResult<Vec<u8>> {
    let (certificate_der, key) = generate_root(subject, issued_at)?;
    install_root(store, &certificate_der, &key)?;
    Ok(certificate_der)
}
