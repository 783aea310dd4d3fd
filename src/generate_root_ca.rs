//! Root CA Certificate Generation Module
//!
//! Generates the self-signed root authority that signs every chain
//! certificate issued by the registry.
//!
//! # Certificate Properties
//! - **Self-signed**: Issuer and subject are the same
//! - **Key**: EC P-521, signed with ECDSA/SHA-512
//! - **Key Usage**: digitalSignature, keyCertSign
//! - **Extended Key Usage**: clientAuth, serverAuth
//! - **Basic Constraints**: CA=true
//! - **Validity**: 10 years from the supplied issuance time
//! - **Serial**: derived from the SHA-256 of the public key
//!
//! The issuance time is always an argument. Nothing in this module reads the
//! wall clock, so two builds with the same key and time produce the same
//! to-be-signed certificate.
//!
//! # Example
//! ```rust,no_run
//! use chrono::{TimeZone, Utc};
//! use federation_ca::generate_root_ca::{RootCABuilder, RootSubject};
//! # fn example() -> federation_ca::error::RegistryResult<()> {
//! let issued_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let (root_key, root_cert) = RootCABuilder::new(RootSubject::default(), issued_at).build()?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Months, Utc};
use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectKeyIdentifier,
};
use openssl::x509::{X509Builder, X509Name, X509};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{RegistryError, RegistryResult};
use crate::secret_key::RootKeyBytes;

pub(crate) const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2
pub(crate) const VALIDITY_YEARS: u32 = 10;
const ROOT_CURVE: Nid = Nid::SECP521R1;
const SERIAL_LEN: usize = 16;

/// Fixed organizational identity stamped into the root certificate subject.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RootSubject {
    pub common_name: String,
    pub organization: String,
    pub organizational_unit: String,
    pub street_address: String,
    pub locality: String,
    pub state: String,
    pub country: String,
}

impl Default for RootSubject {
    fn default() -> Self {
        Self {
            common_name: "Federation Root CA".to_string(),
            organization: "Chain Federation".to_string(),
            organizational_unit: "Registry".to_string(),
            street_address: "1 Registry Way".to_string(),
            locality: "Zurich".to_string(),
            state: "ZH".to_string(),
            country: "CH".to_string(),
        }
    }
}

impl RootSubject {
    fn to_x509_name(&self) -> RegistryResult<X509Name> {
        let mut name_builder = X509Name::builder()
            .map_err(|e| RegistryError::Crypto(format!("Failed to create name builder: {}", e)))?;
        let entries = [
            (Nid::COUNTRYNAME, &self.country),
            (Nid::STATEORPROVINCENAME, &self.state),
            (Nid::LOCALITYNAME, &self.locality),
            (Nid::STREETADDRESS, &self.street_address),
            (Nid::ORGANIZATIONNAME, &self.organization),
            (Nid::ORGANIZATIONALUNITNAME, &self.organizational_unit),
            (Nid::COMMONNAME, &self.common_name),
        ];
        for (nid, value) in entries {
            // Empty template fields are left out of the subject
            if value.is_empty() {
                continue;
            }
            name_builder.append_entry_by_nid(nid, value).map_err(|e| {
                RegistryError::Crypto(format!("Failed to set {}: {}", nid.short_name().unwrap_or("?"), e))
            })?;
        }
        Ok(name_builder.build())
    }
}

// ================= Shared certificate template pieces =================

/// Validity window `[issued_at, issued_at + years)`, computed on the calendar.
pub(crate) fn validity_window(
    issued_at: DateTime<Utc>,
    years: u32,
) -> RegistryResult<(Asn1Time, Asn1Time)> {
    let not_after = issued_at
        .checked_add_months(Months::new(years.saturating_mul(12)))
        .ok_or_else(|| {
            RegistryError::Parse(format!("issuance time {} out of range", issued_at))
        })?;
    let not_before = Asn1Time::from_unix(issued_at.timestamp() as _)
        .map_err(|e| RegistryError::Crypto(format!("Failed to create not_before: {}", e)))?;
    let not_after = Asn1Time::from_unix(not_after.timestamp() as _)
        .map_err(|e| RegistryError::Crypto(format!("Failed to create not_after: {}", e)))?;
    Ok((not_before, not_after))
}

/// Positive 128-bit serial taken from the SHA-256 of `seed`.
pub(crate) fn serial_from_seed(seed: &[u8]) -> RegistryResult<Asn1Integer> {
    let digest = Sha256::digest(seed);
    let mut bytes = [0u8; SERIAL_LEN];
    bytes.copy_from_slice(&digest[..SERIAL_LEN]);
    bytes[0] &= 0x7f;
    let serial = BigNum::from_slice(&bytes)?;
    Ok(serial.to_asn1_integer()?)
}

/// Basic constraints, key usage and extended key usage shared by root and
/// chain certificates.
pub(crate) fn append_authority_extensions(builder: &mut X509Builder) -> RegistryResult<()> {
    let bc = BasicConstraints::new()
        .critical()
        .ca()
        .build()
        .map_err(|e| RegistryError::Crypto(format!("Failed to build BasicConstraints: {}", e)))?;
    builder
        .append_extension(bc)
        .map_err(|e| RegistryError::Crypto(format!("Failed to add BasicConstraints: {}", e)))?;

    let ku = KeyUsage::new()
        .critical()
        .digital_signature()
        .key_cert_sign()
        .build()
        .map_err(|e| RegistryError::Crypto(format!("Failed to build KeyUsage: {}", e)))?;
    builder
        .append_extension(ku)
        .map_err(|e| RegistryError::Crypto(format!("Failed to add KeyUsage: {}", e)))?;

    let eku = ExtendedKeyUsage::new()
        .client_auth()
        .server_auth()
        .build()
        .map_err(|e| RegistryError::Crypto(format!("Failed to build ExtendedKeyUsage: {}", e)))?;
    builder
        .append_extension(eku)
        .map_err(|e| RegistryError::Crypto(format!("Failed to add ExtendedKeyUsage: {}", e)))?;
    Ok(())
}

/// Digest paired with the signing key's curve.
pub(crate) fn signing_digest(key: &PKey<Private>) -> MessageDigest {
    match key.ec_key().ok().and_then(|ec| ec.group().curve_name()) {
        Some(Nid::SECP521R1) => MessageDigest::sha512(),
        Some(Nid::SECP384R1) => MessageDigest::sha384(),
        _ => MessageDigest::sha256(),
    }
}

// ================= Root CA Builder =================

/// Builder for the self-signed root authority.
///
/// A fresh key is generated on every `build()` unless one is supplied with
/// [`RootCABuilder::with_key`]; key generation draws from OpenSSL's RNG.
pub struct RootCABuilder {
    subject: RootSubject,
    issued_at: DateTime<Utc>,
    key: Option<PKey<Private>>,
}

impl RootCABuilder {
    /// `issued_at` opens the validity window.
    pub fn new(subject: RootSubject, issued_at: DateTime<Utc>) -> Self {
        Self {
            subject,
            issued_at,
            key: None,
        }
    }

    /// Certify an existing key instead of generating one.
    pub fn with_key(mut self, key: PKey<Private>) -> Self {
        self.key = Some(key);
        self
    }

    /// Build the key pair and self-signed root certificate
    ///
    /// # Returns
    /// * `Ok((PKey<Private>, X509))` - Tuple of (private key, self-signed certificate)
    ///
    /// # Errors
    /// Returns [`RegistryError::Crypto`] if key generation, extension
    /// creation or signing fails.
    pub fn build(self) -> RegistryResult<(PKey<Private>, X509)> {
        let private_key = match self.key {
            Some(key) => key,
            None => {
                let group = EcGroup::from_curve_name(ROOT_CURVE)
                    .map_err(|e| RegistryError::Crypto(format!("Failed to load curve: {}", e)))?;
                let ec_key = EcKey::generate(&group).map_err(|e| {
                    RegistryError::Crypto(format!("Failed to generate EC keypair: {}", e))
                })?;
                PKey::from_ec_key(ec_key).map_err(|e| {
                    RegistryError::Crypto(format!("Failed to create private key: {}", e))
                })?
            }
        };

        let mut builder = X509::builder()
            .map_err(|e| RegistryError::Crypto(format!("Failed to create X509 builder: {}", e)))?;
        builder
            .set_version(X509_VERSION_3)
            .map_err(|e| RegistryError::Crypto(format!("Failed to set version: {}", e)))?;

        let serial = serial_from_seed(&private_key.public_key_to_der()?)?;
        builder.set_serial_number(&serial)?;

        let name = self.subject.to_x509_name()?;
        builder
            .set_subject_name(&name)
            .map_err(|e| RegistryError::Crypto(format!("Failed to set subject: {}", e)))?;
        builder
            .set_issuer_name(&name)
            .map_err(|e| RegistryError::Crypto(format!("Failed to set issuer: {}", e)))?;

        let (not_before, not_after) = validity_window(self.issued_at, VALIDITY_YEARS)?;
        builder
            .set_not_before(&not_before)
            .map_err(|e| RegistryError::Crypto(format!("Failed to set not_before: {}", e)))?;
        builder
            .set_not_after(&not_after)
            .map_err(|e| RegistryError::Crypto(format!("Failed to set not_after: {}", e)))?;

        builder
            .set_pubkey(&private_key)
            .map_err(|e| RegistryError::Crypto(format!("Failed to set public key: {}", e)))?;

        append_authority_extensions(&mut builder)?;

        let ski = SubjectKeyIdentifier::new()
            .build(&builder.x509v3_context(None, None))
            .map_err(|e| RegistryError::Crypto(format!("Failed to build SubjectKeyIdentifier: {}", e)))?;
        builder
            .append_extension(ski)
            .map_err(|e| RegistryError::Crypto(format!("Failed to add SubjectKeyIdentifier: {}", e)))?;

        builder
            .sign(&private_key, signing_digest(&private_key))
            .map_err(|e| RegistryError::Crypto(format!("Failed to sign certificate: {}", e)))?;
        Ok((private_key, builder.build()))
    }
}

/// Generate a root authority and return its encoded forms.
///
/// Returns `(certificate DER, private key DER)`. Nothing is persisted; see
/// [`crate::root_authority::install_root`] for that.
pub fn generate_root(
    subject: &RootSubject,
    issued_at: DateTime<Utc>,
) -> RegistryResult<(Vec<u8>, RootKeyBytes)> {
    let (private_key, certificate) = RootCABuilder::new(subject.clone(), issued_at).build()?;
    Ok((certificate.to_der()?, RootKeyBytes::from_pkey(&private_key)?))
}

/// Whether `key` is the private half of `certificate`'s public key.
pub fn key_matches_certificate(key: &PKey<Private>, certificate: &X509) -> RegistryResult<bool> {
    let public_key = certificate.public_key()?;
    Ok(public_key.public_eq(key))
}

// `AuthorityKeyIdentifier` is only meaningful on issued certificates
pub(crate) fn authority_key_identifier(
    builder: &X509Builder,
    issuer: &X509,
) -> RegistryResult<openssl::x509::X509Extension> {
    AuthorityKeyIdentifier::new()
        .keyid(false)
        .build(&builder.x509v3_context(Some(issuer), None))
        .map_err(|e| RegistryError::Crypto(format!("Failed to build AuthorityKeyIdentifier: {}", e)))
}
