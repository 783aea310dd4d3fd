//! Chain Certificate Issuance Module
//!
//! Turns a PKCS#10 certificate signing request into a certificate signed by
//! the root authority.
//!
//! ```text
//! Root CA (self-signed)
//!   └── Chain Certificate (subject + public key from the CSR) ← This module
//! ```
//!
//! # Certificate Properties
//! - **Subject**: copied verbatim from the CSR
//! - **Public key**: the CSR's public key
//! - **Issuer**: the root certificate's subject
//! - **Serial**: derived from a caller-supplied seed (the chain ID)
//! - **Validity**: 10 years from the supplied issuance time
//! - **Basic Constraints / Key Usage / EKU**: same as the root
//!
//! Issuance is a pure function of the CSR, the root pair, the serial seed and
//! the issuance time. No storage or clock access happens here.

use chrono::{DateTime, Utc};
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::SubjectKeyIdentifier;
use openssl::x509::{X509Req, X509};

use crate::error::{RegistryError, RegistryResult};
use crate::generate_root_ca::{
    append_authority_extensions, authority_key_identifier, serial_from_seed, signing_digest,
    validity_window, VALIDITY_YEARS, X509_VERSION_3,
};

/// Parse a DER-encoded CSR and check its self-signature.
pub fn parse_csr(csr_der: &[u8]) -> RegistryResult<X509Req> {
    let csr = X509Req::from_der(csr_der)
        .map_err(|e| RegistryError::Parse(format!("certificate signing request: {}", e)))?;
    let public_key = csr
        .public_key()
        .map_err(|e| RegistryError::Parse(format!("CSR public key: {}", e)))?;
    let signed = csr
        .verify(&public_key)
        .map_err(|e| RegistryError::Parse(format!("CSR signature: {}", e)))?;
    if !signed {
        return Err(RegistryError::Parse(
            "CSR signature does not verify against its public key".to_string(),
        ));
    }
    Ok(csr)
}

/// Issues chain certificates under a root authority.
pub struct CsrCertificateIssuer<'a> {
    signing_key: &'a PKey<Private>,
    signing_cert: &'a X509,
}

impl<'a> CsrCertificateIssuer<'a> {
    /// # Arguments
    /// * `root_key` - Root authority private key
    /// * `root_cert` - Root authority certificate (issuer information)
    pub fn new(root_key: &'a PKey<Private>, root_cert: &'a X509) -> Self {
        Self {
            signing_key: root_key,
            signing_cert: root_cert,
        }
    }

    /// Sign a certificate for the key and subject in `csr_der`.
    ///
    /// Returns the DER encoding of the issued certificate.
    ///
    /// # Errors
    /// * [`RegistryError::Parse`] - malformed CSR or CSR signature mismatch
    /// * [`RegistryError::Crypto`] - template construction or signing failed
    pub fn issue(
        &self,
        csr_der: &[u8],
        serial_seed: &[u8],
        issued_at: DateTime<Utc>,
    ) -> RegistryResult<Vec<u8>> {
        let csr = parse_csr(csr_der)?;
        let csr_public_key = csr.public_key()?;

        let mut builder = X509::builder()
            .map_err(|e| RegistryError::Crypto(format!("Failed to create X509 builder: {}", e)))?;
        builder
            .set_version(X509_VERSION_3)
            .map_err(|e| RegistryError::Crypto(format!("Failed to set version: {}", e)))?;

        let serial = serial_from_seed(serial_seed)?;
        builder.set_serial_number(&serial)?;

        builder
            .set_subject_name(csr.subject_name())
            .map_err(|e| RegistryError::Crypto(format!("Failed to set subject from CSR: {}", e)))?;
        builder
            .set_issuer_name(self.signing_cert.subject_name())
            .map_err(|e| RegistryError::Crypto(format!("Failed to set issuer from root: {}", e)))?;

        let (not_before, not_after) = validity_window(issued_at, VALIDITY_YEARS)?;
        builder
            .set_not_before(&not_before)
            .map_err(|e| RegistryError::Crypto(format!("Failed to set not_before: {}", e)))?;
        builder
            .set_not_after(&not_after)
            .map_err(|e| RegistryError::Crypto(format!("Failed to set not_after: {}", e)))?;

        builder
            .set_pubkey(&csr_public_key)
            .map_err(|e| RegistryError::Crypto(format!("Failed to set public key: {}", e)))?;

        append_authority_extensions(&mut builder)?;

        let ski = SubjectKeyIdentifier::new()
            .build(&builder.x509v3_context(Some(self.signing_cert), None))
            .map_err(|e| RegistryError::Crypto(format!("Failed to build SubjectKeyIdentifier: {}", e)))?;
        builder
            .append_extension(ski)
            .map_err(|e| RegistryError::Crypto(format!("Failed to add SubjectKeyIdentifier: {}", e)))?;
        let aki = authority_key_identifier(&builder, self.signing_cert)?;
        builder
            .append_extension(aki)
            .map_err(|e| RegistryError::Crypto(format!("Failed to add AuthorityKeyIdentifier: {}", e)))?;

        // Sign with the root authority's private key
        builder
            .sign(self.signing_key, signing_digest(self.signing_key))
            .map_err(|e| RegistryError::Crypto(format!("Failed to sign certificate: {}", e)))?;

        Ok(builder.build().to_der()?)
    }
}

/// Issue a chain certificate from `csr_der` under the given root pair.
pub fn issue_from_csr(
    csr_der: &[u8],
    root_cert: &X509,
    root_key: &PKey<Private>,
    serial_seed: &[u8],
    issued_at: DateTime<Utc>,
) -> RegistryResult<Vec<u8>> {
    CsrCertificateIssuer::new(root_key, root_cert).issue(csr_der, serial_seed, issued_at)
}

/// Whether `leaf_der` carries a valid signature by `root_cert`'s key.
pub fn verify_issued(leaf_der: &[u8], root_cert: &X509) -> RegistryResult<bool> {
    let leaf = X509::from_der(leaf_der)
        .map_err(|e| RegistryError::Parse(format!("issued certificate: {}", e)))?;
    let root_public_key = root_cert.public_key()?;
    Ok(leaf.verify(&root_public_key)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate_root_ca::{RootCABuilder, RootSubject};
    use crate::test_support::{build_csr, fixed_time};
    use openssl::ec::{EcGroup, EcKey};
    use openssl::hash::MessageDigest;
    use openssl::nid::Nid;
    use openssl::x509::X509Name;

    #[test]
    fn test_issued_certificate_verifies_against_root() {
        let (root_key, root_cert) = RootCABuilder::new(RootSubject::default(), fixed_time())
            .build()
            .unwrap();
        let csr = build_csr("chain-a.example");

        let leaf_der =
            issue_from_csr(&csr, &root_cert, &root_key, b"chain-a", fixed_time()).unwrap();

        assert!(verify_issued(&leaf_der, &root_cert).unwrap());
        let leaf = X509::from_der(&leaf_der).unwrap();
        assert_eq!(
            leaf.issuer_name().to_der().unwrap(),
            root_cert.subject_name().to_der().unwrap()
        );
    }

    #[test]
    fn test_subject_and_key_come_from_csr() {
        let (root_key, root_cert) = RootCABuilder::new(RootSubject::default(), fixed_time())
            .build()
            .unwrap();
        let csr_der = build_csr("peer.chain-b.example");
        let csr = X509Req::from_der(&csr_der).unwrap();

        let leaf_der =
            issue_from_csr(&csr_der, &root_cert, &root_key, b"chain-b", fixed_time()).unwrap();
        let leaf = X509::from_der(&leaf_der).unwrap();

        assert_eq!(
            leaf.subject_name().to_der().unwrap(),
            csr.subject_name().to_der().unwrap()
        );
        assert!(leaf.public_key().unwrap().public_eq(&csr.public_key().unwrap()));
    }

    #[test]
    fn test_leaf_does_not_verify_against_other_root() {
        let (root_key, root_cert) = RootCABuilder::new(RootSubject::default(), fixed_time())
            .build()
            .unwrap();
        let (_, other_root) = RootCABuilder::new(RootSubject::default(), fixed_time())
            .build()
            .unwrap();
        let leaf_der = issue_from_csr(
            &build_csr("chain-c.example"),
            &root_cert,
            &root_key,
            b"chain-c",
            fixed_time(),
        )
        .unwrap();

        assert!(!verify_issued(&leaf_der, &other_root).unwrap());
    }

    #[test]
    fn test_serial_tracks_seed() {
        let (root_key, root_cert) = RootCABuilder::new(RootSubject::default(), fixed_time())
            .build()
            .unwrap();
        let csr = build_csr("chain-d.example");
        let issuer = CsrCertificateIssuer::new(&root_key, &root_cert);

        let first = X509::from_der(&issuer.issue(&csr, b"id-1", fixed_time()).unwrap()).unwrap();
        let again = X509::from_der(&issuer.issue(&csr, b"id-1", fixed_time()).unwrap()).unwrap();
        let other = X509::from_der(&issuer.issue(&csr, b"id-2", fixed_time()).unwrap()).unwrap();

        let serial = |c: &X509| c.serial_number().to_bn().unwrap();
        assert_eq!(serial(&first), serial(&again));
        assert_ne!(serial(&first), serial(&other));
        assert_eq!(
            first.subject_name().to_der().unwrap(),
            again.subject_name().to_der().unwrap()
        );
        assert_eq!(
            first.issuer_name().to_der().unwrap(),
            again.issuer_name().to_der().unwrap()
        );
        assert_eq!(first.not_before().to_string(), again.not_before().to_string());
        assert_eq!(first.not_after().to_string(), again.not_after().to_string());
    }

    #[test]
    fn test_csr_signed_by_foreign_key_is_parse_error() {
        let (root_key, root_cert) = RootCABuilder::new(RootSubject::default(), fixed_time())
            .build()
            .unwrap();
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let claimed_key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();
        let signing_key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

        let mut name = X509Name::builder().unwrap();
        name.append_entry_by_nid(Nid::COMMONNAME, "chain-e.example")
            .unwrap();
        let name = name.build();
        let mut req = X509Req::builder().unwrap();
        req.set_subject_name(&name).unwrap();
        req.set_pubkey(&claimed_key).unwrap();
        req.sign(&signing_key, MessageDigest::sha256()).unwrap();
        let csr_der = req.build().to_der().unwrap();

        // Well-formed DER, so only the signature check can reject it
        assert!(X509Req::from_der(&csr_der).is_ok());
        let result = issue_from_csr(&csr_der, &root_cert, &root_key, b"x", fixed_time());
        assert!(matches!(result, Err(RegistryError::Parse(_))));
    }

    #[test]
    fn test_malformed_csr_is_parse_error() {
        let (root_key, root_cert) = RootCABuilder::new(RootSubject::default(), fixed_time())
            .build()
            .unwrap();

        let result = issue_from_csr(b"not a csr", &root_cert, &root_key, b"x", fixed_time());
        assert!(matches!(result, Err(RegistryError::Parse(_))));
    }
}
