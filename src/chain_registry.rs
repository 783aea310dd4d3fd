//! Chain registry
//!
//! A chain registers once with `(info, ip, serial)` and a CSR. The registry
//! derives its ID, has the root authority sign the CSR, and stores two
//! entries:
//!
//! ```text
//! <chain id>            -> {"id":..,"info":..,"ip":..,"serial":..}
//! CHAINORGS-<chain id>  -> [{"name":..,"cert":..}, ...]
//! ```
//!
//! # Chain ID
//! `hex(SHA-256(info ‖ ip ‖ serial))`: the three strings concatenated with no
//! separator, hashed, and written as 64 lowercase hex characters.
//!
//! # Lifecycle
//! Unregistered → Registered → Deleted. Registering an ID that already has a
//! record is rejected. Records are never updated in place.
//!
//! The two entries are independent store writes. When the second one fails
//! after the first succeeded, the caller gets [`RegistryError::Consistency`]
//! and the record stays in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::error::{RegistryError, RegistryResult};
use crate::issue_certificate::issue_from_csr;
use crate::org_certificates::{self, normalize_org_payload, org_set_key};
use crate::protocol::base64_bytes;
use crate::root_authority::get_root;
use crate::storage::KeyValueStore;

/// Deterministic chain identity.
pub fn derive_chain_id(info: &str, ip: &str, serial: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(info.as_bytes());
    hasher.update(ip.as_bytes());
    hasher.update(serial.as_bytes());
    hex::encode(hasher.finalize())
}

/// Length of a derived chain ID in hex characters.
pub const CHAIN_ID_LEN: usize = 64;

/// Reject anything that [`derive_chain_id`] could not have produced.
///
/// Chain operations take the ID straight from the caller and use it as a
/// store key, so other keys (the root authority, org sets) must not pass.
pub fn validate_chain_id(id: &str) -> RegistryResult<()> {
    let well_formed = id.len() == CHAIN_ID_LEN
        && id.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if !well_formed {
        return Err(RegistryError::Parse(format!(
            "{:?} is not a chain ID (expected {} lowercase hex characters)",
            id, CHAIN_ID_LEN
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainRecord {
    pub id: String,
    pub info: String,
    pub ip: String,
    pub serial: String,
}

/// Registration input as received from a caller.
#[derive(Debug, Clone, Copy)]
pub struct RegistrationRequest<'a> {
    pub info: &'a str,
    pub ip: &'a str,
    pub serial: &'a str,
    /// DER-encoded PKCS#10 request
    pub csr_der: &'a [u8],
    /// Initial org certificate set (JSON array of `{name, cert}`)
    pub org_payload: &'a [u8],
}

/// What a registering chain gets back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationReceipt {
    pub id: String,
    #[serde(with = "base64_bytes")]
    pub cert: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub root_cert: Vec<u8>,
}

/// Registry operations over a [`KeyValueStore`].
///
/// Holds no state of its own besides the store handle.
pub struct ChainRegistry<S> {
    store: S,
}

impl<S: KeyValueStore> ChainRegistry<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Register a chain and issue its certificate.
    ///
    /// `issued_at` opens the certificate validity window. The certificate
    /// serial is derived from the chain ID.
    ///
    /// # Errors
    /// * [`RegistryError::AlreadyRegistered`] - a record exists for the derived ID
    /// * [`RegistryError::Parse`] - bad CSR or org payload
    /// * [`RegistryError::NotFound`] - no root authority installed
    /// * [`RegistryError::Storage`] - the chain record write failed
    /// * [`RegistryError::Consistency`] - record written, org set write failed
    pub fn register(
        &mut self,
        request: RegistrationRequest<'_>,
        issued_at: DateTime<Utc>,
    ) -> RegistryResult<RegistrationReceipt> {
        let id = derive_chain_id(request.info, request.ip, request.serial);

        if self.store.get(&id)?.is_some() {
            warn!(chain_id = %id, "Rejected re-registration");
            return Err(RegistryError::AlreadyRegistered(id));
        }

        let org_payload = normalize_org_payload(request.org_payload)?;

        let root = get_root(&self.store)?;
        let cert = issue_from_csr(
            request.csr_der,
            &root.certificate,
            &root.private_key,
            id.as_bytes(),
            issued_at,
        )?;

        let record = ChainRecord {
            id: id.clone(),
            info: request.info.to_string(),
            ip: request.ip.to_string(),
            serial: request.serial.to_string(),
        };
        let record_json = serde_json::to_vec(&record)
            .map_err(|e| RegistryError::Parse(format!("encode chain record: {}", e)))?;

        self.store.put(&id, &record_json)?;

        if let Err(e) = self.store.put(&org_set_key(&id), &org_payload) {
            error!(chain_id = %id, "Chain record stored but org certificate set was not: {}", e);
            return Err(RegistryError::Consistency(format!(
                "chain {} recorded but its org certificate set was not saved: {}",
                id, e
            )));
        }

        info!(chain_id = %id, ip = request.ip, "Chain registered");
        Ok(RegistrationReceipt {
            id,
            cert,
            root_cert: root.certificate_der,
        })
    }

    /// Stored chain record bytes.
    pub fn get_info(&self, id: &str) -> RegistryResult<Vec<u8>> {
        validate_chain_id(id)?;
        self.store
            .get(id)?
            .ok_or_else(|| RegistryError::NotFound(format!("chain {}", id)))
    }

    pub fn get_record(&self, id: &str) -> RegistryResult<ChainRecord> {
        let bytes = self.get_info(id)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| RegistryError::Parse(format!("chain record {}: {}", id, e)))
    }

    /// Delete the chain record and its org certificate set.
    ///
    /// Both deletes are always attempted. Absent keys are not an error.
    pub fn delete(&mut self, id: &str) -> RegistryResult<()> {
        validate_chain_id(id)?;
        let record = self.store.delete(id);
        let orgs = self.store.delete(&org_set_key(id));

        match (record, orgs) {
            (Ok(()), Ok(())) => {
                info!(chain_id = id, "Chain deleted");
                Ok(())
            }
            (Err(record_err), Err(orgs_err)) => Err(RegistryError::Storage(format!(
                "delete chain {}: record: {}; org certificate set: {}",
                id, record_err, orgs_err
            ))),
            (Err(e), Ok(())) => Err(RegistryError::Consistency(format!(
                "org certificate set of chain {} deleted but the chain record was not: {}",
                id, e
            ))),
            (Ok(()), Err(e)) => Err(RegistryError::Consistency(format!(
                "chain {} record deleted but its org certificate set was not: {}",
                id, e
            ))),
        }
    }

    pub fn set_org_certificates(&mut self, chain_id: &str, payload: &[u8]) -> RegistryResult<()> {
        validate_chain_id(chain_id)?;
        org_certificates::set_all(&mut self.store, chain_id, payload)
    }

    pub fn get_org_certificates(&self, chain_id: &str) -> RegistryResult<Vec<u8>> {
        validate_chain_id(chain_id)?;
        org_certificates::get_all(&self.store, chain_id)
    }

    pub fn update_org_certificate(
        &mut self,
        chain_id: &str,
        org_name: &str,
        new_cert: &str,
    ) -> RegistryResult<bool> {
        validate_chain_id(chain_id)?;
        org_certificates::update_one(&mut self.store, chain_id, org_name, new_cert)
    }
}
