//! Fixtures shared by unit tests.

use chrono::{DateTime, TimeZone, Utc};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::x509::{X509Name, X509Req};

use crate::error::{RegistryError, RegistryResult};
use crate::storage::{KeyValueStore, MemoryStore};

pub(crate) fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// DER-encoded CSR for a fresh P-256 key with the given common name.
pub(crate) fn build_csr(common_name: &str) -> Vec<u8> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

    let mut name = X509Name::builder().unwrap();
    name.append_entry_by_nid(Nid::ORGANIZATIONNAME, "Chain Operators")
        .unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, common_name).unwrap();
    let name = name.build();

    let mut req = X509Req::builder().unwrap();
    req.set_version(0).unwrap();
    req.set_subject_name(&name).unwrap();
    req.set_pubkey(&key).unwrap();
    req.sign(&key, MessageDigest::sha256()).unwrap();
    req.build().to_der().unwrap()
}

/// Store wrapper that counts writes and fails puts/deletes on keys with a
/// configured prefix.
#[derive(Default)]
pub(crate) struct FaultyStore {
    pub inner: MemoryStore,
    pub fail_prefix: Option<String>,
    pub writes: usize,
}

impl FaultyStore {
    pub fn failing_on(prefix: &str) -> Self {
        Self {
            fail_prefix: Some(prefix.to_string()),
            ..Self::default()
        }
    }

    fn check(&self, key: &str) -> RegistryResult<()> {
        match &self.fail_prefix {
            Some(prefix) if key.starts_with(prefix.as_str()) => {
                Err(RegistryError::Storage(format!("injected failure on {}", key)))
            }
            _ => Ok(()),
        }
    }
}

impl KeyValueStore for FaultyStore {
    fn get(&self, key: &str) -> RegistryResult<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn put(&mut self, key: &str, value: &[u8]) -> RegistryResult<()> {
        self.check(key)?;
        self.writes += 1;
        self.inner.put(key, value)
    }

    fn delete(&mut self, key: &str) -> RegistryResult<()> {
        self.check(key)?;
        self.writes += 1;
        self.inner.delete(key)
    }
}
