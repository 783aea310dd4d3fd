//! Per-chain organization certificate sets
//!
//! Each chain owns an ordered list of `{name, cert}` entries stored as a JSON
//! array under `CHAINORGS-<chain id>`:
//!
//! ```text
//! [{"name":"ORG1MSP","cert":"-----BEGIN CERTIFICATE-----..."},{"name":"ORG2MSP","cert":"..."}]
//! ```
//!
//! Payloads are normalized on every write: they must parse as that array and
//! are stored in canonical form, so a later [`update_one`] can always parse
//! what it reads back.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RegistryError, RegistryResult};
use crate::storage::KeyValueStore;

pub const ORG_SET_KEY_PREFIX: &str = "CHAINORGS-";

/// Store key of the org certificate set owned by `chain_id`.
pub fn org_set_key(chain_id: &str) -> String {
    format!("{}{}", ORG_SET_KEY_PREFIX, chain_id)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgEntry {
    pub name: String,
    pub cert: String,
}

pub fn parse_org_entries(payload: &[u8]) -> RegistryResult<Vec<OrgEntry>> {
    serde_json::from_slice(payload)
        .map_err(|e| RegistryError::Parse(format!("org certificate set: {}", e)))
}

/// Parse `payload` as org entries and re-encode it canonically.
pub fn normalize_org_payload(payload: &[u8]) -> RegistryResult<Vec<u8>> {
    let entries = parse_org_entries(payload)?;
    encode_org_entries(&entries)
}

fn encode_org_entries(entries: &[OrgEntry]) -> RegistryResult<Vec<u8>> {
    serde_json::to_vec(entries)
        .map_err(|e| RegistryError::Parse(format!("encode org certificate set: {}", e)))
}

/// Replace the whole set for `chain_id`.
pub fn set_all<S: KeyValueStore + ?Sized>(
    store: &mut S,
    chain_id: &str,
    payload: &[u8],
) -> RegistryResult<()> {
    let normalized = normalize_org_payload(payload)?;
    store.put(&org_set_key(chain_id), &normalized)?;
    debug!(chain_id, "Org certificate set replaced");
    Ok(())
}

/// Stored set for `chain_id`, as encoded bytes.
pub fn get_all<S: KeyValueStore + ?Sized>(store: &S, chain_id: &str) -> RegistryResult<Vec<u8>> {
    store.get(&org_set_key(chain_id))?.ok_or_else(|| {
        RegistryError::NotFound(format!("org certificate set for chain {}", chain_id))
    })
}

/// Replace the cert of the first entry named `org_name`.
///
/// Returns `Ok(false)` without writing when no entry has that name.
pub fn update_one<S: KeyValueStore + ?Sized>(
    store: &mut S,
    chain_id: &str,
    org_name: &str,
    new_cert: &str,
) -> RegistryResult<bool> {
    let mut entries = parse_org_entries(&get_all(store, chain_id)?)?;

    let Some(entry) = entries.iter_mut().find(|entry| entry.name == org_name) else {
        debug!(chain_id, org_name, "No org entry matched, set left unchanged");
        return Ok(false);
    };
    entry.cert = new_cert.to_string();

    store.put(&org_set_key(chain_id), &encode_org_entries(&entries)?)?;
    info!(chain_id, org_name, "Org certificate updated");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::test_support::FaultyStore;

    fn entries(store: &MemoryStore, chain_id: &str) -> Vec<OrgEntry> {
        parse_org_entries(&get_all(store, chain_id).unwrap()).unwrap()
    }

    fn entry(name: &str, cert: &str) -> OrgEntry {
        OrgEntry {
            name: name.to_string(),
            cert: cert.to_string(),
        }
    }

    #[test]
    fn test_update_replaces_only_named_entry() {
        let mut store = MemoryStore::new();
        set_all(
            &mut store,
            "chain",
            br#"[{"name":"A","cert":"c1"},{"name":"B","cert":"c2"}]"#,
        )
        .unwrap();

        assert!(update_one(&mut store, "chain", "B", "c3").unwrap());
        assert_eq!(entries(&store, "chain"), vec![entry("A", "c1"), entry("B", "c3")]);
    }

    #[test]
    fn test_update_without_match_is_noop() {
        let mut store = FaultyStore::default();
        set_all(
            &mut store,
            "chain",
            br#"[{"name":"A","cert":"c1"},{"name":"B","cert":"c2"}]"#,
        )
        .unwrap();
        let before = get_all(&store, "chain").unwrap();
        let writes = store.writes;

        assert!(!update_one(&mut store, "chain", "Z", "c4").unwrap());
        assert_eq!(get_all(&store, "chain").unwrap(), before);
        assert_eq!(store.writes, writes);
    }

    #[test]
    fn test_update_touches_first_duplicate_only() {
        let mut store = MemoryStore::new();
        set_all(
            &mut store,
            "chain",
            br#"[{"name":"A","cert":"c1"},{"name":"A","cert":"c2"}]"#,
        )
        .unwrap();

        update_one(&mut store, "chain", "A", "new").unwrap();
        assert_eq!(entries(&store, "chain"), vec![entry("A", "new"), entry("A", "c2")]);
    }

    #[test]
    fn test_update_last_entry() {
        let mut store = MemoryStore::new();
        set_all(&mut store, "chain", br#"[{"name":"ORG1MSP","cert":"c0"}]"#).unwrap();

        update_one(&mut store, "chain", "ORG1MSP", "c1").unwrap();
        assert_eq!(
            get_all(&store, "chain").unwrap(),
            br#"[{"name":"ORG1MSP","cert":"c1"}]"#.to_vec()
        );
    }

    #[test]
    fn test_empty_set_update_is_noop() {
        let mut store = MemoryStore::new();
        set_all(&mut store, "chain", b"[]").unwrap();
        assert!(!update_one(&mut store, "chain", "A", "c").unwrap());
    }

    #[test]
    fn test_unstructured_payload_rejected() {
        let mut store = FaultyStore::default();
        let result = set_all(&mut store, "chain", b"ORG1MSP:cert");
        assert!(matches!(result, Err(RegistryError::Parse(_))));
        assert_eq!(store.writes, 0);
    }

    #[test]
    fn test_payload_is_normalized() {
        let mut store = MemoryStore::new();
        set_all(
            &mut store,
            "chain",
            b"[ { \"cert\" : \"c0\", \"name\" : \"ORG1MSP\" } ]",
        )
        .unwrap();
        assert_eq!(
            get_all(&store, "chain").unwrap(),
            br#"[{"name":"ORG1MSP","cert":"c0"}]"#.to_vec()
        );
    }

    #[test]
    fn test_missing_set_is_not_found() {
        let mut store = MemoryStore::new();
        assert!(matches!(get_all(&store, "nope"), Err(RegistryError::NotFound(_))));
        assert!(matches!(
            update_one(&mut store, "nope", "A", "c"),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn test_corrupt_stored_set_is_parse_error() {
        let mut store = MemoryStore::new();
        store.put(&org_set_key("chain"), b"{not json").unwrap();
        assert!(matches!(
            update_one(&mut store, "chain", "A", "c"),
            Err(RegistryError::Parse(_))
        ));
    }
}
