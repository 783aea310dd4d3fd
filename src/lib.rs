//! Federation CA - Certificate Authority and Chain Registry
//!
//! A registry for blockchain networks joining a federation. A single
//! self-signed root authority signs each chain's certificate signing request,
//! and every chain keeps a set of organization CA certificates that can be
//! replaced wholesale or updated one organization at a time. All state lives
//! in a key-value store and is reloaded for every operation.
//!
//! # Architecture
//!
//! - [`storage`]: key-value store contract and the in-memory backend
//! - [`root_authority`]: root key and certificate persistence
//! - [`generate_root_ca`]: self-signed root certificate generation
//! - [`issue_certificate`]: CSR signing under the root
//! - [`chain_registry`]: chain records and their derived identifiers
//! - [`org_certificates`]: per-chain organization certificate sets
//! - [`dispatch`]: named operations with fixed arity
//! - [`external_interface`]: Unix socket server for external requests
//!
//! # Example
//!
//! ```no_run
//! use federation_ca::dispatch::Dispatcher;
//! use federation_ca::generate_root_ca::RootSubject;
//! use federation_ca::protocol::Invocation;
//! use federation_ca::storage::MemoryStore;
//!
//! let mut dispatcher = Dispatcher::new(MemoryStore::new(), RootSubject::default());
//! let response = dispatcher.invoke(&Invocation::new("generateRoot", &[]).at(1_700_000_000));
//! assert!(response.is_success());
//! ```

pub mod chain_registry;
pub mod configs;
pub mod dispatch;
pub mod error;
pub mod external_interface;
pub mod generate_root_ca;
pub mod issue_certificate;
pub mod org_certificates;
pub mod protocol;
#[cfg(feature = "rocksdb")]
pub mod rocksdb_store;
pub mod root_authority;
pub mod secret_key;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use error::{RegistryError, RegistryResult};
