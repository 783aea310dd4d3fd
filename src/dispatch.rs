//! Operation dispatch
//!
//! Maps an [`Invocation`] onto registry calls. Arity is checked before any
//! store access, so a malformed call never reads or writes anything.
//!
//! | operation            | args                                       |
//! |----------------------|--------------------------------------------|
//! | `registerChain`      | info, ip, serial, csr (base64 DER), orgs   |
//! | `getChainInfo`       | id                                         |
//! | `deleteChain`        | id                                         |
//! | `setChainOrgCACert`  | chain id, orgs                             |
//! | `getChainOrgCACert`  | chain id                                   |
//! | `updateOrgCACert`    | chain id, org name, new cert               |
//! | `setRootCertificate` | certificate (base64 DER)                   |
//! | `setRootPrivateKey`  | private key (base64 DER)                   |
//! | `generateRoot`       |                                            |
//! | `getRootCertificate` |                                            |
//!
//! `registerChain` and `generateRoot` sign certificates and take their
//! issuance time from the invocation's `timestamp`.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::chain_registry::{ChainRegistry, RegistrationRequest};
use crate::error::{RegistryError, RegistryResult};
use crate::generate_root_ca::RootSubject;
use crate::protocol::{Invocation, Response};
use crate::root_authority;
use crate::secret_key::RootKeyBytes;
use crate::storage::KeyValueStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    RegisterChain,
    GetChainInfo,
    DeleteChain,
    SetChainOrgCACert,
    GetChainOrgCACert,
    UpdateOrgCACert,
    SetRootCertificate,
    SetRootPrivateKey,
    GenerateRoot,
    GetRootCertificate,
}

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::RegisterChain,
        Operation::GetChainInfo,
        Operation::DeleteChain,
        Operation::SetChainOrgCACert,
        Operation::GetChainOrgCACert,
        Operation::UpdateOrgCACert,
        Operation::SetRootCertificate,
        Operation::SetRootPrivateKey,
        Operation::GenerateRoot,
        Operation::GetRootCertificate,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Operation::RegisterChain => "registerChain",
            Operation::GetChainInfo => "getChainInfo",
            Operation::DeleteChain => "deleteChain",
            Operation::SetChainOrgCACert => "setChainOrgCACert",
            Operation::GetChainOrgCACert => "getChainOrgCACert",
            Operation::UpdateOrgCACert => "updateOrgCACert",
            Operation::SetRootCertificate => "setRootCertificate",
            Operation::SetRootPrivateKey => "setRootPrivateKey",
            Operation::GenerateRoot => "generateRoot",
            Operation::GetRootCertificate => "getRootCertificate",
        }
    }

    /// Number of positional arguments.
    pub fn arity(self) -> usize {
        match self {
            Operation::RegisterChain => 5,
            Operation::UpdateOrgCACert => 3,
            Operation::SetChainOrgCACert => 2,
            Operation::GetChainInfo
            | Operation::DeleteChain
            | Operation::GetChainOrgCACert
            | Operation::SetRootCertificate
            | Operation::SetRootPrivateKey => 1,
            Operation::GenerateRoot | Operation::GetRootCertificate => 0,
        }
    }
}

fn decode_base64(what: &str, text: &str) -> RegistryResult<Vec<u8>> {
    STANDARD
        .decode(text.trim().as_bytes())
        .map_err(|e| RegistryError::Parse(format!("{} is not valid base64: {}", what, e)))
}

fn issuance_time(operation: Operation, timestamp: Option<i64>) -> RegistryResult<DateTime<Utc>> {
    let seconds = timestamp.ok_or_else(|| {
        RegistryError::Parse(format!("{} requires an issuance timestamp", operation.name()))
    })?;
    DateTime::<Utc>::from_timestamp(seconds, 0)
        .ok_or_else(|| RegistryError::Parse(format!("timestamp {} out of range", seconds)))
}

/// Routes invocations to the registry.
pub struct Dispatcher<S> {
    registry: ChainRegistry<S>,
    root_subject: RootSubject,
}

impl<S: KeyValueStore> Dispatcher<S> {
    pub fn new(store: S, root_subject: RootSubject) -> Self {
        Self {
            registry: ChainRegistry::new(store),
            root_subject,
        }
    }

    pub fn registry(&self) -> &ChainRegistry<S> {
        &self.registry
    }

    /// Run one invocation to completion and render the outcome.
    pub fn invoke(&mut self, invocation: &Invocation) -> Response {
        debug!(function = %invocation.function, argc = invocation.args.len(), "invoke");
        match self.handle(invocation) {
            Ok(payload) => Response::ok(payload),
            Err(err) => {
                warn!(function = %invocation.function, kind = err.kind(), "{}", err);
                Response::from(&err)
            }
        }
    }

    /// Run one invocation and return its payload.
    pub fn handle(&mut self, invocation: &Invocation) -> RegistryResult<Option<String>> {
        let operation = Operation::from_name(&invocation.function)
            .ok_or_else(|| RegistryError::UnknownOperation(invocation.function.clone()))?;
        let args = &invocation.args;
        if args.len() != operation.arity() {
            return Err(RegistryError::ArgumentCount {
                operation: operation.name().to_string(),
                expected: operation.arity(),
                got: args.len(),
            });
        }

        match operation {
            Operation::RegisterChain => {
                let issued_at = issuance_time(operation, invocation.timestamp)?;
                let csr_der = decode_base64("csr", &args[3])?;
                let receipt = self.registry.register(
                    RegistrationRequest {
                        info: &args[0],
                        ip: &args[1],
                        serial: &args[2],
                        csr_der: &csr_der,
                        org_payload: args[4].as_bytes(),
                    },
                    issued_at,
                )?;
                let json = serde_json::to_string(&receipt)
                    .map_err(|e| RegistryError::Parse(format!("encode receipt: {}", e)))?;
                Ok(Some(json))
            }
            Operation::GetChainInfo => {
                let record = self.registry.get_info(&args[0])?;
                Ok(Some(utf8_payload(record)?))
            }
            Operation::DeleteChain => {
                self.registry.delete(&args[0])?;
                Ok(None)
            }
            Operation::SetChainOrgCACert => {
                self.registry
                    .set_org_certificates(&args[0], args[1].as_bytes())?;
                Ok(None)
            }
            Operation::GetChainOrgCACert => {
                let orgs = self.registry.get_org_certificates(&args[0])?;
                Ok(Some(utf8_payload(orgs)?))
            }
            Operation::UpdateOrgCACert => {
                let updated = self
                    .registry
                    .update_org_certificate(&args[0], &args[1], &args[2])?;
                Ok(Some(serde_json::json!({ "updated": updated }).to_string()))
            }
            Operation::SetRootCertificate => {
                let certificate_der = decode_base64("root certificate", &args[0])?;
                root_authority::store_root_certificate(self.registry.store_mut(), &certificate_der)?;
                Ok(None)
            }
            Operation::SetRootPrivateKey => {
                let key = RootKeyBytes::from_der(decode_base64("root private key", &args[0])?);
                root_authority::store_root_private_key(self.registry.store_mut(), &key)?;
                Ok(None)
            }
            Operation::GenerateRoot => {
                let issued_at = issuance_time(operation, invocation.timestamp)?;
                let certificate_der = root_authority::generate_and_install(
                    self.registry.store_mut(),
                    &self.root_subject,
                    issued_at,
                )?;
                info!("Root authority generated on request");
                Ok(Some(STANDARD.encode(certificate_der)))
            }
            Operation::GetRootCertificate => {
                let certificate_der = root_authority::get_root_certificate(self.registry.store())?;
                Ok(Some(STANDARD.encode(certificate_der)))
            }
        }
    }
}

fn utf8_payload(bytes: Vec<u8>) -> RegistryResult<String> {
    String::from_utf8(bytes)
        .map_err(|e| RegistryError::Parse(format!("stored value is not UTF-8: {}", e)))
}
