//! Protocol Module
//!
//! Wire types for the registry socket: an [`Invocation`] names an operation
//! and carries positional string arguments, a [`Response`] carries either a
//! text payload or a typed error. Messages are JSON prefixed with a 4-byte
//! little-endian length.

use std::io::{Read, Write};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Upper bound on a single frame body.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// A named operation with positional arguments.
///
/// `timestamp` (unix seconds) is the issuance time for operations that sign
/// certificates. It is not a positional argument and does not count towards
/// arity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Invocation {
    pub function: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Invocation {
    pub fn new(function: &str, args: &[&str]) -> Self {
        Self {
            function: function.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            timestamp: None,
        }
    }

    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Response sent back to clients
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "status")]
pub enum Response {
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<String>,
    },
    Error {
        kind: String,
        message: String,
    },
}

impl Response {
    pub fn ok(payload: Option<String>) -> Self {
        Response::Success { payload }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success { .. })
    }
}

impl From<&RegistryError> for Response {
    fn from(err: &RegistryError) -> Self {
        Response::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Serde adapter writing byte fields as standard base64 strings.
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text.as_bytes()).map_err(serde::de::Error::custom)
    }
}

fn frame(json: String) -> Vec<u8> {
    let json_bytes = json.as_bytes();
    let mut buffer = Vec::with_capacity(4 + json_bytes.len());
    buffer.extend_from_slice(&(json_bytes.len() as u32).to_le_bytes());
    buffer.extend_from_slice(json_bytes);
    buffer
}

/// Serialize an Invocation to a length-prefixed byte array
pub fn serialize_invocation(invocation: &Invocation) -> Result<Vec<u8>> {
    let json =
        serde_json::to_string(invocation).context("Failed to serialize invocation to JSON")?;
    Ok(frame(json))
}

/// Deserialize a frame body (without length prefix) to an Invocation
pub fn deserialize_invocation(bytes: &[u8]) -> Result<Invocation> {
    let json_str =
        std::str::from_utf8(bytes).context("Failed to decode invocation bytes as UTF-8")?;
    serde_json::from_str(json_str).context("Failed to deserialize JSON to Invocation")
}

/// Serialize a Response to a length-prefixed byte array
pub fn serialize_response(response: &Response) -> Result<Vec<u8>> {
    let json = serde_json::to_string(response).context("Failed to serialize response to JSON")?;
    Ok(frame(json))
}

/// Deserialize a frame body (without length prefix) to a Response
pub fn deserialize_response(bytes: &[u8]) -> Result<Response> {
    let json_str =
        std::str::from_utf8(bytes).context("Failed to decode response bytes as UTF-8")?;
    serde_json::from_str(json_str).context("Failed to deserialize JSON to Response")
}

/// Read one length-prefixed frame body.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .context("Failed to read frame length")?;
    let len = u32::from_le_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        bail!("Frame of {} bytes exceeds limit of {} bytes", len, MAX_FRAME_LEN);
    }
    let mut buf = vec![0u8; len as usize];
    reader
        .read_exact(&mut buf)
        .context("Failed to read frame body")?;
    Ok(buf)
}

pub fn write_frame<W: Write>(writer: &mut W, framed: &[u8]) -> Result<()> {
    writer.write_all(framed).context("Failed to write frame")?;
    writer.flush().context("Failed to flush frame")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_serialize_invocation() {
        let invocation = Invocation::new("getChainInfo", &["abc"]);
        let bytes = serialize_invocation(&invocation).unwrap();

        let length = u32::from_le_bytes(bytes[..4].try_into().unwrap());
        assert!(length > 0);
        assert_eq!(bytes.len(), (length + 4) as usize);
    }

    #[test]
    fn test_framed_invocation_reads_back() {
        let invocation = Invocation::new("registerChain", &["a", "b", "c", "d", "e"]).at(1_700_000_000);
        let bytes = serialize_invocation(&invocation).unwrap();

        let body = read_frame(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(deserialize_invocation(&body).unwrap(), invocation);
    }

    #[test]
    fn test_missing_args_and_timestamp_default() {
        let invocation = deserialize_invocation(br#"{"function":"getRootCertificate"}"#).unwrap();
        assert!(invocation.args.is_empty());
        assert_eq!(invocation.timestamp, None);
    }

    #[test]
    fn test_deserialize_response() {
        let json = r#"{"status":"Error","kind":"NotFoundError","message":"Not found: chain x"}"#;
        let response = deserialize_response(json.as_bytes()).unwrap();

        if let Response::Error { kind, message } = response {
            assert_eq!(kind, "NotFoundError");
            assert!(message.contains("chain x"));
        } else {
            panic!("Wrong response type");
        }
    }

    #[test]
    fn test_success_without_payload_omits_field() {
        let bytes = serialize_response(&Response::ok(None)).unwrap();
        assert_eq!(&bytes[4..], br#"{"status":"Success"}"#);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut bytes = (MAX_FRAME_LEN + 1).to_le_bytes().to_vec();
        bytes.extend_from_slice(b"{}");
        assert!(read_frame(&mut Cursor::new(bytes)).is_err());
    }
}
