//! Encoding of server records into etcd keys and values.
//!
//! A server instance is stored under `/{name}/{version}/{addr}` (or
//! `/{name}/{addr}` without a version) with a JSON encoded [`ServerRecord`]
//! as the value.

use serde::{Deserialize, Serialize};

/// Errors produced while decoding stored keys and values.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// The stored value is not a JSON encoded [`ServerRecord`].
    #[error("invalid server record")]
    InvalidValue(#[from] serde_json::Error),
    /// The key does not end with a server address.
    #[error("key '{0}' does not contain a server address")]
    InvalidKey(String),
}

/// A server instance as registered in etcd.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    /// The logical service name.
    pub name: String,
    /// The network address the instance listens on, e.g. `10.0.0.1:9000`.
    pub addr: String,
    /// Version or tag discriminator. Empty when unversioned.
    #[serde(default)]
    pub version: String,
    /// Relative weight of the instance.
    #[serde(default)]
    pub weight: i64,
}

impl ServerRecord {
    /// Create a record for `name` listening on `addr`, without a version and with weight 0.
    pub fn new<N: ToString, A: ToString>(name: N, addr: A) -> Self {
        Self {
            name: name.to_string(),
            addr: addr.to_string(),
            version: String::new(),
            weight: 0,
        }
    }

    /// Set the version discriminator.
    pub fn with_version<V: ToString>(self, version: V) -> Self {
        Self {
            version: version.to_string(),
            ..self
        }
    }

    /// Set the weight.
    pub fn with_weight(self, weight: i64) -> Self {
        Self { weight, ..self }
    }
}

/// The key prefix scoping all the instances of `name` at `version`.
///
/// ```
/// assert_eq!(etcd_resolver::key_prefix("search", ""), "/search/");
/// assert_eq!(etcd_resolver::key_prefix("search", "v1"), "/search/v1/");
/// ```
pub fn key_prefix(name: &str, version: &str) -> String {
    if version.is_empty() {
        format!("/{}/", name)
    } else {
        format!("/{}/{}/", name, version)
    }
}

/// The key a [`ServerRecord`] is registered under.
pub fn registration_key(record: &ServerRecord) -> String {
    format!("{}{}", key_prefix(&record.name, &record.version), record.addr)
}

/// Encode a [`ServerRecord`] into a stored value.
pub fn encode_record(record: &ServerRecord) -> Result<Vec<u8>, RecordError> {
    Ok(serde_json::to_vec(record)?)
}

/// Decode a stored value into a [`ServerRecord`].
pub fn decode_record(value: &[u8]) -> Result<ServerRecord, RecordError> {
    Ok(serde_json::from_slice(value)?)
}

/// Recover the server address from a registration key.
///
/// Values are gone once a key is deleted, so removals are matched on the
/// last path segment of the key.
pub fn decode_addr_from_key(key: &str) -> Result<String, RecordError> {
    match key.rsplit('/').next() {
        Some(addr) if !addr.is_empty() => Ok(addr.to_string()),
        _ => Err(RecordError::InvalidKey(key.to_string())),
    }
}
