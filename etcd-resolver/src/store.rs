//! Defines the interface the resolver requires from the coordination store
//! holding service membership.

use futures::stream::BoxStream;

/// A key and its value, as returned by a prefix read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
}

/// A single change to a key under a watched prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The key was created or updated.
    Put { key: String, value: Vec<u8> },
    /// The key was removed. Deleted keys carry no value.
    Delete { key: String },
}

/// Batches of [`WatchEvent`]s in the order the store delivered them.
///
/// The stream ends when the watch is cancelled or the connection drops.
pub type WatchStream = BoxStream<'static, Vec<WatchEvent>>;

/// Interface to a key-value store offering prefix reads and prefix watches.
#[async_trait::async_trait]
pub trait CoordinationStore {
    /// Return every key-value pair whose key starts with `prefix`.
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>, anyhow::Error>;

    /// Subscribe to changes of keys starting with `prefix`, from now on.
    async fn watch_prefix(&self, prefix: &str) -> Result<WatchStream, anyhow::Error>;
}
