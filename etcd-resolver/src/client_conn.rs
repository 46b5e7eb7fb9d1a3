//! Defines the interface the resolver reports address changes to.

use crate::ResolvedAddress;

/// A client connection whose set of server addresses is owned by a resolver.
#[async_trait::async_trait]
pub trait ClientConn {
    /// Replace the current set of addresses with `addresses`.
    ///
    /// Always called with the complete list, never a delta.
    async fn update_addresses(&self, addresses: Vec<ResolvedAddress>) -> Result<(), anyhow::Error>;
}
