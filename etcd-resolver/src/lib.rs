//! `etcd-resolver` keeps the set of `gRPC` servers behind a tonic
//! [`Channel`](tonic::transport::Channel) in sync with the service membership
//! recorded in etcd.
//!
//! # Simple example
//!
//! ```rust,no_run
//! #[tokio::main]
//! async fn main() {
//!     use etcd_resolver::{EtcdResolverBuilder, LoadBalancedChannel, ResolverRegistry};
//!
//!     let registry = ResolverRegistry::new()
//!         .with(EtcdResolverBuilder::new(["http://127.0.0.1:2379"]));
//!
//!     // Resolve the `v1` instances of the `search` service.
//!     let (channel, resolver) =
//!         LoadBalancedChannel::builder("etcd://v1/search".parse().unwrap(), registry)
//!             .timeout(std::time::Duration::from_secs(10))
//!             .channel()
//!             .await
//!             .expect("failed to construct LoadBalancedChannel");
//!
//!     // let client = SearchClient::new(channel);
//!
//!     resolver.close().await.expect("failed to stop the resolver");
//! }
//! ```
//!
//! Servers make themselves known through a [`Registrar`], which stores a
//! [`ServerRecord`] under a lease that is kept alive while the server runs.
//!
//! ```rust,no_run
//! #[tokio::main]
//! async fn main() -> Result<(), anyhow::Error> {
//!     use etcd_resolver::{EtcdStore, Registrar, ServerRecord};
//!     use std::time::Duration;
//!
//!     let store = EtcdStore::connect(&["http://127.0.0.1:2379"], Duration::from_secs(3)).await?;
//!     let record = ServerRecord::new("search", "10.0.0.1:9000")
//!         .with_version("v1")
//!         .with_weight(5);
//!
//!     let registration = Registrar::new(&store).register(&record).await?;
//!     // ... serve ...
//!     registration.deregister().await
//! }
//! ```
//!
//! Anything implementing [`ClientConn`] can be kept in sync, and anything
//! implementing [`CoordinationStore`] can be the source of truth.
//!
//! ```rust
//! use etcd_resolver::{ClientConn, ResolvedAddress};
//!
//! // Prints every address list it is given.
//! struct PrintingConn;
//!
//! #[async_trait::async_trait]
//! impl ClientConn for PrintingConn {
//!     async fn update_addresses(
//!         &self,
//!         addresses: Vec<ResolvedAddress>,
//!     ) -> Result<(), anyhow::Error> {
//!         println!("{:?}", addresses);
//!         Ok(())
//!     }
//! }
//! ```
//!
//! # Internals
//! A resolver is bound by reading the service's key prefix once; the call
//! fails if that read fails. A background task then merges two sources
//! into the address list:
//!
//! * an etcd watch on the prefix, applied batch by batch as it arrives;
//! * a full read of the prefix every [`ResolverOptions::resync_interval`],
//!   which replaces the list and repairs whatever the watch missed.
//!
//! Each change is reported as the complete list. [`BalancedChannelConn`]
//! turns those lists into the endpoint changes tonic's
//! [`balance_channel`](tonic::transport::Channel::balance_channel) consumes.

mod address;
mod balanced_channel;
mod client_conn;
mod error;
mod etcd_store;
mod reconciler;
mod record;
mod registrar;
mod registry;
mod resolver;
mod store;
mod target;
mod translate;

pub use address::ResolvedAddress;
pub use balanced_channel::*;
pub use client_conn::*;
pub use error::*;
pub use etcd_store::*;
pub use record::*;
pub use registrar::*;
pub use registry::*;
pub use resolver::*;
pub use store::*;
pub use target::*;
