use etcd_resolver::{
    ClientConn, EtcdResolverBuilder, EtcdStore, Registrar, ResolvedAddress, ServerRecord,
};

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

struct PrintingConn;

#[async_trait::async_trait]
impl ClientConn for PrintingConn {
    async fn update_addresses(&self, addresses: Vec<ResolvedAddress>) -> Result<(), anyhow::Error> {
        println!("ADDRESSES={:?}", addresses);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let endpoint =
        std::env::var("ETCD_ENDPOINT").unwrap_or_else(|_| "http://127.0.0.1:2379".into());

    // Register this process as an instance of `v1/echo`; the record disappears
    // with its lease if the process dies without deregistering.
    let store = EtcdStore::connect(&[endpoint.as_str()], Duration::from_secs(3)).await?;
    let registration = Registrar::new(&store)
        .register(
            &ServerRecord::new("echo", "127.0.0.1:5000")
                .with_version("v1")
                .with_weight(1),
        )
        .await
        .context("failed to register")?;

    // Every change to the members of `v1/echo` is printed as the full list.
    let resolver = EtcdResolverBuilder::new([endpoint])
        .resync_interval(Duration::from_secs(10))
        .bind("echo", "v1", Arc::new(PrintingConn))
        .await
        .context("failed to bind resolver")?;

    tokio::signal::ctrl_c().await?;

    resolver.close().await?;
    registration.deregister().await
}
