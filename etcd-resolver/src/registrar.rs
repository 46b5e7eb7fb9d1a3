//! Registers server instances in etcd so that resolvers can find them.
//!
//! Each registration is attached to a lease; a background task keeps the
//! lease alive, so a crashed server disappears once its lease expires.

use crate::{encode_record, registration_key, EtcdStore, ServerRecord};
use anyhow::Context;
use etcd_client::{Client, PutOptions};
use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing_futures::Instrument;

/// Writes [`ServerRecord`]s into etcd under leases of a fixed time-to-live.
#[derive(Clone)]
pub struct Registrar {
    client: Client,
    ttl: Duration,
}

impl Registrar {
    /// Register through `store`'s connection with a lease time-to-live of 10 seconds.
    pub fn new(store: &EtcdStore) -> Self {
        Self {
            client: store.client(),
            ttl: Duration::from_secs(10),
        }
    }

    /// Set the lease time-to-live. Rounded up to whole seconds, at least one.
    pub fn ttl(self, ttl: Duration) -> Self {
        Self { ttl, ..self }
    }

    fn ttl_secs(&self) -> i64 {
        let secs = self.ttl.as_secs() + u64::from(self.ttl.subsec_nanos() > 0);
        secs.max(1) as i64
    }

    /// Store `record` under its registration key and keep it alive until deregistered.
    #[tracing::instrument(skip(self), fields(key = %registration_key(record)))]
    pub async fn register(&self, record: &ServerRecord) -> Result<Registration, anyhow::Error> {
        let mut client = self.client.clone();
        let key = registration_key(record);
        let value = encode_record(record)?;

        let lease = client
            .lease_grant(self.ttl_secs(), None)
            .await
            .context("failed to grant lease")?;
        let lease_id = lease.id();

        client
            .put(key.clone(), value, Some(PutOptions::new().with_lease(lease_id)))
            .await
            .context("failed to store server record")?;

        let (stop, stopped) = oneshot::channel();
        let keep_alive = tokio::spawn(
            keep_alive(client.clone(), lease_id, self.ttl / 3, stopped)
                .instrument(tracing::info_span!("lease", id = lease_id)),
        );

        tracing::debug!("registered with lease {}", lease_id);
        Ok(Registration {
            client,
            key,
            lease_id,
            stop: Some(stop),
            keep_alive,
        })
    }
}

/// A live registration. Dropping it stops renewing the lease, which lets the key expire.
pub struct Registration {
    client: Client,
    key: String,
    lease_id: i64,
    stop: Option<oneshot::Sender<()>>,
    keep_alive: JoinHandle<()>,
}

impl Registration {
    /// The key the record is stored under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Remove the record right away and release its lease.
    pub async fn deregister(mut self) -> Result<(), anyhow::Error> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = (&mut self.keep_alive).await;

        self.client
            .delete(self.key.clone(), None)
            .await
            .context("failed to delete server record")?;
        self.client
            .lease_revoke(self.lease_id)
            .await
            .context("failed to revoke lease")?;
        Ok(())
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

async fn keep_alive(
    mut client: Client,
    lease_id: i64,
    every: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    let (mut keeper, mut responses) =
        match until_stopped(&mut stop, client.lease_keep_alive(lease_id)).await {
            None => return,
            Some(Ok(keep_alive)) => keep_alive,
            Some(Err(err)) => {
                tracing::error!(error = %err, "failed to start lease keep-alive");
                return;
            }
        };

    let mut ticker = tokio::time::interval(every.max(Duration::from_millis(100)));
    loop {
        if until_stopped(&mut stop, ticker.tick()).await.is_none() {
            return;
        }
        match until_stopped(&mut stop, keeper.keep_alive()).await {
            None => return,
            Some(Ok(())) => {}
            Some(Err(err)) => {
                tracing::error!(error = %err, "failed to renew lease");
                return;
            }
        }
        // A partitioned cluster never answers; stopping must still be possible.
        match until_stopped(&mut stop, responses.message()).await {
            None => return,
            Some(Ok(Some(response))) => tracing::trace!("lease renewed, ttl {}", response.ttl()),
            Some(Ok(None)) => {
                tracing::warn!("lease keep-alive stream closed");
                return;
            }
            Some(Err(err)) => {
                tracing::error!(error = %err, "failed to renew lease");
                return;
            }
        }
    }
}

/// Drive `fut` to completion unless `stop` fires, or its sender is dropped, first.
async fn until_stopped<F>(stop: &mut oneshot::Receiver<()>, fut: F) -> Option<F::Output>
where
    F: Future,
{
    tokio::select! {
        biased;

        _ = stop => None,
        output = fut => Some(output),
    }
}
