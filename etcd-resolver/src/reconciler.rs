//! The background task keeping a [`ClientConn`]'s addresses in sync with the
//! coordination store.
//!
//! Two paths feed the local [`AddressSet`]: watch batches give low latency
//! updates, and a periodic full snapshot repairs anything the watch missed
//! (compaction, dropped connections, partitions). Both paths report the
//! complete set to the connection whenever it changes.

use crate::address::{AddressSet, ResolvedAddress};
use crate::translate::apply_events;
use crate::{decode_record, ClientConn, CoordinationStore, ResolverOptions, WatchEvent, WatchStream};
use anyhow::Context as _;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

pub(crate) struct Reconciler<S> {
    store: S,
    prefix: String,
    conn: Arc<dyn ClientConn + Send + Sync>,
    addresses: AddressSet,
    options: ResolverOptions,
}

impl<S> Reconciler<S>
where
    S: CoordinationStore + Send + Sync + 'static,
{
    pub(crate) fn new(
        store: S,
        prefix: String,
        conn: Arc<dyn ClientConn + Send + Sync>,
        options: ResolverOptions,
    ) -> Self {
        Self {
            store,
            prefix,
            conn,
            addresses: AddressSet::default(),
            options,
        }
    }

    /// Rebuild the address set from a full read of the prefix and report it.
    ///
    /// A failed read leaves the current set untouched. A successful read is
    /// reported even when empty or unchanged.
    pub(crate) async fn snapshot(&mut self) -> Result<(), anyhow::Error> {
        let entries = tokio::time::timeout(
            self.options.snapshot_timeout,
            self.store.get_prefix(&self.prefix),
        )
        .await
        .context("timed out reading service members")?
        .context("failed to read service members")?;

        let addresses = entries
            .into_iter()
            .filter_map(|entry| match decode_record(&entry.value) {
                Ok(record) => Some(ResolvedAddress::from(record)),
                Err(err) => {
                    tracing::warn!(key = %entry.key, error = %err, "skipping undecodable member");
                    None
                }
            });
        self.addresses.replace(addresses);

        tracing::debug!("snapshot found {} addresses", self.addresses.len());
        self.report().await
    }

    /// Open a watch on the prefix. The periodic snapshot covers for a missing watch.
    ///
    /// Bounded by the snapshot timeout: an unreachable store must not hold up
    /// the snapshot that follows, nor shutdown.
    pub(crate) async fn open_watch(&self) -> Option<WatchStream> {
        let opened = tokio::time::timeout(
            self.options.snapshot_timeout,
            self.store.watch_prefix(&self.prefix),
        )
        .await;
        match opened {
            Ok(Ok(watch)) => Some(watch),
            Ok(Err(err)) => {
                tracing::warn!(error = ?err, "failed to watch service members");
                None
            }
            Err(_) => {
                tracing::warn!("timed out watching service members");
                None
            }
        }
    }

    /// Drive the reconciliation until `shutdown` fires or its sender is dropped.
    pub(crate) async fn run(
        mut self,
        mut watch: Option<WatchStream>,
        mut shutdown: oneshot::Receiver<()>,
        mut resolve_now: mpsc::Receiver<()>,
    ) {
        let period = self.options.resync_interval;
        let mut resync = tokio::time::interval_at(Instant::now() + period, period);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // Shutdown wins over buffered watch batches.
                biased;

                _ = &mut shutdown => {
                    tracing::debug!("resolver shutting down");
                    return;
                }
                batch = next_batch(&mut watch) => match batch {
                    Some(events) => self.apply(events).await,
                    None => {
                        tracing::debug!("watch closed, waiting for the next resync to reopen it");
                        watch = None;
                    }
                },
                _ = resync.tick() => {
                    if watch.is_none() {
                        watch = self.open_watch().await;
                    }
                    self.resync().await;
                }
                Some(()) = resolve_now.recv() => self.resync().await,
            }
        }
    }

    async fn apply(&mut self, events: Vec<WatchEvent>) {
        if !apply_events(&mut self.addresses, events) {
            return;
        }
        if let Err(err) = self.report().await {
            tracing::error!(error = ?err, "failed to report addresses");
        }
    }

    async fn resync(&mut self) {
        if let Err(err) = self.snapshot().await {
            tracing::warn!(error = ?err, "resync failed");
        }
    }

    async fn report(&self) -> Result<(), anyhow::Error> {
        self.conn
            .update_addresses(self.addresses.to_vec())
            .await
            .context("failed to update client connection")
    }
}

/// The next batch of the watch, or never if there is no watch.
async fn next_batch(watch: &mut Option<WatchStream>) -> Option<Vec<WatchEvent>> {
    match watch {
        Some(stream) => stream.next().await,
        None => futures::future::pending().await,
    }
}
