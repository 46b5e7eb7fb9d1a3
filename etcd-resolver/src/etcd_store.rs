//! Implements [`CoordinationStore`] for etcd.

use crate::{CoordinationStore, KeyValue, WatchEvent, WatchStream};
use anyhow::Context;
use etcd_client::{
    Client, ConnectOptions, Event, EventType, GetOptions, WatchOptions, WatchResponse,
};
use std::time::Duration;

/// Implements [`CoordinationStore`] on top of an etcd v3 cluster.
#[derive(Clone)]
pub struct EtcdStore {
    /// The client multiplexes requests over one connection, clones are cheap.
    client: Client,
}

impl EtcdStore {
    /// Connect to the etcd cluster at `endpoints`, giving up after `dial_timeout`.
    pub async fn connect<E: AsRef<str>>(
        endpoints: &[E],
        dial_timeout: Duration,
    ) -> Result<Self, anyhow::Error> {
        let options = ConnectOptions::new().with_connect_timeout(dial_timeout);
        let client = Client::connect(endpoints, Some(options))
            .await
            .context("failed to connect to etcd")?;

        Ok(Self { client })
    }

    /// Wrap an already connected client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// A handle to the underlying etcd client.
    pub fn client(&self) -> Client {
        self.client.clone()
    }
}

#[async_trait::async_trait]
impl CoordinationStore for EtcdStore {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>, anyhow::Error> {
        let mut client = self.client.clone();
        let response = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await
            .context("etcd prefix read failed")?;

        tracing::debug!(
            "read {} keys at revision {:?}",
            response.kvs().len(),
            response.header().map(|header| header.revision())
        );

        Ok(response
            .kvs()
            .iter()
            .map(|kv| KeyValue {
                key: String::from_utf8_lossy(kv.key()).into_owned(),
                value: kv.value().to_vec(),
            })
            .collect())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn watch_prefix(&self, prefix: &str) -> Result<WatchStream, anyhow::Error> {
        let mut client = self.client.clone();
        let (watcher, stream) = client
            .watch(prefix, Some(WatchOptions::new().with_prefix()))
            .await
            .context("failed to open etcd watch")?;

        // The watcher is kept alongside the stream: dropping it cancels the watch.
        let batches = futures::stream::unfold((watcher, stream), |(watcher, mut stream)| async move {
            match stream.message().await {
                Ok(Some(response)) if !response.canceled() => {
                    let events = watch_events(&response);
                    Some((events, (watcher, stream)))
                }
                Ok(Some(response)) => {
                    tracing::warn!(reason = %response.cancel_reason(), "etcd watch cancelled");
                    None
                }
                Ok(None) => {
                    tracing::debug!("etcd watch stream closed");
                    None
                }
                Err(err) => {
                    tracing::warn!(error = %err, "etcd watch stream failed");
                    None
                }
            }
        });

        Ok(Box::pin(batches))
    }
}

fn watch_events(response: &WatchResponse) -> Vec<WatchEvent> {
    response.events().iter().filter_map(watch_event).collect()
}

fn watch_event(event: &Event) -> Option<WatchEvent> {
    let kv = event.kv()?;
    let key = String::from_utf8_lossy(kv.key()).into_owned();
    match event.event_type() {
        EventType::Put => Some(WatchEvent::Put {
            key,
            value: kv.value().to_vec(),
        }),
        EventType::Delete => Some(WatchEvent::Delete { key }),
    }
}
