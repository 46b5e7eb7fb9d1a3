//! Provides the builder and implementation of [`GrpcService`] for a channel
//! whose endpoints are owned by a resolver.

use crate::{ClientConn, ResolvedAddress, ResolverError, ResolverHandle, ResolverRegistry, Target};
use anyhow::Context as _;
use http::Request;
use std::{
    collections::HashSet,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::sync::{mpsc::Sender, Mutex};
use tokio::time::Duration;
use tonic::transport::channel::Channel;
use tonic::transport::{ClientTlsConfig, Endpoint};
use tonic::{body::BoxBody, client::GrpcService};
use tower::discover::Change;
use tower::Service;

// Determines the channel size of the channel we use
// to report endpoint changes to tonic.
// This is effectively how many changes we can report in one go.
// We set the number high to avoid any blocking on our side.
static GRPC_REPORT_ENDPOINTS_CHANNEL_SIZE: usize = 1024;

/// Implements tonic [`GrpcService`] for a client-side load balanced [`Channel`] whose
/// endpoints follow the membership a resolver reports.
///
/// ```rust,no_run
/// #[tokio::main]
/// async fn main() {
///     use etcd_resolver::{EtcdResolverBuilder, LoadBalancedChannel, ResolverRegistry};
///
///     let registry = ResolverRegistry::new()
///         .with(EtcdResolverBuilder::new(["http://127.0.0.1:2379"]));
///
///     let (channel, resolver) =
///         LoadBalancedChannel::builder("etcd://v1/search".parse().unwrap(), registry)
///             .channel()
///             .await
///             .expect("failed to construct LoadBalancedChannel");
///
///     // Hand `channel` to a generated tonic client and keep `resolver` alive as long
///     // as the channel is in use.
/// }
/// ```
#[derive(Debug, Clone)]
pub struct LoadBalancedChannel(Channel);

impl From<LoadBalancedChannel> for Channel {
    fn from(channel: LoadBalancedChannel) -> Self {
        channel.0
    }
}

impl LoadBalancedChannel {
    /// Start configuring a `LoadBalancedChannel` for `target`, e.g. `etcd://v1/search`,
    /// resolved by the builder `registry` holds for the target's scheme.
    pub fn builder(target: Target, registry: ResolverRegistry) -> LoadBalancedChannelBuilder {
        LoadBalancedChannelBuilder::new(target, registry)
    }
}

impl Service<http::Request<BoxBody>> for LoadBalancedChannel {
    type Response = http::Response<<Channel as GrpcService<BoxBody>>::ResponseBody>;
    type Error = <Channel as GrpcService<BoxBody>>::Error;
    type Future = <Channel as GrpcService<BoxBody>>::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        GrpcService::poll_ready(&mut self.0, cx)
    }

    fn call(&mut self, request: Request<BoxBody>) -> Self::Future {
        GrpcService::call(&mut self.0, request)
    }
}

/// Builder to configure and create a [`LoadBalancedChannel`].
pub struct LoadBalancedChannelBuilder {
    target: Target,
    registry: ResolverRegistry,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    tls_config: Option<ClientTlsConfig>,
}

impl LoadBalancedChannelBuilder {
    /// Configure a channel for `target`, resolved through `registry`.
    pub fn new(target: Target, registry: ResolverRegistry) -> Self {
        Self {
            target,
            registry,
            timeout: None,
            connect_timeout: None,
            tls_config: None,
        }
    }

    /// Set a request timeout that will be applied to every new `Endpoint`.
    pub fn timeout(self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..self
        }
    }

    /// Set a connection timeout that will be applied to every new `Endpoint`.
    ///
    /// Defaults to the overall request `timeout` if not set.
    pub fn connect_timeout(self, connection_timeout: Duration) -> Self {
        Self {
            connect_timeout: Some(connection_timeout),
            ..self
        }
    }

    /// Configure the channel to use tls.
    ///
    /// Servers are reached by address, so `tls_config` should carry the
    /// domain name their certificates are issued for.
    pub fn with_tls(self, tls_config: ClientTlsConfig) -> Self {
        Self {
            tls_config: Some(tls_config),
            ..self
        }
    }

    /// Bind the resolver for the target and construct the [`LoadBalancedChannel`] it feeds.
    ///
    /// The resolver stops when the returned [`ResolverHandle`] is closed or dropped.
    pub async fn channel(self) -> Result<(LoadBalancedChannel, ResolverHandle), ResolverError> {
        let (channel, sender) =
            Channel::balance_channel::<String>(GRPC_REPORT_ENDPOINTS_CHANNEL_SIZE);

        let mut conn = BalancedChannelConn::new(sender);
        conn.timeout = self.timeout;
        conn.connect_timeout = self.connect_timeout.or(self.timeout);
        conn.tls_config = self.tls_config;

        let resolver = self.registry.build(&self.target, Arc::new(conn)).await?;

        Ok((LoadBalancedChannel(channel), resolver))
    }
}

/// Implements [`ClientConn`] by turning full address lists into the endpoint
/// insertions and removals a tonic balance channel consumes.
pub struct BalancedChannelConn {
    sender: Sender<Change<String, Endpoint>>,
    endpoints: Mutex<HashSet<String>>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    tls_config: Option<ClientTlsConfig>,
}

impl BalancedChannelConn {
    /// Report to the balance channel behind `sender`, e.g. from [`Channel::balance_channel`].
    pub fn new(sender: Sender<Change<String, Endpoint>>) -> Self {
        Self {
            sender,
            endpoints: Mutex::new(HashSet::new()),
            timeout: None,
            connect_timeout: None,
            tls_config: None,
        }
    }

    fn build_endpoint(&self, addr: &str) -> Result<Endpoint, anyhow::Error> {
        let scheme = match self.tls_config {
            Some(_) => "https",
            None => "http",
        };
        let mut endpoint = Endpoint::from_shared(format!("{}://{}", scheme, addr))
            .with_context(|| format!("invalid address '{}'", addr))?;

        if let Some(timeout) = self.timeout {
            endpoint = endpoint.timeout(timeout);
        }
        if let Some(connect_timeout) = self.connect_timeout {
            endpoint = endpoint.connect_timeout(connect_timeout);
        }
        if let Some(tls_config) = &self.tls_config {
            endpoint = endpoint
                .tls_config(tls_config.clone())
                .context("failed to apply tls config")?;
        }

        Ok(endpoint)
    }
}

#[async_trait::async_trait]
impl ClientConn for BalancedChannelConn {
    #[tracing::instrument(level = "debug", skip(self, addresses), fields(count = addresses.len()))]
    async fn update_addresses(&self, addresses: Vec<ResolvedAddress>) -> Result<(), anyhow::Error> {
        let wanted: HashSet<&str> = addresses.iter().map(|a| a.addr.as_str()).collect();
        let mut endpoints = self.endpoints.lock().await;

        let removed: Vec<String> = endpoints
            .iter()
            .filter(|addr| !wanted.contains(addr.as_str()))
            .cloned()
            .collect();
        for addr in removed {
            tracing::debug!("removing endpoint {}", addr);
            self.sender
                .send(Change::Remove(addr.clone()))
                .await
                .context("balance channel is closed")?;
            endpoints.remove(&addr);
        }

        for address in &addresses {
            if endpoints.contains(&address.addr) {
                continue;
            }
            let endpoint = match self.build_endpoint(&address.addr) {
                Ok(endpoint) => endpoint,
                Err(err) => {
                    tracing::warn!(error = ?err, "skipping address");
                    continue;
                }
            };
            tracing::debug!("adding endpoint {}", address.addr);
            self.sender
                .send(Change::Insert(address.addr.clone(), endpoint))
                .await
                .context("balance channel is closed")?;
            endpoints.insert(address.addr.clone());
        }

        Ok(())
    }
}

const _: () = {
    const fn assert_is_send<T: Send>() {}
    assert_is_send::<LoadBalancedChannelBuilder>();
    assert_is_send::<LoadBalancedChannel>();
    assert_is_send::<BalancedChannelConn>();
};
