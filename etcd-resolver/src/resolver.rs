//! Binding a resolver to a service and the handle controlling its lifetime.

use crate::reconciler::Reconciler;
use crate::{
    key_prefix, ClientConn, CoordinationStore, EtcdStore, ResolverBuilder, ResolverError, Target,
    TargetError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing_futures::Instrument;

/// The scheme [`EtcdResolverBuilder`] registers under, as in `etcd://v1/search`.
pub const ETCD_SCHEME: &str = "etcd";

/// Settings of the background reconciliation.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// How often the full set of members is read back. Default 60 seconds.
    pub resync_interval: Duration,
    /// Upper bound for a full read of the members. Default 3 seconds.
    pub snapshot_timeout: Duration,
    /// How long [`ResolverHandle::close`] waits for the task. Default 5 seconds.
    pub close_timeout: Duration,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            resync_interval: Duration::from_secs(60),
            snapshot_timeout: Duration::from_secs(3),
            close_timeout: Duration::from_secs(5),
        }
    }
}

/// Controls a bound resolver. Dropping it stops the resolver without waiting.
#[derive(Debug)]
pub struct ResolverHandle {
    prefix: String,
    shutdown: Option<oneshot::Sender<()>>,
    resolve_now: mpsc::Sender<()>,
    task: JoinHandle<()>,
    close_timeout: Duration,
}

impl ResolverHandle {
    /// The key prefix the resolver watches.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Ask the resolver to read back the full set of members now.
    ///
    /// Requests made while one is pending are merged.
    pub fn resolve_now(&self) {
        let _ = self.resolve_now.try_send(());
    }

    /// Stop the resolver and wait for its task to exit.
    ///
    /// No addresses are reported once this returns. If the task does not stop
    /// within the close timeout it is aborted and an error is returned.
    pub async fn close(mut self) -> Result<(), ResolverError> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        match tokio::time::timeout(self.close_timeout, &mut self.task).await {
            Ok(joined) => Ok(joined?),
            Err(_) => {
                self.task.abort();
                Err(ResolverError::CloseTimeout(self.close_timeout))
            }
        }
    }
}

impl Drop for ResolverHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// Bind a resolver for the members stored under `prefix` in `store`.
///
/// The watch is opened first so that nothing written after the initial
/// snapshot is missed. The call returns once the snapshot has been reported
/// to `conn`; if it fails, nothing is left running. A zero resync interval
/// is rejected with [`ResolverError::InvalidOptions`].
pub async fn bind_store<S>(
    store: S,
    prefix: String,
    conn: Arc<dyn ClientConn + Send + Sync>,
    options: ResolverOptions,
) -> Result<ResolverHandle, ResolverError>
where
    S: CoordinationStore + Send + Sync + 'static,
{
    if options.resync_interval.is_zero() {
        return Err(ResolverError::InvalidOptions("resync interval must be non-zero"));
    }

    let close_timeout = options.close_timeout;
    let mut reconciler = Reconciler::new(store, prefix.clone(), conn, options);

    let watch = reconciler.open_watch().await;
    reconciler
        .snapshot()
        .await
        .map_err(|err| ResolverError::InitialSnapshot {
            prefix: prefix.clone(),
            source: err.into(),
        })?;

    let (shutdown, shutdown_signal) = oneshot::channel();
    let (resolve_now, resolve_now_requests) = mpsc::channel(1);
    let span = tracing::info_span!("resolver", %prefix);
    let task = tokio::spawn(
        reconciler
            .run(watch, shutdown_signal, resolve_now_requests)
            .instrument(span),
    );

    Ok(ResolverHandle {
        prefix,
        shutdown: Some(shutdown),
        resolve_now,
        task,
        close_timeout,
    })
}

/// Builds resolvers for services registered in an etcd cluster.
///
/// ```rust,no_run
/// # async fn run(conn: std::sync::Arc<dyn etcd_resolver::ClientConn + Send + Sync>) {
/// use etcd_resolver::EtcdResolverBuilder;
/// use std::time::Duration;
///
/// let resolver = EtcdResolverBuilder::new(["http://127.0.0.1:2379"])
///     .dial_timeout(Duration::from_secs(5))
///     .bind("search", "v1", conn)
///     .await
///     .expect("failed to bind resolver");
///
/// resolver.close().await.expect("failed to close resolver");
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct EtcdResolverBuilder {
    endpoints: Vec<String>,
    dial_timeout: Duration,
    options: ResolverOptions,
}

impl EtcdResolverBuilder {
    /// Configure a resolver reading membership from the etcd cluster at `endpoints`.
    pub fn new<I, E>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: ToString,
    {
        Self {
            endpoints: endpoints.into_iter().map(|e| e.to_string()).collect(),
            dial_timeout: Duration::from_secs(3),
            options: ResolverOptions::default(),
        }
    }

    /// Set how long connecting to etcd may take. Default 3 seconds.
    pub fn dial_timeout(self, dial_timeout: Duration) -> Self {
        Self {
            dial_timeout,
            ..self
        }
    }

    /// Set how often the full set of members is read back. Default 60 seconds.
    ///
    /// Must be non-zero, binding fails otherwise.
    pub fn resync_interval(mut self, interval: Duration) -> Self {
        self.options.resync_interval = interval;
        self
    }

    /// Set the upper bound for a full read of the members. Default 3 seconds.
    pub fn snapshot_timeout(mut self, timeout: Duration) -> Self {
        self.options.snapshot_timeout = timeout;
        self
    }

    /// Set how long closing waits for the background task. Default 5 seconds.
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.options.close_timeout = timeout;
        self
    }

    /// Connect to etcd and keep `conn` in sync with the members of `service` at `version`.
    ///
    /// `version` may be empty. Fails without leaving anything running if etcd
    /// cannot be reached or the initial read of the members fails.
    #[tracing::instrument(skip(self, conn))]
    pub async fn bind(
        &self,
        service: &str,
        version: &str,
        conn: Arc<dyn ClientConn + Send + Sync>,
    ) -> Result<ResolverHandle, ResolverError> {
        if service.is_empty() {
            let target = format!("{}://{}/", ETCD_SCHEME, version);
            return Err(TargetError::MissingService(target).into());
        }

        let store = EtcdStore::connect(self.endpoints.as_slice(), self.dial_timeout)
            .await
            .map_err(|err| ResolverError::Connect(err.into()))?;

        bind_store(store, key_prefix(service, version), conn, self.options.clone()).await
    }
}

#[async_trait::async_trait]
impl ResolverBuilder for EtcdResolverBuilder {
    fn scheme(&self) -> &str {
        ETCD_SCHEME
    }

    async fn build(
        &self,
        target: &Target,
        conn: Arc<dyn ClientConn + Send + Sync>,
    ) -> Result<ResolverHandle, ResolverError> {
        self.bind(target.service(), target.version(), conn).await
    }
}
