use crate::TargetError;
use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned while binding, building or closing a resolver.
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    /// The target does not name a service.
    #[error("invalid resolver target")]
    InvalidTarget(#[from] TargetError),
    /// No [`ResolverBuilder`](crate::ResolverBuilder) is registered for the target's scheme.
    #[error("no resolver registered for scheme '{0}'")]
    UnknownScheme(String),
    /// A [`ResolverOptions`](crate::ResolverOptions) value the resolver cannot run with.
    #[error("invalid resolver options: {0}")]
    InvalidOptions(&'static str),
    /// The coordination store could not be reached.
    #[error("failed to connect to the coordination store")]
    Connect(#[source] BoxError),
    /// The first full read of the service's members failed.
    #[error("initial snapshot of '{prefix}' failed")]
    InitialSnapshot {
        prefix: String,
        #[source]
        source: BoxError,
    },
    /// The background task did not observe the shutdown signal in time.
    #[error("resolver task did not stop within {0:?}")]
    CloseTimeout(Duration),
    /// The background task panicked.
    #[error("resolver task failed")]
    Task(#[from] tokio::task::JoinError),
}
