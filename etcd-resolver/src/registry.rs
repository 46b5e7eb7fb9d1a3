//! An explicit registry mapping target schemes to resolver builders.

use crate::{ClientConn, ResolverError, ResolverHandle, Target};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Interface of anything that can bind a resolver for a [`Target`].
#[async_trait::async_trait]
pub trait ResolverBuilder {
    /// The target scheme this builder handles, e.g. `etcd`.
    fn scheme(&self) -> &str;

    /// Bind a resolver for `target` that reports its addresses to `conn`.
    async fn build(
        &self,
        target: &Target,
        conn: Arc<dyn ClientConn + Send + Sync>,
    ) -> Result<ResolverHandle, ResolverError>;
}

/// Resolver builders keyed by scheme, handed to [`LoadBalancedChannel`](crate::LoadBalancedChannel)
/// construction.
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    builders: HashMap<String, Arc<dyn ResolverBuilder + Send + Sync>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `builder` under its scheme, replacing any builder registered for it before.
    pub fn register<B>(&mut self, builder: B) -> &mut Self
    where
        B: ResolverBuilder + Send + Sync + 'static,
    {
        let scheme = builder.scheme().to_string();
        if self.builders.insert(scheme.clone(), Arc::new(builder)).is_some() {
            tracing::debug!(%scheme, "replaced resolver builder");
        }
        self
    }

    /// Like [`register`](Self::register), in builder style.
    pub fn with<B>(mut self, builder: B) -> Self
    where
        B: ResolverBuilder + Send + Sync + 'static,
    {
        self.register(builder);
        self
    }

    /// The builder registered for `scheme`, if any.
    pub fn get(&self, scheme: &str) -> Option<Arc<dyn ResolverBuilder + Send + Sync>> {
        self.builders.get(scheme).cloned()
    }

    /// Bind a resolver for `target` with the builder registered for its scheme.
    pub async fn build(
        &self,
        target: &Target,
        conn: Arc<dyn ClientConn + Send + Sync>,
    ) -> Result<ResolverHandle, ResolverError> {
        let builder = self
            .get(target.scheme())
            .ok_or_else(|| ResolverError::UnknownScheme(target.scheme().to_string()))?;
        builder.build(target, conn).await
    }
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("schemes", &self.builders.keys().collect::<Vec<_>>())
            .finish()
    }
}
