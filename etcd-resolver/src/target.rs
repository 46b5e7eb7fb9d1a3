//! Parsing of `scheme://[version]/service` resolver targets.

use std::fmt;
use std::str::FromStr;

/// Errors produced while parsing a [`Target`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("target '{0}' has no scheme")]
    MissingScheme(String),
    #[error("target '{0}' does not name a service")]
    MissingService(String),
}

/// The service a channel resolves, e.g. `etcd://v1/search` or `etcd:///search`.
///
/// The authority carries the optional version discriminator and the path the
/// service name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    scheme: String,
    version: String,
    service: String,
}

impl Target {
    /// Create a [`Target`] from its parts.
    ///
    /// Fails if `service` is empty.
    pub fn from_parts<S, V, N>(scheme: S, version: V, service: N) -> Result<Self, TargetError>
    where
        S: ToString,
        V: ToString,
        N: ToString,
    {
        let target = Self {
            scheme: scheme.to_string(),
            version: version.to_string(),
            service: service.to_string(),
        };
        if target.scheme.is_empty() {
            return Err(TargetError::MissingScheme(target.to_string()));
        }
        if target.service.is_empty() {
            return Err(TargetError::MissingService(target.to_string()));
        }
        Ok(target)
    }

    /// Get the scheme used to pick a [`ResolverBuilder`](crate::ResolverBuilder).
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Get the version discriminator. Empty when the target has none.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Get the logical service name.
    pub fn service(&self) -> &str {
        &self.service
    }
}

impl FromStr for Target {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| TargetError::MissingScheme(s.to_string()))?;
        if scheme.is_empty() {
            return Err(TargetError::MissingScheme(s.to_string()));
        }
        let (version, service) = rest.split_once('/').unwrap_or((rest, ""));

        Self::from_parts(scheme, version, service.trim_start_matches('/'))
            .map_err(|_| TargetError::MissingService(s.to_string()))
    }
}

/// ```
/// let target: etcd_resolver::Target = "etcd://v1/search".parse().unwrap();
/// assert_eq!(target.to_string(), "etcd://v1/search");
/// ```
impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.version, self.service)
    }
}

impl TryFrom<&str> for Target {
    type Error = TargetError;

    fn try_from(target: &str) -> Result<Self, Self::Error> {
        target.parse()
    }
}

impl TryFrom<String> for Target {
    type Error = TargetError;

    fn try_from(target: String) -> Result<Self, Self::Error> {
        target.parse()
    }
}
