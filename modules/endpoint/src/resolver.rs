use crate::{ConfigSource, Credential, LookupError};
use shipper_core::Shutdown;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// A validated storage address as returned by the configuration source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn parse(raw: &str) -> Result<Self, LookupError> {
        let v = raw.trim();
        if v.is_empty() {
            return Err(LookupError::InvalidEndpoint { value: raw.to_string(), reason: "empty" });
        }
        if v.chars().any(char::is_control) {
            return Err(LookupError::InvalidEndpoint { value: raw.to_string(), reason: "contains control characters" });
        }
        Ok(Endpoint(v.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opens a storage connection to an endpoint. Implementations bound the
/// attempt by `timeout`.
pub trait Connect {
    type Conn;
    type Error: std::error::Error + Send + Sync + 'static;

    fn connect(&self, endpoint: &Endpoint, credential: &Credential, timeout: Duration) -> Result<Self::Conn, Self::Error>;
}

#[derive(Debug, Error)]
pub enum AttemptError<E: std::error::Error + 'static> {
    #[error("endpoint lookup failed: {0}")]
    Lookup(#[from] LookupError),
    #[error("connect to {endpoint} failed: {source}")]
    Connect {
        endpoint: Endpoint,
        #[source]
        source: E,
    },
}

/// Fetches the current endpoint and connects, retrying with a fixed backoff
/// until it succeeds. The endpoint is looked up again on every attempt.
pub struct Resolver {
    source: Arc<dyn ConfigSource>,
    key: String,
    credential: Credential,
    connect_timeout: Duration,
    backoff: Duration,
}

impl Resolver {
    pub fn new(
        source: Arc<dyn ConfigSource>,
        key: impl Into<String>,
        credential: Credential,
        connect_timeout: Duration,
        backoff: Duration,
    ) -> Self {
        Resolver { source, key: key.into(), credential, connect_timeout, backoff }
    }

    /// One lookup + connect attempt.
    pub fn attempt<C: Connect>(&self, connector: &C) -> Result<(Endpoint, C::Conn), AttemptError<C::Error>> {
        let endpoint = Endpoint::parse(&self.source.lookup(&self.key)?)?;
        let conn = connector
            .connect(&endpoint, &self.credential, self.connect_timeout)
            .map_err(|source| AttemptError::Connect { endpoint: endpoint.clone(), source })?;
        Ok((endpoint, conn))
    }

    /// Block until a connection is obtained. Returns `None` only when
    /// shutdown is requested first.
    pub fn resolve_and_connect<C: Connect>(&self, connector: &C, shutdown: &Shutdown) -> Option<C::Conn> {
        let mut attempt: u64 = 0;
        while !shutdown.is_triggered() {
            attempt += 1;
            match self.attempt(connector) {
                Ok((endpoint, conn)) => {
                    info!(%endpoint, attempt, "connected to storage");
                    return Some(conn);
                }
                Err(e) => warn!(
                    source = %self.source.describe(),
                    key = %self.key,
                    attempt,
                    retry_in_ms = self.backoff.as_millis() as u64,
                    error = %e,
                    "storage connection failed"
                ),
            }
            if shutdown.wait(self.backoff) {
                break;
            }
        }
        None
    }
}
