use crate::LookupError;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A key/value lookup returning the current value for a logical name.
///
/// Values may change between calls; callers must not cache them beyond one
/// connection attempt.
pub trait ConfigSource: Send + Sync {
    fn lookup(&self, key: &str) -> Result<String, LookupError>;

    /// Human-readable name used in log lines.
    fn describe(&self) -> String;
}

/// Reads process environment variables. `db-host` maps to `DB_HOST`, or
/// `<PREFIX>_DB_HOST` when a prefix is set.
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    prefix: Option<String>,
}

impl EnvSource {
    pub fn new(prefix: Option<String>) -> Self {
        EnvSource { prefix: prefix.filter(|p| !p.is_empty()) }
    }

    pub fn var_name(&self, key: &str) -> String {
        let base = key.to_ascii_uppercase().replace(['-', '.'], "_");
        match &self.prefix {
            Some(p) => format!("{}_{base}", p.to_ascii_uppercase()),
            None => base,
        }
    }
}

impl ConfigSource for EnvSource {
    fn lookup(&self, key: &str) -> Result<String, LookupError> {
        let name = self.var_name(key);
        std::env::var(&name).map_err(|_| LookupError::Missing {
            key: key.to_string(),
            source_desc: format!("environment variable {name}"),
        })
    }

    fn describe(&self) -> String {
        match &self.prefix {
            Some(p) => format!("env({p}_*)"),
            None => "env".to_string(),
        }
    }
}

/// A YAML mapping of `key: value` re-read on every lookup, so an external
/// agent can rewrite it while workers run.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSource { path: path.into() }
    }
}

impl ConfigSource for FileSource {
    fn lookup(&self, key: &str) -> Result<String, LookupError> {
        let text = std::fs::read_to_string(&self.path)
            .map_err(|source| LookupError::Read { path: self.path.clone(), source })?;
        let map: BTreeMap<String, String> = serde_yaml::from_str(&text)
            .map_err(|source| LookupError::Yaml { path: self.path.clone(), source })?;
        map.get(key).cloned().ok_or_else(|| LookupError::Missing {
            key: key.to_string(),
            source_desc: self.describe(),
        })
    }

    fn describe(&self) -> String {
        format!("file({})", self.path.display())
    }
}

/// `GET <base_url>/<key>` against a secret/config service; the response body
/// is the value. An optional bearer token is read from an environment
/// variable at lookup time.
#[cfg(feature = "http")]
pub struct HttpSource {
    client: reqwest::blocking::Client,
    base_url: String,
    token_env: Option<String>,
}

#[cfg(feature = "http")]
impl HttpSource {
    pub fn new(base_url: &str, token_env: Option<String>, timeout: std::time::Duration) -> Result<Self, LookupError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(format!("sensor-shipper/{}", shipper_core::version()))
            .build()?;
        Ok(HttpSource { client, base_url: base_url.trim_end_matches('/').to_string(), token_env })
    }
}

#[cfg(feature = "http")]
impl ConfigSource for HttpSource {
    fn lookup(&self, key: &str) -> Result<String, LookupError> {
        let url = format!("{}/{key}", self.base_url);
        let mut req = self.client.get(&url);
        if let Some(token) = self.token_env.as_deref().and_then(|v| std::env::var(v).ok()) {
            req = req.bearer_auth(token);
        }
        let resp = req.send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(LookupError::Status { url, status: status.as_u16() });
        }
        Ok(resp.text()?)
    }

    fn describe(&self) -> String {
        format!("http({})", self.base_url)
    }
}
