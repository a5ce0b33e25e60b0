use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use eve_alerts::EveFormat;
use flow_store::MAX_BATCH_ROWS;
use pipeline::WorkerSettings;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeek_logs::FlowFormat;

pub const DEFAULT_CONFIG_FILE: &str = "shipper.yaml";
pub const DEFAULT_CONN_LOG: &str = "/opt/zeek/logs/current/conn.log";

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SourceFormat {
    Conn,
    Dhcp,
    Ssl,
    Http,
    Dns,
    Ntlm,
    EveAlert,
}

/// The parser a source format maps onto.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Parser {
    Flow(FlowFormat),
    Alert(EveFormat),
}

impl SourceFormat {
    pub fn parser(self) -> Parser {
        match self {
            SourceFormat::Conn => Parser::Flow(FlowFormat::Conn),
            SourceFormat::Dhcp => Parser::Flow(FlowFormat::Dhcp),
            SourceFormat::Ssl => Parser::Flow(FlowFormat::Ssl),
            SourceFormat::Http => Parser::Flow(FlowFormat::Http),
            SourceFormat::Dns => Parser::Flow(FlowFormat::Dns),
            SourceFormat::Ntlm => Parser::Flow(FlowFormat::Ntlm),
            SourceFormat::EveAlert => Parser::Alert(EveFormat::Alert),
        }
    }

    pub fn name(self) -> &'static str {
        match self.parser() {
            Parser::Flow(f) => f.name(),
            Parser::Alert(_) => "eve-alert",
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SourceSpec {
    pub name: String,
    pub path: PathBuf,
    pub format: SourceFormat,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub endpoint_key: String,
    pub credential_key: String,
    /// Local credential override; `DB_PASSWORD` is consulted when unset.
    pub credential: Option<String>,
    pub connect_timeout_ms: u64,
    pub retry_backoff_ms: u64,
    pub credential_attempts: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            endpoint_key: "db-host".into(),
            credential_key: "db-password".into(),
            credential: None,
            connect_timeout_ms: 5000,
            retry_backoff_ms: 5000,
            credential_attempts: 3,
        }
    }
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Where endpoint and credential values are looked up.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LookupConfig {
    Env {
        #[serde(default)]
        prefix: Option<String>,
    },
    File {
        path: PathBuf,
    },
    Http {
        base_url: String,
        #[serde(default)]
        token_env: Option<String>,
        #[serde(default = "default_http_timeout_ms")]
        timeout_ms: u64,
    },
}

fn default_http_timeout_ms() -> u64 {
    3000
}

impl Default for LookupConfig {
    fn default() -> Self {
        LookupConfig::Env { prefix: None }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub failure_backoff_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let d = WorkerSettings::default();
        PipelineConfig {
            batch_size: d.batch_size,
            flush_interval_ms: d.flush_interval.as_millis() as u64,
            failure_backoff_ms: d.failure_backoff.as_millis() as u64,
            poll_interval_ms: d.poll_interval.as_millis() as u64,
        }
    }
}

impl PipelineConfig {
    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            batch_size: self.batch_size,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            failure_backoff: Duration::from_millis(self.failure_backoff_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: DatabaseConfig,
    pub config_source: LookupConfig,
    pub pipeline: PipelineConfig,
    pub sources: Vec<SourceSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database: DatabaseConfig::default(),
            config_source: LookupConfig::default(),
            pipeline: PipelineConfig::default(),
            sources: vec![SourceSpec {
                name: "conn".into(),
                path: PathBuf::from(DEFAULT_CONN_LOG),
                format: SourceFormat::Conn,
            }],
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        if p.batch_size == 0 || p.batch_size > MAX_BATCH_ROWS {
            bail!("pipeline.batch_size must be between 1 and {MAX_BATCH_ROWS}, got {}", p.batch_size);
        }
        if p.poll_interval_ms == 0 {
            bail!("pipeline.poll_interval_ms must be greater than zero");
        }
        if self.database.endpoint_key.trim().is_empty() || self.database.credential_key.trim().is_empty() {
            bail!("database.endpoint_key and database.credential_key must not be empty");
        }
        if self.sources.is_empty() {
            bail!("no sources configured");
        }
        let mut seen = HashSet::new();
        for s in &self.sources {
            if s.name.trim().is_empty() {
                bail!("source with path {} has an empty name", s.path.display());
            }
            if !seen.insert(s.name.as_str()) {
                bail!("duplicate source name: {}", s.name);
            }
        }
        Ok(())
    }
}

/// Load and validate the configuration. An explicit `path` must exist;
/// otherwise `./shipper.yaml` is used when present, else built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new(DEFAULT_CONFIG_FILE);
            if p.exists() { p.to_path_buf() } else { return Ok(Config::default()); }
        }
    };
    let s = fs::read_to_string(&path).with_context(|| format!("reading config {}", path.display()))?;
    let cfg = parse_config(&s).with_context(|| format!("loading config {}", path.display()))?;
    Ok(cfg)
}

pub fn parse_config(s: &str) -> Result<Config> {
    let cfg: Config = serde_yaml::from_str(s)?;
    cfg.validate()?;
    Ok(cfg)
}
