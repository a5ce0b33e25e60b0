use crate::config::{Config, LookupConfig, Parser, SourceSpec};
use anyhow::{Context, Result};
use endpoint::{fetch_credential, ConfigSource, Credential, EnvSource, FileSource, Resolver};
use pipeline::{SqliteConnector, TailFile, TailWorker, WorkerSettings};
use shipper_core::Shutdown;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::{error, info, warn};

/// Environment variable holding a local credential override.
pub const CREDENTIAL_ENV: &str = "DB_PASSWORD";

pub fn build_lookup(cfg: &LookupConfig) -> Result<Arc<dyn ConfigSource>> {
    Ok(match cfg {
        LookupConfig::Env { prefix } => Arc::new(EnvSource::new(prefix.clone())),
        LookupConfig::File { path } => Arc::new(FileSource::new(path)),
        #[cfg(feature = "http")]
        LookupConfig::Http { base_url, token_env, timeout_ms } => Arc::new(endpoint::HttpSource::new(
            base_url,
            token_env.clone(),
            std::time::Duration::from_millis(*timeout_ms),
        )?),
        #[cfg(not(feature = "http"))]
        LookupConfig::Http { .. } => anyhow::bail!("config_source kind `http` requires the `http` feature"),
    })
}

/// Sends the worker's name when its thread ends, however it ends.
struct ExitNotice {
    name: String,
    tx: UnboundedSender<String>,
}

impl Drop for ExitNotice {
    fn drop(&mut self) {
        let _ = self.tx.send(std::mem::take(&mut self.name));
    }
}

fn spawn_worker(
    spec: &SourceSpec,
    resolver: Resolver,
    settings: WorkerSettings,
    shutdown: Shutdown,
    tx: UnboundedSender<String>,
) -> std::io::Result<JoinHandle<()>> {
    let builder = thread::Builder::new().name(format!("tail-{}", spec.name));
    let notice = ExitNotice { name: spec.name.clone(), tx };
    let opener = TailFile::new(&spec.path);
    match spec.format.parser() {
        Parser::Flow(format) => {
            let worker = TailWorker::new(&spec.name, format, opener, SqliteConnector, resolver, settings, shutdown);
            builder.spawn(move || {
                let _notice = notice;
                worker.run()
            })
        }
        Parser::Alert(format) => {
            let worker = TailWorker::new(&spec.name, format, opener, SqliteConnector, resolver, settings, shutdown);
            builder.spawn(move || {
                let _notice = notice;
                worker.run()
            })
        }
    }
}

/// Obtain the credential before any worker starts. Failure here is fatal.
pub fn startup_credential(cfg: &Config, lookup: &dyn ConfigSource) -> Result<Credential> {
    let local = cfg.database.credential.clone().or_else(|| std::env::var(CREDENTIAL_ENV).ok());
    fetch_credential(
        local,
        lookup,
        &cfg.database.credential_key,
        cfg.database.credential_attempts,
        cfg.database.retry_backoff(),
    )
    .with_context(|| format!("no storage credential available (set {CREDENTIAL_ENV} or `{}` in {})", cfg.database.credential_key, lookup.describe()))
}

/// Start one worker per configured source and keep the process alive until
/// a termination signal arrives or every worker thread has ended.
pub fn run(cfg: &Config) -> Result<()> {
    let lookup = build_lookup(&cfg.config_source)?;
    let credential = startup_credential(cfg, lookup.as_ref())?;
    let settings = cfg.pipeline.worker_settings();
    let shutdown = Shutdown::new();
    let rt = tokio::runtime::Runtime::new()?;
    let (tx, mut exited) = unbounded_channel::<String>();

    let mut handles = Vec::with_capacity(cfg.sources.len());
    for spec in &cfg.sources {
        let resolver = Resolver::new(
            lookup.clone(),
            &cfg.database.endpoint_key,
            credential.clone(),
            cfg.database.connect_timeout(),
            cfg.database.retry_backoff(),
        );
        let handle = spawn_worker(spec, resolver, settings, shutdown.clone(), tx.clone())
            .with_context(|| format!("spawning worker for {}", spec.name))?;
        info!(source = %spec.name, path = %spec.path.display(), format = spec.format.name(), "worker spawned");
        handles.push((spec.name.clone(), handle));
    }
    drop(tx);

    let mut alive = handles.len();
    rt.block_on(async {
        loop {
            tokio::select! {
                sig = termination_signal() => {
                    match sig {
                        Ok(name) => info!(signal = name, "shutting down"),
                        Err(e) => error!(error = %e, "signal handler failed; shutting down"),
                    }
                    break;
                }
                name = exited.recv() => match name {
                    Some(name) => {
                        alive -= 1;
                        error!(source = %name, remaining = alive, "worker exited unexpectedly");
                        if alive == 0 {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    });

    shutdown.trigger();
    for (name, handle) in handles {
        if handle.join().is_err() {
            warn!(source = %name, "worker thread panicked");
        }
    }
    info!("all workers stopped");
    Ok(())
}

#[cfg(unix)]
async fn termination_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        r = tokio::signal::ctrl_c() => r.map(|_| "SIGINT"),
        _ = term.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn termination_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|_| "ctrl-c")
}
