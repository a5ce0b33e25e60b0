use anyhow::{bail, Context, Result};
use clap::{Parser as _, Subcommand};
use flow_store::{Db, ALERT_COLUMNS, FLOW_COLUMNS};
use pipeline::LineParser;
use serde::Serialize;
use shipper_core::{AlertRecord, FlowRecord, Table};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod supervisor;

use config::{Parser, SourceFormat, SourceSpec};

#[derive(Debug, clap::Parser)]
#[command(name = "shipper", version, about = "Tail network sensor logs into the flow and alert tables")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./shipper.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log level used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Run one worker per configured source until interrupted
    Run,
    /// Run a single worker for one file, ignoring the configured sources
    Tail {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, value_enum)]
        format: SourceFormat,
        /// Source name used in log lines (default: the format name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Parse a log file offline and print canonical records (JSON lines)
    Parse {
        #[arg(long, value_enum)]
        format: SourceFormat,
        file: PathBuf,
        /// Write CSV instead of JSON lines
        #[arg(long, default_value_t = false)]
        csv: bool,
    },
    /// Row counts and newest timestamps of a database (JSON)
    Stats {
        #[arg(long)]
        database: PathBuf,
    },
}

fn init_logging(level: &str) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    match cli.command {
        Commands::Version => {
            println!("shipper {} (core {})", env!("CARGO_PKG_VERSION"), shipper_core::version());
        }
        Commands::Run => {
            let cfg = config::load_config(cli.config.as_deref())?;
            info!(sources = cfg.sources.len(), "starting shipper");
            supervisor::run(&cfg)?;
        }
        Commands::Tail { file, format, name } => {
            let mut cfg = config::load_config(cli.config.as_deref())?;
            cfg.sources = vec![SourceSpec {
                name: name.unwrap_or_else(|| format.name().to_string()),
                path: file,
                format,
            }];
            cfg.validate()?;
            supervisor::run(&cfg)?;
        }
        Commands::Parse { format, file, csv } => {
            let input = BufReader::new(File::open(&file).with_context(|| format!("opening {}", file.display()))?);
            let stdout = io::stdout();
            let tally = match format.parser() {
                Parser::Flow(f) => parse_file(input, &f, stdout.lock(), csv, FLOW_COLUMNS, flow_row)?,
                Parser::Alert(e) => parse_file(input, &e, stdout.lock(), csv, ALERT_COLUMNS, alert_row)?,
            };
            eprintln!(
                "{}: {} lines, {} records, {} skipped, {} rejected",
                file.display(),
                tally.lines,
                tally.records,
                tally.skipped,
                tally.rejected
            );
        }
        Commands::Stats { database } => {
            println!("{}", serde_json::to_string(&stats(&database)?)?);
        }
    }
    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Tally {
    lines: u64,
    records: u64,
    skipped: u64,
    rejected: u64,
}

fn parse_file<P, R, W>(
    input: R,
    parser: &P,
    out: W,
    as_csv: bool,
    columns: &[&str],
    to_row: fn(&P::Record) -> Vec<String>,
) -> Result<Tally>
where
    P: LineParser,
    P::Record: Serialize,
    R: BufRead,
    W: Write,
{
    let mut tally = Tally::default();
    let mut csv_out = None;
    let mut json_out = None;
    if as_csv {
        let mut w = csv::Writer::from_writer(out);
        w.write_record(columns)?;
        csv_out = Some(w);
    } else {
        json_out = Some(out);
    }
    for line in input.lines() {
        let line = line?;
        tally.lines += 1;
        match parser.parse_line(&line) {
            Ok(rec) => {
                tally.records += 1;
                if let Some(w) = csv_out.as_mut() {
                    w.write_record(to_row(&rec))?;
                } else if let Some(w) = json_out.as_mut() {
                    writeln!(w, "{}", serde_json::to_string(&rec)?)?;
                }
            }
            Err(r) if r.is_expected() => tally.skipped += 1,
            Err(r) => {
                tally.rejected += 1;
                tracing::debug!(line = tally.lines, reason = %r, "rejected");
            }
        }
    }
    if let Some(mut w) = csv_out {
        w.flush()?;
    }
    Ok(tally)
}

fn opt<T: ToString>(v: Option<T>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

fn flow_row(r: &FlowRecord) -> Vec<String> {
    vec![
        r.ts.to_string(),
        r.unique_id.clone(),
        r.source_ip.clone(),
        r.source_port.to_string(),
        r.destination_ip.clone(),
        r.destination_port.to_string(),
        r.protocol.clone(),
        r.service.clone(),
        opt(r.duration),
        opt(r.bytes_sent),
        opt(r.bytes_received),
        r.conn_state.clone(),
        serde_json::to_string(&r.extra_fields).unwrap_or_default(),
    ]
}

fn alert_row(r: &AlertRecord) -> Vec<String> {
    vec![
        r.ts.to_string(),
        r.unique_id.clone(),
        r.source_ip.clone(),
        r.destination_ip.clone(),
        r.signature_id.to_string(),
        r.signature.clone(),
        r.severity.to_string(),
        r.payload.to_string(),
    ]
}

#[derive(Debug, Serialize)]
struct TableStats {
    table: Table,
    rows: i64,
    latest_ts: Option<f64>,
}

#[derive(Debug, Serialize)]
struct DbStats {
    database: PathBuf,
    tables: Vec<TableStats>,
}

fn stats(path: &Path) -> Result<DbStats> {
    if !path.exists() {
        bail!("database {} does not exist", path.display());
    }
    let db = Db::open_or_create(path, Duration::from_secs(5))?;
    let mut tables = Vec::new();
    for table in [Table::Flows, Table::Alerts] {
        tables.push(TableStats { table, rows: db.count_rows(table)?, latest_ts: db.latest_ts(table)? });
    }
    Ok(DbStats { database: path.to_path_buf(), tables })
}
