use crate::{Batch, Canonical, LineParser, LineSource, OpenSource, Sink, SinkError};
use endpoint::{Connect, Resolver};
use shipper_core::{Shutdown, Table};
use std::io;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub failure_backoff: Duration,
    pub poll_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        WorkerSettings {
            batch_size: 100,
            flush_interval: Duration::from_secs(5),
            failure_backoff: Duration::from_secs(10),
            poll_interval: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("reading {source_desc}: {source}")]
    Read {
        source_desc: String,
        #[source]
        source: io::Error,
    },
    #[error("writing {rows} rows to {table}: {source}")]
    Write {
        table: Table,
        rows: usize,
        #[source]
        source: SinkError,
    },
    #[error("committing {rows} rows to {table}: {source}")]
    Commit {
        table: Table,
        rows: usize,
        #[source]
        source: SinkError,
    },
}

/// Counters for one streaming session (one connection).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub lines: u64,
    pub skipped: u64,
    pub rejected: u64,
    pub batches: u64,
    pub inserted: u64,
    pub duplicates: u64,
}

/// Tails one source into one table. Each worker owns its connection, its
/// batch and its line source; nothing is shared with other workers except
/// the shutdown signal.
///
/// The worker cycles connecting → streaming → failed → connecting until
/// shutdown. Any read, write or commit error while streaming drops the
/// connection together with the unflushed batch.
pub struct TailWorker<P, O, C> {
    name: String,
    parser: P,
    opener: O,
    connector: C,
    resolver: Resolver,
    settings: WorkerSettings,
    shutdown: Shutdown,
}

impl<P, O, C> TailWorker<P, O, C>
where
    P: LineParser,
    O: OpenSource,
    C: Connect,
    C::Conn: Sink,
{
    pub fn new(
        name: impl Into<String>,
        parser: P,
        opener: O,
        connector: C,
        resolver: Resolver,
        settings: WorkerSettings,
        shutdown: Shutdown,
    ) -> Self {
        TailWorker { name: name.into(), parser, opener, connector, resolver, settings, shutdown }
    }

    /// Run until shutdown. Never returns early on storage or source errors.
    pub fn run(self) {
        let span = info_span!("worker", source = %self.name, format = self.parser.format_name());
        let _enter = span.enter();
        info!(input = %self.opener.describe(), table = %P::Record::TABLE, "worker starting");

        loop {
            let Some(mut conn) = self.resolver.resolve_and_connect(&self.connector, &self.shutdown) else {
                break;
            };
            match self.stream(&mut conn) {
                Ok(stats) => {
                    info!(?stats, "stream closed for shutdown");
                    break;
                }
                Err(e) => {
                    drop(conn);
                    error!(
                        input = %self.opener.describe(),
                        error = %e,
                        retry_in_ms = self.settings.failure_backoff.as_millis() as u64,
                        "ingestion failed; dropping connection"
                    );
                    if self.shutdown.wait(self.settings.failure_backoff) {
                        break;
                    }
                }
            }
        }
        info!("worker stopped");
    }

    fn stream(&self, conn: &mut C::Conn) -> Result<SessionStats, WorkerError> {
        let read_err = |source| WorkerError::Read { source_desc: self.opener.describe(), source };
        let mut lines = self.opener.open_at_end().map_err(read_err)?;
        let mut batch = Batch::new(self.settings.batch_size, self.settings.flush_interval);
        let mut last_flush = Instant::now();
        let mut stats = SessionStats::default();

        loop {
            if self.shutdown.is_triggered() {
                if !batch.is_empty() {
                    if let Err(e) = self.flush(conn, &mut batch, &mut stats) {
                        warn!(error = %e, "final flush failed; batch discarded");
                    }
                }
                return Ok(stats);
            }

            match lines.next_line().map_err(read_err)? {
                Some(line) => {
                    stats.lines += 1;
                    match self.parser.parse_line(&line) {
                        Ok(record) => batch.add(record),
                        Err(reason) if reason.is_expected() => stats.skipped += 1,
                        Err(reason) => {
                            stats.rejected += 1;
                            debug!(%reason, "dropping malformed line");
                        }
                    }
                }
                None => {
                    // Shutdown is picked up at the top of the loop.
                    self.shutdown.wait(self.settings.poll_interval);
                }
            }

            if batch.should_flush(last_flush.elapsed()) {
                self.flush(conn, &mut batch, &mut stats)?;
                last_flush = Instant::now();
            }
        }
    }

    fn flush(
        &self,
        conn: &mut C::Conn,
        batch: &mut Batch<P::Record>,
        stats: &mut SessionStats,
    ) -> Result<(), WorkerError> {
        let table = P::Record::TABLE;
        let rows = batch.len();
        let inserted = P::Record::write_batch(conn, batch.records())
            .map_err(|source| WorkerError::Write { table, rows, source })?;
        conn.commit().map_err(|source| WorkerError::Commit { table, rows, source })?;
        batch.clear();

        let duplicates = rows.saturating_sub(inserted);
        stats.batches += 1;
        stats.inserted += inserted as u64;
        stats.duplicates += duplicates as u64;
        info!(%table, rows, inserted, duplicates, rejected = stats.rejected, "flushed batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use endpoint::{ConfigSource, Credential, Endpoint, FileSource, LookupError};
    use flow_store::Db;
    use shipper_core::{AlertRecord, FlowRecord};
    use std::collections::VecDeque;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use tempfile::TempDir;
    use zeek_logs::FlowFormat;

    use crate::{SqliteConnector, TailFile};

    const GOOD_A: &str = "1700000000.1\tCa\t10.0.0.5\t51000\t93.184.216.34\t443\ttcp\tssl\t1.2\t500\t1500\tSF";
    const GOOD_B: &str = "1700000001.1\tCb\t10.0.0.6\t51001\t93.184.216.34\t80\ttcp\thttp\t0.3\t100\t900\tSF";
    const GOOD_C: &str = "1700000002.1\tCc\t10.0.0.7\t51002\t8.8.8.8\t53\tudp\tdns\t-\t-\t-\tS0";

    struct Fixed(&'static str);

    impl ConfigSource for Fixed {
        fn lookup(&self, _key: &str) -> Result<String, LookupError> {
            Ok(self.0.to_string())
        }
        fn describe(&self) -> String {
            "fixed".into()
        }
    }

    /// Counts every endpoint lookup it answers.
    struct Counting {
        endpoint: &'static str,
        lookups: Arc<AtomicU32>,
    }

    impl ConfigSource for Counting {
        fn lookup(&self, _key: &str) -> Result<String, LookupError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.endpoint.to_string())
        }
        fn describe(&self) -> String {
            "counting".into()
        }
    }

    fn resolver(source: Arc<dyn ConfigSource>) -> Resolver {
        Resolver::new(source, "db-host", Credential::new("pw"), Duration::from_millis(500), Duration::from_millis(5))
    }

    fn fast_settings(batch_size: usize, flush_interval: Duration) -> WorkerSettings {
        WorkerSettings {
            batch_size,
            flush_interval,
            failure_backoff: Duration::from_millis(5),
            poll_interval: Duration::from_millis(2),
        }
    }

    fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    /// Replays the same lines each time it is opened, then goes idle.
    /// With `fail_first_after: Some(n)` the first opened source returns a
    /// read error after serving `n` lines.
    struct Canned {
        lines: Vec<&'static str>,
        opens: Arc<Mutex<u32>>,
        fail_first_after: Option<usize>,
    }

    impl Canned {
        fn new(lines: Vec<&'static str>, opens: Arc<Mutex<u32>>) -> Self {
            Canned { lines, opens, fail_first_after: None }
        }
    }

    struct CannedLines {
        lines: VecDeque<String>,
        fail_after: Option<usize>,
        served: usize,
    }

    impl LineSource for CannedLines {
        fn next_line(&mut self) -> io::Result<Option<String>> {
            if self.fail_after == Some(self.served) {
                self.fail_after = None;
                return Err(io::Error::new(io::ErrorKind::Other, "device went away"));
            }
            let line = self.lines.pop_front();
            if line.is_some() {
                self.served += 1;
            }
            Ok(line)
        }
    }

    impl OpenSource for Canned {
        type Source = CannedLines;
        fn open_at_end(&self) -> io::Result<CannedLines> {
            let mut opens = self.opens.lock().unwrap();
            *opens += 1;
            Ok(CannedLines {
                lines: self.lines.iter().map(|l| l.to_string()).collect(),
                fail_after: if *opens == 1 { self.fail_first_after } else { None },
                served: 0,
            })
        }
        fn describe(&self) -> String {
            "canned".into()
        }
    }

    #[derive(Debug, Default)]
    struct Ledger {
        connects: u32,
        write_attempts: u32,
        commit_attempts: u32,
        committed: Vec<String>,
    }

    #[derive(Debug, Error)]
    #[error("{0}")]
    struct Broken(&'static str);

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    enum Fault {
        None,
        Write,
        Commit,
    }

    /// Hands out in-memory sinks; the first connection carries `first`.
    struct Flaky {
        ledger: Arc<Mutex<Ledger>>,
        first: Fault,
    }

    impl Flaky {
        fn new(ledger: Arc<Mutex<Ledger>>, first: Fault) -> Self {
            Flaky { ledger, first }
        }
    }

    struct MemSink {
        ledger: Arc<Mutex<Ledger>>,
        fault: Fault,
        pending: Vec<String>,
    }

    impl Sink for MemSink {
        fn write_flows(&mut self, batch: &[FlowRecord]) -> Result<usize, SinkError> {
            self.ledger.lock().unwrap().write_attempts += 1;
            if self.fault == Fault::Write {
                return Err(Box::new(Broken("connection reset")));
            }
            self.pending.extend(batch.iter().map(|r| r.unique_id.clone()));
            Ok(batch.len())
        }
        fn write_alerts(&mut self, _batch: &[AlertRecord]) -> Result<usize, SinkError> {
            Err(Box::new(Broken("unexpected table")))
        }
        fn commit(&mut self) -> Result<(), SinkError> {
            let mut ledger = self.ledger.lock().unwrap();
            ledger.commit_attempts += 1;
            if self.fault == Fault::Commit {
                return Err(Box::new(Broken("disk I/O error")));
            }
            ledger.committed.append(&mut self.pending);
            Ok(())
        }
    }

    impl Connect for Flaky {
        type Conn = MemSink;
        type Error = Broken;
        fn connect(&self, _endpoint: &Endpoint, _credential: &Credential, _timeout: Duration) -> Result<MemSink, Broken> {
            let mut ledger = self.ledger.lock().unwrap();
            ledger.connects += 1;
            let fault = if ledger.connects == 1 { self.first } else { Fault::None };
            Ok(MemSink { ledger: self.ledger.clone(), fault, pending: Vec::new() })
        }
    }

    #[test]
    fn write_failure_reconnects_and_final_flush_on_shutdown() {
        let ledger = Arc::new(Mutex::new(Ledger::default()));
        let opens = Arc::new(Mutex::new(0));
        let shutdown = Shutdown::new();
        let worker = TailWorker::new(
            "conn",
            FlowFormat::Conn,
            Canned::new(vec![GOOD_A, "garbage", GOOD_B, GOOD_C], opens.clone()),
            Flaky::new(ledger.clone(), Fault::Write),
            resolver(Arc::new(Fixed("/mem.db"))),
            fast_settings(2, Duration::from_secs(3600)),
            shutdown.clone(),
        );
        let handle = thread::spawn(move || worker.run());

        wait_until("size-triggered flush after reconnect", || ledger.lock().unwrap().committed.len() == 2);
        shutdown.trigger();
        handle.join().unwrap();

        let ledger = ledger.lock().unwrap();
        assert_eq!(ledger.connects, 2);
        assert_eq!(*opens.lock().unwrap(), 2);
        assert_eq!(ledger.write_attempts, 3);
        // Batch from the broken connection was discarded; the tail record
        // went out in the shutdown flush.
        assert_eq!(ledger.committed, vec!["Ca", "Cb", "Cc"]);
    }

    #[test]
    fn read_failure_reopens_source_on_fresh_connection() {
        let ledger = Arc::new(Mutex::new(Ledger::default()));
        let opens = Arc::new(Mutex::new(0));
        let shutdown = Shutdown::new();
        let worker = TailWorker::new(
            "conn",
            FlowFormat::Conn,
            Canned { fail_first_after: Some(1), ..Canned::new(vec![GOOD_A, GOOD_B, GOOD_C], opens.clone()) },
            Flaky::new(ledger.clone(), Fault::None),
            resolver(Arc::new(Fixed("/mem.db"))),
            fast_settings(2, Duration::from_secs(3600)),
            shutdown.clone(),
        );
        let handle = thread::spawn(move || worker.run());

        wait_until("flush on the second session", || ledger.lock().unwrap().committed.len() == 2);
        shutdown.trigger();
        handle.join().unwrap();

        let ledger = ledger.lock().unwrap();
        assert_eq!(ledger.connects, 2);
        assert_eq!(*opens.lock().unwrap(), 2);
        // The half-filled batch from the failed read never reached the sink.
        assert_eq!(ledger.write_attempts, 2);
        assert_eq!(ledger.committed, vec!["Ca", "Cb", "Cc"]);
    }

    #[test]
    fn commit_failure_discards_batch_and_resolves_endpoint_again() {
        let ledger = Arc::new(Mutex::new(Ledger::default()));
        let lookups = Arc::new(AtomicU32::new(0));
        let opens = Arc::new(Mutex::new(0));
        let shutdown = Shutdown::new();
        let worker = TailWorker::new(
            "conn",
            FlowFormat::Conn,
            Canned::new(vec![GOOD_A, GOOD_B, GOOD_C], opens.clone()),
            Flaky::new(ledger.clone(), Fault::Commit),
            resolver(Arc::new(Counting { endpoint: "/mem.db", lookups: lookups.clone() })),
            fast_settings(2, Duration::from_secs(3600)),
            shutdown.clone(),
        );
        let handle = thread::spawn(move || worker.run());

        wait_until("commit on the second connection", || ledger.lock().unwrap().committed.len() == 2);
        shutdown.trigger();
        handle.join().unwrap();

        let ledger = ledger.lock().unwrap();
        assert_eq!(ledger.connects, 2);
        assert_eq!(lookups.load(Ordering::SeqCst), 2);
        assert_eq!(*opens.lock().unwrap(), 2);
        // One failed commit, one size-triggered commit, one shutdown flush.
        assert_eq!(ledger.commit_attempts, 3);
        assert_eq!(ledger.committed, vec!["Ca", "Cb", "Cc"]);
    }

    #[test]
    fn idle_stream_flushes_on_interval() {
        let ledger = Arc::new(Mutex::new(Ledger::default()));
        let shutdown = Shutdown::new();
        let worker = TailWorker::new(
            "conn",
            FlowFormat::Conn,
            Canned::new(vec![GOOD_A], Arc::new(Mutex::new(0))),
            Flaky::new(ledger.clone(), Fault::None),
            resolver(Arc::new(Fixed("/mem.db"))),
            fast_settings(100, Duration::from_millis(20)),
            shutdown.clone(),
        );
        let handle = thread::spawn(move || worker.run());

        wait_until("time-triggered flush", || !ledger.lock().unwrap().committed.is_empty());
        shutdown.trigger();
        handle.join().unwrap();
        assert_eq!(ledger.lock().unwrap().committed, vec!["Ca"]);
    }

    #[test]
    fn shutdown_while_connecting_exits() {
        let shutdown = Shutdown::new();
        let dir = TempDir::new().unwrap();
        let worker = TailWorker::new(
            "conn",
            FlowFormat::Conn,
            TailFile::new(dir.path().join("conn.log")),
            SqliteConnector,
            resolver(Arc::new(FileSource::new(dir.path().join("missing.yaml")))),
            fast_settings(100, Duration::from_secs(5)),
            shutdown.clone(),
        );
        let handle = thread::spawn(move || worker.run());
        thread::sleep(Duration::from_millis(30));
        shutdown.trigger();
        handle.join().unwrap();
    }

    #[test]
    fn tails_file_into_sqlite_idempotently() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("flows.db");
        let log_path = dir.path().join("conn.log");
        let settings_path = dir.path().join("endpoint.yaml");
        std::fs::write(&settings_path, format!("db-host: {}\n", db_path.display())).unwrap();
        // History present before the worker starts is never replayed.
        std::fs::write(&log_path, format!("{GOOD_C}\n")).unwrap();

        let shutdown = Shutdown::new();
        let worker = TailWorker::new(
            "conn",
            FlowFormat::Conn,
            TailFile::new(&log_path),
            SqliteConnector,
            resolver(Arc::new(FileSource::new(&settings_path))),
            fast_settings(100, Duration::from_millis(10)),
            shutdown.clone(),
        );
        let handle = thread::spawn(move || worker.run());

        let append = |line: &str| {
            let mut f = OpenOptions::new().append(true).open(&log_path).unwrap();
            writeln!(f, "{line}").unwrap();
        };
        let count = || {
            Db::open_or_create(&db_path, Duration::from_secs(1))
                .and_then(|db| db.count_rows(Table::Flows))
                .unwrap_or(0)
        };

        // The worker may open the file after any given append; repeating the
        // same record is harmless because inserts are idempotent.
        wait_until("first row", || {
            append(GOOD_A);
            count() >= 1
        });
        append("#close\t2024-01-01-00-00-00");
        append("not\ta\tflow");
        append(GOOD_B);
        wait_until("second row", || count() >= 2);
        shutdown.trigger();
        handle.join().unwrap();

        let db = Db::open_or_create(&db_path, Duration::from_secs(1)).unwrap();
        assert_eq!(db.count_rows(Table::Flows).unwrap(), 2);
        assert!(db.flow_by_id("Ca").unwrap().is_some());
        assert!(db.flow_by_id("Cb").unwrap().is_some());
        assert!(db.flow_by_id("Cc").unwrap().is_none());
    }
}
