use endpoint::{Connect, Credential, Endpoint};
use eve_alerts::EveFormat;
use flow_store::{Db, StoreError};
use shipper_core::{AlertRecord, FlowRecord, ParseResult, Table};
use std::time::Duration;
use zeek_logs::FlowFormat;

pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Storage side of a worker: idempotent multi-row inserts inside one open
/// transaction, made durable by `commit`.
pub trait Sink: Send {
    /// Returns the number of rows actually inserted; rows whose unique id is
    /// already stored are skipped.
    fn write_flows(&mut self, batch: &[FlowRecord]) -> Result<usize, SinkError>;
    fn write_alerts(&mut self, batch: &[AlertRecord]) -> Result<usize, SinkError>;
    fn commit(&mut self) -> Result<(), SinkError>;
}

impl Sink for Db {
    fn write_flows(&mut self, batch: &[FlowRecord]) -> Result<usize, SinkError> {
        Ok(self.insert_flows(batch)?)
    }

    fn write_alerts(&mut self, batch: &[AlertRecord]) -> Result<usize, SinkError> {
        Ok(self.insert_alerts(batch)?)
    }

    fn commit(&mut self) -> Result<(), SinkError> {
        Ok(Db::commit(self)?)
    }
}

/// A canonical record kind and the table its batches go to.
pub trait Canonical: Sized + Send + 'static {
    const TABLE: Table;

    fn write_batch<S: Sink + ?Sized>(sink: &mut S, batch: &[Self]) -> Result<usize, SinkError>;
}

impl Canonical for FlowRecord {
    const TABLE: Table = FlowRecord::TABLE;

    fn write_batch<S: Sink + ?Sized>(sink: &mut S, batch: &[Self]) -> Result<usize, SinkError> {
        sink.write_flows(batch)
    }
}

impl Canonical for AlertRecord {
    const TABLE: Table = AlertRecord::TABLE;

    fn write_batch<S: Sink + ?Sized>(sink: &mut S, batch: &[Self]) -> Result<usize, SinkError> {
        sink.write_alerts(batch)
    }
}

/// Turns one raw line into a canonical record of a fixed kind.
pub trait LineParser: Send {
    type Record: Canonical;

    fn parse_line(&self, line: &str) -> ParseResult<Self::Record>;
    fn format_name(&self) -> &'static str;
}

impl LineParser for FlowFormat {
    type Record = FlowRecord;

    fn parse_line(&self, line: &str) -> ParseResult<FlowRecord> {
        self.parse(line)
    }

    fn format_name(&self) -> &'static str {
        self.name()
    }
}

impl LineParser for EveFormat {
    type Record = AlertRecord;

    fn parse_line(&self, line: &str) -> ParseResult<AlertRecord> {
        self.parse(line)
    }

    fn format_name(&self) -> &'static str {
        match self {
            EveFormat::Alert => "eve-alert",
        }
    }
}

/// Connects to the SQLite store: the endpoint is the database path and the
/// connect timeout doubles as the lock wait bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

impl Connect for SqliteConnector {
    type Conn = Db;
    type Error = StoreError;

    fn connect(&self, endpoint: &Endpoint, credential: &Credential, timeout: Duration) -> Result<Db, StoreError> {
        let db = Db::open_or_create(endpoint.as_str(), timeout)?;
        db.authorize(credential.expose())?;
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONN_LINE: &str = "1700000000.123456\tCAbc123\t10.0.0.5\t51234\t93.184.216.34\t443\ttcp\tssl\t1.5\t1200\t5400\tSF";

    #[test]
    fn sqlite_connector_binds_credential() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flows.db");
        let endpoint = Endpoint::parse(path.to_str().unwrap()).unwrap();
        let timeout = Duration::from_secs(1);

        let first = SqliteConnector.connect(&endpoint, &Credential::new("s3cret"), timeout);
        assert!(first.is_ok());
        drop(first);
        assert!(SqliteConnector.connect(&endpoint, &Credential::new("s3cret"), timeout).is_ok());
        let wrong = SqliteConnector.connect(&endpoint, &Credential::new("guess"), timeout);
        assert!(matches!(wrong, Err(StoreError::Unauthorized)));
    }

    #[test]
    fn db_sink_writes_through_canonical_dispatch() {
        let dir = TempDir::new().unwrap();
        let endpoint = Endpoint::parse(dir.path().join("flows.db").to_str().unwrap()).unwrap();
        let mut db = SqliteConnector.connect(&endpoint, &Credential::new("pw"), Duration::from_secs(1)).unwrap();

        let rec = FlowFormat::Conn.parse_line(CONN_LINE).unwrap();
        assert_eq!(rec.unique_id, "CAbc123");
        let batch = vec![rec.clone(), rec];
        assert_eq!(FlowRecord::write_batch(&mut db, &batch).unwrap(), 1);
        Sink::commit(&mut db).unwrap();
        assert_eq!(FlowRecord::write_batch(&mut db, &batch[..1]).unwrap(), 0);
        Sink::commit(&mut db).unwrap();
        assert_eq!(db.count_rows(Table::Flows).unwrap(), 1);
    }

    #[test]
    fn parsers_report_their_format() {
        assert_eq!(FlowFormat::Dns.format_name(), "dns");
        assert_eq!(EveFormat::Alert.format_name(), "eve-alert");
    }
}
