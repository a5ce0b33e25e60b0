use crate::{Db, StoreError};
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use shipper_core::{AlertRecord, FlowRecord, Table};

pub const FLOW_COLUMNS: &[&str] = &[
    "ts", "unique_id", "source_ip", "source_port", "destination_ip", "destination_port",
    "protocol", "service", "duration", "bytes_sent", "bytes_received", "conn_state", "extra_fields",
];

pub const ALERT_COLUMNS: &[&str] = &[
    "ts", "unique_id", "source_ip", "destination_ip", "signature_id", "signature", "severity", "payload",
];

/// Largest batch one multi-row statement can carry within SQLite's default
/// bound-parameter limit (32766) for the widest table.
pub const MAX_BATCH_ROWS: usize = 2000;

impl Db {
    /// Bulk writer for the flows table: one multi-row INSERT, duplicates on
    /// `unique_id` ignored. Opens a transaction if none is open; the caller
    /// commits. Returns the number of rows actually inserted.
    pub fn insert_flows(&mut self, batch: &[FlowRecord]) -> Result<usize, StoreError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let mut values = Vec::with_capacity(batch.len() * FLOW_COLUMNS.len());
        for r in batch {
            let extra = serde_json::to_string(&r.extra_fields)
                .map_err(|source| StoreError::Encode { table: Table::Flows, source })?;
            values.extend([
                Value::Real(r.ts),
                Value::Text(r.unique_id.clone()),
                Value::Text(r.source_ip.clone()),
                Value::Integer(r.source_port.into()),
                Value::Text(r.destination_ip.clone()),
                Value::Integer(r.destination_port.into()),
                Value::Text(r.protocol.clone()),
                Value::Text(r.service.clone()),
                r.duration.map_or(Value::Null, Value::Real),
                opt_count("bytes_sent", r.bytes_sent)?,
                opt_count("bytes_received", r.bytes_received)?,
                Value::Text(r.conn_state.clone()),
                Value::Text(extra),
            ]);
        }
        self.execute_multi_row(Table::Flows, FLOW_COLUMNS, batch.len(), values)
    }

    /// Bulk writer for the alerts table, same contract as [`Db::insert_flows`].
    pub fn insert_alerts(&mut self, batch: &[AlertRecord]) -> Result<usize, StoreError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let mut values = Vec::with_capacity(batch.len() * ALERT_COLUMNS.len());
        for r in batch {
            let payload = serde_json::to_string(&r.payload)
                .map_err(|source| StoreError::Encode { table: Table::Alerts, source })?;
            values.extend([
                Value::Real(r.ts),
                Value::Text(r.unique_id.clone()),
                Value::Text(r.source_ip.clone()),
                Value::Text(r.destination_ip.clone()),
                Value::Integer(r.signature_id),
                Value::Text(r.signature.clone()),
                Value::Integer(r.severity),
                Value::Text(payload),
            ]);
        }
        self.execute_multi_row(Table::Alerts, ALERT_COLUMNS, batch.len(), values)
    }

    fn execute_multi_row(
        &mut self,
        table: Table,
        columns: &[&str],
        rows: usize,
        values: Vec<Value>,
    ) -> Result<usize, StoreError> {
        self.begin()?;
        let sql = multi_row_insert(table.name(), columns, rows);
        let inserted = self.conn.execute(&sql, params_from_iter(values))?;
        Ok(inserted)
    }
}

fn opt_count(column: &'static str, v: Option<u64>) -> Result<Value, StoreError> {
    match v {
        Some(n) => i64::try_from(n)
            .map(Value::Integer)
            .map_err(|_| StoreError::OutOfRange { column, value: n }),
        None => Ok(Value::Null),
    }
}

fn multi_row_insert(table: &str, columns: &[&str], rows: usize) -> String {
    let row = format!("({})", vec!["?"; columns.len()].join(","));
    let values = vec![row.as_str(); rows].join(",");
    format!(
        "INSERT INTO {table}({}) VALUES {values} ON CONFLICT(unique_id) DO NOTHING",
        columns.join(",")
    )
}
