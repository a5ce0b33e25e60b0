use crate::{Db, StoreError};
use rusqlite::OptionalExtension;
use shipper_core::{AlertRecord, FlowRecord, Table};
use std::collections::BTreeMap;

impl Db {
    pub fn table_exists(&self, name: &str) -> Result<bool, StoreError> {
        let cnt: i64 = self.conn.query_row(
            "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name=?",
            [name],
            |r| r.get(0),
        )?;
        Ok(cnt > 0)
    }

    pub fn count_rows(&self, table: Table) -> Result<i64, StoreError> {
        let sql = format!("SELECT COUNT(1) FROM {}", table.name());
        Ok(self.conn.query_row(&sql, [], |r| r.get(0))?)
    }

    /// Latest event timestamp stored in `table`, if any.
    pub fn latest_ts(&self, table: Table) -> Result<Option<f64>, StoreError> {
        let sql = format!("SELECT MAX(ts) FROM {}", table.name());
        Ok(self.conn.query_row(&sql, [], |r| r.get(0))?)
    }

    pub fn flow_by_id(&self, unique_id: &str) -> Result<Option<FlowRecord>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT ts,unique_id,source_ip,source_port,destination_ip,destination_port,protocol,service,
                        duration,bytes_sent,bytes_received,conn_state,extra_fields
                 FROM flows WHERE unique_id=?",
                [unique_id],
                |r| {
                    Ok((
                        FlowRecord {
                            ts: r.get(0)?,
                            unique_id: r.get(1)?,
                            source_ip: r.get(2)?,
                            source_port: r.get(3)?,
                            destination_ip: r.get(4)?,
                            destination_port: r.get(5)?,
                            protocol: r.get(6)?,
                            service: r.get(7)?,
                            duration: r.get(8)?,
                            bytes_sent: r.get::<_, Option<i64>>(9)?.map(|v| v.max(0) as u64),
                            bytes_received: r.get::<_, Option<i64>>(10)?.map(|v| v.max(0) as u64),
                            conn_state: r.get(11)?,
                            extra_fields: BTreeMap::new(),
                        },
                        r.get::<_, String>(12)?,
                    ))
                },
            )
            .optional()?;
        let Some((mut record, extra)) = row else { return Ok(None) };
        record.extra_fields = serde_json::from_str(&extra)
            .map_err(|source| StoreError::Encode { table: Table::Flows, source })?;
        Ok(Some(record))
    }

    pub fn alert_by_id(&self, unique_id: &str) -> Result<Option<AlertRecord>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT ts,unique_id,source_ip,destination_ip,signature_id,signature,severity,payload
                 FROM alerts WHERE unique_id=?",
                [unique_id],
                |r| {
                    Ok((
                        AlertRecord {
                            ts: r.get(0)?,
                            unique_id: r.get(1)?,
                            source_ip: r.get(2)?,
                            destination_ip: r.get(3)?,
                            signature_id: r.get(4)?,
                            signature: r.get(5)?,
                            severity: r.get(6)?,
                            payload: serde_json::Value::Null,
                        },
                        r.get::<_, String>(7)?,
                    ))
                },
            )
            .optional()?;
        let Some((mut record, payload)) = row else { return Ok(None) };
        record.payload = serde_json::from_str(&payload)
            .map_err(|source| StoreError::Encode { table: Table::Alerts, source })?;
        Ok(Some(record))
    }
}
