use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Destination table of a canonical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Flows,
    Alerts,
}

impl Table {
    pub const fn name(self) -> &'static str {
        match self {
            Table::Flows => "flows",
            Table::Alerts => "alerts",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One observed network flow or flow-like transaction (lease, handshake,
/// web request, name lookup, auth exchange).
///
/// `unique_id` is the idempotency key of the flows table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowRecord {
    /// Fractional seconds since the Unix epoch.
    pub ts: f64,
    pub unique_id: String,
    pub source_ip: String,
    pub source_port: u16,
    pub destination_ip: String,
    pub destination_port: u16,
    pub protocol: String,
    pub service: String,
    pub duration: Option<f64>,
    pub bytes_sent: Option<u64>,
    pub bytes_received: Option<u64>,
    pub conn_state: String,
    /// Format-specific fields outside the common column set, kept verbatim.
    pub extra_fields: BTreeMap<String, String>,
}

/// One intrusion-detection signature match.
///
/// `unique_id` is derived from flow id, interface and timestamp so a
/// redelivered event maps onto the same row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRecord {
    /// Fractional seconds since the Unix epoch.
    pub ts: f64,
    pub unique_id: String,
    pub source_ip: String,
    pub destination_ip: String,
    pub signature_id: i64,
    pub signature: String,
    pub severity: i64,
    /// The full event object as received.
    pub payload: serde_json::Value,
}

impl FlowRecord {
    pub const TABLE: Table = Table::Flows;
}

impl AlertRecord {
    pub const TABLE: Table = Table::Alerts;
}
