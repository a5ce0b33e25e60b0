//! Parser for the JSON-lines IDS event stream. The stream interleaves many
//! event kinds; only `alert` events become [`AlertRecord`]s.

use serde_json::{Map, Value};
use shipper_core::{AlertRecord, ParseResult, Reject};
use std::net::IpAddr;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::OffsetDateTime;

/// Event kinds accepted from the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EveFormat {
    Alert,
}

impl EveFormat {
    pub const fn event_type(self) -> &'static str {
        match self {
            EveFormat::Alert => "alert",
        }
    }

    pub fn parse(self, line: &str) -> ParseResult<AlertRecord> {
        let line = line.trim();
        if line.is_empty() {
            return Err(Reject::Empty);
        }
        if line.starts_with('#') {
            return Err(Reject::Comment);
        }
        let value: Value = serde_json::from_str(line).map_err(|e| Reject::BadJson(e.to_string()))?;
        let obj = value
            .as_object()
            .ok_or_else(|| Reject::BadJson("top-level value is not an object".into()))?;
        let kind = text(obj, "event_type")?;
        if kind != self.event_type() {
            return Err(Reject::OtherEventKind(kind.to_string()));
        }
        match self {
            EveFormat::Alert => parse_alert(obj, &value),
        }
    }
}

fn parse_alert(obj: &Map<String, Value>, value: &Value) -> ParseResult<AlertRecord> {
    let ts_raw = text(obj, "timestamp")?;
    let ts = parse_timestamp(ts_raw)?;
    let flow_id = match obj.get("flow_id") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(other) => return Err(Reject::BadNumber { field: "flow_id", value: other.to_string() }),
        None => return Err(Reject::MissingField("flow_id")),
    };
    let iface = text(obj, "in_iface")?;
    let alert = obj
        .get("alert")
        .and_then(Value::as_object)
        .ok_or(Reject::MissingField("alert"))?;

    Ok(AlertRecord {
        ts,
        unique_id: format!("{flow_id}-{iface}-{ts_raw}"),
        source_ip: addr(obj, "src_ip")?,
        destination_ip: addr(obj, "dest_ip")?,
        signature_id: integer(alert, "signature_id")?,
        signature: text(alert, "signature")?.to_string(),
        severity: integer(alert, "severity")?,
        payload: value.clone(),
    })
}

fn text<'a>(obj: &'a Map<String, Value>, field: &'static str) -> ParseResult<&'a str> {
    obj.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(Reject::MissingField(field))
}

fn integer(obj: &Map<String, Value>, field: &'static str) -> ParseResult<i64> {
    match obj.get(field) {
        Some(v) => v.as_i64().ok_or_else(|| Reject::BadNumber { field, value: v.to_string() }),
        None => Err(Reject::MissingField(field)),
    }
}

fn addr(obj: &Map<String, Value>, field: &'static str) -> ParseResult<String> {
    let v = text(obj, field)?;
    v.parse::<IpAddr>()
        .map(|ip| ip.to_string())
        .map_err(|_| Reject::BadAddress { field, value: v.to_string() })
}

/// The stream's own layout: `+hhmm` offset, optional fraction.
fn parse_native(v: &str) -> Option<OffsetDateTime> {
    let fractional = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory][offset_minute]"
    );
    let whole = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory][offset_minute]"
    );
    OffsetDateTime::parse(v, fractional)
        .or_else(|_| OffsetDateTime::parse(v, whole))
        .ok()
}

/// Fractional epoch seconds for an RFC 3339 or native stream timestamp.
pub fn parse_timestamp(v: &str) -> ParseResult<f64> {
    let parsed = OffsetDateTime::parse(v, &Rfc3339).ok().or_else(|| parse_native(v));
    match parsed {
        Some(dt) => Ok(dt.unix_timestamp() as f64 + f64::from(dt.nanosecond()) / 1e9),
        None => Err(Reject::BadTimestamp { field: "timestamp", value: v.to_string() }),
    }
}
