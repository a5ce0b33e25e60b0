use crate::fields::{parse_addr, parse_num, parse_opt_count, parse_opt_secs, parse_ts, Columns};
use shipper_core::{FlowRecord, ParseResult, Reject};

/// Default `conn.log` field order. The first twelve columns are required.
const LAYOUT: &[&str] = &[
    "ts", "uid", "id.orig_h", "id.orig_p", "id.resp_h", "id.resp_p", "proto", "service",
    "duration", "orig_bytes", "resp_bytes", "conn_state", "local_orig", "local_resp",
    "missed_bytes", "history", "orig_pkts", "orig_ip_bytes", "resp_pkts", "resp_ip_bytes",
    "tunnel_parents",
];
const REQUIRED: usize = 12;

pub(crate) fn parse(line: &str) -> ParseResult<FlowRecord> {
    let c = Columns::split(line, LAYOUT, REQUIRED)?;
    let raw = |name: &'static str| c.raw(name).ok_or(Reject::MissingField(name));
    let uid = c.required("uid")?;
    Ok(FlowRecord {
        ts: parse_ts(raw("ts")?)?,
        unique_id: uid.to_string(),
        source_ip: parse_addr("source_ip", raw("id.orig_h")?)?,
        source_port: parse_num("source_port", raw("id.orig_p")?)?,
        destination_ip: parse_addr("destination_ip", raw("id.resp_h")?)?,
        destination_port: parse_num("destination_port", raw("id.resp_p")?)?,
        protocol: raw("proto")?.to_string(),
        service: raw("service")?.to_string(),
        duration: parse_opt_secs("duration", raw("duration")?)?,
        bytes_sent: parse_opt_count("bytes_sent", raw("orig_bytes")?)?,
        bytes_received: parse_opt_count("bytes_received", raw("resp_bytes")?)?,
        conn_state: raw("conn_state")?.to_string(),
        extra_fields: c.extras(&LAYOUT[..REQUIRED]),
    })
}
