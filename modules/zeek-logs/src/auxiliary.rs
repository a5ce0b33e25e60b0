//! Flow-like logs that share the flows table. Ports and protocol that the
//! source does not carry are filled with fixed per-format defaults.

use crate::fields::{parse_addr, Columns};
use shipper_core::{FlowRecord, ParseResult};

const DHCP: &[&str] = &[
    "ts", "uids", "client_addr", "server_addr", "mac", "host_name", "client_fqdn", "domain",
    "requested_addr", "assigned_addr", "lease_time", "client_message", "server_message",
    "msg_types", "duration",
];

const SSL: &[&str] = &[
    "ts", "uid", "id.orig_h", "id.orig_p", "id.resp_h", "id.resp_p", "version", "cipher",
    "curve", "server_name", "resumed", "last_alert", "next_protocol", "established",
    "ssl_history", "cert_chain_fps", "client_cert_chain_fps", "sni_matches_cert",
];

const HTTP: &[&str] = &[
    "ts", "uid", "id.orig_h", "id.orig_p", "id.resp_h", "id.resp_p", "trans_depth", "method",
    "host", "uri", "referrer", "version", "user_agent", "origin", "request_body_len",
    "response_body_len", "status_code", "status_msg", "info_code", "info_msg", "tags",
    "username", "password", "proxied", "orig_fuids", "orig_filenames", "orig_mime_types",
    "resp_fuids", "resp_filenames", "resp_mime_types",
];

const DNS: &[&str] = &[
    "ts", "uid", "id.orig_h", "id.orig_p", "id.resp_h", "id.resp_p", "proto", "trans_id",
    "rtt", "query", "qclass", "qclass_name", "qtype", "qtype_name", "rcode", "rcode_name",
    "AA", "TC", "RD", "RA", "Z", "answers", "TTLs", "rejected",
];

const NTLM: &[&str] = &[
    "ts", "uid", "id.orig_h", "id.orig_p", "id.resp_h", "id.resp_p", "username", "hostname",
    "domainname", "server_nb_computer_name", "server_dns_computer_name", "server_tree_name",
    "success",
];

const FIVE_TUPLE: &[&str] = &["ts", "uid", "id.orig_h", "id.orig_p", "id.resp_h", "id.resp_p"];

const DHCP_CLIENT_PORT: u16 = 68;
const DHCP_SERVER_PORT: u16 = 67;
const BROADCAST: &str = "255.255.255.255";
const UNSPECIFIED: &str = "0.0.0.0";

/// Fields shared by the connection-keyed formats (ssl, http, dns, ntlm).
struct Tuple {
    ts: f64,
    uid: String,
    source_ip: String,
    source_port: u16,
    destination_ip: String,
    destination_port: u16,
}

fn tuple(c: &Columns<'_>) -> ParseResult<Tuple> {
    Ok(Tuple {
        ts: c.ts()?,
        uid: c.required("uid")?.to_string(),
        source_ip: c.addr("id.orig_h")?,
        source_port: c.port("id.orig_p")?,
        destination_ip: c.addr("id.resp_h")?,
        destination_port: c.port("id.resp_p")?,
    })
}

fn record(t: Tuple, unique_id: String, protocol: &str, service: &str, state: Option<&str>, c: &Columns<'_>, consumed: &[&str]) -> FlowRecord {
    let mut skip: Vec<&str> = FIVE_TUPLE.to_vec();
    skip.extend_from_slice(consumed);
    FlowRecord {
        ts: t.ts,
        unique_id,
        source_ip: t.source_ip,
        source_port: t.source_port,
        destination_ip: t.destination_ip,
        destination_port: t.destination_port,
        protocol: protocol.to_string(),
        service: service.to_string(),
        duration: None,
        bytes_sent: None,
        bytes_received: None,
        conn_state: state.unwrap_or("-").to_string(),
        extra_fields: c.extras(&skip),
    }
}

pub(crate) fn parse_dhcp(line: &str) -> ParseResult<FlowRecord> {
    let c = Columns::split(line, DHCP, 4)?;
    let ts_raw = c.required("ts")?;
    let ts = c.ts()?;
    let uids = c.required("uids")?;
    // DISCOVER/REQUEST exchanges often precede any client address.
    let source_ip = match ["client_addr", "assigned_addr", "requested_addr"]
        .into_iter()
        .find_map(|name| c.get(name).map(|v| (name, v)))
    {
        Some((name, v)) => parse_addr(name, v)?,
        None => UNSPECIFIED.to_string(),
    };
    let destination_ip = match c.get("server_addr") {
        Some(v) => parse_addr("server_addr", v)?,
        None => BROADCAST.to_string(),
    };
    Ok(FlowRecord {
        ts,
        unique_id: format!("dhcp:{uids}:{ts_raw}"),
        source_ip,
        source_port: DHCP_CLIENT_PORT,
        destination_ip,
        destination_port: DHCP_SERVER_PORT,
        protocol: "udp".to_string(),
        service: "dhcp".to_string(),
        duration: None,
        bytes_sent: None,
        bytes_received: None,
        conn_state: c.get("msg_types").unwrap_or("-").to_string(),
        extra_fields: c.extras(&["ts", "uids", "msg_types"]),
    })
}

pub(crate) fn parse_ssl(line: &str) -> ParseResult<FlowRecord> {
    let c = Columns::split(line, SSL, FIVE_TUPLE.len())?;
    let t = tuple(&c)?;
    let id = format!("ssl:{}", t.uid);
    Ok(record(t, id, "tcp", "ssl", c.get("established"), &c, &["established"]))
}

pub(crate) fn parse_http(line: &str) -> ParseResult<FlowRecord> {
    let c = Columns::split(line, HTTP, FIVE_TUPLE.len() + 1)?;
    let t = tuple(&c)?;
    let depth = c.required("trans_depth")?;
    let id = format!("http:{}:{depth}", t.uid);
    Ok(record(t, id, "tcp", "http", c.get("status_code"), &c, &["trans_depth", "status_code"]))
}

pub(crate) fn parse_dns(line: &str) -> ParseResult<FlowRecord> {
    let c = Columns::split(line, DNS, FIVE_TUPLE.len() + 2)?;
    let t = tuple(&c)?;
    let protocol = c.get("proto").unwrap_or("udp").to_string();
    let trans_id = c.raw("trans_id").unwrap_or("-");
    let query = c.raw("query").unwrap_or("-");
    let id = format!("dns:{}:{trans_id}:{query}", t.uid);
    Ok(record(t, id, &protocol, "dns", c.get("rcode_name"), &c, &["proto", "rcode_name"]))
}

pub(crate) fn parse_ntlm(line: &str) -> ParseResult<FlowRecord> {
    let c = Columns::split(line, NTLM, FIVE_TUPLE.len())?;
    let t = tuple(&c)?;
    let id = format!("ntlm:{}", t.uid);
    Ok(record(t, id, "tcp", "ntlm", c.get("success"), &c, &["success"]))
}
