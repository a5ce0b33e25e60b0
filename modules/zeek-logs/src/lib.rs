//! Parsers for tab-separated sensor flow logs (`conn`) and the flow-like
//! auxiliary logs (`dhcp`, `ssl`, `http`, `dns`, `ntlm`).
//!
//! Every format maps onto [`FlowRecord`]. Fields without a dedicated column
//! are kept verbatim in `extra_fields`.

mod auxiliary;
mod conn;
mod fields;

use shipper_core::{FlowRecord, ParseResult, Reject};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowFormat {
    Conn,
    Dhcp,
    Ssl,
    Http,
    Dns,
    Ntlm,
}

impl FlowFormat {
    pub const ALL: [FlowFormat; 6] = [
        FlowFormat::Conn,
        FlowFormat::Dhcp,
        FlowFormat::Ssl,
        FlowFormat::Http,
        FlowFormat::Dns,
        FlowFormat::Ntlm,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            FlowFormat::Conn => "conn",
            FlowFormat::Dhcp => "dhcp",
            FlowFormat::Ssl => "ssl",
            FlowFormat::Http => "http",
            FlowFormat::Dns => "dns",
            FlowFormat::Ntlm => "ntlm",
        }
    }

    /// Parse one raw log line. Header/comment lines and malformed lines come
    /// back as a [`Reject`]; this never panics on arbitrary input.
    pub fn parse(self, line: &str) -> ParseResult<FlowRecord> {
        let line = line.trim_end_matches(['\n', '\r']);
        if line.starts_with('#') {
            return Err(Reject::Comment);
        }
        if line.trim().is_empty() {
            return Err(Reject::Empty);
        }
        match self {
            FlowFormat::Conn => conn::parse(line),
            FlowFormat::Dhcp => auxiliary::parse_dhcp(line),
            FlowFormat::Ssl => auxiliary::parse_ssl(line),
            FlowFormat::Http => auxiliary::parse_http(line),
            FlowFormat::Dns => auxiliary::parse_dns(line),
            FlowFormat::Ntlm => auxiliary::parse_ntlm(line),
        }
    }
}

impl fmt::Display for FlowFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
