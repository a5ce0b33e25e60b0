use shipper_core::{ParseResult, Reject};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Placeholder values the sensor writes for unset fields.
const UNSET: &str = "-";
const EMPTY_SET: &str = "(empty)";

pub(crate) fn is_unset(v: &str) -> bool {
    v == UNSET || v == EMPTY_SET || v.is_empty()
}

/// Positional view over one tab-separated line with a fixed field layout.
pub(crate) struct Columns<'a> {
    values: Vec<&'a str>,
    names: &'static [&'static str],
}

impl<'a> Columns<'a> {
    pub(crate) fn split(line: &'a str, names: &'static [&'static str], required: usize) -> ParseResult<Self> {
        let values: Vec<&str> = line.split('\t').collect();
        if values.len() < required {
            return Err(Reject::TooFewFields { expected: required, found: values.len() });
        }
        Ok(Columns { values, names })
    }

    fn index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| *n == name)
    }

    /// Raw value by layout name, `None` when the column is absent.
    pub(crate) fn raw(&self, name: &str) -> Option<&'a str> {
        self.index(name).and_then(|i| self.values.get(i).copied())
    }

    /// Value by layout name, `None` when absent or a placeholder.
    pub(crate) fn get(&self, name: &str) -> Option<&'a str> {
        self.raw(name).filter(|v| !is_unset(v))
    }

    pub(crate) fn required(&self, name: &'static str) -> ParseResult<&'a str> {
        self.get(name).ok_or(Reject::MissingField(name))
    }

    pub(crate) fn ts(&self) -> ParseResult<f64> {
        parse_ts(self.required("ts")?)
    }

    pub(crate) fn addr(&self, name: &'static str) -> ParseResult<String> {
        parse_addr(name, self.required(name)?)
    }

    pub(crate) fn port(&self, name: &'static str) -> ParseResult<u16> {
        parse_num(name, self.required(name)?)
    }

    /// Every set value outside `consumed`, keyed by layout name. Columns past
    /// the known layout are kept as `field_<index>`.
    pub(crate) fn extras(&self, consumed: &[&str]) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for (i, v) in self.values.iter().enumerate() {
            if is_unset(v) {
                continue;
            }
            match self.names.get(i) {
                Some(name) if consumed.contains(name) => {}
                Some(name) => {
                    out.insert((*name).to_string(), (*v).to_string());
                }
                None => {
                    out.insert(format!("field_{i}"), (*v).to_string());
                }
            }
        }
        out
    }
}

pub(crate) fn parse_ts(v: &str) -> ParseResult<f64> {
    match v.parse::<f64>() {
        Ok(ts) if ts.is_finite() && ts >= 0.0 => Ok(ts),
        _ => Err(Reject::BadNumber { field: "ts", value: v.to_string() }),
    }
}

pub(crate) fn parse_num<T: std::str::FromStr>(field: &'static str, v: &str) -> ParseResult<T> {
    v.parse::<T>().map_err(|_| Reject::BadNumber { field, value: v.to_string() })
}

/// Optional numeric field: the placeholder maps to `None`, anything else must parse.
pub(crate) fn parse_opt_num<T: std::str::FromStr>(field: &'static str, v: &str) -> ParseResult<Option<T>> {
    if v == UNSET {
        return Ok(None);
    }
    parse_num(field, v).map(Some)
}

/// Optional byte counter, bounded to what the flow table stores.
pub(crate) fn parse_opt_count(field: &'static str, v: &str) -> ParseResult<Option<u64>> {
    match parse_opt_num::<u64>(field, v)? {
        Some(n) if n > i64::MAX as u64 => Err(Reject::BadNumber { field, value: v.to_string() }),
        other => Ok(other),
    }
}

pub(crate) fn parse_opt_secs(field: &'static str, v: &str) -> ParseResult<Option<f64>> {
    match parse_opt_num::<f64>(field, v)? {
        Some(d) if !d.is_finite() || d < 0.0 => Err(Reject::BadNumber { field, value: v.to_string() }),
        other => Ok(other),
    }
}

pub(crate) fn parse_addr(field: &'static str, v: &str) -> ParseResult<String> {
    v.parse::<IpAddr>()
        .map(|ip| ip.to_string())
        .map_err(|_| Reject::BadAddress { field, value: v.to_string() })
}
