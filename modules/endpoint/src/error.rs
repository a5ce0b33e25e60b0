use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("key {key:?} not found in {source_desc}")]
    Missing { key: String, source_desc: String },
    #[error("key {key:?} has an empty value")]
    Empty { key: String },
    #[error("invalid endpoint {value:?}: {reason}")]
    InvalidEndpoint { value: String, reason: &'static str },
    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[cfg(feature = "http")]
    #[error("http lookup: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} answered {status}")]
    Status { url: String, status: u16 },
}
