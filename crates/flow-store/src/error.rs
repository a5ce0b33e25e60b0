use shipper_core::Table;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("encode {table} row: {source}")]
    Encode {
        table: Table,
        #[source]
        source: serde_json::Error,
    },
    #[error("{column} value {value} does not fit a signed 64-bit column")]
    OutOfRange { column: &'static str, value: u64 },
    #[error("credential does not match the one recorded for this database")]
    Unauthorized,
    #[error("commit without an open transaction")]
    NoTransaction,
}
