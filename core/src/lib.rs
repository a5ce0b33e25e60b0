//! Core shared types for the sensor log shipper: canonical records, the parse
//! reject taxonomy and the cooperative shutdown signal.

pub mod record;
pub mod reject;
pub mod shutdown;

pub use record::{AlertRecord, FlowRecord, Table};
pub use reject::{ParseResult, Reject};
pub use shutdown::Shutdown;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
