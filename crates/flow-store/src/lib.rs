//! SQLite persistence for canonical flow and alert records.

mod error;
mod open;
mod insert;
mod query;
mod schema;

pub use error::StoreError;
pub use open::Db;
pub use insert::*;
