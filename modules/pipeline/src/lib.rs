//! The ingestion pipeline: source stream → parse → accumulate → bulk write.

mod batch;
mod sink;
mod source;
mod worker;

pub use batch::Batch;
pub use sink::{Canonical, LineParser, Sink, SinkError, SqliteConnector};
pub use source::{LineSource, OpenSource, TailFile};
pub use worker::{SessionStats, TailWorker, WorkerError, WorkerSettings};
