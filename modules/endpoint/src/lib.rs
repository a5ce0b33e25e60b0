//! Storage endpoint discovery: key/value configuration sources, the startup
//! credential fetch and the retry-forever [`Resolver`].

mod credential;
mod error;
mod resolver;
mod source;

pub use credential::{fetch_credential, Credential};
pub use error::LookupError;
pub use resolver::{AttemptError, Connect, Endpoint, Resolver};
pub use source::{ConfigSource, EnvSource, FileSource};
#[cfg(feature = "http")]
pub use source::HttpSource;
