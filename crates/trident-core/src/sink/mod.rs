//! Record sinks.
//!
//! Collectors write fully formatted records, one call per record. The daemon
//! uses [`SyslogWriter`]; tests use [`MemorySink`].

pub mod memory;
pub mod store;
pub mod syslog;

pub use memory::MemorySink;
pub use store::{FreqStore, HostIdentity};
pub use syslog::SyslogWriter;

/// Sink failure.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("syslog: {0}")]
    Syslog(#[from] std::io::Error),
    #[error("store: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("cannot create store directory {}: {source}", .path.display())]
    StoreDir {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

/// Destination for telemetry records.
pub trait RecordSink: Send {
    /// Writes one record atomically.
    fn write_record(&mut self, record: &str) -> Result<(), SinkError>;
}

impl<S: RecordSink + ?Sized> RecordSink for Box<S> {
    fn write_record(&mut self, record: &str) -> Result<(), SinkError> {
        (**self).write_record(record)
    }
}
