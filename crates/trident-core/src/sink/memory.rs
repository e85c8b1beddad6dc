use std::sync::{Arc, Mutex, MutexGuard};

use crate::sink::{RecordSink, SinkError};

/// Sink that keeps records in memory.
///
/// Clones share the same buffer, so a test can hand one clone to a collector
/// and read records through another.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<String>>>,
    failing: Arc<Mutex<bool>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records written so far.
    pub fn records(&self) -> Vec<String> {
        lock(&self.records).clone()
    }

    /// Removes and returns all records written so far.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *lock(&self.records))
    }

    /// Makes subsequent writes fail with a broken-pipe error.
    pub fn set_failing(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }
}

/// A panicking test thread must not hide the records from the others.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RecordSink for MemorySink {
    fn write_record(&mut self, record: &str) -> Result<(), SinkError> {
        if *lock(&self.failing) {
            return Err(SinkError::Syslog(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "sink closed",
            )));
        }
        lock(&self.records).push(record.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_records() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();
        writer.write_record("a|1").unwrap();
        writer.write_record("b|2").unwrap();

        assert_eq!(sink.records(), vec!["a|1", "b|2"]);
        assert_eq!(sink.take().len(), 2);
        assert!(sink.records().is_empty());
    }

    #[test]
    fn test_failing_sink() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();
        sink.set_failing(true);
        assert!(writer.write_record("x").is_err());
        sink.set_failing(false);
        assert!(writer.write_record("y").is_ok());
        assert_eq!(sink.records(), vec!["y"]);
    }
}
