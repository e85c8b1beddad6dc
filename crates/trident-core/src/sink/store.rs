//! Embedded SQLite store for CPU frequency samples.

use std::net::ToSocketAddrs;
use std::path::Path;

use rusqlite::{Connection, params};
use tracing::{debug, warn};

use crate::sink::SinkError;

/// Columns `cpu0..cpu7`; higher CPUs are not stored.
pub const STORED_CPUS: usize = 8;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS cpufreq (
    ts INTEGER,
    hostname TEXT,
    ip TEXT,
    pid INTEGER,
    cpu0 INTEGER,
    cpu1 INTEGER,
    cpu2 INTEGER,
    cpu3 INTEGER,
    cpu4 INTEGER,
    cpu5 INTEGER,
    cpu6 INTEGER,
    cpu7 INTEGER,
    PRIMARY KEY (ts, hostname, ip, pid)
)";

const INSERT_ROW: &str = "INSERT INTO cpufreq
    (ts, hostname, ip, pid, cpu0, cpu1, cpu2, cpu3, cpu4, cpu5, cpu6, cpu7)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)";

/// Who wrote a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    pub hostname: String,
    /// First resolved address of `hostname`; empty if resolution failed.
    pub ip: String,
    pub pid: u32,
}

impl HostIdentity {
    /// Resolves the identity of this host and process.
    pub fn resolve() -> Self {
        let hostname = match nix::unistd::gethostname() {
            Ok(name) => name.to_string_lossy().into_owned(),
            Err(e) => {
                warn!(error = %e, "cannot read hostname");
                String::new()
            }
        };

        let ip = match (hostname.as_str(), 0).to_socket_addrs() {
            Ok(mut addrs) => match addrs.next() {
                Some(addr) => addr.ip().to_string(),
                None => String::new(),
            },
            Err(e) => {
                debug!(hostname = %hostname, error = %e, "hostname does not resolve");
                String::new()
            }
        };

        Self {
            hostname,
            ip,
            pid: std::process::id(),
        }
    }
}

/// The `cpufreq` table.
#[derive(Debug)]
pub struct FreqStore {
    conn: Connection,
    host: HostIdentity,
}

impl FreqStore {
    /// Opens (or creates) the database at `path` and ensures the table exists.
    pub fn open(path: &Path, host: HostIdentity) -> Result<Self, SinkError> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir).map_err(|source| SinkError::StoreDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute(CREATE_TABLE, [])?;
        Ok(Self { conn, host })
    }

    pub fn host(&self) -> &HostIdentity {
        &self.host
    }

    /// Inserts one row. `freqs` holds `(cpu index, Hz)` pairs; CPUs without
    /// a reading are stored as NULL.
    pub fn insert(&self, ts_ms: i64, freqs: &[(u32, u64)]) -> Result<(), SinkError> {
        let mut columns: [Option<i64>; STORED_CPUS] = [None; STORED_CPUS];
        for &(cpu, hz) in freqs {
            if let Some(slot) = columns.get_mut(cpu as usize) {
                *slot = Some(hz as i64);
            }
        }

        self.conn.execute(
            INSERT_ROW,
            params![
                ts_ms,
                self.host.hostname,
                self.host.ip,
                self.host.pid,
                columns[0],
                columns[1],
                columns[2],
                columns[3],
                columns[4],
                columns[5],
                columns[6],
                columns[7],
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> HostIdentity {
        HostIdentity {
            hostname: "node-1".to_string(),
            ip: "10.0.0.5".to_string(),
            pid: 4242,
        }
    }

    #[test]
    fn test_open_creates_directory_and_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log/sqlite/exporter.db");
        let store = FreqStore::open(&path, host()).unwrap();
        assert!(path.exists());

        // reopening is fine
        drop(store);
        FreqStore::open(&path, host()).unwrap();
    }

    #[test]
    fn test_insert_row() {
        let dir = tempfile::tempdir().unwrap();
        let store = FreqStore::open(&dir.path().join("exporter.db"), host()).unwrap();
        let freqs = [(0, 1_800_000_000), (2, 600_000_000), (9, 1)];
        store.insert(1_700_000_000_123, &freqs).unwrap();

        let (ts, hostname, ip, pid): (i64, String, String, u32) = store
            .conn
            .query_row(
                "SELECT ts, hostname, ip, pid FROM cpufreq",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!((ts, pid), (1_700_000_000_123, 4242));
        assert_eq!((hostname.as_str(), ip.as_str()), ("node-1", "10.0.0.5"));

        let cpus: [Option<i64>; 4] = store
            .conn
            .query_row(
                "SELECT cpu0, cpu1, cpu2, cpu7 FROM cpufreq",
                [],
                |r| Ok([r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?]),
            )
            .unwrap();
        assert_eq!(cpus, [Some(1_800_000_000), None, Some(600_000_000), None]);
    }

    #[test]
    fn test_duplicate_key_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FreqStore::open(&dir.path().join("exporter.db"), host()).unwrap();
        store.insert(1, &[(0, 1)]).unwrap();
        let result = store.insert(1, &[(0, 2)]);
        assert!(matches!(result, Err(SinkError::Store(_))));
    }

    #[test]
    fn test_resolve_identity() {
        let identity = HostIdentity::resolve();
        assert_eq!(identity.pid, std::process::id());
    }
}
