//! Local syslog transport over a Unix datagram socket.
//!
//! Frames follow the classic BSD local format:
//! `<PRI>Mmm dd hh:mm:ss TAG[PID]: MESSAGE\n`, one datagram per record.

use std::io;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};
use tracing::debug;

use crate::sink::{RecordSink, SinkError};

/// Facility USER (1) << 3 | severity INFO (6).
pub const PRIORITY_USER_INFO: u8 = 14;

/// Well-known local syslog socket paths, tried in this order.
pub const DEFAULT_SOCKET_PATHS: [&str; 3] = ["/dev/log", "/var/run/syslog", "/var/run/log"];

/// Formats one syslog frame.
pub fn format_frame<Tz: TimeZone>(tag: &str, pid: u32, message: &str, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut frame = format!(
        "<{}>{} {}[{}]: {}",
        PRIORITY_USER_INFO,
        now.format("%b %e %H:%M:%S"),
        tag,
        pid,
        message
    );
    if !frame.ends_with('\n') {
        frame.push('\n');
    }
    frame
}

/// Syslog writer bound to one tag.
///
/// A failed send drops the socket; the next write reconnects.
#[derive(Debug)]
pub struct SyslogWriter {
    tag: String,
    pid: u32,
    paths: Vec<PathBuf>,
    socket: Option<UnixDatagram>,
}

impl SyslogWriter {
    /// Connects to the first reachable well-known syslog socket.
    pub fn connect(tag: &str) -> io::Result<Self> {
        let paths = DEFAULT_SOCKET_PATHS.iter().map(PathBuf::from).collect();
        Self::connect_to(tag, paths)
    }

    /// Connects to the first reachable socket of `paths`.
    pub fn connect_to(tag: &str, paths: Vec<PathBuf>) -> io::Result<Self> {
        let mut writer = Self {
            tag: tag.to_string(),
            pid: std::process::id(),
            paths,
            socket: None,
        };
        writer.socket = Some(writer.open_socket()?);
        Ok(writer)
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    fn open_socket(&self) -> io::Result<UnixDatagram> {
        let mut last_err = io::Error::new(io::ErrorKind::NotFound, "no syslog socket configured");
        for path in &self.paths {
            match Self::try_connect(path) {
                Ok(socket) => {
                    debug!(tag = %self.tag, path = %path.display(), "connected to syslog");
                    return Ok(socket);
                }
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    fn try_connect(path: &Path) -> io::Result<UnixDatagram> {
        let socket = UnixDatagram::unbound()?;
        socket.connect(path)?;
        Ok(socket)
    }

    fn send(&mut self, frame: &str) -> io::Result<()> {
        let socket = match self.socket.take() {
            Some(socket) => socket,
            None => self.open_socket()?,
        };
        socket.send(frame.as_bytes())?;
        self.socket = Some(socket);
        Ok(())
    }
}

impl RecordSink for SyslogWriter {
    fn write_record(&mut self, record: &str) -> Result<(), SinkError> {
        let frame = format_frame(&self.tag, self.pid, record, &Local::now());
        self.send(&frame)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_format_frame() {
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();
        let frame = format_frame("cpu", 42, "cpu|1.0|2.0|97.0|3.0", &now);
        assert_eq!(frame, "<14>Mar  7 09:05:01 cpu[42]: cpu|1.0|2.0|97.0|3.0\n");
    }

    #[test]
    fn test_format_frame_keeps_single_newline() {
        let now = Utc.with_ymd_and_hms(2024, 12, 25, 23, 0, 0).unwrap();
        let frame = format_frame("thermal", 1, "x\n", &now);
        assert_eq!(frame, "<14>Dec 25 23:00:00 thermal[1]: x\n");
    }

    #[test]
    fn test_write_one_datagram_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.sock");
        let server = UnixDatagram::bind(&path).unwrap();

        let mut writer = SyslogWriter::connect_to("procinfo", vec![path]).unwrap();
        writer.write_record("python|1.0|0.5|1.5|100|200").unwrap();
        writer.write_record("bash|0.0|0.0|0.0|1|2").unwrap();

        let mut buf = [0u8; 512];
        let n = server.recv(&mut buf).unwrap();
        let first = std::str::from_utf8(&buf[..n]).unwrap();
        assert!(first.starts_with("<14>"));
        assert!(first.ends_with(&format!(
            " procinfo[{}]: python|1.0|0.5|1.5|100|200\n",
            std::process::id()
        )));

        let n = server.recv(&mut buf).unwrap();
        assert!(std::str::from_utf8(&buf[..n]).unwrap().contains("bash|0.0"));
    }

    #[test]
    fn test_falls_through_to_next_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.sock");
        let path = dir.path().join("log.sock");
        let _server = UnixDatagram::bind(&path).unwrap();

        assert!(SyslogWriter::connect_to("cpu", vec![missing, path]).is_ok());
    }

    #[test]
    fn test_connect_fails_without_socket() {
        let dir = tempfile::tempdir().unwrap();
        let result = SyslogWriter::connect_to("cpu", vec![dir.path().join("none.sock")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_reconnects_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.sock");
        let server = UnixDatagram::bind(&path).unwrap();
        let mut writer = SyslogWriter::connect_to("cpu", vec![path.clone()]).unwrap();

        // syslog daemon restarts
        drop(server);
        std::fs::remove_file(&path).unwrap();
        assert!(writer.write_record("lost").is_err());

        let server = UnixDatagram::bind(&path).unwrap();
        writer.write_record("back").unwrap();

        let mut buf = [0u8; 256];
        let n = server.recv(&mut buf).unwrap();
        assert!(std::str::from_utf8(&buf[..n]).unwrap().ends_with("back\n"));
    }
}
