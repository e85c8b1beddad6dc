//! Process source: reads the kernel process table from `/proc/[pid]/`.
//!
//! [`ProcSource::all_procs`] lists the PID directories once and hands back a
//! lazy [`ProcIter`]; each `next()` reads exactly one process, so a process
//! that exits mid-scrape only costs its own sample.

use std::path::{Path, PathBuf};

use crate::collector::procfs::parser::{
    ParseError, parse_cmdline, parse_environ, parse_global_stat, parse_max_open_files,
    parse_proc_io, parse_proc_stat, parse_proc_status, parse_smaps_rollup, parse_wchan,
};
use crate::collector::traits::FileSystem;
use crate::proc::types::{Counts, Filedesc, Memory, ProcAttrs, ProcId, ProcMetrics, ProcSample};

/// Clock ticks per second (USER_HZ). Standard value for Linux.
pub const CLK_TCK: u64 = 100;

/// Page size used to convert `rss` pages to bytes.
const PAGE_SIZE: u64 = 4096;

/// Error type for collection failures.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// Process disappeared during collection.
    #[error("process {0} disappeared")]
    ProcessGone(u32),
    /// I/O error reading kernel files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Parse error in kernel files.
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<ParseError> for CollectError {
    fn from(e: ParseError) -> Self {
        CollectError::Parse(e.message)
    }
}

/// Reads per-process samples from a procfs mount.
pub struct ProcSource<F: FileSystem> {
    fs: F,
    proc_path: PathBuf,
    /// System boot time (seconds since epoch), used to calculate process start time.
    boot_time: u64,
    read_environ: bool,
    gather_smaps: bool,
}

impl<F: FileSystem> ProcSource<F> {
    /// Opens a process source rooted at `proc_path`.
    ///
    /// Reads `<proc_path>/stat` for the boot time; failing that, the mount is
    /// considered unusable.
    pub fn open(fs: F, proc_path: impl Into<PathBuf>) -> Result<Self, CollectError> {
        let proc_path = proc_path.into();
        let content = fs.read_to_string(&proc_path.join("stat"))?;
        let stat = parse_global_stat(&content)?;

        Ok(Self {
            fs,
            proc_path,
            boot_time: stat.btime,
            read_environ: false,
            gather_smaps: false,
        })
    }

    /// Also read `/proc/[pid]/environ` (needed by environment matchers).
    pub fn with_environ(mut self, enabled: bool) -> Self {
        self.read_environ = enabled;
        self
    }

    /// Also read `/proc/[pid]/smaps_rollup` for proportional memory.
    pub fn with_smaps(mut self, enabled: bool) -> Self {
        self.gather_smaps = enabled;
        self
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn fs_mut(&mut self) -> &mut F {
        &mut self.fs
    }

    pub fn proc_path(&self) -> &Path {
        &self.proc_path
    }

    pub fn boot_time(&self) -> u64 {
        self.boot_time
    }

    /// Lists the process table and returns a lazy iterator over its samples.
    ///
    /// PIDs are visited in ascending order.
    pub fn all_procs(&self) -> Result<ProcIter<'_, F>, CollectError> {
        let entries = self.fs.read_dir(&self.proc_path)?;

        let mut pids: Vec<u32> = entries
            .iter()
            .filter_map(|entry| entry.file_name().and_then(|n| n.to_str()))
            .filter_map(|name| name.parse::<u32>().ok())
            .collect();
        pids.sort_unstable();

        Ok(ProcIter {
            source: self,
            pids: pids.into_iter(),
        })
    }

    /// Reads a single process.
    ///
    /// `stat` and `status` are required; any other file that cannot be read
    /// marks the sample as partial instead of failing it.
    pub fn read_process(&self, pid: u32) -> Result<ProcSample, CollectError> {
        let proc_dir = self.proc_path.join(pid.to_string());
        let mut partial = false;

        let stat_content = self
            .fs
            .read_to_string(&proc_dir.join("stat"))
            .map_err(|_| CollectError::ProcessGone(pid))?;
        let stat = parse_proc_stat(&stat_content)?;

        let status_content = self
            .fs
            .read_to_string(&proc_dir.join("status"))
            .map_err(|_| CollectError::ProcessGone(pid))?;
        let status = parse_proc_status(&status_content)?;

        let cmdline = match self.fs.read_to_string(&proc_dir.join("cmdline")) {
            Ok(content) => parse_cmdline(&content),
            Err(_) => {
                partial = true;
                Vec::new()
            }
        };

        let io = match self.fs.read_to_string(&proc_dir.join("io")) {
            Ok(content) => parse_proc_io(&content).unwrap_or_default(),
            Err(_) => {
                partial = true;
                Default::default()
            }
        };

        let open = match self.fs.read_dir(&proc_dir.join("fd")) {
            Ok(entries) => entries.len() as i64,
            Err(_) => {
                partial = true;
                -1
            }
        };

        let limit = match self.fs.read_to_string(&proc_dir.join("limits")) {
            Ok(content) => parse_max_open_files(&content).unwrap_or(0),
            Err(_) => {
                partial = true;
                0
            }
        };

        // wchan is restricted on hardened kernels; its absence is not an error.
        let wchan = self
            .fs
            .read_to_string(&proc_dir.join("wchan"))
            .ok()
            .and_then(|content| parse_wchan(&content));

        let environ = if self.read_environ {
            match self.fs.read_to_string(&proc_dir.join("environ")) {
                Ok(content) => Some(parse_environ(&content)),
                Err(_) => {
                    partial = true;
                    None
                }
            }
        } else {
            None
        };

        let rollup = if self.gather_smaps {
            match self
                .fs
                .read_to_string(&proc_dir.join("smaps_rollup"))
                .map_err(CollectError::from)
                .and_then(|content| Ok(parse_smaps_rollup(&content)?))
            {
                Ok(rollup) => rollup,
                Err(_) => {
                    partial = true;
                    Default::default()
                }
            }
        } else {
            Default::default()
        };

        let counts = Counts {
            cpu_user_time: stat.utime as f64 / CLK_TCK as f64,
            cpu_system_time: stat.stime as f64 / CLK_TCK as f64,
            read_bytes: io.read_bytes,
            write_bytes: io.write_bytes,
            major_page_faults: stat.majflt,
            minor_page_faults: stat.minflt,
            ctx_switch_voluntary: status.voluntary_ctxt_switches,
            ctx_switch_nonvoluntary: status.nonvoluntary_ctxt_switches,
        };

        let memory = Memory {
            resident_bytes: stat.rss.max(0) as u64 * PAGE_SIZE,
            virtual_bytes: stat.vsize,
            vm_swap_bytes: status.vm_swap * 1024,
            proportional_bytes: rollup.pss,
            proportional_swap_bytes: rollup.swap_pss,
        };

        Ok(ProcSample {
            id: ProcId::new(pid, stat.starttime),
            ppid: stat.ppid,
            attrs: ProcAttrs {
                pid,
                comm: stat.comm,
                cmdline,
                uid: status.uid,
                environ,
                start_time: self.calculate_process_start_time(stat.starttime),
            },
            metrics: ProcMetrics {
                counts,
                memory,
                filedesc: Filedesc { open, limit },
                state: stat.state,
                wchan,
                num_threads: stat.num_threads.max(0) as u64,
            },
            partial,
        })
    }

    /// Process start time in seconds since epoch.
    ///
    /// Formula: boot_time + (starttime_jiffies / CLK_TCK)
    fn calculate_process_start_time(&self, starttime_jiffies: u64) -> u64 {
        self.boot_time + starttime_jiffies / CLK_TCK
    }
}

/// Lazy sequence of process samples from one listing of the process table.
pub struct ProcIter<'a, F: FileSystem> {
    source: &'a ProcSource<F>,
    pids: std::vec::IntoIter<u32>,
}

impl<F: FileSystem> Iterator for ProcIter<'_, F> {
    type Item = Result<ProcSample, CollectError>;

    fn next(&mut self) -> Option<Self::Item> {
        let pid = self.pids.next()?;
        Some(self.source.read_process(pid))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.pids.size_hint()
    }
}
