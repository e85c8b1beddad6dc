//! Shared data model of the process grouping engine.
//!
//! Counters that only ever grow live in [`Counts`]; sampled gauges live in
//! [`Memory`], [`States`] and [`Filedesc`]. The tracker turns raw
//! [`ProcSample`]s into per-process [`Update`]s, and the grouper folds those
//! into per-name [`Group`]s.

use std::collections::{BTreeMap, HashMap};
use std::ops::{Add, AddAssign};

/// Stable identity of a process across scrapes.
///
/// PIDs are reused by the kernel; the start time (clock ticks since boot, as
/// reported in `/proc/[pid]/stat`) tells two incarnations of a PID apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcId {
    pub pid: u32,
    pub start_time_ticks: u64,
}

impl ProcId {
    pub fn new(pid: u32, start_time_ticks: u64) -> Self {
        Self {
            pid,
            start_time_ticks,
        }
    }
}

/// Monotonically non-decreasing counters of a process or group.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Counts {
    /// CPU time spent in user mode, seconds.
    pub cpu_user_time: f64,
    /// CPU time spent in kernel mode, seconds.
    pub cpu_system_time: f64,
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub major_page_faults: u64,
    pub minor_page_faults: u64,
    pub ctx_switch_voluntary: u64,
    pub ctx_switch_nonvoluntary: u64,
}

impl Counts {
    /// Componentwise `self - baseline`, with every negative component
    /// clamped to zero.
    pub fn delta_since(&self, baseline: &Counts) -> Counts {
        Counts {
            cpu_user_time: (self.cpu_user_time - baseline.cpu_user_time).max(0.0),
            cpu_system_time: (self.cpu_system_time - baseline.cpu_system_time).max(0.0),
            read_bytes: self.read_bytes.saturating_sub(baseline.read_bytes),
            write_bytes: self.write_bytes.saturating_sub(baseline.write_bytes),
            major_page_faults: self
                .major_page_faults
                .saturating_sub(baseline.major_page_faults),
            minor_page_faults: self
                .minor_page_faults
                .saturating_sub(baseline.minor_page_faults),
            ctx_switch_voluntary: self
                .ctx_switch_voluntary
                .saturating_sub(baseline.ctx_switch_voluntary),
            ctx_switch_nonvoluntary: self
                .ctx_switch_nonvoluntary
                .saturating_sub(baseline.ctx_switch_nonvoluntary),
        }
    }

    /// True if every component is `>=` the same component of `other`.
    pub fn dominates(&self, other: &Counts) -> bool {
        self.cpu_user_time >= other.cpu_user_time
            && self.cpu_system_time >= other.cpu_system_time
            && self.read_bytes >= other.read_bytes
            && self.write_bytes >= other.write_bytes
            && self.major_page_faults >= other.major_page_faults
            && self.minor_page_faults >= other.minor_page_faults
            && self.ctx_switch_voluntary >= other.ctx_switch_voluntary
            && self.ctx_switch_nonvoluntary >= other.ctx_switch_nonvoluntary
    }

    /// Total CPU time (user + system), seconds.
    pub fn cpu_total_time(&self) -> f64 {
        self.cpu_user_time + self.cpu_system_time
    }
}

impl AddAssign for Counts {
    fn add_assign(&mut self, rhs: Counts) {
        self.cpu_user_time += rhs.cpu_user_time;
        self.cpu_system_time += rhs.cpu_system_time;
        self.read_bytes = self.read_bytes.saturating_add(rhs.read_bytes);
        self.write_bytes = self.write_bytes.saturating_add(rhs.write_bytes);
        self.major_page_faults = self.major_page_faults.saturating_add(rhs.major_page_faults);
        self.minor_page_faults = self.minor_page_faults.saturating_add(rhs.minor_page_faults);
        self.ctx_switch_voluntary = self
            .ctx_switch_voluntary
            .saturating_add(rhs.ctx_switch_voluntary);
        self.ctx_switch_nonvoluntary = self
            .ctx_switch_nonvoluntary
            .saturating_add(rhs.ctx_switch_nonvoluntary);
    }
}

impl Add for Counts {
    type Output = Counts;

    fn add(mut self, rhs: Counts) -> Counts {
        self += rhs;
        self
    }
}

/// Memory gauges, bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Memory {
    pub resident_bytes: u64,
    pub virtual_bytes: u64,
    pub vm_swap_bytes: u64,
    pub proportional_bytes: u64,
    pub proportional_swap_bytes: u64,
}

impl AddAssign for Memory {
    fn add_assign(&mut self, rhs: Memory) {
        self.resident_bytes += rhs.resident_bytes;
        self.virtual_bytes += rhs.virtual_bytes;
        self.vm_swap_bytes += rhs.vm_swap_bytes;
        self.proportional_bytes += rhs.proportional_bytes;
        self.proportional_swap_bytes += rhs.proportional_swap_bytes;
    }
}

/// Number of processes in each kernel scheduling state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct States {
    pub running: u64,
    pub sleeping: u64,
    /// Uninterruptible sleep (`D`).
    pub waiting: u64,
    pub zombie: u64,
    pub other: u64,
}

impl States {
    /// A single process in the state named by the `/proc/[pid]/stat` letter.
    pub fn from_state_char(state: char) -> Self {
        let mut states = States::default();
        match state {
            'R' => states.running = 1,
            'S' => states.sleeping = 1,
            'D' => states.waiting = 1,
            'Z' => states.zombie = 1,
            _ => states.other = 1,
        }
        states
    }

    pub fn total(&self) -> u64 {
        self.running + self.sleeping + self.waiting + self.zombie + self.other
    }
}

impl AddAssign for States {
    fn add_assign(&mut self, rhs: States) {
        self.running += rhs.running;
        self.sleeping += rhs.sleeping;
        self.waiting += rhs.waiting;
        self.zombie += rhs.zombie;
        self.other += rhs.other;
    }
}

/// Open file descriptors and the soft limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filedesc {
    /// Open descriptor count; `-1` when `/proc/[pid]/fd` was unreadable.
    pub open: i64,
    /// Soft `RLIMIT_NOFILE`; 0 when unknown or unlimited.
    pub limit: u64,
}

impl Default for Filedesc {
    fn default() -> Self {
        Self { open: -1, limit: 0 }
    }
}

impl Filedesc {
    /// `open / limit`, when both are known.
    pub fn ratio(&self) -> Option<f64> {
        (self.open >= 0 && self.limit > 0).then(|| self.open as f64 / self.limit as f64)
    }
}

/// Wait-channel histogram: kernel function name -> number of processes.
pub type Wchans = BTreeMap<String, u64>;

/// What the namer sees of a process.
#[derive(Debug, Clone, Default)]
pub struct ProcAttrs {
    pub pid: u32,
    /// Truncated command name (`/proc/[pid]/stat` field 2, max 15 chars).
    pub comm: String,
    /// Full argv; empty for kernel threads.
    pub cmdline: Vec<String>,
    pub uid: u32,
    /// Environment, only loaded when some rule matches on it.
    pub environ: Option<HashMap<String, String>>,
    /// Start time, Unix seconds.
    pub start_time: u64,
}

/// Per-cycle measurements of one process.
#[derive(Debug, Clone, Default)]
pub struct ProcMetrics {
    pub counts: Counts,
    pub memory: Memory,
    pub filedesc: Filedesc,
    pub state: char,
    pub wchan: Option<String>,
    pub num_threads: u64,
}

/// One process as read from the kernel process table in one scrape.
#[derive(Debug, Clone)]
pub struct ProcSample {
    pub id: ProcId,
    pub ppid: u32,
    pub attrs: ProcAttrs,
    pub metrics: ProcMetrics,
    /// Some optional file (io, fd, limits, ...) could not be read.
    pub partial: bool,
}

/// Per-cycle read failures. Never fatal; reported as a summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectErrors {
    /// Processes that vanished mid-read or had unparseable required files.
    pub read: u64,
    /// Processes whose optional files were unreadable (usually permissions).
    pub partial: u64,
}

impl CollectErrors {
    pub fn is_empty(&self) -> bool {
        self.read == 0 && self.partial == 0
    }
}

/// Tracker output for one live, tracked process in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub group_name: String,
    /// Counter increase since the previous cycle; all components `>= 0`.
    pub latest: Counts,
    pub memory: Memory,
    pub states: States,
    pub wchans: Wchans,
    pub filedesc: Filedesc,
    /// Start time, Unix seconds.
    pub start: u64,
    pub num_threads: u64,
}

/// Aggregate of all processes currently mapped to one group name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    /// Monotonic counters, including contributions of exited members.
    pub counts: Counts,
    pub states: States,
    pub wchans: Wchans,
    pub procs: u64,
    pub memory: Memory,
    /// Oldest member start time, Unix seconds; `None` without live members.
    pub oldest_start_time: Option<u64>,
    pub open_fds: u64,
    pub worst_fd_ratio: f64,
    pub num_threads: u64,
}

/// Groups keyed by name, in name order.
pub type GroupByName = BTreeMap<String, Group>;
