//! CPU utilization collector over `/proc/stat`.
//!
//! Keeps a per-CPU cache of user/system/idle seconds. The cache is
//! defended against CPU hotplug: an idle counter that jumps backwards by at
//! least [`JUMP_BACK_SECONDS`] resets that CPU's entry, and any smaller
//! backward jump keeps the cached value for that component.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::debug;

use crate::collector::CycleError;
use crate::collector::procfs::{CLK_TCK, CollectError, CpuStat, parse_global_stat};
use crate::collector::schedule::{Cadence, EmitCounter, Scrape};
use crate::collector::traits::FileSystem;
use crate::fmt::CpuRecord;
use crate::sink::RecordSink;

/// Idle jump-back limit in seconds.
pub const JUMP_BACK_SECONDS: f64 = 3.0;

/// User, system and idle time of one CPU, seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuTimes {
    pub user: f64,
    pub system: f64,
    pub idle: f64,
}

impl From<&CpuStat> for CpuTimes {
    fn from(stat: &CpuStat) -> Self {
        let hz = CLK_TCK as f64;
        Self {
            user: stat.user as f64 / hz,
            system: stat.system as f64 / hz,
            idle: stat.idle as f64 / hz,
        }
    }
}

impl CpuTimes {
    /// Folds a new observation into a cached entry.
    fn absorb(mut self, observed: CpuTimes) -> CpuTimes {
        if self.idle - observed.idle >= JUMP_BACK_SECONDS {
            self = CpuTimes::default();
        }
        self.idle = self.idle.max(observed.idle);
        self.user = self.user.max(observed.user);
        self.system = self.system.max(observed.system);
        self
    }

    /// Percentages of `secs` spent since `earlier`, never negative.
    fn record(&self, earlier: &CpuTimes, name: String, secs: f64) -> CpuRecord {
        let pct = |now: f64, then: f64| ((now - then) / secs * 100.0).max(0.0);
        let user_pct = pct(self.user, earlier.user);
        let sys_pct = pct(self.system, earlier.system);
        CpuRecord {
            name,
            user_pct,
            sys_pct,
            idle_pct: pct(self.idle, earlier.idle),
            total_pct: user_pct + sys_pct,
        }
    }
}

pub struct CpuCollector<F: FileSystem, S: RecordSink> {
    fs: F,
    stat_path: PathBuf,
    sink: S,
    cadence: Cadence,
    emit: EmitCounter,
    cache: BTreeMap<u32, CpuTimes>,
    total: Option<CpuTimes>,
}

impl<F: FileSystem, S: RecordSink> CpuCollector<F, S> {
    /// Creates the collector; `<proc_path>/stat` must be readable.
    pub fn new(
        fs: F,
        proc_path: impl Into<PathBuf>,
        sink: S,
        cadence: Cadence,
    ) -> Result<Self, CollectError> {
        let stat_path = proc_path.into().join("stat");
        parse_global_stat(&fs.read_to_string(&stat_path)?)?;

        Ok(Self {
            fs,
            stat_path,
            sink,
            cadence,
            emit: EmitCounter::default(),
            cache: BTreeMap::new(),
            total: None,
        })
    }

    pub fn fs_mut(&mut self) -> &mut F {
        &mut self.fs
    }

    /// Cached per-CPU counters after the last tick.
    pub fn cached(&self, cpu: u32) -> Option<CpuTimes> {
        self.cache.get(&cpu).copied()
    }

    pub fn collect(&mut self) -> Result<(), CycleError> {
        let content = self
            .fs
            .read_to_string(&self.stat_path)
            .map_err(CollectError::from)?;
        let stat = parse_global_stat(&content).map_err(CollectError::from)?;

        let total = stat.total().map(CpuTimes::from);
        let observed: BTreeMap<u32, CpuTimes> = stat
            .per_cpu()
            .filter_map(|c| Some((c.cpu_id?, CpuTimes::from(c))))
            .collect();

        let previous = std::mem::take(&mut self.cache);
        for (&cpu, &times) in &observed {
            let cached = previous.get(&cpu).copied().unwrap_or_default();
            let absorbed = cached.absorb(times);
            if absorbed.idle < cached.idle {
                debug!(cpu, "idle counter jumped back, resetting cpu stats");
            }
            self.cache.insert(cpu, absorbed);
        }
        let previous_total = std::mem::replace(&mut self.total, total);

        let due = self.emit.tick(self.cadence.emit_every);
        if !due || previous.is_empty() {
            return Ok(());
        }
        self.emit.reset();

        let secs = self.cadence.period_secs();
        if let (Some(now), Some(then)) = (total, previous_total) {
            let cpus = observed.len().max(1) as f64;
            let record = now.record(&then, "cpu".to_string(), secs * cpus);
            self.sink.write_record(&record.format())?;
        }
        for (cpu, now) in &self.cache {
            if let Some(then) = previous.get(cpu) {
                let record = now.record(then, format!("cpu{}", cpu), secs);
                self.sink.write_record(&record.format())?;
            }
        }

        Ok(())
    }
}

impl<F, S> Scrape for CpuCollector<F, S>
where
    F: FileSystem + 'static,
    S: RecordSink + 'static,
{
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn scrape(&mut self) -> Result<(), CycleError> {
        self.collect()
    }
}
