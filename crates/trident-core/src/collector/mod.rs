//! Collectors: kernel readers and the four periodic samplers.
//!
//! # Architecture
//!
//! ```text
//! FileSystem (RealFs | MockFs)
//!   ├── procfs::ProcSource ──▶ ProcessCollector ──▶ syslog "procinfo"
//!   ├── /proc/stat ──────────▶ CpuCollector ─────▶ syslog "cpu"
//!   └── sysfs::SysSource ──┬─▶ CpuFreqCollector ─▶ syslog "cpufreq" + FreqStore
//!                          └─▶ ThermalCollector ─▶ syslog "thermal"
//! ```
//!
//! Each collector implements [`Scrape`] and is driven by
//! [`schedule::run_periodic`] on its own task. All filesystem access goes
//! through [`FileSystem`], so every collector is tested against [`MockFs`].

pub mod cpu;
pub mod cpufreq;
pub mod mock;
pub mod process;
pub mod procfs;
pub mod schedule;
pub mod sysfs;
pub mod thermal;
pub mod traits;

pub use cpu::CpuCollector;
pub use cpufreq::CpuFreqCollector;
pub use mock::MockFs;
pub use process::ProcessCollector;
pub use procfs::{CollectError, ProcSource};
pub use schedule::{Cadence, Scrape, run_periodic};
pub use sysfs::SysSource;
pub use thermal::ThermalCollector;
pub use traits::{FileSystem, RealFs};

use crate::sink::SinkError;

/// Why a collector cycle was abandoned.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    Collect(#[from] CollectError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}
