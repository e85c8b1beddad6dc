//! Periodic task loop shared by all collectors.

use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use crate::collector::CycleError;

/// One collector cycle.
///
/// Implementations own all their state; a cycle that fails is logged and
/// the next tick starts from scratch.
pub trait Scrape: Send + 'static {
    /// Short name used in log fields (`procinfo`, `cpu`, ...).
    fn name(&self) -> &'static str;

    /// Runs one blocking scrape cycle.
    fn scrape(&mut self) -> Result<(), CycleError>;
}

/// Tick period and emission divisor of a collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub period: Duration,
    /// Records are written every `emit_every`-th tick.
    pub emit_every: u32,
}

impl Cadence {
    pub const PROCESS: Cadence = Cadence::new(3, 5);
    pub const CPU: Cadence = Cadence::new(3, 5);
    pub const CPUFREQ: Cadence = Cadence::new(5, 6);
    pub const THERMAL: Cadence = Cadence::new(5, 1);

    pub const fn new(period_secs: u64, emit_every: u32) -> Self {
        Self {
            period: Duration::from_secs(period_secs),
            emit_every,
        }
    }

    pub fn period_secs(&self) -> f64 {
        self.period.as_secs_f64()
    }
}

/// Counts ticks and says when a record is due.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmitCounter {
    ticks: u32,
}

impl EmitCounter {
    /// Advances one tick; true when `every` ticks have elapsed since the last
    /// reset.
    pub fn tick(&mut self, every: u32) -> bool {
        self.ticks += 1;
        self.ticks >= every
    }

    pub fn reset(&mut self) {
        self.ticks = 0;
    }
}

/// Drives `collector` every `period` until the task is dropped.
///
/// The first tick fires immediately. Overrunning cycles are followed by
/// back-to-back catch-up ticks. Each scrape runs on the blocking pool so a
/// slow filesystem cannot stall the runtime.
pub async fn run_periodic<S: Scrape>(mut collector: S, period: Duration) {
    let name = collector.name();
    let mut tick = tokio::time::interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Burst);

    loop {
        tick.tick().await;

        let t0 = Instant::now();
        let result = tokio::task::spawn_blocking(move || {
            let outcome = collector.scrape();
            (collector, outcome)
        })
        .await;
        let elapsed = t0.elapsed();

        match result {
            Ok((c, outcome)) => {
                collector = c;
                match outcome {
                    Ok(()) => debug!(
                        collector = name,
                        duration_ms = elapsed.as_millis() as u64,
                        "cycle completed"
                    ),
                    Err(e) => warn!(collector = name, error = %e, "cycle abandoned"),
                }
            }
            Err(e) => {
                error!(collector = name, error = %e, "scrape panicked, collector stopped");
                return;
            }
        }

        if elapsed > period {
            warn!(
                collector = name,
                duration_ms = elapsed.as_millis() as u64,
                period_ms = period.as_millis() as u64,
                "cycle overran its period"
            );
        }
    }
}
