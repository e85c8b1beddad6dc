//! Process collector: groups the process table and writes `procinfo` records.
//!
//! Every tick scrapes `/proc` through the [`Grouper`]. Every `emit_every`-th
//! tick one record per group is written, with CPU percentages computed from
//! the group counter increase since the previous tick.

use tracing::debug;

use crate::collector::CycleError;
use crate::collector::procfs::ProcSource;
use crate::collector::schedule::{Cadence, EmitCounter, Scrape};
use crate::collector::traits::FileSystem;
use crate::fmt::ProcinfoRecord;
use crate::proc::{GroupByName, Grouper, MatchNamer};
use crate::sink::RecordSink;

pub struct ProcessCollector<F: FileSystem, N: MatchNamer, S: RecordSink> {
    source: ProcSource<F>,
    grouper: Grouper<N>,
    sink: S,
    cadence: Cadence,
    emit: EmitCounter,
    /// Groups of the previous tick, the baseline for percentages.
    last: Option<GroupByName>,
}

impl<F: FileSystem, N: MatchNamer, S: RecordSink> ProcessCollector<F, N, S> {
    pub fn new(
        source: ProcSource<F>,
        namer: N,
        children: bool,
        sink: S,
        cadence: Cadence,
    ) -> Self {
        let source = source.with_environ(namer.needs_environ());
        Self {
            source,
            grouper: Grouper::new(namer, children),
            sink,
            cadence,
            emit: EmitCounter::default(),
            last: None,
        }
    }

    pub fn source(&self) -> &ProcSource<F> {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut ProcSource<F> {
        &mut self.source
    }

    /// Groups produced by the last successful tick.
    pub fn last_groups(&self) -> Option<&GroupByName> {
        self.last.as_ref()
    }

    /// Runs one tick.
    pub fn collect(&mut self) -> Result<(), CycleError> {
        // A failed listing breaks the chain of consecutive ticks.
        let procs = match self.source.all_procs() {
            Ok(procs) => procs,
            Err(e) => {
                self.last = None;
                return Err(e.into());
            }
        };
        let (errors, groups) = self.grouper.update(procs);
        if !errors.is_empty() {
            debug!(
                read_errors = errors.read,
                partial = errors.partial,
                "process table read with errors"
            );
        }

        let due = self.emit.tick(self.cadence.emit_every);
        let result = match self.last.take() {
            Some(previous) if due && !previous.is_empty() => {
                self.emit.reset();
                write_records(&mut self.sink, &groups, &previous, self.cadence)
            }
            _ => Ok(()),
        };

        self.last = Some(groups);
        result
    }
}

fn write_records<S: RecordSink>(
    sink: &mut S,
    current: &GroupByName,
    previous: &GroupByName,
    cadence: Cadence,
) -> Result<(), CycleError> {
    let secs = cadence.period_secs();

    for (name, group) in current {
        let baseline = previous.get(name).map(|g| g.counts).unwrap_or(group.counts);
        let delta = group.counts.delta_since(&baseline);

        let user_pct = 100.0 * delta.cpu_user_time / secs;
        let sys_pct = 100.0 * delta.cpu_system_time / secs;
        let record = ProcinfoRecord {
            group: name.clone(),
            user_pct,
            sys_pct,
            total_pct: user_pct + sys_pct,
            resident_bytes: group.memory.resident_bytes,
            virtual_bytes: group.memory.virtual_bytes,
        };
        sink.write_record(&record.format())?;
    }

    Ok(())
}

impl<F, N, S> Scrape for ProcessCollector<F, N, S>
where
    F: FileSystem + 'static,
    N: MatchNamer + 'static,
    S: RecordSink + 'static,
{
    fn name(&self) -> &'static str {
        "procinfo"
    }

    fn scrape(&mut self) -> Result<(), CycleError> {
        self.collect()
    }
}
