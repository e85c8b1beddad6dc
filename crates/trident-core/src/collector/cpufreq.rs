//! CPU frequency collector.
//!
//! Writes a `cpufreq` record every `emit_every`-th tick, and additionally on
//! any tick whose frequency vector differs from the previous one. A change
//! triggered record does not restart the tick count. Every tick with a
//! non-empty reading also lands as one row in the [`FreqStore`].

use chrono::Utc;

use crate::collector::CycleError;
use crate::collector::schedule::{Cadence, EmitCounter, Scrape};
use crate::collector::sysfs::{CpuFreq, SysSource};
use crate::collector::traits::FileSystem;
use crate::fmt::format_cpufreq;
use crate::sink::{FreqStore, RecordSink};

pub struct CpuFreqCollector<F: FileSystem, S: RecordSink> {
    sys: SysSource<F>,
    sink: S,
    store: Option<FreqStore>,
    cadence: Cadence,
    emit: EmitCounter,
    last: Option<Vec<CpuFreq>>,
}

impl<F: FileSystem, S: RecordSink> CpuFreqCollector<F, S> {
    pub fn new(sys: SysSource<F>, sink: S, store: Option<FreqStore>, cadence: Cadence) -> Self {
        Self {
            sys,
            sink,
            store,
            cadence,
            emit: EmitCounter::default(),
            last: None,
        }
    }

    pub fn sys_mut(&mut self) -> &mut SysSource<F> {
        &mut self.sys
    }

    pub fn collect(&mut self) -> Result<(), CycleError> {
        let freqs = self.sys.cpufreqs()?;

        let changed = self.last.as_ref() != Some(&freqs);
        let due = self.emit.tick(self.cadence.emit_every);
        if due {
            self.emit.reset();
        }
        self.last = Some(freqs.clone());

        if freqs.is_empty() {
            return Ok(());
        }

        if due || changed {
            let tokens: Vec<(String, u64)> =
                freqs.iter().map(|f| (f.cpu.to_string(), f.hz())).collect();
            self.sink.write_record(&format_cpufreq(&tokens))?;
        }

        if let Some(ref store) = self.store {
            let row: Vec<(u32, u64)> = freqs.iter().map(|f| (f.cpu, f.hz())).collect();
            store.insert(Utc::now().timestamp_millis(), &row)?;
        }

        Ok(())
    }
}

impl<F, S> Scrape for CpuFreqCollector<F, S>
where
    F: FileSystem + 'static,
    S: RecordSink + 'static,
{
    fn name(&self) -> &'static str {
        "cpufreq"
    }

    fn scrape(&mut self) -> Result<(), CycleError> {
        self.collect()
    }
}
