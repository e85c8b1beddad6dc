//! Thermal zone collector.

use tracing::debug;

use crate::collector::CycleError;
use crate::collector::schedule::{Cadence, EmitCounter, Scrape};
use crate::collector::sysfs::SysSource;
use crate::collector::traits::FileSystem;
use crate::fmt::{THERMAL_FIELDS, format_thermal};
use crate::sink::RecordSink;

/// Zone slots read per tick; only the first [`THERMAL_FIELDS`] are written.
pub const THERMAL_ZONES: usize = 10;

pub struct ThermalCollector<F: FileSystem, S: RecordSink> {
    sys: SysSource<F>,
    sink: S,
    cadence: Cadence,
    emit: EmitCounter,
}

impl<F: FileSystem, S: RecordSink> ThermalCollector<F, S> {
    pub fn new(sys: SysSource<F>, sink: S, cadence: Cadence) -> Self {
        Self {
            sys,
            sink,
            cadence,
            emit: EmitCounter::default(),
        }
    }

    pub fn sys_mut(&mut self) -> &mut SysSource<F> {
        &mut self.sys
    }

    pub fn collect(&mut self) -> Result<(), CycleError> {
        let zones = self.sys.thermal_zones()?;
        if zones.is_empty() {
            return Ok(());
        }

        let mut slots = [0.0; THERMAL_ZONES];
        for zone in &zones {
            match zone.name.parse::<usize>() {
                Ok(i) if i < THERMAL_ZONES => slots[i] = zone.celsius(),
                _ => {
                    debug!(zone = %zone.name, zone_type = %zone.zone_type, "zone out of range");
                }
            }
        }

        if !self.emit.tick(self.cadence.emit_every) {
            return Ok(());
        }
        self.emit.reset();

        let mut fields = [0.0; THERMAL_FIELDS];
        fields.copy_from_slice(&slots[..THERMAL_FIELDS]);
        self.sink.write_record(&format_thermal(&fields))?;
        Ok(())
    }
}

impl<F, S> Scrape for ThermalCollector<F, S>
where
    F: FileSystem + 'static,
    S: RecordSink + 'static,
{
    fn name(&self) -> &'static str {
        "thermal"
    }

    fn scrape(&mut self) -> Result<(), CycleError> {
        self.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;
    use crate::sink::MemorySink;

    fn collector(fs: MockFs) -> (ThermalCollector<MockFs, MemorySink>, MemorySink) {
        let sys = SysSource::open(fs, "/sys").unwrap();
        let sink = MemorySink::new();
        (ThermalCollector::new(sys, sink.clone(), Cadence::THERMAL), sink)
    }

    #[test]
    fn test_positional_record_every_tick() {
        let (mut c, sink) = collector(MockFs::typical_system());
        c.collect().unwrap();
        let fs = c.sys_mut().fs_mut();
        fs.set_thermal_zone(5, "gpu-thermal", 52_345);
        c.collect().unwrap();

        assert_eq!(
            sink.records(),
            vec![
                "45.0|47.5|41.3|0.0|0.0|0.0|0.0",
                "45.0|47.5|41.3|0.0|0.0|52.3|0.0",
            ]
        );
    }

    #[test]
    fn test_zones_beyond_seventh_are_not_written() {
        let mut fs = MockFs::typical_system();
        fs.set_thermal_zone(8, "extra", 99_000);
        fs.set_thermal_zone(12, "way-out", 99_000);
        let (mut c, sink) = collector(fs);
        c.collect().unwrap();

        assert_eq!(sink.records(), vec!["45.0|47.5|41.3|0.0|0.0|0.0|0.0"]);
    }

    #[test]
    fn test_no_zones_no_record() {
        let mut fs = MockFs::new();
        fs.add_dir("/sys/class/thermal");
        let (mut c, sink) = collector(fs);
        c.collect().unwrap();
        assert!(sink.records().is_empty());
    }

    #[test]
    fn test_missing_thermal_class_is_cycle_error() {
        let mut fs = MockFs::new();
        fs.add_dir("/sys");
        let (mut c, _sink) = collector(fs);
        assert!(matches!(c.collect(), Err(CycleError::Collect(_))));
    }
}
