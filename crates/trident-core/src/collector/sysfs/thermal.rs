use tracing::trace;

use super::SysSource;
use crate::collector::procfs::CollectError;
use crate::collector::traits::FileSystem;

/// One `thermal_zone<N>` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThermalZone {
    /// The `<N>` suffix as found in sysfs (normally numeric).
    pub name: String,
    pub zone_type: String,
    /// Temperature, milli-degrees Celsius.
    pub temp: i64,
}

impl ThermalZone {
    pub fn celsius(&self) -> f64 {
        self.temp as f64 / 1000.0
    }
}

impl<F: FileSystem> SysSource<F> {
    /// Reads all thermal zones under `class/thermal`.
    ///
    /// Zones whose `temp` is unreadable (sensor offline) are skipped.
    pub fn thermal_zones(&self) -> Result<Vec<ThermalZone>, CollectError> {
        let class_dir = self.sys_path().join("class/thermal");
        let mut zones = Vec::new();

        for (name, path) in self.numbered_entries(&class_dir, "thermal_zone")? {
            let temp = match self.fs().read_to_string(&path.join("temp")) {
                Ok(content) => match content.trim().parse::<i64>() {
                    Ok(t) => t,
                    Err(_) => {
                        trace!(zone = %name, "unparseable temperature");
                        continue;
                    }
                },
                Err(e) => {
                    trace!(zone = %name, error = %e, "temperature unreadable");
                    continue;
                }
            };
            let zone_type = self
                .fs()
                .read_to_string(&path.join("type"))
                .map(|s| s.trim().to_string())
                .unwrap_or_default();

            zones.push(ThermalZone {
                name,
                zone_type,
                temp,
            });
        }

        Ok(zones)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    #[test]
    fn test_reads_zones() {
        let sys = SysSource::open(MockFs::typical_system(), "/sys").unwrap();
        let zones = sys.thermal_zones().unwrap();

        assert_eq!(zones.len(), 3);
        assert_eq!(zones[0].name, "0");
        assert_eq!(zones[0].zone_type, "soc-thermal");
        assert_eq!(zones[1].celsius(), 47.5);
    }

    #[test]
    fn test_skips_unreadable_zone_and_cooling_devices() {
        let mut fs = MockFs::typical_system();
        fs.add_file("/sys/class/thermal/thermal_zone3/type", "npu-thermal\n");
        fs.add_file("/sys/class/thermal/cooling_device0/type", "fan\n");
        fs.set_thermal_zone(4, "center-thermal", -5_000);
        let sys = SysSource::open(fs, "/sys").unwrap();

        let zones = sys.thermal_zones().unwrap();
        let names: Vec<&str> = zones.iter().map(|z| z.name.as_str()).collect();
        assert_eq!(names, vec!["0", "1", "2", "4"]);
        assert_eq!(zones[3].celsius(), -5.0);
    }
}
