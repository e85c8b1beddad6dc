use super::SysSource;
use crate::collector::procfs::CollectError;
use crate::collector::traits::FileSystem;

/// Current frequency of one CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuFreq {
    pub cpu: u32,
    pub khz: u64,
}

impl CpuFreq {
    /// Frequency in Hz (sysfs reports kHz).
    pub fn hz(&self) -> u64 {
        self.khz.saturating_mul(1000)
    }
}

impl<F: FileSystem> SysSource<F> {
    /// Reads `devices/system/cpu/cpu<N>/cpufreq/scaling_cur_freq` (falling back
    /// to `cpuinfo_cur_freq`) for every CPU, in CPU order.
    ///
    /// CPUs without cpufreq support are skipped.
    pub fn cpufreqs(&self) -> Result<Vec<CpuFreq>, CollectError> {
        let cpu_dir = self.sys_path().join("devices/system/cpu");
        let mut freqs = Vec::new();

        for (suffix, path) in self.numbered_entries(&cpu_dir, "cpu")? {
            let Ok(cpu) = suffix.parse::<u32>() else {
                continue;
            };
            let khz = self
                .read_u64(&path.join("cpufreq/scaling_cur_freq"))
                .or_else(|| self.read_u64(&path.join("cpufreq/cpuinfo_cur_freq")));
            if let Some(khz) = khz {
                freqs.push(CpuFreq { cpu, khz });
            }
        }

        Ok(freqs)
    }
}
