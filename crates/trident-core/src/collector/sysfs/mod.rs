//! Readers for `/sys` attributes: CPU frequency and thermal zones.

mod cpufreq;
mod thermal;

pub use cpufreq::CpuFreq;
pub use thermal::ThermalZone;

use std::io;
use std::path::{Path, PathBuf};

use crate::collector::procfs::CollectError;
use crate::collector::traits::FileSystem;

/// Handle on a sysfs mount.
pub struct SysSource<F: FileSystem> {
    fs: F,
    sys_path: PathBuf,
}

impl<F: FileSystem> SysSource<F> {
    /// Opens the sysfs root; it must exist.
    pub fn open(fs: F, sys_path: impl Into<PathBuf>) -> Result<Self, CollectError> {
        let sys_path = sys_path.into();
        if !fs.exists(&sys_path) {
            return Err(CollectError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("sysfs not found at {}", sys_path.display()),
            )));
        }
        Ok(Self { fs, sys_path })
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn fs_mut(&mut self) -> &mut F {
        &mut self.fs
    }

    pub fn sys_path(&self) -> &Path {
        &self.sys_path
    }

    /// Entries of `dir` named `<prefix><number>`, sorted by number.
    fn numbered_entries(
        &self,
        dir: &Path,
        prefix: &str,
    ) -> Result<Vec<(String, PathBuf)>, CollectError> {
        let mut entries: Vec<(u64, String, PathBuf)> = self
            .fs
            .read_dir(dir)?
            .into_iter()
            .filter_map(|path| {
                let suffix = path
                    .file_name()?
                    .to_str()?
                    .strip_prefix(prefix)?
                    .to_string();
                let n = suffix.parse::<u64>().ok();
                Some((n.unwrap_or(u64::MAX), suffix, path))
            })
            .collect();
        entries.sort();
        let entries = entries.into_iter().map(|(_, suffix, path)| (suffix, path));
        Ok(entries.collect())
    }

    fn read_u64(&self, path: &Path) -> Option<u64> {
        self.fs.read_to_string(path).ok()?.trim().parse().ok()
    }
}
