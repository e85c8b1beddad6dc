//! In-memory mock filesystem for testing collectors without real `/proc`.
//!
//! `MockFs` simulates both `/proc` and `/sys` in memory, so every collector
//! can be driven through several scrape cycles with processes appearing,
//! exiting and being denied, on any platform.

use crate::collector::traits::FileSystem;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

/// In-memory filesystem for testing.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    /// Map from path to file contents.
    files: HashMap<PathBuf, String>,
    /// Set of directories (for read_dir support).
    directories: HashSet<PathBuf>,
    /// Paths that fail with `PermissionDenied` on read.
    denied: HashSet<PathBuf>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file with the given content, replacing any previous content.
    ///
    /// Parent directories are automatically created.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.files.insert(path, content.into());
    }

    /// Adds an empty directory.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.directories.insert(path);
    }

    fn add_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }

    /// Removes a file or a whole directory tree.
    pub fn remove(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.files.retain(|p, _| !p.starts_with(path));
        self.directories.retain(|p| !p.starts_with(path));
        self.denied.retain(|p| !p.starts_with(path));
    }

    /// Makes reads of `path` fail with `PermissionDenied`.
    ///
    /// Works for both files and directories (`read_dir`).
    pub fn deny(&mut self, path: impl AsRef<Path>) {
        self.denied.insert(path.as_ref().to_path_buf());
    }

    /// Undoes [`MockFs::deny`] for `path`.
    pub fn allow(&mut self, path: impl AsRef<Path>) {
        self.denied.remove(path.as_ref());
    }

    /// Adds a process with its required `/proc/[pid]/` files.
    ///
    /// # Arguments
    /// * `pid` - Process ID
    /// * `stat` - Content of `/proc/[pid]/stat`
    /// * `status` - Content of `/proc/[pid]/status`
    /// * `io` - Content of `/proc/[pid]/io` (empty to omit the file)
    /// * `cmdline` - Content of `/proc/[pid]/cmdline`
    pub fn add_process(&mut self, pid: u32, stat: &str, status: &str, io: &str, cmdline: &str) {
        let base = PathBuf::from(format!("/proc/{}", pid));
        self.remove(&base);
        self.add_dir(&base);
        self.add_file(base.join("stat"), stat);
        self.add_file(base.join("status"), status);
        if !io.is_empty() {
            self.add_file(base.join("io"), io);
        }
        self.add_file(base.join("cmdline"), cmdline);
    }

    /// Populates `/proc/[pid]/fd` with `count` descriptor entries.
    pub fn add_fds(&mut self, pid: u32, count: usize) {
        let fd_dir = PathBuf::from(format!("/proc/{}/fd", pid));
        self.remove(&fd_dir);
        self.add_dir(&fd_dir);
        for fd in 0..count {
            self.add_file(fd_dir.join(fd.to_string()), "");
        }
    }

    fn check_denied(&self, path: &Path) -> io::Result<()> {
        if self.denied.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("permission denied: {:?}", path),
            ));
        }
        Ok(())
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.check_denied(path)?;
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.directories.contains(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        self.check_denied(path)?;
        if !self.directories.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory not found: {:?}", path),
            ));
        }

        let mut entries = HashSet::new();

        for file_path in self.files.keys() {
            if file_path.parent().is_some_and(|parent| parent == path) {
                entries.insert(file_path.clone());
            }
        }

        for dir_path in &self.directories {
            if dir_path.parent().is_some_and(|parent| parent == path) && dir_path != path {
                entries.insert(dir_path.clone());
            }
        }

        Ok(entries.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_fs_add_file() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/stat", "cpu  1 2 3 4\n");

        assert!(fs.exists(Path::new("/proc/stat")));
        assert!(fs.exists(Path::new("/proc")));

        let content = fs.read_to_string(Path::new("/proc/stat")).unwrap();
        assert_eq!(content, "cpu  1 2 3 4\n");
    }

    #[test]
    fn test_mock_fs_read_dir() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/1/stat", "stat content");
        fs.add_file("/proc/1/status", "status content");
        fs.add_file("/proc/2/stat", "stat content 2");

        let proc_entries = fs.read_dir(Path::new("/proc")).unwrap();
        assert_eq!(proc_entries.len(), 2);

        let proc1_entries = fs.read_dir(Path::new("/proc/1")).unwrap();
        assert_eq!(proc1_entries.len(), 2);
    }

    #[test]
    fn test_mock_fs_remove_tree() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/1/stat", "a");
        fs.add_file("/proc/10/stat", "b");
        fs.remove("/proc/1");

        assert!(!fs.exists(Path::new("/proc/1")));
        assert!(!fs.exists(Path::new("/proc/1/stat")));
        // Path-component prefix, not string prefix.
        assert!(fs.exists(Path::new("/proc/10/stat")));
    }

    #[test]
    fn test_mock_fs_add_fds() {
        let mut fs = MockFs::new();
        fs.add_fds(42, 3);
        assert_eq!(fs.read_dir(Path::new("/proc/42/fd")).unwrap().len(), 3);

        fs.add_fds(42, 1);
        assert_eq!(fs.read_dir(Path::new("/proc/42/fd")).unwrap().len(), 1);
    }

    #[test]
    fn test_mock_fs_denied() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/7/io", "read_bytes: 1\n");
        fs.deny("/proc/7/io");

        let err = fs.read_to_string(Path::new("/proc/7/io")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_mock_fs_not_found() {
        let fs = MockFs::new();
        let result = fs.read_to_string(Path::new("/nonexistent"));
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);
    }
}
