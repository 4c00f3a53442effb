//! File-system seam for the save store.
//!
//! RULE: `write_bytes` is all-or-nothing. A crash mid-write must leave
//! the previous file intact, so `LocalFs` writes a sibling temp file,
//! syncs it and renames it over the target.
//!
//! `MemoryFs` keeps everything in a map and counts writes, for tests
//! that need to prove a refused save touched nothing.

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
};

pub trait FileStore {
    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Atomically replace `path` with `data`, creating parent directories.
    fn write_bytes(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// File names (not paths) directly inside `dir`, sorted. A missing
    /// directory lists as empty.
    fn list_dir(&self, dir: &Path) -> io::Result<Vec<String>>;

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove(&self, path: &Path) -> io::Result<()>;

    fn exists(&self, path: &Path) -> bool;
}

// ── Local disk ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl LocalFs {
    fn temp_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        path.with_file_name(name)
    }
}

impl FileStore for LocalFs {
    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write_bytes(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = Self::temp_path(path);
        let mut file = File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(())
    }

    fn list_dir(&self, dir: &Path) -> io::Result<Vec<String>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        let data = fs::read(from)?;
        self.write_bytes(to, &data)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

// ── In memory ──────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryFs {
    files:       Mutex<BTreeMap<PathBuf, Vec<u8>>>,
    writes:      AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful `write_bytes`/`copy` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every following write fail with `io::ErrorKind::Other`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files().keys().cloned().collect()
    }

    /// Place raw bytes without counting a write.
    pub fn seed(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) {
        self.files().insert(path.into(), data.into());
    }

    fn files(&self) -> MutexGuard<'_, BTreeMap<PathBuf, Vec<u8>>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn not_found(path: &Path) -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, format!("{} does not exist", path.display()))
    }
}

impl FileStore for MemoryFs {
    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files().get(path).cloned().ok_or_else(|| Self::not_found(path))
    }

    fn write_bytes(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::other("simulated write failure"));
        }
        self.files().insert(path.to_path_buf(), data.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn list_dir(&self, dir: &Path) -> io::Result<Vec<String>> {
        Ok(self
            .files()
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .filter_map(|p| p.file_name()?.to_str().map(str::to_string))
            .collect())
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        let data = self.read_bytes(from)?;
        self.write_bytes(to, &data)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.files().remove(path).map(|_| ()).ok_or_else(|| Self::not_found(path))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files().contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("slot.json");

        LocalFs.write_bytes(&path, b"first").unwrap();
        LocalFs.write_bytes(&path, b"second").unwrap();

        assert_eq!(LocalFs.read_bytes(&path).unwrap(), b"second");
        let names = LocalFs.list_dir(path.parent().unwrap()).unwrap();
        assert_eq!(names, vec!["slot.json".to_string()]);
    }

    #[test]
    fn missing_directory_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let names = LocalFs.list_dir(&dir.path().join("absent")).unwrap();
        assert!(names.is_empty());
    }

    #[test]
    fn memory_fs_counts_and_fails_writes() {
        let fs = MemoryFs::new();
        fs.write_bytes(Path::new("/s/a.json"), b"x").unwrap();
        assert_eq!(fs.write_count(), 1);

        fs.set_fail_writes(true);
        assert!(fs.write_bytes(Path::new("/s/b.json"), b"y").is_err());
        assert_eq!(fs.write_count(), 1);
        assert_eq!(fs.list_dir(Path::new("/s")).unwrap(), vec!["a.json".to_string()]);
    }
}
