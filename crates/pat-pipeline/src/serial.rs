//! Persistent calibration serial counter.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;

/// Plain-text file holding the last issued calibration serial.
///
/// A missing file counts as serial 0. Each process start calls
/// [`next_calibration_serial`](Self::next_calibration_serial) once and uses
/// the returned value for every file it writes.
#[derive(Debug, Clone)]
pub struct SerialStore {
    path: PathBuf,
}

impl SerialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last issued serial (0 if none).
    pub fn current(&self) -> Result<u64> {
        if !self.path.exists() {
            return Ok(0);
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read serial file {}", self.path.display()))?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(0);
        }
        trimmed.parse::<u64>().with_context(|| {
            format!(
                "serial file {} does not hold an integer: {trimmed:?}",
                self.path.display()
            )
        })
    }

    /// Increment, persist and return the new serial.
    pub fn next_calibration_serial(&self) -> Result<u64> {
        let serial = self.current()? + 1;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&self.path, serial.to_string())
            .with_context(|| format!("failed to write serial file {}", self.path.display()))?;
        debug!("calibration serial {serial} stored in {}", self.path.display());
        Ok(serial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_starts_at_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = SerialStore::new(dir.path().join("cal_serial.txt"));
        assert_eq!(store.current().unwrap(), 0);
        assert_eq!(store.next_calibration_serial().unwrap(), 1);
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "1");
    }

    #[test]
    fn each_run_adds_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cal_serial.txt");
        fs::write(&path, "41\n").unwrap();

        let first = SerialStore::new(&path).next_calibration_serial().unwrap();
        let second = SerialStore::new(&path).next_calibration_serial().unwrap();
        assert_eq!(first, 42);
        assert_eq!(second, 43);
    }

    #[test]
    fn garbage_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cal_serial.txt");
        fs::write(&path, "forty").unwrap();

        let err = SerialStore::new(&path).next_calibration_serial().unwrap_err();
        assert!(format!("{err:#}").contains("does not hold an integer"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "forty");
    }

    #[test]
    fn parent_directory_created() {
        let dir = tempfile::tempdir().unwrap();
        let store = SerialStore::new(dir.path().join("state").join("serial"));
        assert_eq!(store.next_calibration_serial().unwrap(), 1);
    }
}
