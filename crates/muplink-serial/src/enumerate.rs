use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, TransportError};

/// Device-name prefixes that identify candidate boards.
const ENDPOINT_PREFIXES: &[&str] = &["ttyACM", "ttyUSB"];

/// Yields the serial paths a registry scan should consider.
///
/// The registry owns connect/disconnect lifecycle; enumerators only
/// report what exists right now.
pub trait EndpointEnumerator: Send + Sync {
    fn endpoints(&self) -> Result<Vec<PathBuf>>;
}

/// Default enumerator: entries under `/dev` whose names begin with
/// `ttyACM` or `ttyUSB`, sorted.
#[derive(Debug, Clone)]
pub struct DevEnumerator {
    dev_dir: PathBuf,
}

impl Default for DevEnumerator {
    fn default() -> Self {
        Self {
            dev_dir: PathBuf::from("/dev"),
        }
    }
}

impl DevEnumerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan a directory other than `/dev`. Mostly for tests.
    pub fn with_dev_dir(dev_dir: impl AsRef<Path>) -> Self {
        Self {
            dev_dir: dev_dir.as_ref().to_path_buf(),
        }
    }
}

impl EndpointEnumerator for DevEnumerator {
    fn endpoints(&self) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(&self.dev_dir).map_err(|source| {
            TransportError::Enumerate {
                dir: self.dev_dir.clone(),
                source,
            }
        })?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| ENDPOINT_PREFIXES.iter().any(|p| name.starts_with(p)))
            })
            .map(|entry| entry.path())
            .collect();
        paths.sort();
        debug!(dir = ?self.dev_dir, count = paths.len(), "enumerated serial endpoints");
        Ok(paths)
    }
}

/// A fixed endpoint list, for tests and emulated setups.
#[derive(Debug, Clone, Default)]
pub struct StaticEnumerator {
    paths: Vec<PathBuf>,
}

impl StaticEnumerator {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }
}

impl EndpointEnumerator for StaticEnumerator {
    fn endpoints(&self) -> Result<Vec<PathBuf>> {
        Ok(self.paths.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("muplink-enum-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("scratch dir should be creatable");
        dir
    }

    #[test]
    fn lists_matching_names_sorted() {
        let dir = scratch_dir("sorted");
        for name in ["ttyUSB1", "ttyACM0", "ttyS0", "sda", "ttyACM10"] {
            std::fs::write(dir.join(name), b"").unwrap();
        }

        let endpoints = DevEnumerator::with_dev_dir(&dir).endpoints().unwrap();
        let names: Vec<_> = endpoints
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["ttyACM0", "ttyACM10", "ttyUSB1"]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_dir_yields_no_endpoints() {
        let dir = scratch_dir("empty");
        let endpoints = DevEnumerator::with_dev_dir(&dir).endpoints().unwrap();
        assert!(endpoints.is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_dir_is_an_enumerate_error() {
        let result = DevEnumerator::with_dev_dir("/definitely/not/a/dir").endpoints();
        assert!(matches!(result, Err(TransportError::Enumerate { .. })));
    }

    #[test]
    fn static_enumerator_returns_its_list() {
        let paths = vec![PathBuf::from("/dev/ttyACM0"), PathBuf::from("/dev/ttyACM1")];
        let enumerator = StaticEnumerator::new(paths.clone());
        assert_eq!(enumerator.endpoints().unwrap(), paths);
    }
}
