//! A minimal coordination-store abstraction standing in for the
//! ZooKeeper-backed store described in spec §5/§6: hierarchical paths,
//! CAS via a version stat, and `NoNodeError`/`BadVersionError` as distinct
//! outcomes. The file-backed implementation below mirrors the advisory
//! file locking the rest of this crate's ambient stack already used for
//! safe concurrent access to shared files, generalized into a
//! version-checked compare-and-swap.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use fs2::FileExt;

use crate::error::{PipelineError, Result};

/// A node's value plus the version it was read at.
#[derive(Debug, Clone)]
pub struct Versioned {
    pub value: String,
    pub version: u64,
}

pub trait CoordinationStore: Send + Sync {
    fn read(&self, path: &str) -> Result<Option<Versioned>>;

    /// Compare-and-swap: write `value` to `path` iff the node's current
    /// version equals `expected_version` (or the node doesn't exist and
    /// `expected_version == 0`). Returns the new version on success.
    fn compare_and_swap(&self, path: &str, value: &str, expected_version: u64) -> Result<u64>;

    fn delete(&self, path: &str) -> Result<()>;
}

/// Read-transform-CAS loop used by every mutator in this crate that needs
/// optimistic concurrency (semaphore holders, pipeline state, item
/// attributes) — spec §5 "Optimistic concurrency".
pub fn update_versioned<T>(
    store: &dyn CoordinationStore,
    path: &str,
    max_retries: u32,
    mut transform: impl FnMut(Option<&str>) -> (String, T),
) -> Result<T> {
    let mut attempts = 0;
    loop {
        let current = store.read(path)?;
        let (expected_version, current_value) = match &current {
            Some(v) => (v.version, Some(v.value.as_str())),
            None => (0, None),
        };
        let (new_value, result) = transform(current_value);
        match store.compare_and_swap(path, &new_value, expected_version) {
            Ok(_) => return Ok(result),
            Err(PipelineError::VersionConflict { .. }) => {
                attempts += 1;
                if attempts >= max_retries {
                    return Err(PipelineError::VersionConflict {
                        path: path.to_string(),
                        attempts,
                    });
                }
                continue;
            }
            Err(e) => return Err(e),
        }
    }
}

/// In-process, file-backed `CoordinationStore`. One JSON-ish line per node
/// (`"<version>\n<value>"`) under `root`, locked with `fs2` advisory locks
/// the same way the rest of this crate's file I/O serializes concurrent
/// writers.
pub struct FileCoordinationStore {
    root: PathBuf,
    // Guards the open-lock-read/write-unlock sequence against concurrent
    // writers within this same process; cross-process safety comes from
    // the fs2 advisory lock itself.
    guard: Mutex<()>,
}

impl FileCoordinationStore {
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root, guard: Mutex::new(()) })
    }

    fn node_path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/').replace('/', "__"))
    }
}

impl CoordinationStore for FileCoordinationStore {
    fn read(&self, path: &str) -> Result<Option<Versioned>> {
        let _guard = self.guard.lock().unwrap();
        let node_path = self.node_path(path);
        if !node_path.exists() {
            return Ok(None);
        }
        let file = File::open(&node_path)?;
        file.lock_shared()?;
        let mut content = String::new();
        (&file).read_to_string(&mut content)?;
        FileExt::unlock(&file)?;
        let Some((version_line, value)) = content.split_once('\n') else {
            return Ok(None);
        };
        let version: u64 = version_line.parse().unwrap_or(0);
        Ok(Some(Versioned { value: value.to_string(), version }))
    }

    fn compare_and_swap(&self, path: &str, value: &str, expected_version: u64) -> Result<u64> {
        let _guard = self.guard.lock().unwrap();
        let node_path = self.node_path(path);

        let file = OpenOptions::new().read(true).write(true).create(true).open(&node_path)?;
        file.lock_exclusive()?;

        let mut content = String::new();
        (&file).read_to_string(&mut content)?;
        let current_version: u64 = content
            .split_once('\n')
            .map(|(v, _)| v.parse().unwrap_or(0))
            .unwrap_or(0);

        if current_version != expected_version {
            FileExt::unlock(&file)?;
            return Err(PipelineError::VersionConflict { path: path.to_string(), attempts: 0 });
        }

        let new_version = current_version + 1;
        let mut file = file;
        file.set_len(0)?;
        use std::io::Seek;
        file.seek(std::io::SeekFrom::Start(0))?;
        write!(file, "{new_version}\n{value}")?;
        file.flush()?;
        FileExt::unlock(&file)?;
        Ok(new_version)
    }

    fn delete(&self, path: &str) -> Result<()> {
        let _guard = self.guard.lock().unwrap();
        let node_path = self.node_path(path);
        match std::fs::remove_file(&node_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for fast unit tests that don't need real files.
#[derive(Default)]
pub struct MemoryCoordinationStore {
    nodes: Mutex<HashMap<String, Versioned>>,
}

impl MemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CoordinationStore for MemoryCoordinationStore {
    fn read(&self, path: &str) -> Result<Option<Versioned>> {
        Ok(self.nodes.lock().unwrap().get(path).cloned())
    }

    fn compare_and_swap(&self, path: &str, value: &str, expected_version: u64) -> Result<u64> {
        let mut nodes = self.nodes.lock().unwrap();
        let current_version = nodes.get(path).map(|v| v.version).unwrap_or(0);
        if current_version != expected_version {
            return Err(PipelineError::VersionConflict { path: path.to_string(), attempts: 0 });
        }
        let new_version = current_version + 1;
        nodes.insert(path.to_string(), Versioned { value: value.to_string(), version: new_version });
        Ok(new_version)
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.nodes.lock().unwrap().remove(path);
        Ok(())
    }
}

fn url_escape(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

pub fn semaphore_path(tenant: &str, name: &str) -> String {
    format!("/zuul/semaphores/{tenant}/{}", url_escape(name))
}

pub fn pipeline_path(tenant: &str, pipeline: &str) -> String {
    format!("/zuul/pipelines/{tenant}/{pipeline}")
}
