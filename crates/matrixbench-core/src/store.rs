//! Persisted task records.
//!
//! The store is a single pretty-printed JSON document inside the output
//! directory, rewritten in full after every mutation: the new content goes to
//! a temporary sibling file that is flushed and then renamed over the store
//! file. Single writer, single process; nothing locks the file.

use matrixbench_proto::TaskRecord;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the store inside an output directory.
pub const STORE_FILE_NAME: &str = "matrixbench.json";

const STORE_VERSION: u32 = 1;

/// On-disk layout of the store file.
#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default = "default_version")]
    version: u32,

    #[serde(default)]
    tasks: Vec<TaskRecord>,
}

fn default_version() -> u32 {
    STORE_VERSION
}

/// Mapping from task id to task record, backed by a JSON file.
#[derive(Debug)]
pub struct ResultStore {
    path: PathBuf,
    tasks: Vec<TaskRecord>,
}

impl ResultStore {
    /// Opens the store at `path`, creating it when missing.
    ///
    /// With `purge` set, every existing record is discarded and the emptied
    /// store is written back immediately.
    pub fn open(path: impl AsRef<Path>, purge: bool) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let tasks = if purge || !path.exists() {
            Vec::new()
        } else {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                Vec::new()
            } else {
                let document: StoreDocument = serde_json::from_str(&content)
                    .map_err(|source| StoreError::Corrupt {
                        path: path.clone(),
                        source,
                    })?;
                if document.version > STORE_VERSION {
                    return Err(StoreError::UnsupportedVersion(document.version));
                }
                document.tasks
            }
        };

        debug!(path = %path.display(), purge, records = tasks.len(), "Opened result store");

        let store = Self { path, tasks };
        if purge || !store.path.exists() {
            store.persist()?;
        }
        Ok(store)
    }

    /// Opens the store file inside an output directory.
    pub fn open_in(output_dir: impl AsRef<Path>, purge: bool) -> Result<Self, StoreError> {
        Self::open(output_dir.as_ref().join(STORE_FILE_NAME), purge)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Inserts a record, replacing any stored record with the same id.
    ///
    /// Returns true when an existing record was replaced.
    pub fn insert(&mut self, record: TaskRecord) -> Result<bool, StoreError> {
        let replaced = match self.position(&record.id) {
            Some(index) => {
                self.tasks[index] = record;
                true
            }
            None => {
                self.tasks.push(record);
                false
            }
        };
        self.persist()?;
        Ok(replaced)
    }

    /// Inserts many records with a single write.
    pub fn insert_all(
        &mut self,
        records: impl IntoIterator<Item = TaskRecord>,
    ) -> Result<usize, StoreError> {
        let mut replaced = 0;
        for record in records {
            match self.position(&record.id) {
                Some(index) => {
                    self.tasks[index] = record;
                    replaced += 1;
                }
                None => self.tasks.push(record),
            }
        }
        self.persist()?;
        Ok(replaced)
    }

    /// Replaces the stored record whose id matches `record.id`.
    pub fn update(&mut self, record: &TaskRecord) -> Result<(), StoreError> {
        let index = self
            .position(&record.id)
            .ok_or_else(|| StoreError::NotFound(record.id.clone()))?;
        self.tasks[index] = record.clone();
        self.persist()
    }

    /// Returns the record with the given id.
    pub fn get(&self, id: &str) -> Option<&TaskRecord> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Returns every stored record.
    pub fn all_records(&self) -> Vec<TaskRecord> {
        self.tasks.clone()
    }

    /// Returns the records matching `predicate`.
    pub fn find_where<P>(&self, predicate: P) -> Vec<TaskRecord>
    where
        P: Fn(&TaskRecord) -> bool,
    {
        self.tasks.iter().filter(|task| predicate(task)).cloned().collect()
    }

    /// Returns the records that have no timing result yet.
    pub fn pending_or_failed(&self) -> Vec<TaskRecord> {
        self.find_where(|task| task.timing_result.is_none())
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true when the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == id)
    }

    /// Writes the full document through a temporary file and renames it into place.
    fn persist(&self) -> Result<(), StoreError> {
        let document = StoreDocument {
            version: STORE_VERSION,
            tasks: self.tasks.clone(),
        };
        let content = serde_json::to_string_pretty(&document)?;

        let temp_path = self.path.with_extension("json.tmp");
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;

        debug!(path = %self.path.display(), records = self.tasks.len(), "Persisted result store");
        Ok(())
    }
}

/// Errors raised by the result store. All of them abort a run.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Result store {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Result store version {0} is newer than this build supports")]
    UnsupportedVersion(u32),

    #[error("No task with id '{0}' in the result store")]
    NotFound(String),
}
