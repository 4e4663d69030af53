use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::routing::Node;
use super::state::JourneyState;
use super::suspend::SuspendPayload;

/// The suspend point a journey is currently parked at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSuspend {
    pub node: Node,
    pub payload: SuspendPayload,
    #[serde(default)]
    pub attempt: u32,
}

/// Everything needed to resume a journey after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    pub state: JourneyState,
    pub pending: Option<PendingSuspend>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(thread_id: impl Into<String>, state: JourneyState, pending: Option<PendingSuspend>) -> Self {
        Self {
            thread_id: thread_id.into(),
            state,
            pending,
            updated_at: Utc::now(),
        }
    }
}

/// Storage abstraction for journey checkpoints.
pub trait CheckpointStore: Send + Sync {
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;
    fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;
    fn delete(&self, thread_id: &str) -> Result<(), CheckpointError>;
    fn threads(&self) -> Result<Vec<String>, CheckpointError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("invalid thread id '{0}'")]
    InvalidThreadId(String),
    #[error("checkpoint io failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("checkpoint for '{thread_id}' is corrupt: {source}")]
    Corrupt {
        thread_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("checkpoint store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let mut guard = self.checkpoints.lock().unwrap_or_else(PoisonError::into_inner);
        guard.insert(checkpoint.thread_id.clone(), checkpoint.clone());
        Ok(())
    }

    fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let guard = self.checkpoints.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.get(thread_id).cloned())
    }

    fn delete(&self, thread_id: &str) -> Result<(), CheckpointError> {
        let mut guard = self.checkpoints.lock().unwrap_or_else(PoisonError::into_inner);
        guard.remove(thread_id);
        Ok(())
    }

    fn threads(&self) -> Result<Vec<String>, CheckpointError> {
        let guard = self.checkpoints.lock().unwrap_or_else(PoisonError::into_inner);
        let mut threads: Vec<String> = guard.keys().cloned().collect();
        threads.sort();
        Ok(threads)
    }
}

/// One pretty-printed JSON file per thread inside `root`.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    root: PathBuf,
}

impl FileCheckpointStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| CheckpointError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, thread_id: &str) -> Result<PathBuf, CheckpointError> {
        let valid = !thread_id.is_empty()
            && thread_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(CheckpointError::InvalidThreadId(thread_id.to_string()));
        }
        Ok(self.root.join(format!("{thread_id}.json")))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let path = self.path_for(&checkpoint.thread_id)?;
        let body = serde_json::to_vec_pretty(checkpoint).map_err(|source| {
            CheckpointError::Corrupt {
                thread_id: checkpoint.thread_id.clone(),
                source,
            }
        })?;

        let staging = path.with_extension("json.tmp");
        fs::write(&staging, body).map_err(|source| CheckpointError::Io {
            path: staging.clone(),
            source,
        })?;
        fs::rename(&staging, &path).map_err(|source| CheckpointError::Io {
            path: path.clone(),
            source,
        })
    }

    fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.path_for(thread_id)?;
        let body = match fs::read(&path) {
            Ok(body) => body,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CheckpointError::Io { path, source }),
        };
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|source| CheckpointError::Corrupt {
                thread_id: thread_id.to_string(),
                source,
            })
    }

    fn delete(&self, thread_id: &str) -> Result<(), CheckpointError> {
        let path = self.path_for(thread_id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CheckpointError::Io { path, source }),
        }
    }

    fn threads(&self) -> Result<Vec<String>, CheckpointError> {
        let entries = fs::read_dir(&self.root).map_err(|source| CheckpointError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut threads = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| CheckpointError::Io {
                path: self.root.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                threads.push(stem.to_string());
            }
        }
        threads.sort();
        Ok(threads)
    }
}
