use crate::error::{CheckpointError, ModelLoadError};
use crate::players::Record;
use chrono::Local;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Snapshot of one agent: its table(s), hyperparameters and lifetime counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCheckpoint<C, T> {
    pub kind: String,
    pub name: String,
    pub config: C,
    pub table: T,
    pub record: Record,
    pub saved_at: String,
}

impl<C, T> AgentCheckpoint<C, T> {
    pub fn new(kind: &str, name: &str, config: C, table: T, record: Record) -> Self {
        AgentCheckpoint {
            kind: kind.to_owned(),
            name: name.to_owned(),
            config,
            table,
            record,
            saved_at: Local::now().to_rfc3339(),
        }
    }
}

impl<C: Serialize, T: Serialize> AgentCheckpoint<C, T> {
    pub fn to_disk(&self, path: &Path) -> Result<(), CheckpointError> {
        write_atomic(path, |writer| {
            serde_pickle::to_writer(writer, self, serde_pickle::SerOptions::new())?;
            Ok(())
        })
    }
}

impl<C: DeserializeOwned, T: DeserializeOwned> AgentCheckpoint<C, T> {
    /// Reads a checkpoint and checks it was written by an agent of `kind`.
    pub fn from_disk(path: &Path, kind: &str) -> Result<Self, ModelLoadError> {
        let file = open(path)?;
        let decoded: Self =
            serde_pickle::from_reader(BufReader::new(file), serde_pickle::DeOptions::new())
                .map_err(|e| ModelLoadError::Corrupt {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
        if decoded.kind != kind {
            return Err(ModelLoadError::KindMismatch {
                path: path.to_path_buf(),
                expected: kind.to_owned(),
                found: decoded.kind,
            });
        }
        Ok(decoded)
    }
}

/// File names of one checkpoint set: `{prefix}_agent1`, `{prefix}_agent2`,
/// `{prefix}_stats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointPaths {
    pub agent1: PathBuf,
    pub agent2: PathBuf,
    pub stats: PathBuf,
}

impl CheckpointPaths {
    pub fn new(dir: &Path, prefix: &str) -> Self {
        CheckpointPaths {
            agent1: dir.join(format!("{prefix}_agent1.pickle")),
            agent2: dir.join(format!("{prefix}_agent2.pickle")),
            stats: dir.join(format!("{prefix}_stats.json")),
        }
    }
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CheckpointError> {
    write_atomic(path, |writer| {
        serde_json::to_writer(writer, value)?;
        Ok(())
    })
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ModelLoadError> {
    let file = open(path)?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| ModelLoadError::Corrupt {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn open(path: &Path) -> Result<File, ModelLoadError> {
    File::open(path).map_err(|source| ModelLoadError::Missing {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes into a temporary file next to `path` and renames it over `path`,
/// so a reader never sees a half-written checkpoint. The temporary file is
/// removed when writing fails.
fn write_atomic<F>(path: &Path, write: F) -> Result<(), CheckpointError>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<(), CheckpointError>,
{
    let io_err = |source: std::io::Error| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(io_err)?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write(&mut writer)?;
        writer.flush().map_err(io_err)?;
    }
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
