//! Write-ahead log and snapshot files behind a durable document store.
//!
//! The WAL is a sequence of frames, each a little-endian `u32` length
//! followed by a MessagePack-encoded [`WalEntry`]. A checkpoint writes the
//! full collection map as a snapshot and truncates the WAL; recovery loads
//! the snapshot and replays whatever frames follow it.

use crate::core::{CaptureError, Result};
use crate::storage::document::{Collection, Document};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

const WAL_FILE_NAME: &str = "reqlens.wal";
const SNAPSHOT_FILE_NAME: &str = "reqlens.snapshot";
const SNAPSHOT_VERSION: u32 = 1;

/// Frames appended before the store folds the WAL into a snapshot.
pub const CHECKPOINT_EVERY: usize = 1000;

fn storage_error(context: &str, err: impl std::fmt::Display) -> CaptureError {
    CaptureError::StorageError(format!("{context}: {err}"))
}

fn encoding_error(what: &str, err: impl std::fmt::Display) -> CaptureError {
    CaptureError::SerializationError(format!("{what}: {err}"))
}

/// One mutation of a collection, in the order it was applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalEntry {
    Insert { collection: String, id: String, document: Document },
    Replace { collection: String, id: String, document: Document },
    Delete { collection: String, ids: Vec<String> },
    Clear { collection: String },
}

impl WalEntry {
    /// Applies this mutation. Live writes and recovery share this path.
    pub(crate) fn apply(self, collections: &mut HashMap<String, Collection>) {
        match self {
            WalEntry::Insert { collection, id, document }
            | WalEntry::Replace { collection, id, document } => {
                collections.entry(collection).or_default().put(id, document);
            }
            WalEntry::Delete { collection, ids } => {
                if let Some(target) = collections.get_mut(&collection) {
                    for id in ids {
                        target.remove(&id);
                    }
                }
            }
            WalEntry::Clear { collection } => {
                collections.remove(&collection);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityMode {
    /// fsync after every WAL append.
    Sync,
    /// Flush to the OS after every append.
    #[default]
    Async,
    /// Nothing touches the disk.
    None,
}

impl std::str::FromStr for DurabilityMode {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sync" => Ok(Self::Sync),
            "async" => Ok(Self::Async),
            "none" | "off" => Ok(Self::None),
            other => Err(format!("unknown durability mode '{other}'")),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    collections: HashMap<String, Collection>,
}

fn write_snapshot(path: &Path, collections: &HashMap<String, Collection>) -> Result<()> {
    #[derive(Serialize)]
    struct SnapshotRef<'a> {
        version: u32,
        collections: &'a HashMap<String, Collection>,
    }

    let bytes = rmp_serde::to_vec(&SnapshotRef {
        version: SNAPSHOT_VERSION,
        collections,
    })
    .map_err(|e| encoding_error("snapshot", e))?;

    // Readers only ever see a complete snapshot.
    let staging = path.with_extension("tmp");
    let mut file = File::create(&staging).map_err(|e| storage_error("create snapshot", e))?;
    file.write_all(&bytes)
        .and_then(|()| file.sync_all())
        .map_err(|e| storage_error("write snapshot", e))?;
    fs::rename(&staging, path).map_err(|e| storage_error("publish snapshot", e))
}

fn read_snapshot(path: &Path) -> Result<HashMap<String, Collection>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(storage_error("read snapshot", e)),
    };
    let snapshot: Snapshot = rmp_serde::from_slice(&bytes).map_err(|e| encoding_error("snapshot", e))?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(CaptureError::StorageError(format!(
            "unsupported snapshot version {}",
            snapshot.version
        )));
    }
    Ok(snapshot.collections)
}

/// Reads the next frame; `None` at a clean end or a torn tail.
fn read_frame(reader: &mut impl Read) -> Result<Option<Vec<u8>>> {
    let mut len = [0u8; 4];
    match reader.read_exact(&mut len) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(storage_error("read WAL frame", e)),
    }
    let mut frame = vec![0u8; u32::from_le_bytes(len) as usize];
    match reader.read_exact(&mut frame) {
        Ok(()) => Ok(Some(frame)),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(storage_error("read WAL frame", e)),
    }
}

fn replay_wal(path: &Path) -> Result<Vec<WalEntry>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(storage_error("open WAL", e)),
    };
    let mut reader = BufReader::new(file);
    let mut entries = Vec::new();
    while let Some(frame) = read_frame(&mut reader)? {
        entries.push(rmp_serde::from_slice(&frame).map_err(|e| encoding_error("WAL entry", e))?);
    }
    Ok(entries)
}

/// Append handle on the WAL file. Lost after a failed truncate, after which
/// every append fails until the store is reopened.
struct WalWriter {
    path: PathBuf,
    file: Option<BufWriter<File>>,
    sync: bool,
    frames: usize,
}

impl WalWriter {
    fn open(path: PathBuf, sync: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| storage_error("open WAL", e))?;
        Ok(Self {
            path,
            file: Some(BufWriter::new(file)),
            sync,
            frames: 0,
        })
    }

    fn append(&mut self, entry: &WalEntry) -> Result<()> {
        let frame = rmp_serde::to_vec(entry).map_err(|e| encoding_error("WAL entry", e))?;
        let len = u32::try_from(frame.len())
            .map_err(|_| CaptureError::StorageError("WAL entry too large".to_string()))?;
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| CaptureError::StorageError("WAL is not open".to_string()))?;

        file.write_all(&len.to_le_bytes())
            .and_then(|()| file.write_all(&frame))
            .and_then(|()| file.flush())
            .map_err(|e| storage_error("append WAL", e))?;
        if self.sync {
            file.get_ref()
                .sync_data()
                .map_err(|e| storage_error("sync WAL", e))?;
        }
        self.frames += 1;
        Ok(())
    }

    fn truncate(&mut self) -> Result<()> {
        self.file = None;
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| storage_error("truncate WAL", e))?;
        self.file = Some(BufWriter::new(file));
        self.frames = 0;
        Ok(())
    }
}

/// The WAL and snapshot files of one data directory.
pub struct PersistenceManager {
    wal: WalWriter,
    snapshot_path: PathBuf,
}

impl PersistenceManager {
    /// Opens the files under `data_dir`, creating the directory if needed.
    /// Callers handle [`DurabilityMode::None`] by not persisting at all.
    pub fn new<P: AsRef<Path>>(data_dir: P, durability_mode: DurabilityMode) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir).map_err(|e| storage_error("create data directory", e))?;
        let wal = WalWriter::open(
            data_dir.join(WAL_FILE_NAME),
            durability_mode == DurabilityMode::Sync,
        )?;
        Ok(Self {
            wal,
            snapshot_path: data_dir.join(SNAPSHOT_FILE_NAME),
        })
    }

    pub fn log(&mut self, entry: &WalEntry) -> Result<()> {
        self.wal.append(entry)
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.wal.frames >= CHECKPOINT_EVERY
    }

    /// Snapshots `collections` and starts an empty WAL.
    pub fn checkpoint(&mut self, collections: &HashMap<String, Collection>) -> Result<()> {
        if let Some(parent) = self.snapshot_path.parent() {
            fs::create_dir_all(parent).map_err(|e| storage_error("create data directory", e))?;
        }
        write_snapshot(&self.snapshot_path, collections)?;
        self.wal.truncate()
    }

    /// Loads the snapshot, then replays the WAL on top of it.
    pub fn recover(&self) -> Result<HashMap<String, Collection>> {
        let mut collections = read_snapshot(&self.snapshot_path)?;
        for entry in replay_wal(&self.wal.path)? {
            entry.apply(&mut collections);
        }
        Ok(collections)
    }
}
