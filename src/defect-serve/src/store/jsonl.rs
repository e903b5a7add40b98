use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use uuid::Uuid;

use super::{newest_first, RecordStore, StoreError};
use crate::record::{Record, StoredRecord};

/// Append-only JSON-lines file, one stored record per line.
///
/// The store keeps an index of where each valid line starts, so a history
/// query parses only the lines it returns.
pub struct JsonlStore {
    path: PathBuf,

    /// Serializes appends so lines never interleave.
    inner: Mutex<Inner>,
}

struct Inner {
    file: File,

    /// Valid lines in file order.
    index: Vec<Entry>,

    /// Bytes of the file covered by `index`; always a line boundary.
    scanned: u64,
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    offset: u64,
    len: usize,
    timestamp: DateTime<Utc>,
}

impl JsonlStore {
    /// Open `path` for appending, creating it and its parent directories.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let mut inner = Inner {
            file,
            index: Vec::new(),
            scanned: 0,
        };
        inner.terminate_last_line()?;
        inner.catch_up(path)?;
        debug!(
            "Opened record store at {} with {} records",
            path.display(),
            inner.index.len()
        );

        Ok(JsonlStore {
            path: path.to_path_buf(),
            inner: Mutex::new(inner),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Inner {
    // A torn final line must not swallow the next append.
    fn terminate_last_line(&mut self) -> io::Result<()> {
        let len = self.file.metadata()?.len();
        if len == 0 {
            return Ok(());
        }

        let mut last = [0u8; 1];
        self.file.seek(SeekFrom::Start(len - 1))?;
        self.file.read_exact(&mut last)?;

        if last[0] != b'\n' {
            self.file.write_all(b"\n")?;
        }

        Ok(())
    }

    /// Index complete lines written since the last scan, by us or anyone else.
    fn catch_up(&mut self, path: &Path) -> io::Result<()> {
        let len = self.file.metadata()?.len();
        if len < self.scanned {
            warn!("{} shrank, rebuilding its index", path.display());
            self.index.clear();
            self.scanned = 0;
        }
        if len == self.scanned {
            return Ok(());
        }

        self.file.seek(SeekFrom::Start(self.scanned))?;
        let mut reader = BufReader::new(&mut self.file);
        let mut line = Vec::new();

        loop {
            line.clear();
            let n = reader.read_until(b'\n', &mut line)?;
            // An unterminated tail is left for a later scan.
            if n == 0 || line.last() != Some(&b'\n') {
                break;
            }

            let offset = self.scanned;
            self.scanned += n as u64;

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            match serde_json::from_slice::<StoredRecord>(&line) {
                Ok(record) => self.index.push(Entry {
                    offset,
                    len: n,
                    timestamp: record.timestamp,
                }),
                Err(err) => warn!(
                    "{}: skipping invalid record at byte {}: {}",
                    path.display(),
                    offset,
                    err
                ),
            }
        }

        Ok(())
    }

    fn read_entry(&mut self, entry: &Entry) -> Result<StoredRecord, StoreError> {
        let mut line = vec![0u8; entry.len];
        self.file.seek(SeekFrom::Start(entry.offset))?;
        self.file.read_exact(&mut line)?;

        Ok(serde_json::from_slice(&line)?)
    }
}

fn write_line(file: &mut File, line: &[u8]) -> io::Result<()> {
    file.write_all(line)?;
    file.flush()
}

impl RecordStore for JsonlStore {
    fn append(&self, record: &Record) -> Result<(), StoreError> {
        let stored = StoredRecord::new(Uuid::new_v4().simple().to_string(), record);

        let mut line = serde_json::to_string(&stored)?;
        line.push('\n');

        let mut inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        inner.terminate_last_line()?;
        inner.catch_up(&self.path)?;

        let offset = inner.scanned;
        if let Err(err) = write_line(&mut inner.file, line.as_bytes()) {
            // Take back whatever part of the line reached the file.
            if let Err(undo) = inner.file.set_len(offset) {
                warn!(
                    "{}: cannot drop partial record: {}",
                    self.path.display(),
                    undo
                );
            }
            return Err(err.into());
        }

        inner.index.push(Entry {
            offset,
            len: line.len(),
            timestamp: stored.timestamp,
        });
        inner.scanned = offset + line.len() as u64;

        Ok(())
    }

    fn query_recent(&self, limit: usize) -> Result<Vec<StoredRecord>, StoreError> {
        let mut inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        inner.catch_up(&self.path)?;

        let picked = newest_first(inner.index.clone(), limit, |e| e.timestamp);
        picked
            .iter()
            .map(|entry| inner.read_entry(entry))
            .collect()
    }
}
