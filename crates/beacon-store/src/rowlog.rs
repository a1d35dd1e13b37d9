//! Append-only durable row log.
//!
//! Every store mutation appends one framed [`RowOp`] to a single file per
//! node; [`RowLog::rewrite`] compacts the log to the live rows during a
//! snapshot. Loading replays the log from the start.
//!
//! # Record format
//!
//! ```text
//! [RECORD_START:u32][length:u32][postcard RowOp][RECORD_END:u32]
//!        4B              4B          variable          4B
//! ```
//!
//! Sentinel markers enable torn-write detection: a missing `RECORD_END`
//! during replay means the record was incompletely written and replay stops
//! at the last complete record. A record whose payload fails to decode is
//! logged and skipped; replay resynchronizes on the next `RECORD_START`.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreError;

// Magic number marking the start of a row record.
const RECORD_START: u32 = 0xBEAC_0001;

// Magic number marking the end of a completely written row record.
const RECORD_END: u32 = 0xBEAC_00FF;

// start_sentinel(4) + length(4).
const HEADER_SIZE: usize = 8;

// A serialized row is a handful of short strings; anything larger is corrupt.
const MAX_ROW_SIZE: usize = 64 * 1024;

/// One durable row, mirroring the logical schema
/// `(name PK, address, language, version, region, last_seen REAL)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRecord {
    pub name: String,
    pub address: String,
    pub language: String,
    pub version: String,
    pub region: String,
    pub last_seen: f64,
}

/// A single logged mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum RowOp {
    Put(RowRecord),
    Delete { name: String },
}

/// Append-only row log backed by one file.
#[derive(Debug)]
pub struct RowLog {
    path: PathBuf,
    file: File,
}

impl RowLog {
    /// Opens (creating if necessary) the row log at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Appends an upsert for `row`, synchronously.
    pub fn append_put(&mut self, row: &RowRecord) -> Result<(), StoreError> {
        self.append(&RowOp::Put(row.clone()))
    }

    /// Appends a deletion for `name`, synchronously.
    pub fn append_delete(&mut self, name: &str) -> Result<(), StoreError> {
        self.append(&RowOp::Delete {
            name: name.to_string(),
        })
    }

    fn append(&mut self, op: &RowOp) -> Result<(), StoreError> {
        let buf = frame_op(op)?;
        self.file.write_all(&buf)?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Replays the log into a map of live rows.
    ///
    /// A corrupt row is logged and skipped; a torn tail stops replay at the
    /// last complete record.
    pub fn load(&self) -> Result<HashMap<String, RowRecord>, StoreError> {
        let data = fs::read(&self.path)?;
        let mut rows = HashMap::new();
        let mut cursor = 0usize;

        while cursor < data.len() {
            if data.len() - cursor < HEADER_SIZE {
                warn!(
                    path = %self.path.display(),
                    trailing = data.len() - cursor,
                    "torn tail in row log, stopping replay"
                );
                break;
            }

            let start = read_u32(&data, cursor);
            if start != RECORD_START {
                // Lost framing: resynchronize on the next start sentinel.
                match find_sentinel(&data, cursor + 1) {
                    Some(next) => {
                        warn!(
                            path = %self.path.display(),
                            skipped = next - cursor,
                            "corrupt row log framing, resynchronized"
                        );
                        cursor = next;
                        continue;
                    }
                    None => {
                        warn!(
                            path = %self.path.display(),
                            "corrupt row log framing, no further records"
                        );
                        break;
                    }
                }
            }

            let length = read_u32(&data, cursor + 4) as usize;
            if length > MAX_ROW_SIZE {
                warn!(
                    path = %self.path.display(),
                    length,
                    "row length out of range, skipping record"
                );
                cursor = find_sentinel(&data, cursor + 4).unwrap_or(data.len());
                continue;
            }

            let payload_start = cursor + HEADER_SIZE;
            let end_sentinel_at = payload_start + length;
            if end_sentinel_at + 4 > data.len() {
                warn!(
                    path = %self.path.display(),
                    "incomplete row at end of log, stopping replay"
                );
                break;
            }
            if read_u32(&data, end_sentinel_at) != RECORD_END {
                warn!(
                    path = %self.path.display(),
                    "missing end sentinel, stopping replay"
                );
                break;
            }

            match postcard::from_bytes::<RowOp>(&data[payload_start..end_sentinel_at]) {
                Ok(RowOp::Put(row)) => {
                    rows.insert(row.name.clone(), row);
                }
                Ok(RowOp::Delete { name }) => {
                    rows.remove(&name);
                }
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        "corrupt row payload, skipping record"
                    );
                }
            }
            cursor = end_sentinel_at + 4;
        }

        Ok(rows)
    }

    /// Replaces the log with a compacted dump of `rows`.
    ///
    /// Writes to a sibling temp file and atomically renames it over the log,
    /// then reopens the append handle.
    pub fn rewrite<'a>(
        &mut self,
        rows: impl IntoIterator<Item = &'a RowRecord>,
    ) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("tmp");
        {
            let mut out = File::create(&tmp)?;
            for row in rows {
                let buf = frame_op(&RowOp::Put(row.clone()))?;
                out.write_all(&buf)?;
            }
            out.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        Ok(())
    }
}

fn frame_op(op: &RowOp) -> Result<Vec<u8>, StoreError> {
    let payload = postcard::to_allocvec(op)?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + 4);
    buf.extend_from_slice(&RECORD_START.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&payload);
    buf.extend_from_slice(&RECORD_END.to_le_bytes());
    Ok(buf)
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(
        data[at..at + 4]
            .try_into()
            .expect("slice is exactly 4 bytes after bounds check"),
    )
}

/// Finds the next `RECORD_START` sentinel at or after `from`.
fn find_sentinel(data: &[u8], from: usize) -> Option<usize> {
    let needle = RECORD_START.to_le_bytes();
    let mut at = from;
    while at + 4 <= data.len() {
        if data[at..at + 4] == needle {
            return Some(at);
        }
        at += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::tempdir;

    fn row(name: &str, address: &str) -> RowRecord {
        RowRecord {
            name: name.into(),
            address: address.into(),
            language: "Rust".into(),
            version: "1.0".into(),
            region: "EU".into(),
            last_seen: 1_700_000_000.0,
        }
    }

    #[test]
    fn replay_applies_puts_and_deletes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.db");

        let mut log = RowLog::open(&path).unwrap();
        log.append_put(&row("a", "1.1.1.1:1")).unwrap();
        log.append_put(&row("b", "2.2.2.2:2")).unwrap();
        log.append_delete("a").unwrap();
        log.append_put(&row("b", "3.3.3.3:3")).unwrap();

        let rows = log.load().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows["b"].address, "3.3.3.3:3");
    }

    #[test]
    fn garbage_between_records_is_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.db");

        let mut log = RowLog::open(&path).unwrap();
        log.append_put(&row("a", "1.1.1.1:1")).unwrap();

        // Inject framing garbage, then append another valid record.
        {
            let mut raw = OpenOptions::new().append(true).open(&path).unwrap();
            raw.write_all(&[0xFF; 13]).unwrap();
        }
        let mut log = RowLog::open(&path).unwrap();
        log.append_put(&row("b", "2.2.2.2:2")).unwrap();

        let rows = log.load().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.contains_key("a"));
        assert!(rows.contains_key("b"));
    }

    #[test]
    fn torn_tail_stops_replay_at_last_complete_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.db");

        let mut log = RowLog::open(&path).unwrap();
        log.append_put(&row("a", "1.1.1.1:1")).unwrap();
        log.append_put(&row("b", "2.2.2.2:2")).unwrap();

        // Chop a few bytes off the final record, as a crashed writer would.
        let data = fs::read(&path).unwrap();
        fs::write(&path, &data[..data.len() - 3]).unwrap();

        let rows = RowLog::open(&path).unwrap().load().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows.contains_key("a"));
    }

    #[test]
    fn rewrite_compacts_and_stays_appendable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.db");

        let mut log = RowLog::open(&path).unwrap();
        for i in 0..10 {
            log.append_put(&row("churn", &format!("host:{i}"))).unwrap();
        }
        log.append_put(&row("keep", "9.9.9.9:9")).unwrap();

        let live = [row("keep", "9.9.9.9:9")];
        log.rewrite(live.iter()).unwrap();

        // The compacted log still accepts appends.
        log.append_put(&row("after", "8.8.8.8:8")).unwrap();

        let rows = log.load().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows["keep"].address, "9.9.9.9:9");
        assert_eq!(rows["after"].address, "8.8.8.8:8");
    }

    #[test]
    fn empty_log_loads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.db");
        let log = RowLog::open(&path).unwrap();
        assert!(log.load().unwrap().is_empty());
    }
}
