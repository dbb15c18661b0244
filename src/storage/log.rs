use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::core::error::Result;
use crate::storage::layout::StorageLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogOp {
    Set,
    Delete,
}

/// One durable mutation. `value` holds the JSON encoding of the typed value
/// and is empty for deletes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub op: LogOp,
    pub key: String,
    pub value: Vec<u8>,
}

impl LogRecord {
    pub fn set(key: String, value: Vec<u8>) -> Self {
        LogRecord { op: LogOp::Set, key, value }
    }

    pub fn delete(key: String) -> Self {
        LogRecord { op: LogOp::Delete, key, value: Vec::new() }
    }
}

/// Append-only per-table log. Frames are `u32 len | bincode payload | u32 crc`;
/// replay drops a corrupt or truncated tail instead of failing the open.
pub struct TableLog {
    file: File,
    path: PathBuf,
    total_records: u64,
    live_records: u64,
}

impl TableLog {
    /// Open the log for a table directory, replaying it into a fresh map.
    pub fn open(table_dir: &Path) -> Result<(TableLog, BTreeMap<String, Vec<u8>>)> {
        let path = StorageLayout::log_path(table_dir);
        let mut map = BTreeMap::new();
        let mut total_records = 0u64;
        let mut valid_len = 0u64;

        if path.exists() {
            let mut raw = Vec::new();
            File::open(&path)?.read_to_end(&mut raw)?;
            let mut offset = 0usize;
            while let Some((record, consumed)) = decode_frame(&raw[offset..]) {
                match record.op {
                    LogOp::Set => {
                        map.insert(record.key, record.value);
                    }
                    LogOp::Delete => {
                        map.remove(&record.key);
                    }
                }
                total_records += 1;
                offset += consumed;
                valid_len = offset as u64;
            }
            if (raw.len() as u64) > valid_len {
                tracing::warn!(
                    table = %table_dir.display(),
                    dropped = raw.len() as u64 - valid_len,
                    "truncating corrupt log tail"
                );
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        // Drop any corrupt tail so later appends start at a clean frame boundary.
        file.set_len(valid_len)?;

        let live_records = map.len() as u64;
        Ok((
            TableLog { file, path, total_records, live_records },
            map,
        ))
    }

    /// Append a group of records as one write. The caller applies them to its
    /// in-memory map only after this returns.
    pub fn append(&mut self, records: &[LogRecord]) -> Result<()> {
        let mut buf = Vec::new();
        for record in records {
            encode_frame(record, &mut buf)?;
        }
        self.file.write_all(&buf)?;
        self.file.sync_data()?;
        self.total_records += records.len() as u64;
        Ok(())
    }

    pub fn note_live(&mut self, live: u64) {
        self.live_records = live;
    }

    /// Share of appended records that no longer contribute to the live map.
    pub fn garbage_ratio(&self) -> f64 {
        if self.total_records == 0 {
            return 0.0;
        }
        1.0 - (self.live_records as f64 / self.total_records as f64)
    }

    /// Rewrite the log from the live map via a temp file and atomic rename.
    pub fn compact(&mut self, map: &BTreeMap<String, Vec<u8>>) -> Result<()> {
        let table_dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let tmp_path = StorageLayout::compact_tmp_path(table_dir);

        let mut buf = Vec::new();
        for (key, value) in map {
            encode_frame(&LogRecord::set(key.clone(), value.clone()), &mut buf)?;
        }

        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&buf)?;
        tmp.sync_all()?;
        drop(tmp);
        std::fs::rename(&tmp_path, &self.path)?;

        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.total_records = map.len() as u64;
        self.live_records = map.len() as u64;
        Ok(())
    }
}

fn encode_frame(record: &LogRecord, out: &mut Vec<u8>) -> Result<()> {
    let payload = bincode::serialize(record)?;
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    Ok(())
}

/// Decode one frame from `raw`, returning the record and bytes consumed.
/// Returns None on a truncated or checksum-failing frame.
fn decode_frame(raw: &[u8]) -> Option<(LogRecord, usize)> {
    if raw.len() < 4 {
        return None;
    }
    let len = u32::from_le_bytes(raw[..4].try_into().ok()?) as usize;
    let frame_end = 4 + len + 4;
    if raw.len() < frame_end {
        return None;
    }
    let payload = &raw[4..4 + len];
    let stored_crc = u32::from_le_bytes(raw[4 + len..frame_end].try_into().ok()?);
    if crc32fast::hash(payload) != stored_crc {
        return None;
    }
    let record = bincode::deserialize(payload).ok()?;
    Some((record, frame_end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_and_replay() {
        let dir = tempdir().unwrap();
        {
            let (mut log, map) = TableLog::open(dir.path()).unwrap();
            assert!(map.is_empty());
            log.append(&[
                LogRecord::set("a".into(), b"1".to_vec()),
                LogRecord::set("b".into(), b"2".to_vec()),
                LogRecord::delete("a".into()),
            ])
            .unwrap();
        }

        let (_, map) = TableLog::open(dir.path()).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("b").unwrap(), b"2");
    }

    #[test]
    fn test_corrupt_tail_is_dropped() {
        let dir = tempdir().unwrap();
        {
            let (mut log, _) = TableLog::open(dir.path()).unwrap();
            log.append(&[LogRecord::set("a".into(), b"1".to_vec())]).unwrap();
        }
        // Simulate a torn write: garbage after the last complete frame.
        let path = StorageLayout::log_path(dir.path());
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0xde, 0xad, 0xbe]).unwrap();
        drop(file);

        let (mut log, map) = TableLog::open(dir.path()).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("a").unwrap(), b"1");

        // The tail was truncated, so appends keep working across reopen.
        log.append(&[LogRecord::set("b".into(), b"2".to_vec())]).unwrap();
        let (_, map) = TableLog::open(dir.path()).unwrap();
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_compaction_preserves_live_entries() {
        let dir = tempdir().unwrap();
        let (mut log, mut map) = TableLog::open(dir.path()).unwrap();
        for i in 0..10 {
            let record = LogRecord::set("k".into(), vec![i]);
            log.append(std::slice::from_ref(&record)).unwrap();
            map.insert(record.key, record.value);
        }
        log.note_live(map.len() as u64);
        assert!(log.garbage_ratio() > 0.8);

        log.compact(&map).unwrap();
        assert_eq!(log.garbage_ratio(), 0.0);

        let (_, replayed) = TableLog::open(dir.path()).unwrap();
        assert_eq!(replayed, map);
    }
}
