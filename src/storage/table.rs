use crossbeam::channel::{Receiver, bounded};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::layout::StorageLayout;
use crate::storage::log::{LogRecord, TableLog};
use crate::storage::schema::{KeyKind, TableSchema, TableValue};

/// Untyped guts of a table: the live map plus its durability log.
///
/// `get`/`has` take the map read lock only, so they are safe concurrently
/// with writers. Read-your-writes across tasks needs caller-side ordering.
struct TableCore {
    name: String,
    map: RwLock<BTreeMap<String, Vec<u8>>>,
    log: Mutex<TableLog>,
}

/// Typed view over one named table. Cheap to clone and share.
pub struct Table<V: TableValue> {
    core: Arc<TableCore>,
    _value: PhantomData<fn() -> V>,
}

impl<V: TableValue> Clone for Table<V> {
    fn clone(&self) -> Self {
        Table { core: Arc::clone(&self.core), _value: PhantomData }
    }
}

impl<V: TableValue> Table<V> {
    /// Open (or create) the table directory, enforcing the schema manifest.
    pub fn open(layout: &StorageLayout, name: &str) -> Result<Self> {
        let dir = layout.table_dir(name)?;
        let schema_path = StorageLayout::schema_path(&dir);

        let declared = TableSchema { key: KeyKind::Str, value: V::KIND };
        if schema_path.exists() {
            let manifest: TableSchema = serde_json::from_slice(&fs::read(&schema_path)?)?;
            if manifest.key != declared.key {
                return Err(Error::new(
                    ErrorKind::KeyTypeMismatch,
                    format!("table {}: declared {:?}, manifest {:?}", name, declared.key, manifest.key),
                ));
            }
            if manifest.value != declared.value {
                return Err(Error::new(
                    ErrorKind::ValueTypeMismatch,
                    format!("table {}: declared {:?}, manifest {:?}", name, declared.value, manifest.value),
                ));
            }
        } else {
            fs::write(&schema_path, serde_json::to_vec_pretty(&declared)?)?;
        }

        let (log, map) = TableLog::open(&dir)?;
        Ok(Table {
            core: Arc::new(TableCore {
                name: name.to_string(),
                map: RwLock::new(map),
                log: Mutex::new(log),
            }),
            _value: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn get(&self, key: &str) -> Result<Option<V>> {
        let map = self.core.map.read();
        match map.get(key) {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }

    /// Like `get`, but absence is an error. Used where another table promised
    /// the key exists.
    pub fn get_required(&self, key: &str) -> Result<V> {
        self.get(key)?
            .ok_or_else(|| Error::not_found(format!("{}[{}]", self.core.name, key)))
    }

    pub fn has(&self, key: &str) -> Result<bool> {
        Ok(self.core.map.read().contains_key(key))
    }

    pub fn set(&self, key: &str, value: &V) -> Result<()> {
        let encoded = serde_json::to_vec(value)?;
        let mut log = self.core.log.lock();
        log.append(std::slice::from_ref(&LogRecord::set(key.to_string(), encoded.clone())))?;
        let mut map = self.core.map.write();
        map.insert(key.to_string(), encoded);
        log.note_live(map.len() as u64);
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        let mut log = self.core.log.lock();
        log.append(std::slice::from_ref(&LogRecord::delete(key.to_string())))?;
        let mut map = self.core.map.write();
        map.remove(key);
        log.note_live(map.len() as u64);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.core.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.map.read().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.core.map.read().keys().cloned().collect()
    }

    /// Stream every entry, unordered. Values are decoded in parallel off the
    /// caller's thread; the stream ends when the sender side is dropped.
    pub fn iterate(&self) -> Receiver<Result<(String, V)>> {
        let snapshot: Vec<(String, Vec<u8>)> = {
            let map = self.core.map.read();
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        let (tx, rx) = bounded(64);
        std::thread::spawn(move || {
            snapshot.into_par_iter().for_each_with(tx, |tx, (key, bytes)| {
                let item = serde_json::from_slice(&bytes)
                    .map(|value| (key, value))
                    .map_err(Error::from);
                let _ = tx.send(item);
            });
        });
        rx
    }

    /// Stream entries whose key starts with `prefix`, in key order.
    pub fn prefix_iterate(&self, prefix: &str) -> Receiver<Result<(String, V)>> {
        let snapshot: Vec<(String, Vec<u8>)> = {
            let map = self.core.map.read();
            map.range(prefix.to_string()..)
                .take_while(|(k, _)| k.starts_with(prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };
        let (tx, rx) = bounded(64);
        std::thread::spawn(move || {
            for (key, bytes) in snapshot {
                let item = serde_json::from_slice(&bytes)
                    .map(|value| (key, value))
                    .map_err(Error::from);
                if tx.send(item).is_err() {
                    break;
                }
            }
        });
        rx
    }

    /// Start a batch write. Nothing is visible until `flush`.
    pub fn batch(&self) -> WriteBatch<V> {
        WriteBatch {
            core: Arc::clone(&self.core),
            records: Vec::new(),
            _value: PhantomData,
        }
    }

    /// Rewrite the log from the live map once dead records pass `threshold`.
    pub fn maybe_compact(&self, threshold: f64) -> Result<bool> {
        let mut log = self.core.log.lock();
        if log.garbage_ratio() <= threshold {
            return Ok(false);
        }
        let map = self.core.map.read();
        log.compact(&map)?;
        Ok(true)
    }
}

/// Buffered writes with all-or-nothing apply on `flush`.
pub struct WriteBatch<V: TableValue> {
    core: Arc<TableCore>,
    records: Vec<LogRecord>,
    _value: PhantomData<fn() -> V>,
}

impl<V: TableValue> WriteBatch<V> {
    pub fn batch_set(&mut self, key: &str, value: &V) -> Result<()> {
        let encoded = serde_json::to_vec(value)?;
        self.records.push(LogRecord::set(key.to_string(), encoded));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append the whole group as one write, then apply it to the live map.
    /// If the append fails the map is untouched.
    pub fn flush(self) -> Result<()> {
        if self.records.is_empty() {
            return Ok(());
        }
        let mut log = self.core.log.lock();
        log.append(&self.records)?;
        let mut map = self.core.map.write();
        for record in self.records {
            map.insert(record.key, record.value);
        }
        log.note_live(map.len() as u64);
        Ok(())
    }

    /// Discard every buffered write.
    pub fn cancel(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DocInfo;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn layout(dir: &std::path::Path) -> StorageLayout {
        StorageLayout::new(dir).unwrap()
    }

    #[test]
    fn test_point_operations() {
        let dir = tempdir().unwrap();
        let table: Table<f64> = Table::open(&layout(dir.path()), "pagerank").unwrap();

        assert_eq!(table.get("abc").unwrap(), None);
        assert!(!table.has("abc").unwrap());

        table.set("abc", &0.25).unwrap();
        assert_eq!(table.get("abc").unwrap(), Some(0.25));
        assert!(table.has("abc").unwrap());
        assert_eq!(table.len(), 1);

        table.delete("abc").unwrap();
        assert_eq!(table.get("abc").unwrap(), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempdir().unwrap();
        {
            let table: Table<String> = Table::open(&layout(dir.path()), "word_dict").unwrap();
            table.set("aaaa", &"apple".to_string()).unwrap();
            table.set("bbbb", &"banana".to_string()).unwrap();
        }
        let table: Table<String> = Table::open(&layout(dir.path()), "word_dict").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("aaaa").unwrap().as_deref(), Some("apple"));
    }

    #[test]
    fn test_value_kind_mismatch_rejected() {
        let dir = tempdir().unwrap();
        {
            let _table: Table<f64> = Table::open(&layout(dir.path()), "pagerank").unwrap();
        }
        let reopened: Result<Table<String>> = Table::open(&layout(dir.path()), "pagerank");
        let err = reopened.err().unwrap();
        assert_eq!(err.kind, ErrorKind::ValueTypeMismatch);
    }

    #[test]
    fn test_get_required_not_found() {
        let dir = tempdir().unwrap();
        let table: Table<f64> = Table::open(&layout(dir.path()), "pagerank").unwrap();
        let err = table.get_required("missing").err().unwrap();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_prefix_iterate_ordered() {
        let dir = tempdir().unwrap();
        let table: Table<String> = Table::open(&layout(dir.path()), "word_dict").unwrap();
        for (key, word) in [("ab1", "x"), ("ab2", "y"), ("ac1", "z"), ("b11", "w")] {
            table.set(key, &word.to_string()).unwrap();
        }

        let hits: Vec<String> = table
            .prefix_iterate("ab")
            .into_iter()
            .map(|item| item.unwrap().0)
            .collect();
        assert_eq!(hits, vec!["ab1".to_string(), "ab2".to_string()]);

        assert!(table.prefix_iterate("zz").into_iter().next().is_none());
    }

    #[test]
    fn test_iterate_sees_everything() {
        let dir = tempdir().unwrap();
        let table: Table<f64> = Table::open(&layout(dir.path()), "pagerank").unwrap();
        for i in 0..50 {
            table.set(&format!("{:02}", i), &(i as f64)).unwrap();
        }

        let mut seen: Vec<(String, f64)> =
            table.iterate().into_iter().map(|item| item.unwrap()).collect();
        seen.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(seen.len(), 50);
        assert_eq!(seen[7], ("07".to_string(), 7.0));
    }

    #[test]
    fn test_batch_flush_and_cancel() {
        let dir = tempdir().unwrap();
        let table: Table<f64> = Table::open(&layout(dir.path()), "pagerank").unwrap();

        let mut cancelled = table.batch();
        cancelled.batch_set("a", &1.0).unwrap();
        cancelled.cancel();
        assert!(table.is_empty());

        let mut batch = table.batch();
        batch.batch_set("a", &1.0).unwrap();
        batch.batch_set("b", &2.0).unwrap();
        assert!(table.is_empty());
        batch.flush().unwrap();
        assert_eq!(table.len(), 2);

        // Batched writes are as durable as plain sets.
        drop(table);
        let table: Table<f64> = Table::open(&layout(dir.path()), "pagerank").unwrap();
        assert_eq!(table.get("b").unwrap(), Some(2.0));
    }

    #[test]
    fn test_docinfo_table() {
        let dir = tempdir().unwrap();
        let table: Table<DocInfo> = Table::open(&layout(dir.path()), "doc_info").unwrap();

        let mut info = DocInfo::stub("http://ex.test/a");
        info.page_size = 77;
        info.words_mapping = HashMap::from([("feed".to_string(), 3u32)]);
        table.set("hash", &info).unwrap();

        let back = table.get_required("hash").unwrap();
        assert_eq!(back, info);
        assert!(!back.is_stub());
    }

    #[test]
    fn test_compaction_keeps_table_readable() {
        let dir = tempdir().unwrap();
        let table: Table<f64> = Table::open(&layout(dir.path()), "pagerank").unwrap();
        for _ in 0..20 {
            table.set("hot", &1.0).unwrap();
        }
        assert!(table.maybe_compact(0.5).unwrap());
        assert!(!table.maybe_compact(0.5).unwrap());
        assert_eq!(table.get("hot").unwrap(), Some(1.0));

        drop(table);
        let table: Table<f64> = Table::open(&layout(dir.path()), "pagerank").unwrap();
        assert_eq!(table.get("hot").unwrap(), Some(1.0));
    }
}
