use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::Result;

/// Directory structure for data files: one directory per table under the root.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;
        Ok(StorageLayout { base_dir })
    }

    pub fn table_dir(&self, table: &str) -> Result<PathBuf> {
        let dir = self.base_dir.join(table);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn log_path(table_dir: &Path) -> PathBuf {
        table_dir.join("table.log")
    }

    pub fn schema_path(table_dir: &Path) -> PathBuf {
        table_dir.join("schema.json")
    }

    pub fn compact_tmp_path(table_dir: &Path) -> PathBuf {
        table_dir.join("table.log.compact")
    }
}
