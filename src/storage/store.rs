use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::core::error::Result;
use crate::core::types::DocInfo;
use crate::storage::layout::StorageLayout;
use crate::storage::table::Table;

pub const TABLE_INV_TITLE: &str = "inv_title";
pub const TABLE_INV_BODY: &str = "inv_body";
pub const TABLE_WORD_DICT: &str = "word_dict";
pub const TABLE_DOC_INFO: &str = "doc_info";
pub const TABLE_CHILDREN: &str = "children";
pub const TABLE_PAGERANK: &str = "pagerank";
pub const TABLE_MAGNITUDE: &str = "magnitude";

/// The engine's seven tables, opened together from one root directory.
///
/// Inverted tables map wordHash -> { docHash -> [norm_tf_idf, pos...] }.
/// Forward tables are keyed by docHash.
pub struct Store {
    pub inv_title: Table<HashMap<String, Vec<f32>>>,
    pub inv_body: Table<HashMap<String, Vec<f32>>>,
    pub word_dict: Table<String>,
    pub doc_info: Table<DocInfo>,
    pub children: Table<Vec<String>>,
    pub pagerank: Table<f64>,
    pub magnitude: Table<HashMap<String, f64>>,
}

impl Store {
    pub fn open(root: impl AsRef<Path>) -> Result<Store> {
        let layout = StorageLayout::new(root)?;
        Ok(Store {
            inv_title: Table::open(&layout, TABLE_INV_TITLE)?,
            inv_body: Table::open(&layout, TABLE_INV_BODY)?,
            word_dict: Table::open(&layout, TABLE_WORD_DICT)?,
            doc_info: Table::open(&layout, TABLE_DOC_INFO)?,
            children: Table::open(&layout, TABLE_CHILDREN)?,
            pagerank: Table::open(&layout, TABLE_PAGERANK)?,
            magnitude: Table::open(&layout, TABLE_MAGNITUDE)?,
        })
    }

    /// One space-reclamation pass over every table. Errors are logged and do
    /// not stop the sweep.
    pub fn sweep(&self, garbage_threshold: f64) {
        macro_rules! sweep_table {
            ($table:expr) => {
                match $table.maybe_compact(garbage_threshold) {
                    Ok(true) => tracing::debug!(table = $table.name(), "compacted log"),
                    Ok(false) => {}
                    Err(err) => tracing::warn!(table = $table.name(), %err, "compaction failed"),
                }
            };
        }
        sweep_table!(self.inv_title);
        sweep_table!(self.inv_body);
        sweep_table!(self.word_dict);
        sweep_table!(self.doc_info);
        sweep_table!(self.children);
        sweep_table!(self.pagerank);
        sweep_table!(self.magnitude);
    }

    /// Background reclamation loop on a fixed interval, until the lifecycle
    /// handle fires.
    pub fn start_maintenance(
        self: &Arc<Self>,
        interval: Duration,
        garbage_threshold: f64,
        token: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of `interval` fires immediately; skip it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!("storage maintenance stopping");
                        break;
                    }
                    _ = ticker.tick() => store.sweep(garbage_threshold),
                }
            }
        })
    }
}
