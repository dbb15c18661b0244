use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::analysis::analyzer::Analyzer;
use crate::core::config::Config;
use crate::core::error::Result;
use crate::index::indexer::Indexer;
use crate::storage::store::Store;

/// Explicit service value tying the store, the analysis pipeline and the
/// indexer together. Handles are shared, never global.
pub struct Engine {
    pub config: Config,
    pub store: Arc<Store>,
    pub analyzer: Arc<Analyzer>,
    pub indexer: Arc<Indexer>,
}

impl Engine {
    /// Open every table and load the stop-word list. A missing stop-word
    /// file fails the open; nothing else is lazily initialised.
    pub fn open(config: Config) -> Result<Engine> {
        let store = Arc::new(Store::open(&config.db_root)?);
        let analyzer = Arc::new(Analyzer::web_search(&config.stopwords_path)?);
        let indexer = Arc::new(Indexer::new(Arc::clone(&store), Arc::clone(&analyzer))?);
        Ok(Engine { config, store, analyzer, indexer })
    }

    /// Start the storage reclamation sweep tied to the lifecycle handle.
    pub fn start_maintenance(&self, token: CancellationToken) -> tokio::task::JoinHandle<()> {
        self.store.start_maintenance(
            self.config.maintenance_interval,
            self.config.compaction_garbage_ratio,
            token,
        )
    }
}
