use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_root: PathBuf,               // one directory per table lives under this
    pub stopwords_path: PathBuf,

    // Crawl defaults (CLI flags override)
    pub max_pages: usize,
    pub max_workers: usize,
    pub fetch_timeout: Duration,

    // PageRank
    pub damping_factor: f64,
    pub convergence_epsilon: f64,

    // Storage maintenance sweep
    pub maintenance_interval: Duration,
    pub compaction_garbage_ratio: f64,  // rewrite the log once dead bytes exceed this share

    // Retrieval
    pub query_cache_entries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_root: PathBuf::from("./db_data"),
            stopwords_path: PathBuf::from("./stopwords.txt"),

            max_pages: 500,
            max_workers: num_cpus::get().max(4),
            fetch_timeout: Duration::from_secs(30),

            damping_factor: 0.85,
            convergence_epsilon: 1e-6,

            maintenance_interval: Duration::from_secs(600),
            compaction_garbage_ratio: 0.5,

            query_cache_entries: 256,
        }
    }
}
