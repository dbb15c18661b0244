//! Ragno binary: `crawl` builds the index for a domain, `serve` answers
//! queries against it.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ragno::core::config::Config;
use ragno::core::engine::Engine;
use ragno::crawler::bfs::{CrawlConfig, Crawler};
use ragno::crawler::fetch::HttpFetcher;
use ragno::ranking::pagerank::update_pagerank;
use ragno::retrieval::cache::QueryCache;
use ragno::retrieval::pipeline::Retriever;
use ragno::server::http::{AppState, serve};

#[derive(Parser)]
#[command(name = "ragno", version, about = "Small single-host web search engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a domain breadth-first from a seed URL, then compute PageRank
    Crawl {
        /// URL the crawl starts from
        #[arg(long)]
        seed: String,
        /// Host suffix URLs must match to be fetched
        #[arg(long)]
        domain: String,
        #[arg(long, default_value_t = 500)]
        max_pages: usize,
        /// Concurrent fetches per wave
        #[arg(long, default_value_t = 100)]
        workers: usize,
        #[arg(long, default_value = "./db_data")]
        db: PathBuf,
        #[arg(long, default_value = "./stopwords.txt")]
        stopwords: PathBuf,
    },
    /// Serve the query API and the pre-built UI; listens on $PORT (default 8080)
    Serve {
        #[arg(long, default_value = "./db_data")]
        db: PathBuf,
        #[arg(long, default_value = "./stopwords.txt")]
        stopwords: PathBuf,
        /// Directory with the pre-built web UI
        #[arg(long, default_value = "./ui/build")]
        ui: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        error!(%err, "fatal");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> ragno::core::error::Result<()> {
    // One lifecycle handle for every component; ctrl-c fires it.
    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            signal_token.cancel();
        }
    });

    match cli.command {
        Commands::Crawl { seed, domain, max_pages, workers, db, stopwords } => {
            let config = Config {
                db_root: db,
                stopwords_path: stopwords,
                max_pages,
                max_workers: workers,
                ..Config::default()
            };
            let damping = config.damping_factor;
            let epsilon = config.convergence_epsilon;

            let engine = Engine::open(config)?;
            let _maintenance = engine.start_maintenance(token.clone());

            let fetcher = Arc::new(HttpFetcher::new(engine.config.fetch_timeout)?);
            let crawler = Crawler::new(
                fetcher,
                Arc::clone(&engine.indexer),
                CrawlConfig {
                    seed,
                    domain,
                    max_pages: engine.config.max_pages,
                    max_workers: engine.config.max_workers,
                },
            );

            let timer = Instant::now();
            let stats = crawler.run(token.clone()).await?;
            info!(
                pages = stats.pages,
                depths = stats.depths,
                elapsed = ?timer.elapsed(),
                "crawl finished"
            );

            let timer = Instant::now();
            let store = Arc::clone(&engine.store);
            let rank_token = token.clone();
            let rank_stats = tokio::task::spawn_blocking(move || {
                update_pagerank(&store, damping, epsilon, &rank_token)
            })
            .await
            .map_err(|err| {
                ragno::core::error::Error::internal(format!("pagerank task: {}", err))
            })??;
            info!(
                nodes = rank_stats.nodes,
                iterations = rank_stats.iterations,
                elapsed = ?timer.elapsed(),
                "pagerank updated"
            );
            Ok(())
        }
        Commands::Serve { db, stopwords, ui } => {
            let config = Config { db_root: db, stopwords_path: stopwords, ..Config::default() };
            let engine = Engine::open(config)?;
            let _maintenance = engine.start_maintenance(token.clone());

            let port = std::env::var("PORT")
                .ok()
                .and_then(|raw| raw.parse::<u16>().ok())
                .unwrap_or(8080);

            let state = AppState {
                store: Arc::clone(&engine.store),
                retriever: Arc::new(Retriever::new(
                    Arc::clone(&engine.store),
                    Arc::clone(&engine.analyzer),
                )),
                cache: Arc::new(QueryCache::new(engine.config.query_cache_entries)),
            };
            serve(state, ui, port, token).await
        }
    }
}
