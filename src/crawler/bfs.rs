use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::analysis::html;
use crate::core::error::Result;
use crate::core::types::doc_hash;
use crate::crawler::fetch::Fetcher;
use crate::index::indexer::{IndexTask, Indexer, ParentRef};

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub seed: String,
    /// Host suffix a URL must carry to be fetched.
    pub domain: String,
    pub max_pages: usize,
    pub max_workers: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct CrawlStats {
    pub pages: usize,
    pub depths: usize,
}

/// One frontier entry: the referring page, the target, and the anchor text
/// on the referring link. The seed has an empty parent.
#[derive(Debug, Clone)]
struct Edge {
    parent: String,
    url: String,
    anchor: String,
}

/// Breadth-first crawler over a single domain.
///
/// Each depth runs as barrier-synchronised waves of at most `max_workers`
/// fetch tasks. Edges that close a cycle are buffered and attached through
/// `Indexer::add_parent` after the barrier, when the target's record is
/// guaranteed to exist. The `visited` set and the deferred-parent buffer are
/// owned by this loop and never shared with workers.
pub struct Crawler<F: Fetcher> {
    fetcher: Arc<F>,
    indexer: Arc<Indexer>,
    config: CrawlConfig,
}

impl<F: Fetcher> Crawler<F> {
    pub fn new(fetcher: Arc<F>, indexer: Arc<Indexer>, config: CrawlConfig) -> Self {
        Crawler { fetcher, indexer, config }
    }

    pub async fn run(&self, token: CancellationToken) -> Result<CrawlStats> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut pending_parents: HashMap<String, Vec<(String, String)>> = HashMap::new();
        let mut frontier: VecDeque<Edge> = VecDeque::from([Edge {
            parent: String::new(),
            url: self.config.seed.clone(),
            anchor: String::new(),
        }]);

        let mut depth = 0usize;
        loop {
            tracing::info!(depth, queued = frontier.len(), "crawl depth");
            let mut next_frontier: VecDeque<Edge> = VecDeque::new();

            while !frontier.is_empty()
                && visited.len() < self.config.max_pages
                && !token.is_cancelled()
            {
                let mut wave: JoinSet<Vec<Edge>> = JoinSet::new();
                while wave.len() < self.config.max_workers
                    && visited.len() < self.config.max_pages
                {
                    let Some(edge) = frontier.pop_front() else { break };

                    let key = doc_hash(&edge.url);
                    if visited.contains(&key) {
                        // Cycle-closing edge: attach the parent after the
                        // barrier instead of re-fetching.
                        if !edge.parent.is_empty() {
                            pending_parents
                                .entry(edge.url)
                                .or_default()
                                .push((edge.parent, edge.anchor));
                        }
                        continue;
                    }
                    if !self.in_domain(&edge.url) {
                        tracing::debug!(url = %edge.url, "outside crawl domain");
                        continue;
                    }

                    visited.insert(key);
                    let fetcher = Arc::clone(&self.fetcher);
                    let indexer = Arc::clone(&self.indexer);
                    wave.spawn(async move { visit(fetcher, indexer, edge).await });
                }
                if wave.is_empty() {
                    break;
                }

                while let Some(joined) = wave.join_next().await {
                    match joined {
                        Ok(links) => next_frontier.extend(links),
                        Err(err) => tracing::warn!(%err, "crawl worker panicked"),
                    }
                }
                self.drain_pending(&mut pending_parents)?;
            }
            // A depth that ended in cycle edges alone never ran a wave; its
            // buffered parents still need attaching.
            self.drain_pending(&mut pending_parents)?;

            if token.is_cancelled() {
                tracing::info!(pages = visited.len(), "crawl cancelled");
                return Ok(CrawlStats { pages: visited.len(), depths: depth });
            }
            if next_frontier.is_empty() || visited.len() >= self.config.max_pages {
                return Ok(CrawlStats { pages: visited.len(), depths: depth });
            }
            depth += 1;
            frontier = next_frontier;
        }
    }

    fn in_domain(&self, raw: &str) -> bool {
        match Url::parse(raw) {
            Ok(url) => url
                .host_str()
                .map(|host| host.ends_with(&self.config.domain))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    fn drain_pending(
        &self,
        pending_parents: &mut HashMap<String, Vec<(String, String)>>,
    ) -> Result<()> {
        for (child_url, parents) in pending_parents.drain() {
            self.indexer.add_parent(&child_url, &parents)?;
        }
        Ok(())
    }
}

/// Fetch, parse, index; return the outbound edges for the next depth. Any
/// failure drops this URL without affecting the round.
async fn visit<F: Fetcher>(fetcher: Arc<F>, indexer: Arc<Indexer>, edge: Edge) -> Vec<Edge> {
    match fetch_and_index(fetcher.as_ref(), &indexer, &edge).await {
        Ok(links) => links
            .into_iter()
            .map(|link| Edge { parent: edge.url.clone(), url: link.url, anchor: link.anchor })
            .collect(),
        Err(err) => {
            tracing::warn!(url = %edge.url, %err, "dropping url");
            Vec::new()
        }
    }
}

async fn fetch_and_index<F: Fetcher>(
    fetcher: &F,
    indexer: &Indexer,
    edge: &Edge,
) -> Result<Vec<html::Link>> {
    let page = fetcher.fetch(&edge.url).await?;
    let parsed = html::parse_page(&page.body, &edge.url)?;
    indexer.index(IndexTask {
        raw: &page.body,
        url: &edge.url,
        last_modified: page.last_modified,
        page_size: page.content_length,
        parent: (!edge.parent.is_empty()).then(|| ParentRef {
            url: edge.parent.clone(),
            anchor: edge.anchor.clone(),
        }),
        links: &parsed.links,
    })?;
    Ok(parsed.links)
}
