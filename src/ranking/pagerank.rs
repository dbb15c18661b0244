use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use crate::core::error::{Error, Result};
use crate::storage::store::Store;

#[derive(Debug, Clone, Copy)]
pub struct PagerankStats {
    pub nodes: usize,
    pub iterations: usize,
    pub last_delta: f64,
}

/// Power-iterate PageRank over a frozen snapshot of the `children` table and
/// persist the scores in one batch write.
///
/// Dangling nodes keep their mass: a node with no outbound links distributes
/// nothing, so total rank drifts below one while the teleport term keeps the
/// sequence bounded.
pub fn update_pagerank(
    store: &Store,
    damping: f64,
    epsilon: f64,
    token: &CancellationToken,
) -> Result<PagerankStats> {
    tracing::info!(damping, epsilon, "ranking");

    // Stream the whole link graph into memory.
    let mut graph: HashMap<String, Vec<String>> = HashMap::new();
    for item in store.children.iterate() {
        let (doc, kids) = item?;
        graph.insert(doc, kids);
    }
    let n = graph.len();
    tracing::info!(nodes = n, "link graph loaded");
    if n == 0 {
        return Ok(PagerankStats { nodes: 0, iterations: 0, last_delta: 0.0 });
    }

    let teleport = (1.0 - damping) / n as f64;
    let uniform = 1.0 / n as f64;

    // Two buffers, swapped each iteration instead of reallocating.
    let mut current: HashMap<&str, f64> = graph.keys().map(|k| (k.as_str(), uniform)).collect();
    let mut next: HashMap<&str, f64> = graph.keys().map(|k| (k.as_str(), 0.0)).collect();

    let mut iterations = 0usize;
    let mut delta = f64::MAX;
    while delta > epsilon {
        if token.is_cancelled() {
            return Err(Error::cancelled("pagerank aborted between iterations"));
        }
        iterations += 1;

        for rank in next.values_mut() {
            *rank = 0.0;
        }
        for (parent, kids) in &graph {
            if kids.is_empty() {
                continue;
            }
            let passed_down = damping * current[parent.as_str()] / kids.len() as f64;
            for child in kids {
                if let Some(rank) = next.get_mut(child.as_str()) {
                    *rank += passed_down;
                }
            }
        }

        delta = 0.0;
        for (doc, rank) in next.iter_mut() {
            *rank += teleport;
            delta += (*rank - current[doc]).abs();
        }
        std::mem::swap(&mut current, &mut next);

        tracing::debug!(iteration = iterations, delta, "pagerank iteration");
    }

    let mut batch = store.pagerank.batch();
    for (doc, rank) in &current {
        batch.batch_set(doc, rank)?;
    }
    batch.flush()?;

    tracing::info!(nodes = n, iterations, delta, "pagerank converged");
    Ok(PagerankStats { nodes: n, iterations, last_delta: delta })
}
