use crossbeam::channel::bounded;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::analysis::analyzer::Analyzer;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::word_hash;
use crate::storage::store::Store;

/// Hard cap on returned documents.
pub const MAX_RESULTS: usize = 50;

/// Fixed blend of the three rank components.
const PAGERANK_WEIGHT: f64 = 0.4;
const TITLE_WEIGHT: f64 = 0.4;
const BODY_WEIGHT: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedDoc {
    #[serde(rename = "DocHash")]
    pub doc_hash: String,
    #[serde(rename = "Rank")]
    pub rank: f64,
}

/// Per-document weight sums accumulated over the query terms.
#[derive(Debug, Clone, Copy, Default)]
struct SectionSums {
    title: f64,
    body: f64,
}

/// One posting hit for one query term.
struct TermHit {
    doc: String,
    title_weight: Option<f32>,
    body_weight: Option<f32>,
}

/// Term-at-a-time retrieval over the immutable post-ingestion snapshot.
///
/// Stages talk over bounded crossbeam channels only: term fan-out, fan-in
/// aggregation, score fan-out, then a sorted fan-in. Worker counts follow
/// `ceil(0.75 * inputs)`.
pub struct Retriever {
    store: Arc<Store>,
    analyzer: Arc<Analyzer>,
}

impl Retriever {
    pub fn new(store: Arc<Store>, analyzer: Arc<Analyzer>) -> Self {
        Retriever { store, analyzer }
    }

    pub fn retrieve(&self, query: &str) -> Result<Vec<RankedDoc>> {
        let tokens = self.analyzer.analyze(query);
        // Duplicates are preserved: a repeated term weighs double.
        let hashes: Vec<String> = tokens.iter().map(|t| word_hash(&t.text)).collect();
        if hashes.is_empty() {
            return Ok(Vec::new());
        }

        let matched = self.gather_term_hits(&hashes)?;
        if matched.is_empty() {
            return Ok(Vec::new());
        }
        self.score_docs(matched, hashes.len())
    }

    /// Stages 2 and 3: fan the wordHashes out over posting-lookup workers and
    /// fan their hits back into one per-document weight map.
    fn gather_term_hits(&self, hashes: &[String]) -> Result<HashMap<String, SectionSums>> {
        let workers = fan_out(hashes.len());
        let (term_tx, term_rx) = bounded::<String>(hashes.len());
        let (hit_tx, hit_rx) = bounded::<Result<Vec<TermHit>>>(workers);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let term_rx = term_rx.clone();
                let hit_tx = hit_tx.clone();
                scope.spawn(move || {
                    for term_key in term_rx {
                        if hit_tx.send(self.lookup_term(&term_key)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(term_rx);
            drop(hit_tx);

            for hash in hashes {
                // capacity == hashes.len(), so this never blocks
                let _ = term_tx.send(hash.clone());
            }
            drop(term_tx);

            let mut matched: HashMap<String, SectionSums> = HashMap::new();
            for result in hit_rx {
                for hit in result? {
                    let sums = matched.entry(hit.doc).or_default();
                    if let Some(weight) = hit.title_weight {
                        sums.title += f64::from(weight);
                    }
                    if let Some(weight) = hit.body_weight {
                        sums.body += f64::from(weight);
                    }
                }
            }
            Ok(matched)
        })
    }

    /// A term absent from both inverted tables contributes nothing.
    fn lookup_term(&self, term_key: &str) -> Result<Vec<TermHit>> {
        let title_postings = self.store.inv_title.get(term_key)?.unwrap_or_default();
        let body_postings = self.store.inv_body.get(term_key)?.unwrap_or_default();

        let mut hits: HashMap<String, TermHit> = HashMap::new();
        for (doc, entry) in body_postings {
            let weight = entry.first().copied();
            hits.insert(doc.clone(), TermHit { doc, title_weight: None, body_weight: weight });
        }
        for (doc, entry) in title_postings {
            let weight = entry.first().copied();
            hits.entry(doc.clone())
                .or_insert_with(|| TermHit { doc, title_weight: None, body_weight: None })
                .title_weight = weight;
        }
        Ok(hits.into_values().collect())
    }

    /// Stages 4 and 5: fan the matched documents out over scoring workers,
    /// fan the scores back in with a sorted insertion, keep the top results.
    fn score_docs(
        &self,
        matched: HashMap<String, SectionSums>,
        query_len: usize,
    ) -> Result<Vec<RankedDoc>> {
        let docs: Vec<(String, SectionSums)> = matched.into_iter().collect();
        let workers = fan_out(docs.len());
        let capacity = docs.len();
        let (doc_tx, doc_rx) = bounded::<(String, SectionSums)>(capacity);
        let (scored_tx, scored_rx) = bounded::<Result<RankedDoc>>(workers);
        let query_magnitude = (query_len as f64).sqrt();

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let doc_rx = doc_rx.clone();
                let scored_tx = scored_tx.clone();
                scope.spawn(move || {
                    for (doc, sums) in doc_rx {
                        if scored_tx.send(self.score_one(doc, sums, query_magnitude)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(doc_rx);
            drop(scored_tx);

            for item in docs {
                let _ = doc_tx.send(item);
            }
            drop(doc_tx);

            let mut results: Vec<RankedDoc> = Vec::new();
            for scored in scored_rx {
                insert_sorted(&mut results, scored?);
            }
            results.truncate(MAX_RESULTS);
            Ok(results)
        })
    }

    /// Blend normalized cosine similarity per section with PageRank. A doc is
    /// only reachable through its postings, so its `pagerank` and `magnitude`
    /// entries must exist; a miss is a broken cross-table invariant.
    fn score_one(&self, doc: String, sums: SectionSums, query_magnitude: f64) -> Result<RankedDoc> {
        let pagerank = self
            .store
            .pagerank
            .get(&doc)?
            .ok_or_else(|| invariant_violation("pagerank", &doc))?;
        let magnitude = self
            .store
            .magnitude
            .get(&doc)?
            .ok_or_else(|| invariant_violation("magnitude", &doc))?;

        let cos_title = cosine(sums.title, magnitude.get("title").copied(), query_magnitude);
        let cos_body = cosine(sums.body, magnitude.get("body").copied(), query_magnitude);

        Ok(RankedDoc {
            doc_hash: doc,
            rank: PAGERANK_WEIGHT * pagerank + TITLE_WEIGHT * cos_title + BODY_WEIGHT * cos_body,
        })
    }
}

/// A zero section magnitude yields a zero cosine contribution.
fn cosine(section_sum: f64, section_magnitude: Option<f64>, query_magnitude: f64) -> f64 {
    match section_magnitude {
        Some(magnitude) if magnitude > 0.0 => section_sum / (magnitude * query_magnitude),
        _ => 0.0,
    }
}

fn fan_out(inputs: usize) -> usize {
    ((inputs as f64) * 0.75).ceil().max(1.0) as usize
}

fn insert_sorted(results: &mut Vec<RankedDoc>, doc: RankedDoc) {
    let idx = results.partition_point(|r| r.rank >= doc.rank);
    results.insert(idx, doc);
}

fn invariant_violation(table: &str, doc: &str) -> Error {
    Error::new(
        ErrorKind::Internal,
        format!("matched doc {} has no {} entry", doc, table),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::html;
    use crate::core::types::doc_hash;
    use crate::index::indexer::{IndexTask, Indexer};
    use chrono::Utc;
    use std::io::Write;
    use tempfile::{NamedTempFile, tempdir};

    fn build_engine(root: &std::path::Path) -> (Arc<Store>, Arc<Analyzer>, Indexer) {
        let mut stopwords = NamedTempFile::new().unwrap();
        writeln!(stopwords, "the").unwrap();
        let store = Arc::new(Store::open(root).unwrap());
        let analyzer = Arc::new(Analyzer::web_search(stopwords.path()).unwrap());
        let indexer = Indexer::new(Arc::clone(&store), Arc::clone(&analyzer)).unwrap();
        (store, analyzer, indexer)
    }

    fn index_page(indexer: &Indexer, url: &str, title: &str, body: &str) {
        let raw = format!(
            "<html><head><title>{}</title></head><body><p>{}</p></body></html>",
            title, body
        );
        let parsed = html::parse_page(raw.as_bytes(), url).unwrap();
        indexer
            .index(IndexTask {
                raw: raw.as_bytes(),
                url,
                last_modified: Utc::now(),
                page_size: None,
                parent: None,
                links: &parsed.links,
            })
            .unwrap();
    }

    fn rank_all(store: &Store) {
        crate::ranking::pagerank::update_pagerank(
            store,
            0.85,
            1e-6,
            &tokio_util::sync::CancellationToken::new(),
        )
        .unwrap();
    }

    #[test]
    fn test_fan_out_sizing() {
        assert_eq!(fan_out(1), 1);
        assert_eq!(fan_out(2), 2);
        assert_eq!(fan_out(3), 3);
        assert_eq!(fan_out(4), 3);
        assert_eq!(fan_out(8), 6);
    }

    #[test]
    fn test_insert_sorted_descending() {
        let mut results = Vec::new();
        for (doc, rank) in [("a", 0.2), ("b", 0.9), ("c", 0.5)] {
            insert_sorted(&mut results, RankedDoc { doc_hash: doc.into(), rank });
        }
        let order: Vec<&str> = results.iter().map(|r| r.doc_hash.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_query_matches_and_ranks() {
        let dir = tempdir().unwrap();
        let (store, analyzer, indexer) = build_engine(dir.path());
        index_page(&indexer, "http://ex.test/a", "Hello World", "world world foo");
        index_page(&indexer, "http://ex.test/b", "Other Page", "nothing here");
        // re-run a so its weights see N = 2
        index_page(&indexer, "http://ex.test/a", "Hello World", "world world foo");
        rank_all(&store);

        let retriever = Retriever::new(Arc::clone(&store), analyzer);
        let results = retriever.retrieve("world").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].doc_hash, doc_hash("http://ex.test/a"));
        // pagerank alone guarantees a positive score
        assert!(results[0].rank > 0.0);
    }

    #[test]
    fn test_unknown_term_contributes_nothing() {
        let dir = tempdir().unwrap();
        let (store, analyzer, indexer) = build_engine(dir.path());
        index_page(&indexer, "http://ex.test/a", "Hello", "body words");
        rank_all(&store);

        let retriever = Retriever::new(store, analyzer);
        assert!(retriever.retrieve("zebra").unwrap().is_empty());
        // one known + one unknown term still matches the known one
        assert_eq!(retriever.retrieve("zebra body").unwrap().len(), 1);
    }

    #[test]
    fn test_empty_query() {
        let dir = tempdir().unwrap();
        let (store, analyzer, _indexer) = build_engine(dir.path());
        let retriever = Retriever::new(store, analyzer);
        assert!(retriever.retrieve("").unwrap().is_empty());
        assert!(retriever.retrieve("...").unwrap().is_empty());
    }

    #[test]
    fn test_missing_pagerank_is_internal_error() {
        let dir = tempdir().unwrap();
        let (store, analyzer, indexer) = build_engine(dir.path());
        index_page(&indexer, "http://ex.test/a", "Hello", "body words");
        // ranking never ran: the pagerank table is empty

        let retriever = Retriever::new(store, analyzer);
        let err = retriever.retrieve("body").err().unwrap();
        assert_eq!(err.kind, ErrorKind::Internal);
    }

    #[test]
    fn test_title_match_outranks_body_match() {
        let dir = tempdir().unwrap();
        let (store, analyzer, indexer) = build_engine(dir.path());
        index_page(&indexer, "http://ex.test/title", "special topic", "plain text");
        index_page(&indexer, "http://ex.test/body", "plain page", "special topic words");
        index_page(&indexer, "http://ex.test/other", "unrelated", "filler content");
        // second pass so both docs carry final N = 3 weights
        index_page(&indexer, "http://ex.test/title", "special topic", "plain text");
        index_page(&indexer, "http://ex.test/body", "plain page", "special topic words");
        rank_all(&store);

        let retriever = Retriever::new(Arc::clone(&store), analyzer);
        let results = retriever.retrieve("special").unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].doc_hash, doc_hash("http://ex.test/title"));
        assert!(results[0].rank > results[1].rank);
    }

    #[test]
    fn test_output_serialization_shape() {
        let doc = RankedDoc { doc_hash: "abcd".into(), rank: 0.25 };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json, serde_json::json!({"DocHash": "abcd", "Rank": 0.25}));
    }
}
