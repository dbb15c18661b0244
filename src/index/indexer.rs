use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::analysis::analyzer::{Analyzer, term_stats};
use crate::analysis::html::{self, Link};
use crate::core::error::Result;
use crate::core::types::{DocInfo, doc_hash, word_hash};
use crate::storage::store::Store;
use crate::storage::table::Table;

/// The edge that led the crawler to a document.
#[derive(Debug, Clone)]
pub struct ParentRef {
    pub url: String,
    pub anchor: String,
}

/// Everything the crawler hands over for one fetched document.
pub struct IndexTask<'a> {
    pub raw: &'a [u8],
    pub url: &'a str,
    pub last_modified: DateTime<Utc>,
    /// Declared size; falls back to the raw byte length.
    pub page_size: Option<u32>,
    /// Referring edge; None for seeds.
    pub parent: Option<ParentRef>,
    /// Outbound links extracted at parse time.
    pub links: &'a [Link],
}

/// Sole writer during ingestion. A single mutex serialises every multi-table
/// mutation, so hash-addressed records and cross-table updates are atomic
/// with respect to concurrent `index` / `add_parent` calls.
pub struct Indexer {
    store: Arc<Store>,
    analyzer: Arc<Analyzer>,
    write_lock: Mutex<()>,
    /// Number of fully indexed (non-stub) documents; this is the `N` in the
    /// tf-idf scaling.
    crawled_docs: AtomicUsize,
}

impl Indexer {
    /// The crawled-doc count is seeded from the store so a re-run over an
    /// existing snapshot reproduces identical weights.
    pub fn new(store: Arc<Store>, analyzer: Arc<Analyzer>) -> Result<Self> {
        let mut crawled = 0usize;
        for item in store.doc_info.iterate() {
            let (_, info) = item?;
            if !info.is_stub() {
                crawled += 1;
            }
        }
        Ok(Indexer {
            store,
            analyzer,
            write_lock: Mutex::new(()),
            crawled_docs: AtomicUsize::new(crawled),
        })
    }

    pub fn crawled_docs(&self) -> usize {
        self.crawled_docs.load(Ordering::SeqCst)
    }

    /// Index one fetched document: upsert its record, write postings for both
    /// sections, register children (as stubs when unknown), then finalize the
    /// tf-idf weights and section magnitudes.
    pub fn index(&self, task: IndexTask) -> Result<()> {
        let _guard = self.write_lock.lock();

        let doc_key = doc_hash(task.url);
        tracing::debug!(url = task.url, doc = %doc_key, "indexing");

        // Upsert so forward references to this document are valid from here
        // on, preserving parents recorded on an earlier stub.
        let existing = self.store.doc_info.get(&doc_key)?;
        let was_crawled = existing.as_ref().is_some_and(|info| !info.is_stub());
        let mut info = existing.unwrap_or_else(|| DocInfo::stub(task.url));
        if let Some(parent) = &task.parent {
            if !parent.url.is_empty() {
                push_anchor(&mut info.parents, &doc_hash(&parent.url), &parent.anchor);
            }
        }
        self.store.doc_info.set(&doc_key, &info)?;

        let page = html::parse_page(task.raw, task.url)?;
        let title_tokens = self.analyzer.analyze(&page.title);
        let body_tokens = self.analyzer.analyze(&page.body_text);
        let (freq_title, pos_title) = term_stats(&title_tokens);
        let (freq_body, pos_body) = term_stats(&body_tokens);

        self.write_postings(&self.store.inv_title, &doc_key, &pos_title)?;
        self.write_postings(&self.store.inv_body, &doc_key, &pos_body)?;

        let kids = self.register_children(&doc_key, task.links, &mut info)?;
        self.store.children.set(&doc_key, &kids)?;

        if !was_crawled {
            self.crawled_docs.fetch_add(1, Ordering::SeqCst);
        }
        let n = self.crawled_docs().max(1);

        let mag_title = self.finalize_weights(&self.store.inv_title, &doc_key, &freq_title, n)?;
        let mag_body = self.finalize_weights(&self.store.inv_body, &doc_key, &freq_body, n)?;
        self.store.magnitude.set(
            &doc_key,
            &HashMap::from([("title".to_string(), mag_title), ("body".to_string(), mag_body)]),
        )?;

        info.page_title = page.title.split_whitespace().map(String::from).collect();
        info.mod_date = task.last_modified;
        info.page_size = task.page_size.unwrap_or(task.raw.len() as u32);
        info.children = kids;
        info.words_mapping = freq_body
            .iter()
            .map(|(word, &tf)| (word_hash(word), tf))
            .collect();
        self.store.doc_info.set(&doc_key, &info)?;

        Ok(())
    }

    /// Attach later-discovered parents to an already-indexed child. The
    /// crawler calls this at each depth barrier, when the child's record is
    /// guaranteed to exist. Idempotent on the parents mapping.
    pub fn add_parent(&self, child_url: &str, parents: &[(String, String)]) -> Result<()> {
        let _guard = self.write_lock.lock();

        let child_key = doc_hash(child_url);
        let mut info = self.store.doc_info.get_required(&child_key)?;
        let mut changed = false;
        for (parent_url, anchor) in parents {
            changed |= push_anchor(&mut info.parents, &doc_hash(parent_url), anchor);
        }
        if changed {
            self.store.doc_info.set(&child_key, &info)?;
        }
        Ok(())
    }

    /// Step 3: make sure the dictionary knows every term and write the
    /// position list behind a weight placeholder (slot 0, patched in step 5).
    fn write_postings(
        &self,
        table: &Table<HashMap<String, Vec<f32>>>,
        doc_key: &str,
        positions: &HashMap<String, Vec<u32>>,
    ) -> Result<()> {
        for (term, pos_list) in positions {
            let term_key = word_hash(term);
            if !self.store.word_dict.has(&term_key)? {
                self.store.word_dict.set(&term_key, term)?;
            }
            let mut posting = table.get(&term_key)?.unwrap_or_default();
            let mut entry = Vec::with_capacity(pos_list.len() + 1);
            entry.push(0.0f32);
            entry.extend(pos_list.iter().map(|&p| p as f32));
            posting.insert(doc_key.to_string(), entry);
            table.set(&term_key, &posting)?;
        }
        Ok(())
    }

    /// Step 4: create stubs for unknown children so the link can be recorded,
    /// and mirror the edge into the child's parents mapping. Self-links are
    /// folded into the record being built instead of the stored one.
    fn register_children(
        &self,
        doc_key: &str,
        links: &[Link],
        own_info: &mut DocInfo,
    ) -> Result<Vec<String>> {
        let mut kids: Vec<String> = Vec::new();
        for link in links {
            let child_key = doc_hash(&link.url);

            if child_key == *doc_key {
                push_anchor(&mut own_info.parents, doc_key, &link.anchor);
            } else {
                let mut child_info = match self.store.doc_info.get(&child_key)? {
                    Some(existing) => existing,
                    None => {
                        // A fresh stub gets an empty children entry and a zero
                        // magnitude so the forward tables cover every known doc.
                        self.store.children.set(&child_key, &Vec::new())?;
                        self.store.magnitude.set(
                            &child_key,
                            &HashMap::from([("title".to_string(), 0.0), ("body".to_string(), 0.0)]),
                        )?;
                        DocInfo::stub(&link.url)
                    }
                };
                push_anchor(&mut child_info.parents, doc_key, &link.anchor);
                self.store.doc_info.set(&child_key, &child_info)?;
            }

            if !kids.contains(&child_key) {
                kids.push(child_key);
            }
        }
        Ok(kids)
    }

    /// Step 5: `norm_tf_idf = (tf / max_tf) * log2(N / df)` per distinct term,
    /// patched into slot 0 of this document's posting entries. Returns the L2
    /// magnitude of the section's weight vector.
    fn finalize_weights(
        &self,
        table: &Table<HashMap<String, Vec<f32>>>,
        doc_key: &str,
        freq: &HashMap<String, u32>,
        n: usize,
    ) -> Result<f64> {
        let max_tf = freq.values().copied().max().unwrap_or(0);
        if max_tf == 0 {
            return Ok(0.0);
        }

        let mut sum_sq = 0.0f64;
        for (term, &tf) in freq {
            let term_key = word_hash(term);
            let mut posting = table.get_required(&term_key)?;
            let df = posting.len().max(1);
            let weight = (tf as f32 / max_tf as f32) * (n as f32 / df as f32).log2();
            if let Some(entry) = posting.get_mut(doc_key) {
                entry[0] = weight;
            }
            table.set(&term_key, &posting)?;
            sum_sq += f64::from(weight) * f64::from(weight);
        }
        Ok(sum_sq.sqrt())
    }
}

/// Append an anchor text to a parents mapping unless it is already recorded.
/// Returns whether the mapping changed.
fn push_anchor(parents: &mut HashMap<String, Vec<String>>, parent_key: &str, anchor: &str) -> bool {
    let anchors = parents.entry(parent_key.to_string()).or_default();
    if anchors.iter().any(|a| a == anchor) {
        false
    } else {
        anchors.push(anchor.to_string());
        true
    }
}
