use std::collections::HashSet;

use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::store::Store;

/// Typeahead completion: union the wordHashes of both inverted tables,
/// resolve each through the dictionary, keep the words starting with the
/// prefix, and return them sorted and de-duplicated.
pub fn word_list(store: &Store, prefix: &str) -> Result<Vec<String>> {
    let mut hashes: HashSet<String> = store.inv_title.keys().into_iter().collect();
    hashes.extend(store.inv_body.keys());

    let mut words = Vec::new();
    for hash in hashes {
        let word = store.word_dict.get(&hash)?.ok_or_else(|| {
            Error::new(
                ErrorKind::Internal,
                format!("indexed wordHash {} missing from word_dict", hash),
            )
        })?;
        if word.starts_with(prefix) {
            words.push(word);
        }
    }
    words.sort();
    words.dedup();
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::word_hash;
    use tempfile::tempdir;

    fn seed_word(store: &Store, word: &str, in_title: bool) {
        let key = word_hash(word);
        store.word_dict.set(&key, &word.to_string()).unwrap();
        let posting = std::collections::HashMap::from([("doc".to_string(), vec![0.0f32, 1.0])]);
        if in_title {
            store.inv_title.set(&key, &posting).unwrap();
        } else {
            store.inv_body.set(&key, &posting).unwrap();
        }
    }

    #[test]
    fn test_prefix_union_sorted_deduped() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        seed_word(&store, "hello", true);
        seed_word(&store, "help", false);
        seed_word(&store, "heap", false);
        seed_word(&store, "world", false);
        // present in both tables: must come back once
        seed_word(&store, "heap", true);

        let words = word_list(&store, "he").unwrap();
        assert_eq!(words, vec!["heap".to_string(), "hello".to_string(), "help".to_string()]);
    }

    #[test]
    fn test_no_match_is_empty() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        seed_word(&store, "world", false);
        assert!(word_list(&store, "he").unwrap().is_empty());
    }

    #[test]
    fn test_missing_dictionary_entry_is_internal() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let posting = std::collections::HashMap::from([("doc".to_string(), vec![0.0f32])]);
        store.inv_body.set("deadbeef", &posting).unwrap();

        let err = word_list(&store, "").err().unwrap();
        assert_eq!(err.kind, ErrorKind::Internal);
    }
}
