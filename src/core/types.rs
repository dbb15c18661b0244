use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Content-addressed document identifier: lowercase-hex MD5 of the canonical URL.
pub fn doc_hash(url: &str) -> String {
    format!("{:x}", md5::compute(url.as_bytes()))
}

/// Content-addressed term identifier: lowercase-hex MD5 of the stemmed token.
pub fn word_hash(word: &str) -> String {
    format!("{:x}", md5::compute(word.as_bytes()))
}

/// Per-document record stored in the `doc_info` table.
///
/// A record starts life either when the crawler fetches the URL or as a stub
/// when some parent's index run references it first. Stubs have zero
/// `page_size` and an empty `words_mapping`; a later fetch fills them in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocInfo {
    pub url: String,
    pub page_title: Vec<String>,
    #[serde(with = "rfc1123")]
    pub mod_date: DateTime<Utc>,
    pub page_size: u32,
    pub children: Vec<String>,
    /// parent docHash -> anchor texts seen on that parent's links here
    pub parents: HashMap<String, Vec<String>>,
    /// wordHash -> raw term frequency in the body section
    pub words_mapping: HashMap<String, u32>,
}

impl DocInfo {
    pub fn stub(url: &str) -> Self {
        DocInfo {
            url: url.to_string(),
            page_title: Vec::new(),
            mod_date: Utc::now(),
            page_size: 0,
            children: Vec::new(),
            parents: HashMap::new(),
            words_mapping: HashMap::new(),
        }
    }

    pub fn is_stub(&self) -> bool {
        self.page_size == 0 && self.words_mapping.is_empty()
    }
}

/// RFC1123 timestamps ("Sun, 06 Nov 1994 08:49:37 GMT"), second granularity.
pub mod rfc1123 {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}
