use chrono::{DateTime, Utc};
use reqwest::header::LAST_MODIFIED;
use std::future::Future;
use std::time::Duration;

use crate::core::error::Result;

/// One fetched document, before parsing.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub body: Vec<u8>,
    pub last_modified: DateTime<Utc>,
    /// Declared size from the transport, when the server sent one.
    pub content_length: Option<u32>,
}

/// Transport seam so the crawler can run against stubbed pages in tests.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<FetchedPage>> + Send;
}

/// Production fetcher. Certificate verification is off: a reference crawler
/// pointed at campus-style hosts meets plenty of broken TLS.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .build()?;
        Ok(HttpFetcher { client })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let response = self.client.get(url).send().await?.error_for_status()?;

        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
            .map(|parsed| parsed.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        let content_length = response.content_length().map(|length| length as u32);

        let body = response.bytes().await?.to_vec();
        Ok(FetchedPage { body, last_modified, content_length })
    }
}
