use async_stream::try_stream;
use futures::Stream;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::downloader::strategy::retrieval_strategy::{
    fetch_text, normalise_base_url, pace, ItemStream, RetrievalStrategy, DEFAULT_BASE_URL,
};
use crate::path_sanitizer::{extension_from_url, stem_from_url};
use crate::types::types::{DownloadError, ItemDescriptor, Quota, Retrieved, TagQuery};

/// Posts per feed page.
pub const API_PAGE_SIZE: usize = 100;

/// Root element of the XML feed: `<posts count=".." offset=".."><post/>…</posts>`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedResponse {
    #[serde(rename = "@count", default)]
    pub count: u64,
    #[serde(rename = "@offset", default)]
    pub offset: u64,
    #[serde(rename = "post", default)]
    pub posts: Vec<FeedPost>,
}

/// One `<post/>` record. Every field is an XML attribute.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedPost {
    #[serde(rename = "@id", default)]
    pub id: String,
    #[serde(rename = "@file_url", default)]
    pub file_url: String,
    #[serde(rename = "@sample_url", default)]
    pub sample_url: String,
    #[serde(rename = "@preview_url", default)]
    pub preview_url: String,
    #[serde(rename = "@tags", default)]
    pub tags: String,
    #[serde(rename = "@score", default)]
    pub score: i64,
    #[serde(rename = "@rating", default)]
    pub rating: String,
    #[serde(rename = "@width", default)]
    pub width: u32,
    #[serde(rename = "@height", default)]
    pub height: u32,
    #[serde(rename = "@md5", default)]
    pub md5: String,
    #[serde(rename = "@created_at", default)]
    pub created_at: String,
}

impl FeedPost {
    pub fn into_retrieved(self) -> Retrieved {
        if self.file_url.trim().is_empty() {
            return Retrieved::Unresolved {
                reference: format!("post {}", self.id),
                reason: "post has no file URL".to_string(),
            };
        }

        let extension = extension_from_url(&self.file_url);
        let id = if self.id.is_empty() {
            stem_from_url(&self.file_url)
        } else {
            self.id
        };
        Retrieved::Item(
            ItemDescriptor::new(id, self.file_url, extension).with_sample_url(self.sample_url),
        )
    }
}

pub fn parse_feed(xml: &str) -> Result<FeedResponse, DownloadError> {
    quick_xml::de::from_str(xml)
        .map_err(|e| DownloadError::Parse(format!("malformed feed response: {}", e)))
}

/// Structured-feed retrieval: numeric `pid` paging over the XML API.
pub struct ApiRetrieval {
    client: Client,
    base_url: String,
}

impl ApiRetrieval {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: normalise_base_url(base_url),
        }
    }

    /// Total number of posts matching `query`.
    pub async fn count(&self, query: &TagQuery) -> Result<u64, DownloadError> {
        let feed = self.get_feed(query, None).await?;
        log::info!("[api] tags='{}': {} posts available", query, feed.count);
        Ok(feed.count)
    }

    /// Page `page` (0-based) of up to [`API_PAGE_SIZE`] posts.
    pub async fn fetch_page(
        &self,
        query: &TagQuery,
        page: usize,
    ) -> Result<Vec<FeedPost>, DownloadError> {
        let feed = self.get_feed(query, Some(page)).await?;
        log::debug!(
            "[api] tags='{}' pid={}: {} posts",
            query,
            page,
            feed.posts.len()
        );
        Ok(feed.posts)
    }

    fn feed_url(&self, query: &TagQuery, page: Option<usize>) -> Result<Url, DownloadError> {
        let mut params = vec![
            ("page", "dapi".to_string()),
            ("s", "post".to_string()),
            ("q", "index".to_string()),
            ("tags", query.as_str().to_string()),
        ];
        if let Some(pid) = page {
            params.push(("pid", pid.to_string()));
            params.push(("limit", API_PAGE_SIZE.to_string()));
        }
        Ok(Url::parse_with_params(
            &format!("{}/index.php", self.base_url),
            &params,
        )?)
    }

    async fn get_feed(
        &self,
        query: &TagQuery,
        page: Option<usize>,
    ) -> Result<FeedResponse, DownloadError> {
        let url = self.feed_url(query, page)?;
        let body = fetch_text(&self.client, url).await?;
        parse_feed(&body)
    }

    fn items<'a>(
        &'a self,
        query: &'a TagQuery,
        quota: Quota,
    ) -> impl Stream<Item = Result<Retrieved, DownloadError>> + Send + 'a {
        try_stream! {
            let mut page = 0usize;
            let mut emitted = 0usize;

            loop {
                // Sized at page start; failed items leave room for the next page.
                let remaining = quota.remaining();
                if remaining == 0 {
                    break;
                }

                let posts = self.fetch_page(query, page).await?;
                if posts.is_empty() {
                    log::info!("[api] tags='{}': feed exhausted at pid={}", query, page);
                    break;
                }

                let take = remaining.min(posts.len());
                for post in posts.into_iter().take(take) {
                    pace(emitted).await;
                    emitted += 1;
                    yield post.into_retrieved();
                }

                page += 1;
            }
        }
    }
}

impl RetrievalStrategy for ApiRetrieval {
    fn produce<'a>(&'a self, query: &'a TagQuery, quota: Quota) -> ItemStream<'a> {
        Box::pin(self.items(query, quota))
    }
}
