use std::cmp::Ordering;

use async_stream::try_stream;
use futures::Stream;
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

use crate::downloader::strategy::retrieval_strategy::{
    fetch_text, normalise_base_url, pace, ItemStream, RetrievalStrategy, DEFAULT_BASE_URL,
};
use crate::path_sanitizer::{extension_from_url, id_from_image_url, stem_from_url};
use crate::types::types::{DownloadError, ItemDescriptor, Quota, Retrieved, TagQuery};

/// Thumbnails per listing page; the listing cursor advances by this much.
pub const HTML_PAGE_STRIDE: usize = 42;

const THUMB_SELECTOR: &str = "div.content span.thumb";
const THUMB_LINK_SELECTOR: &str = "div.content span.thumb a";
const LAST_PAGE_SELECTOR: &str = "div.pagination a[alt='last page']";
const VIDEO_SOURCE_SELECTOR: &str = "video#gelcomVideoPlayer source";
const IMAGE_SELECTOR: &str = "div.content img#image";

// ---------------------------------------------------------------------------
// Quantity boundaries
// ---------------------------------------------------------------------------

/// Exclusive upper bound of the listing cursor for a requested quantity.
/// A request smaller than one stride still reads the whole first page.
pub fn cursor_bound(quantity: usize) -> usize {
    quantity.max(HTML_PAGE_STRIDE)
}

/// How many of the `links` found on the page at `cursor` may be followed.
///
/// When fewer than a stride remain before the bound, that remainder is the
/// allowance. When exactly a stride remains, the allowance is the residue:
/// the requested quantity itself for sub-stride requests, a full stride
/// otherwise.
pub fn page_allowance(quantity: usize, cursor: usize, links: usize) -> usize {
    let residue = quantity.min(HTML_PAGE_STRIDE);
    let span = cursor_bound(quantity).saturating_sub(cursor);
    let limit = match span.cmp(&HTML_PAGE_STRIDE) {
        Ordering::Less => span,
        Ordering::Equal => residue,
        Ordering::Greater => links,
    };
    limit.min(links)
}

// ---------------------------------------------------------------------------
// Markup parsing
// ---------------------------------------------------------------------------

/// Media element found on a detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    Video(String),
    Image(String),
}

impl MediaSource {
    pub fn into_descriptor(self) -> ItemDescriptor {
        match self {
            MediaSource::Video(src) => {
                ItemDescriptor::new(stem_from_url(&src), src.clone(), extension_from_url(&src))
            }
            MediaSource::Image(src) => {
                ItemDescriptor::new(id_from_image_url(&src), src.clone(), extension_from_url(&src))
            }
        }
    }
}

fn selector(css: &str) -> Result<Selector, DownloadError> {
    Selector::parse(css)
        .map_err(|e| DownloadError::Parse(format!("invalid selector '{}': {:?}", css, e)))
}

pub fn has_thumbnails(html: &str) -> Result<bool, DownloadError> {
    let document = Html::parse_document(html);
    let thumbs = selector(THUMB_SELECTOR)?;
    let found = document.select(&thumbs).next().is_some();
    Ok(found)
}

/// Detail-page hrefs of every thumbnail on a listing page, `&amp;` decoded.
pub fn parse_thumbnail_links(html: &str) -> Result<Vec<String>, DownloadError> {
    let document = Html::parse_document(html);
    let links = selector(THUMB_LINK_SELECTOR)?;
    Ok(document
        .select(&links)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| href.trim().replace("&amp;", "&"))
        .filter(|href| !href.is_empty())
        .collect())
}

/// `pid` of the "last page" pagination link; 0 when there is no pagination.
pub fn parse_last_page_cursor(html: &str) -> Result<usize, DownloadError> {
    let document = Html::parse_document(html);
    let last_page = selector(LAST_PAGE_SELECTOR)?;

    let Some(link) = document.select(&last_page).next() else {
        return Ok(0);
    };
    let href = link
        .value()
        .attr("href")
        .ok_or_else(|| DownloadError::Parse("last page link has no href attribute".to_string()))?;

    let (_, value) = href
        .rsplit_once('=')
        .ok_or_else(|| DownloadError::Parse(format!("invalid pagination URL format: {}", href)))?;
    value
        .trim()
        .parse::<usize>()
        .map_err(|e| DownloadError::Parse(format!("failed to parse last page cursor '{}': {}", value, e)))
}

/// The video source wins over the image element.
pub fn parse_media_source(html: &str) -> Result<Option<MediaSource>, DownloadError> {
    let document = Html::parse_document(html);
    let video = selector(VIDEO_SOURCE_SELECTOR)?;
    let image = selector(IMAGE_SELECTOR)?;

    let src_of = |sel: &Selector| {
        document
            .select(sel)
            .filter_map(|el| el.value().attr("src"))
            .map(str::trim)
            .find(|src| !src.is_empty())
            .map(str::to_string)
    };

    if let Some(src) = src_of(&video) {
        return Ok(Some(MediaSource::Video(src)));
    }
    Ok(src_of(&image).map(MediaSource::Image))
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// Markup-scraping retrieval: listing pages addressed by a 42-stride cursor,
/// each thumbnail followed to its detail page to find the media URL.
pub struct HtmlRetrieval {
    client: Client,
    base_url: String,
}

impl HtmlRetrieval {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: normalise_base_url(base_url),
        }
    }

    pub async fn is_any_content_available(&self, query: &TagQuery) -> Result<bool, DownloadError> {
        let html = fetch_text(&self.client, self.listing_url(query, None)?).await?;
        has_thumbnails(&html)
    }

    pub async fn max_page_cursor(&self, query: &TagQuery) -> Result<usize, DownloadError> {
        let html = fetch_text(&self.client, self.listing_url(query, None)?).await?;
        parse_last_page_cursor(&html)
    }

    /// Thumbnail hrefs of the listing page at `cursor`.
    pub async fn thumbnail_links(
        &self,
        query: &TagQuery,
        cursor: usize,
    ) -> Result<Vec<String>, DownloadError> {
        let html = fetch_text(&self.client, self.listing_url(query, Some(cursor))?).await?;
        let links = parse_thumbnail_links(&html)?;
        log::debug!("[html] tags='{}' pid={}: {} thumbnails", query, cursor, links.len());
        Ok(links)
    }

    fn listing_url(&self, query: &TagQuery, cursor: Option<usize>) -> Result<Url, DownloadError> {
        let mut params = vec![
            ("page", "post".to_string()),
            ("s", "list".to_string()),
            ("tags", query.as_str().to_string()),
        ];
        if let Some(pid) = cursor {
            params.push(("pid", pid.to_string()));
        }
        Ok(Url::parse_with_params(
            &format!("{}/index.php", self.base_url),
            &params,
        )?)
    }

    /// Follow one thumbnail to its detail page. Never fails the run: any
    /// problem comes back as `Retrieved::Unresolved`.
    async fn resolve(&self, href: &str) -> Retrieved {
        match self.try_resolve(href).await {
            Ok(Some(source)) => Retrieved::Item(source.into_descriptor()),
            Ok(None) => {
                log::warn!("[html] {}: no media element on detail page", href);
                Retrieved::Unresolved {
                    reference: href.to_string(),
                    reason: "no video or image found on detail page".to_string(),
                }
            }
            Err(e) => {
                log::warn!("[html] {}: {}", href, e);
                Retrieved::Unresolved {
                    reference: href.to_string(),
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn try_resolve(&self, href: &str) -> Result<Option<MediaSource>, DownloadError> {
        let site_root = Url::parse(&format!("{}/", self.base_url))?;
        let detail_url = site_root.join(href)?;
        let html = fetch_text(&self.client, detail_url.clone()).await?;

        let absolute = |src: String| -> Result<String, DownloadError> {
            Ok(detail_url.join(&src)?.to_string())
        };
        Ok(match parse_media_source(&html)? {
            Some(MediaSource::Video(src)) => Some(MediaSource::Video(absolute(src)?)),
            Some(MediaSource::Image(src)) => Some(MediaSource::Image(absolute(src)?)),
            None => None,
        })
    }

    fn items<'a>(
        &'a self,
        query: &'a TagQuery,
        quota: Quota,
    ) -> impl Stream<Item = Result<Retrieved, DownloadError>> + Send + 'a {
        try_stream! {
            let quantity = quota.requested();
            let bound = if quantity == 0 { 0 } else { cursor_bound(quantity) };
            let mut cursor = 0usize;
            let mut emitted = 0usize;

            while cursor < bound {
                let links = self.thumbnail_links(query, cursor).await?;
                if links.is_empty() {
                    log::info!("[html] tags='{}': no thumbnails at pid={}, done", query, cursor);
                    break;
                }

                let allowance = page_allowance(quantity, cursor, links.len());
                for href in links.into_iter().take(allowance) {
                    pace(emitted).await;
                    emitted += 1;
                    yield self.resolve(&href).await;
                }

                cursor += HTML_PAGE_STRIDE;
            }
        }
    }
}

impl RetrievalStrategy for HtmlRetrieval {
    fn produce<'a>(&'a self, query: &'a TagQuery, quota: Quota) -> ItemStream<'a> {
        Box::pin(self.items(query, quota))
    }
}
