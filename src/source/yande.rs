//! yande.re adapter.
//!
//! Talks to the site's post JSON API rather than scraping HTML. Item locators
//! are always the canonical `https://yande.re/post/show/<id>` form so that
//! classification and ledger sort keys hold even when the API base URL is
//! swapped out (tests point it at a mock server).

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{
    ContentKind, DeclaredMeta, FetchError, ItemDownload, ItemFetcher, ItemLister, OwnerInfo,
    sanitize,
};
use crate::classify::{self, LinkKind, Source};

/// Connect timeout for API and file requests.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Read timeout, sized for large image files.
const READ_TIMEOUT_SECS: u64 = 300;

/// Canonical site root used in persisted locators.
const CANONICAL_BASE: &str = "https://yande.re";

/// The fields of a yande.re post record this engine consumes.
#[derive(Debug, Clone, Deserialize)]
struct Post {
    id: u64,
    file_url: String,
    file_size: u64,
    file_ext: String,
    md5: String,
    rating: String,
    author: String,
    #[serde(default)]
    tags: String,
}

impl Post {
    fn item_link(&self) -> String {
        format!("{CANONICAL_BASE}/post/show/{}", self.id)
    }

    fn is_explicit(&self) -> bool {
        self.rating == "e"
    }
}

/// HTTP client for the yande.re post API and file host.
///
/// Create once and reuse; the underlying `reqwest::Client` pools connections.
#[derive(Debug, Clone)]
pub struct YandeClient {
    http: reqwest::Client,
    base: String,
}

impl Default for YandeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl YandeClient {
    /// Creates a client against the live site.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static configuration,
    /// which does not happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_base_url(CANONICAL_BASE)
    }

    /// Creates a client against an alternate API base (mock servers in tests).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_base_url(base: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(std::time::Duration::from_secs(READ_TIMEOUT_SECS))
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self {
            http,
            base: base.into(),
        }
    }

    /// Queries the post API with a tag expression, optionally paged.
    #[instrument(level = "debug", skip(self))]
    async fn posts(&self, tags: &str, page: Option<u32>) -> Result<Vec<Post>, FetchError> {
        let url = format!("{}/post.json", self.base);
        let mut query: Vec<(&str, String)> = vec![("tags", tags.to_string())];
        if let Some(page) = page {
            query.push(("page", page.to_string()));
        }

        let response = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| FetchError::network(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(&url, status.as_u16()));
        }

        let posts: Vec<Post> = response
            .json()
            .await
            .map_err(|e| FetchError::network(&url, e))?;
        debug!(tags, ?page, count = posts.len(), "post query complete");
        Ok(posts)
    }
}

#[async_trait]
impl ItemLister for YandeClient {
    fn source(&self) -> Source {
        Source::Yande
    }

    async fn collection_owner(&self, collection_id: &str) -> Result<OwnerInfo, FetchError> {
        Ok(OwnerInfo {
            name: sanitize(collection_id),
            link: Some(format!("{CANONICAL_BASE}/post?tags={collection_id}")),
        })
    }

    #[instrument(level = "debug", skip(self))]
    async fn list_page(&self, collection_id: &str, page: u32) -> Result<Vec<String>, FetchError> {
        let posts = self.posts(collection_id, Some(page)).await?;
        Ok(posts.iter().map(Post::item_link).collect())
    }
}

#[async_trait]
impl ItemFetcher for YandeClient {
    fn source(&self) -> Source {
        Source::Yande
    }

    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, item_link: &str) -> Result<Vec<ItemDownload>, FetchError> {
        let id = classify::extract(item_link, Source::Yande, LinkKind::Single)?;

        let posts = self.posts(&format!("id:{id}"), None).await?;
        let post = posts
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::payload(item_link, "post not found"))?;

        let kind = ContentKind::from_ext(&post.file_ext).ok_or_else(|| {
            FetchError::payload(item_link, format!("wrong file extension {}", post.file_ext))
        })?;
        let title = sanitize(&format!("yande.re {} {}.{}", post.id, post.tags.trim(), kind));
        let owner = OwnerInfo {
            name: sanitize(&post.author),
            link: Some(format!("{CANONICAL_BASE}/post?tags={}", post.author)),
        };

        let response = self
            .http
            .get(&post.file_url)
            .send()
            .await
            .map_err(|e| FetchError::network(&post.file_url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(&post.file_url, status.as_u16()));
        }

        Ok(vec![ItemDownload {
            declared: DeclaredMeta {
                item_link: post.item_link(),
                owner,
                title,
                size: Some(post.file_size),
                md5: Some(post.md5.to_lowercase()),
                kind,
                explicit: post.is_explicit(),
            },
            response,
        }])
    }
}
