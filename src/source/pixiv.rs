//! pixiv adapter.
//!
//! Uses the public `ajax/illust/<id>` JSON endpoint; the only request
//! decoration the file host needs is a `Referer` header carrying the artwork
//! page. A multi-page illustration yields one artifact per page, derived by
//! rewriting the `_p0` marker in the original-quality URL. Item locators are
//! always the canonical `https://www.pixiv.net/en/artworks/<id>` form.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{ContentKind, DeclaredMeta, FetchError, ItemDownload, ItemFetcher, OwnerInfo, sanitize};
use crate::classify::{self, LinkKind, Source};

/// Connect timeout for API and file requests.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Read timeout, sized for large image files.
const READ_TIMEOUT_SECS: u64 = 300;

/// Canonical site root used in persisted locators.
const CANONICAL_BASE: &str = "https://www.pixiv.net";

/// Tag marking an age-restricted illustration.
const EXPLICIT_TAG: &str = "R-18";

/// Envelope of every ajax response: `error` + `message`, body on success.
#[derive(Debug, Deserialize)]
struct AjaxResponse {
    error: bool,
    #[serde(default)]
    message: String,
    body: Option<IllustBody>,
}

#[derive(Debug, Deserialize)]
struct IllustBody {
    #[serde(rename = "userName")]
    user_name: String,
    #[serde(rename = "illustTitle")]
    illust_title: String,
    urls: IllustUrls,
    /// Map of the author's illustrations; only the requested id carries a
    /// populated record, the rest are null.
    #[serde(rename = "userIllusts", default)]
    user_illusts: BTreeMap<String, Option<IllustPages>>,
    tags: IllustTags,
}

#[derive(Debug, Deserialize)]
struct IllustUrls {
    /// Original-quality URL of page 0; later pages rewrite `_p0`.
    original: String,
}

#[derive(Debug, Deserialize)]
struct IllustPages {
    #[serde(rename = "pageCount")]
    page_count: u32,
}

#[derive(Debug, Deserialize)]
struct IllustTags {
    #[serde(rename = "authorId")]
    author_id: String,
    #[serde(default)]
    tags: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    tag: String,
}

/// HTTP client for the pixiv ajax API and file host.
#[derive(Debug, Clone)]
pub struct PixivClient {
    http: reqwest::Client,
    base: String,
}

impl Default for PixivClient {
    fn default() -> Self {
        Self::new()
    }
}

impl PixivClient {
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

    async fn illust(&self, id: &str, item_link: &str) -> Result<IllustBody, FetchError> {
        let url = format!("{}/ajax/illust/{id}", self.base);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::network(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(&url, status.as_u16()));
        }

        let ajax: AjaxResponse = response
            .json()
            .await
            .map_err(|e| FetchError::network(&url, e))?;
        if ajax.error {
            return Err(FetchError::payload(item_link, ajax.message));
        }
        ajax.body
            .ok_or_else(|| FetchError::payload(item_link, "illust body missing"))
    }
}

#[async_trait]
impl ItemFetcher for PixivClient {
    fn source(&self) -> Source {
        Source::Pixiv
    }

    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, item_link: &str) -> Result<Vec<ItemDownload>, FetchError> {
        let id = classify::extract(item_link, Source::Pixiv, LinkKind::Single)?;
        let body = self.illust(&id, item_link).await?;

        let page_count = body
            .user_illusts
            .get(&id)
            .and_then(Option::as_ref)
            .map(|pages| pages.page_count)
            .ok_or_else(|| FetchError::payload(item_link, "page count missing"))?;

        let canonical = format!("{CANONICAL_BASE}/en/artworks/{id}");
        let owner = OwnerInfo {
            name: sanitize(&body.user_name),
            link: Some(format!(
                "{CANONICAL_BASE}/en/users/{}",
                body.tags.author_id
            )),
        };
        let explicit = body.tags.tags.iter().any(|t| t.tag == EXPLICIT_TAG);
        debug!(id = %id, page_count, explicit, "illust resolved");

        let mut downloads = Vec::with_capacity(page_count as usize);
        for page in 0..page_count {
            let pic_url = body.urls.original.replace("_p0", &format!("_p{page}"));
            let response = self
                .http
                .get(&pic_url)
                .header(reqwest::header::REFERER, item_link)
                .send()
                .await
                .map_err(|e| FetchError::network(&pic_url, e))?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::http_status(&pic_url, status.as_u16()));
            }

            let kind = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map_or(ContentKind::Jpg, ContentKind::from_content_type);
            let size = response
                .headers()
                .get(reqwest::header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            let title = sanitize(&format!("{id}_{}_p{page}.{kind}", body.illust_title));

            downloads.push(ItemDownload {
                declared: DeclaredMeta {
                    item_link: canonical.clone(),
                    owner: owner.clone(),
                    title,
                    size,
                    md5: None,
                    kind,
                    explicit,
                },
                response,
            });
        }
        Ok(downloads)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_page_url_rewrite() {
        let original = "https://i.pximg.net/img-original/img/2024/01/01/00/00/00/123_p0.png";
        assert_eq!(
            original.replace("_p0", "_p2"),
            "https://i.pximg.net/img-original/img/2024/01/01/00/00/00/123_p2.png"
        );
    }

    #[test]
    fn test_ajax_error_envelope_parses() {
        let raw = r#"{"error": true, "message": "Work has been deleted", "body": null}"#;
        let ajax: AjaxResponse = serde_json::from_str(raw).unwrap();
        assert!(ajax.error);
        assert_eq!(ajax.message, "Work has been deleted");
        assert!(ajax.body.is_none());
    }

    #[test]
    fn test_illust_body_parses_page_count_and_tags() {
        let raw = r#"{
            "userName": "someone",
            "illustTitle": "work",
            "urls": {"original": "https://host/img/1_p0.jpg"},
            "userIllusts": {"1": {"pageCount": 3}, "2": null},
            "tags": {"authorId": "77", "tags": [{"tag": "R-18"}, {"tag": "scenery"}]}
        }"#;
        let body: IllustBody = serde_json::from_str(raw).unwrap();
        assert_eq!(
            body.user_illusts["1"].as_ref().unwrap().page_count,
            3
        );
        assert!(body.user_illusts["2"].is_none());
        assert!(body.tags.tags.iter().any(|t| t.tag == EXPLICIT_TAG));
    }
}
