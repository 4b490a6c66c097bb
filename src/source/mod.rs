//! Source adapter capabilities.
//!
//! The engine is source-agnostic: it talks to a collection through the
//! [`ItemLister`] capability (paged, newest-first enumeration of item links)
//! and to individual items through [`ItemFetcher`] (declared integrity and
//! descriptive metadata plus the byte stream). Concrete adapters implement
//! both; the coordinator and ledger never branch on a site.

mod pixiv;
mod yande;

pub use pixiv::PixivClient;
pub use yande::YandeClient;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::classify::{ClassifyError, Source};

/// Closed set of stored content kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Png,
    Jpg,
}

impl ContentKind {
    pub const ALL: [ContentKind; 2] = [ContentKind::Png, ContentKind::Jpg];

    /// File extension / subdirectory name for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
        }
    }

    /// Maps a Content-Type header value: `image/png` is PNG, everything else
    /// is stored as JPG.
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type == "image/png" {
            Self::Png
        } else {
            Self::Jpg
        }
    }

    /// Maps a declared file extension. `None` for anything outside the
    /// closed png/jpg set; adapters reject such items before downloading.
    #[must_use]
    pub fn from_ext(ext: &str) -> Option<Self> {
        if ext.eq_ignore_ascii_case("png") {
            Some(Self::Png)
        } else if ext.eq_ignore_ascii_case("jpg") {
            Some(Self::Jpg)
        } else {
            None
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-layer errors from source adapters.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The link failed strict classification for this adapter's source.
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    /// Network-level failure (DNS, connection, TLS, timeout).
    #[error("network error fetching {link}: {source}")]
    Network {
        link: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status.
    #[error("{link} {status}")]
    HttpStatus { link: String, status: u16 },

    /// The server's payload was missing expected data.
    #[error("{link}: {message}")]
    Payload { link: String, message: String },
}

impl FetchError {
    pub(crate) fn network(link: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            link: link.into(),
            source,
        }
    }

    pub(crate) fn http_status(link: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            link: link.into(),
            status,
        }
    }

    pub(crate) fn payload(link: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Payload {
            link: link.into(),
            message: message.into(),
        }
    }
}

/// Owner identity for a collection.
#[derive(Debug, Clone)]
pub struct OwnerInfo {
    /// Sanitized owner name, also used as the collection directory name.
    pub name: String,
    /// Canonical link to the owner's listing, when one exists.
    pub link: Option<String>,
}

/// Server-declared metadata for one fetchable item.
#[derive(Debug, Clone)]
pub struct DeclaredMeta {
    /// Canonical item link (the locator the ledger records).
    pub item_link: String,
    /// Owner this item is filed under.
    pub owner: OwnerInfo,
    /// Sanitized file name to store the artifact as.
    pub title: String,
    /// Declared byte size, when the server states one.
    pub size: Option<u64>,
    /// Declared MD5 digest (lowercase hex), when the server provides one.
    pub md5: Option<String>,
    /// Declared content kind (from the server's file extension).
    pub kind: ContentKind,
    /// Sensitivity flag (age-restricted rating).
    pub explicit: bool,
}

/// One started artifact download: declared metadata plus the streaming body.
/// A logical item yields one of these per stored file.
pub struct ItemDownload {
    pub declared: DeclaredMeta,
    pub response: reqwest::Response,
}

/// Paged, newest-first enumeration of a collection's item links.
///
/// Pages start at 1; an empty page ends the enumeration. Callers may stop
/// requesting pages early once satisfied.
#[async_trait]
pub trait ItemLister: Send + Sync {
    fn source(&self) -> Source;

    /// Owner identity for a collection id (no item enumeration implied).
    async fn collection_owner(&self, collection_id: &str) -> Result<OwnerInfo, FetchError>;

    /// One page of canonical item links, newest first.
    async fn list_page(&self, collection_id: &str, page: u32) -> Result<Vec<String>, FetchError>;
}

/// Opens a single item for download.
#[async_trait]
pub trait ItemFetcher: Send + Sync {
    fn source(&self) -> Source;

    /// Resolves the item's declared metadata and opens its byte streams.
    /// One logical item may produce several artifacts (a multi-page pixiv
    /// illustration stores one file per page); the list is never empty.
    /// Fails with [`FetchError::HttpStatus`] on non-success responses.
    async fn fetch(&self, item_link: &str) -> Result<Vec<ItemDownload>, FetchError>;
}

/// Strips filesystem-hostile characters from a name segment.
#[must_use]
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_kind_from_content_type() {
        assert_eq!(ContentKind::from_content_type("image/png"), ContentKind::Png);
        assert_eq!(ContentKind::from_content_type("image/jpeg"), ContentKind::Jpg);
        assert_eq!(ContentKind::from_content_type("image/gif"), ContentKind::Jpg);
    }

    #[test]
    fn test_content_kind_from_ext() {
        assert_eq!(ContentKind::from_ext("png"), Some(ContentKind::Png));
        assert_eq!(ContentKind::from_ext("PNG"), Some(ContentKind::Png));
        assert_eq!(ContentKind::from_ext("jpg"), Some(ContentKind::Jpg));
    }

    #[test]
    fn test_content_kind_rejects_unknown_ext() {
        assert_eq!(ContentKind::from_ext("gif"), None);
        assert_eq!(ContentKind::from_ext("webm"), None);
        assert_eq!(ContentKind::from_ext(""), None);
    }

    #[test]
    fn test_sanitize_replaces_hostile_chars() {
        assert_eq!(sanitize(r#"a/b\c:d*e?f"g<h>i|j"#), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize("plain name"), "plain name");
    }

    #[test]
    fn test_sanitize_trims_dots() {
        assert_eq!(sanitize("..hidden.."), "hidden");
    }
}
