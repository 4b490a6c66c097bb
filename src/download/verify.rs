//! Post-download integrity verification.
//!
//! Checks run in a fixed order and fail fast: streamed byte count against the
//! declared size, an independent on-disk re-read against the declared size
//! (catches a truncated flush), the MD5 digest against the server-declared
//! hash, and finally content-kind consistency. Size and checksum checks are
//! skipped when the server declared nothing to check against. An artifact
//! that fails any check is deleted before the error is returned; the
//! filesystem never retains a file that failed verification.

use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use thiserror::Error;
use tracing::debug;

use crate::source::{ContentKind, DeclaredMeta};

/// Integrity mismatch after a completed transfer.
#[derive(Debug, Error)]
pub enum IntegrityError {
    /// Transferred byte count differs from the declared size.
    #[error("{path} file size mismatch {actual} != {expected}")]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// On-disk size after flush differs from the declared size.
    #[error("{path} on-disk size mismatch {actual} != {expected}")]
    DiskSizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// MD5 digest differs from the server-declared hash.
    #[error("md5 checksum failure for {path}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Served content type disagrees with the declared file extension.
    #[error("{path} wrong file kind: declared {declared}, served {observed}")]
    KindMismatch {
        path: PathBuf,
        declared: ContentKind,
        observed: ContentKind,
    },

    /// The artifact could not be re-read for verification.
    #[error("cannot re-read {path} for verification: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Verifies a downloaded artifact against its declared metadata, deleting the
/// file on any failure.
///
/// `streamed` is the byte count observed during the transfer; `observed_kind`
/// is derived from the response's Content-Type header.
pub async fn verify_artifact(
    path: &Path,
    streamed: u64,
    observed_kind: ContentKind,
    declared: &DeclaredMeta,
) -> Result<(), IntegrityError> {
    let result = check(path, streamed, observed_kind, declared).await;
    if result.is_err() {
        // Best effort: the artifact is corrupt either way.
        let _ = tokio::fs::remove_file(path).await;
    }
    result
}

async fn check(
    path: &Path,
    streamed: u64,
    observed_kind: ContentKind,
    declared: &DeclaredMeta,
) -> Result<(), IntegrityError> {
    if let Some(expected) = declared.size {
        if streamed != expected {
            return Err(IntegrityError::SizeMismatch {
                path: path.to_path_buf(),
                expected,
                actual: streamed,
            });
        }

        let on_disk = tokio::fs::metadata(path)
            .await
            .map_err(|e| IntegrityError::Io {
                path: path.to_path_buf(),
                source: e,
            })?
            .len();
        if on_disk != expected {
            return Err(IntegrityError::DiskSizeMismatch {
                path: path.to_path_buf(),
                expected,
                actual: on_disk,
            });
        }
    }

    if let Some(expected) = declared.md5.as_deref() {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| IntegrityError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
        let actual = hex::encode(Md5::digest(&bytes));
        if actual != expected {
            return Err(IntegrityError::ChecksumMismatch {
                path: path.to_path_buf(),
                expected: expected.to_string(),
                actual,
            });
        }
    }

    if observed_kind != declared.kind {
        return Err(IntegrityError::KindMismatch {
            path: path.to_path_buf(),
            declared: declared.kind,
            observed: observed_kind,
        });
    }

    debug!(path = %path.display(), bytes = streamed, "artifact verified");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::source::OwnerInfo;
    use tempfile::TempDir;

    fn declared(size: Option<u64>, md5: Option<&str>, kind: ContentKind) -> DeclaredMeta {
        DeclaredMeta {
            item_link: "https://yande.re/post/show/1".to_string(),
            owner: OwnerInfo {
                name: "artist".to_string(),
                link: None,
            },
            title: "yande.re 1 tag.png".to_string(),
            size,
            md5: md5.map(ToString::to_string),
            kind,
            explicit: false,
        }
    }

    async fn write_artifact(dir: &TempDir, content: &[u8]) -> PathBuf {
        let path = dir.path().join("artifact.png");
        tokio::fs::write(&path, content).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_verify_accepts_matching_artifact() {
        let dir = TempDir::new().unwrap();
        let content = b"png bytes";
        let path = write_artifact(&dir, content).await;
        let md5 = hex::encode(Md5::digest(content));

        let meta = declared(Some(content.len() as u64), Some(&md5), ContentKind::Png);
        verify_artifact(&path, content.len() as u64, ContentKind::Png, &meta)
            .await
            .unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_streamed_size_mismatch_deletes_artifact() {
        let dir = TempDir::new().unwrap();
        let path = write_artifact(&dir, b"content").await;

        let meta = declared(Some(999), None, ContentKind::Png);
        let err = verify_artifact(&path, 7, ContentKind::Png, &meta)
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrityError::SizeMismatch { .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_disk_size_checked_independently_of_stream_count() {
        // Streamed count matches the declaration but the flushed file is
        // short: the second, on-disk read catches it.
        let dir = TempDir::new().unwrap();
        let path = write_artifact(&dir, b"tru").await;

        let meta = declared(Some(7), None, ContentKind::Png);
        let err = verify_artifact(&path, 7, ContentKind::Png, &meta)
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrityError::DiskSizeMismatch { .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_correct_size_wrong_hash_rejected_and_deleted() {
        let dir = TempDir::new().unwrap();
        let content = b"content";
        let path = write_artifact(&dir, content).await;

        let meta = declared(
            Some(content.len() as u64),
            Some("00000000000000000000000000000000"),
            ContentKind::Png,
        );
        let err = verify_artifact(&path, content.len() as u64, ContentKind::Png, &meta)
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrityError::ChecksumMismatch { .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_no_declared_hash_skips_checksum() {
        let dir = TempDir::new().unwrap();
        let content = b"content";
        let path = write_artifact(&dir, content).await;

        let meta = declared(Some(content.len() as u64), None, ContentKind::Png);
        verify_artifact(&path, content.len() as u64, ContentKind::Png, &meta)
            .await
            .unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_no_declared_size_skips_size_checks() {
        // A source without a size declaration (no Content-Length) still passes
        // the remaining checks.
        let dir = TempDir::new().unwrap();
        let content = b"content";
        let path = write_artifact(&dir, content).await;

        let meta = declared(None, None, ContentKind::Png);
        verify_artifact(&path, 999, ContentKind::Png, &meta)
            .await
            .unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_kind_mismatch_rejected_and_deleted() {
        let dir = TempDir::new().unwrap();
        let content = b"jpeg bytes actually";
        let path = write_artifact(&dir, content).await;
        let md5 = hex::encode(Md5::digest(content));

        let meta = declared(Some(content.len() as u64), Some(&md5), ContentKind::Png);
        let err = verify_artifact(&path, content.len() as u64, ContentKind::Jpg, &meta)
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrityError::KindMismatch { .. }));
        assert!(!path.exists());
    }
}
