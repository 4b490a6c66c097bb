//! Concurrent download-and-verify engine.
//!
//! [`DownloadCoordinator`] runs a bounded worker pool over a batch of item
//! links; each worker fetches, streams to disk, verifies integrity, and
//! records the outcome in the ledger and run summary. A failure in one item
//! never cancels its siblings.

mod coordinator;
mod verify;

pub use coordinator::{DEFAULT_WIDTH, DownloadCoordinator, EngineError, ItemError};
pub use verify::{IntegrityError, verify_artifact};

use std::io;
use std::path::{Path, PathBuf};

use crate::source::ContentKind;

/// On-disk layout for fetched collections.
///
/// Each owner gets `<img_root>/<owner>/{png,jpg,source}`; the `source/`
/// directory holds the collection's ledger.
#[derive(Debug, Clone)]
pub struct DirLayout {
    img_root: PathBuf,
}

/// The created directory set for one owner.
#[derive(Debug, Clone)]
pub struct ArtistDirs {
    pub root: PathBuf,
    pub png: PathBuf,
    pub jpg: PathBuf,
    pub source: PathBuf,
}

impl ArtistDirs {
    /// Storage directory for a content kind.
    #[must_use]
    pub fn kind_dir(&self, kind: ContentKind) -> &Path {
        match kind {
            ContentKind::Png => &self.png,
            ContentKind::Jpg => &self.jpg,
        }
    }
}

impl DirLayout {
    #[must_use]
    pub fn new(img_root: impl Into<PathBuf>) -> Self {
        Self {
            img_root: img_root.into(),
        }
    }

    /// Default image root: `~/Downloads/images`.
    #[must_use]
    pub fn default_root() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join("Downloads").join("images"))
    }

    #[must_use]
    pub fn img_root(&self) -> &Path {
        &self.img_root
    }

    /// Collection directory for an owner, without creating it.
    #[must_use]
    pub fn artist_root(&self, owner: &str) -> PathBuf {
        self.img_root.join(owner)
    }

    /// Creates (idempotently) the full directory set for an owner.
    ///
    /// Callers hold the run lock while creating directories so concurrent
    /// workers for the same owner do not race.
    pub async fn artist_dirs(&self, owner: &str) -> io::Result<ArtistDirs> {
        let root = self.artist_root(owner);
        let dirs = ArtistDirs {
            png: root.join("png"),
            jpg: root.join("jpg"),
            source: root.join("source"),
            root,
        };
        for dir in [&dirs.root, &dirs.png, &dirs.jpg, &dirs.source] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(dirs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_artist_dirs_created_idempotently() {
        let tmp = TempDir::new().unwrap();
        let layout = DirLayout::new(tmp.path());

        let first = layout.artist_dirs("artist").await.unwrap();
        let second = layout.artist_dirs("artist").await.unwrap();
        assert_eq!(first.root, second.root);
        assert!(first.png.is_dir());
        assert!(first.jpg.is_dir());
        assert!(first.source.is_dir());
    }

    #[test]
    fn test_kind_dir_maps_to_subdirectory() {
        let layout = DirLayout::new("/tmp/images");
        let root = layout.artist_root("a");
        let dirs = ArtistDirs {
            png: root.join("png"),
            jpg: root.join("jpg"),
            source: root.join("source"),
            root,
        };
        assert!(dirs.kind_dir(ContentKind::Png).ends_with("png"));
        assert!(dirs.kind_dir(ContentKind::Jpg).ends_with("jpg"));
    }
}
