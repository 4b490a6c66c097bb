//! Bounded worker pool over a batch of item links.
//!
//! Each worker performs fetch -> stream to disk -> verify -> ledger update ->
//! summary append, fully isolated: an error from one item becomes a failure
//! record and never aborts siblings. All tasks are awaited to completion, and
//! the failure log is written exactly once at batch end, only when failures
//! occurred.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, instrument, warn};

use super::verify::{IntegrityError, verify_artifact};
use super::{ArtistDirs, DirLayout};
use crate::ledger::{self, ItemFacts, LedgerError};
use crate::source::{ContentKind, FetchError, ItemFetcher, OwnerInfo};
use crate::summary::{self, ItemRecord, RunSummary};

/// Minimum allowed pool width.
const MIN_WIDTH: usize = 1;

/// Maximum allowed pool width.
const MAX_WIDTH: usize = 16;

/// Default pool width.
pub const DEFAULT_WIDTH: usize = 4;

/// Errors from the coordinator itself (never from individual items).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid pool width.
    #[error("invalid worker pool width {value}: must be between {MIN_WIDTH} and {MAX_WIDTH}")]
    InvalidWidth { value: usize },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,

    /// The failure log could not be written at batch end.
    #[error("cannot write failure log {path}: {source}")]
    FailureLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-item failure, captured at the worker boundary.
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ItemError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Worker pool running fetch + verify + record over item links.
///
/// The pool is bounded by a semaphore; the shared [`RunSummary`] and every
/// ledger write are funneled through one run-scoped lock, held only for the
/// metadata step, never across the network transfer.
pub struct DownloadCoordinator {
    width: usize,
    semaphore: Arc<Semaphore>,
    fetcher: Arc<dyn ItemFetcher>,
    layout: Arc<DirLayout>,
    state: Arc<Mutex<RunSummary>>,
    fail_log: PathBuf,
    owner: Option<OwnerInfo>,
}

impl std::fmt::Debug for DownloadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadCoordinator")
            .field("width", &self.width)
            .field("fail_log", &self.fail_log)
            .finish_non_exhaustive()
    }
}

impl DownloadCoordinator {
    /// Creates a coordinator with the given pool width.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidWidth`] outside 1-16.
    pub fn new(
        width: usize,
        fetcher: Arc<dyn ItemFetcher>,
        layout: Arc<DirLayout>,
        state: Arc<Mutex<RunSummary>>,
        fail_log: impl Into<PathBuf>,
    ) -> Result<Self, EngineError> {
        if !(MIN_WIDTH..=MAX_WIDTH).contains(&width) {
            return Err(EngineError::InvalidWidth { value: width });
        }
        Ok(Self {
            width,
            semaphore: Arc::new(Semaphore::new(width)),
            fetcher,
            layout,
            state,
            fail_log: fail_log.into(),
            owner: None,
        })
    }

    /// Files every item in the batch under this owner instead of the owner the
    /// fetcher reports per item. Collection runs use the collection's owner.
    #[must_use]
    pub fn with_owner(mut self, owner: OwnerInfo) -> Self {
        self.owner = Some(owner);
        self
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Downloads one item outside the pool, propagating its error to the
    /// caller (single-item call sites are fatal on failure).
    pub async fn fetch_single(&self, item_link: &str) -> Result<(), ItemError> {
        process_item(
            self.fetcher.as_ref(),
            &self.layout,
            &self.state,
            self.owner.as_ref(),
            item_link,
        )
        .await?;
        let mut summary = self.state.lock().await;
        summary.success.push(item_link.to_string());
        Ok(())
    }

    /// Runs the batch to completion.
    ///
    /// Per-item errors are recorded in the summary's failure list and do not
    /// surface here; both successes and failures are awaited before the
    /// failure log is considered.
    #[instrument(skip(self, item_links), fields(count = item_links.len()))]
    pub async fn run_batch(&self, item_links: &[String]) -> Result<(), EngineError> {
        info!(count = item_links.len(), "downloading {} pics", item_links.len());

        let mut handles = Vec::with_capacity(item_links.len());
        for (index, link) in item_links.iter().enumerate() {
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SemaphoreClosed)?;

            let fetcher = Arc::clone(&self.fetcher);
            let layout = Arc::clone(&self.layout);
            let state = Arc::clone(&self.state);
            let owner = self.owner.clone();
            let link = link.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                debug!(position = index + 1, link = %link, "downloading");

                let result =
                    process_item(fetcher.as_ref(), &layout, &state, owner.as_ref(), &link).await;

                let mut summary = state.lock().await;
                match result {
                    Ok(()) => summary.success.push(link),
                    Err(e) => {
                        warn!(link = %link, error = %e, "item failed");
                        summary.failures.push((link, e.to_string()));
                    }
                }
            }));
        }

        // Successes and failures are both awaited; no early cancellation.
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "download task panicked");
            }
        }

        let summary = self.state.lock().await;
        if !summary.failures.is_empty() {
            summary::write_failure_log(&self.fail_log, &summary.failures).map_err(|e| {
                EngineError::FailureLog {
                    path: self.fail_log.clone(),
                    source: e,
                }
            })?;
            info!(
                failures = summary.failures.len(),
                path = %self.fail_log.display(),
                "failure log written"
            );
        }

        Ok(())
    }
}

/// One worker unit: fetch, then stream/verify/record each artifact the item
/// produced (several for a multi-page illustration).
///
/// The run lock is taken only for directory creation and for the ledger +
/// summary update, never across a transfer.
async fn process_item(
    fetcher: &dyn ItemFetcher,
    layout: &DirLayout,
    state: &Mutex<RunSummary>,
    owner_override: Option<&OwnerInfo>,
    item_link: &str,
) -> Result<(), ItemError> {
    let downloads = fetcher.fetch(item_link).await?;
    if downloads.is_empty() {
        return Err(FetchError::payload(item_link, "no artifacts resolved").into());
    }

    for download in downloads {
        let mut declared = download.declared;
        if let Some(owner) = owner_override {
            declared.owner = owner.clone();
        }

        let observed_kind = download
            .response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(declared.kind, ContentKind::from_content_type);

        let dirs: ArtistDirs = {
            let _guard = state.lock().await;
            layout
                .artist_dirs(&declared.owner.name)
                .await
                .map_err(|e| ItemError::io(layout.artist_root(&declared.owner.name), e))?
        };

        let path = dirs.kind_dir(declared.kind).join(&declared.title);
        let streamed = stream_to_file(download.response, &path).await?;
        verify_artifact(&path, streamed, observed_kind, &declared).await?;

        let mut summary = state.lock().await;
        ledger::upsert(
            &dirs.source,
            &ItemFacts {
                item_link: &declared.item_link,
                owner_link: declared.owner.link.as_deref(),
                explicit: declared.explicit,
            },
        )?;
        summary.record(ItemRecord {
            owner: declared.owner.name,
            path,
            explicit: declared.explicit,
            kind: declared.kind,
        });
    }
    Ok(())
}

/// Streams a response body to `path`, returning the byte count written.
/// A partial file is removed before any error is returned.
async fn stream_to_file(response: reqwest::Response, path: &Path) -> Result<u64, ItemError> {
    let result = write_stream(response, path).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(path).await;
    }
    result
}

async fn write_stream(response: reqwest::Response, path: &Path) -> Result<u64, ItemError> {
    let link = response.url().to_string();
    let file = tokio::fs::File::create(path)
        .await
        .map_err(|e| ItemError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let bytes = chunk.map_err(|e| FetchError::network(&link, e))?;
        writer
            .write_all(&bytes)
            .await
            .map_err(|e| ItemError::io(path, e))?;
        written += bytes.len() as u64;
    }
    writer.flush().await.map_err(|e| ItemError::io(path, e))?;
    Ok(written)
}
