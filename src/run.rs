//! Run orchestration: single-item and collection flows.
//!
//! Dispatch, paging, and diffing live here; the network work is delegated to
//! the source adapter and the [`DownloadCoordinator`]. Errors raised in this
//! module are fatal to the whole run; per-item errors inside the pool never
//! surface here.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::classify::{self, ClassifyError, LinkKind, Source};
use crate::diff::{self, DiffError, UpdateMode};
use crate::download::{DEFAULT_WIDTH, DirLayout, DownloadCoordinator, EngineError, ItemError};
use crate::ledger::{self, LEDGER_FILE, LedgerError};
use crate::source::{FetchError, ItemFetcher, ItemLister, PixivClient, YandeClient};
use crate::summary::RunSummary;

/// Application directory for process-wide state (the failure log).
const APP_DIR: &str = ".imgfetch";

/// Fatal run-level errors.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Item(#[from] ItemError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Pre-flight state violation (missing collection, existing collection
    /// without an update mode, unusable home directory).
    #[error("{0}")]
    State(String),
}

/// Per-run configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Root directory collections are stored under.
    pub img_root: PathBuf,
    /// Process-wide failure log path.
    pub fail_log: PathBuf,
    /// Worker pool width.
    pub width: usize,
    /// Incremental policy, `None` for a full fresh download.
    pub mode: Option<UpdateMode>,
}

impl RunConfig {
    /// Home-relative defaults: images under `~/Downloads/images`, failure log
    /// at `~/.imgfetch/fail.txt`.
    pub fn from_home() -> Result<Self, RunError> {
        let img_root = DirLayout::default_root()
            .ok_or_else(|| RunError::State("cannot determine home directory".to_string()))?;
        let fail_log = dirs::home_dir()
            .ok_or_else(|| RunError::State("cannot determine home directory".to_string()))?
            .join(APP_DIR)
            .join("fail.txt");
        Ok(Self {
            img_root,
            fail_log,
            width: DEFAULT_WIDTH,
            mode: None,
        })
    }
}

/// Drives one run end to end against the source adapters.
pub struct Runner {
    yande: Arc<YandeClient>,
    pixiv: Arc<PixivClient>,
    layout: Arc<DirLayout>,
    state: Arc<Mutex<RunSummary>>,
    config: RunConfig,
}

impl Runner {
    #[must_use]
    pub fn new(config: RunConfig) -> Self {
        Self::with_client(config, YandeClient::new())
    }

    /// Injects a yande adapter bound to an alternate base URL (tests).
    #[must_use]
    pub fn with_client(config: RunConfig, client: YandeClient) -> Self {
        Self {
            yande: Arc::new(client),
            pixiv: Arc::new(PixivClient::new()),
            layout: Arc::new(DirLayout::new(&config.img_root)),
            state: Arc::new(Mutex::new(RunSummary::new())),
            config,
        }
    }

    /// Replaces the pixiv adapter (tests).
    #[must_use]
    pub fn with_pixiv(mut self, client: PixivClient) -> Self {
        self.pixiv = Arc::new(client);
        self
    }

    /// The shared run summary (consumed by reporting after a run).
    #[must_use]
    pub fn state(&self) -> Arc<Mutex<RunSummary>> {
        Arc::clone(&self.state)
    }

    fn coordinator(
        &self,
        fetcher: Arc<dyn ItemFetcher>,
    ) -> Result<DownloadCoordinator, EngineError> {
        DownloadCoordinator::new(
            self.config.width,
            fetcher,
            Arc::clone(&self.layout),
            Arc::clone(&self.state),
            &self.config.fail_log,
        )
    }

    /// Downloads and verifies one item, then prints the single-item report.
    /// Any failure here is fatal to the operation.
    #[instrument(skip(self))]
    pub async fn run_single(&self, link: &str) -> Result<(), RunError> {
        // The adapter's own strict classification rejects links that belong
        // to neither source.
        let fetcher: Arc<dyn ItemFetcher> = match classify::item_source(link) {
            Some(Source::Pixiv) => Arc::clone(&self.pixiv) as Arc<dyn ItemFetcher>,
            _ => Arc::clone(&self.yande) as Arc<dyn ItemFetcher>,
        };

        info!(link, "downloading single item");
        self.coordinator(fetcher)?.fetch_single(link).await?;

        let summary = self.state.lock().await;
        println!("{}", summary.render_single());
        Ok(())
    }

    /// Runs a collection: enumerate newest-first, diff against the ledger
    /// when resuming, download the batch, print the collection report.
    #[instrument(skip(self))]
    pub async fn run_artist(&self, link: &str) -> Result<(), RunError> {
        let collection_id = classify::extract(link, Source::Yande, LinkKind::Artist)?;
        let owner = self.yande.collection_owner(&collection_id).await?;
        info!(artist = %owner.name, "starting collection run");

        let artist_root = self.layout.artist_root(&owner.name);
        let source_dir = artist_root.join("source");

        let known = match self.config.mode {
            Some(_) => {
                if !source_dir.join(LEDGER_FILE).is_file() {
                    return Err(RunError::State(format!(
                        "\"{}\" does not exist",
                        owner.name
                    )));
                }
                ledger::known_items(&source_dir, Source::Yande)?
            }
            None => {
                if artist_root.is_dir() {
                    return Err(RunError::State(format!(
                        "\"{}\" already exists, rerun with --update or --update-all",
                        owner.name
                    )));
                }
                Vec::new()
            }
        };

        {
            let mut summary = self.state.lock().await;
            summary.owners.push(owner.name.clone());
        }

        let batch = self.enumerate_updates(&collection_id, link, &known).await?;

        self.coordinator(Arc::clone(&self.yande) as Arc<dyn ItemFetcher>)?
            .with_owner(owner)
            .run_batch(&batch)
            .await?;

        let summary = self.state.lock().await;
        println!("{}", summary.render_artist(&self.config.fail_log));
        Ok(())
    }

    /// Pages through the collection and applies the configured diff policy.
    ///
    /// Lazy mode stops paging as soon as a page contributes a known item;
    /// full and fresh modes enumerate every page. The lazy early stop leans on
    /// the source's newest-first listing order.
    async fn enumerate_updates(
        &self,
        collection_id: &str,
        link: &str,
        known: &[String],
    ) -> Result<Vec<String>, RunError> {
        info!("fetching page 1");
        let first = self.yande.list_page(collection_id, 1).await?;
        if first.is_empty() {
            return Err(RunError::State(format!("no items found for {link}")));
        }

        let mut updates = match self.config.mode {
            Some(UpdateMode::Lazy) => {
                let updates = diff::lazy_updates(&first, known, true)?;
                if updates.len() < first.len() {
                    // A known item appeared on page 1: the new run ends here.
                    return Ok(updates);
                }
                updates
            }
            _ => first,
        };

        let mut page: u32 = 2;
        loop {
            info!(page, "fetching page {page}");
            let fresh = self.yande.list_page(collection_id, page).await?;
            if fresh.is_empty() {
                break;
            }
            let page_len = fresh.len();

            match self.config.mode {
                Some(UpdateMode::Lazy) => {
                    let new = diff::lazy_updates(&fresh, known, false)?;
                    let stop = new.len() < page_len;
                    updates.extend(new);
                    if stop {
                        break;
                    }
                }
                _ => updates.extend(fresh),
            }
            page += 1;
        }

        if self.config.mode == Some(UpdateMode::Full) {
            updates = diff::full_updates(&updates, known);
            if updates.is_empty() {
                return Err(RunError::Diff(DiffError::NothingToUpdate));
            }
        }

        debug!(count = updates.len(), "enumeration complete");
        Ok(updates)
    }
}
