//! Incremental, verified, concurrent content-fetch engine.
//!
//! Given a source that exposes a paginated, newest-first listing of items,
//! this library downloads each item exactly once, verifies byte-level
//! integrity against server-declared checksums and sizes, records a durable
//! per-collection ledger of everything fetched, and resumes partial runs
//! without re-fetching known items.
//!
//! # Architecture
//!
//! - [`classify`] - link classification registry (pattern table, id extraction)
//! - [`diff`] - incremental-update policies (lazy and full-diff)
//! - [`source`] - ItemLister/ItemFetcher capabilities + the yande.re and pixiv adapters
//! - [`download`] - bounded worker pool, streaming fetch, integrity verify
//! - [`ledger`] - append-only, dedup-and-resort per-collection metadata
//! - [`summary`] - run aggregation, terminal reports, failure log
//! - [`run`] - single-item and collection orchestration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod classify;
pub mod diff;
pub mod download;
pub mod ledger;
pub mod run;
pub mod source;
pub mod summary;

// Re-export commonly used types
pub use classify::{ClassifyError, LinkKind, Source};
pub use diff::{DiffError, UpdateMode};
pub use download::{
    DEFAULT_WIDTH, DirLayout, DownloadCoordinator, EngineError, IntegrityError, ItemError,
};
pub use ledger::{ItemFacts, LedgerEntry, LedgerError};
pub use run::{RunConfig, RunError, Runner};
pub use source::{ContentKind, FetchError, ItemFetcher, ItemLister, PixivClient, YandeClient};
pub use summary::{ItemRecord, RunSummary};
