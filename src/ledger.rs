//! Per-collection metadata ledger.
//!
//! One `info.json` per collection records everything already fetched: owner
//! links, item links, and the sensitive subset, each sorted newest-first by
//! the numeric id embedded in the locator. Every write is a read-modify-write
//! of the whole structure followed by a temp-then-rename, so a crash never
//! leaves a half-written ledger. Item sets only ever grow.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::classify::{self, Source};

/// Ledger file name inside a collection's `source/` directory.
pub const LEDGER_FILE: &str = "info.json";

/// Timestamp format for `lastUpdate` (e.g. `08-26-2026 01:05:09 PM`).
const TIMESTAMP_FORMAT: &str = "%m-%d-%Y %I:%M:%S %p";

/// Errors from ledger persistence.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("ledger parse error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl LedgerError {
    fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Facts recorded for one successfully verified download.
#[derive(Debug, Clone)]
pub struct ItemFacts<'a> {
    /// Canonical item locator.
    pub item_link: &'a str,
    /// Canonical owner listing link, when known.
    pub owner_link: Option<&'a str>,
    /// Whether the item carries the sensitivity flag.
    pub explicit: bool,
}

/// The persisted per-collection record.
///
/// Loading an older record missing a source key backfills it with an empty
/// list rather than failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(rename = "lastUpdate")]
    pub last_update: String,
    #[serde(rename = "ownerLinks", default)]
    pub owner_links: Vec<String>,
    #[serde(rename = "sensitiveItems", default)]
    pub sensitive_items: BTreeMap<String, Vec<String>>,
    #[serde(rename = "itemLinks", default)]
    pub item_links: BTreeMap<String, Vec<String>>,
}

impl LedgerEntry {
    /// Fresh entry with every registered source keyed to an empty list.
    #[must_use]
    pub fn new(last_update: String) -> Self {
        let empty: BTreeMap<String, Vec<String>> = Source::ALL
            .into_iter()
            .map(|s| (s.as_str().to_string(), Vec::new()))
            .collect();
        Self {
            last_update,
            owner_links: Vec::new(),
            sensitive_items: empty.clone(),
            item_links: empty,
        }
    }

    /// Ensures every registered source has a key in both item maps.
    fn backfill_sources(&mut self) {
        for source in Source::ALL {
            self.item_links.entry(source.as_str().to_string()).or_default();
            self.sensitive_items
                .entry(source.as_str().to_string())
                .or_default();
        }
    }

    /// Applies one item's facts: append, dedupe, resort descending by the
    /// numeric id embedded in each locator. Idempotent under re-application.
    pub fn apply(&mut self, facts: &ItemFacts<'_>) {
        if let Some(owner_link) = facts.owner_link {
            self.owner_links.push(owner_link.to_string());
            self.owner_links.sort();
            self.owner_links.dedup();
        }

        self.backfill_sources();

        let Some(source) = classify::item_source(facts.item_link) else {
            return;
        };
        let key = source.as_str().to_string();

        if facts.explicit
            && let Some(list) = self.sensitive_items.get_mut(&key)
        {
            list.push(facts.item_link.to_string());
            resort(source, list);
        }

        if let Some(list) = self.item_links.get_mut(&key) {
            list.push(facts.item_link.to_string());
            resort(source, list);
        }
    }
}

/// Sorts a locator list descending by embedded numeric id and dedupes it.
fn resort(source: Source, links: &mut Vec<String>) {
    links.sort_by_key(|link| std::cmp::Reverse(classify::sort_key(source, link).unwrap_or(0)));
    links.dedup();
}

fn ledger_path(source_dir: &Path) -> PathBuf {
    source_dir.join(LEDGER_FILE)
}

/// Loads the ledger for a collection, if one exists. Missing source keys are
/// backfilled with empty lists.
pub fn load(source_dir: &Path) -> Result<Option<LedgerEntry>, LedgerError> {
    let path = ledger_path(source_dir);
    if !path.is_file() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&path).map_err(|e| LedgerError::io(&path, e))?;
    let mut entry: LedgerEntry = serde_json::from_str(&raw).map_err(|e| LedgerError::Json {
        path: path.clone(),
        source: e,
    })?;
    entry.backfill_sources();
    Ok(Some(entry))
}

/// The already-known item links for one source, newest first.
///
/// Empty when no ledger exists or the source has no entries yet.
pub fn known_items(source_dir: &Path, source: Source) -> Result<Vec<String>, LedgerError> {
    Ok(load(source_dir)?
        .and_then(|entry| entry.item_links.get(source.as_str()).cloned())
        .unwrap_or_default())
}

/// Records one verified download in the collection's ledger.
///
/// Read-modify-write of the whole entry: seeds a fresh record when none
/// exists, otherwise appends/dedupes/resorts the affected sets and refreshes
/// `lastUpdate`. The caller serializes concurrent upserts through the
/// run-scoped lock; the write itself is temp-then-rename.
pub fn upsert(source_dir: &Path, facts: &ItemFacts<'_>) -> Result<(), LedgerError> {
    let now = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();

    let mut entry = match load(source_dir)? {
        Some(mut existing) => {
            existing.last_update = now;
            existing
        }
        None => LedgerEntry::new(now),
    };
    entry.apply(facts);

    write_atomic(source_dir, &entry)
}

fn write_atomic(source_dir: &Path, entry: &LedgerEntry) -> Result<(), LedgerError> {
    let path = ledger_path(source_dir);
    let tmp = source_dir.join(format!("{LEDGER_FILE}.tmp"));

    let body = serde_json::to_vec_pretty(entry).map_err(|e| LedgerError::Json {
        path: path.clone(),
        source: e,
    })?;
    fs::write(&tmp, body).map_err(|e| LedgerError::io(&tmp, e))?;
    fs::rename(&tmp, &path).map_err(|e| LedgerError::io(&path, e))?;
    debug!(path = %path.display(), "ledger written");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn facts(link: &str, explicit: bool) -> ItemFacts<'_> {
        ItemFacts {
            item_link: link,
            owner_link: Some("https://yande.re/post?tags=artist"),
            explicit,
        }
    }

    #[test]
    fn test_upsert_seeds_fresh_entry() {
        let dir = TempDir::new().unwrap();
        upsert(dir.path(), &facts("https://yande.re/post/show/5", false)).unwrap();

        let entry = load(dir.path()).unwrap().unwrap();
        assert_eq!(
            entry.item_links["yande"],
            vec!["https://yande.re/post/show/5"]
        );
        assert!(entry.sensitive_items["yande"].is_empty());
        assert_eq!(
            entry.owner_links,
            vec!["https://yande.re/post?tags=artist"]
        );
        assert!(!entry.last_update.is_empty());
        // Forward-compat: unknown-to-this-run sources are still keyed.
        assert!(entry.item_links.contains_key("pixiv"));
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let f = facts("https://yande.re/post/show/5", true);
        upsert(dir.path(), &f).unwrap();
        upsert(dir.path(), &f).unwrap();

        let entry = load(dir.path()).unwrap().unwrap();
        assert_eq!(entry.item_links["yande"].len(), 1);
        assert_eq!(entry.sensitive_items["yande"].len(), 1);
        assert_eq!(entry.owner_links.len(), 1);
    }

    #[test]
    fn test_items_sorted_descending_by_embedded_id() {
        let dir = TempDir::new().unwrap();
        for id in [3_u64, 10, 7, 1] {
            let link = format!("https://yande.re/post/show/{id}");
            upsert(dir.path(), &facts(&link, false)).unwrap();
        }

        let entry = load(dir.path()).unwrap().unwrap();
        let ids: Vec<&str> = entry.item_links["yande"]
            .iter()
            .map(|l| l.rsplit('/').next().unwrap())
            .collect();
        assert_eq!(ids, vec!["10", "7", "3", "1"]);
    }

    #[test]
    fn test_sensitive_subset_of_items() {
        let dir = TempDir::new().unwrap();
        upsert(dir.path(), &facts("https://yande.re/post/show/2", true)).unwrap();
        upsert(dir.path(), &facts("https://yande.re/post/show/9", false)).unwrap();

        let entry = load(dir.path()).unwrap().unwrap();
        for link in &entry.sensitive_items["yande"] {
            assert!(entry.item_links["yande"].contains(link));
        }
        assert_eq!(entry.sensitive_items["yande"].len(), 1);
        assert_eq!(entry.item_links["yande"].len(), 2);
    }

    #[test]
    fn test_item_set_never_shrinks() {
        let dir = TempDir::new().unwrap();
        upsert(dir.path(), &facts("https://yande.re/post/show/4", false)).unwrap();
        upsert(dir.path(), &facts("https://yande.re/post/show/8", false)).unwrap();

        let entry = load(dir.path()).unwrap().unwrap();
        assert_eq!(entry.item_links["yande"].len(), 2);
    }

    #[test]
    fn test_load_backfills_missing_source_keys() {
        let dir = TempDir::new().unwrap();
        // Older record written before the pixiv key existed.
        let older = r#"{
            "lastUpdate": "01-01-2020 12:00:00 PM",
            "ownerLinks": [],
            "sensitiveItems": {"yande": []},
            "itemLinks": {"yande": ["https://yande.re/post/show/1"]}
        }"#;
        fs::write(dir.path().join(LEDGER_FILE), older).unwrap();

        let entry = load(dir.path()).unwrap().unwrap();
        assert!(entry.item_links.contains_key("pixiv"));
        assert!(entry.sensitive_items.contains_key("pixiv"));
        assert_eq!(entry.item_links["yande"].len(), 1);
    }

    #[test]
    fn test_known_items_empty_without_ledger() {
        let dir = TempDir::new().unwrap();
        assert!(known_items(dir.path(), Source::Yande).unwrap().is_empty());
    }

    #[test]
    fn test_no_tmp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        upsert(dir.path(), &facts("https://yande.re/post/show/5", false)).unwrap();
        assert!(!dir.path().join(format!("{LEDGER_FILE}.tmp")).exists());
        assert!(dir.path().join(LEDGER_FILE).is_file());
    }
}
