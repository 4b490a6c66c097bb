//! Run summary aggregation and terminal reporting.
//!
//! A `RunSummary` is created at run start, mutated under the run-scoped lock
//! by every worker, and consumed once at run end. Rendering is pure; the only
//! I/O is the failure-log write, which happens exactly once at batch end and
//! only when failures exist.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::source::ContentKind;

/// Banner line for report framing.
const BANNER: &str = "==================================================";

/// One successfully verified download, immutable after creation.
#[derive(Debug, Clone)]
pub struct ItemRecord {
    pub owner: String,
    pub path: PathBuf,
    pub explicit: bool,
    pub kind: ContentKind,
}

/// Aggregated outcomes for one run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Owner names touched by this run.
    pub owners: Vec<String>,
    /// Item links that downloaded and verified successfully.
    pub success: Vec<String>,
    /// `(item link, error text)` pairs for isolated per-item failures.
    pub failures: Vec<(String, String)>,
    records: Vec<ItemRecord>,
}

impl RunSummary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: ItemRecord) {
        self.records.push(record);
    }

    #[must_use]
    pub fn records(&self) -> &[ItemRecord] {
        &self.records
    }

    #[must_use]
    pub fn count_kind(&self, kind: ContentKind) -> usize {
        self.records.iter().filter(|r| r.kind == kind).count()
    }

    #[must_use]
    pub fn explicit_count(&self) -> usize {
        self.records.iter().filter(|r| r.explicit).count()
    }

    /// True when the run produced neither successes nor failures.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.failures.is_empty()
    }

    /// Report for a single-item run: owner, title, sensitivity, destination,
    /// and an artifact count when one logical item produced several files.
    #[must_use]
    pub fn render_single(&self) -> String {
        let Some(first) = self.records.first() else {
            return "NO SUMMARY".to_string();
        };

        let mut lines = vec![BANNER.to_string()];
        lines.push(format!("Artist: {}", first.owner));
        if let Some(name) = first.path.file_name() {
            lines.push(format!("Title: {}", name.to_string_lossy()));
        }
        if first.explicit {
            lines.push("Explicit: True".to_string());
        }
        if self.records.len() > 1 {
            lines.push(format!("Total: {} pictures", self.records.len()));
        }
        if let Some(parent) = first.path.parent() {
            lines.push(format!("Stored in: {}", parent.display()));
        }
        lines.push(BANNER.to_string());
        lines.join("\n")
    }

    /// Report for a collection run: totals by kind, explicit count, and
    /// success/failure counts with a failure-log pointer only when failures
    /// occurred.
    #[must_use]
    pub fn render_artist(&self, fail_log: &Path) -> String {
        if self.is_empty() {
            return "NO SUMMARY".to_string();
        }

        let mut lines = vec![BANNER.to_string()];
        if let Some(owner) = self.owners.first() {
            lines.push(format!("Artist: {owner}"));
        }
        lines.push(format!("Total pics: {}", self.records.len()));
        for kind in ContentKind::ALL {
            lines.push(format!(
                "{}: {}",
                kind.as_str().to_uppercase(),
                self.count_kind(kind)
            ));
        }
        let explicit = self.explicit_count();
        if explicit > 0 {
            lines.push(format!("Explicit: {explicit}"));
        }
        if !self.failures.is_empty() {
            lines.push(format!("Success: {}", self.success.len()));
            lines.push(format!("Fail: {}", self.failures.len()));
            lines.push(format!("View {} for failures", fail_log.display()));
        }
        lines.push(BANNER.to_string());
        lines.join("\n")
    }
}

/// Overwrites the process-wide failure log with one `<link> <error>` line per
/// failure. Callers only invoke this when the failure list is non-empty.
pub fn write_failure_log(path: &Path, failures: &[(String, String)]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = failures
        .iter()
        .map(|(link, error)| format!("{link} {error}"))
        .collect::<Vec<_>>()
        .join("\n");
    fs::write(path, body)
}
