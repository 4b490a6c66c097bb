//! Incremental-update diffing between a fresh listing and the ledger.
//!
//! Two policies decide which subset of a freshly enumerated, newest-first item
//! list actually needs fetching:
//!
//! - **Lazy**: take the leading run of links not yet known, stopping at the
//!   first already-known link. Correct only because source listings are
//!   newest-first and monotonic; an upstream reorder could hide new items.
//!   That assumption is documented and preserved, not corrected.
//! - **Full**: order-preserving set difference, catching historical gaps
//!   regardless of position.

use std::collections::HashSet;

use thiserror::Error;

/// Errors from update-mode selection and diffing.
#[derive(Debug, Error)]
pub enum DiffError {
    /// First page produced no new links: the collection is fully up to date
    /// (or the listing order changed unexpectedly).
    #[error("everything up to date")]
    NothingToUpdate,

    /// `--update` and `--update-all` were both requested.
    #[error("--update / --update-all are mutually exclusive")]
    ExclusiveModes,
}

/// Which incremental policy a run uses. The two are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Stop at the first already-known link.
    Lazy,
    /// Fetch every link missing from the ledger.
    Full,
}

impl UpdateMode {
    /// Maps the CLI flag pair to a mode. Selecting both is a configuration
    /// error raised before any network activity.
    pub fn from_flags(update: bool, update_all: bool) -> Result<Option<Self>, DiffError> {
        match (update, update_all) {
            (true, true) => Err(DiffError::ExclusiveModes),
            (true, false) => Ok(Some(Self::Lazy)),
            (false, true) => Ok(Some(Self::Full)),
            (false, false) => Ok(None),
        }
    }
}

/// Longest prefix of `fresh` whose links are not in `known`.
///
/// `first_page` marks the very first page of an enumeration: an empty result
/// there is a hard error (nothing to update), while on later pages it is the
/// valid signal to stop paging.
pub fn lazy_updates(
    fresh: &[String],
    known: &[String],
    first_page: bool,
) -> Result<Vec<String>, DiffError> {
    let known: HashSet<&str> = known.iter().map(String::as_str).collect();
    let updates: Vec<String> = fresh
        .iter()
        .take_while(|link| !known.contains(link.as_str()))
        .cloned()
        .collect();

    if first_page && updates.is_empty() {
        return Err(DiffError::NothingToUpdate);
    }

    Ok(updates)
}

/// Set difference `fresh - known`, preserving `fresh`'s order.
///
/// An empty result at the end of a full enumeration means fully up to date;
/// the caller decides whether that is an error for its run.
#[must_use]
pub fn full_updates(fresh: &[String], known: &[String]) -> Vec<String> {
    let known: HashSet<&str> = known.iter().map(String::as_str).collect();
    fresh
        .iter()
        .filter(|link| !known.contains(link.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn links(ids: &[u64]) -> Vec<String> {
        ids.iter()
            .map(|id| format!("https://yande.re/post/show/{id}"))
            .collect()
    }

    #[test]
    fn test_lazy_takes_leading_run_of_new_links() {
        let fresh = links(&[7, 6, 5, 4, 3]);
        let known = links(&[5, 4, 3]);
        let updates = lazy_updates(&fresh, &known, true).unwrap();
        assert_eq!(updates, links(&[7, 6]));
    }

    #[test]
    fn test_lazy_first_page_all_known_is_error() {
        let fresh = links(&[5, 4, 3]);
        let known = links(&[5, 4, 3]);
        let err = lazy_updates(&fresh, &known, true).unwrap_err();
        assert!(matches!(err, DiffError::NothingToUpdate));
    }

    #[test]
    fn test_lazy_later_page_all_known_is_stop_signal() {
        let fresh = links(&[5, 4, 3]);
        let known = links(&[5, 4, 3]);
        let updates = lazy_updates(&fresh, &known, false).unwrap();
        assert!(updates.is_empty());
    }

    #[test]
    fn test_lazy_stops_at_first_known_even_with_later_gaps() {
        // Documented approximation: the listing is assumed strictly
        // newest-first, so a gap behind a known link is not picked up.
        let fresh = links(&[7, 5, 4, 3]);
        let known = links(&[5, 3]);
        let updates = lazy_updates(&fresh, &known, true).unwrap();
        assert_eq!(updates, links(&[7]));
    }

    #[test]
    fn test_full_diff_preserves_fresh_order() {
        let fresh = links(&[7, 6, 5, 4, 3, 2]);
        let known = links(&[5, 3]);
        let updates = full_updates(&fresh, &known);
        assert_eq!(updates, links(&[7, 6, 4, 2]));
    }

    #[test]
    fn test_full_diff_empty_when_up_to_date() {
        let fresh = links(&[5, 4]);
        let known = links(&[5, 4]);
        assert!(full_updates(&fresh, &known).is_empty());
    }

    #[test]
    fn test_full_diff_with_empty_known_returns_everything() {
        let fresh = links(&[3, 2, 1]);
        assert_eq!(full_updates(&fresh, &[]), fresh);
    }

    #[test]
    fn test_mode_flags_mutually_exclusive() {
        assert!(matches!(
            UpdateMode::from_flags(true, true),
            Err(DiffError::ExclusiveModes)
        ));
        assert_eq!(UpdateMode::from_flags(true, false).unwrap(), Some(UpdateMode::Lazy));
        assert_eq!(UpdateMode::from_flags(false, true).unwrap(), Some(UpdateMode::Full));
        assert_eq!(UpdateMode::from_flags(false, false).unwrap(), None);
    }
}
