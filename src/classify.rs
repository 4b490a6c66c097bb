//! Link classification registry.
//!
//! Maps input links to a `(Source, LinkKind)` pair through an ordered list of
//! regex patterns per source and kind. The first matching pattern wins and its
//! captured identifier is returned. The same table drives CLI help text
//! ([`pattern_help`]) and the ledger's numeric sort key ([`sort_key`]), so new
//! sources only touch this table, never the dispatch logic.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Closed set of supported content sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Source {
    Yande,
    Pixiv,
}

impl Source {
    /// All registered sources, in registry order.
    pub const ALL: [Source; 2] = [Source::Yande, Source::Pixiv];

    /// Stable key used in ledger maps and log output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yande => "yande",
            Self::Pixiv => "pixiv",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a link points at one item or a whole collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    /// One fetchable item (a single post/artwork page).
    Single,
    /// An artist's collection listing.
    Artist,
}

impl LinkKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Artist => "artist",
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by the strict classification path.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// The link does not belong to the requested source/kind.
    // The field is named `src` rather than `source` because thiserror treats a
    // field named `source` as the error cause, which would require
    // `Source: std::error::Error`.
    #[error("invalid link {link} {src} {kind}")]
    NoMatch {
        link: String,
        src: Source,
        kind: LinkKind,
    },
}

/// One registry row: the ordered patterns for a `(source, kind)` pair.
struct PatternSet {
    source: Source,
    kind: LinkKind,
    patterns: Vec<Regex>,
}

#[allow(clippy::expect_used)]
fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("registry pattern is valid"))
        .collect()
}

/// Static registry of link patterns. Each pattern captures the item or
/// collection identifier in group 1. Order within a set is significant:
/// the first match wins.
static REGISTRY: LazyLock<Vec<PatternSet>> = LazyLock::new(|| {
    vec![
        PatternSet {
            source: Source::Yande,
            kind: LinkKind::Single,
            patterns: compile(&[r"^https://yande\.re/post/show/(\d+)$"]),
        },
        PatternSet {
            source: Source::Yande,
            kind: LinkKind::Artist,
            patterns: compile(&[r"^https://yande\.re/post\?tags=(.+)$"]),
        },
        PatternSet {
            source: Source::Pixiv,
            kind: LinkKind::Single,
            patterns: compile(&[r"^https://www\.pixiv\.net/en/artworks/(\d+)$"]),
        },
        PatternSet {
            source: Source::Pixiv,
            kind: LinkKind::Artist,
            patterns: compile(&[
                r"^https://www\.pixiv\.net/en/users/(\d+)/?$",
                r"^https://www\.pixiv\.net/en/users/(\d+)/artworks.*$",
                r"^https://www\.pixiv\.net/en/users/(\d+)/illustrations.*$",
                r"^https://www\.pixiv\.net/en/users/(\d+)/bookmarks.*$",
            ]),
        },
    ]
});

fn pattern_set(source: Source, kind: LinkKind) -> &'static PatternSet {
    // The registry covers every (source, kind) pair by construction.
    REGISTRY
        .iter()
        .find(|set| set.source == source && set.kind == kind)
        .unwrap_or_else(|| unreachable!("registry covers all source/kind pairs"))
}

/// Non-raising classification: returns the captured identifier when `link`
/// matches any registered pattern for `(source, kind)`, `None` otherwise.
#[must_use]
pub fn matches(link: &str, source: Source, kind: LinkKind) -> Option<String> {
    pattern_set(source, kind)
        .patterns
        .iter()
        .find_map(|re| re.captures(link))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Boolean form of [`matches`]. Reports absence rather than erroring.
#[must_use]
pub fn is_valid(link: &str, source: Source, kind: LinkKind) -> bool {
    matches(link, source, kind).is_some()
}

/// Strict classification used by concrete fetchers: errors when the link does
/// not belong to the requested source/kind.
pub fn extract(link: &str, source: Source, kind: LinkKind) -> Result<String, ClassifyError> {
    matches(link, source, kind).ok_or_else(|| ClassifyError::NoMatch {
        link: link.to_string(),
        src: source,
        kind,
    })
}

/// Returns which source's single-item patterns match `link`, if any.
///
/// The ledger uses this to pick the map key an item link is filed under.
#[must_use]
pub fn item_source(link: &str) -> Option<Source> {
    Source::ALL
        .into_iter()
        .find(|&source| is_valid(link, source, LinkKind::Single))
}

/// Extracts the numeric id embedded in a single-item link.
///
/// Ledger ordering sorts by this key, descending, so the persisted item list
/// always reads newest first regardless of insertion order.
#[must_use]
pub fn sort_key(source: Source, link: &str) -> Option<u64> {
    matches(link, source, LinkKind::Single).and_then(|id| id.parse().ok())
}

/// Renders the full pattern registry as CLI help text.
#[must_use]
pub fn pattern_help() -> String {
    let mut out = String::new();
    for set in REGISTRY.iter() {
        out.push_str(&format!("{} {}:\n", set.source, set.kind));
        for re in &set.patterns {
            out.push_str(&format!(" - {}\n", re.as_str()));
        }
    }
    out
}
