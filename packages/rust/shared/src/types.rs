//! Core domain types for the gift-refresh pipeline.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SiteConfig;
use crate::error::RefreshError;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// PeriodKey
// ---------------------------------------------------------------------------

/// Year-month identifying which archive post is current, rendered `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeriodKey {
    year: i32,
    month: u32,
}

impl PeriodKey {
    /// Build a key, rejecting months outside 1..=12.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// The period containing `date`.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// English month name, e.g. `June`.
    pub fn month_name(&self) -> String {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .map(|d| d.format("%B").to_string())
            .unwrap_or_default()
    }
}

impl std::fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl std::str::FromStr for PeriodKey {
    type Err = RefreshError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bad = || RefreshError::parse(format!("invalid period key '{s}' (expected YYYY-MM)"));
        let (year, month) = s.split_once('-').ok_or_else(bad)?;
        let digits = |part: &str, len: usize| {
            part.len() == len && part.bytes().all(|b| b.is_ascii_digit())
        };
        if !digits(year, 4) || !digits(month, 2) {
            return Err(bad());
        }
        let year: i32 = year.parse().map_err(|_| bad())?;
        let month: u32 = month.parse().map_err(|_| bad())?;
        Self::new(year, month).ok_or_else(bad)
    }
}

impl Serialize for PeriodKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PeriodKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// PostKind
// ---------------------------------------------------------------------------

/// What a document in the post directory is, derived from its filename alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostKind {
    /// Hand-authored content page; eligible for refresh.
    Content,
    /// Generated archive post. `period` is set when the name carries a valid `YYYY-MM` stamp.
    Archive { period: Option<PeriodKey> },
    /// The fixed-name redirect to the latest archive post.
    StableRedirect,
}

/// Classify a post filename against the site layout.
pub fn classify_post(filename: &str, site: &SiteConfig) -> PostKind {
    if filename == site.stable_redirect {
        return PostKind::StableRedirect;
    }
    let Some(rest) = filename.strip_prefix(site.archive_prefix.as_str()) else {
        return PostKind::Content;
    };

    let period = rest
        .strip_suffix(site.extension.as_str())
        .and_then(|stem| stem.strip_suffix('.'))
        .and_then(|stamp| stamp.parse().ok());

    PostKind::Archive { period }
}
