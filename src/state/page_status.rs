/// Page status definitions for tracking a scrape job
///
/// This module defines the lifecycle a page goes through while its job runs.
use serde::Serialize;
use std::fmt;

/// Represents the current status of a submitted page
///
/// ```text
/// queued ──▶ processing ──▶ done
///                 │
///                 └───────▶ failed
/// ```
///
/// `processing` may be re-entered from any status: a redelivered job attempt
/// starts over on the same page record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    /// Page was submitted and its job is waiting in the queue
    Queued,

    /// A worker is running the fetch/extract/dedupe pipeline
    Processing,

    /// Links were extracted and persisted
    Done,

    /// The last attempt failed; the error is recorded on the page
    Failed,
}

impl PageStatus {
    /// Returns true if this is a terminal status for the current attempt
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if the page is waiting for or undergoing an attempt
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Processing)
    }

    /// Returns true if a page in this status may move to `next`
    pub fn can_transition_to(&self, next: PageStatus) -> bool {
        match next {
            Self::Processing => true,
            Self::Done | Self::Failed => matches!(self, Self::Processing),
            Self::Queued => false,
        }
    }

    /// Statuses a page must be in before moving to `next`
    pub fn allowed_sources(next: PageStatus) -> &'static [PageStatus] {
        match next {
            Self::Processing => &[Self::Queued, Self::Processing, Self::Done, Self::Failed],
            Self::Done | Self::Failed => &[Self::Processing],
            Self::Queued => &[],
        }
    }

    /// Converts the page status to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Parses a page status from a database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible page statuses
    pub fn all_statuses() -> Vec<Self> {
        vec![Self::Queued, Self::Processing, Self::Done, Self::Failed]
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
