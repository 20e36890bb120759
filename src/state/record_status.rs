/// Queue record status definitions
///
/// A record moves `ready -> doing -> (done | failed)` and never backwards,
/// except for the `doing -> ready` reset performed when a queue is resumed.
use std::fmt;

/// Represents the current status of a record in the crawler queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordStatus {
    // ===== Active States =====
    /// Record is waiting to be dequeued
    Ready,

    /// Record has been handed to a worker and counts against its group
    Doing,

    // ===== Terminal States =====
    /// Record was acknowledged after a successful crawl
    Done,

    /// Record was acknowledged after a failed crawl
    Failed,
}

impl RecordStatus {
    /// Returns true if this is a terminal status (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if the record still counts as pending work
    pub fn is_pending(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: RecordStatus) -> bool {
        matches!(
            (self, next),
            (Self::Ready, Self::Doing) | (Self::Doing, Self::Done) | (Self::Doing, Self::Failed)
        )
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Doing => "doing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "ready" => Some(Self::Ready),
            "doing" => Some(Self::Doing),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all statuses in lifecycle order
    pub fn all_statuses() -> [Self; 4] {
        [Self::Ready, Self::Doing, Self::Done, Self::Failed]
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
