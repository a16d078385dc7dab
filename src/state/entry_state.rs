/// Per-entry state definitions for the crawl state machine
///
/// Every `QueueEntry` a worker pops walks these states in order and ends in
/// exactly one of the two terminal states.
use std::fmt;

/// Represents where a popped queue entry is in its processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryState {
    // ===== Active States =====
    /// Entry was just taken off a frontier shard
    Dequeued,

    /// Entry is within the depth bound
    DepthChecked,

    /// Entry's URL was seen for the first time and recorded in history
    DedupChecked,

    /// robots.txt allows the URL (or robots checking is disabled)
    RobotsChecked,

    /// The page was fetched (GET) or checked (HEAD)
    Fetched,

    /// Child entries were built from the response
    LinksHarvested,

    // ===== Terminal States =====
    /// Children were enqueued and the caller's callback ran
    Dispatched,

    /// Processing stopped early; see [`DropReason`]
    Dropped,
}

impl EntryState {
    /// Returns true if no further processing happens from this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Dispatched | Self::Dropped)
    }

    /// Returns true if the state machine allows moving from `self` to `next`
    ///
    /// Each active state may advance to its successor or drop out early.
    pub fn can_transition_to(&self, next: EntryState) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == Self::Dropped {
            return true;
        }
        self.successor() == Some(next)
    }

    fn successor(&self) -> Option<Self> {
        match self {
            Self::Dequeued => Some(Self::DepthChecked),
            Self::DepthChecked => Some(Self::DedupChecked),
            Self::DedupChecked => Some(Self::RobotsChecked),
            Self::RobotsChecked => Some(Self::Fetched),
            Self::Fetched => Some(Self::LinksHarvested),
            Self::LinksHarvested => Some(Self::Dispatched),
            Self::Dispatched | Self::Dropped => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dequeued => "dequeued",
            Self::DepthChecked => "depth_checked",
            Self::DedupChecked => "dedup_checked",
            Self::RobotsChecked => "robots_checked",
            Self::Fetched => "fetched",
            Self::LinksHarvested => "links_harvested",
            Self::Dispatched => "dispatched",
            Self::Dropped => "dropped",
        }
    }
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why an entry ended in [`EntryState::Dropped`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DropReason {
    /// The entry's URL could not be canonicalized or is not http(s)
    InvalidUrl,
    /// `depth >= max_depth`
    DepthExceeded,
    /// The URL was already in history
    RepeatVisit,
    /// A history or queue store failed for this entry
    StoreUnavailable,
    /// robots.txt disallows the URL
    RobotsDenied,
    /// Neither `should_visit` nor `should_check` accepted the URL
    NotWanted,
    /// The page quota was exhausted before this entry could be fetched
    QuotaExhausted,
    /// The fetch failed at the transport level
    FetchFailed,
    /// A forced shutdown interrupted the entry
    Cancelled,
    /// A crawler callback panicked while the entry was being processed
    CallbackPanicked,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::DepthExceeded => "depth_exceeded",
            Self::RepeatVisit => "repeat_visit",
            Self::StoreUnavailable => "store_unavailable",
            Self::RobotsDenied => "robots_denied",
            Self::NotWanted => "not_wanted",
            Self::QuotaExhausted => "quota_exhausted",
            Self::FetchFailed => "fetch_failed",
            Self::Cancelled => "cancelled",
            Self::CallbackPanicked => "callback_panicked",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
