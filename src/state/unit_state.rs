/// Unit state definitions for tracking crawl progress
///
/// A fetch unit moves `Unseen -> (StoreHit | InFlight) -> (StoredSuccess | StoredError)`.
/// Gap recovery re-opens a unit by constructing it as `Unseen` again; no other
/// backwards transition exists.
use crate::HarvestError;
use std::fmt;

/// Represents the current state of a fetch unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitState {
    // ===== Active States =====
    /// Unit has been scheduled but not yet resolved
    Unseen,

    /// Unit is waiting on the downloader
    InFlight,

    // ===== Terminal States =====
    /// Unit was already persisted; resolved without a network call
    StoreHit,

    /// Unit was fetched and its content written
    StoredSuccess,

    /// Unit failed and the error was written in place of content
    StoredError,
}

impl UnitState {
    /// Returns true if this represents a failed fetch
    pub fn is_error(&self) -> bool {
        matches!(self, Self::StoredError)
    }

    /// Returns true if the transition `self -> to` is legal
    pub fn can_transition_to(&self, to: UnitState) -> bool {
        matches!(
            (self, to),
            (Self::Unseen, Self::StoreHit)
                | (Self::Unseen, Self::InFlight)
                | (Self::InFlight, Self::StoredSuccess)
                | (Self::InFlight, Self::StoredError)
        )
    }

    /// Moves to `to`, rejecting illegal transitions
    pub fn transition(self, to: UnitState) -> Result<UnitState, HarvestError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(HarvestError::InvalidTransition { from: self, to })
        }
    }

    /// Short lowercase label used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unseen => "unseen",
            Self::InFlight => "in_flight",
            Self::StoreHit => "store_hit",
            Self::StoredSuccess => "stored_success",
            Self::StoredError => "stored_error",
        }
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
