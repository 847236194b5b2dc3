use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque continuation bag threaded verbatim between `handle*` and the next
/// `prepare*` of the same listing. Always a flat string map.
pub type Extra = HashMap<String, String>;

/// The (page, extra) pair for one listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationState {
    pub page: u32,
    pub extra: Extra,
}

impl Default for ContinuationState {
    fn default() -> Self {
        Self {
            page: 1,
            extra: Extra::new(),
        }
    }
}

impl ContinuationState {
    /// Restore the initial state: `page = 1`, empty extra.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Lifecycle of one listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingPhase {
    Idle,
    Fetching,
    Parsed,
    Complete,
}

/// Continuation cursor for a single listing.
///
/// `Idle → Fetching → Parsed(canLoadMore) → Idle | Complete`; `Complete` is
/// terminal until an explicit [`ListingCursor::reset`].
#[derive(Debug, Clone)]
pub struct ListingCursor {
    state: ContinuationState,
    phase: ListingPhase,
}

impl Default for ListingCursor {
    fn default() -> Self {
        Self {
            state: ContinuationState::default(),
            phase: ListingPhase::Idle,
        }
    }
}

impl ListingCursor {
    pub fn state(&self) -> &ContinuationState {
        &self.state
    }

    pub fn phase(&self) -> ListingPhase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase == ListingPhase::Complete
    }

    /// Whether another page can be requested right now.
    pub fn can_fetch(&self) -> bool {
        matches!(self.phase, ListingPhase::Idle | ListingPhase::Parsed)
    }

    /// Mark the listing in-flight and return the state the `prepare*` call
    /// must observe.
    pub fn begin_fetch(&mut self) -> ContinuationState {
        if self.can_fetch() {
            self.phase = ListingPhase::Fetching;
        }
        self.state.clone()
    }

    /// Apply the continuation fields of a successful `handle*` result.
    ///
    /// `next_page` overrides the naive increment (cursor-style sources);
    /// `next_extra` replaces the bag verbatim, and an absent bag keeps the
    /// previous one so threading survives sources that only emit it once.
    pub fn advance(&mut self, can_load_more: bool, next_page: Option<u32>, next_extra: Option<Extra>) {
        if self.phase == ListingPhase::Complete {
            return;
        }

        if can_load_more {
            self.state.page = next_page.unwrap_or(self.state.page + 1);
            if let Some(extra) = next_extra {
                self.state.extra = extra;
            }
            self.phase = ListingPhase::Parsed;
        } else {
            self.phase = ListingPhase::Complete;
        }
    }

    /// Roll an in-flight fetch back without advancing; used when the parse
    /// fails or a challenge is detected.
    pub fn abort(&mut self) {
        if self.phase == ListingPhase::Fetching {
            self.phase = ListingPhase::Idle;
        }
    }

    /// Explicit reset: `page = 1`, empty extra, regardless of prior state.
    pub fn reset(&mut self) {
        self.state.reset();
        self.phase = ListingPhase::Idle;
    }
}
