/// Pagination state for a single listing page context
use std::fmt;

/// Where a listing's pagination currently stands
///
/// Transitions are `OnPage(n) -> Advancing(n) -> OnPage(n + 1)` on a
/// successful click, and anything `-> Exhausted` when there is no next
/// control, the page budget is reached, or an advance fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationState {
    /// Showing page `n` (1-based)
    OnPage(u32),

    /// Clicking away from page `n`
    Advancing(u32),

    /// No further pages will be visited
    Exhausted,
}

impl PaginationState {
    /// Returns true once pagination has stopped
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted)
    }

    /// Returns the current page number, if still paginating
    pub fn page(&self) -> Option<u32> {
        match self {
            Self::OnPage(n) | Self::Advancing(n) => Some(*n),
            Self::Exhausted => None,
        }
    }

    /// Returns true if another advance may be attempted under `max_pages`
    pub fn may_advance(&self, max_pages: u32) -> bool {
        match self {
            Self::OnPage(n) => *n < max_pages,
            _ => false,
        }
    }

    /// State after an advance attempt from this state
    pub fn after_advance(&self, succeeded: bool) -> Self {
        match (self, succeeded) {
            (Self::OnPage(n) | Self::Advancing(n), true) => Self::OnPage(n + 1),
            _ => Self::Exhausted,
        }
    }
}

impl fmt::Display for PaginationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnPage(n) => write!(f, "page {}", n),
            Self::Advancing(n) => write!(f, "advancing from page {}", n),
            Self::Exhausted => write!(f, "exhausted"),
        }
    }
}
