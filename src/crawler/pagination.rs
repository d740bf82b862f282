//! Pagination of a listing within one page context

use crate::crawler::driver::{DriverResult, Page};
use crate::state::PaginationState;
use std::time::Duration;

/// Selectors and limits used for one advance
#[derive(Debug, Clone, Copy)]
pub struct AdvanceStep<'a> {
    /// The "next page" control
    pub next_selector: &'a str,
    /// Must be present after the click for the advance to count
    pub card_selector: &'a str,
    /// Consent overlays to dismiss before clicking
    pub consent_selectors: &'a [String],
    pub timeout: Duration,
}

/// Drives `OnPage(n) -> Advancing(n) -> OnPage(n + 1) | Exhausted`
#[derive(Debug)]
pub struct PaginationController {
    state: PaginationState,
    max_pages: u32,
}

impl PaginationController {
    /// Starts on page 1
    pub fn new(max_pages: u32) -> Self {
        Self::resume(1, max_pages)
    }

    /// Picks up on an already-reached page
    pub fn resume(page: u32, max_pages: u32) -> Self {
        Self {
            state: PaginationState::OnPage(page.max(1)),
            max_pages,
        }
    }

    pub fn state(&self) -> PaginationState {
        self.state
    }

    /// Tries to move to the next page
    ///
    /// Never fails: a missing next control, the page budget, or any error
    /// along the way settles pagination as `Exhausted`.
    pub async fn advance(&mut self, page: &mut dyn Page, step: AdvanceStep<'_>) -> PaginationState {
        let current = match self.state {
            PaginationState::OnPage(n) => n,
            other => return other,
        };

        if !self.state.may_advance(self.max_pages) {
            tracing::debug!(page = current, max_pages = self.max_pages, "pagination reached page budget");
            self.state = PaginationState::Exhausted;
            return self.state;
        }

        match page.exists(step.next_selector).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(page = current, "no next-page control; pagination done");
                self.state = PaginationState::Exhausted;
                return self.state;
            }
            Err(e) => {
                tracing::warn!(page = current, error = %e, "could not look for next-page control");
                self.state = PaginationState::Exhausted;
                return self.state;
            }
        }

        self.state = PaginationState::Advancing(current);
        let clicked = click_next(page, step).await;
        if let Err(e) = &clicked {
            tracing::warn!(page = current, error = %e, "pagination click failed");
        }

        self.state = self.state.after_advance(clicked.is_ok());
        self.state
    }

    /// Re-applies pagination clicks to reach `target` on a freshly loaded
    /// listing whose pages share one URL
    ///
    /// # Returns
    ///
    /// `true` if the target page was reached
    pub async fn replay_to(&mut self, page: &mut dyn Page, target: u32, step: AdvanceStep<'_>) -> bool {
        self.state = PaginationState::OnPage(1);
        while let PaginationState::OnPage(n) = self.state {
            if n >= target {
                return true;
            }
            // replay is bounded by the target, not the budget
            let budget = self.max_pages;
            self.max_pages = target;
            self.advance(page, step).await;
            self.max_pages = budget;
        }
        false
    }
}

/// Dismisses the first consent overlay found
///
/// Failures are ignored; returns true if an overlay was clicked away.
pub async fn dismiss_consent(page: &mut dyn Page, selectors: &[String]) -> bool {
    for selector in selectors {
        if !matches!(page.exists(selector).await, Ok(true)) {
            continue;
        }
        match page.click(selector).await {
            Ok(()) => {
                tracing::debug!(selector = %selector, "dismissed consent overlay");
                return true;
            }
            Err(e) => tracing::debug!(selector = %selector, error = %e, "consent overlay did not dismiss"),
        }
    }
    false
}

async fn click_next(page: &mut dyn Page, step: AdvanceStep<'_>) -> DriverResult<()> {
    dismiss_consent(page, step.consent_selectors).await;
    page.click(step.next_selector).await?;
    page.wait_for(step.card_selector, step.timeout).await
}
