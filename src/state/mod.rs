//! State module for tracking job and traversal progress
//!
//! # Components
//!
//! - `JobStatus`: Lifecycle of a queued crawl job (pending, active, completed, failed)
//! - `PaginationState`: Where a listing page's pagination stands

mod job_status;
mod pagination_state;

// Re-export main types
pub use job_status::JobStatus;
pub use pagination_state::PaginationState;
