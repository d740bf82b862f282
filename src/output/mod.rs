//! Output module for job results and reports
//!
//! This module handles:
//! - Aggregating a session's records and counters into a job result
//! - Printing job reports for the command line

mod aggregator;
pub mod report;

pub use aggregator::{CrawlJobResult, ResultAggregator, ResultMetadata};
pub use report::print_job_report;
