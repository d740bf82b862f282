//! Human-readable job reports

use crate::scheduler::JobStatusView;
use std::fmt::Write;

/// Formats a job report
pub fn format_job_report(job: &JobStatusView) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "=== Crawl Job {} ===\n", job.id);
    let _ = writeln!(out, "Status: {}", job.status);
    let _ = writeln!(out, "Attempts: {}/{}", job.attempts_made, job.max_attempts);
    let _ = writeln!(out, "Submitted: {}", job.enqueued_at.to_rfc3339());
    if let Some(finished) = job.finished_at {
        let _ = writeln!(out, "Finished: {}", finished.to_rfc3339());
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Progress:");
    let _ = writeln!(out, "  Pages visited: {}", job.progress.pages_visited);
    let _ = writeln!(out, "  Products extracted: {}", job.progress.products_extracted);
    let _ = writeln!(out);

    if let Some(result) = &job.result {
        let meta = &result.metadata;
        let _ = writeln!(out, "Result:");
        let _ = writeln!(out, "  Processed items: {}", result.processed_items);
        let _ = writeln!(
            out,
            "  Listing pages: {}",
            meta.listing_pages
        );
        let _ = writeln!(
            out,
            "  Product pages: {} ({} missing fields)",
            meta.product_pages, meta.extraction_failures
        );
        let _ = writeln!(out, "  Failed page loads: {}", meta.page_failures
        );
        let _ = writeln!(out, "  Ignored links: {}", meta.ignored_links);
        let _ = writeln!(out, "  Duplicates suppressed: {}", meta.duplicates_suppressed);
        if meta.storage_failures > 0 {
            let _ = writeln!(out, "  Raw pages not stored: {}", meta.storage_failures);
        }
        if meta.budget_exhausted {
            let _ = writeln!(out, "  Page budget exhausted");
        }
        let _ = writeln!(out, "  Duration: {:.1}s", meta.duration_ms as f64 / 1000.0);
        let _ = writeln!(out);
    }

    if let Some(error) = &job.last_error {
        let _ = writeln!(out, "Last error:");
        let _ = writeln!(out, "  {}", error);
        if let Some(detail) = &error.detail {
            let _ = writeln!(out, "  Cause: {}", detail);
        }
        let _ = writeln!(out);
    }

    out
}

/// Prints a job report to stdout
pub fn print_job_report(job: &JobStatusView) {
    print!("{}", format_job_report(job));
}
