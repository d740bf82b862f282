//! Per-job crawl frontier
//!
//! A priority queue of URLs still to visit, plus the set of URLs ever
//! enqueued. Deduplication happens at enqueue time on the normalized form,
//! so a URL is visited at most once per job. Pagination continuations are
//! the one exception: they re-enter the queue for an already-seen listing
//! URL and jump ahead of discovered links.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use url::Url;

/// Priority for pagination continuations (lower is popped first)
pub const CONTINUATION_PRIORITY: u32 = 0;

/// Priority for seeds and discovered links
pub const DISCOVERED_PRIORITY: u32 = 10;

/// A URL waiting to be visited
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    /// The listing or product URL, normalized
    pub url: Url,

    /// 1 for fresh entries; the page to resume on for continuations
    pub page_number: u32,

    /// Priority value (lower is higher priority)
    pub priority: u32,

    /// Where the browser was after the last pagination click, if known
    pub location: Option<Url>,

    seq: u64,
}

impl FrontierEntry {
    /// Returns true if this entry resumes pagination of a listing
    pub fn is_continuation(&self) -> bool {
        self.page_number > 1
    }
}

// Lower priority values pop first; equal priorities pop in insertion order
impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for FrontierEntry {}

/// Queue of pending URLs with enqueue-time deduplication
#[derive(Debug, Default)]
pub struct Frontier {
    queue: BinaryHeap<FrontierEntry>,
    visited: HashSet<String>,
    next_seq: u64,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a normalized URL unless it was seen before
    ///
    /// # Returns
    ///
    /// `true` if the URL was queued, `false` if it was a duplicate
    pub fn enqueue(&mut self, url: Url) -> bool {
        if !self.visited.insert(url.as_str().to_string()) {
            return false;
        }
        self.push(url, 1, DISCOVERED_PRIORITY, None);
        true
    }

    /// Re-enqueues a listing to continue from `page_number`
    ///
    /// `location` is where the previous visit ended up after clicking next,
    /// normalized like every other enqueued URL. When pagination moved to a
    /// distinct URL, that URL is marked seen so a link to it elsewhere is not
    /// crawled again; a continuation to a URL that was already seen through
    /// some other path is dropped.
    ///
    /// # Returns
    ///
    /// `true` if the continuation was queued
    pub fn enqueue_continuation(&mut self, listing: Url, page_number: u32, location: Url) -> bool {
        if location != listing && !self.visited.insert(location.as_str().to_string()) {
            return false;
        }
        self.push(listing, page_number, CONTINUATION_PRIORITY, Some(location));
        true
    }

    fn push(&mut self, url: Url, page_number: u32, priority: u32, location: Option<Url>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(FrontierEntry {
            url,
            page_number,
            priority,
            location,
            seq,
        });
    }

    /// Removes the highest-priority entry
    pub fn pop(&mut self) -> Option<FrontierEntry> {
        self.queue.pop()
    }

    /// Entries still waiting
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Distinct URLs ever enqueued
    pub fn seen_count(&self) -> usize {
        self.visited.len()
    }
}
