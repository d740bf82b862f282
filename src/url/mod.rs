//! URL handling module
//!
//! This module provides URL normalization, domain extraction, and the
//! listing/product classification that drives traversal.

mod domain;
mod normalize;

use regex::Regex;
use url::Url;

pub use domain::{domain_pattern_regex, extract_domain, registrable_domain};
pub use normalize::{normalize_against, normalize_url};

/// Classification of a URL relative to a crawl configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlClass {
    /// Listing page - paginate and collect links
    Listing,
    /// Product page - extract a record
    Product,
    /// Matches neither pattern set - never visited
    Ignored,
}

impl UrlClass {
    /// Returns true if the URL should be visited
    pub fn should_visit(&self) -> bool {
        !matches!(self, Self::Ignored)
    }
}

/// Listing and product pattern sets, as provided by a crawl configuration
#[derive(Debug, Clone, Copy)]
pub struct PatternSet<'a> {
    pub listing: &'a [String],
    pub product: &'a [String],
}

/// Compiled listing/product matchers
///
/// Each pattern string is compiled once. Patterns that are not URLs with a
/// host are dropped with a warning and never match.
#[derive(Debug, Clone)]
pub struct UrlClassifier {
    listing: Vec<Regex>,
    product: Vec<Regex>,
}

impl UrlClassifier {
    /// Compiles the given pattern sets
    pub fn new(patterns: PatternSet<'_>) -> Self {
        Self {
            listing: compile_patterns(patterns.listing, "listing"),
            product: compile_patterns(patterns.product, "product"),
        }
    }

    /// Classifies a raw URL, resolving it against `base` first
    ///
    /// Unparseable URLs are `Ignored`.
    pub fn classify(&self, url: &str, base: Option<&Url>) -> UrlClass {
        match normalize_against(url, base) {
            Ok(normalized) => self.classify_url(&normalized),
            Err(_) => UrlClass::Ignored,
        }
    }

    /// Classifies an already-normalized URL
    ///
    /// Listing patterns are checked first, so a URL matching both sets is a
    /// listing. When both sets share a registrable domain every URL on that
    /// domain classifies as a listing.
    pub fn classify_url(&self, url: &Url) -> UrlClass {
        let candidate = url.as_str();

        if self.listing.iter().any(|re| re.is_match(candidate)) {
            return UrlClass::Listing;
        }

        if self.product.iter().any(|re| re.is_match(candidate)) {
            return UrlClass::Product;
        }

        UrlClass::Ignored
    }
}

fn compile_patterns(patterns: &[String], kind: &str) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| {
            let compiled = domain_pattern_regex(pattern);
            if compiled.is_none() {
                tracing::warn!(pattern = %pattern, kind, "ignoring unusable URL pattern");
            }
            compiled
        })
        .collect()
}

/// Classifies a URL against listing and product patterns
///
/// Convenience wrapper that compiles the patterns on every call; sessions
/// hold a [`UrlClassifier`] instead.
///
/// # Examples
///
/// ```
/// use catalog_harvester::url::{classify, PatternSet, UrlClass};
///
/// let listing = vec!["https://www.example.com/category".to_string()];
/// let product = vec!["https://www.example-items.com/".to_string()];
/// let patterns = PatternSet { listing: &listing, product: &product };
///
/// assert_eq!(classify("https://shop.example.com/any", None, patterns), UrlClass::Listing);
/// assert_eq!(classify("https://www.example-items.com/p/1", None, patterns), UrlClass::Product);
/// assert_eq!(classify("https://example.org/any", None, patterns), UrlClass::Ignored);
/// ```
pub fn classify(url: &str, base: Option<&Url>, patterns: PatternSet<'_>) -> UrlClass {
    UrlClassifier::new(patterns).classify(url, base)
}
