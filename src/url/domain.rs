use regex::Regex;
use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use catalog_harvester::url::extract_domain;
///
/// let url = Url::parse("https://Shop.EXAMPLE.com:8080/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("shop.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Strips the leftmost label from a hostname
///
/// `www.shop.example.com` becomes `shop.example.com`. A single-label host
/// such as `localhost` has nothing to strip and is returned unchanged.
pub fn registrable_domain(host: &str) -> &str {
    match host.split_once('.') {
        Some((_, rest)) if !rest.is_empty() => rest,
        _ => host,
    }
}

/// Builds the matcher for a listing or product pattern
///
/// The pattern's hostname is reduced to its registrable domain and matched
/// case-insensitively as `^https?://<any label>.<registrable domain>`. Only
/// the start is anchored, so paths and ports after the domain are free.
///
/// A single-label host yields a regex matching only that bare host, since
/// there is no subdomain to wildcard.
///
/// # Returns
///
/// * `Some(Regex)` - The compiled matcher
/// * `None` - The pattern is not a URL with a host
pub fn domain_pattern_regex(pattern: &str) -> Option<Regex> {
    let url = Url::parse(pattern.trim()).ok()?;
    let host = url.host_str()?.to_lowercase();
    if host.is_empty() {
        return None;
    }

    let registrable = registrable_domain(&host);
    let source = if registrable == host {
        format!(r"(?i)^https?://{}(?:[:/?#]|$)", regex::escape(registrable))
    } else {
        format!(r"(?i)^https?://[^.]+\.{}", regex::escape(registrable))
    };

    Regex::new(&source).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_with_port() {
        let url = Url::parse("https://example.com:8080/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_registrable_domain_strips_first_label() {
        assert_eq!(registrable_domain("www.example.com"), "example.com");
        assert_eq!(registrable_domain("a.b.example.com"), "b.example.com");
        assert_eq!(registrable_domain("localhost"), "localhost");
    }

    #[test]
    fn test_pattern_matches_any_subdomain() {
        let re = domain_pattern_regex("https://www.example.com/category").unwrap();
        assert!(re.is_match("https://shop.example.com/any"));
        assert!(re.is_match("http://www.example.com/p/1"));
        assert!(re.is_match("HTTPS://WWW.EXAMPLE.COM/"));
    }

    #[test]
    fn test_pattern_rejects_other_domains() {
        let re = domain_pattern_regex("https://www.example.com/category").unwrap();
        assert!(!re.is_match("https://example.org/any"));
        assert!(!re.is_match("https://www.other.com/"));
        // a bare registrable domain has no label to match the wildcard
        assert!(!re.is_match("https://example.com/"));
    }

    #[test]
    fn test_pattern_with_port_matches_ported_urls() {
        let re = domain_pattern_regex("http://www.shop.test:4000/list").unwrap();
        assert!(re.is_match("http://www.shop.test:4000/p/1"));
    }

    #[test]
    fn test_single_label_host_matches_bare_host_only() {
        let re = domain_pattern_regex("http://localhost:3000/").unwrap();
        assert!(re.is_match("http://localhost:3000/p/1"));
        assert!(re.is_match("http://localhost/"));
        assert!(!re.is_match("http://www.localhost/"));
        assert!(!re.is_match("http://localhostile.com/"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(domain_pattern_regex("not a url").is_none());
        assert!(domain_pattern_regex("mailto:someone@example.com").is_none());
    }
}
