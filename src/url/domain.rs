use url::Url;

/// Extracts the domain from a parsed URL
///
/// The host is lowercased. Returns `None` for URLs without a host
/// (`data:`, `file:` and friends).
///
/// # Examples
///
/// ```
/// use url::Url;
/// use ripple_crawl::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Extracts the domain from a raw URL string
///
/// Parse failures are swallowed: grouping and deduplication must keep
/// working on malformed input, so the caller simply gets `None`.
pub fn domain_of(url: &str) -> Option<String> {
    Url::parse(url).ok().as_ref().and_then(extract_domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_simple_domain() {
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_extract_subdomain_with_port() {
        let url = Url::parse("https://blog.example.com:8080/post").unwrap();
        assert_eq!(extract_domain(&url), Some("blog.example.com".to_string()));
    }

    #[test]
    fn test_extract_mixed_case() {
        let url = Url::parse("https://Example.COM/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_domain_of_string() {
        assert_eq!(
            domain_of("https://news.example.org/a?b=c"),
            Some("news.example.org".to_string())
        );
    }

    #[test]
    fn test_domain_of_malformed_is_none() {
        assert_eq!(domain_of("not a url"), None);
        assert_eq!(domain_of("/relative/path"), None);
        assert_eq!(domain_of(""), None);
    }

    #[test]
    fn test_domain_of_hostless_scheme() {
        assert_eq!(domain_of("data:text/plain,hello"), None);
    }
}
