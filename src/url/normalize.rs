use crate::UrlError;
use url::Url;

/// Query parameters that never change the resource being addressed
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid", "igshid", "yclid"];

/// Builds the deduplication key of a URL
///
/// The key is only ever used for membership checks in a URL cache; the job
/// that gets queued keeps the URL exactly as it was discovered.
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not HTTP(S)
/// 2. Lowercase the host and drop a leading `www.`
/// 3. Drop the default port (done by `Url::parse` itself)
/// 4. Remove dot segments, duplicate slashes and the trailing slash
/// 5. Drop the fragment
/// 6. Drop `utm_*` and other tracking parameters
/// 7. Sort the remaining query parameters by key, then value
///
/// # Examples
///
/// ```
/// use ripple_crawl::url::normalize_url;
///
/// let key = normalize_url("https://WWW.Example.com/a/./b/?z=1&a=2#top").unwrap();
/// assert_eq!(key, "https://example.com/a/b?a=2&z=1");
/// ```
pub fn normalize_url(url_str: &str) -> Result<String, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    let host = url.host_str().ok_or(UrlError::MissingDomain)?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    let path = normalize_path(url.path());
    url.set_path(&path);

    url.set_fragment(None);

    if url.query().is_some() {
        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !is_tracking_param(key))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        params.sort();

        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url.to_string())
}

fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    format!("/{}", segments.join("/"))
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_is_kept() {
        assert_eq!(
            normalize_url("http://example.com/page").unwrap(),
            "http://example.com/page"
        );
    }

    #[test]
    fn test_remove_www_and_lowercase_host() {
        assert_eq!(
            normalize_url("https://WWW.EXAMPLE.COM/Page").unwrap(),
            "https://example.com/Page"
        );
    }

    #[test]
    fn test_trailing_slash_and_root() {
        assert_eq!(
            normalize_url("https://example.com/page/").unwrap(),
            "https://example.com/page"
        );
        assert_eq!(
            normalize_url("https://example.com").unwrap(),
            "https://example.com/"
        );
    }

    #[test]
    fn test_dot_segments_and_slashes() {
        assert_eq!(
            normalize_url("https://example.com//a/../b/./c").unwrap(),
            "https://example.com/b/c"
        );
    }

    #[test]
    fn test_fragment_removed() {
        assert_eq!(
            normalize_url("https://example.com/page#section").unwrap(),
            "https://example.com/page"
        );
    }

    #[test]
    fn test_query_sorted_and_tracking_dropped() {
        assert_eq!(
            normalize_url("https://example.com/p?b=2&utm_source=x&a=1&fbclid=y").unwrap(),
            "https://example.com/p?a=1&b=2"
        );
        assert_eq!(
            normalize_url("https://example.com/p?utm_medium=mail").unwrap(),
            "https://example.com/p"
        );
    }

    #[test]
    fn test_default_port_dropped() {
        assert_eq!(
            normalize_url("https://example.com:443/x").unwrap(),
            "https://example.com/x"
        );
        assert_eq!(
            normalize_url("https://example.com:8443/x").unwrap(),
            "https://example.com:8443/x"
        );
    }

    #[test]
    fn test_equivalent_urls_share_a_key() {
        let a = normalize_url("https://www.example.com/a/?y=2&x=1#frag").unwrap();
        let b = normalize_url("https://example.com/a?x=1&y=2").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_scheme() {
        let result = normalize_url("ftp://example.com/page");
        assert!(matches!(result, Err(UrlError::InvalidScheme(_))));
    }

    #[test]
    fn test_malformed_url() {
        assert!(matches!(normalize_url("not a url"), Err(UrlError::Parse(_))));
    }
}
