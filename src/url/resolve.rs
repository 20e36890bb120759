use url::Url;

/// Resolves a discovered link against the URL of the page it came from
///
/// Returns `None` when the link should not be followed:
/// - empty or fragment-only hrefs
/// - `javascript:`, `mailto:`, `tel:` and `data:` links
/// - hrefs that cannot be joined onto `base`
/// - anything that is not HTTP(S) after resolution
///
/// Fragments are kept; stripping them is a normalization decision.
pub fn resolve_url(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let absolute = base.join(href).ok()?;

    match absolute.scheme() {
        "http" | "https" => Some(absolute.to_string()),
        _ => None,
    }
}
