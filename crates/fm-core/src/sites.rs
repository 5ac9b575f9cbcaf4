//! Page URL helpers and the site allow-list gate
//!
//! Host extraction works on string slices and never allocates; the
//! allow-list check lowercases the host once.

// =============================================================================
// Host Extraction
// =============================================================================

/// Position just past `scheme://`, or `None` for URLs without an authority.
#[inline]
fn authority_start(url: &str) -> Option<usize> {
    let colon = url.find(':')?;
    let scheme = &url[..colon];
    if scheme.is_empty()
        || !scheme
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'-' || b == b'.')
    {
        return None;
    }
    url[colon..].starts_with("://").then_some(colon + 3)
}

/// Start and end byte positions of the hostname in an absolute URL.
#[inline]
pub fn host_span(url: &str) -> Option<(usize, usize)> {
    let start = authority_start(url)?;
    let bytes = url.as_bytes();

    let authority_end = bytes[start..]
        .iter()
        .position(|&b| matches!(b, b'/' | b'?' | b'#'))
        .map_or(bytes.len(), |i| start + i);

    // Drop userinfo
    let host_start = bytes[start..authority_end]
        .iter()
        .rposition(|&b| b == b'@')
        .map_or(start, |i| start + i + 1);

    // Drop port (IPv6 literals keep their brackets and inner colons)
    let host_end = if bytes.get(host_start) == Some(&b'[') {
        bytes[host_start..authority_end]
            .iter()
            .position(|&b| b == b']')
            .map_or(authority_end, |i| host_start + i + 1)
    } else {
        bytes[host_start..authority_end]
            .iter()
            .position(|&b| b == b':')
            .map_or(authority_end, |i| host_start + i)
    };

    (host_end > host_start).then_some((host_start, host_end))
}

/// Hostname of an absolute URL, borrowed from the input.
#[inline]
pub fn extract_host(url: &str) -> Option<&str> {
    let (start, end) = host_span(url)?;
    Some(&url[start..end])
}

// =============================================================================
// Allow-list
// =============================================================================

/// Whether the page at `url` is eligible for filtering.
///
/// The host must contain one of the allow-list entries as a substring
/// (`youtube.com` admits `www.youtube.com` and `m.youtube.com`). Blank
/// entries never match.
pub fn is_site_allowed<S: AsRef<str>>(url: &str, allowed_sites: &[S]) -> bool {
    let host = match extract_host(url) {
        Some(host) => host.to_ascii_lowercase(),
        None => return false,
    };

    allowed_sites.iter().any(|site| {
        let site = site.as_ref().trim();
        !site.is_empty() && host.contains(&site.to_ascii_lowercase())
    })
}
