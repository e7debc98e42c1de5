use url::Url;

pub const IMAGE_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp", ".svg", ".ico", ".tiff",
];

const IMAGE_PATH_KEYWORDS: &[&str] = &["image", "img", "photo", "picture"];

const REJECTED_SCHEMES: &[&str] = &["data:", "javascript:", "about:"];

/// Resolve a raw attribute value against the page it was found on.
///
/// Absolute URLs are returned as-is, protocol-relative ones inherit the page
/// scheme, root-relative ones join the page origin and everything else goes
/// through standard relative resolution. `data:`, `javascript:` and `about:`
/// values resolve to `None`, as does a relative value with an unusable base.
pub fn resolve(raw: &str, page_url: &str) -> Option<String> {
    let raw = normalize_raw(raw)?;
    if is_rejected_scheme(&raw) {
        return None;
    }

    let resolved = match Url::parse(&raw) {
        Ok(absolute) if matches!(absolute.scheme(), "http" | "https") => raw,
        // Opaque schemes like `mailto:` or `tel:` never name a fetchable image.
        Ok(_) => return None,
        Err(_) => {
            let page = Url::parse(page_url.trim()).ok()?;
            if raw.starts_with("//") {
                format!("{}:{}", page.scheme(), raw)
            } else if raw.starts_with('/') && page.origin().is_tuple() {
                format!("{}{}", page.origin().ascii_serialization(), raw)
            } else {
                page.join(&raw).ok()?.to_string()
            }
        }
    };

    if is_rejected_scheme(&resolved) {
        return None;
    }
    Some(resolved)
}

/// Heuristic check that a URL points at an image: a known extension at the
/// end of the path, an image-ish keyword in the path, or a bare extension in
/// the query string.
pub fn is_image_url(url: &str) -> bool {
    let (path, query) = split_path_and_query(url);
    let path = path.to_ascii_lowercase();

    if IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return true;
    }

    if IMAGE_PATH_KEYWORDS.iter().any(|word| path.contains(word)) {
        return true;
    }

    let query = query.to_ascii_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .any(|ext| query.contains(ext.trim_start_matches('.')))
}

/// Trim, then percent-encode inner spaces and turn backslashes into slashes.
fn normalize_raw(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut out = String::with_capacity(trimmed.len());
    for ch in trimmed.chars() {
        match ch {
            '\\' => out.push('/'),
            c if c.is_whitespace() => out.push_str("%20"),
            c => out.push(c),
        }
    }
    Some(out)
}

fn is_rejected_scheme(value: &str) -> bool {
    let lower = value.trim_start().to_ascii_lowercase();
    REJECTED_SCHEMES.iter().any(|scheme| lower.starts_with(scheme))
}

/// Path and query of a URL, tolerating values that do not parse.
fn split_path_and_query(url: &str) -> (String, String) {
    if let Ok(parsed) = Url::parse(url) {
        return (
            parsed.path().to_string(),
            parsed.query().unwrap_or_default().to_string(),
        );
    }

    let without_fragment = url.split('#').next().unwrap_or_default();
    let (before_query, query) = match without_fragment.split_once('?') {
        Some((head, query)) => (head, query),
        None => (without_fragment, ""),
    };
    let path = match before_query.split_once("//") {
        Some((_, rest)) => rest.find('/').map_or("", |idx| &rest[idx..]),
        None => before_query,
    };
    (path.to_string(), query.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_root_relative_against_origin() {
        assert_eq!(
            resolve("/a/b.png", "http://x.com/p/q").as_deref(),
            Some("http://x.com/a/b.png")
        );
    }

    #[test]
    fn resolves_protocol_relative_with_page_scheme() {
        assert_eq!(
            resolve("//cdn.x.com/i.jpg", "https://x.com/p").as_deref(),
            Some("https://cdn.x.com/i.jpg")
        );
    }

    #[test]
    fn resolves_relative_path_segments() {
        assert_eq!(
            resolve("../c.jpg", "http://x.com/a/b/").as_deref(),
            Some("http://x.com/a/c.jpg")
        );
        assert_eq!(
            resolve("b.png", "http://e.com/").as_deref(),
            Some("http://e.com/b.png")
        );
    }

    #[test]
    fn keeps_absolute_urls_unchanged() {
        assert_eq!(
            resolve("https://img.x.com/a.JPG?x=1", "http://e.com/").as_deref(),
            Some("https://img.x.com/a.JPG?x=1")
        );
    }

    #[test]
    fn root_relative_keeps_non_default_port() {
        assert_eq!(
            resolve("/i.png", "http://127.0.0.1:8080/page").as_deref(),
            Some("http://127.0.0.1:8080/i.png")
        );
    }

    #[test]
    fn normalizes_whitespace_and_backslashes() {
        assert_eq!(
            resolve("  img\\my pic.png ", "http://e.com/dir/").as_deref(),
            Some("http://e.com/dir/img/my%20pic.png")
        );
    }

    #[test]
    fn rejects_data_javascript_and_about() {
        assert_eq!(resolve("data:image/png;base64,AAAA", "http://e.com/"), None);
        assert_eq!(resolve("JavaScript:void(0)", "http://e.com/"), None);
        assert_eq!(resolve("  about:blank", "http://e.com/"), None);
        assert_eq!(resolve("mailto:a@b.c", "http://e.com/"), None);
        assert_eq!(resolve("", "http://e.com/"), None);
    }

    #[test]
    fn relative_without_usable_base_is_none() {
        assert_eq!(resolve("a.png", "not a url"), None);
        assert_eq!(
            resolve("http://x.com/a.png", "not a url").as_deref(),
            Some("http://x.com/a.png")
        );
    }

    #[test]
    fn image_url_by_extension_keyword_or_query() {
        assert!(is_image_url("http://x.com/a/b.JPEG"));
        assert!(is_image_url("http://x.com/static/images/banner"));
        assert!(is_image_url("http://x.com/get?file=cat.png"));
        assert!(is_image_url("/relative/photo-123"));
        assert!(!is_image_url("http://x.com/about/contact.html"));
        assert!(!is_image_url("http://x.com/download?id=7"));
    }
}
