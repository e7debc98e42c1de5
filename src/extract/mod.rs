//! Candidate image discovery for a single HTML document.
//!
//! [`scan_document`] runs every structural heuristic over the parsed page,
//! [`scan_stylesheet`] handles linked CSS and [`deep_scan`] is the fallback
//! used only when nothing else found a candidate. [`Extractor`] ties them
//! together and fetches stylesheets.

pub mod script;

use std::collections::BTreeSet;
use std::sync::LazyLock;

use futures::future::join_all;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

use crate::api::HttpClient;
use crate::utils::{is_image_url, resolve};

/// `src` plus the lazy-load aliases commonly found on `<img>`.
const IMG_ATTRS: &[&str] = &[
    "src",
    "data-src",
    "data-original",
    "data-lazyload",
    "data-lazy",
    "data-original-src",
    "data-source",
    "data-srcset",
    "srcset",
    "data-url",
    "data-img",
    "data-bg-src",
    "data-image",
];

const SRCSET_ATTRS: &[&str] = &["srcset", "data-srcset"];

/// Background-ish data attributes checked on every element.
const BACKGROUND_ATTRS: &[&str] = &[
    "data-background",
    "data-background-image",
    "data-bg",
    "data-bg-src",
    "data-original",
    "data-src",
    "data-url",
    "data-img",
];

const META_IMAGE_PROPERTIES: &[&str] = &["og:image", "twitter:image", "og:image:secure_url"];

static IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").expect("img selector"));
static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector"));
static STYLED: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[style]").expect("style selector"));
static ANY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("*").expect("any selector"));
static STYLESHEET: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"link[rel~="stylesheet"][href]"#).expect("stylesheet selector")
});
static META: LazyLock<Selector> = LazyLock::new(|| Selector::parse("meta").expect("meta selector"));
static SCRIPT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script").expect("script selector"));

static CSS_BACKGROUND_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)background(?:-image)?\s*:[^;{}]*?url\(\s*['"]?([^'")]+)['"]?\s*\)"#)
        .expect("background url pattern")
});

static ATTR_IMAGE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.(?:jpg|jpeg|png|gif|webp|bmp|svg)(?:\?|#|$)").expect("attr suffix pattern")
});

static TEXT_IMAGE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"((?:https?:)?//[^/\s'"]+/[^\s'"]+?\.(?:jpg|jpeg|png|gif|webp|bmp|svg)(?:\?[^'"\s]*)?)['"\s]"#,
    )
    .expect("text image url pattern")
});

/// Result of the structural pass over one document.
#[derive(Debug, Default)]
pub struct DocumentScan {
    pub candidates: BTreeSet<String>,
    /// Absolute URLs of linked stylesheets, not yet fetched.
    pub stylesheets: Vec<String>,
}

/// Accumulates resolved candidates for one page.
struct Collector<'a> {
    base_url: &'a str,
    found: BTreeSet<String>,
}

impl<'a> Collector<'a> {
    fn new(base_url: &'a str) -> Self {
        Self {
            base_url,
            found: BTreeSet::new(),
        }
    }

    /// Add a value from an attribute that is known to carry an image.
    fn add(&mut self, raw: &str) {
        if let Some(url) = resolve(raw, self.base_url) {
            self.found.insert(url);
        }
    }

    /// Add a value from a loosely-typed source; it must look like an image URL.
    fn add_if_image(&mut self, raw: &str) {
        if let Some(url) = resolve(raw, self.base_url) {
            if is_image_url(&url) {
                self.found.insert(url);
            }
        }
    }
}

/// Run the structural heuristics (img attributes, anchors, inline styles,
/// data attributes, meta tags, scripts) over a document.
pub fn scan_document(html: &str, page_url: &str) -> DocumentScan {
    let document = Html::parse_document(html);
    let mut collector = Collector::new(page_url);

    for img in document.select(&IMG) {
        for attr in IMG_ATTRS {
            let Some(value) = img.value().attr(attr) else {
                continue;
            };
            if SRCSET_ATTRS.contains(attr) {
                for entry in srcset_urls(value) {
                    collector.add(entry);
                }
            } else {
                collector.add(value);
            }
        }
    }

    for anchor in document.select(&ANCHOR) {
        if let Some(href) = anchor.value().attr("href") {
            if is_image_url(href) {
                collector.add(href);
            }
        }
    }

    for styled in document.select(&STYLED) {
        if let Some(style) = styled.value().attr("style") {
            for caps in CSS_BACKGROUND_URL.captures_iter(style) {
                collector.add(&caps[1]);
            }
        }
    }

    for element in document.select(&ANY) {
        for attr in BACKGROUND_ATTRS {
            if let Some(value) = element.value().attr(attr) {
                collector.add_if_image(value);
            }
        }
    }

    let stylesheets = document
        .select(&STYLESHEET)
        .filter_map(|link| link.value().attr("href"))
        .filter_map(|href| resolve(href, page_url))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    for meta in document.select(&META) {
        let key = meta
            .value()
            .attr("property")
            .or_else(|| meta.value().attr("name"))
            .map(str::trim);
        if key.is_some_and(|key| META_IMAGE_PROPERTIES.contains(&key)) {
            if let Some(content) = meta.value().attr("content") {
                collector.add(content);
            }
        }
    }

    for script in document.select(&SCRIPT) {
        if script.value().attr("src").is_some() {
            continue;
        }
        let body: String = script.text().collect();
        if body.trim().is_empty() {
            continue;
        }
        for reference in script::image_references(&body) {
            collector.add_if_image(&reference);
        }
    }

    DocumentScan {
        candidates: collector.found,
        stylesheets,
    }
}

/// Apply the background `url(...)` pattern to stylesheet text. Relative
/// references resolve against the stylesheet's own URL.
pub fn scan_stylesheet(css: &str, css_url: &str, out: &mut BTreeSet<String>) {
    let mut collector = Collector::new(css_url);
    for caps in CSS_BACKGROUND_URL.captures_iter(css) {
        collector.add(&caps[1]);
    }
    out.append(&mut collector.found);
}

/// Fallback search: any attribute value ending in an image extension, plus
/// absolute image URLs embedded anywhere in the raw text.
pub fn deep_scan(html: &str, page_url: &str) -> BTreeSet<String> {
    let document = Html::parse_document(html);
    let mut collector = Collector::new(page_url);

    for element in document.select(&ANY) {
        for (_, value) in element.value().attrs() {
            if ATTR_IMAGE_SUFFIX.is_match(&value.to_ascii_lowercase()) {
                collector.add_if_image(value);
            }
        }
    }

    for caps in TEXT_IMAGE_URL.captures_iter(html) {
        collector.add_if_image(&caps[1]);
    }

    collector.found
}

/// Extraction without network access: the structural pass, then the deep
/// scan if it found nothing. Linked stylesheets are not consulted.
pub fn extract_document(html: &str, page_url: &str) -> BTreeSet<String> {
    let scan = scan_document(html, page_url);
    if scan.candidates.is_empty() {
        return deep_scan(html, page_url);
    }
    scan.candidates
}

/// URL parts of a `srcset` value, size descriptors stripped.
///
/// A URL runs to the next whitespace, so commas inside it (as in `data:`
/// payloads) stay with their entry. Inline `data:` entries are skipped.
fn srcset_urls(value: &str) -> Vec<&str> {
    let mut urls = Vec::new();
    let mut rest = value;

    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
        if rest.is_empty() {
            break;
        }

        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let (token, tail) = rest.split_at(end);
        let url = token.trim_end_matches(',');

        // A trailing comma ends the entry; otherwise descriptors run to the next comma.
        rest = if url.len() < token.len() {
            tail
        } else {
            tail.find(',').map_or("", |i| &tail[i + 1..])
        };

        let inline_data = url
            .get(..5)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"));
        if !url.is_empty() && !inline_data {
            urls.push(url);
        }
    }

    urls
}

/// Full extractor: structural pass, linked stylesheets, then the fallback.
#[derive(Clone)]
pub struct Extractor {
    client: HttpClient,
}

impl Extractor {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    pub async fn extract(&self, html: &str, page_url: &str) -> BTreeSet<String> {
        let DocumentScan {
            mut candidates,
            stylesheets,
        } = scan_document(html, page_url);

        let fetches = stylesheets.iter().map(|css_url| async move {
            (css_url, self.client.fetch_stylesheet(css_url, page_url).await)
        });
        for (css_url, result) in join_all(fetches).await {
            match result {
                Ok(css) => scan_stylesheet(&css, css_url, &mut candidates),
                Err(err) => debug!(css_url = %css_url, %err, "skipping stylesheet"),
            }
        }

        if candidates.is_empty() {
            debug!(page_url, "no candidates from structural scan, running deep search");
            candidates = deep_scan(html, page_url);
        }

        debug!(page_url, count = candidates.len(), "extracted candidates");
        candidates
    }
}
