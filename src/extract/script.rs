//! Best-effort image discovery inside inline `<script>` bodies.
//!
//! Nothing here returns an error: a script that does not yield URLs simply
//! contributes nothing.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::trace;

const IMAGE_KEYS: &[&str] = &["url", "src", "image", "img", "source"];

static KEYED_IMAGE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(?:src|url|image|img|source)(?:["']|\s*:\s*["']\s*)([^"']+\.(?:jpg|jpeg|png|gif|webp|bmp|svg))"#,
    )
    .expect("keyed image path pattern")
});

static LOOSE_OBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{[^{]*"(?:url|src|image|img|source)"[^}]*\}"#).expect("loose object pattern")
});

static BARE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([{,])\s*(\w+)\s*:").expect("bare key pattern"));

/// Raw (unresolved) image references found in a script body.
pub fn image_references(script: &str) -> Vec<String> {
    let mut refs: Vec<String> = KEYED_IMAGE_PATH
        .captures_iter(script)
        .map(|caps| caps[1].to_string())
        .collect();

    for object in LOOSE_OBJECT.find_iter(script) {
        if let Some(map) = parse_loose_object(object.as_str()) {
            refs.extend(
                IMAGE_KEYS
                    .iter()
                    .filter_map(|key| map.get(*key).and_then(Value::as_str))
                    .map(str::to_string),
            );
        }
    }

    refs
}

/// Parse a JavaScript object literal as JSON after quoting bare keys, falling
/// back to swapping single quotes for double quotes.
fn parse_loose_object(text: &str) -> Option<Map<String, Value>> {
    let quoted = BARE_KEY.replace_all(text, r#"$1"$2":"#);
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&quoted) {
        return Some(map);
    }

    let requoted = quoted.replace('\'', "\"");
    match serde_json::from_str::<Value>(&requoted) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => None,
        Err(err) => {
            trace!(%err, "ignoring unparseable script object");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_keyed_paths_with_image_extensions() {
        let script = r#"var cfg = { thumb: 'x', image: "/media/hero.webp", src: '/a/b.PNG' };"#;
        let refs = image_references(script);
        assert!(refs.contains(&"/media/hero.webp".to_string()));
        assert!(refs.contains(&"/a/b.PNG".to_string()));
    }

    #[test]
    fn parses_objects_with_bare_keys() {
        let script = r#"gallery.push({id: 3, "url": "https://cdn.e.com/photos/3"});"#;
        let refs = image_references(script);
        assert_eq!(refs, vec!["https://cdn.e.com/photos/3".to_string()]);
    }

    #[test]
    fn single_quoted_objects_use_fallback_path() {
        let script = r#"load({'img': 'pics/cat', "source": 'x'})"#;
        let refs = image_references(script);
        assert!(refs.contains(&"pics/cat".to_string()));
    }

    #[test]
    fn broken_objects_are_ignored() {
        let script = r#"weird({"src": ,,, })"#;
        assert!(image_references(script).is_empty());
    }
}
