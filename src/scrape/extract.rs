use crate::config::{ImageStrategy, UpgradeConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

static JSON_LD_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).unwrap()
});

static MARKUP_IMAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:https?:)?//[^\s"'<>()\\]+?\.(?:jpe?g|png|webp)(?:\?[^\s"'<>()\\]*)?"#)
        .unwrap()
});

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Image attributes in preference order. `data-old-hires` and
/// `data-a-dynamic-image` carry the full size rendition on marketplace pages.
const IMAGE_ATTRS: [&str; 6] = [
    "data-old-hires",
    "data-a-dynamic-image",
    "content",
    "data-src",
    "src",
    "href",
];

pub fn parse_selector(selector: &str) -> Result<Selector, String> {
    Selector::parse(selector).map_err(|e| format!("invalid selector {selector:?}: {e:?}"))
}

/// Text content with whitespace collapsed
pub fn element_text(element: ElementRef) -> String {
    let text = element.text().collect::<Vec<_>>().join(" ");
    WHITESPACE_RE.replace_all(text.trim(), " ").to_string()
}

/// Resolves `raw` against the page it was found on.
/// Returns None for empty and inline `data:` references.
pub fn resolve_url(raw: &str, base: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("data:") {
        return None;
    }

    if raw.starts_with("//") {
        return Some(format!("https:{raw}"));
    }

    if let Ok(url) = url::Url::parse(raw) {
        return match url.scheme() {
            "http" | "https" => Some(url.to_string()),
            _ => None,
        };
    }

    url::Url::parse(base)
        .and_then(|base| base.join(raw))
        .ok()
        .map(|url| url.to_string())
}

#[derive(Clone, Debug)]
pub struct UpgradeRule {
    pattern: Regex,
    replacement: String,
}

impl UpgradeRule {
    pub fn compile(config: &UpgradeConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(&config.pattern)?,
            replacement: config.replacement.clone(),
        })
    }

    pub fn apply(&self, url: &str) -> String {
        self.pattern
            .replace_all(url, self.replacement.as_str())
            .to_string()
    }
}

pub fn apply_upgrades(rules: &[UpgradeRule], url: &str) -> String {
    rules
        .iter()
        .fold(url.to_string(), |url, rule| rule.apply(&url))
}

/// Image references from embedded JSON-LD blocks, document order.
pub fn image_from_json_ld(document: &Html) -> Vec<String> {
    let mut images = vec![];
    for element in document.select(&JSON_LD_SELECTOR) {
        let json_text = element.text().collect::<String>();
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&json_text) {
            collect_json_ld_images(&json, &mut images);
        }
    }
    images
}

fn collect_json_ld_images(json: &serde_json::Value, images: &mut Vec<String>) {
    // Handle @graph arrays
    if let Some(graph) = json.get("@graph").and_then(|g| g.as_array()) {
        for item in graph {
            collect_json_ld_images(item, images);
        }
        return;
    }
    // Handle top-level arrays
    if let Some(arr) = json.as_array() {
        for item in arr {
            collect_json_ld_images(item, images);
        }
        return;
    }

    for key in ["image", "thumbnailUrl"] {
        let Some(img) = json.get(key) else {
            continue;
        };

        if let Some(url_str) = img.as_str() {
            images.push(url_str.to_string());
        } else if let Some(url_str) = img
            .get("url")
            .or_else(|| img.get("contentUrl"))
            .and_then(|v| v.as_str())
        {
            images.push(url_str.to_string());
        } else if let Some(arr) = img.as_array() {
            for item in arr {
                if let Some(url_str) = item.as_str() {
                    images.push(url_str.to_string());
                } else if let Some(url_str) = item.get("url").and_then(|v| v.as_str()) {
                    images.push(url_str.to_string());
                }
            }
        }
    }

    // editions of a Book
    if let Some(work) = json.get("workExample") {
        collect_json_ld_images(work, images);
    }
}

/// Reads the best image reference off an element.
pub fn image_from_element(element: ElementRef) -> Option<String> {
    for attr in IMAGE_ATTRS {
        let Some(value) = element.attr(attr) else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() || value.starts_with("data:") {
            continue;
        }

        if attr == "data-a-dynamic-image" {
            if let Some(url) = largest_dynamic_image(value) {
                return Some(url);
            }
            continue;
        }

        return Some(value.to_string());
    }

    element.attr("srcset").and_then(largest_srcset_entry)
}

/// `{"url": [width, height], ...}`
fn largest_dynamic_image(value: &str) -> Option<String> {
    let map = serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(value).ok()?;
    map.into_iter()
        .map(|(url, size)| {
            let dims = size
                .as_array()
                .map(|dims| {
                    dims.iter()
                        .filter_map(|d| d.as_u64())
                        .product::<u64>()
                })
                .unwrap_or_default();
            (url, dims)
        })
        .max_by_key(|(_, area)| *area)
        .map(|(url, _)| url)
}

/// Last entry of a srcset, which is conventionally the largest
fn largest_srcset_entry(srcset: &str) -> Option<String> {
    srcset
        .split(',')
        .filter_map(|entry| entry.split_whitespace().next())
        .filter(|url| !url.is_empty() && !url.starts_with("data:"))
        .last()
        .map(str::to_string)
}

pub fn image_from_selectors(document: &Html, selectors: &[Selector]) -> Vec<String> {
    let mut images = vec![];
    for selector in selectors {
        for element in document.select(selector) {
            if let Some(url) = image_from_element(element) {
                images.push(url);
            }
        }
    }
    images
}

/// Regex scan of raw markup. With `hints`, only urls containing one of
/// them are kept.
pub fn image_from_markup(html: &str, hints: &[String]) -> Vec<String> {
    MARKUP_IMAGE_RE
        .find_iter(html)
        .map(|m| m.as_str().to_string())
        .filter(|url| hints.is_empty() || hints.iter().any(|h| url.contains(h.as_str())))
        .collect()
}

/// All image references on a page, strategy order first, then document
/// order, resolved against `page_url` and deduplicated.
pub fn find_images(
    html: &str,
    page_url: &str,
    strategies: &[ImageStrategy],
    selectors: &[Selector],
    hints: &[String],
) -> Vec<String> {
    let document = Html::parse_document(html);

    let mut images: Vec<String> = vec![];
    for strategy in strategies {
        let found = match strategy {
            ImageStrategy::JsonLd => image_from_json_ld(&document),
            ImageStrategy::Selectors => image_from_selectors(&document, selectors),
            ImageStrategy::MarkupScan => image_from_markup(html, hints),
        };

        for raw in found {
            if let Some(url) = resolve_url(&raw, page_url) {
                if !images.contains(&url) {
                    images.push(url);
                }
            }
        }
    }

    images
}
