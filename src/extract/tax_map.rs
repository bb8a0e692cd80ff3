use crate::extract::links::{page_text, page_title, resolve_link};
use crate::extract::{ExtractedRecord, ExtractionError, Extractor, FetchHandle, Page};
use crate::fetch::{FetchRequest, FetchResponse};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use url::Url;

/// Map kinds, matched with `_`, `-` and whitespace ignored
const MAP_PATTERNS: &[&str] = &["taxmap", "parcelmap", "propertymap", "assessormap", "lotmap"];

/// Labels that introduce an area description in page text
const AREA_LABELS: &[&str] = &["area", "district", "zone", "section", "located in", "location"];

/// Tax and parcel map pages
///
/// Emits one `tax_map` record per page and fetches at most one linked PDF
/// map sheet to record its size and content type.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaxMapExtractor;

/// Whether text names a kind of map
fn mentions_map(text: &str) -> bool {
    let squashed: String = text
        .chars()
        .filter(|c| !(c.is_whitespace() || *c == '_' || *c == '-'))
        .flat_map(char::to_lowercase)
        .collect();
    MAP_PATTERNS.iter().any(|p| squashed.contains(p))
}

/// Map number from the URL (`map12`, `map_12`, `map-12`) or from text such as
/// "Tax Map #12"
fn map_id(url: &Url, text: &str) -> String {
    let lower_url = url.as_str().to_ascii_lowercase();
    for (idx, _) in lower_url.match_indices("map") {
        let rest = &lower_url[idx + 3..];
        let rest = rest
            .strip_prefix(|c: char| c == '_' || c == '-')
            .unwrap_or(rest);
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        if !digits.is_empty() {
            return digits;
        }
    }

    let lower_text = text.to_ascii_lowercase();
    for (idx, _) in lower_text.match_indices("map") {
        let before = lower_text[..idx].trim_end();
        if !["tax", "parcel", "property"]
            .iter()
            .any(|kind| before.ends_with(kind))
        {
            continue;
        }
        let rest = lower_text[idx + 3..].trim_start();
        let rest = rest.strip_prefix('#').unwrap_or(rest).trim_start();
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        if !digits.is_empty() {
            return digits;
        }
    }

    let digest = hex::encode(Sha256::digest(url.as_str().as_bytes()));
    digest[..8].to_string()
}

/// Area description following a label like "District:" up to the next period
fn area(text: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    AREA_LABELS.iter().find_map(|label| {
        lower.match_indices(label).find_map(|(idx, _)| {
            let after = idx + label.len();
            let rest = lower[after..].trim_start();
            if !rest.starts_with(':') {
                return None;
            }
            // `lower` is an ASCII lowercase copy, so byte offsets line up with `text`
            let start = text.len() - rest.len() + 1;
            let value: String = text[start..].chars().take_while(|c| *c != '.').collect();
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        })
    })
}

struct MapPage {
    title: Option<String>,
    text: String,
    interactive: bool,
    downloadable: bool,
    searchable: bool,
    sheet: Option<Url>,
    related: Vec<String>,
}

fn parse_map_page(html: &str, url: &Url) -> MapPage {
    let document = Html::parse_document(html);
    let has = |css: &str| {
        Selector::parse(css)
            .map(|s| document.select(&s).next().is_some())
            .unwrap_or(false)
    };

    let mut sheet = None;
    let mut related = Vec::new();
    let mut downloadable = false;
    if let Ok(anchors) = Selector::parse("a[href]") {
        for element in document.select(&anchors) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Some(link) = resolve_link(href, url) else {
                continue;
            };
            let path = link.path().to_ascii_lowercase();
            if [".pdf", ".jpg", ".png"].iter().any(|ext| path.ends_with(ext)) {
                downloadable = true;
            }
            if sheet.is_none() && path.ends_with(".pdf") {
                sheet = Some(link.clone());
            }
            if mentions_map(link.as_str()) && link != *url {
                let link = link.to_string();
                if !related.contains(&link) {
                    related.push(link);
                }
            }
        }
    }

    MapPage {
        title: page_title(&document),
        text: page_text(&document),
        interactive: has("iframe") || has("canvas"),
        downloadable,
        searchable: has("form") || has("input"),
        sheet,
        related,
    }
}

fn is_map_page(url: &Url, response: &FetchResponse) -> bool {
    if mentions_map(url.as_str()) {
        return true;
    }
    let document = Html::parse_document(&response.body);
    page_title(&document)
        .map(|title| mentions_map(&title))
        .unwrap_or(false)
}

#[async_trait]
impl Extractor for TaxMapExtractor {
    fn name(&self) -> &str {
        "tax_map"
    }

    fn can_handle(&self, url: &Url, response: &FetchResponse) -> bool {
        response.is_html() && is_map_page(url, response)
    }

    async fn extract(
        &self,
        page: &Page,
        fetcher: &dyn FetchHandle,
    ) -> Result<ExtractedRecord, ExtractionError> {
        let parsed = parse_map_page(&page.response.body, &page.url);

        let sheet = match &parsed.sheet {
            Some(sheet_url) => match fetcher.fetch(&FetchRequest::get(sheet_url.clone())).await {
                Ok(response) => json!({
                    "url": sheet_url.as_str(),
                    "content_type": response.content_type,
                    "byte_len": response.byte_len,
                }),
                Err(err) => {
                    tracing::warn!("Could not fetch map sheet {}: {}", sheet_url, err);
                    json!({ "url": sheet_url.as_str(), "error": err.to_string() })
                }
            },
            None => Value::Null,
        };

        let content = json!({
            "map_id": map_id(&page.url, &parsed.text),
            "title": parsed.title,
            "area": area(&parsed.text),
            "features": {
                "interactive": parsed.interactive,
                "downloadable": parsed.downloadable,
                "searchable": parsed.searchable,
            },
            "related_maps": parsed.related,
            "sheet": sheet,
        });

        Ok(ExtractedRecord::new("TaxMaps", "tax_map", content))
    }
}
