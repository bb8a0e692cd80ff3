use crate::extract::links::{element_text, page_title};
use crate::extract::{ExtractedRecord, ExtractionError, Extractor, FetchHandle, Page};
use crate::fetch::FetchResponse;
use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::OnceLock;
use url::Url;

/// Substrings identifying embedded map providers in iframe/script sources
const MAP_PROVIDERS: &[(&str, &str)] = &[
    ("arcgis", "arcgis"),
    ("google.com/maps", "google_maps"),
    ("maps.googleapis.com", "google_maps"),
    ("mapgeo", "mapgeo"),
    ("leaflet", "leaflet"),
    ("openstreetmap", "openstreetmap"),
    ("mappingsupport", "mappingsupport"),
];

/// Shapes of API paths referenced from inline scripts
const API_PATTERNS: &[&str] = &[r"api/[\w/]+", r"v\d+/[\w/]+", r"rest/[\w/]+", r"graphql"];

fn api_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        API_PATTERNS
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect()
    })
}

/// Generic detector for HTML pages carrying tables, forms or embedded maps
#[derive(Debug, Clone, Copy, Default)]
pub struct PageFeatureExtractor;

#[derive(Debug, Default)]
struct Features {
    title: Option<String>,
    tables: Vec<Value>,
    forms: Vec<Value>,
    map_providers: Vec<String>,
    api_endpoints: BTreeSet<String>,
}

impl Features {
    fn is_empty(&self) -> bool {
        self.tables.is_empty()
            && self.forms.is_empty()
            && self.map_providers.is_empty()
            && self.api_endpoints.is_empty()
    }
}

fn select_all<'a>(document: &'a Html, css: &str) -> Vec<scraper::ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

fn scan(html: &str) -> Features {
    let document = Html::parse_document(html);
    let mut features = Features {
        title: page_title(&document),
        ..Features::default()
    };

    let row_selector = Selector::parse("tr").ok();
    let header_selector = Selector::parse("th").ok();
    for table in select_all(&document, "table") {
        let rows = row_selector
            .as_ref()
            .map(|s| table.select(s).count())
            .unwrap_or(0);
        let headers: Vec<String> = header_selector
            .as_ref()
            .map(|s| table.select(s).map(|th| element_text(&th)).collect())
            .unwrap_or_default();
        features.tables.push(json!({ "rows": rows, "headers": headers }));
    }

    let field_selector = Selector::parse("input[name], select[name], textarea[name]").ok();
    for form in select_all(&document, "form") {
        let fields: Vec<&str> = field_selector
            .as_ref()
            .map(|s| {
                form.select(s)
                    .filter_map(|field| field.value().attr("name"))
                    .collect()
            })
            .unwrap_or_default();
        features.forms.push(json!({
            "action": form.value().attr("action"),
            "method": form.value().attr("method").unwrap_or("get").to_ascii_lowercase(),
            "fields": fields,
        }));
    }

    for embed in select_all(&document, "iframe[src], script[src]") {
        let Some(src) = embed.value().attr("src") else {
            continue;
        };
        let src = src.to_ascii_lowercase();
        for (needle, provider) in MAP_PROVIDERS {
            if src.contains(needle) && !features.map_providers.iter().any(|p| p == provider) {
                features.map_providers.push(provider.to_string());
            }
        }
    }

    for script in select_all(&document, "script") {
        let source: String = script.text().collect();
        for pattern in api_patterns() {
            features
                .api_endpoints
                .extend(pattern.find_iter(&source).map(|m| m.as_str().to_string()));
        }
    }

    features
}

#[async_trait]
impl Extractor for PageFeatureExtractor {
    fn name(&self) -> &str {
        "page_features"
    }

    fn can_handle(&self, _url: &Url, response: &FetchResponse) -> bool {
        response.is_html() && !scan(&response.body).is_empty()
    }

    async fn extract(
        &self,
        page: &Page,
        _fetcher: &dyn FetchHandle,
    ) -> Result<ExtractedRecord, ExtractionError> {
        let features = scan(&page.response.body);
        if features.is_empty() {
            return Err(ExtractionError::NoData {
                url: page.url.to_string(),
                extractor: self.name().to_string(),
            });
        }

        let content = json!({
            "title": features.title,
            "tables": features.tables,
            "forms": features.forms,
            "map_providers": features.map_providers,
            "api_endpoints": features.api_endpoints,
        });
        Ok(ExtractedRecord::new("PageFeatures", "page_features", content))
    }
}
