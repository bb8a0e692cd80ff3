use crate::extract::links::element_text;
use crate::extract::{ExtractedRecord, ExtractionError, Extractor, FetchHandle, Page};
use crate::fetch::FetchResponse;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Map, Value};
use url::Url;

/// Assessor vendors and the source names their records carry
const VENDORS: &[(&str, &str)] = &[
    ("vgsi.com", "VGSI"),
    ("patriotproperties.com", "PatriotProperties"),
    ("municipalonlinepayments.com", "MunicipalOnlinePayments"),
];

/// Sections of a VGSI parcel page, by container id
const SECTIONS: &[(&str, &str)] = &[
    ("parcel", "div#MainContent_lblGeneral"),
    ("assessment", "div#MainContent_lblAssess"),
];

/// Vendor assessor pages laid out as `DataletLabel`/`DataletData` table rows
#[derive(Debug, Clone, Copy, Default)]
pub struct AssessorExtractor;

fn vendor_for(url: &Url) -> Option<&'static str> {
    let host = url.host_str()?.to_ascii_lowercase();
    VENDORS
        .iter()
        .find(|(domain, _)| host == *domain || host.ends_with(&format!(".{}", domain)))
        .map(|(_, source)| *source)
}

/// Label/value pairs from every row under `scope` that has both cells
fn datalet_rows(scope: ElementRef<'_>, row: &Selector, label: &Selector, data: &Selector) -> Map<String, Value> {
    let mut fields = Map::new();
    for tr in scope.select(row) {
        let (Some(label_cell), Some(data_cell)) = (tr.select(label).next(), tr.select(data).next())
        else {
            continue;
        };
        let key = element_text(&label_cell)
            .trim_end_matches(':')
            .trim()
            .to_lowercase()
            .replace(' ', "_");
        if key.is_empty() {
            continue;
        }
        fields.insert(key, Value::String(element_text(&data_cell)));
    }
    fields
}

fn selector(css: &str, url: &Url) -> Result<Selector, ExtractionError> {
    Selector::parse(css).map_err(|e| ExtractionError::Malformed {
        url: url.to_string(),
        reason: format!("bad selector {}: {}", css, e),
    })
}

/// Parses the assessor tables into the record content
fn parse_assessor_page(html: &str, url: &Url) -> Result<Value, ExtractionError> {
    let document = Html::parse_document(html);
    let row = selector("tr", url)?;
    let label = selector("td.DataletLabel", url)?;
    let data = selector("td.DataletData", url)?;

    let mut content = Map::new();
    for (name, css) in SECTIONS {
        let section = selector(css, url)?;
        if let Some(container) = document.select(&section).next() {
            let fields = datalet_rows(container, &row, &label, &data);
            if !fields.is_empty() {
                content.insert(name.to_string(), Value::Object(fields));
            }
        }
    }

    let fields = datalet_rows(document.root_element(), &row, &label, &data);
    if fields.is_empty() {
        return Err(ExtractionError::NoData {
            url: url.to_string(),
            extractor: "assessor".to_string(),
        });
    }
    content.insert("fields".to_string(), Value::Object(fields));

    Ok(Value::Object(content))
}

#[async_trait]
impl Extractor for AssessorExtractor {
    fn name(&self) -> &str {
        "assessor"
    }

    fn can_handle(&self, url: &Url, response: &FetchResponse) -> bool {
        response.is_html() && vendor_for(url).is_some()
    }

    async fn extract(
        &self,
        page: &Page,
        _fetcher: &dyn FetchHandle,
    ) -> Result<ExtractedRecord, ExtractionError> {
        let source = vendor_for(&page.url).unwrap_or("Assessor");
        let content = parse_assessor_page(&page.response.body, &page.url)?;

        let pid = page
            .url
            .query_pairs()
            .find(|(k, _)| k.eq_ignore_ascii_case("pid"))
            .map(|(_, v)| v.into_owned());

        let mut record = ExtractedRecord::new(source, "property_assessment", content);
        if let Some(pid) = pid {
            record = record.with_metadata("pid", json!(pid));
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::test_support::{page, CannedHandle};

    const PARCEL_PAGE: &str = r#"
        <html><body>
          <div id="MainContent_lblGeneral">
            <table>
              <tr><td class="DataletLabel">Location</td><td class="DataletData">12 MAIN ST</td></tr>
              <tr><td class="DataletLabel">Owner:</td><td class="DataletData">SMITH  JOHN</td></tr>
            </table>
          </div>
          <div id="MainContent_lblAssess">
            <table>
              <tr><td class="DataletLabel">Total Value</td><td class="DataletData">$245,300</td></tr>
              <tr><td>Unlabelled</td></tr>
            </table>
          </div>
        </body></html>
    "#;

    #[test]
    fn test_can_handle_vendor_hosts() {
        let extractor = AssessorExtractor;
        let html = crate::extract::test_support::html_response("", "");
        for url in [
            "https://gis.vgsi.com/brunswickme/Parcel.aspx?pid=1",
            "https://www.patriotproperties.com/topsham",
            "https://bath.municipalonlinepayments.com/assessor",
        ] {
            assert!(extractor.can_handle(&Url::parse(url).unwrap(), &html), "{}", url);
        }
        assert!(!extractor.can_handle(&Url::parse("https://notvgsi.com.example.org/").unwrap(), &html));
        assert!(!extractor.can_handle(&Url::parse("https://brunswick.gov/").unwrap(), &html));
    }

    #[tokio::test]
    async fn test_extracts_sections() {
        let page = page("https://gis.vgsi.com/brunswickme/Parcel.aspx?pid=1042", PARCEL_PAGE);
        let record = AssessorExtractor
            .extract(&page, &CannedHandle::default())
            .await
            .unwrap();

        assert_eq!(record.source_name(), "VGSI");
        assert_eq!(record.record_type(), "property_assessment");
        let content = record.content();
        assert_eq!(content["parcel"]["location"], "12 MAIN ST");
        assert_eq!(content["parcel"]["owner"], "SMITH JOHN");
        assert_eq!(content["assessment"]["total_value"], "$245,300");
        assert_eq!(content["fields"].as_object().unwrap().len(), 3);
        assert_eq!(record.metadata()["pid"], "1042");
    }

    #[tokio::test]
    async fn test_page_without_rows_is_no_data() {
        let page = page("https://gis.vgsi.com/brunswickme/Search.aspx", "<html><body>Search</body></html>");
        let err = AssessorExtractor
            .extract(&page, &CannedHandle::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::NoData { .. }));
    }
}
