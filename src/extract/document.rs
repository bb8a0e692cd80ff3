use crate::extract::{ExtractedRecord, ExtractionError, Extractor, FetchHandle, Page};
use crate::fetch::FetchResponse;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use url::Url;

/// Document kinds recognised by content type or file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Pdf,
    Csv,
    Spreadsheet,
}

impl DocumentKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Csv => "csv",
            Self::Spreadsheet => "spreadsheet",
        }
    }

    fn detect(url: &Url, response: &FetchResponse) -> Option<Self> {
        if let Some(content_type) = &response.content_type {
            let ct = content_type.to_ascii_lowercase();
            if ct.contains("application/pdf") {
                return Some(Self::Pdf);
            }
            if ct.contains("text/csv") {
                return Some(Self::Csv);
            }
            if ct.contains("spreadsheetml") || ct.contains("application/vnd.ms-excel") {
                return Some(Self::Spreadsheet);
            }
            if ct.contains("html") || ct.contains("json") {
                return None;
            }
        }

        let path = url.path().to_ascii_lowercase();
        if path.ends_with(".pdf") {
            Some(Self::Pdf)
        } else if path.ends_with(".csv") {
            Some(Self::Csv)
        } else if path.ends_with(".xlsx") || path.ends_with(".xls") {
            Some(Self::Spreadsheet)
        } else {
            None
        }
    }
}

/// Direct PDF, CSV and spreadsheet responses
///
/// Records the document's type and size. CSV files also get their header and
/// row count; nothing is read out of PDFs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentExtractor;

fn csv_summary(body: &str) -> Map<String, Value> {
    let mut lines = body.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<String> = lines
        .next()
        .map(|h| h.split(',').map(|c| c.trim().trim_matches('"').to_string()).collect())
        .unwrap_or_default();

    let mut summary = Map::new();
    summary.insert("columns".to_string(), json!(header));
    summary.insert("rows".to_string(), json!(lines.count()));
    summary
}

#[async_trait]
impl Extractor for DocumentExtractor {
    fn name(&self) -> &str {
        "document"
    }

    fn can_handle(&self, url: &Url, response: &FetchResponse) -> bool {
        DocumentKind::detect(url, response).is_some()
    }

    async fn extract(
        &self,
        page: &Page,
        _fetcher: &dyn FetchHandle,
    ) -> Result<ExtractedRecord, ExtractionError> {
        let kind = DocumentKind::detect(&page.url, &page.response).ok_or_else(|| {
            ExtractionError::Malformed {
                url: page.url.to_string(),
                reason: "not a recognised document".to_string(),
            }
        })?;

        if page.response.byte_len == 0 {
            return Err(ExtractionError::Malformed {
                url: page.url.to_string(),
                reason: "empty document".to_string(),
            });
        }

        let file_name = page
            .url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let mut content = Map::new();
        content.insert("kind".to_string(), json!(kind.as_str()));
        content.insert("content_type".to_string(), json!(page.response.content_type));
        content.insert("byte_len".to_string(), json!(page.response.byte_len));
        content.insert("file_name".to_string(), json!(file_name));
        if kind == DocumentKind::Csv {
            content.extend(csv_summary(&page.response.body));
        }

        Ok(ExtractedRecord::new("Documents", "document", Value::Object(content)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::test_support::CannedHandle;

    fn response(content_type: Option<&str>, body: &str, byte_len: usize) -> FetchResponse {
        FetchResponse {
            status: 200,
            final_url: String::new(),
            content_type: content_type.map(str::to_string),
            body: body.to_string(),
            byte_len,
            parsed: None,
        }
    }

    #[test]
    fn test_detect_by_content_type_and_extension() {
        let url = Url::parse("https://town.gov/download?id=4").unwrap();
        assert_eq!(
            DocumentKind::detect(&url, &response(Some("application/pdf"), "", 1)),
            Some(DocumentKind::Pdf)
        );

        let url = Url::parse("https://town.gov/files/commitment.XLSX").unwrap();
        assert_eq!(
            DocumentKind::detect(&url, &response(None, "", 1)),
            Some(DocumentKind::Spreadsheet)
        );

        // An HTML error page at a .pdf address is not a document
        let url = Url::parse("https://town.gov/files/map.pdf").unwrap();
        assert_eq!(DocumentKind::detect(&url, &response(Some("text/html"), "", 1)), None);
    }

    #[tokio::test]
    async fn test_csv_summary() {
        let body = "\"Parcel\",\"Owner\",\"Value\"\n101,SMITH,1000\n102,JONES,2000\n\n";
        let page = Page::new(
            Url::parse("https://town.gov/data/roll.csv").unwrap(),
            response(Some("text/csv"), body, body.len()),
        );

        let record = DocumentExtractor
            .extract(&page, &CannedHandle::default())
            .await
            .unwrap();

        let content = record.content();
        assert_eq!(content["kind"], "csv");
        assert_eq!(content["rows"], 2);
        assert_eq!(content["columns"][1], "Owner");
        assert_eq!(content["file_name"], "roll.csv");
    }

    #[tokio::test]
    async fn test_empty_document_is_malformed() {
        let page = Page::new(
            Url::parse("https://town.gov/maps/map_1.pdf").unwrap(),
            response(Some("application/pdf"), "", 0),
        );
        let err = DocumentExtractor
            .extract(&page, &CannedHandle::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Malformed { .. }));
    }
}
