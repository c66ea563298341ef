use crate::error::ExtractionError;
use crate::models::PageRecord;
use base64::{engine::general_purpose::STANDARD, Engine};
use lopdf::Document;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::runtime::RuntimeFlavor;

/// Turns one PDF into its ordered page records.
pub trait PdfExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<PageRecord>, ExtractionError>;
}

impl<T: PdfExtractor + ?Sized> PdfExtractor for Box<T> {
    fn extract(&self, path: &Path) -> Result<Vec<PageRecord>, ExtractionError> {
        (**self).extract(path)
    }
}

fn page_record(path: &Path, page_number: u32, text: String, extractor: &str) -> PageRecord {
    let mut record = PageRecord::new(
        path.to_string_lossy().to_string(),
        page_number.saturating_sub(1),
        text,
    );
    record
        .extra_metadata
        .insert("page_number".to_string(), page_number.to_string());
    record
        .extra_metadata
        .insert("extractor".to_string(), extractor.to_string());
    record
}

/// Text-layer extraction.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<PageRecord>, ExtractionError> {
        let document =
            Document::load(path).map_err(|error| ExtractionError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| ExtractionError::PdfParse(error.to_string()))?;

            if !text.trim().is_empty() {
                pages.push(page_record(path, page_no, text, "lopdf"));
            }
        }

        if pages.is_empty() {
            return Err(ExtractionError::PdfParse(format!(
                "pdf had no readable page text: {}",
                path.display()
            )));
        }

        Ok(pages)
    }
}

#[derive(Debug, Clone, Serialize)]
struct LlmOcrRequest {
    pdf_base64: String,
    source_path: String,
}

#[derive(Debug, Clone, Deserialize)]
struct LlmOcrResponse {
    pages: Option<Vec<LlmOcrPage>>,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct LlmOcrPage {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OcrEndpointConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl OcrEndpointConfig {
    /// `None` when no endpoint is configured.
    pub fn from_parts(endpoint: Option<String>, api_key: Option<String>) -> Option<Self> {
        let endpoint = endpoint?.trim().to_string();
        if endpoint.is_empty() {
            return None;
        }
        let api_key = api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        Some(Self { endpoint, api_key })
    }
}

/// Sends the whole PDF to a multimodal OCR service.
#[derive(Debug, Clone)]
pub struct OcrEndpointExtractor {
    config: OcrEndpointConfig,
}

impl OcrEndpointExtractor {
    pub fn new(config: OcrEndpointConfig) -> Self {
        Self { config }
    }

    fn extract_blocking(&self, path: &Path) -> Result<Vec<PageRecord>, ExtractionError> {
        let pdf = std::fs::read(path)?;
        let payload = LlmOcrRequest {
            pdf_base64: STANDARD.encode(pdf),
            source_path: path.to_string_lossy().to_string(),
        };

        let mut request = Client::new()
            .post(&self.config.endpoint)
            .header("content-type", "application/json")
            .json(&payload);

        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send()?;

        if !response.status().is_success() {
            return Err(ExtractionError::OcrFailed(format!(
                "multimodal OCR request to {} returned {}",
                self.config.endpoint,
                response.status()
            )));
        }

        let payload: LlmOcrResponse = response.json()?;
        payload_to_pages(&payload, path)
    }
}

impl PdfExtractor for OcrEndpointExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<PageRecord>, ExtractionError> {
        run_blocking(|| self.extract_blocking(path))
    }
}

/// Runs blocking extraction work without stalling an async worker. A
/// multi-thread runtime hands the worker over with `block_in_place`; any other
/// runtime gets a scoped OS thread, since blocking I/O must not run on it.
pub fn run_blocking<T, F>(work: F) -> Result<T, ExtractionError>
where
    F: FnOnce() -> Result<T, ExtractionError> + Send,
    T: Send,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(work)
        }
        Ok(_) => std::thread::scope(|scope| scope.spawn(work).join())
            .map_err(|_| ExtractionError::WorkerPanicked)?,
        Err(_) => work(),
    }
}

fn payload_to_pages(payload: &LlmOcrResponse, path: &Path) -> Result<Vec<PageRecord>, ExtractionError> {
    if let Some(listed) = &payload.pages {
        let listed = listed
            .iter()
            .filter_map(|page| {
                let text = page.text.as_ref().map(|value| value.trim().to_string());
                text.and_then(|normalized| {
                    if normalized.is_empty() {
                        None
                    } else {
                        let page_number = page.page.unwrap_or(1);
                        Some(page_record(path, page_number, normalized, "ocr"))
                    }
                })
            })
            .collect::<Vec<_>>();

        if !listed.is_empty() {
            return Ok(listed);
        }
    }

    if let Some(raw_text) = &payload.text {
        let pages = raw_text
            .split('\u{000c}')
            .enumerate()
            .filter_map(|(index, chunk)| {
                let normalized = chunk.trim().to_string();
                if normalized.is_empty() {
                    None
                } else {
                    Some(page_record(path, (index + 1) as u32, normalized, "ocr"))
                }
            })
            .collect::<Vec<_>>();

        if !pages.is_empty() {
            return Ok(pages);
        }
    }

    Err(ExtractionError::OcrFailed(format!(
        "multimodal OCR response was empty for {}",
        path.display()
    )))
}

/// Tries `primary` and only consults `secondary` when the primary cannot parse
/// the file.
#[derive(Debug, Clone)]
pub struct FallbackExtractor<P, S> {
    primary: P,
    secondary: S,
}

impl<P, S> FallbackExtractor<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }
}

impl<P: PdfExtractor, S: PdfExtractor> PdfExtractor for FallbackExtractor<P, S> {
    fn extract(&self, path: &Path) -> Result<Vec<PageRecord>, ExtractionError> {
        match self.primary.extract(path) {
            Ok(pages) => Ok(pages),
            Err(ExtractionError::PdfParse(parse_error)) => match self.secondary.extract(path) {
                Ok(pages) => Ok(pages),
                Err(fallback_error) => Err(ExtractionError::PdfParse(format!(
                    "{parse_error}; fallback extraction failed: {fallback_error}"
                ))),
            },
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn ocr_payload_with_pages_converts_only_nonempty_text() {
        let response = LlmOcrResponse {
            pages: Some(vec![
                LlmOcrPage {
                    page: Some(2),
                    text: Some("  ".to_string()),
                },
                LlmOcrPage {
                    page: Some(3),
                    text: Some("Page 3".to_string()),
                },
            ]),
            text: None,
        };

        let pages = payload_to_pages(&response, Path::new("x.pdf"))
            .expect("multimodal response should be parsed");

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page_index, 2);
        assert_eq!(pages[0].content, "Page 3");
        assert_eq!(pages[0].extra_metadata.get("page_number").map(String::as_str), Some("3"));
    }

    #[test]
    fn ocr_payload_fallback_text_split_by_form_feed() {
        let response = LlmOcrResponse {
            pages: None,
            text: Some("First\u{000C}Second\n".to_string()),
        };

        let pages = payload_to_pages(&response, Path::new("x.pdf"))
            .expect("multimodal response should be parsed");

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_index, 0);
        assert_eq!(pages[0].content, "First");
        assert_eq!(pages[1].page_index, 1);
        assert_eq!(pages[1].content, "Second");
        assert_eq!(pages[1].source, "x.pdf");
    }

    #[test]
    fn empty_ocr_payload_is_an_error() {
        let response = LlmOcrResponse {
            pages: Some(Vec::new()),
            text: Some("\u{000C}".to_string()),
        };
        assert!(matches!(
            payload_to_pages(&response, Path::new("x.pdf")),
            Err(ExtractionError::OcrFailed(_))
        ));
    }

    #[test]
    fn broken_pdf_is_a_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"%PDF-1.4\n%broken")?;

        assert!(matches!(
            LopdfExtractor.extract(&path),
            Err(ExtractionError::PdfParse(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_ocr_on_current_thread_runtime_is_an_error(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("scan.pdf");
        fs::write(&path, b"%PDF-1.4\n%scanned")?;

        let ocr = OcrEndpointConfig::from_parts(Some("http://127.0.0.1:9/ocr".to_string()), None)
            .ok_or("endpoint should be accepted")?;
        let extractor = FallbackExtractor::new(LopdfExtractor, OcrEndpointExtractor::new(ocr));

        let error = extractor.extract(&path).unwrap_err();
        assert!(error.to_string().contains("fallback extraction failed"));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn blocking_work_runs_on_a_multi_thread_runtime() {
        let pages = run_blocking(|| Ok(vec![PageRecord::new("a.pdf", 0, "text")])).unwrap();
        assert_eq!(pages.len(), 1);
    }

    #[test]
    fn blocking_work_runs_without_a_runtime() {
        let result: Result<(), ExtractionError> =
            run_blocking(|| Err(ExtractionError::OcrFailed("down".to_string())));
        assert!(matches!(result, Err(ExtractionError::OcrFailed(_))));
    }

    struct Fixed(Result<Vec<PageRecord>, &'static str>);

    impl PdfExtractor for Fixed {
        fn extract(&self, _path: &Path) -> Result<Vec<PageRecord>, ExtractionError> {
            self.0
                .clone()
                .map_err(|message| ExtractionError::PdfParse(message.to_string()))
        }
    }

    #[test]
    fn fallback_is_used_only_after_parse_failure() {
        let path = Path::new("a.pdf");
        let page = PageRecord::new("a.pdf", 0, "from ocr");

        let rescued = FallbackExtractor::new(Fixed(Err("no text layer")), Fixed(Ok(vec![page.clone()])));
        assert_eq!(rescued.extract(path).unwrap(), vec![page.clone()]);

        let both_fail = FallbackExtractor::new(Fixed(Err("no text layer")), Fixed(Err("ocr down")));
        let message = both_fail.extract(path).unwrap_err().to_string();
        assert!(message.contains("no text layer"));
        assert!(message.contains("ocr down"));

        let primary_ok = FallbackExtractor::new(
            Fixed(Ok(vec![PageRecord::new("a.pdf", 0, "text layer")])),
            Fixed(Ok(vec![page])),
        );
        assert_eq!(primary_ok.extract(path).unwrap()[0].content, "text layer");
    }
}
