//! Azure Form Recognizer client (REST, `prebuilt-document` model).

use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info_span, warn};

use super::{ExtractedText, ExtractionError, ExtractionLimits, Extractor, RawFile, RegionId, TextRegion};

pub const DEFAULT_MODEL_ID: &str = "prebuilt-document";
pub const DEFAULT_API_VERSION: &str = "2023-07-31";

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const OPERATION_LOCATION_HEADER: &str = "Operation-Location";

/// Default connect timeout for HTTP requests (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between polls of a running analysis.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct FormRecognizerSettings {
    pub endpoint: String,
    pub key: SecretString,
    pub model_id: String,
    pub api_version: String,
    pub limits: ExtractionLimits,
    /// Bound on the whole analysis, submission plus polling.
    pub request_timeout: Duration,
}

pub struct FormRecognizerClient {
    client: Client,
    endpoint: String,
    key: SecretString,
    model_id: String,
    api_version: String,
    limits: ExtractionLimits,
    request_timeout: Duration,
    poll_interval: Duration,
}

impl FormRecognizerClient {
    pub fn new(settings: FormRecognizerSettings) -> Result<Self, ExtractionError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| {
                ExtractionError::Unexpected(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            key: settings.key,
            model_id: settings.model_id,
            api_version: settings.api_version,
            limits: settings.limits,
            request_timeout: settings.request_timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn analyze_url(&self) -> String {
        format!(
            "{}/formrecognizer/documentModels/{}:analyze?api-version={}",
            self.endpoint, self.model_id, self.api_version
        )
    }

    fn submit(&self, file: &RawFile) -> Result<String, ExtractionError> {
        let response = self
            .client
            .post(self.analyze_url())
            .header(SUBSCRIPTION_KEY_HEADER, self.key.expose_secret())
            .header(CONTENT_TYPE, file.mime_type.as_str())
            .body(file.bytes.clone())
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        if status != StatusCode::ACCEPTED && !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        response
            .headers()
            .get(OPERATION_LOCATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                ExtractionError::Unexpected("analysis accepted without Operation-Location".into())
            })
    }

    fn poll(&self, operation_url: &str, deadline: Instant) -> Result<AnalyzeResult, ExtractionError> {
        loop {
            let response = self
                .client
                .get(operation_url)
                .header(SUBSCRIPTION_KEY_HEADER, self.key.expose_secret())
                .send()
                .map_err(transport_error)?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().unwrap_or_default();
                return Err(classify_status(status, &body));
            }

            let operation: AnalyzeOperation = response.json().map_err(|e| {
                ExtractionError::Unexpected(format!("Failed to parse analysis status: {}", e))
            })?;

            match operation.status.as_str() {
                "succeeded" => {
                    return operation.analyze_result.ok_or_else(|| {
                        ExtractionError::Unexpected("analysis succeeded without a result".into())
                    })
                }
                "failed" => {
                    let message = operation
                        .error
                        .map(|e| format!("{}: {}", e.code, e.message))
                        .unwrap_or_else(|| "analysis failed".to_string());
                    return Err(ExtractionError::Unexpected(message));
                }
                other => debug!("Analysis status: {}", other),
            }

            if Instant::now() + self.poll_interval > deadline {
                return Err(ExtractionError::ServiceUnavailable(format!(
                    "analysis did not finish within {}s",
                    self.request_timeout.as_secs()
                )));
            }
            std::thread::sleep(self.poll_interval);
        }
    }
}

impl Extractor for FormRecognizerClient {
    fn extract(&self, file: &RawFile) -> Result<ExtractedText, ExtractionError> {
        let _span = info_span!("extraction.form_recognizer", model = %self.model_id).entered();

        file.validate(&self.limits)?;

        let deadline = Instant::now() + self.request_timeout;
        let operation_url = self.submit(file)?;
        let result = self.poll(&operation_url, deadline)?;

        let text = build_extracted_text(result);
        if text.is_blank() {
            return Err(ExtractionError::InvalidInput(format!(
                "no text extracted from '{}'",
                file.filename
            )));
        }

        debug!(
            "Extracted {} chars in {} regions from {}",
            text.text.len(),
            text.regions.len(),
            file.filename
        );
        Ok(text)
    }
}

/// Only timeouts and failed connections are transient; anything else, such
/// as a request that could not be built, will not succeed on retry.
fn transport_error(e: reqwest::Error) -> ExtractionError {
    if e.is_timeout() || e.is_connect() {
        ExtractionError::ServiceUnavailable(e.to_string())
    } else {
        warn!("Unexpected transport error: {}", e);
        ExtractionError::Unexpected(e.to_string())
    }
}

fn classify_status(status: StatusCode, body: &str) -> ExtractionError {
    let detail = format!("provider returned {}: {}", status, body.trim());
    match status {
        StatusCode::BAD_REQUEST
        | StatusCode::PAYLOAD_TOO_LARGE
        | StatusCode::UNSUPPORTED_MEDIA_TYPE => ExtractionError::InvalidInput(detail),
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::REQUEST_TIMEOUT => ExtractionError::ServiceUnavailable(detail),
        s if s.is_server_error() => ExtractionError::ServiceUnavailable(detail),
        _ => ExtractionError::Unexpected(detail),
    }
}

/// One region per page; page text is its lines joined by newlines.
fn build_extracted_text(result: AnalyzeResult) -> ExtractedText {
    let mut pages = result.pages;
    pages.sort_by_key(|p| p.page_number);

    let mut text = String::new();
    let mut regions = Vec::with_capacity(pages.len());

    for page in pages {
        if !text.is_empty() {
            text.push('\n');
        }
        let start = text.len();
        let lines: Vec<&str> = page.lines.iter().map(|l| l.content.as_str()).collect();
        text.push_str(&lines.join("\n"));
        let end = text.len();

        let confidence = if page.words.is_empty() {
            0.0
        } else {
            page.words.iter().map(|w| w.confidence).sum::<f64>() / page.words.len() as f64
        };

        regions.push(TextRegion {
            id: RegionId::page(page.page_number),
            start,
            end,
            confidence: confidence.clamp(0.0, 1.0),
        });
    }

    ExtractedText { text, regions }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeOperation {
    status: String,
    #[serde(default)]
    error: Option<ApiError>,
    #[serde(default)]
    analyze_result: Option<AnalyzeResult>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResult {
    #[serde(default)]
    pages: Vec<AnalyzedPage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzedPage {
    page_number: u32,
    #[serde(default)]
    lines: Vec<AnalyzedLine>,
    #[serde(default)]
    words: Vec<AnalyzedWord>,
}

#[derive(Debug, Deserialize)]
struct AnalyzedLine {
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnalyzedWord {
    confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn settings(endpoint: &str) -> FormRecognizerSettings {
        FormRecognizerSettings {
            endpoint: endpoint.to_string(),
            key: SecretString::from("test-key"),
            model_id: DEFAULT_MODEL_ID.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            limits: ExtractionLimits::default(),
            request_timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_analyze_url() {
        let client = FormRecognizerClient::new(settings("https://example.cognitiveservices.azure.com/"))
            .unwrap();
        assert_eq!(
            client.analyze_url(),
            "https://example.cognitiveservices.azure.com/formrecognizer/documentModels/prebuilt-document:analyze?api-version=2023-07-31"
        );
    }

    #[test]
    fn test_build_text_one_region_per_page() {
        let json = r#"{
            "status": "succeeded",
            "analyzeResult": {
                "pages": [
                    {
                        "pageNumber": 2,
                        "lines": [{"content": "Policy # AB-123"}],
                        "words": [{"content": "Policy", "confidence": 0.6}, {"content": "AB-123", "confidence": 0.8}]
                    },
                    {
                        "pageNumber": 1,
                        "lines": [{"content": "Patient Name: Jane Doe"}, {"content": "DOB: 01/02/1980"}],
                        "words": [{"content": "Patient", "confidence": 1.0}, {"content": "Jane", "confidence": 0.8}]
                    }
                ]
            }
        }"#;

        let op: AnalyzeOperation = serde_json::from_str(json).unwrap();
        let text = build_extracted_text(op.analyze_result.unwrap());

        assert_eq!(
            text.text,
            "Patient Name: Jane Doe\nDOB: 01/02/1980\nPolicy # AB-123"
        );
        assert_eq!(text.regions.len(), 2);
        assert_eq!(text.regions[0].id, RegionId::page(1));
        assert!((text.regions[0].confidence - 0.9).abs() < 1e-9);
        assert!((text.regions[1].confidence - 0.7).abs() < 1e-9);

        let page_two = &text.regions[1];
        assert_eq!(&text.text[page_two.start..page_two.end], "Policy # AB-123");
    }

    #[test]
    fn test_page_without_words_has_zero_confidence() {
        let result = AnalyzeResult {
            pages: vec![AnalyzedPage {
                page_number: 1,
                lines: vec![],
                words: vec![],
            }],
        };
        let text = build_extracted_text(result);
        assert_eq!(text.regions[0].confidence, 0.0);
        assert!(text.is_blank());
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::UNSUPPORTED_MEDIA_TYPE, ""),
            ExtractionError::InvalidInput(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ExtractionError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, ""),
            ExtractionError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "bad key"),
            ExtractionError::Unexpected(_)
        ));
    }

    #[test]
    fn test_invalid_file_is_rejected_before_any_request() {
        let client = FormRecognizerClient::new(settings("http://127.0.0.1:1")).unwrap();
        let file = RawFile::from_bytes(PathBuf::from("/tmp/notes.txt"), b"hello".to_vec());

        assert!(matches!(
            client.extract(&file),
            Err(ExtractionError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_unreachable_endpoint_is_service_unavailable() {
        let client = FormRecognizerClient::new(settings("http://127.0.0.1:1")).unwrap();
        let file = RawFile::from_bytes(PathBuf::from("/tmp/scan.png"), b"png".to_vec());

        assert!(matches!(
            client.extract(&file),
            Err(ExtractionError::ServiceUnavailable(_))
        ));
    }

    #[test]
    fn test_unbuildable_request_is_not_retryable() {
        let mut bad_key = settings("http://127.0.0.1:1");
        bad_key.key = SecretString::from("line\nbreak");
        let client = FormRecognizerClient::new(bad_key).unwrap();
        let file = RawFile::from_bytes(PathBuf::from("/tmp/scan.png"), b"png".to_vec());

        assert!(matches!(
            client.extract(&file),
            Err(ExtractionError::Unexpected(_))
        ));
    }
}
