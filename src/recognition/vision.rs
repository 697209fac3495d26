use std::io::Cursor;
use std::time::Duration;

use base64::Engine as _;
use image::{DynamicImage, ImageFormat};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RecognitionError;
use crate::recognition::TextRecognizer;

const DEFAULT_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";

/// Remote recognizer using the Cloud Vision document text detection API.
///
/// Built on the blocking reqwest client; create and drop it outside an async
/// context and only call it from blocking threads.
#[derive(Debug, Clone)]
pub struct VisionRecognizer {
    endpoint: String,
    api_key: String,
    timeout: Duration,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct AnnotateRequest<'a> {
    requests: Vec<ImageRequest<'a>>,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    image: ImageContent,
    features: Vec<Feature<'a>>,
}

#[derive(Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Serialize)]
struct Feature<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    full_text_annotation: Option<TextAnnotation>,
    error: Option<ApiStatus>,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

impl VisionRecognizer {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, RecognitionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecognitionError::Engine(e.to_string()))?;
        Ok(Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            timeout,
            client,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// JPEG-encode and base64 the crop the way the API expects it
fn encode_image(image: &DynamicImage) -> Result<String, RecognitionError> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(image.to_rgb8())
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
        .map_err(|e| RecognitionError::Encode(e.to_string()))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(&buf))
}

fn classify_status(status: StatusCode, body: &str) -> RecognitionError {
    let msg = format!("HTTP {}: {}", status, body);
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        RecognitionError::Transient(msg)
    } else {
        RecognitionError::Service(msg)
    }
}

fn classify_transport(err: reqwest::Error, timeout: Duration) -> RecognitionError {
    if err.is_timeout() {
        RecognitionError::Timeout(timeout)
    } else {
        RecognitionError::Transient(err.to_string())
    }
}

/// Pull the document text out of an annotate response body
fn parse_response(body: &str) -> Result<String, RecognitionError> {
    let parsed: AnnotateResponse =
        serde_json::from_str(body).map_err(|e| RecognitionError::Service(e.to_string()))?;
    let first = parsed.responses.into_iter().next().unwrap_or_default();
    if let Some(status) = first.error {
        return Err(RecognitionError::Service(format!("{} ({})", status.message, status.code)));
    }
    // No annotation means no text was found in the crop
    Ok(first.full_text_annotation.map(|a| a.text).unwrap_or_default())
}

impl TextRecognizer for VisionRecognizer {
    fn recognize(&self, image: &DynamicImage) -> Result<String, RecognitionError> {
        let request = AnnotateRequest {
            requests: vec![ImageRequest {
                image: ImageContent {
                    content: encode_image(image)?,
                },
                features: vec![Feature {
                    kind: "DOCUMENT_TEXT_DETECTION",
                }],
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .map_err(|e| classify_transport(e, self.timeout))?;

        let status = response.status();
        let body = response.text().map_err(|e| classify_transport(e, self.timeout))?;
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let text = parse_response(&body)?;
        debug!(chars = text.len(), "vision recognized cell");
        Ok(text)
    }

    fn name(&self) -> &str {
        "google-vision"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::JoinHandle;

    /// Answer a single HTTP request on a local port; the handle yields the
    /// raw request that was received
    fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}/v1/images:annotate", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut raw = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = stream.read(&mut chunk).unwrap();
                raw.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let length = text[..split]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if raw.len() >= split + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let reply = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(reply.as_bytes()).unwrap();
            String::from_utf8_lossy(&raw).to_string()
        });
        (endpoint, handle)
    }

    fn crop() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(16, 8, image::Luma([200u8])))
    }

    #[test]
    fn posts_document_detection_to_the_endpoint() {
        let (endpoint, server) = serve_once("200 OK", r#"{"responses":[{"fullTextAnnotation":{"text":"9\n"}}]}"#);
        let recognizer = VisionRecognizer::new("secret", Duration::from_secs(5))
            .unwrap()
            .with_endpoint(endpoint);

        assert_eq!(recognizer.recognize(&crop()).unwrap(), "9\n");
        let request = server.join().unwrap();
        assert!(request.starts_with("POST /v1/images:annotate?key=secret"));
        assert!(request.contains("DOCUMENT_TEXT_DETECTION"));
    }

    #[test]
    fn unavailable_service_is_transient() {
        let (endpoint, server) = serve_once("503 Service Unavailable", "{}");
        let recognizer = VisionRecognizer::new("secret", Duration::from_secs(5))
            .unwrap()
            .with_endpoint(endpoint);

        let err = recognizer.recognize(&crop()).unwrap_err();
        assert!(matches!(err, RecognitionError::Transient(_)));
        server.join().unwrap();
    }

    #[test]
    fn reads_full_text_annotation() {
        let body = r#"{"responses":[{"fullTextAnnotation":{"text":"4\nB\n"}}]}"#;
        assert_eq!(parse_response(body).unwrap(), "4\nB\n");
    }

    #[test]
    fn empty_response_means_no_text() {
        assert_eq!(parse_response(r#"{"responses":[{}]}"#).unwrap(), "");
        assert_eq!(parse_response("{}").unwrap(), "");
    }

    #[test]
    fn api_error_object_is_a_service_error() {
        let body = r#"{"responses":[{"error":{"code":3,"message":"Bad image data."}}]}"#;
        match parse_response(body) {
            Err(RecognitionError::Service(msg)) => assert!(msg.contains("Bad image data")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, "").is_transient());
        assert!(!classify_status(StatusCode::FORBIDDEN, "").is_transient());
    }

    #[test]
    fn encodes_crop_as_base64_jpeg() {
        let encoded = encode_image(&DynamicImage::ImageLuma8(GrayImage::new(8, 8))).unwrap();
        let bytes = base64::engine::general_purpose::STANDARD.decode(encoded).unwrap();
        // JPEG start-of-image marker
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}
