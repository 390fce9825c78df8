//! Talk backend client with chunked text streaming
//!
//! `/chat` answers with raw text chunks (no SSE framing). Chunks are
//! decoded incrementally and forwarded in arrival order.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::{ToolError, TransportError, UploadError};
use crate::face::FaceAnalysis;
use crate::message::{Message, PreviewHandle};

/// Health probe timeout
const HEALTH_TIMEOUT_SECS: u64 = 5;

/// Stream events from the chat endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A piece of assistant text
    Fragment(String),
    /// Stream finished (after a transport failure too)
    Done,
}

/// File handed to the upload endpoint
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: PreviewHandle,
}

/// Successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub server_path: String,
    /// Backend status text ("Processed 3 chunks from ...")
    pub message: Option<String>,
}

/// What the chat core needs from the backend
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Start one `/chat` turn. Must be called inside a tokio runtime.
    fn chat_stream(&self, message: String, history: Vec<Message>) -> mpsc::Receiver<StreamEvent>;

    /// Upload an attachment
    async fn upload(&self, file: UploadFile) -> Result<UploadReceipt, UploadError>;

    /// Liveness probe: true on any 2xx
    async fn check_health(&self) -> bool;
}

/// HTTP client for a Talk backend
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    http: reqwest::Client,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    // ───────────────────────────────────────────────────────────
    // Face tools
    // ───────────────────────────────────────────────────────────

    /// Swap the face from `source` onto `target` (image or video)
    pub async fn face_swap(&self, source: &Path, target: &Path) -> Result<FaceSwapResult, ToolError> {
        let form = reqwest::multipart::Form::new()
            .part("source", file_part(source).await?)
            .part("target", file_part(target).await?);

        let response = self
            .http
            .post(self.url("/face/swap"))
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        let data: FaceSwapResponse = response.json().await?;

        if let Some(error) = data.error {
            return Err(ToolError::Backend(error));
        }
        match data.output_path {
            Some(path) => Ok(FaceSwapResult {
                output_url: self.url(&path),
                message: data.message,
            }),
            None => Err(ToolError::Backend(format!("no output returned ({})", status))),
        }
    }

    /// Run the face analysis model on one image
    pub async fn analyze_face(&self, image: &Path) -> Result<FaceAnalysis, ToolError> {
        let form = reqwest::multipart::Form::new().part("image", file_part(image).await?);

        let response = self
            .http
            .post(self.url("/face/analyze"))
            .multipart(form)
            .send()
            .await?;
        let data: AnalyzeResponse = response.json().await?;

        match (data.analysis, data.error) {
            (Some(analysis), _) => FaceAnalysis::from_value(analysis),
            (None, Some(error)) => Err(ToolError::Backend(error)),
            (None, None) => Err(ToolError::Backend("Unknown error".into())),
        }
    }
}

#[async_trait]
impl Backend for BackendClient {
    fn chat_stream(&self, message: String, history: Vec<Message>) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(256);
        let request = ChatRequest { message, history };
        let client = self.http.clone();
        let url = self.url("/chat");

        tokio::spawn(async move {
            if let Err(e) = do_stream(&client, &url, &request, &tx).await {
                tracing::warn!(error = %e, "chat stream failed");
                let _ = tx.send(StreamEvent::Fragment(e.fallback_text())).await;
            }
            let _ = tx.send(StreamEvent::Done).await;
        });

        rx
    }

    async fn upload(&self, file: UploadFile) -> Result<UploadReceipt, UploadError> {
        let part = reqwest::multipart::Part::bytes(file.bytes.bytes().to_vec())
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(self.url("/upload"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UploadError::Status {
                status: response.status(),
            });
        }

        let data: UploadResponse = response.json().await?;
        if let Some(error) = data.error {
            return Err(UploadError::Rejected(error));
        }

        // The backend indexes uploads by their original file name
        // when it does not hand back a path.
        let server_path = data
            .file_path
            .filter(|p| !p.is_empty())
            .unwrap_or(file.name);

        Ok(UploadReceipt {
            server_path,
            message: data.message,
        })
    }

    async fn check_health(&self) -> bool {
        match self
            .http
            .get(self.url("/"))
            .timeout(Duration::from_secs(HEALTH_TIMEOUT_SECS))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "health probe failed");
                false
            }
        }
    }
}

/// Single streaming request
async fn do_stream(
    client: &reqwest::Client,
    url: &str,
    request: &ChatRequest,
    tx: &mpsc::Sender<StreamEvent>,
) -> Result<(), TransportError> {
    let response = client.post(url).json(request).send().await?;

    if !response.status().is_success() {
        return Err(TransportError::Status {
            status: response.status(),
        });
    }

    let mut decoder = Utf8Decoder::default();
    let mut bytes_stream = response.bytes_stream();

    while let Some(chunk) = bytes_stream.next().await {
        let chunk = chunk?;
        let text = decoder.decode(&chunk);
        if !text.is_empty() && tx.send(StreamEvent::Fragment(text)).await.is_err() {
            // Receiver gone: nobody is listening for this turn anymore
            return Ok(());
        }
    }

    let tail = decoder.finish();
    if !tail.is_empty() {
        let _ = tx.send(StreamEvent::Fragment(tail)).await;
    }

    Ok(())
}

async fn file_part(path: &Path) -> Result<reqwest::multipart::Part, ToolError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| ToolError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok(reqwest::multipart::Part::bytes(bytes).file_name(name))
}

// ═══════════════════════════════════════════════════════════════
// Incremental UTF-8
// ═══════════════════════════════════════════════════════════════

/// Decodes a byte stream chunk by chunk.
///
/// A multi-byte sequence split across chunks is held back until the rest
/// arrives. Bytes that can never be valid become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    out.push_str(s);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Incomplete tail: wait for more bytes
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                    }
                }
            }
        }

        out
    }

    /// End of stream: whatever is still buffered is incomplete
    pub fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}

// ═══════════════════════════════════════════════════════════════
// API Types
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
struct ChatRequest {
    message: String,
    history: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    message: Option<String>,
    file_path: Option<String>,
    error: Option<String>,
}

/// Result of a face swap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceSwapResult {
    /// Where the backend serves the swapped image/video
    pub output_url: String,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FaceSwapResponse {
    output_path: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    analysis: Option<serde_json::Value>,
    error: Option<String>,
}
