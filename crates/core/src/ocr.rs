//! Best-effort text recognition over raster images.
//!
//! Recognition never fails the caller: every problem degrades to
//! [`OcrOutcome::NoText`] and is logged.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcrOutcome {
    Text(String),
    NoText,
}

impl OcrOutcome {
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Self::NoText
        } else {
            Self::Text(trimmed.to_string())
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::NoText => String::new(),
        }
    }
}

#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, image_path: &Path) -> OcrOutcome;
}

/// Runs the `tesseract` CLI.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    command: String,
    language: String,
}

impl TesseractRecognizer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            language: "eng".to_string(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    async fn recognize(&self, image_path: &Path) -> OcrOutcome {
        let output = Command::new(&self.command)
            .arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                let outcome = OcrOutcome::from_raw(&String::from_utf8_lossy(&output.stdout));
                if let OcrOutcome::Text(text) = &outcome {
                    debug!(
                        path = %image_path.display(),
                        chars = text.chars().count(),
                        "ocr extracted text"
                    );
                }
                outcome
            }
            Ok(output) => {
                warn!(
                    path = %image_path.display(),
                    status = %output.status,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "tesseract failed; proceeding without OCR text"
                );
                OcrOutcome::NoText
            }
            Err(error) => {
                warn!(
                    command = %self.command,
                    %error,
                    "tesseract not available; proceeding without OCR text"
                );
                OcrOutcome::NoText
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct RemoteOcrRequest {
    image_base64: String,
    source_path: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RemoteOcrResponse {
    #[serde(default)]
    text: Option<String>,
}

/// Posts the image to a multimodal OCR endpoint.
#[derive(Debug, Clone)]
pub struct RemoteOcrRecognizer {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl RemoteOcrRecognizer {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            client: Client::new(),
        }
    }

    async fn request(&self, image_path: &Path) -> Result<OcrOutcome, String> {
        let image = tokio::fs::read(image_path)
            .await
            .map_err(|error| error.to_string())?;
        let payload = RemoteOcrRequest {
            image_base64: STANDARD.encode(image),
            source_path: image_path.to_string_lossy().to_string(),
        };

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|error| error.to_string())?;
        if !response.status().is_success() {
            return Err(format!(
                "OCR request to {} returned {}",
                self.endpoint,
                response.status()
            ));
        }

        let parsed: RemoteOcrResponse = response.json().await.map_err(|error| error.to_string())?;
        Ok(parsed
            .text
            .as_deref()
            .map_or(OcrOutcome::NoText, OcrOutcome::from_raw))
    }
}

#[async_trait]
impl TextRecognizer for RemoteOcrRecognizer {
    async fn recognize(&self, image_path: &Path) -> OcrOutcome {
        match self.request(image_path).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(
                    path = %image_path.display(),
                    %error,
                    "remote OCR failed; proceeding without OCR text"
                );
                OcrOutcome::NoText
            }
        }
    }
}
