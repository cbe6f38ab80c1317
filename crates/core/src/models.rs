use crate::units::Metadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_RENDER_SCALE: f32 = 2.0;
pub const SERVICE_NAME: &str = "Multimodal RAG System";

/// Routed type of an upload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Text,
    Image,
    Pdf,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
}

/// One ingested upload. A re-ingestion produces a new `Document`.
#[derive(Debug, Clone)]
pub struct Document {
    pub doc_id: String,
    pub source_path: PathBuf,
    pub uploaded_at: DateTime<Utc>,
    pub kind: FileKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub chunk_index: u32,
    pub page: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub filename: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DocIdPolicy {
    /// Fresh UUIDv4 per ingestion call; re-uploads never overwrite.
    #[default]
    Random,
    /// SHA-256 of the uploaded bytes; re-uploading identical bytes overwrites in place.
    ContentHash,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub upload_dir: PathBuf,
    pub extracted_dir: PathBuf,
    pub render_scale: f32,
    pub doc_id_policy: DocIdPolicy,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("data/uploads"),
            extracted_dir: PathBuf::from("data/extracted"),
            render_scale: DEFAULT_RENDER_SCALE,
            doc_id_policy: DocIdPolicy::Random,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum IngestionReport {
    Text {
        status: String,
        doc_id: String,
        ingested_chunks: usize,
    },
    Image {
        status: String,
        doc_id: String,
        embedded_images: usize,
        ocr_chars: usize,
    },
    Pdf {
        status: String,
        doc_id: String,
        text_chunks: usize,
        embedded_images: usize,
    },
}

impl IngestionReport {
    pub fn doc_id(&self) -> &str {
        match self {
            Self::Text { doc_id, .. } | Self::Image { doc_id, .. } | Self::Pdf { doc_id, .. } => {
                doc_id
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SearchQuery {
    pub text: String,
    pub top_k: usize,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MergedResult {
    pub id: String,
    /// Per-modality min-max normalized similarity in `[0, 1]`.
    pub score: f64,
    pub modality: Modality,
    pub document: Option<String>,
    pub metadata: Metadata,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    pub query: String,
    pub results: Vec<MergedResult>,
    pub total_results: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub service: String,
}

impl HealthStatus {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            service: SERVICE_NAME.to_string(),
        }
    }
}
