//! Composite unit identifiers and the metadata record stored beside each unit.
//!
//! Every stored unit is addressed as
//! `{prefix}::{doc_id}[::p{page}][::c{chunk_index}|::{basename}]`. The same
//! positional unit under the same `doc_id` always yields the same string, so a
//! re-upsert overwrites instead of duplicating.

use crate::models::Modality;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Text,
    Image,
    PdfText,
    PdfImage,
}

impl FileType {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Image => "img",
            Self::PdfText => "pdftext",
            Self::PdfImage => "pdfimg",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::PdfText => "pdf_text",
            Self::PdfImage => "pdf_image",
        }
    }

    /// Collection a unit of this type belongs to.
    pub fn modality(self) -> Modality {
        match self {
            Self::Text | Self::PdfText => Modality::Text,
            Self::Image | Self::PdfImage => Modality::Image,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdTail<'a> {
    Chunk(u32),
    Basename(&'a str),
}

pub fn build_unit_id(
    prefix: &str,
    doc_id: &str,
    page: Option<u32>,
    tail: Option<IdTail<'_>>,
) -> String {
    let mut id = format!("{prefix}::{doc_id}");
    if let Some(page) = page {
        id.push_str(&format!("::p{page}"));
    }
    match tail {
        Some(IdTail::Chunk(index)) => id.push_str(&format!("::c{index}")),
        Some(IdTail::Basename(name)) => id.push_str(&format!("::{name}")),
        None => {}
    }
    id
}

/// Fields shared by every unit of one ingested document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentOrigin {
    pub doc_id: String,
    pub source_path: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "file_type", rename_all = "snake_case")]
pub enum Metadata {
    Text {
        #[serde(flatten)]
        origin: DocumentOrigin,
        chunk_index: u32,
    },
    Image {
        #[serde(flatten)]
        origin: DocumentOrigin,
        ocr_text: String,
    },
    PdfText {
        #[serde(flatten)]
        origin: DocumentOrigin,
        page: u32,
        chunk_index: u32,
    },
    PdfImage {
        #[serde(flatten)]
        origin: DocumentOrigin,
        page: u32,
        image_path: String,
        ocr_text: String,
    },
}

impl Metadata {
    pub fn file_type(&self) -> FileType {
        match self {
            Self::Text { .. } => FileType::Text,
            Self::Image { .. } => FileType::Image,
            Self::PdfText { .. } => FileType::PdfText,
            Self::PdfImage { .. } => FileType::PdfImage,
        }
    }

    pub fn origin(&self) -> &DocumentOrigin {
        match self {
            Self::Text { origin, .. }
            | Self::Image { origin, .. }
            | Self::PdfText { origin, .. }
            | Self::PdfImage { origin, .. } => origin,
        }
    }

    pub fn page(&self) -> Option<u32> {
        match self {
            Self::PdfText { page, .. } | Self::PdfImage { page, .. } => Some(*page),
            Self::Text { .. } | Self::Image { .. } => None,
        }
    }

    pub fn chunk_index(&self) -> Option<u32> {
        match self {
            Self::Text { chunk_index, .. } | Self::PdfText { chunk_index, .. } => {
                Some(*chunk_index)
            }
            Self::Image { .. } | Self::PdfImage { .. } => None,
        }
    }

    pub fn ocr_text(&self) -> Option<&str> {
        match self {
            Self::Image { ocr_text, .. } | Self::PdfImage { ocr_text, .. } => Some(ocr_text),
            Self::Text { .. } | Self::PdfText { .. } => None,
        }
    }

    pub fn image_path(&self) -> Option<&str> {
        match self {
            Self::PdfImage { image_path, .. } => Some(image_path),
            _ => None,
        }
    }

    pub fn unit_id(&self) -> String {
        let file_type = self.file_type();
        let doc_id = &self.origin().doc_id;
        let tail = match self {
            Self::Text { chunk_index, .. } | Self::PdfText { chunk_index, .. } => {
                Some(IdTail::Chunk(*chunk_index))
            }
            Self::PdfImage { image_path, .. } => Some(IdTail::Basename(basename(image_path))),
            Self::Image { .. } => None,
        };
        build_unit_id(file_type.prefix(), doc_id, self.page(), tail)
    }

    /// `Source: <path> | Type: <file_type>` followed by page, chunk and upload
    /// time when the record carries them.
    pub fn attribution(&self) -> String {
        let origin = self.origin();
        let mut parts = vec![
            format!("Source: {}", origin.source_path),
            format!("Type: {}", self.file_type()),
        ];
        if let Some(page) = self.page() {
            parts.push(format!("Page: {page}"));
        }
        if let Some(chunk_index) = self.chunk_index() {
            parts.push(format!("Chunk: {chunk_index}"));
        }
        parts.push(format!("Uploaded: {}", origin.uploaded_at.to_rfc3339()));
        parts.join(" | ")
    }
}

fn basename(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
}

/// Stamps out metadata records for the units of one document.
#[derive(Debug, Clone)]
pub struct UnitBuilder {
    origin: DocumentOrigin,
}

impl UnitBuilder {
    pub fn new(
        doc_id: impl Into<String>,
        source_path: impl Into<String>,
        uploaded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            origin: DocumentOrigin {
                doc_id: doc_id.into(),
                source_path: source_path.into(),
                uploaded_at,
            },
        }
    }

    pub fn text_chunk(&self, chunk_index: u32) -> Metadata {
        Metadata::Text {
            origin: self.origin.clone(),
            chunk_index,
        }
    }

    pub fn image(&self, ocr_text: impl Into<String>) -> Metadata {
        Metadata::Image {
            origin: self.origin.clone(),
            ocr_text: ocr_text.into(),
        }
    }

    pub fn pdf_text(&self, page: u32, chunk_index: u32) -> Metadata {
        Metadata::PdfText {
            origin: self.origin.clone(),
            page,
            chunk_index,
        }
    }

    pub fn pdf_image(
        &self,
        page: u32,
        image_path: impl Into<String>,
        ocr_text: impl Into<String>,
    ) -> Metadata {
        Metadata::PdfImage {
            origin: self.origin.clone(),
            page,
            image_path: image_path.into(),
            ocr_text: ocr_text.into(),
        }
    }
}
