use crate::chunking::ParagraphChunker;
use crate::embeddings::EmbeddingProvider;
use crate::error::{EmbedError, IngestError};
use crate::extractor::{PdfRasterizer, PdfTextExtractor};
use crate::models::{DocIdPolicy, Document, FileKind, IngestionOptions, IngestionReport, Upload};
use crate::ocr::TextRecognizer;
use crate::store::{Collection, UnitRecord, VectorStore};
use crate::units::UnitBuilder;
use chrono::Utc;
use image::RgbImage;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

const STATUS_OK: &str = "ok";

const TEXT_MEDIA_TYPES: [&str; 1] = ["text/plain"];
const IMAGE_MEDIA_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/jpg"];
const PDF_MEDIA_TYPES: [&str; 1] = ["application/pdf"];

/// Declared content type first, file extension as fallback.
pub fn classify(content_type: &str, filename: &str) -> Result<FileKind, IngestError> {
    media_type_kind(content_type)
        .or_else(|| extension_kind(Path::new(filename)))
        .ok_or_else(|| IngestError::UnsupportedMediaType {
            content_type: content_type.to_string(),
        })
}

fn media_type_kind(content_type: &str) -> Option<FileKind> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if TEXT_MEDIA_TYPES.contains(&essence.as_str()) {
        Some(FileKind::Text)
    } else if IMAGE_MEDIA_TYPES.contains(&essence.as_str()) {
        Some(FileKind::Image)
    } else if PDF_MEDIA_TYPES.contains(&essence.as_str()) {
        Some(FileKind::Pdf)
    } else {
        None
    }
}

fn extension_kind(path: &Path) -> Option<FileKind> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "txt" => Some(FileKind::Text),
        "png" | "jpg" | "jpeg" => Some(FileKind::Image),
        "pdf" => Some(FileKind::Pdf),
        _ => None,
    }
}

/// Files under `folder` whose extension routes to a supported type.
pub fn discover_uploads(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if entry.file_type().is_file() && extension_kind(entry.path()).is_some() {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Only the final path component of a client-supplied name is kept.
fn stored_file_name(filename: &str) -> String {
    Path::new(filename.trim())
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("upload_{}", Uuid::new_v4()))
}

async fn load_rgb(path: &Path) -> Result<RgbImage, IngestError> {
    let bytes = tokio::fs::read(path).await?;
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        image::load_from_memory(&bytes)
            .map(|image| image.to_rgb8())
            .map_err(|error| IngestError::Decode(format!("{}: {error}", path.display())))
    })
    .await?
}

fn ensure_count(expected: usize, actual: usize) -> Result<(), IngestError> {
    if expected == actual {
        Ok(())
    } else {
        Err(EmbedError::CountMismatch { expected, actual }.into())
    }
}

/// Handles to the external collaborators. Built once and shared.
#[derive(Clone)]
pub struct IngestionServices {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub store: Arc<dyn VectorStore>,
    pub recognizer: Arc<dyn TextRecognizer>,
    pub pdf_text: Arc<dyn PdfTextExtractor>,
    pub rasterizer: Arc<dyn PdfRasterizer>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestedUpload {
    pub path: PathBuf,
    pub report: IngestionReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedUpload {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionBatch {
    pub ingested: Vec<IngestedUpload>,
    pub skipped: Vec<SkippedUpload>,
}

pub struct Ingestor {
    services: IngestionServices,
    chunker: ParagraphChunker,
    options: IngestionOptions,
}

impl Ingestor {
    pub fn new(
        services: IngestionServices,
        options: IngestionOptions,
    ) -> Result<Self, IngestError> {
        Ok(Self {
            services,
            chunker: ParagraphChunker::new()?,
            options,
        })
    }

    /// Persists the raw upload under `upload_dir/<doc_id>/`, then routes it by
    /// type. The persisted copy is left in place when classification or
    /// parsing fails.
    pub async fn ingest_upload(&self, upload: Upload) -> Result<IngestionReport, IngestError> {
        let filename = stored_file_name(&upload.filename);
        let doc_id = self.doc_id(&upload.bytes);

        let stored_dir = self.options.upload_dir.join(&doc_id);
        tokio::fs::create_dir_all(&stored_dir).await?;
        let stored_path = stored_dir.join(&filename);
        tokio::fs::write(&stored_path, &upload.bytes).await?;
        debug!(path = %stored_path.display(), bytes = upload.bytes.len(), "persisted upload");

        let kind = classify(&upload.content_type, &filename).map_err(|error| {
            warn!(
                filename = %filename,
                content_type = %upload.content_type,
                "unsupported file type"
            );
            error
        })?;

        let document = Document {
            doc_id,
            source_path: stored_path,
            uploaded_at: Utc::now(),
            kind,
        };
        info!(
            doc_id = %document.doc_id,
            kind = ?kind,
            path = %document.source_path.display(),
            "ingesting upload"
        );

        match kind {
            FileKind::Text => self.ingest_text(&document).await,
            FileKind::Image => self.ingest_image(&document).await,
            FileKind::Pdf => self.ingest_pdf(&document).await,
        }
    }

    /// Reads a local file and ingests it as an upload named after the file.
    pub async fn ingest_path(
        &self,
        path: &Path,
        content_type: &str,
    ) -> Result<IngestionReport, IngestError> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                IngestError::InvalidArgument(format!("path has no file name: {}", path.display()))
            })?
            .to_string();
        let bytes = tokio::fs::read(path).await?;

        self.ingest_upload(Upload {
            bytes,
            content_type: content_type.to_string(),
            filename,
        })
        .await
    }

    /// Ingests every supported file under `folder`; per-file failures are
    /// collected instead of aborting the batch.
    pub async fn ingest_folder_best_effort(
        &self,
        folder: &Path,
    ) -> Result<IngestionBatch, IngestError> {
        let files = discover_uploads(folder);
        if files.is_empty() {
            return Err(IngestError::InvalidArgument(format!(
                "no supported files found in {}",
                folder.display()
            )));
        }

        let mut batch = IngestionBatch::default();
        for path in files {
            match self.ingest_path(&path, "").await {
                Ok(report) => batch.ingested.push(IngestedUpload { path, report }),
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipped upload");
                    batch.skipped.push(SkippedUpload {
                        path,
                        reason: error.to_string(),
                    });
                }
            }
        }

        Ok(batch)
    }

    fn doc_id(&self, bytes: &[u8]) -> String {
        match self.options.doc_id_policy {
            DocIdPolicy::Random => Uuid::new_v4().to_string(),
            DocIdPolicy::ContentHash => digest_bytes(bytes),
        }
    }

    fn unit_builder(document: &Document) -> UnitBuilder {
        UnitBuilder::new(
            document.doc_id.clone(),
            document.source_path.to_string_lossy(),
            document.uploaded_at,
        )
    }

    async fn ingest_text(&self, document: &Document) -> Result<IngestionReport, IngestError> {
        let bytes = tokio::fs::read(&document.source_path).await?;
        let chunks = self
            .chunker
            .chunk_document(&String::from_utf8_lossy(&bytes));

        if chunks.is_empty() {
            warn!(path = %document.source_path.display(), "empty text file");
            return Err(IngestError::EmptyDocument {
                path: document.source_path.display().to_string(),
            });
        }
        debug!(chunks = chunks.len(), "split text into chunks");

        let texts = chunks.iter().map(|chunk| chunk.text.clone()).collect::<Vec<_>>();
        let embeddings = self.services.embedder.embed_text(&texts).await?;
        ensure_count(texts.len(), embeddings.len())?;

        let units = Self::unit_builder(document);
        let records = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                UnitRecord::new(units.text_chunk(chunk.chunk_index), embedding, Some(chunk.text))
            })
            .collect::<Vec<_>>();

        self.services.store.upsert(Collection::Text, &records).await?;
        info!(doc_id = %document.doc_id, chunks = records.len(), "ingested text file");

        Ok(IngestionReport::Text {
            status: STATUS_OK.to_string(),
            doc_id: document.doc_id.clone(),
            ingested_chunks: records.len(),
        })
    }

    async fn ingest_image(&self, document: &Document) -> Result<IngestionReport, IngestError> {
        let image = load_rgb(&document.source_path).await?;
        let embedding = self.services.embedder.embed_joint_image(&image).await?;
        let ocr_text = self
            .services
            .recognizer
            .recognize(&document.source_path)
            .await
            .into_text();
        let ocr_chars = ocr_text.chars().count();

        let units = Self::unit_builder(document);
        let record = UnitRecord::new(units.image(ocr_text), embedding, None);
        self.services
            .store
            .upsert(Collection::Image, std::slice::from_ref(&record))
            .await?;
        info!(doc_id = %document.doc_id, ocr_chars, "ingested image");

        Ok(IngestionReport::Image {
            status: STATUS_OK.to_string(),
            doc_id: document.doc_id.clone(),
            embedded_images: 1,
            ocr_chars,
        })
    }

    /// Text-layer pass and raster pass run independently; overlapping content
    /// from the two passes is kept as is.
    async fn ingest_pdf(&self, document: &Document) -> Result<IngestionReport, IngestError> {
        let path = &document.source_path;
        let units = Self::unit_builder(document);

        let pages = self.services.pdf_text.extract_per_page(path).await?;
        let chunks = pages
            .iter()
            .flat_map(|page| self.chunker.chunk_page(page.number, &page.text))
            .collect::<Vec<_>>();
        debug!(chunks = chunks.len(), "extracted text chunks from pdf");

        let output_dir = self.options.extracted_dir.join(&document.doc_id);
        let rendered = self
            .services
            .rasterizer
            .render_pages(path, self.options.render_scale, &output_dir)
            .await?;

        let mut image_records = Vec::with_capacity(rendered.len());
        for page in rendered {
            let image = load_rgb(&page.path).await?;
            let ocr_text = self.services.recognizer.recognize(&page.path).await.into_text();
            let embedding = self.services.embedder.embed_joint_image(&image).await?;
            image_records.push(UnitRecord::new(
                units.pdf_image(page.page, page.path.to_string_lossy(), ocr_text),
                embedding,
                None,
            ));
        }
        debug!(pages = image_records.len(), "rendered page images from pdf");

        let text_chunks = chunks.len();
        if !chunks.is_empty() {
            let texts = chunks.iter().map(|chunk| chunk.text.clone()).collect::<Vec<_>>();
            let embeddings = self.services.embedder.embed_text(&texts).await?;
            ensure_count(texts.len(), embeddings.len())?;

            let records = chunks
                .into_iter()
                .zip(embeddings)
                .map(|(chunk, embedding)| {
                    let page = chunk.page.unwrap_or_default();
                    UnitRecord::new(
                        units.pdf_text(page, chunk.chunk_index),
                        embedding,
                        Some(chunk.text),
                    )
                })
                .collect::<Vec<_>>();
            self.services.store.upsert(Collection::Text, &records).await?;
        }

        if !image_records.is_empty() {
            self.services
                .store
                .upsert(Collection::Image, &image_records)
                .await?;
        }

        info!(
            doc_id = %document.doc_id,
            text_chunks,
            images = image_records.len(),
            "ingested pdf"
        );

        Ok(IngestionReport::Pdf {
            status: STATUS_OK.to_string(),
            doc_id: document.doc_id.clone(),
            text_chunks,
            embedded_images: image_records.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{encode_png, LocalEmbeddingProvider};
    use crate::extractor::{PageText, RenderedPage};
    use crate::models::{Modality, SearchQuery};
    use crate::ocr::OcrOutcome;
    use crate::orchestrator::SearchCoordinator;
    use crate::stores::MemoryStore;
    use crate::units::{FileType, Metadata};
    use async_trait::async_trait;
    use image::Rgb;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    struct FixedOcr(Option<&'static str>);

    #[async_trait]
    impl TextRecognizer for FixedOcr {
        async fn recognize(&self, _image_path: &Path) -> OcrOutcome {
            self.0.map_or(OcrOutcome::NoText, OcrOutcome::from_raw)
        }
    }

    struct FixedPdfText(Result<Vec<PageText>, &'static str>);

    #[async_trait]
    impl PdfTextExtractor for FixedPdfText {
        async fn extract_per_page(&self, _path: &Path) -> Result<Vec<PageText>, IngestError> {
            self.0
                .clone()
                .map_err(|reason| IngestError::Extraction(reason.to_string()))
        }
    }

    /// Writes one solid PNG per page, like a real renderer would.
    struct SolidPageRasterizer {
        pages: u32,
    }

    #[async_trait]
    impl PdfRasterizer for SolidPageRasterizer {
        async fn render_pages(
            &self,
            _path: &Path,
            _scale: f32,
            output_dir: &Path,
        ) -> Result<Vec<RenderedPage>, IngestError> {
            fs::create_dir_all(output_dir)?;
            (1..=self.pages)
                .map(|page| {
                    let path = output_dir.join(format!("page{page}.png"));
                    let shade = (page * 40) as u8;
                    let png = encode_png(&RgbImage::from_pixel(8, 8, Rgb([shade, shade, shade])))?;
                    fs::write(&path, png)?;
                    Ok::<_, IngestError>(RenderedPage { page, path })
                })
                .collect()
        }
    }

    struct Harness {
        _dir: TempDir,
        root: PathBuf,
        store: Arc<MemoryStore>,
        ingestor: Ingestor,
        coordinator: SearchCoordinator,
    }

    fn harness_with(
        ocr: Option<&'static str>,
        pdf_text: Result<Vec<PageText>, &'static str>,
        rendered_pages: u32,
        doc_id_policy: DocIdPolicy,
    ) -> Harness {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let store = Arc::new(MemoryStore::new());
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(LocalEmbeddingProvider::default());

        let services = IngestionServices {
            embedder: embedder.clone(),
            store: store.clone(),
            recognizer: Arc::new(FixedOcr(ocr)),
            pdf_text: Arc::new(FixedPdfText(pdf_text)),
            rasterizer: Arc::new(SolidPageRasterizer {
                pages: rendered_pages,
            }),
        };
        let options = IngestionOptions {
            upload_dir: root.join("uploads"),
            extracted_dir: root.join("extracted"),
            doc_id_policy,
            ..IngestionOptions::default()
        };

        Harness {
            ingestor: Ingestor::new(services, options).unwrap(),
            coordinator: SearchCoordinator::new(embedder, store.clone()),
            store,
            root,
            _dir: dir,
        }
    }

    fn harness() -> Harness {
        harness_with(None, Ok(Vec::new()), 0, DocIdPolicy::Random)
    }

    fn persisted_files(root: &Path) -> Vec<PathBuf> {
        WalkDir::new(root.join("uploads"))
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect()
    }

    fn upload(bytes: &[u8], content_type: &str, filename: &str) -> Upload {
        Upload {
            bytes: bytes.to_vec(),
            content_type: content_type.to_string(),
            filename: filename.to_string(),
        }
    }

    #[test]
    fn declared_content_type_wins_over_extension() {
        assert_eq!(classify("image/png", "notes.txt").unwrap(), FileKind::Image);
        assert_eq!(classify("application/pdf", "photo.jpg").unwrap(), FileKind::Pdf);
    }

    #[test]
    fn extension_is_the_fallback() {
        assert_eq!(classify("", "notes.TXT").unwrap(), FileKind::Text);
        assert_eq!(classify("application/octet-stream", "scan.pdf").unwrap(), FileKind::Pdf);
        assert_eq!(classify("", "photo.jpeg").unwrap(), FileKind::Image);
    }

    #[test]
    fn content_type_parameters_and_aliases_are_accepted() {
        assert_eq!(classify("text/plain; charset=utf-8", "x").unwrap(), FileKind::Text);
        assert_eq!(classify("IMAGE/JPG", "x").unwrap(), FileKind::Image);
    }

    #[test]
    fn unclassifiable_upload_reports_content_type() {
        match classify("application/zip", "archive.zip") {
            Err(IngestError::UnsupportedMediaType { content_type }) => {
                assert_eq!(content_type, "application/zip")
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn stored_file_name_drops_directories() {
        assert_eq!(stored_file_name("../../etc/notes.txt"), "notes.txt");
        assert!(stored_file_name("").starts_with("upload_"));
    }

    #[test]
    fn discover_uploads_is_recursive_and_filtered() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let nested = dir.path().join("nested");
        fs::create_dir(&nested)?;
        fs::write(dir.path().join("a.txt"), b"a")?;
        fs::write(nested.join("b.pdf"), b"%PDF-1.4")?;
        fs::write(nested.join("c.PNG"), b"png")?;
        fs::write(nested.join("d.docx"), b"docx")?;

        let files = discover_uploads(dir.path());
        assert_eq!(files.len(), 3);
        Ok(())
    }

    #[test]
    fn digest_is_reproducible() {
        assert_eq!(digest_bytes(b"abc"), digest_bytes(b"abc"));
        assert_ne!(digest_bytes(b"abc"), digest_bytes(b"abd"));
    }

    #[tokio::test]
    async fn two_paragraph_text_is_ingested_and_retrievable() {
        let h = harness();
        let first = "The hydraulic pump maintains line pressure.";
        let second = "Invoices are payable within thirty days.";
        let body = format!("{first}\n\n{second}\n");

        let report = h
            .ingestor
            .ingest_upload(upload(body.as_bytes(), "text/plain", "notes.txt"))
            .await
            .unwrap();

        let IngestionReport::Text {
            ingested_chunks,
            doc_id,
            ..
        } = &report
        else {
            panic!("expected a text report, got {report:?}");
        };
        assert_eq!(*ingested_chunks, 2);
        assert!(!doc_id.is_empty());
        assert_eq!(h.store.len(Collection::Text).await, 2);
        assert!(h
            .store
            .get(Collection::Text, &format!("txt::{doc_id}::c1"))
            .await
            .is_some());

        let response = h
            .coordinator
            .search(&SearchQuery::new("hydraulic pump pressure"))
            .await
            .unwrap();
        assert!(response.results.iter().any(|result| {
            result.modality == Modality::Text
                && result
                    .document
                    .as_deref()
                    .is_some_and(|text| text == first || text == second)
        }));
    }

    #[tokio::test]
    async fn single_letter_paragraphs_are_stored_as_unit_vectors() {
        let h = harness();
        let report = h
            .ingestor
            .ingest_upload(upload(b"A\n\nB\n\n\nC", "text/plain", "letters.txt"))
            .await
            .unwrap();
        assert!(matches!(report, IngestionReport::Text { ingested_chunks: 3, .. }));

        for index in 0..3 {
            let id = format!("txt::{}::c{index}", report.doc_id());
            let stored = h.store.get(Collection::Text, &id).await.unwrap();
            let magnitude = stored
                .embedding
                .iter()
                .map(|value| value * value)
                .sum::<f32>()
                .sqrt();
            assert!((magnitude - 1.0).abs() < 1e-5, "{id} has magnitude {magnitude}");
        }
    }

    #[tokio::test]
    async fn whitespace_text_fails_but_upload_is_kept() {
        let h = harness();
        let result = h
            .ingestor
            .ingest_upload(upload(b"  \n\n \t\n", "text/plain", "blank.txt"))
            .await;

        assert!(matches!(result, Err(IngestError::EmptyDocument { .. })));
        let persisted = persisted_files(&h.root);
        assert_eq!(persisted.len(), 1);
        assert!(persisted[0].ends_with("blank.txt"));
        assert_eq!(h.store.len(Collection::Text).await, 0);
    }

    #[tokio::test]
    async fn unsupported_upload_is_persisted_then_rejected() {
        let h = harness();
        let result = h
            .ingestor
            .ingest_upload(upload(b"PK\x03\x04", "application/zip", "archive.zip"))
            .await;

        assert!(matches!(result, Err(IngestError::UnsupportedMediaType { .. })));
        let persisted = persisted_files(&h.root);
        assert_eq!(persisted.len(), 1);
        assert_eq!(fs::read(&persisted[0]).unwrap(), b"PK\x03\x04");
    }

    #[tokio::test]
    async fn image_is_embedded_with_ocr_text() {
        let h = harness_with(Some("STOP SIGN"), Ok(Vec::new()), 0, DocIdPolicy::Random);
        let png = encode_png(&RgbImage::from_pixel(12, 12, Rgb([200, 0, 0]))).unwrap();

        let report = h
            .ingestor
            .ingest_upload(upload(&png, "", "sign.png"))
            .await
            .unwrap();

        let IngestionReport::Image {
            embedded_images,
            ocr_chars,
            doc_id,
            ..
        } = &report
        else {
            panic!("expected an image report, got {report:?}");
        };
        assert_eq!(*embedded_images, 1);
        assert_eq!(*ocr_chars, 9);

        let stored = h
            .store
            .get(Collection::Image, &format!("img::{doc_id}"))
            .await
            .unwrap();
        assert_eq!(stored.metadata.ocr_text(), Some("STOP SIGN"));
        assert!(stored.document.is_none());
    }

    #[tokio::test]
    async fn failed_ocr_does_not_abort_image_ingestion() {
        let h = harness_with(None, Ok(Vec::new()), 0, DocIdPolicy::Random);
        let png = encode_png(&RgbImage::new(4, 4)).unwrap();

        let report = h
            .ingestor
            .ingest_upload(upload(&png, "image/png", "blank.png"))
            .await
            .unwrap();

        assert!(matches!(report, IngestionReport::Image { ocr_chars: 0, .. }));
        assert_eq!(h.store.len(Collection::Image).await, 1);
    }

    #[tokio::test]
    async fn undecodable_image_is_rejected() {
        let h = harness();
        let result = h
            .ingestor
            .ingest_upload(upload(b"definitely not pixels", "image/jpeg", "broken.jpg"))
            .await;
        assert!(matches!(result, Err(IngestError::Decode(_))));
    }

    #[tokio::test]
    async fn scanned_pdf_yields_only_page_images() {
        let h = harness_with(
            Some("INVOICE 42 total due"),
            Ok(vec![PageText {
                number: 1,
                text: String::new(),
            }]),
            1,
            DocIdPolicy::Random,
        );

        let report = h
            .ingestor
            .ingest_upload(upload(b"%PDF-1.4 scanned", "application/pdf", "scan.pdf"))
            .await
            .unwrap();

        let IngestionReport::Pdf {
            text_chunks,
            embedded_images,
            doc_id,
            ..
        } = &report
        else {
            panic!("expected a pdf report, got {report:?}");
        };
        assert_eq!(*text_chunks, 0);
        assert_eq!(*embedded_images, 1);
        assert_eq!(h.store.len(Collection::Text).await, 0);

        let stored = h
            .store
            .get(Collection::Image, &format!("pdfimg::{doc_id}::p1::page1.png"))
            .await
            .unwrap();
        assert_eq!(stored.metadata.file_type(), FileType::PdfImage);
        assert_eq!(stored.metadata.page(), Some(1));
        assert!(stored
            .metadata
            .image_path()
            .is_some_and(|path| path.ends_with(&format!("{doc_id}/page1.png"))));

        let response = h
            .coordinator
            .search(&SearchQuery::new("INVOICE 42"))
            .await
            .unwrap();
        assert!(response.results.iter().any(|result| {
            result.modality == Modality::Image
                && result
                    .ocr_text
                    .as_deref()
                    .is_some_and(|text| text.contains("INVOICE 42"))
        }));
    }

    #[tokio::test]
    async fn mixed_pdf_tags_chunks_per_page() {
        let h = harness_with(
            Some("page ocr"),
            Ok(vec![
                PageText {
                    number: 1,
                    text: "Intro paragraph.\n\nSecond paragraph.".to_string(),
                },
                PageText {
                    number: 2,
                    text: "Only paragraph on page two.".to_string(),
                },
            ]),
            2,
            DocIdPolicy::Random,
        );

        let report = h
            .ingestor
            .ingest_upload(upload(b"%PDF-1.4 mixed", "", "manual.pdf"))
            .await
            .unwrap();

        let IngestionReport::Pdf {
            text_chunks,
            embedded_images,
            doc_id,
            ..
        } = &report
        else {
            panic!("expected a pdf report, got {report:?}");
        };
        assert_eq!(*text_chunks, 3);
        assert_eq!(*embedded_images, 2);

        let restarted = h
            .store
            .get(Collection::Text, &format!("pdftext::{doc_id}::p2::c0"))
            .await
            .unwrap();
        assert_eq!(restarted.document.as_deref(), Some("Only paragraph on page two."));
        match restarted.metadata {
            Metadata::PdfText {
                page, chunk_index, ..
            } => {
                assert_eq!(page, 2);
                assert_eq!(chunk_index, 0);
            }
            other => panic!("unexpected metadata: {other:?}"),
        }
    }

    #[tokio::test]
    async fn structural_pdf_failure_aborts_ingestion() {
        let h = harness_with(None, Err("xref table is corrupt"), 1, DocIdPolicy::Random);
        let result = h
            .ingestor
            .ingest_upload(upload(b"garbage", "application/pdf", "corrupt.pdf"))
            .await;

        assert!(matches!(result, Err(IngestError::Extraction(_))));
        assert_eq!(h.store.len(Collection::Text).await, 0);
        assert_eq!(h.store.len(Collection::Image).await, 0);
    }

    #[tokio::test]
    async fn random_policy_never_overwrites_previous_ingestions() {
        let h = harness();
        let body = b"one\n\ntwo";
        let first = h.ingestor.ingest_upload(upload(body, "", "a.txt")).await.unwrap();
        let second = h.ingestor.ingest_upload(upload(body, "", "a.txt")).await.unwrap();

        assert_ne!(first.doc_id(), second.doc_id());
        assert_eq!(h.store.len(Collection::Text).await, 4);
    }

    #[tokio::test]
    async fn content_hash_policy_overwrites_in_place() {
        let h = harness_with(None, Ok(Vec::new()), 0, DocIdPolicy::ContentHash);
        let body = b"one\n\ntwo";
        let first = h.ingestor.ingest_upload(upload(body, "", "a.txt")).await.unwrap();
        let second = h.ingestor.ingest_upload(upload(body, "", "b.txt")).await.unwrap();

        assert_eq!(first.doc_id(), digest_bytes(body));
        assert_eq!(first.doc_id(), second.doc_id());
        assert_eq!(h.store.len(Collection::Text).await, 2);
    }

    #[tokio::test]
    async fn folder_ingestion_skips_failures() -> Result<(), Box<dyn std::error::Error>> {
        let h = harness();
        let inbox = h.root.join("inbox");
        fs::create_dir_all(&inbox)?;
        fs::write(inbox.join("good.txt"), b"alpha\n\nbeta")?;
        fs::write(inbox.join("empty.txt"), b"   ")?;

        let batch = h.ingestor.ingest_folder_best_effort(&inbox).await?;

        assert_eq!(batch.ingested.len(), 1);
        assert_eq!(batch.skipped.len(), 1);
        assert_eq!(
            batch.skipped[0].path.file_name().and_then(|name| name.to_str()),
            Some("empty.txt")
        );
        Ok(())
    }

    #[tokio::test]
    async fn same_named_files_keep_their_own_bytes() -> Result<(), Box<dyn std::error::Error>> {
        let h = harness();
        let inbox = h.root.join("inbox");
        fs::create_dir_all(inbox.join("a"))?;
        fs::create_dir_all(inbox.join("b"))?;
        fs::write(inbox.join("a/notes.txt"), b"alpha paragraph")?;
        fs::write(inbox.join("b/notes.txt"), b"beta paragraph")?;

        let batch = h.ingestor.ingest_folder_best_effort(&inbox).await?;
        assert_eq!(batch.ingested.len(), 2);

        for ingested in &batch.ingested {
            let doc_id = ingested.report.doc_id();
            let stored = h
                .store
                .get(Collection::Text, &format!("txt::{doc_id}::c0"))
                .await
                .ok_or("missing chunk")?;
            let persisted = fs::read_to_string(&stored.metadata.origin().source_path)?;
            assert_eq!(Some(persisted.as_str()), stored.document.as_deref());
            assert_eq!(persisted, fs::read_to_string(&ingested.path)?);
        }
        Ok(())
    }

    #[tokio::test]
    async fn same_named_pdfs_render_into_separate_directories() {
        let h = harness_with(None, Ok(Vec::new()), 1, DocIdPolicy::Random);
        let first = h
            .ingestor
            .ingest_upload(upload(b"%PDF-1.4 first", "", "scan.pdf"))
            .await
            .unwrap();
        let second = h
            .ingestor
            .ingest_upload(upload(b"%PDF-1.4 second", "", "scan.pdf"))
            .await
            .unwrap();

        let mut image_paths = Vec::new();
        for report in [&first, &second] {
            let id = format!("pdfimg::{}::p1::page1.png", report.doc_id());
            let stored = h.store.get(Collection::Image, &id).await.unwrap();
            image_paths.push(stored.metadata.image_path().unwrap().to_string());
        }
        assert_ne!(image_paths[0], image_paths[1]);
    }

    #[tokio::test]
    async fn folder_without_supported_files_is_rejected(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let h = harness();
        let inbox = h.root.join("inbox");
        fs::create_dir_all(&inbox)?;
        fs::write(inbox.join("notes.md"), b"# heading")?;

        let result = h.ingestor.ingest_folder_best_effort(&inbox).await;
        assert!(matches!(result, Err(IngestError::InvalidArgument(_))));
        Ok(())
    }
}
