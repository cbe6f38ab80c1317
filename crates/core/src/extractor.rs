use crate::error::IngestError;
use async_trait::async_trait;
use lopdf::Document;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

/// Points per inch of an unscaled PDF page.
const PDF_BASE_DPI: f32 = 72.0;
const RENDER_PREFIX: &str = "render";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub page: u32,
    pub path: PathBuf,
}

/// Native text layer, one entry per page in page order. Image-only pages
/// are reported with empty text.
#[async_trait]
pub trait PdfTextExtractor: Send + Sync {
    async fn extract_per_page(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

/// Renders every page to a PNG under `output_dir`, in page order.
#[async_trait]
pub trait PdfRasterizer: Send + Sync {
    async fn render_pages(
        &self,
        path: &Path,
        scale: f32,
        output_dir: &Path,
    ) -> Result<Vec<RenderedPage>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

#[async_trait]
impl PdfTextExtractor for LopdfExtractor {
    async fn extract_per_page(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || extract_with_lopdf(&path)).await?
    }
}

fn extract_with_lopdf(path: &Path) -> Result<Vec<PageText>, IngestError> {
    let document = Document::load(path).map_err(|error| {
        IngestError::Extraction(format!("{}: {error}", path.display()))
    })?;

    let mut pages = Vec::new();
    for (page_no, _page_id) in document.get_pages() {
        let text = match document.extract_text(&[page_no]) {
            Ok(text) => text.trim().to_string(),
            Err(error) => {
                warn!(
                    path = %path.display(),
                    page = page_no,
                    %error,
                    "page has no extractable text layer"
                );
                String::new()
            }
        };
        pages.push(PageText {
            number: page_no,
            text,
        });
    }

    debug!(path = %path.display(), pages = pages.len(), "extracted pdf text layer");
    Ok(pages)
}

/// Rasterizes with poppler's `pdftoppm`.
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    command: String,
}

impl PdftoppmRasterizer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for PdftoppmRasterizer {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

#[async_trait]
impl PdfRasterizer for PdftoppmRasterizer {
    async fn render_pages(
        &self,
        path: &Path,
        scale: f32,
        output_dir: &Path,
    ) -> Result<Vec<RenderedPage>, IngestError> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(IngestError::InvalidArgument(format!(
                "render scale must be positive, got {scale}"
            )));
        }

        tokio::fs::create_dir_all(output_dir).await?;
        let dpi = (PDF_BASE_DPI * scale).round() as u32;

        // pdftoppm writes into a per-call scratch directory so only this run's
        // outputs are collected.
        let scratch = tempfile::Builder::new()
            .prefix(".render")
            .tempdir_in(output_dir)?;

        let output = Command::new(&self.command)
            .arg("-png")
            .arg("-r")
            .arg(dpi.to_string())
            .arg(path)
            .arg(scratch.path().join(RENDER_PREFIX))
            .output()
            .await
            .map_err(|error| {
                IngestError::Extraction(format!("failed to run {}: {error}", self.command))
            })?;

        if !output.status.success() {
            return Err(IngestError::Extraction(format!(
                "{} exited with {} for {}: {}",
                self.command,
                output.status,
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let mut pages = Vec::new();
        let mut entries = tokio::fs::read_dir(scratch.path()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(page) = file_name.to_str().and_then(rendered_page_number) else {
                continue;
            };

            let target = output_dir.join(format!("page{page}.png"));
            tokio::fs::rename(entry.path(), &target).await?;
            pages.push(RenderedPage { page, path: target });
        }

        pages.sort_by_key(|rendered| rendered.page);
        debug!(path = %path.display(), pages = pages.len(), dpi, "rendered pdf pages");
        Ok(pages)
    }
}

/// Page number of a `pdftoppm` output such as `render-1.png` or `render-007.png`.
fn rendered_page_number(file_name: &str) -> Option<u32> {
    let stem = file_name.strip_suffix(".png")?;
    let number = stem.strip_prefix(RENDER_PREFIX)?.strip_prefix('-')?;
    number.parse().ok()
}
