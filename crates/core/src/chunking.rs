use crate::error::IngestError;
use crate::models::Chunk;
use regex::Regex;

/// One or more fully blank lines. Whitespace-only lines count as blank.
const PARAGRAPH_BOUNDARY: &str = r"\n(?:[^\S\n]*\n)+";

/// Splits text into trimmed, non-empty paragraphs in their original order.
#[derive(Debug, Clone)]
pub struct ParagraphChunker {
    boundary: Regex,
}

impl ParagraphChunker {
    pub fn new() -> Result<Self, IngestError> {
        Ok(Self {
            boundary: Regex::new(PARAGRAPH_BOUNDARY)?,
        })
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let unified = text.replace("\r\n", "\n");
        self.boundary
            .split(&unified)
            .map(str::trim)
            .filter(|paragraph| !paragraph.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Chunks a whole document; `chunk_index` counts from 0.
    pub fn chunk_document(&self, text: &str) -> Vec<Chunk> {
        self.chunk(text, None)
    }

    /// Chunks one page in isolation; `chunk_index` restarts at 0 for every page.
    pub fn chunk_page(&self, page: u32, text: &str) -> Vec<Chunk> {
        self.chunk(text, Some(page))
    }

    fn chunk(&self, text: &str, page: Option<u32>) -> Vec<Chunk> {
        self.split(text)
            .into_iter()
            .zip(0u32..)
            .map(|(text, chunk_index)| Chunk {
                text,
                chunk_index,
                page,
            })
            .collect()
    }
}
