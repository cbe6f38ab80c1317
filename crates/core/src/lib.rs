pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod ocr;
pub mod orchestrator;
pub mod store;
pub mod stores;
pub mod units;

pub use chunking::ParagraphChunker;
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, EmbeddingProvider, HttpEmbeddingProvider,
    LocalEmbeddingProvider, ThumbnailImageEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_THUMBNAIL_SIDE,
};
pub use error::{EmbedError, IngestError, SearchError, StoreError};
pub use extractor::{
    LopdfExtractor, PageText, PdfRasterizer, PdfTextExtractor, PdftoppmRasterizer, RenderedPage,
};
pub use ingest::{
    classify, discover_uploads, IngestedUpload, IngestionBatch, IngestionServices, Ingestor,
    SkippedUpload,
};
pub use models::{
    Chunk, DocIdPolicy, Document, FileKind, HealthStatus, IngestionOptions, IngestionReport,
    MergedResult, Modality, QueryResponse, SearchQuery, Upload, DEFAULT_RENDER_SCALE,
    DEFAULT_TOP_K, SERVICE_NAME,
};
pub use ocr::{OcrOutcome, RemoteOcrRecognizer, TesseractRecognizer, TextRecognizer};
pub use orchestrator::{merge_candidates, normalize_scores, SearchCoordinator};
pub use store::{Collection, CollectionNames, StoreHit, UnitRecord, VectorStore};
pub use stores::{MemoryStore, QdrantStore};
pub use units::{DocumentOrigin, FileType, Metadata, UnitBuilder};
