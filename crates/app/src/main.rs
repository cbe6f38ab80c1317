use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use multimodal_rag_core::{
    Collection, CollectionNames, DocIdPolicy, EmbeddingProvider, HttpEmbeddingProvider,
    IngestionOptions, IngestionServices, Ingestor, LocalEmbeddingProvider, LopdfExtractor,
    PdftoppmRasterizer, QdrantStore, RemoteOcrRecognizer, SearchCoordinator, SearchQuery,
    TesseractRecognizer, TextRecognizer, VectorStore, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_RENDER_SCALE, DEFAULT_THUMBNAIL_SIDE, DEFAULT_TOP_K,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "multimodal-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Collection holding text-encoder vectors
    #[arg(long, env = "TEXT_COLLECTION", default_value = "documents_text")]
    text_collection: String,

    /// Collection holding joint text/image vectors
    #[arg(long, env = "IMAGE_COLLECTION", default_value = "documents_image")]
    image_collection: String,

    /// Embedding server base URL; local encoders are used when unset
    #[arg(long, env = "EMBEDDING_URL")]
    embedding_url: Option<String>,

    /// Dimension of the text embedding space
    #[arg(long, env = "TEXT_DIMENSIONS", default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    text_dimensions: usize,

    /// Dimension of the joint embedding space served by the embedding server
    #[arg(long, env = "JOINT_DIMENSIONS", default_value_t = 512)]
    joint_dimensions: usize,

    /// Thumbnail side length for the local image encoder
    #[arg(long, env = "THUMBNAIL_SIDE", default_value_t = DEFAULT_THUMBNAIL_SIDE)]
    thumbnail_side: u32,

    /// Where raw uploads are persisted
    #[arg(long, env = "UPLOAD_DIR", default_value = "data/uploads")]
    upload_dir: PathBuf,

    /// Where rendered PDF pages are written
    #[arg(long, env = "EXTRACTED_DIR", default_value = "data/extracted")]
    extracted_dir: PathBuf,

    /// Page render scale relative to 72 DPI
    #[arg(long, env = "RENDER_SCALE", default_value_t = DEFAULT_RENDER_SCALE)]
    render_scale: f32,

    /// How document identifiers are assigned
    #[arg(long, env = "DOC_ID_POLICY", value_enum, default_value_t = DocIds::Random)]
    doc_id_policy: DocIds,

    /// Tesseract executable
    #[arg(long, env = "TESSERACT_CMD", default_value = "tesseract")]
    tesseract_cmd: String,

    /// pdftoppm executable
    #[arg(long, env = "PDFTOPPM_CMD", default_value = "pdftoppm")]
    pdftoppm_cmd: String,

    /// Remote OCR endpoint; local tesseract is used when unset
    #[arg(long, env = "OCR_ENDPOINT")]
    ocr_endpoint: Option<String>,

    /// Bearer token for the remote OCR endpoint
    #[arg(long, env = "OCR_API_KEY", hide_env_values = true)]
    ocr_api_key: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum DocIds {
    /// New identifier per upload
    Random,
    /// SHA-256 of the uploaded bytes
    ContentHash,
}

impl From<DocIds> for DocIdPolicy {
    fn from(value: DocIds) -> Self {
        match value {
            DocIds::Random => DocIdPolicy::Random,
            DocIds::ContentHash => DocIdPolicy::ContentHash,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a text, image or PDF file, or every supported file in a folder.
    Upload {
        /// File or folder to ingest.
        #[arg(long)]
        path: PathBuf,
        /// Declared media type; the file extension is used when it is not recognized.
        #[arg(long, default_value = "")]
        content_type: String,
    },
    /// Search both collections and print merged, attributed results.
    Query {
        /// Search query
        #[arg(long)]
        query: String,
        /// Number of results to return.
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
    /// Report service liveness.
    Health,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn build_embedder(cli: &Cli) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    Ok(match &cli.embedding_url {
        Some(url) => Arc::new(
            HttpEmbeddingProvider::new(url, cli.text_dimensions, cli.joint_dimensions)
                .with_context(|| format!("invalid embedding url {url}"))?,
        ),
        None => Arc::new(LocalEmbeddingProvider::new(
            cli.text_dimensions,
            cli.thumbnail_side,
        )),
    })
}

fn build_recognizer(cli: &Cli) -> Arc<dyn TextRecognizer> {
    match &cli.ocr_endpoint {
        Some(endpoint) => Arc::new(RemoteOcrRecognizer::new(
            endpoint.clone(),
            cli.ocr_api_key.clone(),
        )),
        None => Arc::new(TesseractRecognizer::new(cli.tesseract_cmd.clone())),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let embedder = build_embedder(&cli)?;
    let store: Arc<dyn VectorStore> = Arc::new(QdrantStore::new(
        cli.qdrant_url.clone(),
        CollectionNames {
            text: cli.text_collection.clone(),
            image: cli.image_collection.clone(),
        },
    ));
    let coordinator = SearchCoordinator::new(embedder.clone(), store.clone());

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "multimodal-rag boot"
    );

    match &cli.command {
        Command::Upload { path, content_type } => {
            store
                .ensure_collection(Collection::Text, embedder.text_dimensions())
                .await?;
            store
                .ensure_collection(Collection::Image, embedder.joint_dimensions())
                .await?;

            let services = IngestionServices {
                embedder: embedder.clone(),
                store: store.clone(),
                recognizer: build_recognizer(&cli),
                pdf_text: Arc::new(LopdfExtractor),
                rasterizer: Arc::new(PdftoppmRasterizer::new(cli.pdftoppm_cmd.clone())),
            };
            let options = IngestionOptions {
                upload_dir: cli.upload_dir.clone(),
                extracted_dir: cli.extracted_dir.clone(),
                render_scale: cli.render_scale,
                doc_id_policy: cli.doc_id_policy.into(),
            };
            let ingestor = Ingestor::new(services, options)?;

            if path.is_dir() {
                let batch = ingestor.ingest_folder_best_effort(path).await?;
                if !batch.skipped.is_empty() {
                    warn!(
                        skipped = batch.skipped.len(),
                        folder = %path.display(),
                        "some uploads were skipped"
                    );
                }
                print_json(&batch)?;
            } else {
                let report = ingestor
                    .ingest_path(path, content_type)
                    .await
                    .with_context(|| format!("failed to ingest {}", path.display()))?;
                print_json(&report)?;
            }
        }
        Command::Query { query, top_k } => {
            let response = coordinator
                .search(&SearchQuery::new(query.clone()).with_top_k(*top_k))
                .await?;
            print_json(&response)?;
        }
        Command::Health => print_json(&coordinator.health())?,
    }

    Ok(())
}
