use crate::error::EmbedError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use url::Url;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;
pub const DEFAULT_THUMBNAIL_SIDE: u32 = 16;

/// Encoders for the two embedding spaces. All returned vectors are L2-normalized.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Text-only space.
    async fn embed_text(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Text side of the joint text/image space.
    async fn embed_joint_text(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Image side of the joint text/image space.
    async fn embed_joint_image(&self, image: &RgbImage) -> Result<Vec<f32>, EmbedError>;

    fn text_dimensions(&self) -> usize;

    fn joint_dimensions(&self) -> usize;
}

pub trait Embedder {
    fn dimensions(&self) -> usize;
    fn embed(&self, text: &str) -> Vec<f32>;
}

#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        // Inputs shorter than one trigram hash as a single token.
        let tokens = if chars.len() < 3 {
            vec![lowered.clone()]
        } else {
            chars
                .windows(3)
                .map(|window| window.iter().collect::<String>())
                .collect()
        };

        for token in tokens {
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        l2_normalize(&mut vector);
        vector
    }
}

/// Grayscale thumbnail of `side x side` pixels, flattened.
#[derive(Debug, Clone, Copy)]
pub struct ThumbnailImageEmbedder {
    pub side: u32,
}

impl Default for ThumbnailImageEmbedder {
    fn default() -> Self {
        Self {
            side: DEFAULT_THUMBNAIL_SIDE,
        }
    }
}

impl ThumbnailImageEmbedder {
    pub fn dimensions(&self) -> usize {
        (self.side.max(1) * self.side.max(1)) as usize
    }

    pub fn embed(&self, image: &RgbImage) -> Vec<f32> {
        let side = self.side.max(1);
        let gray = imageops::grayscale(image);
        let thumbnail = imageops::resize(&gray, side, side, FilterType::Triangle);

        // +1 keeps all-black images off the zero vector.
        let mut vector = thumbnail
            .pixels()
            .map(|pixel| (f32::from(pixel.0[0]) + 1.0) / 256.0)
            .collect::<Vec<_>>();
        l2_normalize(&mut vector);
        vector
    }
}

pub fn l2_normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

/// Deterministic in-process encoders. They keep both spaces dimensionally
/// consistent but carry no semantic text/image alignment.
#[derive(Debug, Clone, Copy)]
pub struct LocalEmbeddingProvider {
    text: CharacterNgramEmbedder,
    joint_text: CharacterNgramEmbedder,
    joint_image: ThumbnailImageEmbedder,
}

impl LocalEmbeddingProvider {
    pub fn new(text_dimensions: usize, thumbnail_side: u32) -> Self {
        let joint_image = ThumbnailImageEmbedder {
            side: thumbnail_side,
        };
        Self {
            text: CharacterNgramEmbedder {
                dimensions: text_dimensions,
            },
            joint_text: CharacterNgramEmbedder {
                dimensions: joint_image.dimensions(),
            },
            joint_image,
        }
    }
}

impl Default for LocalEmbeddingProvider {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_THUMBNAIL_SIDE)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn embed_text(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|text| self.text.embed(text)).collect())
    }

    async fn embed_joint_text(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|text| self.joint_text.embed(text)).collect())
    }

    async fn embed_joint_image(&self, image: &RgbImage) -> Result<Vec<f32>, EmbedError> {
        Ok(self.joint_image.embed(image))
    }

    fn text_dimensions(&self) -> usize {
        self.text.dimensions()
    }

    fn joint_dimensions(&self) -> usize {
        self.joint_image.dimensions()
    }
}

#[derive(Debug, Serialize)]
struct TextEmbedRequest<'a> {
    inputs: &'a [String],
}

#[derive(Debug, Serialize)]
struct ImageEmbedRequest {
    image_base64: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Client for a model server exposing `/embed/text`, `/embed/joint/text` and
/// `/embed/joint/image`.
pub struct HttpEmbeddingProvider {
    base: Url,
    client: Client,
    text_dimensions: usize,
    joint_dimensions: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(
        endpoint: &str,
        text_dimensions: usize,
        joint_dimensions: usize,
    ) -> Result<Self, EmbedError> {
        let mut base = Url::parse(endpoint)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            base,
            client: Client::new(),
            text_dimensions,
            joint_dimensions,
        })
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        route: &str,
        body: &T,
        expected: usize,
        dimensions: usize,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        let response = self
            .client
            .post(self.base.join(route)?)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EmbedError::BackendResponse {
                backend: route.to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: EmbedResponse = response.json().await?;
        if parsed.embeddings.len() != expected {
            return Err(EmbedError::CountMismatch {
                expected,
                actual: parsed.embeddings.len(),
            });
        }

        if let Some(vector) = parsed.embeddings.iter().find(|vector| vector.len() != dimensions) {
            return Err(EmbedError::DimensionMismatch {
                expected: dimensions,
                actual: vector.len(),
            });
        }

        Ok(parsed
            .embeddings
            .into_iter()
            .map(|mut vector| {
                l2_normalize(&mut vector);
                vector
            })
            .collect())
    }

    async fn post_texts(
        &self,
        route: &str,
        texts: &[String],
        dimensions: usize,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.post(route, &TextEmbedRequest { inputs: texts }, texts.len(), dimensions)
            .await
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_text(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.post_texts("embed/text", texts, self.text_dimensions)
            .await
    }

    async fn embed_joint_text(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.post_texts("embed/joint/text", texts, self.joint_dimensions)
            .await
    }

    async fn embed_joint_image(&self, image: &RgbImage) -> Result<Vec<f32>, EmbedError> {
        let image = image.clone();
        let png = tokio::task::spawn_blocking(move || encode_png(&image))
            .await
            .map_err(|error| EmbedError::ImageEncoding(error.to_string()))??;

        let request = ImageEmbedRequest {
            image_base64: STANDARD.encode(png),
        };
        let mut vectors = self
            .post("embed/joint/image", &request, 1, self.joint_dimensions)
            .await?;
        vectors.pop().ok_or(EmbedError::CountMismatch {
            expected: 1,
            actual: 0,
        })
    }

    fn text_dimensions(&self) -> usize {
        self.text_dimensions
    }

    fn joint_dimensions(&self) -> usize {
        self.joint_dimensions
    }
}

pub(crate) fn encode_png(image: &RgbImage) -> Result<Vec<u8>, EmbedError> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|error| EmbedError::ImageEncoding(error.to_string()))?;
    Ok(buffer.into_inner())
}
