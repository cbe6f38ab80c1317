use crate::embeddings::EmbeddingProvider;
use crate::error::{EmbedError, SearchError};
use crate::models::{HealthStatus, MergedResult, Modality, QueryResponse, SearchQuery};
use crate::store::{Collection, StoreHit, VectorStore};
use std::sync::Arc;
use tracing::{debug, info};

const RELATIVE_TOLERANCE: f64 = 1e-9;

/// Fans a query out to both collections and merges the two ranked lists.
pub struct SearchCoordinator {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl SearchCoordinator {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<QueryResponse, SearchError> {
        if query.text.trim().is_empty() {
            return Err(SearchError::Request("query is empty".to_string()));
        }
        if query.top_k == 0 {
            return Err(SearchError::Request("top_k must be positive".to_string()));
        }

        let (text_hits, image_hits) = tokio::try_join!(
            self.search_leg(Modality::Text, query),
            self.search_leg(Modality::Image, query)
        )?;
        debug!(
            text_hits = text_hits.len(),
            image_hits = image_hits.len(),
            "retrieved candidates"
        );

        let results = merge_candidates(text_hits, image_hits, query.top_k);
        info!(top_k = query.top_k, results = results.len(), "query completed");

        Ok(QueryResponse {
            query: query.text.clone(),
            total_results: results.len(),
            results,
        })
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus::ok()
    }

    /// The text collection is searched with the text encoder, the image
    /// collection with the text side of the joint encoder.
    async fn search_leg(
        &self,
        modality: Modality,
        query: &SearchQuery,
    ) -> Result<Vec<StoreHit>, SearchError> {
        let input = [query.text.clone()];
        let mut vectors = match modality {
            Modality::Text => self.embedder.embed_text(&input).await?,
            Modality::Image => self.embedder.embed_joint_text(&input).await?,
        };
        let vector = vectors.pop().ok_or(EmbedError::CountMismatch {
            expected: 1,
            actual: 0,
        })?;

        Ok(self
            .store
            .query(Collection::for_modality(modality), &vector, query.top_k)
            .await?)
    }
}

fn is_close(left: f64, right: f64) -> bool {
    (left - right).abs() <= RELATIVE_TOLERANCE * left.abs().max(right.abs())
}

/// Min-max scaling into `[0, 1]`. A list whose values are all (nearly) equal
/// maps every entry to `1.0`.
pub fn normalize_scores(scores: &[f64]) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }

    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if is_close(max, min) {
        return vec![1.0; scores.len()];
    }

    scores
        .iter()
        .map(|score| (score - min) / (max - min))
        .collect()
}

fn score_modality(hits: Vec<StoreHit>, modality: Modality) -> Vec<MergedResult> {
    let similarities = hits
        .iter()
        .map(|hit| 1.0 - hit.distance)
        .collect::<Vec<_>>();
    let normalized = normalize_scores(&similarities);

    hits.into_iter()
        .zip(normalized)
        .map(|(hit, score)| {
            let (document, ocr_text) = match modality {
                Modality::Text => (hit.document, None),
                Modality::Image => (None, hit.metadata.ocr_text().map(str::to_string)),
            };
            MergedResult {
                id: hit.id,
                score,
                modality,
                document,
                source: hit.metadata.attribution(),
                ocr_text,
                metadata: hit.metadata,
            }
        })
        .collect()
}

/// Text results precede image results before a stable descending sort, so
/// equal scores keep text first.
pub fn rank_results(
    text: Vec<MergedResult>,
    image: Vec<MergedResult>,
    k: usize,
) -> Vec<MergedResult> {
    let mut merged = text;
    merged.extend(image);
    merged.sort_by(|left, right| right.score.total_cmp(&left.score));
    merged.truncate(k);
    merged
}

/// Normalizes each modality's raw store hits on its own, then ranks them
/// together.
pub fn merge_candidates(
    text_hits: Vec<StoreHit>,
    image_hits: Vec<StoreHit>,
    k: usize,
) -> Vec<MergedResult> {
    rank_results(
        score_modality(text_hits, Modality::Text),
        score_modality(image_hits, Modality::Image),
        k,
    )
}
