use crate::error::StoreError;
use crate::store::{check_collection, Collection, StoreHit, UnitRecord, VectorStore};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct CollectionState {
    dimensions: Option<usize>,
    records: HashMap<String, UnitRecord>,
}

impl CollectionState {
    fn check_dimensions(&self, id: &str, len: usize) -> Result<(), StoreError> {
        match self.dimensions {
            Some(dimensions) if dimensions != len => Err(StoreError::Request(format!(
                "vector for {id} has dimension {len}, collection expects {dimensions}"
            ))),
            _ => Ok(()),
        }
    }
}

/// Brute-force cosine search held in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, CollectionState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, collection: Collection) -> usize {
        self.collections
            .read()
            .await
            .get(&collection)
            .map_or(0, |state| state.records.len())
    }

    pub async fn get(&self, collection: Collection, id: &str) -> Option<UnitRecord> {
        self.collections
            .read()
            .await
            .get(&collection)
            .and_then(|state| state.records.get(id).cloned())
    }
}

fn cosine_distance(left: &[f32], right: &[f32]) -> f64 {
    let dot = left
        .iter()
        .zip(right)
        .map(|(a, b)| f64::from(*a) * f64::from(*b))
        .sum::<f64>();
    let left_norm = left.iter().map(|a| f64::from(*a).powi(2)).sum::<f64>().sqrt();
    let right_norm = right.iter().map(|b| f64::from(*b).powi(2)).sum::<f64>().sqrt();

    if left_norm == 0.0 || right_norm == 0.0 {
        return 1.0;
    }
    1.0 - dot / (left_norm * right_norm)
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn ensure_collection(
        &self,
        collection: Collection,
        dimensions: usize,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let state = collections.entry(collection).or_default();
        match state.dimensions {
            Some(existing) if existing != dimensions => Err(StoreError::Request(format!(
                "{collection:?} collection has dimension {existing}, requested {dimensions}"
            ))),
            _ => {
                state.dimensions = Some(dimensions);
                Ok(())
            }
        }
    }

    async fn upsert(
        &self,
        collection: Collection,
        records: &[UnitRecord],
    ) -> Result<(), StoreError> {
        check_collection(collection, records)?;

        let mut collections = self.collections.write().await;
        let state = collections.entry(collection).or_default();
        for record in records {
            state.check_dimensions(&record.id, record.embedding.len())?;
        }
        for record in records {
            state.records.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: Collection,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<StoreHit>, StoreError> {
        let collections = self.collections.read().await;
        let Some(state) = collections.get(&collection) else {
            return Ok(Vec::new());
        };
        state.check_dimensions("query", vector.len())?;

        let mut hits = state
            .records
            .values()
            .map(|record| StoreHit {
                id: record.id.clone(),
                distance: cosine_distance(vector, &record.embedding),
                metadata: record.metadata.clone(),
                document: record.document.clone(),
            })
            .collect::<Vec<_>>();

        hits.sort_by(|left, right| {
            left.distance
                .total_cmp(&right.distance)
                .then_with(|| left.id.cmp(&right.id))
        });
        hits.truncate(k);
        Ok(hits)
    }
}
