use crate::error::StoreError;
use crate::store::{
    check_collection, Collection, CollectionNames, StoreHit, UnitRecord, VectorStore,
};
use crate::units::Metadata;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

const BACKEND: &str = "qdrant";

/// Qdrant over its REST API. Unit IDs are strings, Qdrant point IDs must be
/// UUIDs or integers, so each point is keyed by a UUIDv5 of the unit ID and
/// carries the original in its payload.
pub struct QdrantStore {
    endpoint: String,
    collections: CollectionNames,
    client: Client,
}

impl QdrantStore {
    pub fn new(endpoint: impl Into<String>, collections: CollectionNames) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            collections,
            client: Client::new(),
        }
    }

    fn collection_url(&self, collection: Collection) -> String {
        format!(
            "{}/collections/{}",
            self.endpoint,
            self.collections.name(collection)
        )
    }
}

pub fn point_id(unit_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, unit_id.as_bytes())
}

fn point_payload(record: &UnitRecord) -> Result<Value, StoreError> {
    Ok(json!({
        "unit_id": record.id,
        "document": record.document,
        "metadata": serde_json::to_value(&record.metadata)?,
    }))
}

fn parse_hit(hit: &Value) -> Result<StoreHit, StoreError> {
    let id = hit
        .pointer("/payload/unit_id")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::BackendResponse {
            backend: BACKEND.to_string(),
            details: format!("point without unit_id: {hit}"),
        })?
        .to_string();

    let metadata = hit
        .pointer("/payload/metadata")
        .cloned()
        .unwrap_or(Value::Null);
    let metadata: Metadata =
        serde_json::from_value(metadata).map_err(|error| StoreError::Decode {
            id: id.clone(),
            details: error.to_string(),
        })?;

    // Cosine collections report similarity; callers work in distance.
    let similarity = hit
        .pointer("/score")
        .and_then(Value::as_f64)
        .ok_or_else(|| StoreError::BackendResponse {
            backend: BACKEND.to_string(),
            details: format!("point {id} without score"),
        })?;
    let document = hit
        .pointer("/payload/document")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(StoreHit {
        id,
        distance: 1.0 - similarity,
        metadata,
        document,
    })
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(
        &self,
        collection: Collection,
        dimensions: usize,
    ) -> Result<(), StoreError> {
        let url = self.collection_url(collection);
        let existing = self.client.get(&url).send().await?;

        if existing.status().is_success() {
            let info: Value = existing.json().await?;
            let size = info
                .pointer("/result/config/params/vectors/size")
                .and_then(Value::as_u64);
            return match size {
                Some(size) if size as usize != dimensions => Err(StoreError::Request(format!(
                    "collection {} has vector size {size}, embeddings have {dimensions}",
                    self.collections.name(collection)
                ))),
                _ => Ok(()),
            };
        }

        if existing.status() != StatusCode::NOT_FOUND {
            return Err(StoreError::BackendResponse {
                backend: BACKEND.to_string(),
                details: existing.status().to_string(),
            });
        }

        let response = self
            .client
            .put(&url)
            .json(&json!({
                "vectors": { "size": dimensions, "distance": "Cosine" },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StoreError::BackendResponse {
                backend: BACKEND.to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }

    async fn upsert(
        &self,
        collection: Collection,
        records: &[UnitRecord],
    ) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        check_collection(collection, records)?;

        let points = records
            .iter()
            .map(|record| {
                Ok(json!({
                    "id": point_id(&record.id).to_string(),
                    "vector": record.embedding,
                    "payload": point_payload(record)?,
                }))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url(collection)))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StoreError::BackendResponse {
                backend: BACKEND.to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }

    async fn query(
        &self,
        collection: Collection,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<StoreHit>, StoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url(collection)))
            .json(&json!({
                "vector": vector,
                "limit": k,
                "with_payload": true,
            }))
            .send()
            .await?;

        // A collection nobody has written to yet simply has no neighbours.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        if !response.status().is_success() {
            return Err(StoreError::BackendResponse {
                backend: BACKEND.to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .map(|hits| hits.iter().map(parse_hit).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}
