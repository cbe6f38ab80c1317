use crate::error::StoreError;
use crate::models::Modality;
use crate::units::Metadata;
use async_trait::async_trait;

/// One of the two independently maintained indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Text-encoder embedding space.
    Text,
    /// Joint text/image embedding space.
    Image,
}

impl Collection {
    pub fn for_modality(modality: Modality) -> Self {
        match modality {
            Modality::Text => Self::Text,
            Modality::Image => Self::Image,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionNames {
    pub text: String,
    pub image: String,
}

impl CollectionNames {
    pub fn name(&self, collection: Collection) -> &str {
        match collection {
            Collection::Text => &self.text,
            Collection::Image => &self.image,
        }
    }
}

impl Default for CollectionNames {
    fn default() -> Self {
        Self {
            text: "documents_text".to_string(),
            image: "documents_image".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
    /// Literal chunk content; text units only.
    pub document: Option<String>,
}

impl UnitRecord {
    pub fn new(metadata: Metadata, embedding: Vec<f32>, document: Option<String>) -> Self {
        Self {
            id: metadata.unit_id(),
            embedding,
            metadata,
            document,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreHit {
    pub id: String,
    /// Cosine distance; smaller is closer.
    pub distance: f64,
    pub metadata: Metadata,
    pub document: Option<String>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Creates the collection if missing, using cosine distance.
    async fn ensure_collection(
        &self,
        collection: Collection,
        dimensions: usize,
    ) -> Result<(), StoreError>;

    /// Inserts or overwrites by `id`.
    async fn upsert(
        &self,
        collection: Collection,
        records: &[UnitRecord],
    ) -> Result<(), StoreError>;

    /// Up to `k` nearest units, ascending by distance.
    async fn query(
        &self,
        collection: Collection,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<StoreHit>, StoreError>;
}

/// A unit belongs to the collection of its modality and never the other one.
pub fn check_collection(collection: Collection, records: &[UnitRecord]) -> Result<(), StoreError> {
    match records
        .iter()
        .find(|record| {
            Collection::for_modality(record.metadata.file_type().modality()) != collection
        })
    {
        Some(record) => Err(StoreError::Request(format!(
            "unit {} of type {} does not belong in the {:?} collection",
            record.id,
            record.metadata.file_type(),
            collection
        ))),
        None => Ok(()),
    }
}
