//! Vector index abstraction.
//!
//! The nearest-neighbor store is consumed through the [`VectorIndex`] trait so the
//! ingestion and search pipelines can be exercised against in-memory fakes. The concrete
//! Chroma adapter lives in [`chroma`].

pub mod chroma;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub use chroma::ChromaService;

/// Errors returned while interacting with the vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid index URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Index responded with an unexpected status code.
    #[error("Unexpected index response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from the index.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// One nearest-neighbor hit returned by a query.
#[derive(Debug, Clone)]
pub struct Neighbor {
    /// Identifier stored with the vector (the document id).
    pub id: String,
    /// Distance reported by the index; similarity is `1 - distance`.
    pub distance: f64,
}

impl Neighbor {
    /// Parse the stored id back into a document id. Entries written by this service
    /// always parse; anything else in the collection is skipped by callers.
    pub fn id_as_uuid(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.id).ok()
    }
}

/// Interface implemented by nearest-neighbor stores.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the vector stored under `id`.
    ///
    /// Upsert semantics make re-ingestion of the same document idempotent: the index never
    /// holds more than one entry per document id.
    async fn upsert(
        &self,
        id: Uuid,
        vector: Vec<f32>,
        text: Option<&str>,
        metadata: Value,
    ) -> Result<(), IndexError>;

    /// Return up to `n_results` nearest neighbors for `vector`, skipping the first
    /// `offset` hits client-side.
    ///
    /// The index has no server-side offset, so implementations over-fetch
    /// `n_results + offset` and discard the prefix. `contains` is a best-effort
    /// text-contains filter over the stored document text.
    async fn query(
        &self,
        vector: Vec<f32>,
        n_results: usize,
        offset: usize,
        contains: Option<&str>,
    ) -> Result<Vec<Neighbor>, IndexError>;

    /// Remove the vectors stored under `ids`.
    async fn delete(&self, ids: &[Uuid]) -> Result<(), IndexError>;
}
