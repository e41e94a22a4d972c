//! Semantic search over ingested documents.
//!
//! A search runs one fixed flow: expand the query, embed the expanded form, pull
//! nearest neighbors from the vector index, rerank every candidate with the oracle,
//! and break a tie at the top when one exists. Only the embedding step is allowed to
//! fail the search; expansion, reranking, and tie-breaking all degrade.

mod expand;
mod rerank;

pub use expand::QueryExpansion;

use crate::config::Config;
use crate::index::{IndexError, Neighbor, VectorIndex};
use crate::oracle::{EmbeddingIntent, Oracle, OracleError};
use crate::store::{DocType, Document, DocumentStore, StoreError};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// A failure that prevents producing any results.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Embedding the query failed; without a vector there is nothing to search.
    #[error("Oracle call failed: {0}")]
    Oracle(#[from] OracleError),
    /// The vector index query failed.
    #[error("Vector index request failed: {0}")]
    Index(#[from] IndexError),
    /// Resolving candidate rows failed.
    #[error("Database request failed: {0}")]
    Store(#[from] StoreError),
}

/// Tuning knobs for retrieval and reranking.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Result-set size when the caller does not pass one.
    pub default_top_k: usize,
    /// Upper bound on the caller's requested size.
    pub max_top_k: usize,
    /// Maximum in-flight rerank oracle calls.
    pub rerank_concurrency: usize,
    /// Two scores within this distance count as tied.
    pub tie_break_epsilon: f64,
    /// A tie is only broken when the shared maximum is at least this.
    pub tie_break_min_score: f64,
}

impl SearchOptions {
    /// Pull the search knobs out of the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_top_k: config.search_default_top_k,
            max_top_k: config.search_max_top_k,
            rerank_concurrency: config.rerank_concurrency,
            tie_break_epsilon: config.tie_break_epsilon,
            tie_break_min_score: config.tie_break_min_score,
        }
    }
}

/// One search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// The raw user query, in any language.
    pub query: String,
    /// Requested result count, clamped to the configured maximum.
    pub top_k: Option<usize>,
    /// Number of leading neighbors to skip, for paging.
    pub offset: usize,
    /// Caller-supplied type filter; overrides anything the expansion infers.
    pub doc_type: Option<DocType>,
}

/// One scored search result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    /// Id of the matching document.
    pub doc_id: Uuid,
    /// Display name: the suggested name when present, otherwise the original filename.
    pub better_name: String,
    /// Document type label, empty when unclassified.
    pub doc_type: String,
    /// Oracle-written description, empty when extraction never ran.
    pub description: String,
    /// Vector similarity, `1 - distance`. Cosine distance runs up to 2, so this
    /// can go negative for far-away matches.
    pub similarity: f64,
    /// Oracle relevancy in `[0, 1]`.
    pub rerank: f64,
    /// Relative URL serving the stored file inline.
    pub preview_url: String,
    /// Stored MIME type.
    pub mime_type: String,
}

/// The full answer to a search request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    /// The raw query as received.
    pub query: String,
    /// The expanded English query actually embedded.
    pub expanded_query: String,
    /// Effective type filter label, if one applied.
    pub doc_type: Option<String>,
    /// Results ordered by rerank score, then similarity.
    pub results: Vec<SearchHit>,
}

struct Candidate {
    document: Document,
    similarity: f64,
    rerank_score: f64,
}

/// Runs searches over the vector index and document store.
pub struct SearchService {
    oracle: Arc<dyn Oracle>,
    index: Arc<dyn VectorIndex>,
    store: DocumentStore,
    options: SearchOptions,
}

impl SearchService {
    /// Build a new search service over the supplied capabilities.
    pub fn new(
        oracle: Arc<dyn Oracle>,
        index: Arc<dyn VectorIndex>,
        store: DocumentStore,
        options: SearchOptions,
    ) -> Self {
        Self {
            oracle,
            index,
            store,
            options,
        }
    }

    /// Run one search end to end.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse, SearchError> {
        let top_k = request
            .top_k
            .unwrap_or(self.options.default_top_k)
            .clamp(1, self.options.max_top_k);

        let expansion = expand::expand_query(self.oracle.as_ref(), &request.query).await;
        let doc_type = request.doc_type.or(expansion.doc_type);
        tracing::info!(
            query = %request.query,
            expanded = %expansion.expanded_english_query,
            doc_type = doc_type.map(|t| t.label()),
            top_k,
            "Searching"
        );

        let vector = self
            .oracle
            .embed(&expansion.expanded_english_query, EmbeddingIntent::Query)
            .await?;
        let neighbors = self
            .index
            .query(
                vector,
                top_k,
                request.offset,
                doc_type.map(DocType::label),
            )
            .await?;

        // Resolve neighbor ids to rows, dropping ids the store no longer knows.
        let ids: Vec<Uuid> = neighbors.iter().filter_map(Neighbor::id_as_uuid).collect();
        let rows = self.store.get_many(&ids).await?;
        let mut by_id: HashMap<Uuid, Document> =
            rows.into_iter().map(|doc| (doc.id, doc)).collect();
        let mut candidates: Vec<Candidate> = Vec::with_capacity(neighbors.len());
        for neighbor in &neighbors {
            let Some(id) = neighbor.id_as_uuid() else {
                continue;
            };
            let Some(document) = by_id.remove(&id) else {
                tracing::warn!(document_id = %id, "Index entry has no matching row, skipping");
                continue;
            };
            candidates.push(Candidate {
                document,
                similarity: 1.0 - neighbor.distance,
                rerank_score: 0.0,
            });
        }

        let documents: Vec<Document> = candidates.iter().map(|c| c.document.clone()).collect();
        // Scoring sees the query exactly as the user typed it; the expansion only
        // steers retrieval.
        let scores = rerank::score_candidates(
            self.oracle.clone(),
            &request.query,
            &documents,
            self.options.rerank_concurrency,
        )
        .await;
        for candidate in &mut candidates {
            candidate.rerank_score = scores.get(&candidate.document.id).copied().unwrap_or(0.0);
        }

        candidates.sort_by(|a, b| {
            b.rerank_score
                .total_cmp(&a.rerank_score)
                .then(b.similarity.total_cmp(&a.similarity))
        });

        let tie_len = tied_prefix_len(
            &candidates.iter().map(|c| c.rerank_score).collect::<Vec<_>>(),
            self.options.tie_break_epsilon,
            self.options.tie_break_min_score,
        );
        if tie_len >= 2 {
            let tied: Vec<&Document> = candidates[..tie_len]
                .iter()
                .map(|c| &c.document)
                .collect();
            if let Some(order) =
                rerank::tie_break(self.oracle.as_ref(), &request.query, &tied).await
            {
                apply_tie_order(&mut candidates, &order, tie_len);
            }
        }

        Ok(SearchResponse {
            query: request.query,
            expanded_query: expansion.expanded_english_query,
            doc_type: doc_type.map(|t| t.label().to_string()),
            results: candidates.into_iter().map(to_hit).collect(),
        })
    }
}

fn to_hit(candidate: Candidate) -> SearchHit {
    let document = candidate.document;
    SearchHit {
        doc_id: document.id,
        better_name: document
            .better_name
            .unwrap_or(document.original_file_name),
        doc_type: document
            .doc_type
            .map(|t| t.label().to_string())
            .unwrap_or_default(),
        description: document.description.unwrap_or_default(),
        similarity: candidate.similarity,
        rerank: candidate.rerank_score,
        preview_url: format!("/documents/{}/content", document.id),
        mime_type: document.mime_type,
    }
}

/// Length of the leading group sharing the maximum score, or 0 when no actionable
/// tie exists. `scores` must be sorted descending.
fn tied_prefix_len(scores: &[f64], epsilon: f64, min_score: f64) -> usize {
    let Some(&max) = scores.first() else {
        return 0;
    };
    if max < min_score {
        return 0;
    }
    let len = scores.iter().take_while(|s| max - **s <= epsilon).count();
    if len >= 2 { len } else { 0 }
}

/// Reorder the first `tie_len` candidates to match `order`, leaving the rest alone.
fn apply_tie_order(candidates: &mut [Candidate], order: &[Uuid], tie_len: usize) {
    let mut tied: HashMap<Uuid, Candidate> = candidates[..tie_len]
        .iter()
        .map(|c| {
            let taken = Candidate {
                document: c.document.clone(),
                similarity: c.similarity,
                rerank_score: c.rerank_score,
            };
            (taken.document.id, taken)
        })
        .collect();
    for (slot, id) in candidates[..tie_len].iter_mut().zip(order) {
        if let Some(candidate) = tied.remove(id) {
            *slot = candidate;
        }
    }
}
