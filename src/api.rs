//! HTTP surface for the document vault.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /documents` – Multipart upload. Each file runs the full ingestion pipeline
//!   (classify, rename, extract, embed, index) and the response reports a per-file
//!   outcome: the completed document or the failure reason with the failed row's id.
//! - `POST /search` – Semantic search: query expansion, vector retrieval, LLM
//!   reranking, and tie-breaking.
//! - `GET /documents` – Page through completed documents, newest first.
//! - `GET /documents/:id` – Fetch one document record, whatever its status.
//! - `GET /documents/:id/content` – Serve the stored file inline for previews.
//! - `DELETE /documents/:id` – Remove the document everywhere: index entry, stored
//!   file, and database row.
//! - `GET /metrics` – Observe ingestion and search counters.

use crate::index::VectorIndex;
use crate::ingest::{IngestionService, UploadedFile};
use crate::metrics::ServiceMetrics;
use crate::search::{SearchRequest, SearchService};
use crate::store::{
    DocType, Document, DocumentStore, FileStore, PageParams, ProcessingStatus, StoreError,
};
use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Shared handles passed to every request handler.
#[derive(Clone)]
pub struct AppState {
    /// Ingestion pipeline runner.
    pub ingestion: Arc<IngestionService>,
    /// Search pipeline runner.
    pub search: Arc<SearchService>,
    /// Document record repository.
    pub store: DocumentStore,
    /// On-disk file storage.
    pub files: FileStore,
    /// Vector index handle, used directly for deletes.
    pub index: Arc<dyn VectorIndex>,
    /// Service counters.
    pub metrics: Arc<ServiceMetrics>,
    /// Maximum rows per browse page.
    pub max_page_size: i64,
}

/// Build the HTTP router exposing the document API surface.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/documents", post(upload_documents).get(list_documents))
        .route("/documents/:id", get(get_document).delete(delete_document))
        .route("/documents/:id/content", get(get_document_content))
        .route("/search", post(run_search))
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

/// Per-file outcome inside the `POST /documents` response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadOutcome {
    /// Id of the resulting row: completed or failed. `None` when the failure happened
    /// before a row existed.
    doc_id: Option<Uuid>,
    /// Filename as received in the multipart part.
    original_file_name: String,
    /// Terminal pipeline status for this file.
    status: ProcessingStatus,
    /// Failure reason, present on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    /// The full record, present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    document: Option<Document>,
}

/// Response body for `POST /documents`.
#[derive(Serialize)]
struct UploadResponse {
    documents: Vec<UploadOutcome>,
}

/// Ingest every file in the multipart body, strictly in order.
///
/// One file failing does not stop the rest; the response carries an outcome per file.
async fn upload_documents(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut uploads: Vec<UploadedFile> = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(format!("Malformed multipart body: {err}")))?
    {
        let file_name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "upload".to_string());
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|err| AppError::BadRequest(format!("Failed to read upload: {err}")))?;
        if bytes.is_empty() {
            continue;
        }
        uploads.push(UploadedFile {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
    }

    if uploads.is_empty() {
        return Err(AppError::BadRequest(
            "No files were provided in the request".to_string(),
        ));
    }

    let mut documents = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let original_file_name = upload.file_name.clone();
        match state.ingestion.ingest(upload).await {
            Ok(document) => documents.push(UploadOutcome {
                doc_id: Some(document.id),
                original_file_name,
                status: ProcessingStatus::Completed,
                error: None,
                document: Some(document),
            }),
            Err(failure) => documents.push(UploadOutcome {
                doc_id: failure.doc_id,
                original_file_name,
                status: ProcessingStatus::Failed,
                error: Some(failure.error.to_string()),
                document: None,
            }),
        }
    }

    Ok(Json(UploadResponse { documents }))
}

/// Request body for the `POST /search` endpoint.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchBody {
    /// Raw user query, in any language.
    query: String,
    /// Optional result count, clamped server-side.
    #[serde(default)]
    top_k: Option<usize>,
    /// Optional neighbor offset for paging.
    #[serde(default)]
    offset: Option<usize>,
    /// Optional document type filter; overrides the expansion's inference.
    #[serde(default)]
    doc_type: Option<String>,
}

/// Run one semantic search.
async fn run_search(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> Result<Response, AppError> {
    if body.query.trim().is_empty() {
        return Err(AppError::BadRequest("Query must not be empty".to_string()));
    }

    let request = SearchRequest {
        query: body.query,
        top_k: body.top_k,
        offset: body.offset.unwrap_or(0),
        doc_type: body
            .doc_type
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(DocType::normalize),
    };
    let response = state.search.search(request).await.map_err(internal)?;
    state.metrics.record_search();
    Ok(Json(response).into_response())
}

/// Query parameters for `GET /documents`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageQuery {
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_page_size")]
    page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    50
}

/// Response body for `GET /documents`.
#[derive(Serialize)]
struct DocumentPage {
    results: Vec<Document>,
    pagination: Pagination,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    page: i64,
    page_size: i64,
    total_count: i64,
    total_pages: i64,
}

/// Page through completed documents, newest first.
async fn list_documents(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<DocumentPage>, AppError> {
    let params = PageParams::clamp(query.page, query.page_size, state.max_page_size);
    let (results, total_count) = state.store.list_completed(params).await.map_err(internal)?;
    Ok(Json(DocumentPage {
        results,
        pagination: Pagination {
            page: params.page,
            page_size: params.page_size,
            total_count,
            total_pages: total_pages(total_count, params.page_size),
        },
    }))
}

/// Fetch one document record.
async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Document>, AppError> {
    let document = state.store.get(id).await?;
    Ok(Json(document))
}

/// Serve the stored file bytes inline.
async fn get_document_content(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let document = state.store.get(id).await?;
    let bytes = tokio::fs::read(&document.file_path)
        .await
        .map_err(|_| AppError::NotFound)?;

    let disposition = format!("inline; filename=\"{}\"", document.stored_file_name);
    Ok((
        [
            (header::CONTENT_TYPE, document.mime_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// Delete a document everywhere: vector index entry, stored file, database row.
///
/// The index delete must succeed before anything local is touched; a dangling index
/// entry pointing at a deleted row is worse than a row without a vector. The file
/// delete is best-effort.
async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let document = state.store.get(id).await?;

    state.index.delete(&[id]).await.map_err(internal)?;

    if let Err(err) = state
        .files
        .delete(std::path::Path::new(&document.file_path))
        .await
    {
        tracing::warn!(document_id = %id, error = %err, "Stored file could not be removed");
    }

    if !state.store.delete(id).await.map_err(internal)? {
        return Err(AppError::NotFound);
    }
    tracing::info!(document_id = %id, "Document deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Return the service counters.
async fn get_metrics(State(state): State<AppState>) -> Json<crate::metrics::MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

fn total_pages(total_count: i64, page_size: i64) -> i64 {
    if total_count == 0 {
        0
    } else {
        (total_count + page_size - 1) / page_size
    }
}

/// Errors surfaced to HTTP clients.
enum AppError {
    /// The request itself is unusable.
    BadRequest(String),
    /// The referenced document does not exist.
    NotFound,
    /// A downstream dependency failed.
    Internal(String),
}

fn internal(err: impl std::fmt::Display) -> AppError {
    AppError::Internal(err.to_string())
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::NotFound,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::NotFound => (StatusCode::NOT_FOUND, "Document not found".to_string()),
            Self::Internal(message) => {
                tracing::error!(error = %message, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::total_pages;

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 50), 0);
        assert_eq!(total_pages(1, 50), 1);
        assert_eq!(total_pages(50, 50), 1);
        assert_eq!(total_pages(51, 50), 2);
        assert_eq!(total_pages(101, 50), 3);
    }
}
