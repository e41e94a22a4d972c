//! Document ingestion pipeline.
//!
//! One uploaded file moves through `Stored → Classified → Renamed → Extracted → Embedded →
//! Completed`, with any stage able to jump to `Failed(reason)`. The row is inserted with
//! status `Processing` before the first oracle call, so a crash mid-pipeline still leaves
//! a discoverable record. Stage failures persist the error text and stop the pipeline for
//! that file only; already-written fields are never rolled back, and nothing retries
//! automatically.

mod classify;
mod extract;

use crate::index::{IndexError, VectorIndex};
use crate::metrics::ServiceMetrics;
use crate::oracle::{EmbeddingIntent, Oracle, OracleError};
use crate::store::{
    DocType, Document, DocumentStore, FileStore, FileStoreError, ProcessingStatus, StoreError,
    files, now_rfc3339,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// One file pulled out of a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied filename.
    pub file_name: String,
    /// Client-supplied content type, if any.
    pub content_type: Option<String>,
    /// Raw file bytes.
    pub bytes: Vec<u8>,
}

/// A failure inside one document's pipeline.
#[derive(Debug, Error)]
pub enum StageError {
    /// An oracle call failed or returned an error status.
    #[error("Oracle call failed: {0}")]
    Oracle(#[from] OracleError),
    /// The vector index rejected an upsert.
    #[error("Vector index request failed: {0}")]
    Index(#[from] IndexError),
    /// File storage failed to save or rename.
    #[error("File storage failed: {0}")]
    Files(#[from] FileStoreError),
    /// A document-store write failed.
    #[error("Database request failed: {0}")]
    Store(#[from] StoreError),
    /// The oracle answered, but not in a shape the stage could use.
    #[error("Unparseable oracle output: {0}")]
    Parse(String),
}

/// Outcome of a failed ingestion, carrying the document id when a row exists.
///
/// `doc_id` is `None` only when the failure happened before the record was inserted
/// (intake-time storage errors).
#[derive(Debug, Error)]
#[error("{error}")]
pub struct IngestFailure {
    /// Id of the (now Failed) document row, when one was created.
    pub doc_id: Option<Uuid>,
    /// The stage error that stopped the pipeline.
    #[source]
    pub error: StageError,
}

/// Runs the full per-file ingestion pipeline.
///
/// Holds shared handles to the oracle, vector index, document store, and file store so
/// the HTTP surface can run many uploads through one service instance. Files within a
/// batch are processed strictly sequentially by the caller.
pub struct IngestionService {
    oracle: Arc<dyn Oracle>,
    index: Arc<dyn VectorIndex>,
    store: DocumentStore,
    files: FileStore,
    metrics: Arc<ServiceMetrics>,
}

impl IngestionService {
    /// Build a new ingestion service over the supplied capabilities.
    pub fn new(
        oracle: Arc<dyn Oracle>,
        index: Arc<dyn VectorIndex>,
        store: DocumentStore,
        files: FileStore,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            oracle,
            index,
            store,
            files,
            metrics,
        }
    }

    /// Ingest one uploaded file, returning the completed document or a failure that
    /// names the (now Failed) row when one exists.
    ///
    /// Cancelling the returned future aborts any in-flight oracle calls and leaves the
    /// document in `Processing`; callers may treat such rows as abandoned.
    pub async fn ingest(&self, upload: UploadedFile) -> Result<Document, IngestFailure> {
        let id = Uuid::new_v4();
        let now = now_rfc3339();

        let stored = self
            .files
            .save(id, &upload.file_name, upload.content_type.as_deref(), &upload.bytes)
            .await
            .map_err(|err| IngestFailure {
                doc_id: None,
                error: err.into(),
            })?;

        let mut document = Document {
            id,
            original_file_name: upload.file_name,
            stored_file_name: stored.stored_file_name,
            file_path: stored.file_path.display().to_string(),
            mime_type: stored.mime_type,
            file_size: stored.file_size,
            doc_type: None,
            classification_confidence: None,
            better_name: None,
            extracted_data_json: None,
            description: None,
            processing_status: ProcessingStatus::Processing,
            error_message: None,
            embedded_at: None,
            created_at: now.clone(),
            updated_at: now,
        };

        if let Err(err) = self.store.insert(&document).await {
            return Err(IngestFailure {
                doc_id: None,
                error: err.into(),
            });
        }

        match self.run_pipeline(&mut document, &upload.bytes).await {
            Ok(()) => {
                self.metrics.record_ingested();
                Ok(document)
            }
            Err(error) => {
                tracing::error!(document_id = %id, error = %error, "Ingestion failed");
                if let Err(mark_err) = self.store.mark_failed(id, &error.to_string()).await {
                    tracing::error!(document_id = %id, error = %mark_err, "Failed to record failure");
                }
                self.metrics.record_failed();
                Err(IngestFailure {
                    doc_id: Some(id),
                    error,
                })
            }
        }
    }

    async fn run_pipeline(
        &self,
        document: &mut Document,
        bytes: &[u8],
    ) -> Result<(), StageError> {
        let id = document.id;
        let mime = document.mime_type.clone();

        // Classification and name suggestion fan out together; both must land before any
        // classification state becomes visible.
        let name_prompt = classify::filename_prompt(&document.original_file_name);
        let (classification_raw, name_raw) = tokio::try_join!(
            self.oracle
                .generate_vision(classify::CLASSIFICATION_PROMPT, bytes, &mime),
            self.oracle.generate_vision(&name_prompt, bytes, &mime),
        )?;

        let (doc_type, confidence) =
            classify::parse_classification(&classification_raw).ok_or_else(|| {
                StageError::Parse(format!(
                    "classification response was not JSON: {classification_raw}"
                ))
            })?;
        let better_name = classify::parse_better_name(&name_raw);
        tracing::info!(document_id = %id, doc_type = %doc_type, confidence, "Document classified");

        let extension = files::extension_of(&document.stored_file_name);
        let final_name = files::compose_final_name(doc_type, &better_name, id, &extension);
        let (stored_file_name, file_path) = self
            .files
            .rename(Path::new(&document.file_path), &final_name)
            .await?;
        let file_path = file_path.display().to_string();

        self.store
            .apply_classification(id, &stored_file_name, &file_path, doc_type, confidence, &better_name)
            .await?;
        document.stored_file_name = stored_file_name;
        document.file_path = file_path;
        document.doc_type = Some(doc_type);
        document.classification_confidence = Some(confidence);
        document.better_name = Some(better_name.clone());

        let extraction_prompt = extract::extraction_prompt(doc_type);
        let (extracted_data_json, description_raw) = tokio::try_join!(
            self.oracle
                .generate_vision(&extraction_prompt, bytes, &mime),
            self.oracle
                .generate_vision(extract::DESCRIPTION_PROMPT, bytes, &mime),
        )?;
        let description = extract::parse_description(&description_raw);

        self.store
            .apply_extraction(id, &extracted_data_json, &description)
            .await?;
        document.extracted_data_json = Some(extracted_data_json.clone());
        document.description = Some(description.clone());

        let canonical = canonical_text(&better_name, doc_type, &description, &extracted_data_json);
        let vector = self
            .oracle
            .embed(&canonical, EmbeddingIntent::Document)
            .await?;
        let metadata = json!({
            "docType": doc_type.label(),
            "betterName": better_name,
            "filePath": document.file_path,
            "mimeType": document.mime_type,
            "fileSize": document.file_size,
            "createdAt": document.created_at,
        });
        self.index
            .upsert(id, vector, Some(&canonical), metadata)
            .await?;

        let embedded_at = now_rfc3339();
        self.store.mark_completed(id, &embedded_at).await?;
        document.embedded_at = Some(embedded_at);
        document.processing_status = ProcessingStatus::Completed;
        document.updated_at = now_rfc3339();
        tracing::info!(document_id = %id, "Document indexed");
        Ok(())
    }
}

/// Canonical embedding text: the concatenated name, type, description, and extracted
/// data that produces a document's index vector.
pub(crate) fn canonical_text(
    better_name: &str,
    doc_type: DocType,
    description: &str,
    extracted_data_json: &str,
) -> String {
    format!(
        "{better_name}\nDocType: {}\nDescription: {description}\nExtractedData: {extracted_data_json}",
        doc_type.label()
    )
}
