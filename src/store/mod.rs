//! Document records persisted in SQLite, plus on-disk file storage.
//!
//! One row exists per uploaded file. The row is inserted with status `Processing` before
//! any oracle call, mutated by staged updates as the pipeline advances, and reaches a
//! terminal `Completed` or `Failed` status exactly once. Readers must tolerate partially
//! populated rows: a record with `doc_type` set but no extracted data is a legitimate
//! in-flight state.

pub mod files;

use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

pub use files::{FileStore, FileStoreError, StoredFile};

/// Errors returned by the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite operation failed.
    #[error("Database request failed: {0}")]
    Database(#[from] sqlx::Error),
    /// The requested document id does not exist.
    #[error("Document {0} not found")]
    NotFound(Uuid),
}

/// Canonical document categories produced by classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocType {
    /// An invoice with line items and payment details.
    Invoice,
    /// A point-of-sale receipt.
    Receipt,
    /// A flight ticket or boarding pass.
    #[serde(rename = "Flight Ticket")]
    FlightTicket,
    /// An order confirmation for an online purchase.
    #[serde(rename = "Order Confirmation")]
    OrderConfirmation,
    /// Anything that does not match the categories above.
    Other,
}

impl DocType {
    /// Canonical label used in prompts, filenames, and API responses.
    pub fn label(self) -> &'static str {
        match self {
            Self::Invoice => "Invoice",
            Self::Receipt => "Receipt",
            Self::FlightTicket => "Flight Ticket",
            Self::OrderConfirmation => "Order Confirmation",
            Self::Other => "Other",
        }
    }

    /// Map free-text oracle output onto the canonical enum; unrecognized values become
    /// [`DocType::Other`].
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "invoice" => Self::Invoice,
            "receipt" => Self::Receipt,
            "flight_ticket" | "flight ticket" | "ticket" => Self::FlightTicket,
            "order_confirmation" | "order confirmation" => Self::OrderConfirmation,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for DocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle state of one document's ingestion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessingStatus {
    /// The pipeline has not yet reached a terminal state.
    Processing,
    /// All stages finished and the document is indexed.
    Completed,
    /// A stage failed; `error_message` carries the reason.
    Failed,
}

impl ProcessingStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "Processing",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "Completed" => Self::Completed,
            "Failed" => Self::Failed,
            _ => Self::Processing,
        }
    }
}

/// One row per uploaded file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Opaque unique identifier, assigned at intake, never changed. Join key with the
    /// vector index entry.
    pub id: Uuid,
    /// Filename supplied by the uploader.
    pub original_file_name: String,
    /// Current on-disk filename; mutated once, at rename.
    pub stored_file_name: String,
    /// Absolute or root-relative path of the stored file.
    pub file_path: String,
    /// MIME type recorded at intake.
    pub mime_type: String,
    /// Size of the stored file in bytes.
    pub file_size: i64,
    /// Canonical category; `None` until classification completes.
    pub doc_type: Option<DocType>,
    /// Classification confidence in `[0, 1]`; `None` until classified.
    pub classification_confidence: Option<f64>,
    /// Oracle-suggested descriptive name; `None` until classified.
    pub better_name: Option<String>,
    /// Structured extraction output as raw JSON text; `None` until extraction.
    pub extracted_data_json: Option<String>,
    /// Free-text description used for embedding; `None` until extraction.
    pub description: Option<String>,
    /// Pipeline state; terminal once `Completed` or `Failed`.
    pub processing_status: ProcessingStatus,
    /// Failure reason recorded when the pipeline marks the document failed.
    pub error_message: Option<String>,
    /// RFC3339 timestamp set when the vector was indexed.
    pub embedded_at: Option<String>,
    /// RFC3339 intake timestamp.
    pub created_at: String,
    /// RFC3339 timestamp of the latest staged update.
    pub updated_at: String,
}

/// Pagination parameters already clamped into valid ranges.
#[derive(Debug, Clone, Copy)]
pub struct PageParams {
    /// 1-based page number.
    pub page: i64,
    /// Number of rows per page.
    pub page_size: i64,
}

impl PageParams {
    /// Clamp raw client input: `page` is forced to at least 1 and `page_size` into
    /// `1..=max_page_size`.
    pub fn clamp(page: i64, page_size: i64, max_page_size: i64) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, max_page_size.max(1)),
        }
    }
}

/// Current UTC time formatted as RFC3339.
pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// SQLite-backed repository of document records.
#[derive(Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    /// Open (creating if missing) the database at `path` and ensure the schema exists.
    pub async fn connect(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|err| StoreError::Database(sqlx::Error::Io(err)))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(sqlx::Error::from)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        init_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Open an in-memory database. Intended for tests.
    pub async fn connect_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(sqlx::Error::from)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        init_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Insert a freshly intaken document row.
    pub async fn insert(&self, document: &Document) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO documents (
                id, original_file_name, stored_file_name, file_path, mime_type, file_size,
                doc_type, classification_confidence, better_name, extracted_data_json,
                description, processing_status, error_message, embedded_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(document.id.to_string())
        .bind(&document.original_file_name)
        .bind(&document.stored_file_name)
        .bind(&document.file_path)
        .bind(&document.mime_type)
        .bind(document.file_size)
        .bind(document.doc_type.map(DocType::label))
        .bind(document.classification_confidence)
        .bind(&document.better_name)
        .bind(&document.extracted_data_json)
        .bind(&document.description)
        .bind(document.processing_status.as_str())
        .bind(&document.error_message)
        .bind(&document.embedded_at)
        .bind(&document.created_at)
        .bind(&document.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist the classification stage output together with the post-rename path.
    ///
    /// Path, type, confidence, and name land in one statement so classification state is
    /// never partially visible.
    pub async fn apply_classification(
        &self,
        id: Uuid,
        stored_file_name: &str,
        file_path: &str,
        doc_type: DocType,
        confidence: f64,
        better_name: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE documents SET
                stored_file_name = ?, file_path = ?, doc_type = ?,
                classification_confidence = ?, better_name = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(stored_file_name)
        .bind(file_path)
        .bind(doc_type.label())
        .bind(confidence)
        .bind(better_name)
        .bind(now_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist the extraction stage output.
    pub async fn apply_extraction(
        &self,
        id: Uuid,
        extracted_data_json: &str,
        description: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE documents SET extracted_data_json = ?, description = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(extracted_data_json)
        .bind(description)
        .bind(now_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark the document completed with its embedding timestamp. Terminal.
    pub async fn mark_completed(&self, id: Uuid, embedded_at: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE documents SET embedded_at = ?, processing_status = 'Completed', updated_at = ?
             WHERE id = ?",
        )
        .bind(embedded_at)
        .bind(now_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark the document failed with the error text. Terminal.
    pub async fn mark_failed(&self, id: Uuid, error_message: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE documents SET processing_status = 'Failed', error_message = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(error_message)
        .bind(now_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch one document, failing with [`StoreError::NotFound`] when absent.
    pub async fn get(&self, id: Uuid) -> Result<Document, StoreError> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ? LIMIT 1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| map_row(&row)).ok_or(StoreError::NotFound(id))
    }

    /// Fetch all documents matching the supplied ids. Missing ids are silently skipped.
    pub async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Document>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!("SELECT * FROM documents WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(map_row).collect())
    }

    /// List completed documents, newest first, plus the total completed count.
    ///
    /// In-flight and failed documents are not browsable.
    pub async fn list_completed(
        &self,
        params: PageParams,
    ) -> Result<(Vec<Document>, i64), StoreError> {
        let total: i64 =
            sqlx::query("SELECT COUNT(*) AS n FROM documents WHERE processing_status = 'Completed'")
                .fetch_one(&self.pool)
                .await?
                .get("n");

        let rows = sqlx::query(
            "SELECT * FROM documents WHERE processing_status = 'Completed'
             ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(params.page_size)
        .bind((params.page - 1) * params.page_size)
        .fetch_all(&self.pool)
        .await?;

        Ok((rows.iter().map(map_row).collect(), total))
    }

    /// Delete one document row. Returns `false` when the id was absent.
    pub async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

async fn init_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            original_file_name TEXT NOT NULL,
            stored_file_name TEXT NOT NULL,
            file_path TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            doc_type TEXT,
            classification_confidence REAL,
            better_name TEXT,
            extracted_data_json TEXT,
            description TEXT,
            processing_status TEXT NOT NULL,
            error_message TEXT,
            embedded_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_status_created
         ON documents (processing_status, created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn map_row(row: &SqliteRow) -> Document {
    let id: String = row.get("id");
    let status: String = row.get("processing_status");
    let doc_type: Option<String> = row.get("doc_type");

    Document {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        original_file_name: row.get("original_file_name"),
        stored_file_name: row.get("stored_file_name"),
        file_path: row.get("file_path"),
        mime_type: row.get("mime_type"),
        file_size: row.get("file_size"),
        doc_type: doc_type.map(|value| DocType::normalize(&value)),
        classification_confidence: row.get("classification_confidence"),
        better_name: row.get("better_name"),
        extracted_data_json: row.get("extracted_data_json"),
        description: row.get("description"),
        processing_status: ProcessingStatus::parse(&status),
        error_message: row.get("error_message"),
        embedded_at: row.get("embedded_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Build a bare Processing-status document for tests.
    pub(crate) fn new_document(id: Uuid, original_file_name: &str) -> Document {
        let now = now_rfc3339();
        Document {
            id,
            original_file_name: original_file_name.to_string(),
            stored_file_name: format!("{}.pdf", id.simple()),
            file_path: format!("/tmp/{}.pdf", id.simple()),
            mime_type: "application/pdf".to_string(),
            file_size: 1024,
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
        }
    }
}
