#![deny(missing_docs)]

//! Core library for the docvault document archive server.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Vector index client abstraction and Chroma adapter.
pub mod index;
/// Document ingestion pipeline.
pub mod ingest;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and search counters.
pub mod metrics;
/// Text/vision oracle abstraction and Gemini adapter.
pub mod oracle;
/// Semantic search orchestration: expansion, retrieval, reranking.
pub mod search;
/// Document records and uploaded file storage.
pub mod store;
