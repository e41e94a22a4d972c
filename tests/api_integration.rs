//! End-to-end tests of the HTTP surface over in-memory fakes.
//!
//! The oracle and vector index are scripted fakes; the document store and file store
//! are real, backed by an in-memory database and a temp directory.

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use docvault::api::{AppState, create_router};
use docvault::index::{IndexError, Neighbor, VectorIndex};
use docvault::ingest::IngestionService;
use docvault::metrics::ServiceMetrics;
use docvault::oracle::{EmbeddingIntent, Oracle, OracleError};
use docvault::search::{SearchOptions, SearchService};
use docvault::store::{DocumentStore, FileStore};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

/// Answers every pipeline prompt with plausible fixed output.
struct ScriptedOracle;

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        if prompt.contains("search query assistant") {
            return Ok(json!({
                "englishQuery": "grocery receipt",
                "expandedEnglishQuery": "grocery receipt supermarket purchase",
                "docType": null
            })
            .to_string());
        }
        // Rerank scoring.
        Ok(json!({ "docId": "any", "relevancy": 0.8 }).to_string())
    }

    async fn generate_vision(
        &self,
        prompt: &str,
        _image: &[u8],
        _mime_type: &str,
    ) -> Result<String, OracleError> {
        if prompt.starts_with("Classify") {
            Ok(json!({ "docType": "Receipt", "confidence": 0.95 }).to_string())
        } else if prompt.contains("suggest a short descriptive filename") {
            Ok(json!({ "betterName": "rema 1000 groceries" }).to_string())
        } else if prompt.starts_with("Extract structured") {
            Ok(json!({ "storeName": "REMA 1000", "total": 125.0 }).to_string())
        } else {
            Ok(json!({ "description": "A grocery receipt from REMA 1000" }).to_string())
        }
    }

    async fn embed(&self, _text: &str, _intent: EmbeddingIntent) -> Result<Vec<f32>, OracleError> {
        Ok(vec![0.1, 0.2, 0.3])
    }
}

/// Vector index that remembers upserted ids and replays them as neighbors.
#[derive(Default)]
struct MemoryIndex {
    ids: Mutex<Vec<Uuid>>,
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(
        &self,
        id: Uuid,
        _vector: Vec<f32>,
        _text: Option<&str>,
        _metadata: Value,
    ) -> Result<(), IndexError> {
        let mut ids = self.ids.lock().expect("lock");
        if !ids.contains(&id) {
            ids.push(id);
        }
        Ok(())
    }

    async fn query(
        &self,
        _vector: Vec<f32>,
        n_results: usize,
        offset: usize,
        _contains: Option<&str>,
    ) -> Result<Vec<Neighbor>, IndexError> {
        let ids = self.ids.lock().expect("lock");
        Ok(ids
            .iter()
            .enumerate()
            .map(|(position, id)| Neighbor {
                id: id.to_string(),
                distance: 0.1 + position as f64 * 0.1,
            })
            .skip(offset)
            .take(n_results)
            .collect())
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<(), IndexError> {
        self.ids.lock().expect("lock").retain(|id| !ids.contains(id));
        Ok(())
    }
}

async fn test_app() -> (Router, TempDir) {
    let dir = TempDir::new().expect("tempdir");
    let store = DocumentStore::connect_in_memory().await.expect("store");
    let files = FileStore::new(dir.path().to_path_buf());
    let oracle: Arc<dyn Oracle> = Arc::new(ScriptedOracle);
    let index: Arc<dyn VectorIndex> = Arc::new(MemoryIndex::default());
    let metrics = Arc::new(ServiceMetrics::new());

    let state = AppState {
        ingestion: Arc::new(IngestionService::new(
            oracle.clone(),
            index.clone(),
            store.clone(),
            files.clone(),
            metrics.clone(),
        )),
        search: Arc::new(SearchService::new(
            oracle,
            index.clone(),
            store.clone(),
            SearchOptions {
                default_top_k: 50,
                max_top_k: 100,
                rerank_concurrency: 4,
                tie_break_epsilon: 1e-4,
                tie_break_min_score: 0.0,
            },
        )),
        store,
        files,
        index,
        metrics,
        max_page_size: 100,
    };
    (create_router(state), dir)
}

const BOUNDARY: &str = "test-boundary-7a0f";

fn multipart_upload(file_name: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"files\"; filename=\"{file_name}\"\r\n\
             Content-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/documents")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request")
}

fn json_request(method: Method, uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request")
}

fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn upload_runs_the_pipeline_to_completion() {
    let (app, _dir) = test_app().await;

    let response = app
        .oneshot(multipart_upload("IMG_2041.jpg", "image/jpeg", b"jpeg bytes"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let outcome = &body["documents"][0];
    assert_eq!(outcome["originalFileName"], "IMG_2041.jpg");
    assert_eq!(outcome["status"], "Completed");
    let document = &outcome["document"];
    assert_eq!(outcome["docId"], document["id"]);
    assert_eq!(document["processingStatus"], "Completed");
    assert_eq!(document["docType"], "Receipt");
    assert_eq!(document["classificationConfidence"], 0.95);
    assert_eq!(document["betterName"], "rema 1000 groceries");
    assert!(document["embeddedAt"].is_string());
    assert!(
        document["storedFileName"]
            .as_str()
            .expect("name")
            .starts_with("receipt-")
    );
}

#[tokio::test]
async fn upload_without_files_is_rejected() {
    let (app, _dir) = test_app().await;

    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    let request = Request::builder()
        .method(Method::POST)
        .uri("/documents")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request");

    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn uploaded_document_is_browsable_and_previewable() {
    let (app, _dir) = test_app().await;

    let response = app
        .clone()
        .oneshot(multipart_upload("receipt.jpg", "image/jpeg", b"preview me"))
        .await
        .expect("response");
    let body = json_body(response).await;
    let id = body["documents"][0]["document"]["id"]
        .as_str()
        .expect("id")
        .to_string();

    let listing = app
        .clone()
        .oneshot(empty_request(Method::GET, "/documents"))
        .await
        .expect("response");
    assert_eq!(listing.status(), StatusCode::OK);
    let listing = json_body(listing).await;
    assert_eq!(listing["pagination"]["totalCount"], 1);
    assert_eq!(listing["pagination"]["totalPages"], 1);
    assert_eq!(listing["results"][0]["id"], id.as_str());

    let fetched = app
        .clone()
        .oneshot(empty_request(Method::GET, &format!("/documents/{id}")))
        .await
        .expect("response");
    assert_eq!(fetched.status(), StatusCode::OK);

    let content = app
        .oneshot(empty_request(Method::GET, &format!("/documents/{id}/content")))
        .await
        .expect("response");
    assert_eq!(content.status(), StatusCode::OK);
    assert_eq!(
        content.headers()["content-type"].to_str().expect("header"),
        "image/jpeg"
    );
    assert!(
        content.headers()["content-disposition"]
            .to_str()
            .expect("header")
            .starts_with("inline;")
    );
    let bytes = to_bytes(content.into_body(), usize::MAX)
        .await
        .expect("bytes");
    assert_eq!(&bytes[..], b"preview me");
}

#[tokio::test]
async fn browse_clamps_pagination_input() {
    let (app, _dir) = test_app().await;

    let response = app
        .oneshot(empty_request(Method::GET, "/documents?page=0&pageSize=500"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let pagination = &body["pagination"];
    assert_eq!(pagination["page"], 1);
    assert_eq!(pagination["pageSize"], 100);
    assert_eq!(pagination["totalCount"], 0);
    assert_eq!(pagination["totalPages"], 0);
}

#[tokio::test]
async fn unknown_document_id_is_404() {
    let (app, _dir) = test_app().await;
    let id = Uuid::new_v4();

    for uri in [format!("/documents/{id}"), format!("/documents/{id}/content")] {
        let response = app
            .clone()
            .oneshot(empty_request(Method::GET, &uri))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }

    let response = app
        .oneshot(empty_request(Method::DELETE, &format!("/documents/{id}")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn search_returns_scored_hits_for_indexed_documents() {
    let (app, _dir) = test_app().await;

    let upload = app
        .clone()
        .oneshot(multipart_upload("receipt.jpg", "image/jpeg", b"bytes"))
        .await
        .expect("response");
    let upload = json_body(upload).await;
    let id = upload["documents"][0]["document"]["id"]
        .as_str()
        .expect("id")
        .to_string();

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/search",
            json!({ "query": "kvittering matvarer" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["query"], "kvittering matvarer");
    assert_eq!(body["expandedQuery"], "grocery receipt supermarket purchase");
    let hit = &body["results"][0];
    assert_eq!(hit["docId"], id.as_str());
    assert_eq!(hit["betterName"], "rema 1000 groceries");
    assert_eq!(hit["docType"], "Receipt");
    assert_eq!(hit["rerank"], 0.8);
    assert_eq!(hit["previewUrl"], format!("/documents/{id}/content"));
    // distance 0.1 from the fake index
    assert!((hit["similarity"].as_f64().expect("similarity") - 0.9).abs() < 1e-9);
}

#[tokio::test]
async fn blank_search_query_is_rejected() {
    let (app, _dir) = test_app().await;

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/search",
            json!({ "query": "   " }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_removes_row_file_and_index_entry() {
    let (app, _dir) = test_app().await;

    let upload = app
        .clone()
        .oneshot(multipart_upload("receipt.jpg", "image/jpeg", b"bytes"))
        .await
        .expect("response");
    let upload = json_body(upload).await;
    let document = &upload["documents"][0]["document"];
    let id = document["id"].as_str().expect("id").to_string();
    let file_path = document["filePath"].as_str().expect("path").to_string();

    let response = app
        .clone()
        .oneshot(empty_request(Method::DELETE, &format!("/documents/{id}")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert!(tokio::fs::metadata(&file_path).await.is_err());
    let fetched = app
        .clone()
        .oneshot(empty_request(Method::GET, &format!("/documents/{id}")))
        .await
        .expect("response");
    assert_eq!(fetched.status(), StatusCode::NOT_FOUND);

    // The index no longer replays the id, so search comes back empty.
    let search = app
        .oneshot(json_request(
            Method::POST,
            "/search",
            json!({ "query": "receipt" }),
        ))
        .await
        .expect("response");
    let search = json_body(search).await;
    assert_eq!(search["results"].as_array().expect("array").len(), 0);
}

#[tokio::test]
async fn metrics_count_ingests_and_searches() {
    let (app, _dir) = test_app().await;

    app.clone()
        .oneshot(multipart_upload("receipt.jpg", "image/jpeg", b"bytes"))
        .await
        .expect("response");
    app.clone()
        .oneshot(json_request(
            Method::POST,
            "/search",
            json!({ "query": "receipt" }),
        ))
        .await
        .expect("response");

    let response = app
        .oneshot(empty_request(Method::GET, "/metrics"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["documentsIngested"], 1);
    assert_eq!(body["documentsFailed"], 0);
    assert_eq!(body["searchesRun"], 1);
}
