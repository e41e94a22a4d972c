//! HTTP client wrapper for interacting with Chroma.

use crate::config::get_config;
use crate::index::{IndexError, Neighbor, VectorIndex};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

/// Lightweight HTTP client for Chroma collection operations.
pub struct ChromaService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) tenant: String,
    pub(crate) database: String,
    pub(crate) collection: String,
}

impl ChromaService {
    /// Construct a new client using configuration derived from the environment.
    pub fn new() -> Result<Self, IndexError> {
        let config = get_config();
        let client = Client::builder().user_agent("docvault/0.1").build()?;

        let base_url = normalize_base_url(&config.chroma_url).map_err(IndexError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            tenant = %config.chroma_tenant,
            database = %config.chroma_database,
            collection = %config.chroma_collection,
            "Initialized Chroma HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            tenant: config.chroma_tenant.clone(),
            database: config.chroma_database.clone(),
            collection: config.chroma_collection.clone(),
        })
    }

    fn collection_endpoint(&self, operation: &str) -> String {
        format!(
            "{}/api/v2/tenants/{}/databases/{}/collections/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.tenant,
            self.database,
            self.collection,
            operation
        )
    }

    async fn send(&self, method: Method, url: String, body: Value) -> Result<String, IndexError> {
        let response = self
            .client
            .request(method, url)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = IndexError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Chroma request failed");
            return Err(error);
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl VectorIndex for ChromaService {
    async fn upsert(
        &self,
        id: Uuid,
        vector: Vec<f32>,
        text: Option<&str>,
        metadata: Value,
    ) -> Result<(), IndexError> {
        let mut body = json!({
            "ids": [id.to_string()],
            "embeddings": [vector],
            "metadatas": [metadata],
        });
        if let Some(document) = text
            && !document.is_empty()
        {
            body.as_object_mut()
                .expect("upsert body is an object")
                .insert("documents".into(), json!([document]));
        }

        self.send(Method::POST, self.collection_endpoint("upsert"), body)
            .await?;
        tracing::debug!(document_id = %id, "Vector upserted");
        Ok(())
    }

    async fn query(
        &self,
        vector: Vec<f32>,
        n_results: usize,
        offset: usize,
        contains: Option<&str>,
    ) -> Result<Vec<Neighbor>, IndexError> {
        let mut body = json!({
            "query_embeddings": [vector],
            "include": ["distances"],
            "n_results": n_results + offset,
        });
        if let Some(filter) = contains
            && !filter.trim().is_empty()
        {
            body.as_object_mut()
                .expect("query body is an object")
                .insert("where_document".into(), json!({ "$contains": filter }));
        }

        let raw = self
            .send(Method::POST, self.collection_endpoint("query"), body)
            .await?;
        let payload: QueryResponse = serde_json::from_str(&raw).unwrap_or_default();

        let ids = payload.ids.into_iter().next().unwrap_or_default();
        let distances = payload.distances.into_iter().next().unwrap_or_default();

        let neighbors = ids
            .into_iter()
            .zip(distances)
            .skip(offset)
            .map(|(id, distance)| Neighbor { id, distance })
            .collect();
        Ok(neighbors)
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<(), IndexError> {
        if ids.is_empty() {
            return Ok(());
        }
        let body = json!({
            "ids": ids.iter().map(Uuid::to_string).collect::<Vec<_>>(),
        });
        self.send(Method::POST, self.collection_endpoint("delete"), body)
            .await?;
        tracing::debug!(count = ids.len(), "Vectors deleted");
        Ok(())
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

#[derive(Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    distances: Vec<Vec<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn test_service(base_url: String) -> ChromaService {
        ChromaService {
            client: Client::builder()
                .user_agent("docvault-test")
                .build()
                .expect("client"),
            base_url,
            tenant: "default_tenant".into(),
            database: "default_db".into(),
            collection: "documents".into(),
        }
    }

    #[tokio::test]
    async fn query_applies_client_side_offset() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path(
                    "/api/v2/tenants/default_tenant/databases/default_db/collections/documents/query",
                );
                then.status(200).json_body(json!({
                    "ids": [["a", "b", "c"]],
                    "distances": [[0.1, 0.2, 0.3]],
                }));
            })
            .await;

        let service = test_service(server.base_url());
        let neighbors = service
            .query(vec![0.5, 0.5], 2, 1, None)
            .await
            .expect("query");

        mock.assert();
        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors[0].id, "b");
        assert!((neighbors[0].distance - 0.2).abs() < f64::EPSILON);
        assert_eq!(neighbors[1].id, "c");
    }

    #[tokio::test]
    async fn upsert_posts_single_point() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path(
                    "/api/v2/tenants/default_tenant/databases/default_db/collections/documents/upsert",
                );
                then.status(200).json_body(json!({}));
            })
            .await;

        let service = test_service(server.base_url());
        service
            .upsert(
                Uuid::new_v4(),
                vec![0.1, 0.2],
                Some("canonical text"),
                json!({ "docType": "Receipt" }),
            )
            .await
            .expect("upsert");

        mock.assert();
    }

    #[tokio::test]
    async fn delete_skips_empty_id_list() {
        let server = MockServer::start_async().await;
        // No mock registered: a request would fail the test via the error path.
        let service = test_service(server.base_url());
        service.delete(&[]).await.expect("no-op delete");
    }
}
