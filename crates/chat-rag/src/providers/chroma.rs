//! ChromaDB vector store over its REST API

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::error::{Error, Result};
use crate::types::{QueryMatch, StoredDocument};

use super::vector_store::VectorStoreProvider;

/// Vector store backed by a ChromaDB server
///
/// The collection is created on first use (get-or-create by name) and its id cached.
pub struct ChromaVectorStore {
    client: Client,
    base_url: String,
    collection_name: String,
    collection_id: OnceCell<String>,
}

#[derive(Serialize)]
struct CreateCollectionRequest<'a> {
    name: &'a str,
    get_or_create: bool,
}

#[derive(Deserialize)]
struct CollectionResponse {
    id: String,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    ids: [&'a str; 1],
    embeddings: [&'a [f32]; 1],
    documents: [&'a str; 1],
    metadatas: [&'a HashMap<String, Value>; 1],
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query_embeddings: [&'a [f32]; 1],
    n_results: usize,
    include: [&'static str; 3],
}

/// Body of a collection query (one row per query embedding)
#[derive(Debug, Deserialize)]
pub struct ChromaQueryResponse {
    pub ids: Vec<Vec<String>>,
    #[serde(default)]
    pub documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    pub distances: Option<Vec<Vec<f32>>>,
    #[serde(default)]
    pub metadatas: Option<Vec<Vec<Option<HashMap<String, Value>>>>>,
}

#[derive(Serialize)]
struct GetRequest<'a> {
    ids: [&'a str; 1],
    include: [&'static str; 1],
}

#[derive(Deserialize)]
struct GetResponse {
    ids: Vec<String>,
    #[serde(default)]
    metadatas: Option<Vec<Option<HashMap<String, Value>>>>,
}

impl ChromaQueryResponse {
    /// Flatten the first result row into matches
    ///
    /// Missing documents become empty strings; a missing distance is an error,
    /// since filtering depends on it.
    pub fn into_matches(self) -> Result<Vec<QueryMatch>> {
        let ids = self.ids.into_iter().next().unwrap_or_default();
        let documents = self
            .documents
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();
        let distances = self
            .distances
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();
        let metadatas = self
            .metadatas
            .and_then(|m| m.into_iter().next())
            .unwrap_or_default();

        if distances.len() != ids.len() {
            return Err(Error::vector_store(format!(
                "Chroma returned {} ids but {} distances",
                ids.len(),
                distances.len()
            )));
        }

        let mut documents = documents.into_iter();
        let mut metadatas = metadatas.into_iter();

        Ok(ids
            .into_iter()
            .zip(distances)
            .map(|(id, distance)| QueryMatch {
                id,
                content: documents.next().flatten().unwrap_or_default(),
                distance,
                metadata: metadatas.next().flatten().unwrap_or_default(),
            })
            .collect())
    }
}

impl ChromaVectorStore {
    /// Create a client for `collection` on the server at `base_url`
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection_name: collection.into(),
            collection_id: OnceCell::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    async fn collection_id(&self) -> Result<&str> {
        let id = self
            .collection_id
            .get_or_try_init(|| async {
                let response = self
                    .client
                    .post(self.url("/collections"))
                    .json(&CreateCollectionRequest {
                        name: &self.collection_name,
                        get_or_create: true,
                    })
                    .send()
                    .await
                    .map_err(|e| Error::vector_store(format!("Chroma request failed: {}", e)))?;

                let collection: CollectionResponse = Self::check(response).await?.json().await?;
                tracing::info!(
                    "Using Chroma collection '{}' ({})",
                    self.collection_name,
                    collection.id
                );
                Ok::<_, Error>(collection.id)
            })
            .await?;
        Ok(id.as_str())
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(Error::vector_store(format!("Chroma error: HTTP {} - {}", status, body)))
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| Error::vector_store(format!("Chroma request failed: {}", e)))?;
        Self::check(response).await
    }
}

#[async_trait]
impl VectorStoreProvider for ChromaVectorStore {
    async fn upsert(&self, document: StoredDocument) -> Result<()> {
        let id = self.collection_id().await?;
        let request = UpsertRequest {
            ids: [document.id.as_str()],
            embeddings: [document.embedding.as_slice()],
            documents: [document.content.as_str()],
            metadatas: [&document.metadata],
        };
        self.post(&format!("/collections/{}/upsert", id), &request).await?;
        Ok(())
    }

    async fn query(&self, embedding: &[f32], n_results: usize) -> Result<Vec<QueryMatch>> {
        let id = self.collection_id().await?;
        let request = QueryRequest {
            query_embeddings: [embedding],
            n_results,
            include: ["documents", "distances", "metadatas"],
        };
        let response: ChromaQueryResponse = self
            .post(&format!("/collections/{}/query", id), &request)
            .await?
            .json()
            .await?;
        response.into_matches()
    }

    async fn content_hash(&self, doc_id: &str) -> Result<Option<String>> {
        let id = self.collection_id().await?;
        let request = GetRequest {
            ids: [doc_id],
            include: ["metadatas"],
        };
        let response: GetResponse = self
            .post(&format!("/collections/{}/get", id), &request)
            .await?
            .json()
            .await?;

        if response.ids.is_empty() {
            return Ok(None);
        }
        let hash = response
            .metadatas
            .and_then(|m| m.into_iter().next().flatten())
            .and_then(|m| m.get("content_hash").and_then(|v| v.as_str()).map(str::to_string))
            .unwrap_or_default();
        Ok(Some(hash))
    }

    async fn len(&self) -> Result<usize> {
        let id = self.collection_id().await?;
        let response = self
            .client
            .get(self.url(&format!("/collections/{}/count", id)))
            .send()
            .await
            .map_err(|e| Error::vector_store(format!("Chroma request failed: {}", e)))?;
        Ok(Self::check(response).await?.json::<usize>().await?)
    }

    async fn health_check(&self) -> Result<bool> {
        match self.client.get(self.url("/heartbeat")).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "chroma"
    }
}
