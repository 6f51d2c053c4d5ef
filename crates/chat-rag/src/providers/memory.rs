//! Ephemeral in-process vector store
//!
//! A flat scan over every stored embedding. Distances are squared Euclidean,
//! the same scale ChromaDB reports for its default `l2` space, so one distance
//! threshold works with either backend.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::types::{QueryMatch, StoredDocument};

use super::vector_store::VectorStoreProvider;

/// In-memory vector store keyed by document id
#[derive(Default)]
pub struct MemoryVectorStore {
    documents: RwLock<HashMap<String, StoredDocument>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Squared Euclidean distance
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[async_trait]
impl VectorStoreProvider for MemoryVectorStore {
    async fn upsert(&self, document: StoredDocument) -> Result<()> {
        if document.embedding.is_empty() {
            return Err(Error::vector_store(format!("Document {} has no embedding", document.id)));
        }

        let mut documents = self.documents.write();
        // Compare against another entry; the one being replaced may be the only odd one out
        let other = documents.values().find(|existing| existing.id != document.id);
        if let Some(existing) = other {
            if existing.embedding.len() != document.embedding.len() {
                return Err(Error::vector_store(format!(
                    "Embedding dimension mismatch: store has {}, document {} has {}",
                    existing.embedding.len(),
                    document.id,
                    document.embedding.len()
                )));
            }
        }
        documents.insert(document.id.clone(), document);
        Ok(())
    }

    async fn query(&self, embedding: &[f32], n_results: usize) -> Result<Vec<QueryMatch>> {
        let documents = self.documents.read();

        let mut matches = Vec::with_capacity(documents.len());
        for doc in documents.values() {
            if doc.embedding.len() != embedding.len() {
                return Err(Error::vector_store(format!(
                    "Query dimension {} does not match stored dimension {}",
                    embedding.len(),
                    doc.embedding.len()
                )));
            }
            matches.push(QueryMatch {
                id: doc.id.clone(),
                content: doc.content.clone(),
                distance: squared_l2(&doc.embedding, embedding),
                metadata: doc.metadata.clone(),
            });
        }

        matches.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(n_results);
        Ok(matches)
    }

    async fn content_hash(&self, id: &str) -> Result<Option<String>> {
        Ok(self
            .documents
            .read()
            .get(id)
            .map(|doc| doc.content_hash().unwrap_or_default().to_string()))
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.documents.read().len())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
