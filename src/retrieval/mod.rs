//! Retrieval-augmented context: vector store seam and the `retrieve_context` tool.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::error::{Result, TurnstileError};
use crate::provider::Embedder;
use crate::tools::{Tool, ToolArguments, ToolContext, ToolOutput, ToolParameters};

/// A retrievable chunk of text with metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Equality filter over document metadata; every entry must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter(pub Map<String, Value>);

impl MetadataFilter {
    pub fn eq(key: impl Into<String>, value: Value) -> Self {
        let mut map = Map::new();
        map.insert(key.into(), value);
        Self(map)
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.0
            .iter()
            .all(|(key, expected)| document.metadata.get(key) == Some(expected))
    }
}

/// Vector index consumed as an opaque service.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, vector: Vec<f32>, document: Document) -> Result<()>;
    /// Top `k` documents by descending similarity.
    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<(Document, f32)>>;
}

/// Brute-force cosine similarity store for tests and small corpora.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    entries: RwLock<Vec<(Vec<f32>, Document)>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, vector: Vec<f32>, document: Document) -> Result<()> {
        let mut entries = self.entries.write().await;
        match entries.iter_mut().find(|(_, doc)| doc.id == document.id) {
            Some(slot) => *slot = (vector, document),
            None => entries.push((vector, document)),
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<(Document, f32)>> {
        let entries = self.entries.read().await;
        let mut scored: Vec<(Document, f32)> = entries
            .iter()
            .filter(|(_, doc)| filter.map_or(true, |f| f.matches(doc)))
            .map(|(vector, doc)| (doc.clone(), cosine_similarity(query, vector)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        Ok(scored)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Embed documents and load them into a store.
pub async fn index_documents(
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    documents: Vec<Document>,
) -> Result<usize> {
    let texts: Vec<String> = documents.iter().map(|doc| doc.content.clone()).collect();
    let vectors = embedder.embed(&texts).await?;
    if vectors.len() != documents.len() {
        return Err(TurnstileError::provider(
            "embedder",
            format!("expected {} embeddings, got {}", documents.len(), vectors.len()),
        ));
    }
    let count = documents.len();
    for (vector, document) in vectors.into_iter().zip(documents) {
        store.upsert(vector, document).await?;
    }
    Ok(count)
}

/// Tool that retrieves the top-k documents for a query and renders them as
/// `Source: {metadata}\nContent: {content}` blocks.
pub struct RetrieveContextTool {
    name: String,
    description: String,
    parameters: ToolParameters,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    filter: Option<MetadataFilter>,
}

impl RetrieveContextTool {
    pub const DEFAULT_K: i64 = 2;

    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            name: "retrieve_context".into(),
            description: "Retrieve information to help answer a query.".into(),
            parameters: ToolParameters::object()
                .string("query", "What to search for", true)
                .integer("k", "How many documents to return", false)
                .default_value("k", Value::from(Self::DEFAULT_K))
                .build(),
            embedder,
            store,
            filter: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

#[async_trait]
impl Tool for RetrieveContextTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    async fn execute(&self, args: &ToolArguments, ctx: &ToolContext) -> Result<ToolOutput> {
        let query = args.get_str("query")?;
        let k = usize::try_from(args.get_i64("k").unwrap_or(Self::DEFAULT_K)).unwrap_or(0);
        let mut vectors = self.embedder.embed(&[query.to_string()]).await?;
        let Some(vector) = vectors.pop() else {
            return Err(TurnstileError::provider("embedder", "no embedding returned"));
        };
        let hits = self.store.search(&vector, k, self.filter.as_ref()).await?;
        tracing::debug!(
            thread_id = %ctx.thread_id,
            tool = %self.name,
            hits = hits.len(),
            "retrieved context"
        );
        let rendered = hits
            .iter()
            .map(|(doc, _)| {
                format!(
                    "Source: {}\nContent: {}",
                    Value::Object(doc.metadata.clone()),
                    doc.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(ToolOutput::value(rendered))
    }
}
