//! Namespaced long-term memory handed to tools and middleware.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;

/// Hierarchical namespace, e.g. `["users"]` or `["users", "42", "prefs"]`.
pub type Namespace = Vec<String>;

/// Build a namespace from string slices.
pub fn namespace(parts: &[&str]) -> Namespace {
    parts.iter().map(|part| (*part).to_string()).collect()
}

/// A stored value with bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreItem {
    pub namespace: Namespace,
    pub key: String,
    pub value: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// Key-value capability keyed by `(namespace, key)`.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, namespace: &[String], key: &str) -> Result<Option<StoreItem>>;
    async fn put(&self, namespace: &[String], key: &str, value: serde_json::Value) -> Result<()>;
    async fn delete(&self, namespace: &[String], key: &str) -> Result<()>;
    /// Items whose namespace starts with `prefix`, ordered by namespace then key.
    async fn list(&self, prefix: &[String]) -> Result<Vec<StoreItem>>;
}

/// Shared handle to a store.
pub type SharedStore = Arc<dyn KeyValueStore>;

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    items: RwLock<HashMap<Namespace, BTreeMap<String, StoreItem>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, namespace: &[String], key: &str) -> Result<Option<StoreItem>> {
        let items = self.items.read().await;
        Ok(items.get(namespace).and_then(|bucket| bucket.get(key)).cloned())
    }

    async fn put(&self, namespace: &[String], key: &str, value: serde_json::Value) -> Result<()> {
        let item = StoreItem {
            namespace: namespace.to_vec(),
            key: key.to_string(),
            value,
            updated_at: Utc::now(),
        };
        self.items
            .write()
            .await
            .entry(namespace.to_vec())
            .or_default()
            .insert(key.to_string(), item);
        Ok(())
    }

    async fn delete(&self, namespace: &[String], key: &str) -> Result<()> {
        let mut items = self.items.write().await;
        if let Some(bucket) = items.get_mut(namespace) {
            bucket.remove(key);
            if bucket.is_empty() {
                items.remove(namespace);
            }
        }
        Ok(())
    }

    async fn list(&self, prefix: &[String]) -> Result<Vec<StoreItem>> {
        let items = self.items.read().await;
        let mut matched: Vec<StoreItem> = items
            .iter()
            .filter(|(ns, _)| ns.starts_with(prefix))
            .flat_map(|(_, bucket)| bucket.values().cloned())
            .collect();
        matched.sort_by(|a, b| (&a.namespace, &a.key).cmp(&(&b.namespace, &b.key)));
        Ok(matched)
    }
}
