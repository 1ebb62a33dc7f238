// async-btree/src/store/mem_store.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::node_store::NodeStore;
use crate::error::{Result, TreeError};
use crate::node::Node;
use crate::platform::{TreeKey, TreeValue};

pub struct InMemoryStoreInner<K, V> {
    root: Option<u64>,
    next_id: u64,
    nodes: HashMap<u64, Node<u64, K>>,
    values: HashMap<u64, V>,
}

impl<K, V> Default for InMemoryStoreInner<K, V> {
    fn default() -> Self {
        Self {
            root: None,
            next_id: 0,
            nodes: HashMap::new(),
            values: HashMap::new(),
        }
    }
}

/// An in-memory `NodeStore` using `tokio::sync::RwLock`.
///
/// Nodes and values share one id counter, so a handle never names both a
/// node and a value.
#[derive(Clone)]
pub struct InMemoryStore<K, V> {
    inner: Arc<RwLock<InMemoryStoreInner<K, V>>>,
}

impl<K, V> Default for InMemoryStore<K, V> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(InMemoryStoreInner::default())),
        }
    }
}

impl<K, V> fmt::Debug for InMemoryStore<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryStore").finish_non_exhaustive()
    }
}

impl<K, V> InMemoryStore<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of written node records.
    pub async fn node_count(&self) -> usize {
        self.inner.read().await.nodes.len()
    }

    /// Number of live value records.
    pub async fn value_count(&self) -> usize {
        self.inner.read().await.values.len()
    }
}

#[async_trait]
impl<K, V> NodeStore<K, V> for InMemoryStore<K, V>
where
    K: TreeKey,
    V: TreeValue + Clone,
{
    type Id = u64;

    async fn get_root(&self) -> Result<Option<u64>> {
        Ok(self.inner.read().await.root)
    }

    async fn write_root(&self, id: u64) -> Result<u64> {
        self.inner.write().await.root = Some(id);
        Ok(id)
    }

    async fn clear_root(&self) -> Result<()> {
        self.inner.write().await.root = None;
        Ok(())
    }

    async fn read(&self, id: &u64) -> Result<Node<u64, K>> {
        let guard = self.inner.read().await;
        guard
            .nodes
            .get(id)
            .cloned()
            .ok_or_else(|| TreeError::RecordNotFound(format!("node {}", id)))
    }

    async fn write(&self, id: &u64, node: &Node<u64, K>) -> Result<u64> {
        let mut stored = node.clone();
        stored.id = Some(*id);
        self.inner.write().await.nodes.insert(*id, stored);
        Ok(*id)
    }

    async fn remove(&self, id: &u64) -> Result<()> {
        self.inner.write().await.nodes.remove(id);
        Ok(())
    }

    async fn allocate(&self, _node: &Node<u64, K>) -> Result<u64> {
        let mut guard = self.inner.write().await;
        let id = guard.next_id;
        guard.next_id += 1;
        Ok(id)
    }

    async fn read_data(&self, id: &u64) -> Result<V> {
        let guard = self.inner.read().await;
        guard
            .values
            .get(id)
            .cloned()
            .ok_or_else(|| TreeError::RecordNotFound(format!("value {}", id)))
    }

    async fn write_data(&self, id: &u64, value: &V) -> Result<u64> {
        self.inner.write().await.values.insert(*id, value.clone());
        Ok(*id)
    }

    async fn remove_data(&self, id: &u64) -> Result<()> {
        self.inner.write().await.values.remove(id);
        Ok(())
    }

    async fn allocate_data(&self, _value: &V) -> Result<u64> {
        let mut guard = self.inner.write().await;
        let id = guard.next_id;
        guard.next_id += 1;
        Ok(id)
    }
}
