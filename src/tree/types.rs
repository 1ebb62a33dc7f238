// async-btree/src/tree/types.rs

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::error::{Result, TreeError};
use crate::node::Node;
use crate::platform::{TreeKey, TreeValue};
use crate::store::NodeStore;

use super::projection::{Keys, Values};

/// Handle type of a store.
pub type StoreId<S, K, V> = <S as NodeStore<K, V>>::Id;

/// Which way a cursor walks the key order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending key order.
    Forward,
    /// Descending key order.
    Backward,
}

/// Pull-based async sequence. Every `next` may suspend on storage calls.
///
/// Cursors are single-pass and own everything they need, so dropping one
/// early needs no cleanup. They take no locks: mutating the tree while a
/// cursor is alive leaves the cursor's output unspecified.
#[async_trait]
pub trait TreeCursor: Send {
    type Item: Send + 'static;

    /// Returns the next item, or `Ok(None)` once the sequence is exhausted.
    async fn next(&mut self) -> Result<Option<Self::Item>>;

    /// Drains the cursor into a vector.
    async fn collect_vec(self) -> Result<Vec<Self::Item>>
    where
        Self: Sized,
    {
        let mut cursor = self;
        let mut items = Vec::new();
        while let Some(item) = cursor.next().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Adapts the cursor into a `futures` stream.
    fn into_stream(self) -> BoxStream<'static, Result<Self::Item>>
    where
        Self: Sized + 'static,
    {
        stream::try_unfold(self, |mut cursor| async move {
            let item = cursor.next().await?;
            Ok::<_, TreeError>(item.map(|item| (item, cursor)))
        })
        .boxed()
    }
}

/// Operations shared by the B-Tree and the B+Tree.
#[async_trait]
pub trait Tree<K: TreeKey, V: TreeValue>: Send + Sync {
    type Store: NodeStore<K, V>;
    type Entries: TreeCursor<Item = (K, StoreId<Self::Store, K, V>)> + 'static;

    fn store(&self) -> &Arc<Self::Store>;

    async fn read_root(&self) -> Result<Option<Node<StoreId<Self::Store, K, V>, K>>>;

    /// Inserts `key`. Returns the previous value when `overwrite` replaced
    /// one, `None` for a fresh key, and `DuplicateKey` when the key exists
    /// and `overwrite` is false.
    async fn insert(&mut self, key: K, value: V, overwrite: bool) -> Result<Option<V>>;

    /// Removes `key`, returning its value, or `None` if it was absent.
    async fn remove(&mut self, key: &K) -> Result<Option<V>>;

    async fn get(&self, key: &K) -> Result<Option<V>>;

    async fn smallest(&self) -> Result<Option<K>>;

    async fn biggest(&self) -> Result<Option<K>>;

    /// Indented rendering of the tree, one node per line.
    async fn dump(&self) -> Result<String>;

    /// Walks the whole tree, failing with `Structure` on the first broken
    /// invariant.
    async fn verify(&self) -> Result<()>;

    /// Entries in ascending order, starting at the first key `>= key`.
    async fn iterator_entries(&self, key: Option<&K>) -> Result<Self::Entries>;

    /// Entries in descending order, starting at the last key `<= key`.
    async fn reverse_iterator_entries(&self, key: Option<&K>) -> Result<Self::Entries>;

    async fn iterator_keys(&self, key: Option<&K>) -> Result<Keys<Self::Entries, K, StoreId<Self::Store, K, V>>> {
        Ok(Keys::new(self.iterator_entries(key).await?))
    }

    async fn reverse_iterator_keys(
        &self,
        key: Option<&K>,
    ) -> Result<Keys<Self::Entries, K, StoreId<Self::Store, K, V>>> {
        Ok(Keys::new(self.reverse_iterator_entries(key).await?))
    }

    async fn iterator(&self, key: Option<&K>) -> Result<Values<Self::Entries, Self::Store, K, V>> {
        Ok(Values::new(self.iterator_entries(key).await?, Arc::clone(self.store())))
    }

    async fn reverse_iterator(&self, key: Option<&K>) -> Result<Values<Self::Entries, Self::Store, K, V>> {
        Ok(Values::new(self.reverse_iterator_entries(key).await?, Arc::clone(self.store())))
    }

    /// Calls `callback` with every value in ascending key order.
    async fn traverse<F>(&self, mut callback: F) -> Result<()>
    where
        F: FnMut(V) + Send,
    {
        let mut values = self.iterator(None).await?;
        while let Some(value) = values.next().await? {
            callback(value);
        }
        Ok(())
    }

    /// The value under `key` if present, otherwise the value of the nearest
    /// key above it (or below it when `reverse` is set).
    async fn get_nearest(&self, key: &K, reverse: bool) -> Result<Option<V>> {
        let mut values = if reverse {
            self.reverse_iterator(Some(key)).await?
        } else {
            self.iterator(Some(key)).await?
        };
        values.next().await
    }
}
