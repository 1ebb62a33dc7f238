// async-btree/src/tree/projection.rs

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::platform::{TreeKey, TreeValue};
use crate::store::NodeStore;

use super::types::TreeCursor;

/// Keys of an entry cursor.
pub struct Keys<C, K, I> {
    entries: C,
    _marker: PhantomData<fn() -> (K, I)>,
}

impl<C, K, I> Keys<C, K, I> {
    pub fn new(entries: C) -> Self {
        Self { entries, _marker: PhantomData }
    }
}

#[async_trait]
impl<C, K, I> TreeCursor for Keys<C, K, I>
where
    C: TreeCursor<Item = (K, I)>,
    K: Send + 'static,
    I: Send + 'static,
{
    type Item = K;

    async fn next(&mut self) -> Result<Option<K>> {
        Ok(self.entries.next().await?.map(|(key, _)| key))
    }
}

/// Values of an entry cursor, read through the store one entry at a time.
pub struct Values<C, S, K, V> {
    entries: C,
    store: Arc<S>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<C, S, K, V> Values<C, S, K, V> {
    pub fn new(entries: C, store: Arc<S>) -> Self {
        Self { entries, store, _marker: PhantomData }
    }
}

#[async_trait]
impl<C, S, K, V> TreeCursor for Values<C, S, K, V>
where
    K: TreeKey,
    V: TreeValue,
    S: NodeStore<K, V>,
    C: TreeCursor<Item = (K, S::Id)>,
{
    type Item = V;

    async fn next(&mut self) -> Result<Option<V>> {
        match self.entries.next().await? {
            Some((_, data_id)) => Ok(Some(self.store.read_data(&data_id).await?)),
            None => Ok(None),
        }
    }
}
