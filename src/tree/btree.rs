// async-btree/src/tree/btree.rs

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, trace};

use crate::common::{natural_order, Comparator, TreeConfig};
use crate::error::{Result, TreeError};
use crate::node::Node;
use crate::platform::{TreeKey, TreeValue};
use crate::store::NodeStore;

use super::cursor::{PreorderCursor, StackCursor};
use super::io::{NodeIo, RootUpdate};
use super::types::{Direction, StoreId, Tree};
use super::verify::{self, Layout};

type NodeOf<S, K, V> = Node<StoreId<S, K, V>, K>;

/// Outcome of removing a key found in an internal node.
enum InternalRemoval<I, K, V> {
    /// The key was replaced by its predecessor or successor, which must now
    /// be spliced out of `next` without freeing its value record.
    Replaced {
        previous: Option<V>,
        replacement: K,
        next: Node<I, K>,
    },
    /// Both children were merged around the key; continue into `next`.
    Merged { next: Node<I, K>, root: bool },
}

/// Classic B-Tree: every node carries keys with their value handles.
pub struct BTree<K, V, S>
where
    K: TreeKey,
    V: TreeValue,
    S: NodeStore<K, V>,
{
    io: NodeIo<S, K, V>,
    config: TreeConfig,
    comparator: Comparator<K>,
}

impl<K, V, S> BTree<K, V, S>
where
    K: TreeKey,
    V: TreeValue,
    S: NodeStore<K, V>,
{
    pub fn new(store: Arc<S>, config: TreeConfig, comparator: Comparator<K>) -> Result<Self> {
        config.validate()?;
        Ok(BTree {
            io: NodeIo::new(store),
            config,
            comparator,
        })
    }

    pub fn with_natural_order(store: Arc<S>, config: TreeConfig) -> Result<Self>
    where
        K: Ord,
    {
        Self::new(store, config, natural_order())
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Leftmost leaf below `top`, or below the root when `top` is `None`.
    pub async fn smallest_node(&self, top: Option<NodeOf<S, K, V>>) -> Result<Option<NodeOf<S, K, V>>> {
        let start = match top {
            Some(node) => node,
            None => match self.io.root().await? {
                Some(root) => root,
                None => return Ok(None),
            },
        };
        Ok(Some(self.io.edge_leaf(start, Direction::Forward).await?))
    }

    /// Rightmost leaf below `top`, or below the root when `top` is `None`.
    pub async fn biggest_node(&self, top: Option<NodeOf<S, K, V>>) -> Result<Option<NodeOf<S, K, V>>> {
        let start = match top {
            Some(node) => node,
            None => match self.io.root().await? {
                Some(root) => root,
                None => return Ok(None),
            },
        };
        Ok(Some(self.io.edge_leaf(start, Direction::Backward).await?))
    }

    /// Smallest key below `top`, or in the whole tree when `top` is `None`.
    pub async fn smallest_in(&self, top: Option<NodeOf<S, K, V>>) -> Result<Option<K>> {
        Ok(self
            .smallest_node(top)
            .await?
            .and_then(|leaf| leaf.keys.first().cloned()))
    }

    /// Biggest key below `top`, or in the whole tree when `top` is `None`.
    pub async fn biggest_in(&self, top: Option<NodeOf<S, K, V>>) -> Result<Option<K>> {
        Ok(self
            .biggest_node(top)
            .await?
            .and_then(|leaf| leaf.keys.last().cloned()))
    }

    /// Every node of the tree in pre-order.
    pub async fn iterator_nodes_all(&self) -> Result<PreorderCursor<S, K, V>> {
        let root = self.io.store().get_root().await?;
        Ok(PreorderCursor::new(self.io.clone(), root))
    }

    fn is_full(&self, node: &NodeOf<S, K, V>) -> bool {
        node.len() >= self.config.max_keys()
    }

    async fn overwrite_at(
        &self,
        node: &mut NodeOf<S, K, V>,
        pos: usize,
        value: V,
        overwrite: bool,
    ) -> Result<Option<V>> {
        if !overwrite {
            return Err(TreeError::DuplicateKey);
        }
        Ok(Some(self.io.overwrite_value(node, pos, value).await?))
    }

    /// Splits the full `child` found at `parent.children[pos]`, promoting
    /// its median into `parent`. Returns the two halves.
    async fn split_child(
        &self,
        parent: &mut NodeOf<S, K, V>,
        pos: usize,
        mut child: NodeOf<S, K, V>,
        root: RootUpdate<S::Id>,
    ) -> Result<(NodeOf<S, K, V>, NodeOf<S, K, V>)> {
        let t = self.config.node_size;
        let mut right = Node::new_leaf(child.keys.split_off(t), child.data.split_off(t));
        if !child.leaf {
            right.leaf = false;
            right.children = child.children.split_off(t);
        }
        let (median, median_data) = child.pop_entry()?;
        let right_id = self.io.allocate(&mut right).await?;

        parent.insert_entry(pos, median, median_data)?;
        parent.children.insert(pos + 1, right_id);
        parent.leaf = false;

        self.io.commit(&[&right, &child, &*parent], &[], root).await?;
        debug!(
            "split node {:?} under {:?}: {} + {} keys",
            child.id,
            parent.id,
            child.len(),
            right.len()
        );
        Ok((child, right))
    }

    /// Removes `keys[pos]` from an internal node. `detach` is set when the
    /// key's value record belongs to the caller's removal and must be freed.
    async fn remove_internal(
        &self,
        node: &mut NodeOf<S, K, V>,
        pos: usize,
        detach: bool,
        is_root: bool,
    ) -> Result<InternalRemoval<S::Id, K, V>> {
        let t = self.config.node_size;
        let left_id = node.child(pos)?.clone();
        let right_id = node.child(pos + 1)?.clone();
        let (left, right) = futures::try_join!(self.io.load(&left_id), self.io.load(&right_id))?;

        if left.len() < t && right.len() < t {
            let (next, root) = self.merge_children(node, pos, left, right, is_root).await?;
            return Ok(InternalRemoval::Merged { next, root });
        }

        let (replacement, replacement_data, next) = if left.len() >= t {
            let leaf = self.io.edge_leaf(left.clone(), Direction::Backward).await?;
            let (key, data) = match (leaf.keys.last(), leaf.data.last()) {
                (Some(key), Some(data)) => (key.clone(), data.clone()),
                _ => return Err(TreeError::structure("predecessor leaf is empty")),
            };
            (key, data, left)
        } else {
            let leaf = self.io.edge_leaf(right.clone(), Direction::Forward).await?;
            let (key, data) = match (leaf.keys.first(), leaf.data.first()) {
                (Some(key), Some(data)) => (key.clone(), data.clone()),
                _ => return Err(TreeError::structure("successor leaf is empty")),
            };
            (key, data, right)
        };

        let old_data = node.value_handle(pos)?.clone();
        let previous = if detach {
            Some(self.io.store().read_data(&old_data).await?)
        } else {
            None
        };
        node.replace_entry(pos, replacement.clone(), replacement_data)?;
        if detach {
            futures::try_join!(self.io.write(node), self.io.store().remove_data(&old_data))?;
        } else {
            self.io.write(node).await?;
        }
        debug!("replaced internal key with {:?} in {:?}", replacement, node.id);
        Ok(InternalRemoval::Replaced {
            previous,
            replacement,
            next,
        })
    }

    /// Loads `parent.children[pos]` for removal, first making sure it holds
    /// at least `t` keys by borrowing from a sibling or merging with one.
    /// The flag reports whether the returned node is now the root.
    async fn descend(
        &self,
        parent: &mut NodeOf<S, K, V>,
        pos: usize,
        parent_is_root: bool,
    ) -> Result<(NodeOf<S, K, V>, bool)> {
        let t = self.config.node_size;
        let mut child = self.io.load(parent.child(pos)?).await?;
        if child.len() >= t {
            return Ok((child, false));
        }

        let (left, right) = self.io.load_siblings(parent, pos).await?;
        match (left, right) {
            (Some(mut left), _) if left.len() >= t => {
                let (key, data) = left.pop_entry()?;
                let (separator, separator_data) = parent.replace_entry(pos - 1, key, data)?;
                child.insert_entry(0, separator, separator_data)?;
                if !left.leaf {
                    let moved = left
                        .children
                        .pop()
                        .ok_or_else(|| TreeError::structure("left sibling has no children"))?;
                    child.children.insert(0, moved);
                }
                self.io.commit(&[&left, &child, &*parent], &[], RootUpdate::Keep).await?;
                debug!("borrowed from left sibling {:?} into {:?}", left.id, child.id);
                Ok((child, false))
            }
            (_, Some(mut right)) if right.len() >= t => {
                let (key, data) = right.take_entry(0)?;
                let (separator, separator_data) = parent.replace_entry(pos, key, data)?;
                let end = child.len();
                child.insert_entry(end, separator, separator_data)?;
                if !right.leaf {
                    child.children.push(right.take_child(0)?);
                }
                self.io.commit(&[&right, &child, &*parent], &[], RootUpdate::Keep).await?;
                debug!("borrowed from right sibling {:?} into {:?}", right.id, child.id);
                Ok((child, false))
            }
            (_, Some(right)) => self.merge_children(parent, pos, child, right, parent_is_root).await,
            (Some(left), None) => self.merge_children(parent, pos - 1, left, child, parent_is_root).await,
            (None, None) => Err(TreeError::Structure(format!(
                "node {:?} has no sibling to rebalance with",
                child.id
            ))),
        }
    }

    /// Pulls `parent.keys[pos]` down and folds `right` into `left`.
    /// Collapses the root when the parent is left without keys.
    async fn merge_children(
        &self,
        parent: &mut NodeOf<S, K, V>,
        pos: usize,
        mut left: NodeOf<S, K, V>,
        right: NodeOf<S, K, V>,
        parent_is_root: bool,
    ) -> Result<(NodeOf<S, K, V>, bool)> {
        let (separator, separator_data) = parent.take_entry(pos)?;
        let right_id = parent.take_child(pos + 1)?;
        let end = left.len();
        left.insert_entry(end, separator, separator_data)?;
        left.keys.extend(right.keys);
        left.data.extend(right.data);
        left.children.extend(right.children);

        if parent.is_empty() {
            if !parent_is_root {
                return Err(TreeError::Structure(format!(
                    "non-root node {:?} emptied by a merge",
                    parent.id
                )));
            }
            let old_root = parent.handle()?;
            let new_root = left.handle()?.clone();
            self.io
                .commit(&[&left], &[old_root, &right_id], RootUpdate::Set(new_root))
                .await?;
            debug!("root collapsed into {:?}", left.id);
            return Ok((left, true));
        }

        self.io.commit(&[&left, &*parent], &[&right_id], RootUpdate::Keep).await?;
        debug!("merged {:?} into {:?}", right_id, left.id);
        Ok((left, false))
    }
}

#[async_trait]
impl<K, V, S> Tree<K, V> for BTree<K, V, S>
where
    K: TreeKey,
    V: TreeValue,
    S: NodeStore<K, V>,
{
    type Store = S;
    type Entries = StackCursor<S, K, V>;

    fn store(&self) -> &Arc<S> {
        self.io.store()
    }

    async fn read_root(&self) -> Result<Option<NodeOf<S, K, V>>> {
        self.io.root().await
    }

    async fn insert(&mut self, key: K, value: V, overwrite: bool) -> Result<Option<V>> {
        let Some(mut node) = self.io.root().await? else {
            let data = self.io.store_value(&value).await?;
            let mut root = Node::new_leaf(vec![key], vec![data]);
            let id = self.io.allocate(&mut root).await?;
            self.io.commit(&[&root], &[], RootUpdate::Set(id)).await?;
            debug!("created root leaf {:?}", root.id);
            return Ok(None);
        };

        if self.is_full(&node) {
            let mut root = Node::new_internal(Vec::new(), Vec::new(), vec![node.handle()?.clone()]);
            let id = self.io.allocate(&mut root).await?;
            self.split_child(&mut root, 0, node, RootUpdate::Set(id)).await?;
            debug!("tree grew a new root {:?}", root.id);
            node = root;
        }

        loop {
            let found = node.locate(&key, &self.comparator);
            let pos = found.position;
            if found.exact {
                return self.overwrite_at(&mut node, pos, value, overwrite).await;
            }
            if node.leaf {
                let data = self.io.store_value(&value).await?;
                node.insert_entry(pos, key, data)?;
                self.io.write(&node).await?;
                return Ok(None);
            }

            let child = self.io.load(node.child(pos)?).await?;
            if !self.is_full(&child) {
                trace!("insert descends into {:?}", child.id);
                node = child;
                continue;
            }
            let (left, right) = self.split_child(&mut node, pos, child, RootUpdate::Keep).await?;
            node = match (self.comparator)(&key, &node.keys[pos]) {
                Ordering::Equal => return self.overwrite_at(&mut node, pos, value, overwrite).await,
                Ordering::Less => left,
                Ordering::Greater => right,
            };
        }
    }

    async fn remove(&mut self, key: &K) -> Result<Option<V>> {
        let Some(mut node) = self.io.root().await? else {
            return Ok(None);
        };
        let mut target = key.clone();
        // Set once the requested key's value has been detached from an
        // internal node; `target` then names the borrowed replacement.
        let mut removed: Option<V> = None;
        let mut is_root = true;

        loop {
            let found = node.locate(&target, &self.comparator);
            let pos = found.position;

            if node.leaf {
                if !found.exact {
                    if removed.is_some() {
                        return Err(TreeError::Structure(format!(
                            "replacement key {:?} missing from its leaf",
                            target
                        )));
                    }
                    return Ok(None);
                }
                return match removed {
                    Some(value) => {
                        node.take_entry(pos)?;
                        self.io.write(&node).await?;
                        Ok(Some(value))
                    }
                    None => self.io.remove_leaf_entry(node, pos, is_root).await.map(Some),
                };
            }

            if !found.exact {
                let (next, next_is_root) = self.descend(&mut node, pos, is_root).await?;
                trace!("remove descends into {:?}", next.id);
                node = next;
                is_root = next_is_root;
                continue;
            }

            match self.remove_internal(&mut node, pos, removed.is_none(), is_root).await? {
                InternalRemoval::Replaced {
                    previous,
                    replacement,
                    next,
                } => {
                    if removed.is_none() {
                        removed = previous;
                    }
                    target = replacement;
                    node = next;
                    is_root = false;
                }
                InternalRemoval::Merged { next, root } => {
                    node = next;
                    is_root = root;
                }
            }
        }
    }

    async fn get(&self, key: &K) -> Result<Option<V>> {
        let Some(mut node) = self.io.root().await? else {
            return Ok(None);
        };
        loop {
            let found = node.locate(key, &self.comparator);
            if found.exact {
                let data = node.value_handle(found.position)?;
                return Ok(Some(self.io.store().read_data(data).await?));
            }
            if node.leaf {
                return Ok(None);
            }
            node = self.io.load(node.child(found.position)?).await?;
        }
    }

    async fn dump(&self) -> Result<String> {
        verify::dump(&self.io).await
    }

    async fn verify(&self) -> Result<()> {
        verify::verify(&self.io, &self.config, &self.comparator, Layout::BTree).await
    }

    async fn smallest(&self) -> Result<Option<K>> {
        self.smallest_in(None).await
    }

    async fn biggest(&self) -> Result<Option<K>> {
        self.biggest_in(None).await
    }

    async fn iterator_entries(&self, key: Option<&K>) -> Result<StackCursor<S, K, V>> {
        self.entries(key, Direction::Forward).await
    }

    async fn reverse_iterator_entries(&self, key: Option<&K>) -> Result<StackCursor<S, K, V>> {
        self.entries(key, Direction::Backward).await
    }
}

impl<K, V, S> BTree<K, V, S>
where
    K: TreeKey,
    V: TreeValue,
    S: NodeStore<K, V>,
{
    async fn entries(&self, key: Option<&K>, direction: Direction) -> Result<StackCursor<S, K, V>> {
        let io = self.io.clone();
        let Some(root) = self.io.root().await? else {
            return Ok(StackCursor::empty(io, direction));
        };
        match key {
            Some(key) => StackCursor::seek(io, root, key, &self.comparator, direction).await,
            None => Ok(StackCursor::from_root(io, root, direction)),
        }
    }
}
