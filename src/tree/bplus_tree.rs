// async-btree/src/tree/bplus_tree.rs

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, trace};

use crate::common::{natural_order, Comparator, TreeConfig};
use crate::error::{Result, TreeError};
use crate::node::Node;
use crate::platform::{TreeKey, TreeValue};
use crate::store::NodeStore;

use super::io::{NodeIo, RootUpdate};
use super::leaf_cursor::{LeafCursor, LeafNodeCursor};
use super::types::{Direction, StoreId, Tree};
use super::verify::{self, Layout};

type NodeOf<S, K, V> = Node<StoreId<S, K, V>, K>;

/// B+Tree: values live only in leaves, internal nodes hold separator keys,
/// and the leaves form a doubly linked chain in key order.
pub struct BPlusTree<K, V, S>
where
    K: TreeKey,
    V: TreeValue,
    S: NodeStore<K, V>,
{
    io: NodeIo<S, K, V>,
    config: TreeConfig,
    comparator: Comparator<K>,
}

impl<K, V, S> BPlusTree<K, V, S>
where
    K: TreeKey,
    V: TreeValue,
    S: NodeStore<K, V>,
{
    pub fn new(store: Arc<S>, config: TreeConfig, comparator: Comparator<K>) -> Result<Self> {
        config.validate()?;
        Ok(BPlusTree {
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

    /// Child index to follow for `key`. A separator equal to the key sends
    /// the search right, where its leaf copy lives.
    fn route(&self, node: &NodeOf<S, K, V>, key: &K) -> usize {
        let found = node.locate(key, &self.comparator);
        found.position + usize::from(found.exact)
    }

    async fn find_leaf(&self, mut node: NodeOf<S, K, V>, key: &K) -> Result<NodeOf<S, K, V>> {
        while !node.leaf {
            let pos = self.route(&node, key);
            node = self.io.load(node.child(pos)?).await?;
        }
        Ok(node)
    }

    /// The leaf `key` lives in, or would be inserted into.
    pub async fn get_node(&self, key: &K) -> Result<Option<NodeOf<S, K, V>>> {
        match self.io.root().await? {
            Some(root) => Ok(Some(self.find_leaf(root, key).await?)),
            None => Ok(None),
        }
    }

    /// Leftmost leaf below `top`, or below the root when `top` is `None`.
    pub async fn smallest_node(&self, top: Option<NodeOf<S, K, V>>) -> Result<Option<NodeOf<S, K, V>>> {
        self.edge_node(top, Direction::Forward).await
    }

    /// Rightmost leaf below `top`, or below the root when `top` is `None`.
    pub async fn biggest_node(&self, top: Option<NodeOf<S, K, V>>) -> Result<Option<NodeOf<S, K, V>>> {
        self.edge_node(top, Direction::Backward).await
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

    async fn edge_node(
        &self,
        top: Option<NodeOf<S, K, V>>,
        direction: Direction,
    ) -> Result<Option<NodeOf<S, K, V>>> {
        let start = match top {
            Some(node) => node,
            None => match self.io.root().await? {
                Some(root) => root,
                None => return Ok(None),
            },
        };
        Ok(Some(self.io.edge_leaf(start, direction).await?))
    }

    /// Leaves in ascending order, starting at the leaf holding `key`.
    pub async fn iterator_nodes(&self, key: Option<&K>) -> Result<LeafNodeCursor<S, K, V>> {
        self.leaves(key, Direction::Forward).await
    }

    /// Leaves in descending order, starting at the leaf holding `key`.
    pub async fn reverse_iterator_nodes(&self, key: Option<&K>) -> Result<LeafNodeCursor<S, K, V>> {
        self.leaves(key, Direction::Backward).await
    }

    async fn leaves(&self, key: Option<&K>, direction: Direction) -> Result<LeafNodeCursor<S, K, V>> {
        let first = match key {
            Some(key) => self.get_node(key).await?,
            None => self.edge_node(None, direction).await?,
        };
        Ok(LeafNodeCursor::new(self.io.clone(), first, direction))
    }

    async fn entries(&self, key: Option<&K>, direction: Direction) -> Result<LeafCursor<S, K, V>> {
        let Some(key) = key else {
            let leaves = self.leaves(None, direction).await?;
            return Ok(LeafCursor::new(leaves, None));
        };
        let Some(leaf) = self.get_node(key).await? else {
            let leaves = LeafNodeCursor::new(self.io.clone(), None, direction);
            return Ok(LeafCursor::new(leaves, None));
        };
        let found = leaf.locate(key, &self.comparator);
        let start = match direction {
            Direction::Forward => found.position,
            Direction::Backward => found.position + usize::from(found.exact),
        };
        let leaves = LeafNodeCursor::new(self.io.clone(), Some(leaf), direction);
        Ok(LeafCursor::new(leaves, Some(start)))
    }

    fn is_full(&self, node: &NodeOf<S, K, V>) -> bool {
        node.len() >= self.config.max_keys()
    }

    /// Splits the full `child` at `parent.children[pos]`. A leaf keeps its
    /// median in the right half and the parent gets a copy; an internal
    /// node hands its median up.
    async fn split_child(
        &self,
        parent: &mut NodeOf<S, K, V>,
        pos: usize,
        mut child: NodeOf<S, K, V>,
        root: RootUpdate<S::Id>,
    ) -> Result<(NodeOf<S, K, V>, NodeOf<S, K, V>)> {
        let t = self.config.node_size;
        let (mut right, separator) = if child.leaf {
            let mut right = Node::new_leaf(child.keys.split_off(t - 1), child.data.split_off(t - 1));
            let separator = right
                .keys
                .first()
                .cloned()
                .ok_or_else(|| TreeError::structure("split produced an empty leaf"))?;
            right.left = child.id.clone();
            right.right = child.right.clone();
            (right, separator)
        } else {
            let right = Node::new_internal(child.keys.split_off(t), Vec::new(), child.children.split_off(t));
            let median = child
                .keys
                .pop()
                .ok_or_else(|| TreeError::structure("split of an empty internal node"))?;
            (right, median)
        };
        let right_id = self.io.allocate(&mut right).await?;

        let mut neighbour = None;
        if child.leaf {
            if let Some(next_id) = child.right.replace(right_id.clone()) {
                let mut next = self.io.load(&next_id).await?;
                next.left = Some(right_id.clone());
                neighbour = Some(next);
            }
        }

        parent.keys.insert(pos, separator);
        parent.children.insert(pos + 1, right_id);
        parent.leaf = false;

        let mut writes = vec![&right, &child, &*parent];
        writes.extend(neighbour.as_ref());
        self.io.commit(&writes, &[], root).await?;
        debug!(
            "split {} {:?} under {:?}: {} + {} keys",
            if child.leaf { "leaf" } else { "node" },
            child.id,
            parent.id,
            child.len(),
            right.len()
        );
        Ok((child, right))
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
                if child.leaf {
                    let (key, data) = left.pop_entry()?;
                    parent.replace_key(pos - 1, key.clone())?;
                    child.insert_entry(0, key, data)?;
                } else {
                    let key = left
                        .keys
                        .pop()
                        .ok_or_else(|| TreeError::structure("left sibling has no keys"))?;
                    let moved = left
                        .children
                        .pop()
                        .ok_or_else(|| TreeError::structure("left sibling has no children"))?;
                    let separator = parent.replace_key(pos - 1, key)?;
                    child.keys.insert(0, separator);
                    child.children.insert(0, moved);
                }
                self.io.commit(&[&left, &child, &*parent], &[], RootUpdate::Keep).await?;
                debug!("borrowed from left sibling {:?} into {:?}", left.id, child.id);
                Ok((child, false))
            }
            (_, Some(mut right)) if right.len() >= t => {
                if child.leaf {
                    let (key, data) = right.take_entry(0)?;
                    let end = child.len();
                    child.insert_entry(end, key, data)?;
                    let first = right
                        .keys
                        .first()
                        .cloned()
                        .ok_or_else(|| TreeError::structure("right sibling emptied by a borrow"))?;
                    parent.replace_key(pos, first)?;
                } else {
                    let key = right.keys.remove(0);
                    let moved = right.take_child(0)?;
                    let separator = parent.replace_key(pos, key)?;
                    child.keys.push(separator);
                    child.children.push(moved);
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

    /// Folds `right` into `left` and drops the separator between them from
    /// `parent`. Leaves discard the separator and take over `right`'s chain
    /// link; internal nodes pull it down.
    async fn merge_children(
        &self,
        parent: &mut NodeOf<S, K, V>,
        pos: usize,
        mut left: NodeOf<S, K, V>,
        right: NodeOf<S, K, V>,
        parent_is_root: bool,
    ) -> Result<(NodeOf<S, K, V>, bool)> {
        if pos >= parent.len() {
            return Err(TreeError::Structure(format!(
                "no separator {} in {:?} to merge around",
                pos, parent.id
            )));
        }

        let mut neighbour = None;
        if left.leaf {
            if let Some(next_id) = &right.right {
                let mut next = self.io.load(next_id).await?;
                next.left = left.id.clone();
                neighbour = Some(next);
            }
        }

        let separator = parent.keys.remove(pos);
        let right_id = parent.take_child(pos + 1)?;
        if left.leaf {
            left.right = right.right;
            left.keys.extend(right.keys);
            left.data.extend(right.data);
        } else {
            left.keys.push(separator);
            left.keys.extend(right.keys);
            left.children.extend(right.children);
        }

        let mut writes = vec![&left];
        writes.extend(neighbour.as_ref());

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
                .commit(&writes, &[old_root, &right_id], RootUpdate::Set(new_root))
                .await?;
            debug!("root collapsed into {:?}", left.id);
            return Ok((left, true));
        }

        writes.push(&*parent);
        self.io.commit(&writes, &[&right_id], RootUpdate::Keep).await?;
        debug!("merged {:?} into {:?}", right_id, left.id);
        Ok((left, false))
    }
}

#[async_trait]
impl<K, V, S> Tree<K, V> for BPlusTree<K, V, S>
where
    K: TreeKey,
    V: TreeValue,
    S: NodeStore<K, V>,
{
    type Store = S;
    type Entries = LeafCursor<S, K, V>;

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
            if node.leaf {
                let found = node.locate(&key, &self.comparator);
                if found.exact {
                    if !overwrite {
                        return Err(TreeError::DuplicateKey);
                    }
                    return Ok(Some(self.io.overwrite_value(&mut node, found.position, value).await?));
                }
                let data = self.io.store_value(&value).await?;
                node.insert_entry(found.position, key, data)?;
                self.io.write(&node).await?;
                return Ok(None);
            }

            let pos = self.route(&node, &key);
            let child = self.io.load(node.child(pos)?).await?;
            if !self.is_full(&child) {
                trace!("insert descends into {:?}", child.id);
                node = child;
                continue;
            }
            let (left, right) = self.split_child(&mut node, pos, child, RootUpdate::Keep).await?;
            node = match (self.comparator)(&node.keys[pos], &key) {
                Ordering::Greater => left,
                Ordering::Less | Ordering::Equal => right,
            };
        }
    }

    async fn remove(&mut self, key: &K) -> Result<Option<V>> {
        let Some(mut node) = self.io.root().await? else {
            return Ok(None);
        };
        let mut is_root = true;
        loop {
            if node.leaf {
                let found = node.locate(key, &self.comparator);
                if !found.exact {
                    return Ok(None);
                }
                return self.io.remove_leaf_entry(node, found.position, is_root).await.map(Some);
            }
            let pos = self.route(&node, key);
            let (next, next_is_root) = self.descend(&mut node, pos, is_root).await?;
            trace!("remove descends into {:?}", next.id);
            node = next;
            is_root = next_is_root;
        }
    }

    async fn get(&self, key: &K) -> Result<Option<V>> {
        let Some(leaf) = self.get_node(key).await? else {
            return Ok(None);
        };
        let found = leaf.locate(key, &self.comparator);
        if !found.exact {
            return Ok(None);
        }
        let data = leaf.value_handle(found.position)?;
        Ok(Some(self.io.store().read_data(data).await?))
    }

    async fn dump(&self) -> Result<String> {
        verify::dump(&self.io).await
    }

    async fn verify(&self) -> Result<()> {
        verify::verify(&self.io, &self.config, &self.comparator, Layout::BPlusTree).await
    }

    async fn smallest(&self) -> Result<Option<K>> {
        self.smallest_in(None).await
    }

    async fn biggest(&self) -> Result<Option<K>> {
        self.biggest_in(None).await
    }

    async fn iterator_entries(&self, key: Option<&K>) -> Result<LeafCursor<S, K, V>> {
        self.entries(key, Direction::Forward).await
    }

    async fn reverse_iterator_entries(&self, key: Option<&K>) -> Result<LeafCursor<S, K, V>> {
        self.entries(key, Direction::Backward).await
    }
}
