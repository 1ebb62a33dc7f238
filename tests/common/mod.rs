// Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_btree::{
    BPlusTree, BTree, FileStore, FileStoreConfig, InMemoryStore, Node, NodeStore, Result, TreeConfig,
    TreeError,
};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tempfile::TempDir;

pub type MemStore = InMemoryStore<u32, String>;
pub type DiskStore = FileStore<u32, String>;

/// Keeps a file-backed store's directory alive for the test's duration.
pub type Guard = Option<TempDir>;

pub fn value_for(key: u32) -> String {
    format!("value-{}", key)
}

pub fn shuffled(range: std::ops::Range<u32>, seed: u64) -> Vec<u32> {
    let mut keys: Vec<u32> = range.collect();
    let mut rng = StdRng::seed_from_u64(seed);
    keys.shuffle(&mut rng);
    keys
}

/// Small pages keep the file store honest about page reuse.
pub fn small_pages() -> FileStoreConfig {
    FileStoreConfig { page_size: 512 }
}

pub async fn open_disk_store() -> (Guard, Arc<DiskStore>) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("tree.pages");
    let store = FileStore::open(&path, small_pages()).await.expect("open file store");
    (Some(dir), Arc::new(store))
}

pub async fn mem_btree(node_size: usize) -> (Guard, BTree<u32, String, MemStore>) {
    let store = Arc::new(MemStore::new());
    let tree = BTree::with_natural_order(store, TreeConfig::new(node_size)).expect("valid config");
    (None, tree)
}

pub async fn mem_bplus(node_size: usize) -> (Guard, BPlusTree<u32, String, MemStore>) {
    let store = Arc::new(MemStore::new());
    let tree = BPlusTree::with_natural_order(store, TreeConfig::new(node_size)).expect("valid config");
    (None, tree)
}

pub async fn disk_btree(node_size: usize) -> (Guard, BTree<u32, String, DiskStore>) {
    let (guard, store) = open_disk_store().await;
    let tree = BTree::with_natural_order(store, TreeConfig::new(node_size)).expect("valid config");
    (guard, tree)
}

pub async fn disk_bplus(node_size: usize) -> (Guard, BPlusTree<u32, String, DiskStore>) {
    let (guard, store) = open_disk_store().await;
    let tree = BPlusTree::with_natural_order(store, TreeConfig::new(node_size)).expect("valid config");
    (guard, tree)
}

/// Writes a B+Tree of three full leaves `[1,2,3] [4,5,6] [7,8,9]` under a
/// root with separators `[4, 7]`, straight through the store.
pub async fn hand_built_chain(store: &MemStore) -> u64 {
    let mut leaf_ids = Vec::new();
    let mut leaves = Vec::new();
    for chunk in [[1u32, 2, 3], [4, 5, 6], [7, 8, 9]] {
        let mut data = Vec::new();
        for key in chunk {
            let id = store.allocate_data(&value_for(key)).await.unwrap();
            data.push(store.write_data(&id, &value_for(key)).await.unwrap());
        }
        let leaf = Node::new_leaf(chunk.to_vec(), data);
        leaf_ids.push(store.allocate(&leaf).await.unwrap());
        leaves.push(leaf);
    }
    for (i, leaf) in leaves.iter_mut().enumerate() {
        leaf.left = i.checked_sub(1).map(|j| leaf_ids[j]);
        leaf.right = leaf_ids.get(i + 1).copied();
        store.write(&leaf_ids[i], leaf).await.unwrap();
    }

    let root = Node::new_internal(vec![4, 7], Vec::new(), leaf_ids.clone());
    let root_id = store.allocate(&root).await.unwrap();
    store.write(&root_id, &root).await.unwrap();
    store.write_root(root_id).await.unwrap();
    root_id
}

/// Store calls that a `FaultyStore` can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Node `write`.
    Write,
    ReadData,
    /// Node `remove` or `remove_data`.
    Remove,
}

/// An in-memory store that fails one chosen call with `StorageError`.
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: MemStore,
    armed: Mutex<Option<(Fault, usize)>>,
}

impl FaultyStore {
    /// Makes the `nth` upcoming call of kind `fault` fail, counting from 1.
    pub fn fail_on(&self, fault: Fault, nth: usize) {
        *self.armed.lock().unwrap() = Some((fault, nth));
    }

    fn trip(&self, fault: Fault) -> Result<()> {
        let mut armed = self.armed.lock().unwrap();
        match *armed {
            Some((kind, 1)) if kind == fault => {
                *armed = None;
                Err(TreeError::StorageError(format!("injected {:?} failure", fault)))
            }
            Some((kind, n)) if kind == fault => {
                *armed = Some((kind, n - 1));
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl NodeStore<u32, String> for FaultyStore {
    type Id = u64;

    async fn get_root(&self) -> Result<Option<u64>> {
        self.inner.get_root().await
    }

    async fn write_root(&self, id: u64) -> Result<u64> {
        self.inner.write_root(id).await
    }

    async fn clear_root(&self) -> Result<()> {
        self.inner.clear_root().await
    }

    async fn read(&self, id: &u64) -> Result<Node<u64, u32>> {
        self.inner.read(id).await
    }

    async fn write(&self, id: &u64, node: &Node<u64, u32>) -> Result<u64> {
        self.trip(Fault::Write)?;
        self.inner.write(id, node).await
    }

    async fn remove(&self, id: &u64) -> Result<()> {
        self.trip(Fault::Remove)?;
        self.inner.remove(id).await
    }

    async fn allocate(&self, node: &Node<u64, u32>) -> Result<u64> {
        self.inner.allocate(node).await
    }

    async fn read_data(&self, id: &u64) -> Result<String> {
        self.trip(Fault::ReadData)?;
        self.inner.read_data(id).await
    }

    async fn write_data(&self, id: &u64, value: &String) -> Result<u64> {
        self.inner.write_data(id, value).await
    }

    async fn remove_data(&self, id: &u64) -> Result<()> {
        self.trip(Fault::Remove)?;
        self.inner.remove_data(id).await
    }

    async fn allocate_data(&self, value: &String) -> Result<u64> {
        self.inner.allocate_data(value).await
    }
}

pub async fn faulty_btree(node_size: usize) -> (Arc<FaultyStore>, BTree<u32, String, FaultyStore>) {
    let store = Arc::new(FaultyStore::default());
    let tree = BTree::with_natural_order(Arc::clone(&store), TreeConfig::new(node_size)).expect("valid config");
    (store, tree)
}

pub async fn faulty_bplus(node_size: usize) -> (Arc<FaultyStore>, BPlusTree<u32, String, FaultyStore>) {
    let store = Arc::new(FaultyStore::default());
    let tree = BPlusTree::with_natural_order(Arc::clone(&store), TreeConfig::new(node_size)).expect("valid config");
    (store, tree)
}

/// Allocates and writes a leaf holding `keys`, with a value record per key.
pub async fn put_leaf(store: &MemStore, keys: &[u32]) -> u64 {
    let mut data = Vec::new();
    for &key in keys {
        data.push(put_value(store, key).await);
    }
    let leaf = Node::new_leaf(keys.to_vec(), data);
    let id = store.allocate(&leaf).await.unwrap();
    store.write(&id, &leaf).await.unwrap();
    id
}

pub async fn put_value(store: &MemStore, key: u32) -> u64 {
    let id = store.allocate_data(&value_for(key)).await.unwrap();
    store.write_data(&id, &value_for(key)).await.unwrap()
}
