// Storage failures and malformed trees surface as errors, not panics.

mod common;

use std::sync::Arc;

use async_btree::{BPlusTree, BTree, Node, NodeStore, Result, Tree, TreeConfig, TreeCursor, TreeError};

use common::*;

fn assert_injected<T: std::fmt::Debug>(result: Result<T>, fault: Fault) {
    match result {
        Err(TreeError::StorageError(message)) => {
            assert_eq!(message, format!("injected {:?} failure", fault));
        }
        other => panic!("expected the injected {:?} failure, got {:?}", fault, other),
    }
}

async fn seed<T: Tree<u32, String>>(tree: &mut T) {
    for key in shuffled(0..20, 2) {
        tree.insert(key, value_for(key), false).await.unwrap();
    }
}

async fn failed_write_reaches_insert<T: Tree<u32, String>>(tree: &mut T, store: &FaultyStore) {
    seed(tree).await;
    store.fail_on(Fault::Write, 1);
    assert_injected(tree.insert(100, value_for(100), false).await, Fault::Write);
}

async fn failed_read_reaches_get<T: Tree<u32, String>>(tree: &mut T, store: &FaultyStore) {
    seed(tree).await;
    store.fail_on(Fault::ReadData, 1);
    assert_injected(tree.get(&7).await, Fault::ReadData);
    assert_eq!(tree.get(&7).await.unwrap(), Some(value_for(7)));
}

async fn failed_removal_reaches_remove<T: Tree<u32, String>>(tree: &mut T, store: &FaultyStore) {
    seed(tree).await;
    store.fail_on(Fault::Remove, 1);
    assert_injected(tree.remove(&3).await, Fault::Remove);
}

async fn failed_read_reaches_cursor<T: Tree<u32, String>>(tree: &mut T, store: &FaultyStore) {
    seed(tree).await;
    let mut values = tree.iterator(None).await.unwrap();
    store.fail_on(Fault::ReadData, 3);
    assert_eq!(values.next().await.unwrap(), Some(value_for(0)));
    assert_eq!(values.next().await.unwrap(), Some(value_for(1)));
    assert_injected(values.next().await, Fault::ReadData);
}

macro_rules! fault_suite {
    ($suite:ident, $make:path) => {
        mod $suite {
            use super::*;

            #[tokio::test]
            async fn failed_write_reaches_insert() {
                let (store, mut tree) = $make(2).await;
                super::failed_write_reaches_insert(&mut tree, &store).await;
            }

            #[tokio::test]
            async fn failed_read_reaches_get() {
                let (store, mut tree) = $make(2).await;
                super::failed_read_reaches_get(&mut tree, &store).await;
            }

            #[tokio::test]
            async fn failed_removal_reaches_remove() {
                let (store, mut tree) = $make(2).await;
                super::failed_removal_reaches_remove(&mut tree, &store).await;
            }

            #[tokio::test]
            async fn failed_read_reaches_cursor() {
                let (store, mut tree) = $make(2).await;
                super::failed_read_reaches_cursor(&mut tree, &store).await;
            }
        }
    };
}

fault_suite!(btree_faults, common::faulty_btree);
fault_suite!(bplus_faults, common::faulty_bplus);

/// A root with one key over three leaves: `[1] [15] [30, 31, 32]`.
/// Removing 15 has to borrow from the right leaf through a separator
/// the root does not have.
async fn one_key_over_three_leaves(store: &MemStore, with_value: bool) {
    let mut children = Vec::new();
    for keys in [vec![1u32], vec![15], vec![30, 31, 32]] {
        children.push(put_leaf(store, &keys).await);
    }
    let data = if with_value { vec![put_value(store, 10).await] } else { Vec::new() };
    let root = Node::new_internal(vec![10], data, children);
    let root_id = store.allocate(&root).await.unwrap();
    store.write(&root_id, &root).await.unwrap();
    store.write_root(root_id).await.unwrap();
}

#[tokio::test]
async fn btree_with_extra_child_fails_removal_with_structure_error() {
    let store = Arc::new(MemStore::new());
    one_key_over_three_leaves(&store, true).await;
    let mut tree = BTree::with_natural_order(Arc::clone(&store), TreeConfig::new(2)).unwrap();

    assert!(matches!(tree.verify().await, Err(TreeError::Structure(_))));
    assert!(matches!(tree.remove(&15).await, Err(TreeError::Structure(_))));
}

#[tokio::test]
async fn bplus_tree_with_extra_child_fails_removal_with_structure_error() {
    let store = Arc::new(MemStore::new());
    one_key_over_three_leaves(&store, false).await;
    let mut tree = BPlusTree::with_natural_order(Arc::clone(&store), TreeConfig::new(2)).unwrap();

    assert!(matches!(tree.verify().await, Err(TreeError::Structure(_))));
    assert!(matches!(tree.remove(&15).await, Err(TreeError::Structure(_))));
}

#[tokio::test]
async fn btree_node_missing_value_handles_fails_lookup_with_structure_error() {
    let store = Arc::new(MemStore::new());
    let left = put_leaf(&store, &[1]).await;
    let right = put_leaf(&store, &[30]).await;
    let root = Node::new_internal(vec![10], Vec::new(), vec![left, right]);
    let root_id = store.allocate(&root).await.unwrap();
    store.write(&root_id, &root).await.unwrap();
    store.write_root(root_id).await.unwrap();

    let tree = BTree::with_natural_order(Arc::clone(&store), TreeConfig::new(2)).unwrap();
    assert!(matches!(tree.get(&10).await, Err(TreeError::Structure(_))));
    assert_eq!(tree.get(&30).await.unwrap(), Some(value_for(30)));
}
