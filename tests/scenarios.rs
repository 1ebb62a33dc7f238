// Behaviour shared by both engines, run against both storage backends.

mod common;

use std::collections::BTreeMap;

use async_btree::{Tree, TreeCursor, TreeError};
use futures::TryStreamExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use common::*;

async fn keys_of<T: Tree<u32, String>>(tree: &T) -> Vec<u32> {
    tree.iterator_keys(None).await.unwrap().collect_vec().await.unwrap()
}

async fn insert_all<T: Tree<u32, String>>(tree: &mut T, keys: &[u32]) {
    for &key in keys {
        assert_eq!(tree.insert(key, value_for(key), false).await.unwrap(), None);
    }
}

async fn shuffled_inserts_iterate_in_order<T: Tree<u32, String>>(tree: &mut T) {
    insert_all(tree, &shuffled(0..100, 7)).await;
    tree.verify().await.unwrap();

    let expected: Vec<u32> = (0..100).collect();
    assert_eq!(keys_of(tree).await, expected);

    let reversed = tree.reverse_iterator_keys(None).await.unwrap().collect_vec().await.unwrap();
    assert_eq!(reversed, expected.iter().rev().copied().collect::<Vec<_>>());

    assert_eq!(tree.smallest().await.unwrap(), Some(0));
    assert_eq!(tree.biggest().await.unwrap(), Some(99));

    let values = tree.iterator(None).await.unwrap().collect_vec().await.unwrap();
    assert_eq!(values, expected.iter().map(|&k| value_for(k)).collect::<Vec<_>>());
    for key in 0..100 {
        assert_eq!(tree.get(&key).await.unwrap(), Some(value_for(key)));
    }
}

async fn removing_a_prefix_leaves_the_last_key<T: Tree<u32, String>>(tree: &mut T) {
    insert_all(tree, &(0..10).collect::<Vec<_>>()).await;
    for key in 0..9 {
        assert_eq!(tree.remove(&key).await.unwrap(), Some(value_for(key)));
        tree.verify().await.unwrap();
    }
    assert_eq!(keys_of(tree).await, vec![9]);
    assert_eq!(tree.smallest().await.unwrap(), Some(9));
    assert_eq!(tree.biggest().await.unwrap(), Some(9));
}

async fn duplicates_follow_the_overwrite_flag<T: Tree<u32, String>>(tree: &mut T) {
    insert_all(tree, &shuffled(0..30, 3)).await;
    for key in [0, 13, 29] {
        let err = tree.insert(key, "second".to_string(), false).await.unwrap_err();
        assert!(matches!(err, TreeError::DuplicateKey));
        assert_eq!(tree.get(&key).await.unwrap(), Some(value_for(key)));

        let previous = tree.insert(key, "second".to_string(), true).await.unwrap();
        assert_eq!(previous, Some(value_for(key)));
        assert_eq!(tree.get(&key).await.unwrap(), Some("second".to_string()));
    }
    tree.verify().await.unwrap();
    assert_eq!(keys_of(tree).await.len(), 30);
}

async fn removing_absent_keys_changes_nothing<T: Tree<u32, String>>(tree: &mut T) {
    assert_eq!(tree.remove(&5).await.unwrap(), None);
    insert_all(tree, &(0..40).map(|k| k * 3).collect::<Vec<_>>()).await;
    for absent in [1, 50, 200] {
        assert_eq!(tree.remove(&absent).await.unwrap(), None);
    }
    assert_eq!(keys_of(tree).await, (0..40).map(|k| k * 3).collect::<Vec<_>>());
    assert_eq!(tree.get(&50).await.unwrap(), None);
    tree.verify().await.unwrap();
}

async fn keyed_cursors_match_the_sorted_sequence<T: Tree<u32, String>>(tree: &mut T) {
    let keys: Vec<u32> = shuffled(0..120, 11).into_iter().map(|k| k * 2).collect();
    insert_all(tree, &keys).await;
    let mut sorted = keys.clone();
    sorted.sort_unstable();

    for probe in [0, 1, 2, 57, 58, 117, 238, 239, 500] {
        let ascending = tree.iterator_keys(Some(&probe)).await.unwrap().collect_vec().await.unwrap();
        let expected: Vec<u32> = sorted.iter().copied().filter(|&k| k >= probe).collect();
        assert_eq!(ascending, expected, "ascending from {}", probe);

        let descending = tree
            .reverse_iterator_keys(Some(&probe))
            .await
            .unwrap()
            .collect_vec()
            .await
            .unwrap();
        let expected: Vec<u32> = sorted.iter().rev().copied().filter(|&k| k <= probe).collect();
        assert_eq!(descending, expected, "descending from {}", probe);
    }
}

async fn nearest_lookups_fall_back_to_neighbours<T: Tree<u32, String>>(tree: &mut T) {
    assert_eq!(tree.get_nearest(&10, false).await.unwrap(), None);
    insert_all(tree, &[10, 20, 30, 40]).await;
    assert_eq!(tree.get_nearest(&20, false).await.unwrap(), Some(value_for(20)));
    assert_eq!(tree.get_nearest(&21, false).await.unwrap(), Some(value_for(30)));
    assert_eq!(tree.get_nearest(&21, true).await.unwrap(), Some(value_for(20)));
    assert_eq!(tree.get_nearest(&41, false).await.unwrap(), None);
    assert_eq!(tree.get_nearest(&9, true).await.unwrap(), None);
}

async fn traverse_and_stream_visit_every_value_once<T: Tree<u32, String>>(tree: &mut T) {
    insert_all(tree, &shuffled(0..25, 5)).await;

    let mut seen = Vec::new();
    tree.traverse(|value| seen.push(value)).await.unwrap();
    assert_eq!(seen, (0..25).map(value_for).collect::<Vec<_>>());

    let streamed: Vec<u32> = tree
        .iterator_keys(Some(&20))
        .await
        .unwrap()
        .into_stream()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(streamed, vec![20, 21, 22, 23, 24]);
}

async fn draining_the_tree_empties_the_store<T: Tree<u32, String>>(tree: &mut T) {
    insert_all(tree, &shuffled(0..60, 21)).await;
    for key in shuffled(0..60, 22) {
        assert_eq!(tree.remove(&key).await.unwrap(), Some(value_for(key)));
    }
    assert!(tree.read_root().await.unwrap().is_none());
    assert_eq!(tree.smallest().await.unwrap(), None);
    assert!(keys_of(tree).await.is_empty());
    assert!(tree.reverse_iterator(None).await.unwrap().next().await.unwrap().is_none());

    // The tree grows back from nothing.
    insert_all(tree, &[3, 1, 2]).await;
    assert_eq!(keys_of(tree).await, vec![1, 2, 3]);
}

async fn random_workload_matches_a_model<T: Tree<u32, String>>(tree: &mut T) {
    let mut rng = StdRng::seed_from_u64(0xB7EE);
    let mut model = BTreeMap::new();
    for step in 0..600 {
        let key = rng.random_range(0..150u32);
        if rng.random_bool(0.6) {
            let value = format!("{}@{}", key, step);
            let previous = tree.insert(key, value.clone(), true).await.unwrap();
            assert_eq!(previous, model.insert(key, value));
        } else {
            assert_eq!(tree.remove(&key).await.unwrap(), model.remove(&key));
        }
        if step % 50 == 0 {
            tree.verify().await.unwrap();
        }
    }
    tree.verify().await.unwrap();

    let entries = tree.iterator(None).await.unwrap().collect_vec().await.unwrap();
    assert_eq!(entries, model.values().cloned().collect::<Vec<_>>());
    assert_eq!(keys_of(tree).await, model.keys().copied().collect::<Vec<_>>());
}

macro_rules! engine_suite {
    ($suite:ident, $make:path) => {
        mod $suite {
            use super::*;

            #[tokio::test]
            async fn shuffled_inserts_iterate_in_order() {
                let (_guard, mut tree) = $make(2).await;
                super::shuffled_inserts_iterate_in_order(&mut tree).await;
            }

            #[tokio::test]
            async fn removing_a_prefix_leaves_the_last_key() {
                let (_guard, mut tree) = $make(2).await;
                super::removing_a_prefix_leaves_the_last_key(&mut tree).await;
            }

            #[tokio::test]
            async fn duplicates_follow_the_overwrite_flag() {
                let (_guard, mut tree) = $make(2).await;
                super::duplicates_follow_the_overwrite_flag(&mut tree).await;
            }

            #[tokio::test]
            async fn removing_absent_keys_changes_nothing() {
                let (_guard, mut tree) = $make(2).await;
                super::removing_absent_keys_changes_nothing(&mut tree).await;
            }

            #[tokio::test]
            async fn keyed_cursors_match_the_sorted_sequence() {
                let (_guard, mut tree) = $make(3).await;
                super::keyed_cursors_match_the_sorted_sequence(&mut tree).await;
            }

            #[tokio::test]
            async fn nearest_lookups_fall_back_to_neighbours() {
                let (_guard, mut tree) = $make(2).await;
                super::nearest_lookups_fall_back_to_neighbours(&mut tree).await;
            }

            #[tokio::test]
            async fn traverse_and_stream_visit_every_value_once() {
                let (_guard, mut tree) = $make(2).await;
                super::traverse_and_stream_visit_every_value_once(&mut tree).await;
            }

            #[tokio::test]
            async fn draining_the_tree_empties_the_store() {
                let (_guard, mut tree) = $make(2).await;
                super::draining_the_tree_empties_the_store(&mut tree).await;
            }

            #[tokio::test]
            async fn random_workload_matches_a_model() {
                let (_guard, mut tree) = $make(3).await;
                super::random_workload_matches_a_model(&mut tree).await;
            }
        }
    };
}

engine_suite!(btree_in_memory, common::mem_btree);
engine_suite!(bplus_in_memory, common::mem_bplus);
engine_suite!(btree_on_disk, common::disk_btree);
engine_suite!(bplus_on_disk, common::disk_bplus);
