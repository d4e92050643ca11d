//! Left-balanced tree properties
//!
//! Drives [`LeftTree`] through random add/remove sequences and checks after
//! every step:
//!
//! - the live leaves are exactly the members we placed
//! - every leaf's path ends at the current root
//! - left children are perfect and never shorter than their right siblings
//! - aggregate counts agree with a recount
//! - the previous version of the tree is still intact

use proptest::prelude::*;
use std::collections::BTreeSet;
use treekem_cgka::{
    EpochId, LeftTree, Mutation, NodeId, PersistentTree, Placement, Removal, TreeStrategy,
};

#[derive(Debug, Clone)]
enum TreeOp {
    Add { hint: usize },
    Remove { index: usize },
}

fn arb_tree_op() -> impl Strategy<Value = TreeOp> {
    prop_oneof![
        3 => any::<usize>().prop_map(|hint| TreeOp::Add { hint }),
        2 => any::<usize>().prop_map(|index| TreeOp::Remove { index }),
    ]
}

fn arb_strategy() -> impl Strategy<Value = LeftTree> {
    (
        prop_oneof![
            Just(Placement::Greedy),
            Just(Placement::Random),
            Just(Placement::Append)
        ],
        prop_oneof![Just(Removal::Keep), Just(Removal::Truncate)],
        any::<u64>(),
    )
        .prop_map(|(placement, removal, seed)| LeftTree::new(placement, removal, seed))
}

/// Recount leaves and tombstones and check the shape rule at every node
fn check_shape(tree: &PersistentTree, node: NodeId) -> Result<(u32, u32), TestCaseError> {
    let entry = tree.node(node);
    if entry.is_leaf() {
        let removed = u32::from(entry.is_removed());
        prop_assert_eq!(entry.removed_count(), removed);
        return Ok((1, removed));
    }
    let children = entry.children();
    prop_assert_eq!(children.len(), 2);
    let (left, right) = (tree.node(children[0]), tree.node(children[1]));
    prop_assert!(left.is_perfect(), "{} has an imperfect left child", node);
    prop_assert!(right.height() <= left.height());
    prop_assert_eq!(entry.height(), left.height() + 1);

    let (left_leaves, left_removed) = check_shape(tree, children[0])?;
    let (right_leaves, right_removed) = check_shape(tree, children[1])?;
    prop_assert_eq!(entry.leaf_count(), left_leaves + right_leaves);
    prop_assert_eq!(entry.removed_count(), left_removed + right_removed);
    Ok((left_leaves + right_leaves, left_removed + right_removed))
}

fn check_paths(
    tree: &PersistentTree,
    epoch: EpochId,
    root: NodeId,
    live: &[NodeId],
) -> Result<(), TestCaseError> {
    let placed: BTreeSet<_> = live.iter().copied().collect();
    let found: BTreeSet<_> = tree.live_leaves(root).into_iter().collect();
    prop_assert_eq!(&placed, &found);
    for &leaf in live {
        let path = tree.path(leaf, epoch);
        prop_assert_eq!(path.first(), Some(&leaf));
        prop_assert_eq!(path.last(), Some(&root));
        prop_assert_eq!(tree.root_of(leaf, epoch, true), root);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_left_tree_invariants(
        mut strategy in arb_strategy(),
        initial in 1usize..12,
        ops in prop::collection::vec(arb_tree_op(), 0..40),
    ) {
        let mut tree = PersistentTree::new();
        let genesis = tree.epochs().genesis();
        let Mutation { mut epoch, mut root } = strategy.init(&mut tree, initial, genesis).unwrap();
        tree.seal(epoch, root);
        let mut live = tree.live_leaves(root);
        prop_assert_eq!(live.len(), initial);

        for op in ops {
            let (previous_epoch, previous_root) = (epoch, root);
            let previous_live = live.clone();
            let next = tree.step(epoch);

            match op {
                TreeOp::Add { hint } => {
                    let leaf = tree.new_leaf(next);
                    let hint = live[hint % live.len()];
                    let tombstones = tree.node(root).removed_count();
                    let width = tree.node(root).leaf_count();

                    let mutation = strategy.add(&mut tree, next, root, leaf, Some(hint)).unwrap();
                    tree.seal(mutation.epoch, mutation.root);
                    (epoch, root) = (mutation.epoch, mutation.root);
                    live.push(leaf);

                    prop_assert_eq!(tree.trace_leaf(root), leaf);
                    if tombstones > 0 && strategy.placement() == Placement::Greedy {
                        prop_assert_eq!(tree.node(root).leaf_count(), width);
                        prop_assert_eq!(tree.node(root).removed_count(), tombstones - 1);
                    }
                    if strategy.placement() == Placement::Append {
                        prop_assert_eq!(tree.node(root).leaf_count(), width + 1);
                    }
                }
                TreeOp::Remove { index } => {
                    if live.len() == 1 {
                        prop_assert!(strategy.remove(&mut tree, next, root, live[0], None).is_err());
                        continue;
                    }
                    let victim = live.swap_remove(index % live.len());
                    let mutation = strategy.remove(&mut tree, next, root, victim, None).unwrap();
                    tree.seal(mutation.epoch, mutation.root);
                    (epoch, root) = (mutation.epoch, mutation.root);

                    if strategy.removal() == Removal::Truncate {
                        let leaves = tree.leaves(root);
                        let last = leaves.last().copied().unwrap();
                        prop_assert!(!tree.node(last).is_removed());
                    }
                }
            }

            check_shape(&tree, root)?;
            check_paths(&tree, epoch, root, &live)?;
            // Older versions stay readable
            check_paths(&tree, previous_epoch, previous_root, &previous_live)?;
        }
    }
}

#[test]
fn test_forked_versions_coexist() {
    let mut strategy = LeftTree::default();
    let mut tree = PersistentTree::new();
    let genesis = tree.epochs().genesis();
    let Mutation { epoch, root } = strategy.init(&mut tree, 4, genesis).unwrap();
    tree.seal(epoch, root);
    let leaves = tree.live_leaves(root);

    let left = tree.step(epoch);
    let joiner = tree.new_leaf(left);
    let grown = strategy.add(&mut tree, left, root, joiner, None).unwrap();
    tree.seal(grown.epoch, grown.root);

    let right = tree.step(epoch);
    let shrunk = strategy.remove(&mut tree, right, root, leaves[3], None).unwrap();
    tree.seal(shrunk.epoch, shrunk.root);

    assert!(!tree.epochs().comparable(left, right));
    assert_eq!(tree.root_of(leaves[0], left, false), grown.root);
    assert_eq!(tree.root_of(leaves[0], right, false), shrunk.root);
    assert_eq!(tree.root_of(leaves[0], epoch, false), root);
    assert_eq!(tree.node(grown.root).live_count(), 5);
    assert_eq!(tree.node(shrunk.root).live_count(), 3);
}
