// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Runtime invariant checks for sealed trees.
//!
//! These walk a whole tree and verify the structural invariants the rest
//! of the crate relies on. They are deliberately exhaustive and therefore
//! not free: call them from tests and debugging sessions, not from hot
//! paths.
//!
//! # INVARIANTS (what `verify_tree_invariants` enforces)
//!
//! 1. Root record: `start == end == 0`, `depth == 0`.
//! 2. Child arrays: keys strictly ascending under signed comparison,
//!    child offsets inside the arena, each child's first edge symbol
//!    equals its key.
//! 3. `depth_from_root` of every child equals the parent's full path
//!    length.
//! 4. `leaf_count` of every internal node equals the sum over children;
//!    leaves hold exactly 1.
//! 5. Internal non-root nodes have at least two children.
//! 6. Every internal non-root node's suffix link resolves (directly or
//!    through a jump slot) to an internal node whose path is this node's
//!    path with the first code unit removed.

use crate::error::{Result, TreeError};
use crate::navigate::TreeNav;
use crate::storage::Storage;
use crate::tree::SuffixTree;

/// Verify every structural invariant of a sealed tree. Returns the first
/// violation as an `InvalidFormat` error naming node and offense.
pub fn verify_tree_invariants<S: Storage>(tree: &SuffixTree<S>) -> Result<()> {
    let nav = tree.navigator();
    let root = nav.root();
    let arena_size = tree.stats().arena_size;

    if nav.node_start(root)? != 0 || nav.node_end_raw(root)? != 0 {
        return Err(TreeError::invalid_format("root record has a non-empty edge"));
    }

    let mut stack = vec![(root, 0u32)];
    while let Some((node, expected_depth)) = stack.pop() {
        let depth = nav.depth_from_root(node)?;
        if depth != expected_depth {
            return Err(TreeError::invalid_format(format!(
                "node {} stores depth {}, expected {}",
                node.offset(),
                depth,
                expected_depth
            )));
        }

        if nav.is_leaf(node)? {
            if nav.leaf_count(node)? != 1 {
                return Err(TreeError::invalid_format(format!(
                    "leaf {} has leaf_count {}",
                    node.offset(),
                    nav.leaf_count(node)?
                )));
            }
            continue;
        }

        let info = nav.child_array(node)?;
        if node != root && info.count < 2 {
            return Err(TreeError::invalid_format(format!(
                "internal node {} has {} children",
                node.offset(),
                info.count
            )));
        }

        let full_depth = depth + nav.edge_length(node)?;
        let mut previous_key: Option<i32> = None;
        let mut leaf_sum = 0u32;
        for index in 0..info.count {
            let (key, child) = nav.child_entry(&info, index)?;
            if previous_key.map_or(false, |prev| key <= prev) {
                return Err(TreeError::invalid_format(format!(
                    "child keys of node {} are not strictly ascending at entry {}",
                    node.offset(),
                    index
                )));
            }
            previous_key = Some(key);
            if child.offset() >= arena_size {
                return Err(TreeError::invalid_format(format!(
                    "child {} of node {} is outside the arena",
                    child.offset(),
                    node.offset()
                )));
            }
            if nav.edge_symbol(child, 0)? != key {
                return Err(TreeError::invalid_format(format!(
                    "child {} of node {} starts with a symbol different from its key",
                    child.offset(),
                    node.offset()
                )));
            }
            leaf_sum += nav.leaf_count(child)?;
            stack.push((child, full_depth));
        }
        if nav.leaf_count(node)? != leaf_sum {
            return Err(TreeError::invalid_format(format!(
                "node {} stores leaf_count {}, children sum to {}",
                node.offset(),
                nav.leaf_count(node)?,
                leaf_sum
            )));
        }

        if node != root {
            verify_suffix_link(tree, &nav, node, full_depth)?;
        }
    }
    Ok(())
}

fn verify_suffix_link<S: Storage>(
    tree: &SuffixTree<S>,
    nav: &crate::navigate::Navigator<'_, S>,
    node: crate::navigate::NodeHandle,
    node_path_len: u32,
) -> Result<()> {
    let target = nav.suffix_link(node)?;
    if nav.is_leaf(target)? {
        return Err(TreeError::invalid_format(format!(
            "suffix link of node {} points to leaf {}",
            node.offset(),
            target.offset()
        )));
    }
    let target_len = nav.path_length(target)?;
    if target_len + 1 != node_path_len {
        return Err(TreeError::invalid_format(format!(
            "suffix link of node {} drops path length from {} to {}",
            node.offset(),
            node_path_len,
            target_len
        )));
    }
    // The target's path must be this node's path shifted by one unit.
    let node_occurrence = nav.find_any_leaf_position(node)?;
    let target_occurrence = nav.find_any_leaf_position(target)?;
    let shifted = tree.text_substring(node_occurrence + 1, node_path_len - 1)?;
    let target_path = tree.text_substring(target_occurrence, target_len)?;
    if shifted != target_path {
        return Err(TreeError::invalid_format(format!(
            "suffix link of node {} reaches path {:?}, expected {:?}",
            node.offset(),
            target_path,
            shifted
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::HeapArena;

    #[test]
    fn well_formed_trees_pass() {
        for text in ["", "a", "aa", "banana", "mississippi", "abcabcabc"] {
            let tree = SuffixTree::build_in_memory(text).unwrap();
            verify_tree_invariants(&tree).unwrap_or_else(|err| {
                panic!("invariant violated for {:?}: {}", text, err);
            });
        }
    }

    #[test]
    fn hybrid_trees_pass() {
        use crate::builder::{BuildOptions, TreeBuilder, MIN_COMPACT_LIMIT};
        use crate::layout::LayoutKind;
        use crate::text::Text;

        let options = BuildOptions {
            layout: LayoutKind::Compact,
            compact_limit: MIN_COMPACT_LIMIT,
        };
        let tree = TreeBuilder::with_options(HeapArena::new(), options)
            .build(&Text::from("the quick brown fox jumps over the lazy dog"))
            .unwrap();
        verify_tree_invariants(&tree).unwrap();
    }

    #[test]
    fn corrupted_leaf_count_is_caught() {
        let tree = SuffixTree::build_in_memory("banana").unwrap();
        let mut bytes = tree.as_bytes().to_vec();
        // Root leaf_count lives at root offset 80 + compact field offset 16.
        bytes[96..100].copy_from_slice(&55u32.to_le_bytes());
        let corrupted = SuffixTree::from_bytes(bytes).unwrap();
        assert!(verify_tree_invariants(&corrupted).is_err());
    }
}
