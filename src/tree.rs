// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! The sealed suffix tree and its query surface.
//!
//! A [`SuffixTree`] wraps a sealed arena: it validates the header once at
//! construction and afterwards answers every query by reading node records
//! through a zone-aware [`Navigator`]. The tree is immutable; any number of
//! threads may query it concurrently.
//!
//! Query costs, with `m` the pattern length and `k` the number of results:
//!
//! | operation | cost |
//! |---|---|
//! | `contains` | O(m log σ) |
//! | `count_occurrences` | O(m log σ) |
//! | `find_all_occurrences` | O(m log σ + k) |
//! | `longest_repeated_substring` | O(1) hybrid, O(n) otherwise, cached |
//! | `longest_common_substring` | O(m log σ) |
//! | `find_exact_match_anchors` | O(m log σ + k) |

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::debug;

use crate::algorithms::{exact_match_anchors, longest_common_match, MatchAnchor, MatchSpan};
use crate::builder::TreeBuilder;
use crate::error::{Result, TreeError};
use crate::header::{TreeHeader, VERSION_HYBRID};
use crate::layout::TERMINATOR_KEY;
use crate::navigate::{Navigator, NodeHandle, TreeNav};
use crate::resolver::ZoneResolver;
use crate::storage::{FileArena, HeapArena, Storage};
use crate::text::{encode_units, Text};

/// Everything the traversal visitor learns about one node.
#[derive(Debug, Clone, Copy)]
pub struct NodeInfo {
    pub offset: u64,
    pub start: u32,
    /// Raw `end` field; `u32::MAX` marks a leaf.
    pub end: u32,
    pub leaf_count: u32,
    pub child_count: u32,
    pub depth: u32,
}

/// Depth-first visitor over the tree shape. `visit_node` fires once per
/// node; `enter_branch`/`exit_branch` bracket each child subtree in sorted
/// key order, so the event stream is deterministic for a given tree shape.
pub trait TreeVisitor {
    fn visit_node(&mut self, node: &NodeInfo);
    fn enter_branch(&mut self, key: i32);
    fn exit_branch(&mut self);
}

/// Diagnostic snapshot of a sealed tree.
#[derive(Debug, Clone, Serialize)]
pub struct TreeStats {
    pub version: u32,
    pub node_count: u32,
    pub text_len: u32,
    pub arena_size: u64,
    pub transition: Option<u64>,
    pub jump_range: Option<(u64, u64)>,
}

/// A sealed, immutable suffix tree over an arena.
#[derive(Debug)]
pub struct SuffixTree<S: Storage> {
    arena: S,
    header: TreeHeader,
    resolver: ZoneResolver,
    lrs_cache: OnceCell<String>,
}

impl SuffixTree<HeapArena> {
    /// Build an in-memory tree for `text`.
    pub fn build_in_memory(text: &str) -> Result<Self> {
        TreeBuilder::new(HeapArena::new()).build(&Text::from(text))
    }

    /// Adopt a previously sealed arena image.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_arena(HeapArena::from_bytes(bytes))
    }

    /// The sealed arena image, byte-compatible with the file format.
    pub fn as_bytes(&self) -> &[u8] {
        self.arena.as_bytes()
    }

    /// Write the sealed arena image to a file loadable with
    /// [`SuffixTree::load_from_file`].
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        std::fs::write(path, self.arena.as_bytes())?;
        Ok(())
    }
}

impl SuffixTree<FileArena> {
    /// Build a tree whose arena lives in `path`. The file is removed if
    /// the build fails.
    pub fn build_to_file(path: impl AsRef<std::path::Path>, text: &str) -> Result<Self> {
        let arena = FileArena::create(path)?;
        TreeBuilder::new(arena).build(&Text::from(text))
    }

    /// Map a sealed tree file and validate its header.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::from_arena(FileArena::open(path)?)
    }
}

impl<S: Storage> SuffixTree<S> {
    /// Wrap a sealed arena, validating every header invariant.
    pub fn from_arena(arena: S) -> Result<Self> {
        let header = TreeHeader::read(&arena)?;
        header.validate(arena.size())?;
        let resolver = header.resolver();
        debug!(
            version = header.version,
            nodes = header.node_count,
            text_len = header.text_len,
            "opened suffix tree"
        );
        Ok(Self {
            arena,
            header,
            resolver,
            lrs_cache: OnceCell::new(),
        })
    }

    /// Construction path used by the builder, which just sealed the header
    /// itself.
    pub(crate) fn from_parts(arena: S, header: TreeHeader) -> Self {
        let resolver = header.resolver();
        Self {
            arena,
            header,
            resolver,
            lrs_cache: OnceCell::new(),
        }
    }

    pub fn navigator(&self) -> Navigator<'_, S> {
        Navigator::new(
            &self.arena,
            self.resolver,
            self.header.root,
            self.header.text_region,
            self.header.text_len,
        )
    }

    pub fn text_len(&self) -> u32 {
        self.header.text_len
    }

    pub fn node_count(&self) -> u32 {
        self.header.node_count
    }

    pub fn version(&self) -> u32 {
        self.header.version
    }

    /// Number of real suffixes: the root's raw count minus the terminator
    /// leaf.
    pub fn leaf_count(&self) -> Result<u32> {
        let nav = self.navigator();
        Ok(nav.leaf_count(nav.root())?.saturating_sub(1))
    }

    pub fn stats(&self) -> TreeStats {
        TreeStats {
            version: self.header.version,
            node_count: self.header.node_count,
            text_len: self.header.text_len,
            arena_size: self.arena.size(),
            transition: self.resolver.transition(),
            jump_range: if self.header.version == VERSION_HYBRID {
                Some(self.resolver.jump_range())
            } else {
                None
            },
        }
    }

    /// Decode `len` code units of the indexed text starting at `start`.
    pub fn text_substring(&self, start: u32, len: u32) -> Result<String> {
        if start > self.header.text_len {
            return Err(TreeError::invalid_argument(format!(
                "substring start {} is past text length {}",
                start, self.header.text_len
            )));
        }
        let len = len.min(self.header.text_len - start);
        let mut bytes = vec![0u8; len as usize * 2];
        self.arena.read_bytes(
            self.header.text_region + 2 * u64::from(start),
            &mut bytes,
        )?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(String::from_utf16_lossy(&units))
    }

    /// The whole indexed text.
    pub fn text_string(&self) -> Result<String> {
        self.text_substring(0, self.header.text_len)
    }

    /// Raw little-endian text bytes starting at code unit `start_unit`;
    /// fills all of `out`.
    pub(crate) fn read_text_bytes(&self, start_unit: u32, out: &mut [u8]) -> Result<()> {
        self.arena.read_bytes(
            self.header.text_region + 2 * u64::from(start_unit),
            out,
        )
    }

    // ------------------------------------------------------------------
    // Pattern walk
    // ------------------------------------------------------------------

    /// Walk `pattern` from the root. Returns the node at or below the end
    /// of the pattern, or `None` on any mismatch.
    fn walk_pattern(&self, pattern: &[u16]) -> Result<Option<NodeHandle>> {
        let nav = self.navigator();
        let mut node = nav.root();
        let mut consumed = 0usize;
        while consumed < pattern.len() {
            let key = i32::from(pattern[consumed]);
            let child = match nav.child_by_key(node, key)? {
                Some(child) => child,
                None => return Ok(None),
            };
            let edge_len = nav.edge_length(child)? as usize;
            let take = edge_len.min(pattern.len() - consumed);
            for k in 0..take {
                if nav.edge_symbol(child, k as u32)? != i32::from(pattern[consumed + k]) {
                    return Ok(None);
                }
            }
            consumed += take;
            node = child;
        }
        Ok(Some(node))
    }

    /// True iff `pattern` occurs in the text. The empty pattern occurs
    /// everywhere.
    pub fn contains(&self, pattern: &str) -> Result<bool> {
        let units = encode_units(pattern);
        if units.is_empty() {
            return Ok(true);
        }
        Ok(self.walk_pattern(&units)?.is_some())
    }

    /// Number of occurrences of `pattern`; the empty pattern occurs at
    /// every position.
    pub fn count_occurrences(&self, pattern: &str) -> Result<u32> {
        let units = encode_units(pattern);
        if units.is_empty() {
            return Ok(self.header.text_len);
        }
        match self.walk_pattern(&units)? {
            None => Ok(0),
            Some(node) => self.navigator().leaf_count(node),
        }
    }

    /// Sorted starting positions of every occurrence of `pattern`.
    pub fn find_all_occurrences(&self, pattern: &str) -> Result<Vec<u32>> {
        let units = encode_units(pattern);
        if units.is_empty() {
            return Ok((0..self.header.text_len).collect());
        }
        let mut positions = Vec::new();
        if let Some(node) = self.walk_pattern(&units)? {
            self.navigator().collect_leaf_positions(node, &mut positions)?;
        }
        positions.sort_unstable();
        Ok(positions)
    }

    // ------------------------------------------------------------------
    // Repeats and common substrings
    // ------------------------------------------------------------------

    /// Longest substring occurring at least twice. Computed once and
    /// cached; hybrid trees recorded the deepest internal node at build
    /// time and answer in O(1).
    pub fn longest_repeated_substring(&self) -> Result<&str> {
        self.lrs_cache
            .get_or_try_init(|| {
                let nav = self.navigator();
                let node = if self.header.version == VERSION_HYBRID
                    && self.header.deepest_internal >= 0
                {
                    NodeHandle::new(self.header.deepest_internal as u64)
                } else {
                    self.find_deepest_internal()?
                };
                if node.is_null() {
                    return Ok(String::new());
                }
                let length = nav.path_length(node)?;
                if length == 0 {
                    return Ok(String::new());
                }
                let position = nav.find_any_leaf_position(node)?;
                self.text_substring(position, length)
            })
            .map(String::as_str)
    }

    /// Deepest internal node by path length; ties break toward the lowest
    /// offset, matching the builder's choice.
    fn find_deepest_internal(&self) -> Result<NodeHandle> {
        let nav = self.navigator();
        let root = nav.root();
        let mut best = NodeHandle::NULL;
        let mut best_len = 0u32;
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            let info = nav.child_array(node)?;
            if info.count == 0 {
                continue;
            }
            if node != root {
                let length = nav.path_length(node)?;
                if length > best_len || (length == best_len && node.raw() < best.raw()) {
                    best_len = length;
                    best = node;
                }
            }
            for index in 0..info.count {
                stack.push(nav.child_entry(&info, index)?.1);
            }
        }
        Ok(best)
    }

    /// Longest common substring of the indexed text and `other`; empty
    /// string when they share nothing.
    pub fn longest_common_substring(&self, other: &str) -> Result<String> {
        match self.longest_common_match(other)? {
            None => Ok(String::new()),
            Some(span) => self.text_substring(span.text_position, span.length),
        }
    }

    /// Position-level detail of the longest common substring.
    pub fn longest_common_match(&self, other: &str) -> Result<Option<MatchSpan>> {
        let units = encode_units(other);
        longest_common_match(&self.navigator(), &units)
    }

    /// Maximal match regions of at least `min_length` code units between
    /// the text and `query`.
    pub fn find_exact_match_anchors(
        &self,
        query: &str,
        min_length: u32,
    ) -> Result<Vec<MatchAnchor>> {
        let units = encode_units(query);
        exact_match_anchors(&self.navigator(), &units, min_length)
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    fn node_info(&self, nav: &Navigator<'_, S>, node: NodeHandle) -> Result<NodeInfo> {
        Ok(NodeInfo {
            offset: node.offset(),
            start: nav.node_start(node)?,
            end: nav.node_end_raw(node)?,
            leaf_count: nav.leaf_count(node)?,
            child_count: nav.child_array(node)?.count,
            depth: nav.depth_from_root(node)?,
        })
    }

    /// Deterministic iterative depth-first traversal: children in sorted
    /// key order, every node visited exactly once, branches balanced.
    pub fn traverse<V: TreeVisitor>(&self, visitor: &mut V) -> Result<()> {
        let nav = self.navigator();
        let root = nav.root();
        visitor.visit_node(&self.node_info(&nav, root)?);
        let mut stack = vec![(nav.child_array(root)?, 0u32)];
        while let Some(&(info, index)) = stack.last() {
            if index >= info.count {
                stack.pop();
                if !stack.is_empty() {
                    visitor.exit_branch();
                }
                continue;
            }
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }
            let (key, child) = nav.child_entry(&info, index)?;
            visitor.enter_branch(key);
            visitor.visit_node(&self.node_info(&nav, child)?);
            stack.push((nav.child_array(child)?, 0));
        }
        Ok(())
    }

    /// Human-readable dump for debugging. Never base correctness decisions
    /// on its output.
    pub fn print_tree(&self) -> Result<String> {
        const LABEL_LIMIT: u32 = 40;
        let nav = self.navigator();
        let root = nav.root();
        let mut out = format!(
            "root (nodes={}, leaves={})\n",
            self.node_count(),
            self.leaf_count()?
        );
        let mut stack = vec![(nav.child_array(root)?, 0u32, 1usize)];
        while let Some(&(info, index, depth)) = stack.last() {
            if index >= info.count {
                stack.pop();
                continue;
            }
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }
            let (key, child) = nav.child_entry(&info, index)?;
            let mut label = if key == TERMINATOR_KEY {
                String::from("$")
            } else {
                let start = nav.node_start(child)?;
                let visible = nav
                    .edge_length(child)?
                    .min(LABEL_LIMIT)
                    .min(self.header.text_len.saturating_sub(start));
                let mut text = self.text_substring(start, visible)?;
                if nav.is_leaf(child)? {
                    text.push('$');
                }
                text
            };
            if nav.edge_length(child)? > LABEL_LIMIT {
                label.push('…');
            }
            out.push_str(&"  ".repeat(depth));
            out.push_str(&format!(
                "{} (depth={}, leaves={})\n",
                label,
                nav.path_length(child)?,
                nav.leaf_count(child)?
            ));
            stack.push((nav.child_array(child)?, 0, depth + 1));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn banana() -> SuffixTree<HeapArena> {
        SuffixTree::build_in_memory("banana").unwrap()
    }

    #[test]
    fn contains_all_substrings() {
        let tree = banana();
        for start in 0..6 {
            for end in start + 1..=6 {
                assert!(tree.contains(&"banana"[start..end]).unwrap());
            }
        }
        assert!(tree.contains("").unwrap());
        assert!(!tree.contains("nab").unwrap());
        assert!(!tree.contains("bananas").unwrap());
    }

    #[test]
    fn count_and_find_agree() {
        let tree = banana();
        assert_eq!(tree.count_occurrences("ana").unwrap(), 2);
        assert_eq!(tree.find_all_occurrences("ana").unwrap(), vec![1, 3]);
        assert_eq!(tree.count_occurrences("a").unwrap(), 3);
        assert_eq!(tree.find_all_occurrences("a").unwrap(), vec![1, 3, 5]);
        assert_eq!(tree.count_occurrences("x").unwrap(), 0);
        assert!(tree.find_all_occurrences("x").unwrap().is_empty());
    }

    #[test]
    fn empty_pattern_matches_everywhere() {
        let tree = banana();
        assert_eq!(tree.count_occurrences("").unwrap(), 6);
        assert_eq!(
            tree.find_all_occurrences("").unwrap(),
            vec![0, 1, 2, 3, 4, 5]
        );
    }

    #[test]
    fn full_text_matches_once() {
        let tree = banana();
        assert_eq!(tree.count_occurrences("banana").unwrap(), 1);
        assert_eq!(tree.find_all_occurrences("banana").unwrap(), vec![0]);
    }

    #[test]
    fn longest_repeated_substring_is_cached() {
        let tree = banana();
        let first = tree.longest_repeated_substring().unwrap().to_string();
        assert_eq!(first, "ana");
        let second = tree.longest_repeated_substring().unwrap();
        assert_eq!(second, first);
    }

    #[test]
    fn longest_common_substring_of_itself_is_itself() {
        let tree = banana();
        assert_eq!(
            tree.longest_common_substring("banana").unwrap(),
            "banana"
        );
        assert_eq!(tree.longest_common_substring("xanax").unwrap(), "ana");
        assert_eq!(tree.longest_common_substring("zzz").unwrap(), "");
    }

    #[test]
    fn leaf_count_excludes_terminator() {
        let tree = banana();
        assert_eq!(tree.leaf_count().unwrap(), 6);
    }

    #[test]
    fn text_round_trips_through_the_arena() {
        let tree = banana();
        assert_eq!(tree.text_string().unwrap(), "banana");
        assert_eq!(tree.text_substring(1, 3).unwrap(), "ana");
    }

    #[test]
    fn traversal_is_balanced_and_complete() {
        struct Counter {
            nodes: u32,
            enters: u32,
            exits: u32,
            depth: i32,
        }
        impl TreeVisitor for Counter {
            fn visit_node(&mut self, _: &NodeInfo) {
                self.nodes += 1;
            }
            fn enter_branch(&mut self, _: i32) {
                self.enters += 1;
                self.depth += 1;
            }
            fn exit_branch(&mut self) {
                self.exits += 1;
                self.depth -= 1;
                assert!(self.depth >= 0);
            }
        }

        let tree = banana();
        let mut counter = Counter {
            nodes: 0,
            enters: 0,
            exits: 0,
            depth: 0,
        };
        tree.traverse(&mut counter).unwrap();
        assert_eq!(counter.nodes, tree.node_count());
        assert_eq!(counter.enters, counter.exits);
        assert_eq!(counter.depth, 0);
        assert_eq!(counter.enters, tree.node_count() - 1);
    }

    #[test]
    fn print_tree_mentions_the_terminator_branch() {
        let tree = banana();
        let dump = tree.print_tree().unwrap();
        assert!(dump.contains("root"));
        assert!(dump.contains('$'));
    }

    #[test]
    fn anchors_cover_shared_words() {
        let tree = SuffixTree::build_in_memory("the quick brown fox").unwrap();
        let anchors = tree.find_exact_match_anchors("quick fox", 4).unwrap();
        assert!(!anchors.is_empty());
        let text = tree.text_string().unwrap();
        for anchor in &anchors {
            let t0 = anchor.text_position as usize;
            let q0 = anchor.query_position as usize;
            let len = anchor.length as usize;
            assert_eq!(&text[t0..t0 + len], &"quick fox"[q0..q0 + len]);
        }
    }

    #[test]
    fn empty_text_boundaries() {
        let tree = SuffixTree::build_in_memory("").unwrap();
        assert!(tree.contains("").unwrap());
        assert!(!tree.contains("a").unwrap());
        assert_eq!(tree.count_occurrences("").unwrap(), 0);
        assert!(tree.find_all_occurrences("a").unwrap().is_empty());
        assert_eq!(tree.leaf_count().unwrap(), 0);
        assert_eq!(tree.longest_repeated_substring().unwrap(), "");
    }

    #[test]
    fn single_character_boundaries() {
        let tree = SuffixTree::build_in_memory("a").unwrap();
        assert_eq!(tree.count_occurrences("a").unwrap(), 1);
        assert_eq!(tree.find_all_occurrences("a").unwrap(), vec![0]);
        assert_eq!(tree.longest_repeated_substring().unwrap(), "");
    }

    #[test]
    fn arena_bytes_round_trip() {
        let tree = banana();
        let bytes = tree.as_bytes().to_vec();
        let reloaded = SuffixTree::from_bytes(bytes).unwrap();
        assert_eq!(reloaded.count_occurrences("ana").unwrap(), 2);
        assert_eq!(reloaded.longest_repeated_substring().unwrap(), "ana");
        assert_eq!(reloaded.node_count(), tree.node_count());
    }

    #[test]
    fn corrupt_size_field_fails_loading() {
        let tree = banana();
        let mut bytes = tree.as_bytes().to_vec();
        // Header bytes 40..48 hold the recorded total size.
        bytes[40..48].copy_from_slice(&999u64.to_le_bytes());
        let err = SuffixTree::from_bytes(bytes).unwrap_err();
        assert!(err.to_string().contains("does not match arena size"));
    }
}
