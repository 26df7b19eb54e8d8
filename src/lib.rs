// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Persistent suffix-tree engine for very large texts.
//!
//! A suffix tree answers substring questions in time proportional to the
//! pattern, not the text: O(m) containment and counting, O(m+k) occurrence
//! listing, O(1) longest repeated substring, O(m) longest common substring.
//! This crate builds the tree online (Ukkonen) and writes every node
//! directly into a flat byte arena, so the in-memory image, the on-disk
//! file, and the memory-mapped view are the same bytes.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐     ┌─────────────┐     ┌──────────────┐
//! │ builder.rs │────▶│  storage/   │◀────│   tree.rs    │
//! │ (Ukkonen,  │     │ (HeapArena, │     │ (queries,    │
//! │ promotion) │     │  FileArena) │     │  traversal)  │
//! └────────────┘     └─────────────┘     └──────────────┘
//!       │                   ▲                   │
//!       ▼                   │                   ▼
//! ┌────────────────────────────────────────────────────┐
//! │        layout.rs / resolver.rs / navigate.rs       │
//! │  (Compact & Large node shapes, jump slots, zone-   │
//! │   aware navigation, TreeNav capability trait)      │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! # Hybrid storage
//!
//! Node records come in two shapes: Compact (28 bytes, 32-bit links) and
//! Large (40 bytes, 64-bit links). A build starts Compact; if the arena
//! outgrows the 32-bit address space mid-build, it promotes in place -
//! everything already written stays put, new records switch to Large, and
//! a jump table bridges the references that must cross the boundary. The
//! read path dispatches per offset and dereferences jump slots
//! transparently, so one algorithm body serves Compact, Large, and hybrid
//! trees alike.
//!
//! # Usage
//!
//! ```
//! use treex::SuffixTree;
//!
//! let tree = SuffixTree::build_in_memory("banana").unwrap();
//! assert!(tree.contains("nan").unwrap());
//! assert_eq!(tree.count_occurrences("ana").unwrap(), 2);
//! assert_eq!(tree.find_all_occurrences("ana").unwrap(), vec![1, 3]);
//! assert_eq!(tree.longest_repeated_substring().unwrap(), "ana");
//! ```

// Module declarations
pub mod algorithms;
pub mod builder;
pub mod contracts;
mod error;
mod header;
mod layout;
mod logical;
mod navigate;
mod resolver;
pub mod storage;
mod text;
mod tree;

// Re-exports for public API
pub use algorithms::{exact_match_anchors, longest_common_match, MatchAnchor, MatchSpan};
pub use builder::{BuildOptions, TreeBuilder, MIN_COMPACT_LIMIT};
pub use error::{Result, TreeError};
pub use header::{TreeHeader, HEADER_SIZE, MAGIC, VERSION_COMPACT, VERSION_HYBRID, VERSION_LARGE};
pub use layout::{LayoutKind, NodeLayout, COMPACT, LARGE, LEAF_END, NULL_OFFSET, TERMINATOR_KEY};
pub use logical::{
    export_logical, import_logical, logical_hash, BRANCH_EXIT_SENTINEL, EXPORT_MAGIC,
    EXPORT_VERSION,
};
pub use navigate::{Navigator, NodeHandle, TreeNav};
pub use resolver::{ChildArray, ZoneResolver, CHILDREN_JUMPED};
pub use storage::{FileArena, HeapArena, Storage, HEAP_CEILING};
pub use text::Text;
pub use tree::{NodeInfo, SuffixTree, TreeStats, TreeVisitor};

#[cfg(test)]
mod tests {
    //! Cross-module property tests: the tree must agree with a naive
    //! substring scan on every query, across storage backends and hybrid
    //! geometries.

    use super::*;
    use proptest::prelude::*;
    use proptest::string::string_regex;

    fn naive_occurrences(text: &str, pattern: &str) -> Vec<u32> {
        let text: Vec<u16> = text.encode_utf16().collect();
        let pattern: Vec<u16> = pattern.encode_utf16().collect();
        if pattern.is_empty() {
            return (0..text.len() as u32).collect();
        }
        let mut positions = Vec::new();
        if pattern.len() > text.len() {
            return positions;
        }
        for start in 0..=(text.len() - pattern.len()) {
            if text[start..start + pattern.len()] == pattern[..] {
                positions.push(start as u32);
            }
        }
        positions
    }

    fn build_hybrid(text: &str) -> SuffixTree<HeapArena> {
        let options = BuildOptions {
            layout: LayoutKind::Compact,
            compact_limit: MIN_COMPACT_LIMIT,
        };
        TreeBuilder::with_options(HeapArena::new(), options)
            .build(&Text::from(text))
            .unwrap()
    }

    fn text_strategy() -> impl Strategy<Value = String> {
        string_regex("[abc]{0,40}").unwrap()
    }

    fn pattern_strategy() -> impl Strategy<Value = String> {
        string_regex("[abcd]{0,6}").unwrap()
    }

    #[test]
    fn hybrid_and_compact_agree_on_the_scenario_texts() {
        for text in [
            "banana",
            "mississippi",
            "abracadabra",
            "the quick brown fox jumps over the lazy dog",
            "repetitive-repetitive-repetitive",
        ] {
            let compact = SuffixTree::build_in_memory(text).unwrap();
            let hybrid = build_hybrid(text);
            assert_eq!(hybrid.version(), VERSION_HYBRID);

            assert_eq!(
                logical_hash(&compact).unwrap(),
                logical_hash(&hybrid).unwrap(),
                "hash differs for {:?}",
                text
            );
            assert_eq!(
                compact.longest_repeated_substring().unwrap(),
                hybrid.longest_repeated_substring().unwrap()
            );
            for pattern in ["a", "the", "ssi", "ana", "xyz", ""] {
                assert_eq!(
                    compact.count_occurrences(pattern).unwrap(),
                    hybrid.count_occurrences(pattern).unwrap()
                );
                assert_eq!(
                    compact.find_all_occurrences(pattern).unwrap(),
                    hybrid.find_all_occurrences(pattern).unwrap()
                );
            }
        }
    }

    #[test]
    fn logical_hash_agrees_across_backends() {
        let dir = tempfile::tempdir().unwrap();
        let text = "abracadabra";
        let in_memory = SuffixTree::build_in_memory(text).unwrap();
        let on_disk = SuffixTree::build_to_file(dir.path().join("abra.tree"), text).unwrap();
        let hybrid = build_hybrid(text);

        let expected = logical_hash(&in_memory).unwrap();
        assert_eq!(logical_hash(&on_disk).unwrap(), expected);
        assert_eq!(logical_hash(&hybrid).unwrap(), expected);
    }

    proptest! {
        #[test]
        fn contains_iff_substring(text in text_strategy(), pattern in pattern_strategy()) {
            let tree = SuffixTree::build_in_memory(&text).unwrap();
            let expected = pattern.is_empty() || text.contains(&pattern);
            prop_assert_eq!(tree.contains(&pattern).unwrap(), expected);
        }

        #[test]
        fn count_matches_find_all(text in text_strategy(), pattern in pattern_strategy()) {
            let tree = SuffixTree::build_in_memory(&text).unwrap();
            let occurrences = tree.find_all_occurrences(&pattern).unwrap();
            if pattern.is_empty() {
                prop_assert_eq!(tree.count_occurrences(&pattern).unwrap(), tree.text_len());
            } else {
                prop_assert_eq!(
                    tree.count_occurrences(&pattern).unwrap() as usize,
                    occurrences.len()
                );
            }
        }

        #[test]
        fn find_all_matches_naive_scan(text in text_strategy(), pattern in pattern_strategy()) {
            let tree = SuffixTree::build_in_memory(&text).unwrap();
            prop_assert_eq!(
                tree.find_all_occurrences(&pattern).unwrap(),
                naive_occurrences(&text, &pattern)
            );
        }

        #[test]
        fn invariants_hold_for_all_trees(text in text_strategy()) {
            let tree = SuffixTree::build_in_memory(&text).unwrap();
            prop_assert!(contracts::verify_tree_invariants(&tree).is_ok());
        }

        #[test]
        fn hybrid_agrees_with_compact(text in text_strategy(), pattern in pattern_strategy()) {
            let compact = SuffixTree::build_in_memory(&text).unwrap();
            let hybrid = build_hybrid(&text);
            prop_assert_eq!(
                compact.find_all_occurrences(&pattern).unwrap(),
                hybrid.find_all_occurrences(&pattern).unwrap()
            );
            prop_assert_eq!(
                logical_hash(&compact).unwrap(),
                logical_hash(&hybrid).unwrap()
            );
            prop_assert!(contracts::verify_tree_invariants(&hybrid).is_ok());
        }

        #[test]
        fn arena_round_trip_preserves_every_answer(
            text in text_strategy(),
            pattern in pattern_strategy(),
        ) {
            let tree = SuffixTree::build_in_memory(&text).unwrap();
            let reloaded = SuffixTree::from_bytes(tree.as_bytes().to_vec()).unwrap();
            prop_assert_eq!(
                tree.find_all_occurrences(&pattern).unwrap(),
                reloaded.find_all_occurrences(&pattern).unwrap()
            );
            prop_assert_eq!(
                tree.longest_repeated_substring().unwrap(),
                reloaded.longest_repeated_substring().unwrap()
            );
            prop_assert_eq!(
                logical_hash(&tree).unwrap(),
                logical_hash(&reloaded).unwrap()
            );
        }

        #[test]
        fn export_import_round_trips_for_any_text(text in text_strategy()) {
            let tree = SuffixTree::build_in_memory(&text).unwrap();
            let imported = import_logical(&export_logical(&tree).unwrap()).unwrap();
            prop_assert_eq!(imported.node_count(), tree.node_count());
            prop_assert_eq!(
                logical_hash(&imported).unwrap(),
                logical_hash(&tree).unwrap()
            );
        }

        #[test]
        fn lcs_is_a_common_substring_of_maximal_length(
            text in text_strategy(),
            query in string_regex("[abcd]{0,20}").unwrap(),
        ) {
            let tree = SuffixTree::build_in_memory(&text).unwrap();
            let lcs = tree.longest_common_substring(&query).unwrap();
            if !lcs.is_empty() {
                prop_assert!(text.contains(&lcs));
                prop_assert!(query.contains(&lcs));
            }
            // No longer common substring exists.
            let longer = lcs.chars().count() + 1;
            let query_units: Vec<char> = query.chars().collect();
            for window in query_units.windows(longer) {
                let candidate: String = window.iter().collect();
                prop_assert!(!text.contains(&candidate));
            }
        }
    }
}
