//! Test utilities shared across integration tests.

#![allow(dead_code)]

use treex::{
    BuildOptions, HeapArena, LayoutKind, SuffixTree, Text, TreeBuilder, MIN_COMPACT_LIMIT,
};

/// Build an in-memory tree with default options.
pub fn build_tree(text: &str) -> SuffixTree<HeapArena> {
    SuffixTree::build_in_memory(text).expect("build should succeed")
}

/// Build a tree with the compact limit forced low enough to promote to
/// hybrid mid-build.
pub fn build_hybrid(text: &str) -> SuffixTree<HeapArena> {
    let options = BuildOptions {
        layout: LayoutKind::Compact,
        compact_limit: MIN_COMPACT_LIMIT,
    };
    TreeBuilder::with_options(HeapArena::new(), options)
        .build(&Text::from(text))
        .expect("hybrid build should succeed")
}

/// Build a pure Large-layout tree (format v3).
pub fn build_large(text: &str) -> SuffixTree<HeapArena> {
    let options = BuildOptions {
        layout: LayoutKind::Large,
        ..BuildOptions::default()
    };
    TreeBuilder::with_options(HeapArena::new(), options)
        .build(&Text::from(text))
        .expect("large build should succeed")
}

/// Reference implementation: scan the text for every occurrence.
pub fn naive_occurrences(text: &str, pattern: &str) -> Vec<u32> {
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

/// Assert that two trees give identical answers for a set of patterns.
pub fn assert_trees_agree<A: treex::Storage, B: treex::Storage>(
    left: &SuffixTree<A>,
    right: &SuffixTree<B>,
    patterns: &[&str],
) {
    assert_eq!(left.text_len(), right.text_len());
    assert_eq!(left.node_count(), right.node_count());
    assert_eq!(
        left.longest_repeated_substring().unwrap(),
        right.longest_repeated_substring().unwrap()
    );
    for pattern in patterns {
        assert_eq!(
            left.contains(pattern).unwrap(),
            right.contains(pattern).unwrap(),
            "contains disagrees for {:?}",
            pattern
        );
        assert_eq!(
            left.count_occurrences(pattern).unwrap(),
            right.count_occurrences(pattern).unwrap(),
            "count disagrees for {:?}",
            pattern
        );
        assert_eq!(
            left.find_all_occurrences(pattern).unwrap(),
            right.find_all_occurrences(pattern).unwrap(),
            "occurrences disagree for {:?}",
            pattern
        );
    }
}
