// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Online suffix-tree construction, straight into the arena.
//!
//! This is Ukkonen's algorithm with the textbook active point
//! (`active_node`, `active_edge`, `active_length`) and `remainder` counter,
//! with two deviations:
//!
//! 1. Node records are allocated and written directly into the arena as
//!    they are created; there is no intermediate object graph. Child lists
//!    live in an auxiliary map during the build (child arrays cannot be
//!    contiguous while they still grow) and are flushed to sorted arrays at
//!    finalization.
//!
//! 2. When an allocation would cross the compact offset limit, the build
//!    promotes in place: it records the transition boundary, reserves jump
//!    slots for every Compact node that may still need a 64-bit reference,
//!    switches to the Large layout for everything new, and keeps going.
//!    Nothing built so far moves.
//!
//! The header is written last and the arena trimmed; a reader that sees a
//! valid header sees a complete tree.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{Result, TreeError};
use crate::header::{TreeHeader, HEADER_SIZE, VERSION_COMPACT, VERSION_HYBRID, VERSION_LARGE};
use crate::layout::{
    LayoutKind, NodeLayout, CHILD_KEY, CHILD_NODE, COMPACT, COMPACT_NULL, LARGE, LEAF_END,
    NODE_END, NODE_START, NULL_OFFSET, TERMINATOR_KEY,
};
use crate::resolver::CHILDREN_JUMPED;
use crate::storage::Storage;
use crate::text::Text;
use crate::tree::SuffixTree;

/// Smallest accepted compact offset limit: leaves room for the header, the
/// root, and the root's first children before a promotion can trigger.
pub const MIN_COMPACT_LIMIT: u64 = 256;

const TEXT_CHUNK_UNITS: usize = 16 * 1024;

/// Construction knobs. The defaults build a Compact tree that promotes to
/// hybrid only when it outgrows the 32-bit address space; tests lower
/// `compact_limit` to force a promotion on small inputs.
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    /// Base layout for new records. `Large` disables promotion entirely
    /// and seals as format v3.
    pub layout: LayoutKind,
    /// Arena size at which a Compact build promotes to hybrid.
    pub compact_limit: u64,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            layout: LayoutKind::Compact,
            compact_limit: u64::from(u32::MAX),
        }
    }
}

/// Single-use suffix-tree builder. `build` consumes the builder, so reuse
/// is impossible by construction.
pub struct TreeBuilder<S: Storage> {
    arena: S,
    options: BuildOptions,
    layout: &'static NodeLayout,
    promoted: bool,
    transition: u64,
    jump_start: u64,
    jump_end: u64,
    array_slots: HashMap<u64, u64>,
    link_slots: HashMap<u64, u64>,
    children: HashMap<u64, Vec<(i32, u64)>>,
    node_count: u32,
    root: u64,
    active_node: u64,
    active_edge: u32,
    active_len: u32,
    remainder: u32,
    pending_link: Option<u64>,
    deepest_internal: i64,
}

impl<S: Storage> TreeBuilder<S> {
    pub fn new(arena: S) -> Self {
        Self::with_options(arena, BuildOptions::default())
    }

    pub fn with_options(arena: S, options: BuildOptions) -> Self {
        let layout: &'static NodeLayout = match options.layout {
            LayoutKind::Compact => &COMPACT,
            LayoutKind::Large => &LARGE,
        };
        Self {
            arena,
            options,
            layout,
            promoted: false,
            transition: 0,
            jump_start: 0,
            jump_end: 0,
            array_slots: HashMap::new(),
            link_slots: HashMap::new(),
            children: HashMap::new(),
            node_count: 0,
            root: 0,
            active_node: 0,
            active_edge: 0,
            active_len: 0,
            remainder: 0,
            pending_link: None,
            deepest_internal: -1,
        }
    }

    /// Build the tree for `text` and seal the arena. On failure the arena
    /// backing is removed (file arenas delete their file).
    pub fn build(mut self, text: &Text) -> Result<SuffixTree<S>> {
        match self.construct(text) {
            Ok(header) => Ok(SuffixTree::from_parts(self.arena, header)),
            Err(err) => {
                let _ = self.arena.remove_backing();
                Err(err)
            }
        }
    }

    fn construct(&mut self, text: &Text) -> Result<TreeHeader> {
        let n = text.len()?;
        if self.options.layout == LayoutKind::Compact
            && !(MIN_COMPACT_LIMIT..=u64::from(u32::MAX)).contains(&self.options.compact_limit)
        {
            return Err(TreeError::invalid_argument(format!(
                "compact limit {} is outside [{}, {}]",
                self.options.compact_limit,
                MIN_COMPACT_LIMIT,
                u32::MAX
            )));
        }

        let units = text.as_units();
        self.arena.allocate(HEADER_SIZE as u32)?;
        self.root = self.create_node(0, 0, 0)?;
        self.active_node = self.root;

        for pos in 0..=n {
            self.extend(units, n, pos)?;
        }

        self.assign_leaf_counts()?;
        self.flush_children()?;
        let text_region = self.write_text(units)?;

        let version = if self.promoted {
            VERSION_HYBRID
        } else if self.options.layout == LayoutKind::Large {
            VERSION_LARGE
        } else {
            VERSION_COMPACT
        };
        let header = TreeHeader {
            version,
            text_len: n,
            root: self.root,
            text_region,
            node_count: self.node_count,
            total_size: self.arena.size(),
            transition: self.transition,
            jump_start: self.jump_start,
            jump_end: self.jump_end,
            deepest_internal: self.deepest_internal,
        };
        header.write(&mut self.arena)?;
        self.arena.trim_to_size()?;
        debug!(
            nodes = self.node_count,
            size = header.total_size,
            version,
            "sealed suffix tree"
        );
        Ok(header)
    }

    // ------------------------------------------------------------------
    // Ukkonen extension
    // ------------------------------------------------------------------

    fn extend(&mut self, units: &[u16], n: u32, pos: u32) -> Result<()> {
        self.pending_link = None;
        self.remainder += 1;

        while self.remainder > 0 {
            if self.active_len == 0 {
                self.active_edge = pos;
            }
            let edge_key = key_at(units, n, self.active_edge);

            match self.try_get_child(self.active_node, edge_key) {
                None => {
                    let parent = self.active_node;
                    let depth = self.full_depth(parent)?;
                    let leaf = self.create_node(pos, LEAF_END, depth)?;
                    self.set_child(parent, edge_key, leaf);
                    self.chain_link(parent)?;
                }
                Some(next) => {
                    let next_len = self.edge_length_at(next, pos)?;
                    if self.active_len >= next_len {
                        self.active_node = next;
                        self.active_edge += next_len;
                        self.active_len -= next_len;
                        continue;
                    }
                    let next_start = self.node_start(next)?;
                    if key_at(units, n, next_start + self.active_len) == key_at(units, n, pos) {
                        self.active_len += 1;
                        let observed = self.active_node;
                        self.chain_link(observed)?;
                        break;
                    }

                    // Split the edge at the active length. The split and
                    // its first leaf must land on the same side of the
                    // transition; the split enters the child map only
                    // after both allocations.
                    self.maybe_promote(2 * self.layout.node_size)?;
                    let split_depth = self.node_depth(next)?;
                    let split =
                        self.create_node(next_start, next_start + self.active_len, split_depth)?;
                    self.set_child(self.active_node, edge_key, split);

                    let leaf = self.create_node(pos, LEAF_END, split_depth + self.active_len)?;
                    self.set_child(split, key_at(units, n, pos), leaf);

                    let trimmed_start = next_start + self.active_len;
                    self.set_node_start(next, trimmed_start)?;
                    self.set_node_depth(next, split_depth + self.active_len)?;
                    self.set_child(split, key_at(units, n, trimmed_start), next);

                    self.chain_link(split)?;
                }
            }

            self.remainder -= 1;
            if self.active_node == self.root && self.active_len > 0 {
                self.active_len -= 1;
                self.active_edge = pos - self.remainder + 1;
            } else if self.active_node != self.root {
                self.active_node = self.follow_link(self.active_node)?;
            }
        }
        Ok(())
    }

    /// Chain suffix links: the previously created or visited internal node
    /// links to the one observed now.
    fn chain_link(&mut self, node: u64) -> Result<()> {
        if let Some(pending) = self.pending_link.take() {
            if pending != self.root && pending != node {
                self.write_suffix_link(pending, node)?;
            }
        }
        self.pending_link = Some(node);
        Ok(())
    }

    fn follow_link(&self, node: u64) -> Result<u64> {
        let layout = self.record_layout(node);
        let raw = layout.read_offset(&self.arena, layout.suffix_link_at(node))?;
        if raw < 0 {
            return Ok(self.root);
        }
        let raw = raw as u64;
        if self.promoted && raw >= self.jump_start && raw < self.jump_end {
            let target = self.arena.read_i64(raw)?;
            if target < 0 {
                return Ok(self.root);
            }
            return Ok(target as u64);
        }
        Ok(raw)
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    fn record_layout(&self, node: u64) -> &'static NodeLayout {
        if !self.promoted {
            self.layout
        } else if node < self.transition {
            &COMPACT
        } else {
            &LARGE
        }
    }

    fn create_node(&mut self, start: u32, end: u32, depth: u32) -> Result<u64> {
        self.maybe_promote(self.layout.node_size)?;
        let layout = self.layout;
        let offset = self.arena.allocate(layout.node_size)?;
        self.arena.write_u32(offset + NODE_START, start)?;
        self.arena.write_u32(offset + NODE_END, end)?;
        layout.write_offset(&mut self.arena, layout.suffix_link_at(offset), NULL_OFFSET)?;
        self.arena.write_u32(layout.depth_at(offset), depth)?;
        self.arena.write_u32(layout.leaf_count_at(offset), 0)?;
        layout.write_offset(&mut self.arena, layout.children_head_at(offset), NULL_OFFSET)?;
        self.arena.write_i32(layout.child_count_at(offset), 0)?;
        self.node_count += 1;
        Ok(offset)
    }

    fn node_start(&self, node: u64) -> Result<u32> {
        self.arena.read_u32(node + NODE_START)
    }

    fn set_node_start(&mut self, node: u64, value: u32) -> Result<()> {
        self.arena.write_u32(node + NODE_START, value)
    }

    fn node_end(&self, node: u64) -> Result<u32> {
        self.arena.read_u32(node + NODE_END)
    }

    fn node_depth(&self, node: u64) -> Result<u32> {
        let layout = self.record_layout(node);
        self.arena.read_u32(layout.depth_at(node))
    }

    fn set_node_depth(&mut self, node: u64, value: u32) -> Result<()> {
        let layout = self.record_layout(node);
        self.arena.write_u32(layout.depth_at(node), value)
    }

    fn set_leaf_count(&mut self, node: u64, value: u32) -> Result<()> {
        let layout = self.record_layout(node);
        self.arena.write_u32(layout.leaf_count_at(node), value)
    }

    /// Path length through `node` including its own edge. Only meaningful
    /// for internal nodes, whose `end` is fixed.
    fn full_depth(&self, node: u64) -> Result<u32> {
        let start = self.node_start(node)?;
        let end = self.node_end(node)?;
        debug_assert_ne!(end, LEAF_END);
        Ok(self.node_depth(node)? + (end - start))
    }

    fn edge_length_at(&self, node: u64, pos: u32) -> Result<u32> {
        let start = self.node_start(node)?;
        let end = self.node_end(node)?;
        if end == LEAF_END {
            Ok(pos + 1 - start)
        } else {
            Ok(end - start)
        }
    }

    fn write_suffix_link(&mut self, source: u64, target: u64) -> Result<()> {
        let layout = self.record_layout(source);
        let position = layout.suffix_link_at(source);
        if layout.kind == LayoutKind::Compact && self.promoted && target >= self.transition {
            let slot = self.link_slots.get(&source).copied().ok_or_else(|| {
                TreeError::invalid_format(format!(
                    "no jump slot reserved for suffix link of node {}",
                    source
                ))
            })?;
            self.arena.write_i64(slot, target as i64)?;
            return self.arena.write_u32(position, slot as u32);
        }
        layout.write_offset(&mut self.arena, position, target as i64)
    }

    // ------------------------------------------------------------------
    // Mid-build child map
    // ------------------------------------------------------------------

    fn try_get_child(&self, parent: u64, key: i32) -> Option<u64> {
        self.children
            .get(&parent)?
            .iter()
            .find(|&&(k, _)| k == key)
            .map(|&(_, child)| child)
    }

    fn set_child(&mut self, parent: u64, key: i32, child: u64) {
        let entries = self.children.entry(parent).or_default();
        if let Some(entry) = entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = child;
        } else {
            entries.push((key, child));
        }
    }

    // ------------------------------------------------------------------
    // Hybrid promotion
    // ------------------------------------------------------------------

    fn maybe_promote(&mut self, upcoming: u32) -> Result<()> {
        if self.promoted || self.options.layout != LayoutKind::Compact {
            return Ok(());
        }
        if self.arena.size() + u64::from(upcoming) <= self.options.compact_limit {
            return Ok(());
        }
        self.promote()
    }

    /// Switch the build to the Large layout in place. Reserves two jump
    /// slots per Compact parent: one for its future child-array reference,
    /// one for a suffix link that may later point into the Large zone.
    fn promote(&mut self) -> Result<()> {
        self.transition = self.arena.size();
        self.layout = &LARGE;
        self.promoted = true;

        let mut parents: Vec<u64> = self
            .children
            .keys()
            .copied()
            .filter(|&parent| parent < self.transition)
            .collect();
        parents.sort_unstable();

        self.jump_start = self.transition;
        for &parent in &parents {
            let array_slot = self.arena.allocate(8)?;
            let link_slot = self.arena.allocate(8)?;
            self.arena.write_i64(array_slot, NULL_OFFSET)?;
            self.arena.write_i64(link_slot, NULL_OFFSET)?;
            self.array_slots.insert(parent, array_slot);
            self.link_slots.insert(parent, link_slot);
        }
        self.jump_end = self.arena.size();

        // Slot offsets are stored inside 32-bit Compact fields.
        if self.jump_end >= u64::from(COMPACT_NULL) {
            return Err(TreeError::CapacityExceeded {
                requested: self.jump_end,
                limit: u64::from(COMPACT_NULL) - 1,
            });
        }
        debug!(
            transition = self.transition,
            slots = parents.len() * 2,
            "promoted arena to hybrid layout"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Finalization
    // ------------------------------------------------------------------

    /// Post-order pass over the in-memory child map: leaf counts bottom-up
    /// and the deepest internal node for O(1) longest-repeated-substring.
    fn assign_leaf_counts(&mut self) -> Result<()> {
        enum Frame {
            Enter(u64),
            Exit(u64),
        }

        let mut counts: HashMap<u64, u32> = HashMap::new();
        let mut deepest: i64 = -1;
        let mut deepest_len: u32 = 0;
        let mut stack = vec![Frame::Enter(self.root)];

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter(node) => match self.children.get(&node) {
                    Some(entries) => {
                        let kids: Vec<u64> = entries.iter().map(|&(_, child)| child).collect();
                        stack.push(Frame::Exit(node));
                        for child in kids {
                            stack.push(Frame::Enter(child));
                        }
                    }
                    None => {
                        counts.insert(node, 1);
                        self.set_leaf_count(node, 1)?;
                    }
                },
                Frame::Exit(node) => {
                    let sum = self.children[&node]
                        .iter()
                        .map(|&(_, child)| counts.get(&child).copied().unwrap_or(0))
                        .sum();
                    counts.insert(node, sum);
                    self.set_leaf_count(node, sum)?;
                    if node != self.root {
                        let length = self.full_depth(node)?;
                        // Ties break toward the lowest offset so the
                        // recorded node matches what a reader-side scan
                        // would pick.
                        if length > deepest_len
                            || (length == deepest_len && deepest >= 0 && (node as i64) < deepest)
                        {
                            deepest_len = length;
                            deepest = node as i64;
                        }
                    }
                }
            }
        }
        self.deepest_internal = deepest;
        Ok(())
    }

    /// Flush the auxiliary child map into sorted contiguous arrays.
    fn flush_children(&mut self) -> Result<()> {
        let mut parents: Vec<u64> = self.children.keys().copied().collect();
        parents.sort_unstable();

        for parent in parents {
            let count = self.children[&parent].len() as u32;
            self.maybe_promote(count * self.layout.child_entry_size)?;
            let entry_layout: &'static NodeLayout =
                if self.promoted { &LARGE } else { self.layout };

            let mut entries = self.children.remove(&parent).unwrap_or_default();
            entries.sort_unstable_by_key(|&(key, _)| key);

            let base = self
                .arena
                .allocate(count * entry_layout.child_entry_size)?;
            for (index, &(key, child)) in entries.iter().enumerate() {
                let at = base + index as u64 * u64::from(entry_layout.child_entry_size);
                self.arena.write_u32(at + CHILD_KEY, key as u32)?;
                match entry_layout.kind {
                    LayoutKind::Compact => self.arena.write_u32(at + CHILD_NODE, child as u32)?,
                    LayoutKind::Large => self.arena.write_i64(at + CHILD_NODE, child as i64)?,
                }
            }

            let parent_layout = self.record_layout(parent);
            let head_at = parent_layout.children_head_at(parent);
            let count_at = parent_layout.child_count_at(parent);
            if parent_layout.kind == LayoutKind::Compact && self.promoted {
                let slot = self.array_slots.get(&parent).copied().ok_or_else(|| {
                    TreeError::invalid_format(format!(
                        "no jump slot reserved for child array of node {}",
                        parent
                    ))
                })?;
                self.arena.write_i64(slot, base as i64)?;
                self.arena.write_u32(head_at, slot as u32)?;
                self.arena
                    .write_i32(count_at, (count | CHILDREN_JUMPED) as i32)?;
            } else {
                parent_layout.write_offset(&mut self.arena, head_at, base as i64)?;
                self.arena.write_i32(count_at, count as i32)?;
            }
        }
        Ok(())
    }

    /// Append the text region in chunked little-endian writes.
    fn write_text(&mut self, units: &[u16]) -> Result<u64> {
        let region = self.arena.size();
        let mut buf = Vec::with_capacity(TEXT_CHUNK_UNITS * 2);
        for chunk in units.chunks(TEXT_CHUNK_UNITS) {
            buf.clear();
            for &unit in chunk {
                buf.extend_from_slice(&unit.to_le_bytes());
            }
            let offset = self.arena.allocate(buf.len() as u32)?;
            self.arena.write_bytes(offset, &buf)?;
        }
        Ok(region)
    }
}

fn key_at(units: &[u16], n: u32, position: u32) -> i32 {
    if position < n {
        i32::from(units[position as usize])
    } else {
        TERMINATOR_KEY
    }
}
