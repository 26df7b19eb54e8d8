// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Read-side navigation over a sealed tree.
//!
//! A node is just an offset; [`NodeHandle`] wraps it so the type system
//! keeps node offsets apart from the raw i64 soup of link fields. The
//! [`Navigator`] knows the arena, the zone resolver, and where the text
//! lives, and answers the handful of questions the algorithms ask:
//! children, suffix links, edge symbols, leaves.
//!
//! The [`TreeNav`] trait is the seam the shared algorithms are generic
//! over. Anything that can answer these questions gets
//! longest-common-substring and anchor extraction for free, compiled down
//! to direct calls.

use crate::error::{Result, TreeError};
use crate::layout::{CHILD_KEY, CHILD_NODE, LEAF_END, LayoutKind, NODE_END, NODE_START, NULL_OFFSET, TERMINATOR_KEY};
use crate::resolver::{ChildArray, ZoneResolver};
use crate::storage::Storage;

/// Value handle to a node record: an arena offset, or null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(i64);

impl NodeHandle {
    pub const NULL: NodeHandle = NodeHandle(NULL_OFFSET);

    #[inline]
    pub fn new(offset: u64) -> Self {
        NodeHandle(offset as i64)
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 < 0
    }

    /// Arena offset of the record. Must not be called on null.
    #[inline]
    pub fn offset(self) -> u64 {
        debug_assert!(self.0 >= 0);
        self.0 as u64
    }

    #[inline]
    pub fn raw(self) -> i64 {
        self.0
    }
}

/// Navigator contract the shared algorithms are written against.
pub trait TreeNav {
    fn root(&self) -> NodeHandle;

    fn text_len(&self) -> u32;

    fn is_root(&self, node: NodeHandle) -> bool {
        node == self.root()
    }

    /// Length of the edge leading into `node` (leaves extend to the
    /// virtual terminator position).
    fn edge_length(&self, node: NodeHandle) -> Result<u32>;

    /// Key of the symbol at `offset` within the node's edge;
    /// [`TERMINATOR_KEY`] at or past the end of text.
    fn edge_symbol(&self, node: NodeHandle, offset: u32) -> Result<i32>;

    /// Path length from the root up to, but excluding, this node's edge.
    fn depth_from_root(&self, node: NodeHandle) -> Result<u32>;

    /// Full path length from the root through this node's edge.
    fn path_length(&self, node: NodeHandle) -> Result<u32> {
        Ok(self.depth_from_root(node)? + self.edge_length(node)?)
    }

    fn leaf_count(&self, node: NodeHandle) -> Result<u32>;

    fn is_leaf(&self, node: NodeHandle) -> Result<bool>;

    /// Suffix-link target; the root resolves to itself via the stored
    /// null.
    fn suffix_link(&self, node: NodeHandle) -> Result<NodeHandle>;

    /// Child whose edge starts with `key`, by binary search over the
    /// signed key order.
    fn child_by_key(&self, node: NodeHandle, key: i32) -> Result<Option<NodeHandle>>;

    /// Starting positions of every suffix in the subtree, excluding the
    /// terminator-only suffix.
    fn collect_leaf_positions(&self, node: NodeHandle, out: &mut Vec<u32>) -> Result<()>;

    /// Suffix start of one arbitrary leaf below `node`.
    fn find_any_leaf_position(&self, node: NodeHandle) -> Result<u32>;
}

/// Zone-aware navigator over a sealed arena.
#[derive(Debug, Clone, Copy)]
pub struct Navigator<'a, S: Storage> {
    arena: &'a S,
    resolver: ZoneResolver,
    root: NodeHandle,
    text_region: u64,
    text_len: u32,
}

impl<'a, S: Storage> Navigator<'a, S> {
    pub(crate) fn new(
        arena: &'a S,
        resolver: ZoneResolver,
        root: u64,
        text_region: u64,
        text_len: u32,
    ) -> Self {
        Self {
            arena,
            resolver,
            root: NodeHandle::new(root),
            text_region,
            text_len,
        }
    }

    pub fn node_start(&self, node: NodeHandle) -> Result<u32> {
        self.arena.read_u32(node.offset() + NODE_START)
    }

    /// Raw `end` field; [`LEAF_END`] marks a leaf.
    pub fn node_end_raw(&self, node: NodeHandle) -> Result<u32> {
        self.arena.read_u32(node.offset() + NODE_END)
    }

    pub(crate) fn text_unit(&self, index: u32) -> Result<u16> {
        self.arena.read_u16(self.text_region + 2 * u64::from(index))
    }

    pub(crate) fn child_array(&self, node: NodeHandle) -> Result<ChildArray> {
        self.resolver.child_array_info(self.arena, node.offset())
    }

    /// Read one `(key, child)` entry from a located child array.
    pub(crate) fn child_entry(&self, info: &ChildArray, index: u32) -> Result<(i32, NodeHandle)> {
        let at = info.base + u64::from(index) * u64::from(info.entries.child_entry_size);
        let key = self.arena.read_u32(at + CHILD_KEY)? as i32;
        let child = match info.entries.kind {
            LayoutKind::Compact => i64::from(self.arena.read_u32(at + CHILD_NODE)?),
            LayoutKind::Large => self.arena.read_i64(at + CHILD_NODE)?,
        };
        if child < 0 {
            return Err(TreeError::invalid_format(format!(
                "child entry {} of array at {} holds negative offset {}",
                index, info.base, child
            )));
        }
        Ok((key, NodeHandle::new(child as u64)))
    }
}

impl<S: Storage> TreeNav for Navigator<'_, S> {
    fn root(&self) -> NodeHandle {
        self.root
    }

    fn text_len(&self) -> u32 {
        self.text_len
    }

    fn edge_length(&self, node: NodeHandle) -> Result<u32> {
        let start = self.node_start(node)?;
        let end = self.node_end_raw(node)?;
        if end == LEAF_END {
            Ok(self.text_len + 1 - start)
        } else {
            Ok(end - start)
        }
    }

    fn edge_symbol(&self, node: NodeHandle, offset: u32) -> Result<i32> {
        let position = self.node_start(node)? + offset;
        if position < self.text_len {
            Ok(i32::from(self.text_unit(position)?))
        } else {
            Ok(TERMINATOR_KEY)
        }
    }

    fn depth_from_root(&self, node: NodeHandle) -> Result<u32> {
        let layout = self.resolver.layout_for_offset(node.offset());
        self.arena.read_u32(layout.depth_at(node.offset()))
    }

    fn leaf_count(&self, node: NodeHandle) -> Result<u32> {
        let layout = self.resolver.layout_for_offset(node.offset());
        self.arena.read_u32(layout.leaf_count_at(node.offset()))
    }

    fn is_leaf(&self, node: NodeHandle) -> Result<bool> {
        Ok(self.node_end_raw(node)? == LEAF_END)
    }

    fn suffix_link(&self, node: NodeHandle) -> Result<NodeHandle> {
        let layout = self.resolver.layout_for_offset(node.offset());
        let raw = layout.read_offset(self.arena, layout.suffix_link_at(node.offset()))?;
        if raw == NULL_OFFSET {
            return Ok(self.root);
        }
        let resolved = self.resolver.resolve_jump(self.arena, raw)?;
        if resolved < 0 {
            return Ok(self.root);
        }
        Ok(NodeHandle::new(resolved as u64))
    }

    fn child_by_key(&self, node: NodeHandle, key: i32) -> Result<Option<NodeHandle>> {
        let info = self.child_array(node)?;
        let mut lo = 0u32;
        let mut hi = info.count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let (mid_key, child) = self.child_entry(&info, mid)?;
            match mid_key.cmp(&key) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Ok(Some(child)),
            }
        }
        Ok(None)
    }

    fn collect_leaf_positions(&self, node: NodeHandle, out: &mut Vec<u32>) -> Result<()> {
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if self.is_leaf(current)? {
                let position = self.text_len + 1 - self.path_length(current)?;
                if position < self.text_len {
                    out.push(position);
                }
                continue;
            }
            let info = self.child_array(current)?;
            for index in 0..info.count {
                let (_, child) = self.child_entry(&info, index)?;
                stack.push(child);
            }
        }
        Ok(())
    }

    fn find_any_leaf_position(&self, node: NodeHandle) -> Result<u32> {
        let mut current = node;
        loop {
            if self.is_leaf(current)? {
                return Ok(self.text_len + 1 - self.path_length(current)?);
            }
            let info = self.child_array(current)?;
            if info.count == 0 {
                return Err(TreeError::invalid_format(format!(
                    "internal node {} has no children",
                    current.offset()
                )));
            }
            let (_, child) = self.child_entry(&info, 0)?;
            current = child;
        }
    }
}
