// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! On-disk node and child-entry shapes.
//!
//! Two fixed layouts share the same leading fields and differ only in how
//! wide their offset-valued fields are:
//!
//! ```text
//! Compact (28-byte node, 8-byte child entry)
//!   start:u32 @0   end:u32 @4   suffix_link:u32 @8   depth:u32 @12
//!   leaf_count:u32 @16   children_head:u32 @20   child_count:i32 @24
//!
//! Large (40-byte node, 12-byte child entry)
//!   start:u32 @0   end:u32 @4   suffix_link:i64 @8   children_head:i64 @16
//!   depth:u32 @24   leaf_count:u32 @28   child_count:i32 @32   reserved @36
//! ```
//!
//! `start` (offset 0), `end` (offset 4) and the child-entry `key`
//! (offset 0) never move between layouts; everything that holds an arena
//! offset does. Callers never see the width difference: `read_offset` and
//! `write_offset` translate the Compact null sentinel (`u32::MAX`) to and
//! from the universal `-1`.

use crate::error::{Result, TreeError};
use crate::storage::Storage;

/// Universal null sentinel for offset-valued fields.
pub const NULL_OFFSET: i64 = -1;

/// Null sentinel as stored inside a Compact 32-bit field.
pub const COMPACT_NULL: u32 = u32::MAX;

/// `end` value marking a leaf: the edge runs to the virtual end of text.
pub const LEAF_END: u32 = u32::MAX;

/// Child key of the virtual terminator. As a signed value (-1) it sorts
/// before every real code unit.
pub const TERMINATOR_KEY: i32 = -1;

/// Field offset of `start` in both layouts.
pub const NODE_START: u64 = 0;

/// Field offset of `end` in both layouts.
pub const NODE_END: u64 = 4;

/// Field offset of a child entry's key in both layouts.
pub const CHILD_KEY: u64 = 0;

/// Field offset of a child entry's node offset in both layouts.
pub const CHILD_NODE: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    Compact,
    Large,
}

/// Immutable descriptor of one node layout. The two instances are
/// [`COMPACT`] and [`LARGE`]; there are never more.
#[derive(Debug)]
pub struct NodeLayout {
    pub kind: LayoutKind,
    pub node_size: u32,
    pub child_entry_size: u32,
    pub suffix_link: u32,
    pub children_head: u32,
    pub depth: u32,
    pub leaf_count: u32,
    pub child_count: u32,
}

pub static COMPACT: NodeLayout = NodeLayout {
    kind: LayoutKind::Compact,
    node_size: 28,
    child_entry_size: 8,
    suffix_link: 8,
    depth: 12,
    leaf_count: 16,
    children_head: 20,
    child_count: 24,
};

pub static LARGE: NodeLayout = NodeLayout {
    kind: LayoutKind::Large,
    node_size: 40,
    child_entry_size: 12,
    suffix_link: 8,
    children_head: 16,
    depth: 24,
    leaf_count: 28,
    child_count: 32,
};

impl NodeLayout {
    /// Base layout for a format version: v3 is Large, v4 is Compact, and a
    /// v5 hybrid presents itself as Compact at the root.
    pub fn for_version(version: u32) -> Result<&'static NodeLayout> {
        match version {
            3 => Ok(&LARGE),
            4 | 5 => Ok(&COMPACT),
            other => Err(TreeError::invalid_format(format!(
                "unknown format version {}",
                other
            ))),
        }
    }

    /// Read an offset-valued field at an absolute arena position,
    /// normalizing the layout's null sentinel to [`NULL_OFFSET`].
    pub fn read_offset<S: Storage>(&self, arena: &S, position: u64) -> Result<i64> {
        match self.kind {
            LayoutKind::Large => arena.read_i64(position),
            LayoutKind::Compact => {
                let raw = arena.read_u32(position)?;
                if raw == COMPACT_NULL {
                    Ok(NULL_OFFSET)
                } else {
                    Ok(i64::from(raw))
                }
            }
        }
    }

    /// Write an offset-valued field. A Compact field can only hold offsets
    /// below `u32::MAX`; anything wider is a capacity error here, because
    /// the builder routes such references through jump slots instead.
    pub fn write_offset<S: Storage>(&self, arena: &mut S, position: u64, value: i64) -> Result<()> {
        match self.kind {
            LayoutKind::Large => arena.write_i64(position, value),
            LayoutKind::Compact => {
                let raw = if value == NULL_OFFSET {
                    COMPACT_NULL
                } else if (0..i64::from(COMPACT_NULL)).contains(&value) {
                    value as u32
                } else {
                    return Err(TreeError::CapacityExceeded {
                        requested: value.max(0) as u64,
                        limit: u64::from(COMPACT_NULL) - 1,
                    });
                };
                arena.write_u32(position, raw)
            }
        }
    }

    #[inline]
    pub fn suffix_link_at(&self, node: u64) -> u64 {
        node + u64::from(self.suffix_link)
    }

    #[inline]
    pub fn children_head_at(&self, node: u64) -> u64 {
        node + u64::from(self.children_head)
    }

    #[inline]
    pub fn depth_at(&self, node: u64) -> u64 {
        node + u64::from(self.depth)
    }

    #[inline]
    pub fn leaf_count_at(&self, node: u64) -> u64 {
        node + u64::from(self.leaf_count)
    }

    #[inline]
    pub fn child_count_at(&self, node: u64) -> u64 {
        node + u64::from(self.child_count)
    }
}
