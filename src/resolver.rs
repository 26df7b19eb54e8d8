// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Zone resolution for hybrid arenas.
//!
//! A hybrid arena has a transition boundary: nodes below it are Compact,
//! nodes at or above it are Large. Cross-zone references that cannot fit in
//! a 32-bit field go through 8-byte jump slots packed into a contiguous
//! range `[jump_start, jump_end)` right at the boundary. A raw offset that
//! falls inside that range is not a node - it is a pointer cell holding the
//! real 64-bit target. Jumps are dereferenced exactly once; slots never
//! chain to other slots.
//!
//! The `child_count` field does double duty: its top bit marks the child
//! array reference as jumped. [`ZoneResolver::child_array_info`] is the only
//! code in the crate allowed to look at that bit.

use crate::error::Result;
use crate::layout::{NodeLayout, COMPACT, LARGE};
use crate::storage::Storage;

/// Top bit of `child_count`: the child-array reference goes through a jump
/// slot and the entries use the Large layout.
pub const CHILDREN_JUMPED: u32 = 0x8000_0000;

/// Where a node's child entries live and how to read them.
#[derive(Debug, Clone, Copy)]
pub struct ChildArray {
    pub base: u64,
    pub entries: &'static NodeLayout,
    pub count: u32,
}

/// Maps raw offsets to layouts and dereferences jump slots.
#[derive(Debug, Clone, Copy)]
pub struct ZoneResolver {
    base: &'static NodeLayout,
    transition: i64,
    jump_start: u64,
    jump_end: u64,
}

impl ZoneResolver {
    /// Resolver for a single-zone tree: every offset uses `base`.
    pub fn single(base: &'static NodeLayout) -> Self {
        Self {
            base,
            transition: -1,
            jump_start: 0,
            jump_end: 0,
        }
    }

    /// Resolver for a hybrid tree. The base layout of a hybrid is Compact.
    pub fn hybrid(transition: u64, jump_start: u64, jump_end: u64) -> Self {
        Self {
            base: &COMPACT,
            transition: transition as i64,
            jump_start,
            jump_end,
        }
    }

    pub fn is_hybrid(&self) -> bool {
        self.transition >= 0
    }

    pub fn transition(&self) -> Option<u64> {
        if self.transition >= 0 {
            Some(self.transition as u64)
        } else {
            None
        }
    }

    pub fn jump_range(&self) -> (u64, u64) {
        (self.jump_start, self.jump_end)
    }

    /// Layout owning a node at `offset`.
    pub fn layout_for_offset(&self, offset: u64) -> &'static NodeLayout {
        if self.transition < 0 {
            self.base
        } else if offset < self.transition as u64 {
            &COMPACT
        } else {
            &LARGE
        }
    }

    /// Dereference `offset` if it points into the jump table, otherwise
    /// return it unchanged.
    pub fn resolve_jump<S: Storage>(&self, arena: &S, offset: i64) -> Result<i64> {
        if offset >= 0 {
            let raw = offset as u64;
            if raw >= self.jump_start && raw < self.jump_end {
                return arena.read_i64(raw);
            }
        }
        Ok(offset)
    }

    /// Locate a node's child array, hiding the jumped-reference encoding.
    pub fn child_array_info<S: Storage>(&self, arena: &S, node: u64) -> Result<ChildArray> {
        let layout = self.layout_for_offset(node);
        let raw_count = arena.read_i32(layout.child_count_at(node))? as u32;
        if raw_count & CHILDREN_JUMPED != 0 {
            let slot = arena.read_u32(layout.children_head_at(node))?;
            let base = arena.read_i64(u64::from(slot))?;
            return Ok(ChildArray {
                base: base as u64,
                entries: &LARGE,
                count: raw_count & !CHILDREN_JUMPED,
            });
        }
        let head = layout.read_offset(arena, layout.children_head_at(node))?;
        Ok(ChildArray {
            base: head.max(0) as u64,
            entries: layout,
            count: raw_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{LayoutKind, COMPACT_NULL, NULL_OFFSET};
    use crate::storage::HeapArena;

    #[test]
    fn single_zone_uses_base_everywhere() {
        let resolver = ZoneResolver::single(&LARGE);
        assert_eq!(resolver.layout_for_offset(0).kind, LayoutKind::Large);
        assert_eq!(resolver.layout_for_offset(1 << 40).kind, LayoutKind::Large);
        assert!(!resolver.is_hybrid());
    }

    #[test]
    fn hybrid_splits_at_transition() {
        let resolver = ZoneResolver::hybrid(1000, 1000, 1016);
        assert_eq!(resolver.layout_for_offset(999).kind, LayoutKind::Compact);
        assert_eq!(resolver.layout_for_offset(1000).kind, LayoutKind::Large);
        assert_eq!(resolver.transition(), Some(1000));
    }

    #[test]
    fn jump_slots_dereference_once() {
        let mut arena = HeapArena::new();
        arena.allocate(64).unwrap();
        arena.write_i64(16, 4096).unwrap();

        let resolver = ZoneResolver::hybrid(16, 16, 24);
        assert_eq!(resolver.resolve_jump(&arena, 16).unwrap(), 4096);
        // Outside the table: passes through unchanged.
        assert_eq!(resolver.resolve_jump(&arena, 8).unwrap(), 8);
        assert_eq!(resolver.resolve_jump(&arena, 24).unwrap(), 24);
        assert_eq!(
            resolver.resolve_jump(&arena, NULL_OFFSET).unwrap(),
            NULL_OFFSET
        );
    }

    #[test]
    fn jumped_child_arrays_decode_count_and_base() {
        let mut arena = HeapArena::new();
        arena.allocate(128).unwrap();

        // Compact node record at 0 with a jumped child reference: the head
        // field holds slot offset 64, the slot holds the real base 100.
        arena.write_u32(COMPACT.children_head_at(0), 64).unwrap();
        arena
            .write_i32(COMPACT.child_count_at(0), (3 | CHILDREN_JUMPED) as i32)
            .unwrap();
        arena.write_i64(64, 100).unwrap();

        let resolver = ZoneResolver::hybrid(32, 64, 72);
        let info = resolver.child_array_info(&arena, 0).unwrap();
        assert_eq!(info.base, 100);
        assert_eq!(info.count, 3);
        assert_eq!(info.entries.kind, LayoutKind::Large);
    }

    #[test]
    fn direct_child_arrays_use_owner_layout() {
        let mut arena = HeapArena::new();
        arena.allocate(64).unwrap();
        arena.write_u32(COMPACT.children_head_at(0), 40).unwrap();
        arena.write_i32(COMPACT.child_count_at(0), 2).unwrap();

        let resolver = ZoneResolver::single(&COMPACT);
        let info = resolver.child_array_info(&arena, 0).unwrap();
        assert_eq!(info.base, 40);
        assert_eq!(info.count, 2);
        assert_eq!(info.entries.kind, LayoutKind::Compact);
    }

    #[test]
    fn childless_node_reports_zero_entries() {
        let mut arena = HeapArena::new();
        arena.allocate(64).unwrap();
        arena.write_u32(COMPACT.children_head_at(0), COMPACT_NULL).unwrap();
        arena.write_i32(COMPACT.child_count_at(0), 0).unwrap();

        let resolver = ZoneResolver::single(&COMPACT);
        let info = resolver.child_array_info(&arena, 0).unwrap();
        assert_eq!(info.count, 0);
    }
}
