// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Arena file header.
//!
//! The header is the first 80 bytes of every arena and is written last:
//! a reader that sees a valid magic and size is guaranteed to see a fully
//! constructed tree behind it. Until then the prefix is all zeros, which
//! can never pass validation.
//!
//! The prefix is 80 bytes for every version so the root node always sits
//! at the same offset; a build that promotes to hybrid mid-flight cannot
//! move the root after the fact. Versions 3 and 4 simply leave bytes
//! 48..80 zeroed, version 5 uses them for the hybrid geometry.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ 0..8    magic: u64 = 0x5452454558494646 ("TREEXIFF")     │
//! │ 8..12   version: u32 (3 = Large, 4 = Compact, 5 = Hybrid)│
//! │ 12..16  text length in code units: u32                   │
//! │ 16..24  root offset: u64                                 │
//! │ 24..32  text-region offset: u64                          │
//! │ 32..36  node count: u32                                  │
//! │ 36..40  reserved                                         │
//! │ 40..48  total arena size: u64                            │
//! │ 48..56  transition offset: u64        (v5 only)          │
//! │ 56..64  jump-table start: u64         (v5 only)          │
//! │ 64..72  jump-table end: u64           (v5 only)          │
//! │ 72..80  deepest-internal-node: i64    (v5 only, -1 none) │
//! └──────────────────────────────────────────────────────────┘
//! ```

use crate::error::{Result, TreeError};
use crate::layout::{NodeLayout, COMPACT, LARGE};
use crate::resolver::ZoneResolver;
use crate::storage::Storage;

/// Magic bytes: "TREEXIFF" read big-endian.
pub const MAGIC: u64 = 0x5452_4545_5849_4646;

/// Format version for a pure Large-layout arena.
pub const VERSION_LARGE: u32 = 3;

/// Format version for a pure Compact-layout arena.
pub const VERSION_COMPACT: u32 = 4;

/// Format version for a hybrid arena with a transition boundary.
pub const VERSION_HYBRID: u32 = 5;

/// Fixed header size for all versions. The root node starts here.
pub const HEADER_SIZE: u64 = 80;

/// Parsed arena header.
#[derive(Debug, Clone, Copy)]
pub struct TreeHeader {
    pub version: u32,
    pub text_len: u32,
    pub root: u64,
    pub text_region: u64,
    pub node_count: u32,
    pub total_size: u64,
    pub transition: u64,
    pub jump_start: u64,
    pub jump_end: u64,
    pub deepest_internal: i64,
}

impl TreeHeader {
    /// Write the header into the arena prefix. This is the publication
    /// point of a build; callers must have finished every other write.
    pub fn write<S: Storage>(&self, arena: &mut S) -> Result<()> {
        arena.write_u64(0, MAGIC)?;
        arena.write_u32(8, self.version)?;
        arena.write_u32(12, self.text_len)?;
        arena.write_u64(16, self.root)?;
        arena.write_u64(24, self.text_region)?;
        arena.write_u32(32, self.node_count)?;
        arena.write_u32(36, 0)?;
        arena.write_u64(40, self.total_size)?;
        if self.version == VERSION_HYBRID {
            arena.write_u64(48, self.transition)?;
            arena.write_u64(56, self.jump_start)?;
            arena.write_u64(64, self.jump_end)?;
            arena.write_i64(72, self.deepest_internal)?;
        } else {
            arena.write_u64(48, 0)?;
            arena.write_u64(56, 0)?;
            arena.write_u64(64, 0)?;
            arena.write_i64(72, 0)?;
        }
        Ok(())
    }

    /// Parse the header from the arena prefix. Field-level sanity lives in
    /// [`TreeHeader::validate`]; this only rejects what cannot be parsed.
    pub fn read<S: Storage>(arena: &S) -> Result<Self> {
        if arena.size() < HEADER_SIZE {
            return Err(TreeError::invalid_format(format!(
                "truncated arena: {} bytes is smaller than the {}-byte header",
                arena.size(),
                HEADER_SIZE
            )));
        }
        let magic = arena.read_u64(0)?;
        if magic != MAGIC {
            return Err(TreeError::invalid_format(format!(
                "bad magic {:#018x}, expected {:#018x}",
                magic, MAGIC
            )));
        }
        let version = arena.read_u32(8)?;
        if !(VERSION_LARGE..=VERSION_HYBRID).contains(&version) {
            return Err(TreeError::invalid_format(format!(
                "unknown format version {}",
                version
            )));
        }
        let text_len = arena.read_u32(12)?;
        let root = arena.read_u64(16)?;
        let text_region = arena.read_u64(24)?;
        let node_count = arena.read_u32(32)?;
        let total_size = arena.read_u64(40)?;

        let (transition, jump_start, jump_end, deepest_internal) = if version == VERSION_HYBRID {
            (
                arena.read_u64(48)?,
                arena.read_u64(56)?,
                arena.read_u64(64)?,
                arena.read_i64(72)?,
            )
        } else {
            (0, 0, 0, -1)
        };

        Ok(Self {
            version,
            text_len,
            root,
            text_region,
            node_count,
            total_size,
            transition,
            jump_start,
            jump_end,
            deepest_internal,
        })
    }

    /// Check every header-level invariant against the actual arena size.
    pub fn validate(&self, arena_size: u64) -> Result<()> {
        if self.total_size != arena_size {
            return Err(TreeError::invalid_format(format!(
                "recorded size {} does not match arena size {}",
                self.total_size, arena_size
            )));
        }
        if self.root < HEADER_SIZE || self.root >= arena_size {
            return Err(TreeError::invalid_format(format!(
                "root offset {} is outside [{}, {})",
                self.root, HEADER_SIZE, arena_size
            )));
        }
        let text_bytes = u64::from(self.text_len) * 2;
        if self.text_region < HEADER_SIZE || self.text_region + text_bytes > arena_size {
            return Err(TreeError::invalid_format(format!(
                "text region [{}, {}) is outside [{}, {})",
                self.text_region,
                self.text_region + text_bytes,
                HEADER_SIZE,
                arena_size
            )));
        }
        if self.version == VERSION_HYBRID {
            if self.transition < HEADER_SIZE || self.transition > arena_size {
                return Err(TreeError::invalid_format(format!(
                    "transition offset {} is outside [{}, {}]",
                    self.transition, HEADER_SIZE, arena_size
                )));
            }
            if self.jump_start < HEADER_SIZE
                || self.jump_end > arena_size
                || self.jump_start > self.jump_end
            {
                return Err(TreeError::invalid_format(format!(
                    "jump table [{}, {}) is outside [{}, {})",
                    self.jump_start, self.jump_end, HEADER_SIZE, arena_size
                )));
            }
            if self.deepest_internal >= 0
                && ((self.deepest_internal as u64) < HEADER_SIZE
                    || self.deepest_internal as u64 >= arena_size)
            {
                return Err(TreeError::invalid_format(format!(
                    "deepest internal node offset {} is outside [{}, {})",
                    self.deepest_internal, HEADER_SIZE, arena_size
                )));
            }
        }
        Ok(())
    }

    /// Base layout implied by the version.
    pub fn base_layout(&self) -> Result<&'static NodeLayout> {
        NodeLayout::for_version(self.version)
    }

    /// Resolver covering this header's zones.
    pub fn resolver(&self) -> ZoneResolver {
        match self.version {
            VERSION_HYBRID => ZoneResolver::hybrid(self.transition, self.jump_start, self.jump_end),
            VERSION_LARGE => ZoneResolver::single(&LARGE),
            _ => ZoneResolver::single(&COMPACT),
        }
    }
}
