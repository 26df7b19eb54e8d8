// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Logical export and import: text plus a shape hash, no node bytes.
//!
//! Suffix links and node offsets are construction artifacts; the only
//! thing worth shipping is the text and a fingerprint proving the rebuilt
//! tree has the same shape. Export writes the text and a SHA-256 over
//! (text || deterministic shape stream); import rebuilds the tree from the
//! text and verifies node count and hash. Suffix links come back for free
//! because the rebuild creates them natively.
//!
//! The shape stream is produced by `traverse`: each node contributes
//! `(start, end, leaf_count, child_count)` as four little-endian i32,
//! each branch entry its key, and each branch exit the sentinel `-999`.
//! Identical shapes hash identically regardless of storage backend or
//! hybrid geometry.
//!
//! # Format (v2)
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ 0..8   magic: u64 = 0x53544C4F47494332       │
//! │ 8..12  version: i32 = 2                      │
//! │        7-bit-encoded code-unit count         │
//! │        text: count * u16 (little-endian)     │
//! │        node count: i32                       │
//! │        hash length: i32                      │
//! │        hash bytes (SHA-256)                  │
//! └──────────────────────────────────────────────┘
//! ```

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::builder::TreeBuilder;
use crate::error::{Result, TreeError};
use crate::storage::{HeapArena, Storage};
use crate::text::Text;
use crate::tree::{NodeInfo, SuffixTree, TreeVisitor};

/// Export stream magic.
pub const EXPORT_MAGIC: u64 = 0x5354_4C4F_4749_4332;

/// Export stream version.
pub const EXPORT_VERSION: i32 = 2;

/// Shape-stream sentinel emitted on `exit_branch`.
pub const BRANCH_EXIT_SENTINEL: i32 = -999;

/// Varint can spend at most 10 bytes on a u64.
const MAX_VARINT_BYTES: usize = 10;

const TEXT_HASH_CHUNK_UNITS: u32 = 8 * 1024;

// ============================================================================
// VARINT ENCODING
// ============================================================================

/// Encode a 7-bit varint (LEB128).
pub fn encode_varint(mut value: u64, buf: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

/// Decode a varint, returning `(value, bytes_consumed)`.
pub fn decode_varint(bytes: &[u8]) -> Result<(u64, usize)> {
    if bytes.is_empty() {
        return Err(TreeError::invalid_format(
            "truncated logical export: empty varint",
        ));
    }
    let mut result: u64 = 0;
    let mut shift = 0;
    let mut index = 0;
    while index < bytes.len() && index < MAX_VARINT_BYTES {
        let byte = bytes[index];
        result |= u64::from(byte & 0x7F) << shift;
        index += 1;
        if byte & 0x80 == 0 {
            return Ok((result, index));
        }
        shift += 7;
    }
    if index >= MAX_VARINT_BYTES {
        Err(TreeError::invalid_format(
            "varint exceeds maximum length (possible corruption)",
        ))
    } else {
        Err(TreeError::invalid_format(
            "truncated logical export: incomplete varint",
        ))
    }
}

// ============================================================================
// LOGICAL HASH
// ============================================================================

struct ShapeHasher<'a> {
    hasher: &'a mut Sha256,
}

impl TreeVisitor for ShapeHasher<'_> {
    fn visit_node(&mut self, node: &NodeInfo) {
        self.hasher.update((node.start as i32).to_le_bytes());
        self.hasher.update((node.end as i32).to_le_bytes());
        self.hasher.update((node.leaf_count as i32).to_le_bytes());
        self.hasher.update((node.child_count as i32).to_le_bytes());
    }

    fn enter_branch(&mut self, key: i32) {
        self.hasher.update(key.to_le_bytes());
    }

    fn exit_branch(&mut self) {
        self.hasher.update(BRANCH_EXIT_SENTINEL.to_le_bytes());
    }
}

/// SHA-256 over the text (as little-endian code units, chunked) followed
/// by the deterministic shape stream.
pub fn logical_hash<S: Storage>(tree: &SuffixTree<S>) -> Result<[u8; 32]> {
    let mut hasher = Sha256::new();

    let text_len = tree.text_len();
    let mut start = 0u32;
    let mut chunk = vec![0u8; TEXT_HASH_CHUNK_UNITS as usize * 2];
    while start < text_len {
        let take = (text_len - start).min(TEXT_HASH_CHUNK_UNITS);
        let buf = &mut chunk[..take as usize * 2];
        tree.read_text_bytes(start, buf)?;
        hasher.update(&*buf);
        start += take;
    }

    let mut shape = ShapeHasher {
        hasher: &mut hasher,
    };
    tree.traverse(&mut shape)?;
    Ok(hasher.finalize().into())
}

// ============================================================================
// EXPORT / IMPORT
// ============================================================================

/// Serialize the logical content of a tree. Byte-for-byte deterministic
/// for a given text.
pub fn export_logical<S: Storage>(tree: &SuffixTree<S>) -> Result<Vec<u8>> {
    let text_len = tree.text_len();
    let mut out = Vec::with_capacity(32 + text_len as usize * 2);
    out.extend_from_slice(&EXPORT_MAGIC.to_le_bytes());
    out.extend_from_slice(&EXPORT_VERSION.to_le_bytes());
    encode_varint(u64::from(text_len), &mut out);

    let mut start = 0u32;
    let mut chunk = vec![0u8; TEXT_HASH_CHUNK_UNITS as usize * 2];
    while start < text_len {
        let take = (text_len - start).min(TEXT_HASH_CHUNK_UNITS);
        let buf = &mut chunk[..take as usize * 2];
        tree.read_text_bytes(start, buf)?;
        out.extend_from_slice(buf);
        start += take;
    }

    out.extend_from_slice(&(tree.node_count() as i32).to_le_bytes());
    let hash = logical_hash(tree)?;
    out.extend_from_slice(&(hash.len() as i32).to_le_bytes());
    out.extend_from_slice(&hash);
    Ok(out)
}

struct StreamReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> StreamReader<'a> {
    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let end = self.position.checked_add(len).ok_or_else(|| {
            TreeError::invalid_format(format!("logical export length overflow at {}", what))
        })?;
        if end > self.bytes.len() {
            return Err(TreeError::invalid_format(format!(
                "truncated logical export at {}",
                what
            )));
        }
        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn read_u64(&mut self, what: &str) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8, what)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn read_i32(&mut self, what: &str) -> Result<i32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4, what)?);
        Ok(i32::from_le_bytes(buf))
    }

    fn read_varint(&mut self) -> Result<u64> {
        let (value, consumed) = decode_varint(&self.bytes[self.position..])?;
        self.position += consumed;
        Ok(value)
    }
}

/// Rebuild a tree from an exported stream and verify its structure.
/// Truncation is detected before any hash work; node count and hash
/// mismatches are reported as structural mismatches.
pub fn import_logical(bytes: &[u8]) -> Result<SuffixTree<HeapArena>> {
    let mut reader = StreamReader { bytes, position: 0 };

    let magic = reader.read_u64("magic")?;
    if magic != EXPORT_MAGIC {
        return Err(TreeError::invalid_format(format!(
            "bad export magic {:#018x}, expected {:#018x}",
            magic, EXPORT_MAGIC
        )));
    }
    let version = reader.read_i32("version")?;
    if version != EXPORT_VERSION {
        return Err(TreeError::invalid_format(format!(
            "unsupported export version {}",
            version
        )));
    }

    let unit_count = reader.read_varint()?;
    if unit_count >= u64::from(u32::MAX) {
        return Err(TreeError::invalid_format(format!(
            "export text length {} exceeds the 32-bit index space",
            unit_count
        )));
    }
    let text_bytes = reader.take(unit_count as usize * 2, "text")?;
    let units: Vec<u16> = text_bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    let node_count = reader.read_i32("node count")?;
    let hash_len = reader.read_i32("hash length")?;
    if hash_len != 32 {
        return Err(TreeError::invalid_format(format!(
            "unexpected hash length {}, expected 32",
            hash_len
        )));
    }
    let expected_hash = reader.take(32, "hash bytes")?;

    let tree = TreeBuilder::new(HeapArena::new()).build(&Text::new(units))?;

    if tree.node_count() as i32 != node_count {
        return Err(TreeError::StructuralMismatch {
            what: "node count",
            expected: node_count.to_string(),
            actual: tree.node_count().to_string(),
        });
    }
    let actual_hash = logical_hash(&tree)?;
    if !constant_time_eq(&actual_hash, expected_hash) {
        return Err(TreeError::StructuralMismatch {
            what: "logical hash",
            expected: hex(expected_hash),
            actual: hex(&actual_hash),
        });
    }
    debug!(nodes = tree.node_count(), "imported logical export");
    Ok(tree)
}

/// Constant-time byte equality: no early exit on the first difference.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
