// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Streaming algorithms shared by every tree that can produce a navigator.
//!
//! Both algorithms stream the query through the tree once, maintaining the
//! longest suffix of the consumed query that is also a substring of the
//! indexed text. Extension walks down child edges; a mismatch drops the
//! first unit of the current match by following the suffix link of the
//! deepest fully-matched node and re-descending with skip/count. Every
//! descent step moves the node boundary forward, so the whole pass is
//! O(m log k) in the query length.
//!
//! Written once against [`TreeNav`]; monomorphization specializes them per
//! tree type.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TreeError};
use crate::navigate::{NodeHandle, TreeNav};

/// Longest common substring of the indexed text and a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSpan {
    /// Length in code units.
    pub length: u32,
    /// Starting position of one occurrence in the indexed text.
    pub text_position: u32,
    /// Starting position in the query.
    pub query_position: u32,
}

/// One maximal high-quality match region between text and query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchAnchor {
    /// Starting position of one occurrence in the indexed text.
    pub text_position: u32,
    /// Starting position in the query.
    pub query_position: u32,
    /// Length in code units.
    pub length: u32,
}

/// Match cursor: the deepest fully-matched node plus the projection of the
/// remaining matched units onto one of its child edges.
struct Stream<'a, N: TreeNav> {
    nav: &'a N,
    query: &'a [u16],
    node: NodeHandle,
    node_depth: u32,
    matched: u32,
    start: usize,
}

impl<'a, N: TreeNav> Stream<'a, N> {
    fn new(nav: &'a N, query: &'a [u16]) -> Self {
        Self {
            nav,
            query,
            node: nav.root(),
            node_depth: 0,
            matched: 0,
            start: 0,
        }
    }

    fn key_at(&self, index: usize) -> i32 {
        i32::from(self.query[index])
    }

    /// Move the node boundary as far down as the matched length allows.
    fn canonize(&mut self) -> Result<()> {
        while self.node_depth < self.matched {
            let key = self.key_at(self.start + self.node_depth as usize);
            let child = self
                .nav
                .child_by_key(self.node, key)?
                .ok_or_else(|| TreeError::invalid_format("matched path lost during descent"))?;
            let length = self.nav.edge_length(child)?;
            if self.node_depth + length <= self.matched {
                self.node = child;
                self.node_depth += length;
            } else {
                break;
            }
        }
        Ok(())
    }

    /// The node whose subtree holds every occurrence of the current match.
    fn locus(&self) -> Result<NodeHandle> {
        if self.matched == self.node_depth {
            return Ok(self.node);
        }
        let key = self.key_at(self.start + self.node_depth as usize);
        self.nav
            .child_by_key(self.node, key)?
            .ok_or_else(|| TreeError::invalid_format("matched path lost during descent"))
    }

    /// Try to grow the match by one query unit.
    fn try_extend(&mut self, unit: u16) -> Result<bool> {
        let key = i32::from(unit);
        if self.matched == self.node_depth {
            if self.nav.child_by_key(self.node, key)?.is_none() {
                return Ok(false);
            }
        } else {
            let edge = self.locus()?;
            let symbol = self.nav.edge_symbol(edge, self.matched - self.node_depth)?;
            if symbol != key {
                return Ok(false);
            }
        }
        self.matched += 1;
        self.canonize()?;
        Ok(true)
    }

    /// Drop the first unit of the match via the suffix link.
    fn shrink(&mut self) -> Result<()> {
        debug_assert!(self.matched > 0);
        if self.node_depth > 0 {
            self.node = self.nav.suffix_link(self.node)?;
            self.node_depth -= 1;
        }
        self.matched -= 1;
        self.start += 1;
        self.canonize()
    }

    /// Consume one query unit, shrinking until it fits or nothing is left.
    fn push(&mut self, index: usize) -> Result<()> {
        let unit = self.query[index];
        loop {
            if self.try_extend(unit)? {
                return Ok(());
            }
            if self.matched == 0 {
                self.start = index + 1;
                return Ok(());
            }
            self.shrink()?;
        }
    }
}

/// Longest common substring of the indexed text and `query`, or `None`
/// when they share nothing.
pub fn longest_common_match<N: TreeNav>(nav: &N, query: &[u16]) -> Result<Option<MatchSpan>> {
    if query.is_empty() || nav.text_len() == 0 {
        return Ok(None);
    }
    let mut stream = Stream::new(nav, query);
    let mut best: Option<(u32, usize, NodeHandle)> = None;

    for index in 0..query.len() {
        stream.push(index)?;
        if stream.matched > 0 && best.map_or(true, |(len, _, _)| stream.matched > len) {
            best = Some((stream.matched, index + 1, stream.locus()?));
        }
    }

    match best {
        None => Ok(None),
        Some((length, end, locus)) => Ok(Some(MatchSpan {
            length,
            text_position: nav.find_any_leaf_position(locus)?,
            query_position: (end - length as usize) as u32,
        })),
    }
}

/// Maximal match regions of at least `min_length` units, in query order.
///
/// A region opens when the running match length first reaches
/// `min_length`, tracks its peak while it stays there, and emits one
/// anchor when the match drops back below the threshold (or the query
/// ends).
pub fn exact_match_anchors<N: TreeNav>(
    nav: &N,
    query: &[u16],
    min_length: u32,
) -> Result<Vec<MatchAnchor>> {
    if min_length == 0 {
        return Err(TreeError::invalid_argument(
            "anchor min_length must be at least 1",
        ));
    }
    let mut anchors = Vec::new();
    if query.is_empty() || nav.text_len() == 0 {
        return Ok(anchors);
    }

    struct Peak {
        length: u32,
        end: usize,
        locus: NodeHandle,
    }

    let mut stream = Stream::new(nav, query);
    let mut peak: Option<Peak> = None;

    for index in 0..query.len() {
        stream.push(index)?;
        if stream.matched >= min_length {
            if peak.as_ref().map_or(true, |p| stream.matched > p.length) {
                peak = Some(Peak {
                    length: stream.matched,
                    end: index + 1,
                    locus: stream.locus()?,
                });
            }
        } else if let Some(p) = peak.take() {
            anchors.push(MatchAnchor {
                text_position: nav.find_any_leaf_position(p.locus)?,
                query_position: (p.end - p.length as usize) as u32,
                length: p.length,
            });
        }
    }

    if let Some(p) = peak.take() {
        anchors.push(MatchAnchor {
            text_position: nav.find_any_leaf_position(p.locus)?,
            query_position: (p.end - p.length as usize) as u32,
            length: p.length,
        });
    }

    Ok(anchors)
}
