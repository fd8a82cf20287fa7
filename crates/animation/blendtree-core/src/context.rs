//! Per-layer execution stack.
//!
//! The build walk ([`Evaluator::add_to_context`](crate::eval::Evaluator::add_to_context))
//! lays out one [`NodeSlot`] per visited node in pre-order; the read walk claims
//! them back with [`ExecutionContext::next`] in the same order. Every claim is
//! checked against the slot's owner, and a read pass that leaves slots unclaimed
//! is reported, so a desynced pairing surfaces as a [`ContextDiagnostic`] instead
//! of a silently corrupt pose.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::accumulate::SampleGroup;
use crate::cursor::PlaybackCursor;
use crate::ids::NodeId;
use crate::sampling::BindSample;

/// Runtime state of one node instance.
#[derive(Clone, Debug)]
pub struct NodeSlot {
    pub node: NodeId,
    pub cursor: PlaybackCursor,
    pub samples: Vec<BindSample>,
    pub delta_position: [f32; 3],
    /// Child slot offsets relative to this slot.
    pub children: Vec<usize>,
    /// Mixer sample groups; `samples[g]` holds the blend of `groups[g]`.
    pub groups: Vec<SampleGroup>,
    /// Next trigger of each clip event, in laps.
    pub event_triggers: Vec<f32>,
    /// Seconds since a transition started.
    pub elapsed: f32,
    /// Slots in this subtree, including this one.
    pub span: usize,
}

impl NodeSlot {
    pub fn new(node: NodeId, cursor: PlaybackCursor) -> Self {
        Self {
            node,
            cursor,
            samples: Vec::new(),
            delta_position: [0.0; 3],
            children: Vec::new(),
            groups: Vec::new(),
            event_triggers: Vec::new(),
            elapsed: 0.0,
            span: 1,
        }
    }
}

/// Build/read pairing faults.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ContextDiagnostic {
    #[error("node {node:?} read past the end of the context ({built} slots)")]
    Exhausted { node: NodeId, built: usize },
    #[error("slot {index} belongs to node {owner:?} but node {node:?} claimed it")]
    OwnerMismatch {
        index: usize,
        owner: NodeId,
        node: NodeId,
    },
    #[error("read pass consumed {consumed} of {built} slots")]
    Unconsumed { consumed: usize, built: usize },
    #[error("node {0:?} is not in the graph")]
    MissingNode(NodeId),
}

#[derive(Clone, Debug, Default)]
pub struct ExecutionContext {
    slots: Vec<NodeSlot>,
    read: usize,
    active: Option<NodeId>,
    main: Option<usize>,
    previous_main: Option<usize>,
    speed: f32,
    strict: bool,
    rebind: Option<NodeId>,
    read_order: Vec<NodeId>,
    diagnostics: Vec<ContextDiagnostic>,
}

impl ExecutionContext {
    pub fn new(capacity: usize, strict: bool) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            speed: 1.0,
            strict,
            ..Default::default()
        }
    }

    /// Drop every slot. Speed and strictness survive.
    pub fn reset(&mut self) {
        self.slots.clear();
        self.read = 0;
        self.active = None;
        self.main = None;
        self.previous_main = None;
        self.rebind = None;
        self.read_order.clear();
        self.diagnostics.clear();
    }

    /// Append a slot during a build walk.
    pub fn add(&mut self, slot: NodeSlot) -> usize {
        if self.slots.is_empty() {
            self.main = Some(0);
        }
        self.slots.push(slot);
        self.slots.len() - 1
    }

    /// Insert a slot ahead of everything else (a cross-fade wrapping the current root).
    pub fn insert_front(&mut self, slot: NodeSlot) {
        self.slots.insert(0, slot);
        self.main = self.main.map(|m| m + 1);
        self.previous_main = self.previous_main.map(|m| m + 1);
    }

    /// Point the main cursor at a slot, demoting the old one.
    pub fn promote_main(&mut self, index: usize) {
        self.previous_main = self.main;
        self.main = Some(index);
    }

    pub fn set_main(&mut self, main: Option<usize>, previous: Option<usize>) {
        self.main = main;
        self.previous_main = previous;
    }

    pub fn begin_read(&mut self) {
        self.read = 0;
        self.read_order.clear();
        self.diagnostics.clear();
    }

    /// Claim the next slot for `node`.
    pub fn next(&mut self, node: NodeId) -> Option<usize> {
        let Some(slot) = self.slots.get(self.read) else {
            self.report(ContextDiagnostic::Exhausted {
                node,
                built: self.slots.len(),
            });
            return None;
        };
        if slot.node != node {
            let owner = slot.node;
            self.report(ContextDiagnostic::OwnerMismatch {
                index: self.read,
                owner,
                node,
            });
            return None;
        }
        self.read_order.push(node);
        self.read += 1;
        Some(self.read - 1)
    }

    /// The slot the next claim will return.
    pub fn peek(&self) -> Option<&NodeSlot> {
        self.slots.get(self.read)
    }

    pub fn peek_mut(&mut self) -> Option<&mut NodeSlot> {
        self.slots.get_mut(self.read)
    }

    /// Step over slots without reading them.
    pub fn skip(&mut self, count: usize) {
        self.read = (self.read + count).min(self.slots.len());
    }

    pub fn end_read(&mut self) {
        if self.read != self.slots.len() {
            self.report(ContextDiagnostic::Unconsumed {
                consumed: self.read,
                built: self.slots.len(),
            });
        }
    }

    /// Remove `count` slots starting at `start`, keeping the read index and main
    /// cursors pointing at the same slots.
    pub fn remove_span(&mut self, start: usize, count: usize) {
        let end = (start + count).min(self.slots.len());
        if start >= end {
            return;
        }
        let removed = end - start;
        self.slots.drain(start..end);
        if self.read > start {
            self.read -= removed.min(self.read - start);
        }
        let shift = |m: Option<usize>| match m {
            Some(i) if i >= end => Some(i - removed),
            Some(i) if i >= start => None,
            other => other,
        };
        self.main = shift(self.main);
        self.previous_main = shift(self.previous_main);
        if self.main.is_none() && !self.slots.is_empty() {
            self.main = Some(0);
        }
    }

    pub fn report(&mut self, diag: ContextDiagnostic) {
        log::warn!("execution context: {diag}");
        if self.strict && cfg!(debug_assertions) {
            panic!("execution context desync: {diag}");
        }
        self.diagnostics.push(diag);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn read_index(&self) -> usize {
        self.read
    }

    pub fn slot(&self, index: usize) -> Option<&NodeSlot> {
        self.slots.get(index)
    }

    pub fn slot_mut(&mut self, index: usize) -> Option<&mut NodeSlot> {
        self.slots.get_mut(index)
    }

    pub fn slots(&self) -> &[NodeSlot] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [NodeSlot] {
        &mut self.slots
    }

    pub fn position_of(&self, node: NodeId) -> Option<usize> {
        self.slots.iter().position(|s| s.node == node)
    }

    /// Current top-level node.
    #[inline]
    pub fn active(&self) -> Option<NodeId> {
        self.active
    }

    pub fn set_active(&mut self, node: Option<NodeId>) {
        self.active = node;
    }

    pub fn main_cursor(&self) -> Option<&PlaybackCursor> {
        self.main.and_then(|i| self.slots.get(i)).map(|s| &s.cursor)
    }

    pub fn main_cursor_mut(&mut self) -> Option<&mut PlaybackCursor> {
        let i = self.main?;
        self.slots.get_mut(i).map(|s| &mut s.cursor)
    }

    pub fn previous_main_cursor(&self) -> Option<&PlaybackCursor> {
        self.previous_main.and_then(|i| self.slots.get(i)).map(|s| &s.cursor)
    }

    /// Context-wide playback speed.
    #[inline]
    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = if speed.is_finite() { speed } else { 1.0 };
    }

    /// Note that the top-level node was replaced during a read.
    pub fn record_rebind(&mut self, node: NodeId) {
        self.rebind = Some(node);
    }

    pub fn take_rebind(&mut self) -> Option<NodeId> {
        self.rebind.take()
    }

    /// Nodes claimed during the last read pass, in claim order.
    pub fn read_order(&self) -> &[NodeId] {
        &self.read_order
    }

    pub fn diagnostics(&self) -> &[ContextDiagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<ContextDiagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(n: u32) -> NodeSlot {
        NodeSlot::new(NodeId(n), PlaybackCursor::new(10, 1.0, None))
    }

    fn lenient() -> ExecutionContext {
        ExecutionContext::new(8, false)
    }

    #[test]
    fn reads_follow_build_order() {
        let mut ctx = lenient();
        for n in [4, 1, 2] {
            ctx.add(slot(n));
        }
        ctx.begin_read();
        assert_eq!(ctx.peek().map(|s| s.node), Some(NodeId(4)));
        assert_eq!(ctx.next(NodeId(4)), Some(0));
        assert_eq!(ctx.next(NodeId(1)), Some(1));
        assert_eq!(ctx.next(NodeId(2)), Some(2));
        ctx.end_read();
        assert!(ctx.diagnostics().is_empty());
        assert_eq!(ctx.read_order(), &[NodeId(4), NodeId(1), NodeId(2)]);
    }

    #[test]
    fn mismatches_are_reported() {
        let mut ctx = lenient();
        ctx.add(slot(0));
        ctx.begin_read();
        assert_eq!(ctx.next(NodeId(3)), None);
        ctx.end_read();
        assert_eq!(
            ctx.diagnostics(),
            &[
                ContextDiagnostic::OwnerMismatch {
                    index: 0,
                    owner: NodeId(0),
                    node: NodeId(3)
                },
                ContextDiagnostic::Unconsumed {
                    consumed: 0,
                    built: 1
                },
            ]
        );
        ctx.begin_read();
        ctx.next(NodeId(0));
        assert_eq!(ctx.next(NodeId(0)), None);
        assert!(matches!(
            ctx.diagnostics()[0],
            ContextDiagnostic::Exhausted { built: 1, .. }
        ));
    }

    #[test]
    fn insert_front_and_remove_span_track_main() {
        let mut ctx = lenient();
        ctx.add(slot(0));
        ctx.insert_front(slot(5));
        ctx.add(slot(1));
        ctx.promote_main(2);
        assert_eq!(ctx.previous_main_cursor().map(|c| c.max_frames()), Some(10));

        ctx.begin_read();
        ctx.next(NodeId(5));
        ctx.remove_span(0, 2);
        assert_eq!(ctx.read_index(), 0);
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.slot(0).map(|s| s.node), Some(NodeId(1)));
        assert!(ctx.main_cursor().is_some());
        assert!(ctx.previous_main_cursor().is_none());
    }

    #[test]
    fn skip_is_bounded() {
        let mut ctx = lenient();
        ctx.add(slot(0));
        ctx.add(slot(1));
        ctx.begin_read();
        ctx.next(NodeId(0));
        ctx.skip(5);
        ctx.end_read();
        assert!(ctx.diagnostics().is_empty());
    }
}
