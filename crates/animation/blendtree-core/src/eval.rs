//! Build and read walks over a layer's blend tree.
//!
//! Both walks visit the tree in the same pre-order: the build walk lays out one
//! [`NodeSlot`] per node, the read walk claims them back one by one while
//! advancing cursors, sampling leaves and blending mixers.

use serde::{Deserialize, Serialize};

use crate::accumulate::{blend_group, build_groups};
use crate::binding::LayerBinding;
use crate::config::Config;
use crate::context::{ContextDiagnostic, ExecutionContext, NodeSlot};
use crate::cursor::PlaybackCursor;
use crate::data::ClipLibrary;
use crate::error::BlendError;
use crate::ids::{ClipId, NodeId};
use crate::interp::ease_in_out_quad;
use crate::node::{BlendNode, LeafNode, NodeGraph, TransitionNode};
use crate::sampling::{sample_clip_channels, sample_root_position, BindSample, SampleSource};
use crate::weights::WeightTable;
use crate::Result;

/// An event crossed during a read pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FiredEvent {
    pub node: NodeId,
    pub clip: ClipId,
    pub name: String,
    /// Normalized trigger position within the clip.
    pub position: f32,
}

/// Mutable state threaded through one read pass.
struct Pass<'p> {
    ctx: &'p mut ExecutionContext,
    weights: &'p mut WeightTable,
    events: &'p mut Vec<FiredEvent>,
}

/// Borrowed view of everything a walk needs besides the context.
pub struct Evaluator<'a> {
    pub graph: &'a NodeGraph,
    pub clips: &'a ClipLibrary,
    pub binding: &'a LayerBinding,
    pub cfg: &'a Config,
}

impl<'a> Evaluator<'a> {
    pub fn new(graph: &'a NodeGraph, clips: &'a ClipLibrary, binding: &'a LayerBinding, cfg: &'a Config) -> Self {
        Self {
            graph,
            clips,
            binding,
            cfg,
        }
    }

    /// Lay out slots for the subtree at `root` after the existing ones.
    ///
    /// An empty context adopts `root` as its active node.
    pub fn add_to_context(&self, ctx: &mut ExecutionContext, root: NodeId) -> Result<usize> {
        let mut built = Vec::new();
        self.build_slots(root, &mut built)?;
        let span = built.len();
        if ctx.is_empty() {
            ctx.set_active(Some(root));
        }
        for slot in built {
            ctx.add(slot);
        }
        log::trace!("built {span} slots for node {root:?}");
        Ok(span)
    }

    /// Wrap the running root in a cross-fade.
    ///
    /// The start subtree keeps its live cursors; only the transition slot and the
    /// end subtree are new. When the context root is not the transition's start,
    /// the context is rebuilt from scratch around the transition.
    pub fn insert_transition(&self, ctx: &mut ExecutionContext, transition: NodeId) -> Result<()> {
        let t = match self.graph.require(transition)? {
            BlendNode::Transition(t) => t,
            _ => return Err(BlendError::NotATransition(transition)),
        };
        let start_running = ctx.active() == Some(t.start) && ctx.slot(0).map(|s| s.node) == Some(t.start);
        if !start_running {
            log::debug!("cross-fade {:?}: start not running, rebuilding context", t.name);
            ctx.reset();
            self.add_to_context(ctx, transition)?;
            ctx.set_main(Some(1 + self.graph.span(t.start)), Some(1));
            return Ok(());
        }

        let mut end_slots = Vec::new();
        self.build_slots(t.end, &mut end_slots)?;
        let start_span = ctx.len();

        let mut slot = NodeSlot::new(transition, PlaybackCursor::new(t.max_frames, 1.0, None));
        slot.children = vec![1, 1 + start_span];
        slot.span = 1 + start_span + end_slots.len();
        let start_samples = ctx.slot(0).map(|s| s.samples.as_slice()).unwrap_or(&[]);
        let end_samples = end_slots.first().map(|s| s.samples.as_slice()).unwrap_or(&[]);
        Self::attach_groups(&mut slot, [start_samples, end_samples]);

        ctx.insert_front(slot);
        for s in end_slots {
            ctx.add(s);
        }
        ctx.set_active(Some(transition));
        ctx.promote_main(1 + start_span);
        log::debug!("cross-fade {:?} inserted over {start_span} running slots", t.name);
        Ok(())
    }

    /// Tear down the slots of `node`'s subtree. Returns how many were removed.
    pub fn remove_from_context(&self, ctx: &mut ExecutionContext, node: NodeId) -> usize {
        let Some(index) = ctx.position_of(node) else {
            return 0;
        };
        let span = ctx.slot(index).map(|s| s.span).unwrap_or(0);
        ctx.remove_span(index, span);
        if ctx.active() == Some(node) {
            ctx.set_active(None);
        }
        span
    }

    fn build_slots(&self, id: NodeId, out: &mut Vec<NodeSlot>) -> Result<()> {
        match self.graph.require(id)? {
            BlendNode::Leaf(leaf) => {
                out.push(self.leaf_slot(id, leaf)?);
                Ok(())
            }
            BlendNode::Mixer(m) => self.build_blend_slot(id, m.max_frames, &m.children, out),
            BlendNode::Transition(t) => self.build_blend_slot(id, t.max_frames, &[t.start, t.end], out),
        }
    }

    fn leaf_slot(&self, id: NodeId, leaf: &LeafNode) -> Result<NodeSlot> {
        let clip = self.clips.get(leaf.clip).ok_or(BlendError::UnknownClip(leaf.clip))?;
        let root_channel = clip.root_motion().map(|rm| rm.channel);
        let mut slot = NodeSlot::new(
            id,
            PlaybackCursor::new(leaf.max_frames, leaf.default_speed, leaf.speed_weight),
        );
        slot.cursor.last_root_pos = clip.root_start();
        // Unbound targets and the root-motion channel stay out of the pose.
        slot.samples = clip
            .channels()
            .iter()
            .enumerate()
            .filter(|(idx, ch)| Some(*idx) != root_channel && self.binding.contains(ch.target_hash()))
            .map(|(idx, ch)| {
                let mut sample = BindSample::new(ch.identity(), SampleSource::Channel(idx));
                ch.sample_into(0, 0, 0.0, sample.values_mut());
                sample
            })
            .collect();
        slot.event_triggers = clip.events().iter().map(|e| e.position).collect();
        Ok(slot)
    }

    fn build_blend_slot(&self, id: NodeId, max_frames: usize, children: &[NodeId], out: &mut Vec<NodeSlot>) -> Result<()> {
        let base = out.len();
        out.push(NodeSlot::new(id, PlaybackCursor::new(max_frames, 1.0, None)));
        let mut offsets = Vec::with_capacity(children.len());
        for child in children {
            offsets.push(out.len() - base);
            self.build_slots(*child, out)?;
        }
        let span = out.len() - base;
        let (head, tail) = out.split_at_mut(base + 1);
        let slot = &mut head[base];
        let child_samples = offsets.iter().map(|o| tail[o - 1].samples.as_slice());
        Self::attach_groups(slot, child_samples);
        slot.children = offsets;
        slot.span = span;
        Ok(())
    }

    fn attach_groups<'s, I>(slot: &mut NodeSlot, child_samples: I)
    where
        I: IntoIterator<Item = &'s [BindSample]>,
    {
        slot.groups = build_groups(child_samples);
        slot.samples = slot
            .groups
            .iter()
            .enumerate()
            .map(|(g, group)| BindSample::new(group.identity, SampleSource::Group(g)))
            .collect();
    }

    /// Run one read pass from the context's active node.
    pub fn read_root(&self, ctx: &mut ExecutionContext, weights: &mut WeightTable, dt: f32, events: &mut Vec<FiredEvent>) {
        ctx.begin_read();
        if let Some(root) = ctx.active() {
            let mut pass = Pass { ctx, weights, events };
            self.read(&mut pass, root, dt, true);
            pass.ctx.end_read();
        } else {
            ctx.end_read();
        }
    }

    fn read(&self, pass: &mut Pass<'_>, node: NodeId, dt: f32, play_events: bool) -> Option<usize> {
        match self.graph.get(node) {
            Some(BlendNode::Leaf(leaf)) => self.read_leaf(pass, node, leaf, dt, play_events),
            Some(BlendNode::Mixer(m)) => {
                let i = pass.ctx.next(node)?;
                let raw: Vec<f32> = m.weights.iter().map(|w| pass.weights.value(*w)).collect();
                let sum: f32 = raw.iter().map(|w| w.abs()).sum();
                if sum <= self.cfg.weight_epsilon {
                    let below = pass.ctx.slot(i).map(|s| s.span).unwrap_or(1).saturating_sub(1);
                    pass.ctx.skip(below);
                    if let Some(slot) = pass.ctx.slot_mut(i) {
                        slot.delta_position = [0.0; 3];
                    }
                    log::trace!("mixer {:?} has no weight, skipping {below} slots", m.name);
                    return Some(i);
                }
                let normalized: Vec<f32> = raw.iter().map(|w| w / sum).collect();
                for (id, w) in m.weights.iter().zip(&normalized) {
                    pass.weights.set(*id, *w);
                }
                self.blend_children(pass, i, &m.children, &normalized, m.match_speeds, dt, play_events);
                Some(i)
            }
            Some(BlendNode::Transition(t)) => self.read_transition(pass, node, t, dt, play_events),
            None => {
                pass.ctx.report(ContextDiagnostic::MissingNode(node));
                None
            }
        }
    }

    fn read_leaf(&self, pass: &mut Pass<'_>, node: NodeId, leaf: &LeafNode, dt: f32, play_events: bool) -> Option<usize> {
        let i = pass.ctx.next(node)?;
        let clip = self.clips.get(leaf.clip)?;
        let speed = pass.ctx.speed();
        let slot = pass.ctx.slot_mut(i)?;

        let step = dt * speed * slot.cursor.effective_speed(pass.weights) * clip.framerate;
        slot.cursor.advance(step, leaf.next.loops());
        sample_clip_channels(clip, &slot.cursor, &mut slot.samples);

        slot.delta_position = match sample_root_position(clip, &slot.cursor) {
            Some(pos) => {
                let last = slot.cursor.last_root_pos;
                slot.cursor.last_root_pos = pos;
                [pos[0] - last[0], pos[1] - last[1], pos[2] - last[2]]
            }
            None => [0.0; 3],
        };

        // Each trigger is the next forward occurrence; playback sits in [trigger - 1, trigger).
        let progress = slot.cursor.progress();
        let looping = leaf.next.loops();
        for (trigger, event) in slot.event_triggers.iter_mut().zip(clip.events()) {
            let crossed = if progress >= *trigger {
                // One fire per tick however many laps were crossed.
                *trigger += (progress - *trigger).floor() + 1.0;
                true
            } else if progress < *trigger - 1.0 {
                // Played backwards past the previous occurrence. A clamped rewind only re-arms.
                *trigger -= (*trigger - 1.0 - progress).ceil();
                looping
            } else {
                false
            };
            if crossed && play_events {
                pass.events.push(FiredEvent {
                    node,
                    clip: leaf.clip,
                    name: event.name.clone(),
                    position: event.position,
                });
            }
        }
        Some(i)
    }

    fn read_transition(&self, pass: &mut Pass<'_>, node: NodeId, t: &TransitionNode, dt: f32, play_events: bool) -> Option<usize> {
        let i = pass.ctx.next(node)?;
        let speed = pass.ctx.speed();
        let slot = pass.ctx.slot_mut(i)?;
        // A reversed context still runs the fade forward.
        slot.elapsed += dt * speed.abs();
        let elapsed = slot.elapsed;
        let ratio = if t.duration <= 0.0 {
            1.0
        } else {
            slot.elapsed / t.duration
        };
        let end_offset = slot.children.get(1).copied().unwrap_or(1);

        let finished = ratio >= 1.0 || t.depth > self.cfg.max_transition_depth;
        if finished && pass.ctx.active() == Some(node) && i == 0 {
            pass.ctx.remove_span(i, end_offset);
            pass.ctx.set_active(Some(t.end));
            pass.ctx.record_rebind(t.end);
            log::debug!("cross-fade {:?} collapsed after {elapsed:.3}s", t.name);
            return self.read(pass, t.end, dt, play_events);
        }

        let e = ease_in_out_quad(ratio.min(1.0));
        self.blend_children(pass, i, &[t.start, t.end], &[1.0 - e, e], false, dt, play_events);
        Some(i)
    }

    #[allow(clippy::too_many_arguments)]
    fn blend_children(
        &self,
        pass: &mut Pass<'_>,
        i: usize,
        children: &[NodeId],
        weights: &[f32],
        match_speeds: bool,
        dt: f32,
        play_events: bool,
    ) {
        let avg_frames: f32 = children
            .iter()
            .zip(weights)
            .map(|(c, w)| w.abs() * self.max_frames(*c) as f32)
            .sum();
        let dominant = weights
            .iter()
            .enumerate()
            .fold(0, |best, (k, w)| if w.abs() > weights[best].abs() { k } else { best });
        let child_dt = match pass.ctx.slot(i) {
            Some(slot) => dt * slot.cursor.effective_speed(pass.weights),
            None => dt,
        };

        for (k, child) in children.iter().enumerate() {
            if match_speeds && avg_frames > 0.0 {
                let scale = self.max_frames(*child) as f32 / avg_frames;
                if let Some(next) = pass.ctx.peek_mut() {
                    if next.node == *child {
                        next.cursor.match_scale = scale;
                    }
                }
            }
            self.read(pass, *child, child_dt, play_events && k == dominant);
        }

        let eps = self.cfg.rotation_epsilon;
        let slots = pass.ctx.slots_mut();
        if i >= slots.len() {
            return;
        }
        let (head, tail) = slots.split_at_mut(i + 1);
        let me = &mut head[i];
        let child = |k: usize| me.children.get(k).and_then(|o| tail.get(o - 1));

        let mut delta = [0.0f32; 3];
        for (k, w) in weights.iter().enumerate() {
            if let Some(c) = child(k) {
                for (d, v) in delta.iter_mut().zip(c.delta_position) {
                    *d += w * v;
                }
            }
        }

        for (group, sample) in me.groups.iter().zip(me.samples.iter_mut()) {
            let contributions = group.contributors.iter().filter_map(|c| {
                let values = child(c.child)?.samples.get(c.sample)?.values();
                Some((values, weights.get(c.child).copied().unwrap_or(0.0)))
            });
            blend_group(group.identity.kind, contributions, eps, sample.values_mut());
        }

        if let Some(n) = child(dominant).map(|c| c.cursor.normalized_time()) {
            me.cursor.sync_normalized(n);
        }
        me.delta_position = delta;
    }

    fn max_frames(&self, id: NodeId) -> usize {
        self.graph.get(id).map(BlendNode::max_frames).unwrap_or(0)
    }
}
