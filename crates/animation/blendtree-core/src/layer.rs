//! Layer driver: one blend tree, its weights, binding and execution context.
//!
//! The layer owns every mutation of its tree. Switching motions (`play`,
//! `cross_fade`, `rebuild`) happens between ticks; `tick` first hands a held
//! one-shot over to its scripted next state, runs exactly one read pass, and then
//! adopts a cross-fade the pass collapsed.

use serde::{Deserialize, Serialize};

use crate::binding::{LayerBinding, PoseSink};
use crate::config::Config;
use crate::context::{ContextDiagnostic, ExecutionContext};
use crate::data::ClipLibrary;
use crate::eval::{Evaluator, FiredEvent};
use crate::ids::{LayerId, NodeId, WeightId};
use crate::node::{BlendNode, LeafCfg, MixerCfg, NextState, NodeGraph};
use crate::sampling::BindSample;
use crate::weights::WeightTable;
use crate::Result;

/// Result of one [`Layer::tick`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerTick {
    pub delta_position: [f32; 3],
    pub events: Vec<FiredEvent>,
    pub diagnostics: Vec<ContextDiagnostic>,
    /// Node adopted as root after a cross-fade collapsed.
    pub completed_transition: Option<NodeId>,
    /// `(from, to)` when a finished one-shot handed over to its next state.
    pub auto_advanced: Option<(NodeId, NodeId)>,
}

#[derive(Debug)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    cfg: Config,
    graph: NodeGraph,
    weights: WeightTable,
    binding: LayerBinding,
    ctx: ExecutionContext,
    root: Option<NodeId>,
    /// Transitions created by `cross_fade`, pruned once unreachable.
    runtime_transitions: Vec<NodeId>,
}

impl Layer {
    pub fn new(id: LayerId, name: impl Into<String>, binding: LayerBinding, cfg: Config) -> Self {
        let ctx = ExecutionContext::new(cfg.scratch_samples, cfg.strict_pairing);
        Self {
            id,
            name: name.into(),
            cfg,
            graph: NodeGraph::new(),
            weights: WeightTable::new(),
            binding,
            ctx,
            root: None,
            runtime_transitions: Vec::new(),
        }
    }

    pub fn declare_weight(&mut self, name: &str, initial: f32) -> WeightId {
        self.weights.declare(name, initial)
    }

    pub fn set_weight(&mut self, name: &str, value: f32) -> Result<()> {
        self.weights.set_by_name(name, value)
    }

    pub fn add_leaf(&mut self, clips: &ClipLibrary, cfg: LeafCfg) -> Result<NodeId> {
        self.graph.add_leaf(clips, &self.weights, cfg)
    }

    pub fn add_mixer(&mut self, cfg: MixerCfg) -> Result<NodeId> {
        self.graph.add_mixer(&self.weights, cfg)
    }

    /// Authored cross-fade node. Runtime fades come from [`Layer::cross_fade`].
    pub fn add_transition(&mut self, start: NodeId, end: NodeId, duration: f32) -> Result<NodeId> {
        self.graph.add_transition(start, end, duration)
    }

    pub fn set_next_state(&mut self, leaf: NodeId, next: NextState) -> Result<()> {
        self.graph.set_next_state(leaf, next)
    }

    /// Make `node` the top-level motion, discarding all running cursors.
    pub fn play(&mut self, clips: &ClipLibrary, node: NodeId) -> Result<()> {
        self.graph.require(node)?;
        self.ctx.reset();
        Evaluator::new(&self.graph, clips, &self.binding, &self.cfg).add_to_context(&mut self.ctx, node)?;
        self.root = Some(node);
        self.prune_transitions();
        log::debug!("layer {:?}: play {:?}", self.name, self.graph.require(node)?.name());
        Ok(())
    }

    /// Fade from the current root to `node` over `duration` seconds.
    ///
    /// Returns the node that became root: the new transition, or `node` itself when
    /// nothing was playing or the duration is zero.
    pub fn cross_fade(&mut self, clips: &ClipLibrary, node: NodeId, duration: f32) -> Result<NodeId> {
        let Some(current) = self.root else {
            self.play(clips, node)?;
            return Ok(node);
        };
        if duration <= 0.0 {
            self.play(clips, node)?;
            return Ok(node);
        }
        let transition = self.graph.add_transition(current, node, duration)?;
        self.runtime_transitions.push(transition);
        Evaluator::new(&self.graph, clips, &self.binding, &self.cfg).insert_transition(&mut self.ctx, transition)?;
        self.root = Some(transition);
        log::debug!(
            "layer {:?}: cross-fade over {duration:.3}s, depth {}",
            self.name,
            self.graph.require(transition)?.transition_depth()
        );
        Ok(transition)
    }

    /// Rebuild the context around the current root with fresh cursors.
    pub fn rebuild(&mut self, clips: &ClipLibrary) -> Result<()> {
        self.ctx.reset();
        if let Some(root) = self.root {
            Evaluator::new(&self.graph, clips, &self.binding, &self.cfg).add_to_context(&mut self.ctx, root)?;
        }
        log::debug!("layer {:?}: rebuilt {} slots", self.name, self.ctx.len());
        Ok(())
    }

    /// Swap the binding. Bind samples depend on it, so the context is rebuilt.
    pub fn set_binding(&mut self, clips: &ClipLibrary, binding: LayerBinding) -> Result<()> {
        self.binding = binding;
        self.rebuild(clips)
    }

    pub fn tick(&mut self, clips: &ClipLibrary, dt: f32) -> LayerTick {
        let mut out = LayerTick::default();
        if self.root.is_none() {
            return out;
        }
        // A one-shot that held its last pose through the previous tick hands over now.
        match self.auto_advance(clips) {
            Ok(advanced) => out.auto_advanced = advanced,
            Err(err) => log::warn!("layer {:?}: auto-advance failed: {err}", self.name),
        }

        Evaluator::new(&self.graph, clips, &self.binding, &self.cfg).read_root(
            &mut self.ctx,
            &mut self.weights,
            dt,
            &mut out.events,
        );

        if let Some(end) = self.ctx.take_rebind() {
            self.root = Some(end);
            self.prune_transitions();
            out.completed_transition = Some(end);
        }
        if out.events.len() > self.cfg.max_events_per_tick {
            log::warn!(
                "layer {:?}: dropping {} events over the per-tick limit",
                self.name,
                out.events.len() - self.cfg.max_events_per_tick
            );
            out.events.truncate(self.cfg.max_events_per_tick);
        }
        out.delta_position = self.ctx.slot(0).map(|s| s.delta_position).unwrap_or([0.0; 3]);
        out.diagnostics = self.ctx.take_diagnostics();
        out
    }

    /// Hand a finished one-shot root over to its scripted next state.
    fn auto_advance(&mut self, clips: &ClipLibrary) -> Result<Option<(NodeId, NodeId)>> {
        let Some(root) = self.root else {
            return Ok(None);
        };
        let target = match self.graph.get(root) {
            Some(BlendNode::Leaf(leaf)) => match leaf.next {
                NextState::Advance(target) => target,
                _ => return Ok(None),
            },
            _ => return Ok(None),
        };
        let holding = self.ctx.slot(0).map(|s| s.cursor.is_holding()).unwrap_or(false);
        if !holding {
            return Ok(None);
        }
        self.cross_fade(clips, target, self.cfg.auto_advance_blend)?;
        log::debug!("layer {:?}: auto-advance {root:?} -> {target:?}", self.name);
        Ok(Some((root, target)))
    }

    fn prune_transitions(&mut self) {
        let reachable = self.root.map(|r| self.graph.reachable(r)).unwrap_or_default();
        let graph = &mut self.graph;
        self.runtime_transitions.retain(|t| {
            if reachable.contains(t) {
                true
            } else {
                graph.remove(*t);
                false
            }
        });
    }

    /// Blended pose of the root node. Rotations may be unnormalized.
    pub fn pose(&self) -> &[BindSample] {
        self.ctx.slot(0).map(|s| s.samples.as_slice()).unwrap_or(&[])
    }

    /// Push the pose through `sink`, normalizing rotations on the way out.
    pub fn write_pose(&self, sink: &mut dyn PoseSink) {
        for sample in self.pose() {
            if let Some(slot) = self.binding.slot(sample.target_hash()) {
                let values = sample.output_values();
                sink.write(
                    slot,
                    sample.target_hash(),
                    sample.kind(),
                    &values[..sample.kind().required_count()],
                );
            }
        }
    }

    /// Normalized time of the main cursor, 0 when idle.
    pub fn normalized_time(&self) -> f32 {
        self.ctx.main_cursor().map(|c| c.normalized_time()).unwrap_or(0.0)
    }

    /// Context-wide speed multiplier.
    pub fn set_speed(&mut self, speed: f32) {
        self.ctx.set_speed(speed);
    }

    /// Speed of the most recently started motion only.
    pub fn set_main_speed(&mut self, speed: f32) {
        if let Some(cursor) = self.ctx.main_cursor_mut() {
            cursor.speed = speed;
        }
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    pub fn weights_mut(&mut self) -> &mut WeightTable {
        &mut self.weights
    }

    pub fn binding(&self) -> &LayerBinding {
        &self.binding
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }
}
