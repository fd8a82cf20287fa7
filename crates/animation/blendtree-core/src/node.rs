//! Blend-tree node definitions and the per-layer node arena.
//!
//! Nodes are immutable once added (apart from a leaf's [`NextState`] link, which may
//! point at a node created later). All per-tick state lives in the
//! [`ExecutionContext`](crate::context::ExecutionContext).

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::data::ClipLibrary;
use crate::error::BlendError;
use crate::ids::{ClipId, NodeId, WeightId};
use crate::weights::WeightTable;
use crate::Result;

/// What a leaf does when its clip reaches the end.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextState {
    Loop,
    /// Hold the last pose.
    Hold,
    /// Hold, and let the layer driver move on to another node.
    Advance(NodeId),
}

impl NextState {
    #[inline]
    pub fn loops(self) -> bool {
        matches!(self, NextState::Loop)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LeafNode {
    pub name: String,
    pub clip: ClipId,
    pub next: NextState,
    pub default_speed: f32,
    pub speed_weight: Option<WeightId>,
    pub max_frames: usize,
    pub start_root: [f32; 3],
}

#[derive(Clone, Debug, PartialEq)]
pub struct MixerNode {
    pub name: String,
    pub children: Vec<NodeId>,
    pub weights: Vec<WeightId>,
    /// Rescale child speeds so clips of different length stay in phase.
    pub match_speeds: bool,
    pub max_frames: usize,
    pub start_root: [f32; 3],
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransitionNode {
    pub name: String,
    pub start: NodeId,
    pub end: NodeId,
    /// Cross-fade length in seconds.
    pub duration: f32,
    /// Nesting depth of simultaneous cross-fades, 1 for a plain one.
    pub depth: u32,
    pub max_frames: usize,
    pub start_root: [f32; 3],
}

#[derive(Clone, Debug, PartialEq)]
pub enum BlendNode {
    Leaf(LeafNode),
    Mixer(MixerNode),
    Transition(TransitionNode),
}

impl BlendNode {
    pub fn name(&self) -> &str {
        match self {
            BlendNode::Leaf(n) => &n.name,
            BlendNode::Mixer(n) => &n.name,
            BlendNode::Transition(n) => &n.name,
        }
    }

    /// Longest clip length in this subtree (the authoritative timeline).
    pub fn max_frames(&self) -> usize {
        match self {
            BlendNode::Leaf(n) => n.max_frames,
            BlendNode::Mixer(n) => n.max_frames,
            BlendNode::Transition(n) => n.max_frames,
        }
    }

    /// Root position at frame 0 of the longest clip in this subtree.
    pub fn start_root(&self) -> [f32; 3] {
        match self {
            BlendNode::Leaf(n) => n.start_root,
            BlendNode::Mixer(n) => n.start_root,
            BlendNode::Transition(n) => n.start_root,
        }
    }

    pub fn transition_depth(&self) -> u32 {
        match self {
            BlendNode::Transition(t) => t.depth,
            _ => 0,
        }
    }
}

/// A leaf that advances into itself loops.
fn resolve_next(leaf: NodeId, next: NextState) -> NextState {
    match next {
        NextState::Advance(target) if target == leaf => NextState::Loop,
        other => other,
    }
}

/// Leaf construction parameters.
#[derive(Clone, Debug)]
pub struct LeafCfg {
    pub name: String,
    pub clip: ClipId,
    pub next: NextState,
    pub default_speed: f32,
    /// Declared weight scaling this leaf's playback speed.
    pub speed_weight: Option<String>,
}

impl LeafCfg {
    pub fn looping(name: impl Into<String>, clip: ClipId) -> Self {
        Self {
            name: name.into(),
            clip,
            next: NextState::Loop,
            default_speed: 1.0,
            speed_weight: None,
        }
    }

    pub fn once(name: impl Into<String>, clip: ClipId) -> Self {
        Self {
            next: NextState::Hold,
            ..Self::looping(name, clip)
        }
    }
}

/// Mixer construction parameters. `weights[i]` names the weight of `children[i]`.
#[derive(Clone, Debug)]
pub struct MixerCfg {
    pub name: String,
    pub children: Vec<NodeId>,
    pub weights: Vec<String>,
    pub match_speeds: bool,
}

/// Arena of blend nodes for one layer.
#[derive(Clone, Debug, Default)]
pub struct NodeGraph {
    nodes: Vec<Option<BlendNode>>,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> Option<&BlendNode> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    pub fn require(&self, id: NodeId) -> Result<&BlendNode> {
        self.get(id).ok_or(BlendError::UnknownNode(id))
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().enumerate().find_map(|(i, n)| match n {
            Some(node) if node.name() == name => Some(NodeId(i as u32)),
            _ => None,
        })
    }

    fn push(&mut self, node: BlendNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(node));
        id
    }

    pub fn add_leaf(&mut self, clips: &ClipLibrary, weights: &WeightTable, cfg: LeafCfg) -> Result<NodeId> {
        let clip = clips.get(cfg.clip).ok_or(BlendError::UnknownClip(cfg.clip))?;
        let next = resolve_next(NodeId(self.nodes.len() as u32), cfg.next);
        if let NextState::Advance(target) = next {
            self.require(target)?;
        }
        let speed_weight = match &cfg.speed_weight {
            Some(name) => Some(weights.require(name)?),
            None => None,
        };
        Ok(self.push(BlendNode::Leaf(LeafNode {
            name: cfg.name,
            clip: cfg.clip,
            next,
            default_speed: cfg.default_speed,
            speed_weight,
            max_frames: clip.frame_count(),
            start_root: clip.root_start(),
        })))
    }

    pub fn add_mixer(&mut self, weights: &WeightTable, cfg: MixerCfg) -> Result<NodeId> {
        if cfg.children.len() < 2 {
            return Err(BlendError::TooFewChildren {
                node: cfg.name,
                children: cfg.children.len(),
            });
        }
        if cfg.children.len() != cfg.weights.len() {
            return Err(BlendError::WeightCountMismatch {
                node: cfg.name,
                children: cfg.children.len(),
                weights: cfg.weights.len(),
            });
        }
        let weight_ids = cfg
            .weights
            .iter()
            .map(|name| weights.require(name))
            .collect::<Result<Vec<_>>>()?;
        let (max_frames, start_root) = self.longest(&cfg.children)?;
        Ok(self.push(BlendNode::Mixer(MixerNode {
            name: cfg.name,
            children: cfg.children,
            weights: weight_ids,
            match_speeds: cfg.match_speeds,
            max_frames,
            start_root,
        })))
    }

    /// Add a cross-fade from `start` to `end`. Depth is fixed here.
    pub fn add_transition(&mut self, start: NodeId, end: NodeId, duration: f32) -> Result<NodeId> {
        let start_node = self.require(start)?;
        let end_node = self.require(end)?;
        let depth = 1 + start_node.transition_depth().max(end_node.transition_depth());
        let name = format!("{} -> {}", start_node.name(), end_node.name());
        let (max_frames, start_root) = self.longest(&[start, end])?;
        let duration = if duration.is_finite() {
            duration.max(0.0)
        } else {
            0.0
        };
        Ok(self.push(BlendNode::Transition(TransitionNode {
            name,
            start,
            end,
            duration,
            depth,
            max_frames,
            start_root,
        })))
    }

    fn longest(&self, children: &[NodeId]) -> Result<(usize, [f32; 3])> {
        let mut best = (0usize, [0.0f32; 3]);
        for id in children {
            let node = self.require(*id)?;
            if node.max_frames() > best.0 {
                best = (node.max_frames(), node.start_root());
            }
        }
        Ok(best)
    }

    pub fn set_next_state(&mut self, leaf: NodeId, next: NextState) -> Result<()> {
        let next = resolve_next(leaf, next);
        if let NextState::Advance(target) = next {
            self.require(target)?;
        }
        match self.nodes.get_mut(leaf.index()).and_then(Option::as_mut) {
            Some(BlendNode::Leaf(l)) => {
                l.next = next;
                Ok(())
            }
            Some(_) => Err(BlendError::NotALeaf(leaf)),
            None => Err(BlendError::UnknownNode(leaf)),
        }
    }

    /// Number of nodes visited by a pre-order walk of the subtree rooted at `id`.
    pub fn span(&self, id: NodeId) -> usize {
        match self.get(id) {
            Some(BlendNode::Leaf(_)) => 1,
            Some(BlendNode::Mixer(m)) => 1 + m.children.iter().map(|c| self.span(*c)).sum::<usize>(),
            Some(BlendNode::Transition(t)) => 1 + self.span(t.start) + self.span(t.end),
            None => 0,
        }
    }

    /// Pre-order node sequence of a subtree; the order both tree walks follow.
    pub fn pre_order(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.pre_order_into(id, &mut out);
        out
    }

    fn pre_order_into(&self, id: NodeId, out: &mut Vec<NodeId>) {
        match self.get(id) {
            None => {}
            Some(BlendNode::Leaf(_)) => out.push(id),
            Some(BlendNode::Mixer(m)) => {
                out.push(id);
                for c in &m.children {
                    self.pre_order_into(*c, out);
                }
            }
            Some(BlendNode::Transition(t)) => {
                out.push(id);
                self.pre_order_into(t.start, out);
                self.pre_order_into(t.end, out);
            }
        }
    }

    pub fn reachable(&self, root: NodeId) -> HashSet<NodeId> {
        self.pre_order(root).into_iter().collect()
    }

    /// Drop a node. Ids are never reused.
    pub fn remove(&mut self, id: NodeId) -> Option<BlendNode> {
        self.nodes.get_mut(id.index()).and_then(Option::take)
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
