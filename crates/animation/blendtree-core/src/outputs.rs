//! Output contracts from the core engine.
//!
//! Outputs carry the bound pose values for this tick keyed by host output slot,
//! one root-motion delta per layer, and a separate list of semantic events.

use serde::{Deserialize, Serialize};

use crate::context::ContextDiagnostic;
use crate::data::ChannelKind;
use crate::ids::{ClipId, LayerId, NodeId, OutputSlot};

/// One bound target value for a given layer this tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub layer: LayerId,
    pub slot: OutputSlot,
    pub target_hash: i32,
    pub kind: ChannelKind,
    /// `kind.required_count()` values; rotations normalized.
    pub values: Vec<f32>,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RootMotionDelta {
    pub layer: LayerId,
    pub delta: [f32; 3],
}

/// Discrete semantic signals emitted during stepping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum CoreEvent {
    EventFired {
        layer: LayerId,
        node: NodeId,
        clip: ClipId,
        name: String,
        position: f32,
    },
    TransitionCompleted {
        layer: LayerId,
        node: NodeId,
    },
    AutoAdvanced {
        layer: LayerId,
        from: NodeId,
        to: NodeId,
    },
    Diagnostic {
        layer: LayerId,
        diagnostic: ContextDiagnostic,
    },
    Error {
        message: String,
    },
}

/// Outputs returned by `Engine::update()`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Outputs {
    #[serde(default)]
    pub changes: Vec<Change>,
    #[serde(default)]
    pub root_motion: Vec<RootMotionDelta>,
    #[serde(default)]
    pub events: Vec<CoreEvent>,
}

impl Outputs {
    #[inline]
    pub fn clear(&mut self) {
        self.changes.clear();
        self.root_motion.clear();
        self.events.clear();
    }

    #[inline]
    pub fn push_change(&mut self, change: Change) {
        self.changes.push(change);
    }

    #[inline]
    pub fn push_event(&mut self, event: CoreEvent) {
        self.events.push(event);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.root_motion.is_empty() && self.events.is_empty()
    }

    /// Root-motion delta reported for `layer`, if it ticked.
    pub fn root_motion_for(&self, layer: LayerId) -> Option<[f32; 3]> {
        self.root_motion.iter().find(|r| r.layer == layer).map(|r| r.delta)
    }
}
