//! Error types for blend-tree construction.
//!
//! Every variant describes an authoring/build-time fault. The per-tick read path
//! never produces these; pairing faults found while sampling are reported as
//! [`ContextDiagnostic`](crate::context::ContextDiagnostic) instead.

use crate::data::ChannelKind;
use crate::ids::{ClipId, LayerId, NodeId};

/// Configuration error raised while loading clips or assembling a tree.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum BlendError {
    /// A keyframe track with no frames.
    #[error("frame set {index} of channel '{target}' has no frames")]
    EmptyFrameSet { target: String, index: usize },

    /// Wrong number of frame sets for the channel kind.
    #[error("channel '{target}' ({kind:?}) needs {expected} frame sets, got {found}")]
    FrameSetCount {
        target: String,
        kind: ChannelKind,
        expected: usize,
        found: usize,
    },

    /// A clip with a non-positive or non-finite framerate.
    #[error("clip '{clip}' has invalid framerate {framerate}")]
    InvalidFramerate { clip: String, framerate: f32 },

    /// A clip without any channel data to derive its length from.
    #[error("clip '{clip}' has no channels")]
    EmptyClip { clip: String },

    /// Root-motion target missing from the clip or not a position channel.
    #[error("clip '{clip}' root motion target '{target}' is not a position channel")]
    RootMotionTarget { clip: String, target: String },

    /// Event trigger outside `[0, 1)`.
    #[error("event '{event}' in clip '{clip}' has position {position} outside [0, 1)")]
    InvalidEventPosition {
        clip: String,
        event: String,
        position: f32,
    },

    /// Mixer with fewer than two children.
    #[error("mixer '{node}' needs at least 2 children, got {children}")]
    TooFewChildren { node: String, children: usize },

    /// Mixer whose weight list does not line up with its children.
    #[error("mixer '{node}' has {children} children but {weights} weights")]
    WeightCountMismatch {
        node: String,
        children: usize,
        weights: usize,
    },

    #[error("clip {0:?} is not loaded")]
    UnknownClip(ClipId),

    #[error("node {0:?} does not exist in this layer")]
    UnknownNode(NodeId),

    #[error("weight '{0}' has not been declared")]
    UnknownWeight(String),

    #[error("layer {0:?} does not exist")]
    UnknownLayer(LayerId),

    /// Operation only valid on leaf nodes.
    #[error("node {0:?} is not a leaf")]
    NotALeaf(NodeId),

    #[error("node {0:?} is not a transition")]
    NotATransition(NodeId),

    /// Clip JSON that does not match the importer shape.
    #[error("invalid clip json: {0}")]
    InvalidJson(String),
}

impl BlendError {
    /// Get error category for logging
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnknownClip(_)
            | Self::UnknownNode(_)
            | Self::UnknownWeight(_)
            | Self::UnknownLayer(_) => "lookup",
            _ => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_split_lookup_from_config() {
        assert_eq!(BlendError::UnknownNode(NodeId(3)).category(), "lookup");
        assert_eq!(
            BlendError::TooFewChildren {
                node: "m".into(),
                children: 1
            }
            .category(),
            "config"
        );
    }

    #[test]
    fn messages_name_the_offender() {
        let err = BlendError::FrameSetCount {
            target: "Hips".into(),
            kind: ChannelKind::Rotation,
            expected: 4,
            found: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("Hips"));
        assert!(msg.contains("needs 4"));
    }
}
