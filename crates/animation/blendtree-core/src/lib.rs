//! Blendtree Core (engine-agnostic)
//!
//! Skeletal animation blend-tree engine: keyframe channel sampling, weighted
//! blending of arbitrary node trees, depth-bounded cross-fades, root-motion
//! extraction across loop seams, and once-per-crossing clip events.
//!
//! Hosts load clips into an [`Engine`], assemble per-layer trees of
//! [`BlendNode`]s, and call [`Engine::update`] once per fixed tick. Lower-level
//! users can drive a [`Layer`] directly.

pub mod accumulate;
pub mod binding;
pub mod config;
pub mod context;
pub mod cursor;
pub mod data;
pub mod engine;
pub mod error;
pub mod eval;
pub mod ids;
pub mod inputs;
pub mod interp;
pub mod layer;
pub mod node;
pub mod outputs;
pub mod sampling;
pub mod weights;

// Re-exports for consumers (adapters)
pub use binding::{LayerBinding, PoseSink};
pub use config::Config;
pub use context::{ContextDiagnostic, ExecutionContext, NodeSlot};
pub use cursor::PlaybackCursor;
pub use data::{
    mirror_name, Channel, ChannelData, ChannelIdentity, ChannelKind, Clip, ClipData, ClipEvent, ClipEventData,
    ClipLibrary, FrameSet, RootMotion,
};
pub use engine::Engine;
pub use error::BlendError;
pub use eval::{Evaluator, FiredEvent};
pub use ids::{name_hash, ClipId, IdAllocator, LayerId, NodeId, OutputSlot, WeightId};
pub use inputs::{Inputs, LayerCommand, WeightUpdate};
pub use layer::{Layer, LayerTick};
pub use node::{BlendNode, LeafCfg, LeafNode, MixerCfg, MixerNode, NextState, NodeGraph, TransitionNode};
pub use outputs::{Change, CoreEvent, Outputs, RootMotionDelta};
pub use sampling::{BindSample, SampleSource};
pub use weights::{Weight, WeightTable, WEIGHT_LIMIT};

pub type Result<T> = core::result::Result<T, BlendError>;
