//! Input contracts for the core engine.
//!
//! Adapters build these and pass them into [`Engine::update`](crate::Engine::update)
//! once per fixed tick. Commands apply before any layer is sampled.

use serde::{Deserialize, Serialize};

use crate::ids::{LayerId, NodeId};

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Inputs {
    /// Layer-level commands applied before stepping.
    #[serde(default)]
    pub layer_cmds: Vec<LayerCommand>,
    /// Named weight writes applied before stepping.
    #[serde(default)]
    pub weight_updates: Vec<WeightUpdate>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum LayerCommand {
    Play {
        layer: LayerId,
        node: NodeId,
    },
    CrossFade {
        layer: LayerId,
        node: NodeId,
        duration: f32,
    },
    SetSpeed {
        layer: LayerId,
        speed: f32,
    },
    SetMainSpeed {
        layer: LayerId,
        speed: f32,
    },
    Rebuild {
        layer: LayerId,
    },
}

impl LayerCommand {
    pub fn layer(&self) -> LayerId {
        match self {
            LayerCommand::Play { layer, .. }
            | LayerCommand::CrossFade { layer, .. }
            | LayerCommand::SetSpeed { layer, .. }
            | LayerCommand::SetMainSpeed { layer, .. }
            | LayerCommand::Rebuild { layer } => *layer,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WeightUpdate {
    pub layer: LayerId,
    pub name: String,
    pub value: f32,
}
