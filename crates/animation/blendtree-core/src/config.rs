//! Core configuration for blendtree-core.

use serde::{Deserialize, Serialize};

/// Engine tuning knobs shared by every layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capacity hint for per-layer execution slots.
    pub scratch_samples: usize,

    /// Nested cross-fades deeper than this collapse on their next tick.
    pub max_transition_depth: u32,

    /// A mixer whose summed |weight| is at or below this skips its update.
    pub weight_epsilon: f32,

    /// Rotation contributors at or below this weight are left out of the average.
    pub rotation_epsilon: f32,

    /// Assert (debug builds) when the build and read walks fall out of step.
    /// Diagnostics are reported either way.
    pub strict_pairing: bool,

    /// Maximum events to retain per tick; the rest are dropped with a warning.
    pub max_events_per_tick: usize,

    /// Cross-fade duration in seconds used for scripted auto-advance. 0 cuts.
    pub auto_advance_blend: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scratch_samples: 64,
            max_transition_depth: 3,
            weight_epsilon: 1e-5,
            rotation_epsilon: 1e-5,
            strict_pairing: true,
            max_events_per_tick: 1024,
            auto_advance_blend: 0.2,
        }
    }
}
