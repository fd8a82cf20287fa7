//! Engine: clip ownership, layer management and the per-tick update.
//!
//! Methods:
//! - new, load_clip, load_clip_json, load_mirrored_clip, create_layer
//! - per-layer builders (add_leaf, add_mixer, declare_weight, set_next_state, ...)
//! - update (commands → tick every layer → changes/root motion/events)

use crate::binding::{LayerBinding, PoseSink};
use crate::config::Config;
use crate::data::{ChannelKind, Clip, ClipData, ClipLibrary};
use crate::error::BlendError;
use crate::ids::{ClipId, IdAllocator, LayerId, NodeId, OutputSlot, WeightId};
use crate::inputs::{Inputs, LayerCommand};
use crate::layer::Layer;
use crate::node::{LeafCfg, MixerCfg, NextState};
use crate::outputs::{Change, CoreEvent, Outputs, RootMotionDelta};
use crate::Result;

#[derive(Debug)]
pub struct Engine {
    cfg: Config,
    ids: IdAllocator,
    clips: ClipLibrary,
    layers: Vec<Layer>,

    // Per-tick outputs
    outputs: Outputs,
}

fn find_layer(layers: &mut [Layer], id: LayerId) -> Result<&mut Layer> {
    layers
        .iter_mut()
        .find(|l| l.id == id)
        .ok_or(BlendError::UnknownLayer(id))
}

/// Collects one layer's pose as [`Change`] rows.
struct ChangeSink<'o> {
    layer: LayerId,
    out: &'o mut Outputs,
}

impl PoseSink for ChangeSink<'_> {
    fn write(&mut self, slot: OutputSlot, target_hash: i32, kind: ChannelKind, values: &[f32]) {
        self.out.push_change(Change {
            layer: self.layer,
            slot,
            target_hash,
            kind,
            values: values.to_vec(),
        });
    }
}

impl Engine {
    /// Create a new engine with the given config.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            ids: IdAllocator::new(),
            clips: ClipLibrary::new(),
            layers: Vec::new(),
            outputs: Outputs::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Validate and load importer clip data.
    pub fn load_clip(&mut self, data: ClipData) -> Result<ClipId> {
        let clip = Clip::from_data(data)?;
        let id = self.ids.alloc_clip();
        log::debug!(
            "loaded clip {:?} ({} frames, {} channels)",
            clip.name,
            clip.frame_count(),
            clip.channels().len()
        );
        self.clips.insert(id, clip);
        Ok(id)
    }

    /// Parse clip JSON (the [`ClipData`] shape) and load it.
    pub fn load_clip_json(&mut self, json: &str) -> Result<ClipId> {
        let data: ClipData = serde_json::from_str(json).map_err(|e| BlendError::InvalidJson(e.to_string()))?;
        self.load_clip(data)
    }

    /// Load a left/right mirrored copy of an already loaded clip.
    pub fn load_mirrored_clip(&mut self, source: ClipId, name: &str) -> Result<ClipId> {
        let mirrored = self
            .clips
            .get(source)
            .ok_or(BlendError::UnknownClip(source))?
            .mirrored(name);
        let id = self.ids.alloc_clip();
        self.clips.insert(id, mirrored);
        Ok(id)
    }

    pub fn clip(&self, id: ClipId) -> Option<&Clip> {
        self.clips.get(id)
    }

    pub fn clips(&self) -> &ClipLibrary {
        &self.clips
    }

    /// Create an empty layer. Layers tick in creation order.
    pub fn create_layer(&mut self, name: &str, binding: LayerBinding) -> LayerId {
        let id = self.ids.alloc_layer();
        self.layers.push(Layer::new(id, name, binding, self.cfg.clone()));
        id
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    pub fn declare_weight(&mut self, layer: LayerId, name: &str, initial: f32) -> Result<WeightId> {
        Ok(find_layer(&mut self.layers, layer)?.declare_weight(name, initial))
    }

    pub fn add_leaf(&mut self, layer: LayerId, cfg: LeafCfg) -> Result<NodeId> {
        find_layer(&mut self.layers, layer)?.add_leaf(&self.clips, cfg)
    }

    pub fn add_mixer(&mut self, layer: LayerId, cfg: MixerCfg) -> Result<NodeId> {
        find_layer(&mut self.layers, layer)?.add_mixer(cfg)
    }

    pub fn add_transition(&mut self, layer: LayerId, start: NodeId, end: NodeId, duration: f32) -> Result<NodeId> {
        find_layer(&mut self.layers, layer)?.add_transition(start, end, duration)
    }

    pub fn set_next_state(&mut self, layer: LayerId, leaf: NodeId, next: NextState) -> Result<()> {
        find_layer(&mut self.layers, layer)?.set_next_state(leaf, next)
    }

    pub fn play(&mut self, layer: LayerId, node: NodeId) -> Result<()> {
        find_layer(&mut self.layers, layer)?.play(&self.clips, node)
    }

    pub fn cross_fade(&mut self, layer: LayerId, node: NodeId, duration: f32) -> Result<NodeId> {
        find_layer(&mut self.layers, layer)?.cross_fade(&self.clips, node, duration)
    }

    pub fn set_binding(&mut self, layer: LayerId, binding: LayerBinding) -> Result<()> {
        find_layer(&mut self.layers, layer)?.set_binding(&self.clips, binding)
    }

    fn apply_command(&mut self, cmd: LayerCommand) -> Result<()> {
        let clips = &self.clips;
        let layer = find_layer(&mut self.layers, cmd.layer())?;
        match cmd {
            LayerCommand::Play { node, .. } => layer.play(clips, node),
            LayerCommand::CrossFade { node, duration, .. } => layer.cross_fade(clips, node, duration).map(|_| ()),
            LayerCommand::SetSpeed { speed, .. } => {
                layer.set_speed(speed);
                Ok(())
            }
            LayerCommand::SetMainSpeed { speed, .. } => {
                layer.set_main_speed(speed);
                Ok(())
            }
            LayerCommand::Rebuild { .. } => layer.rebuild(clips),
        }
    }

    /// Apply commands and weight writes. Failures become `CoreEvent::Error`.
    fn apply_inputs(&mut self, inputs: Inputs) {
        for cmd in inputs.layer_cmds {
            if let Err(err) = self.apply_command(cmd) {
                log::warn!("layer command failed ({}): {err}", err.category());
                self.outputs.push_event(CoreEvent::Error {
                    message: err.to_string(),
                });
            }
        }
        for upd in inputs.weight_updates {
            let res = find_layer(&mut self.layers, upd.layer).and_then(|l| l.set_weight(&upd.name, upd.value));
            if let Err(err) = res {
                log::warn!("weight update failed ({}): {err}", err.category());
                self.outputs.push_event(CoreEvent::Error {
                    message: err.to_string(),
                });
            }
        }
    }

    /// Step every layer by `dt` seconds and collect their outputs.
    pub fn update(&mut self, dt: f32, inputs: Inputs) -> &Outputs {
        self.outputs.clear();

        // 1) Commands and weights
        self.apply_inputs(inputs);

        // 2) Tick layers in creation order
        for layer in &mut self.layers {
            if layer.root().is_none() {
                continue;
            }
            let id = layer.id;
            let tick = layer.tick(&self.clips, dt);

            for ev in tick.events {
                self.outputs.push_event(CoreEvent::EventFired {
                    layer: id,
                    node: ev.node,
                    clip: ev.clip,
                    name: ev.name,
                    position: ev.position,
                });
            }
            if let Some(node) = tick.completed_transition {
                self.outputs.push_event(CoreEvent::TransitionCompleted { layer: id, node });
            }
            if let Some((from, to)) = tick.auto_advanced {
                self.outputs.push_event(CoreEvent::AutoAdvanced { layer: id, from, to });
            }
            for diagnostic in tick.diagnostics {
                self.outputs.push_event(CoreEvent::Diagnostic { layer: id, diagnostic });
            }

            // 3) Pose and root motion
            self.outputs.root_motion.push(RootMotionDelta {
                layer: id,
                delta: tick.delta_position,
            });
            layer.write_pose(&mut ChangeSink {
                layer: id,
                out: &mut self.outputs,
            });
        }

        &self.outputs
    }
}
