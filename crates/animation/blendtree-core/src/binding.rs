//! Layer binding table and the pose output seam.
//!
//! A [`LayerBinding`] maps channel target hashes to opaque host output slots for one
//! animation layer. Channels whose hash is absent are not sampled at all, so a
//! partial rig simply animates fewer targets. Hosts receive the pose through a
//! [`PoseSink`] implementation.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::data::ChannelKind;
use crate::ids::{name_hash, OutputSlot};

/// Receives blended values for bound targets.
/// Adapters implement this and pass it into [`Layer::write_pose`](crate::layer::Layer::write_pose).
pub trait PoseSink {
    /// `values` holds `kind.required_count()` floats; rotations arrive normalized.
    fn write(&mut self, slot: OutputSlot, target_hash: i32, kind: ChannelKind, values: &[f32]);
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LayerBinding {
    slots: HashMap<i32, OutputSlot>,
}

impl LayerBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every name to consecutive slots starting at 0.
    pub fn from_targets<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut binding = Self::new();
        for (i, name) in targets.into_iter().enumerate() {
            binding.bind(name.as_ref(), OutputSlot(i as u32));
        }
        binding
    }

    /// Insert or update the slot for a target name.
    pub fn bind(&mut self, target_name: &str, slot: OutputSlot) {
        self.bind_hash(name_hash(target_name), slot);
    }

    pub fn bind_hash(&mut self, target_hash: i32, slot: OutputSlot) {
        self.slots.insert(target_hash, slot);
    }

    pub fn unbind(&mut self, target_name: &str) -> Option<OutputSlot> {
        self.slots.remove(&name_hash(target_name))
    }

    #[inline]
    pub fn slot(&self, target_hash: i32) -> Option<OutputSlot> {
        self.slots.get(&target_hash).copied()
    }

    #[inline]
    pub fn contains(&self, target_hash: i32) -> bool {
        self.slots.contains_key(&target_hash)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
