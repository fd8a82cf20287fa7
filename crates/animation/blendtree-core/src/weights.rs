//! Named, externally settable blend/speed knobs.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::error::BlendError;
use crate::ids::WeightId;
use crate::Result;

/// Weights are clamped into `[-WEIGHT_LIMIT, WEIGHT_LIMIT]`.
pub const WEIGHT_LIMIT: f32 = 16.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Weight {
    pub name: String,
    value: f32,
}

impl Weight {
    pub fn new(name: impl Into<String>, value: f32) -> Self {
        Self {
            name: name.into(),
            value: clamp_weight(value),
        }
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }
}

#[inline]
fn clamp_weight(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(-WEIGHT_LIMIT, WEIGHT_LIMIT)
    }
}

/// Per-layer weight arena with name lookup.
#[derive(Clone, Debug, Default)]
pub struct WeightTable {
    entries: Vec<Weight>,
    by_name: HashMap<String, WeightId>,
}

impl WeightTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a weight. Re-declaring an existing name returns its id untouched.
    pub fn declare(&mut self, name: &str, initial: f32) -> WeightId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        let id = WeightId(self.entries.len() as u32);
        self.entries.push(Weight::new(name, initial));
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn find(&self, name: &str) -> Option<WeightId> {
        self.by_name.get(name).copied()
    }

    /// Resolve a declared name or fail with [`BlendError::UnknownWeight`].
    pub fn require(&self, name: &str) -> Result<WeightId> {
        self.find(name)
            .ok_or_else(|| BlendError::UnknownWeight(name.to_string()))
    }

    /// Current value; unknown ids read as 0.
    #[inline]
    pub fn value(&self, id: WeightId) -> f32 {
        self.entries.get(id.index()).map(Weight::value).unwrap_or(0.0)
    }

    #[inline]
    pub fn set(&mut self, id: WeightId, value: f32) {
        if let Some(w) = self.entries.get_mut(id.index()) {
            w.value = clamp_weight(value);
        }
    }

    pub fn set_by_name(&mut self, name: &str, value: f32) -> Result<()> {
        let id = self.require(name)?;
        self.set(id, value);
        Ok(())
    }

    pub fn get(&self, id: WeightId) -> Option<&Weight> {
        self.entries.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
