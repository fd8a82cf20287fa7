//! Identifiers, the target-name hash, and simple allocators for core entities.

use serde::{Deserialize, Serialize};

/// Loaded clip in the engine's [`ClipLibrary`](crate::data::ClipLibrary).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ClipId(pub u32);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct LayerId(pub u32);

/// Dense index of a node inside one layer's [`NodeGraph`](crate::node::NodeGraph).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Dense index of a weight inside one layer's [`WeightTable`](crate::weights::WeightTable).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct WeightId(pub u32);

/// Opaque host output slot (bone, blend-shape index, ...).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct OutputSlot(pub u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl WeightId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a hash of a target name, reinterpreted as `i32`.
///
/// Used for channels whose importer did not supply a hash and for targets renamed
/// by mirroring, so both sides of a binding agree on the same value.
pub fn name_hash(name: &str) -> i32 {
    let mut h = FNV_OFFSET;
    for b in name.as_bytes() {
        h ^= u32::from(*b);
        h = h.wrapping_mul(FNV_PRIME);
    }
    h as i32
}

/// Monotonic allocator for ClipId and LayerId.
#[derive(Default, Debug)]
pub struct IdAllocator {
    next_clip: u32,
    next_layer: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_clip(&mut self) -> ClipId {
        let id = ClipId(self.next_clip);
        self.next_clip = self.next_clip.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_layer(&mut self) -> LayerId {
        let id = LayerId(self.next_layer);
        self.next_layer = self.next_layer.wrapping_add(1);
        id
    }

    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_monotonic() {
        let mut alloc = IdAllocator::new();
        assert_eq!(alloc.alloc_clip(), ClipId(0));
        assert_eq!(alloc.alloc_clip(), ClipId(1));
        assert_eq!(alloc.alloc_layer(), LayerId(0));
        assert_eq!(alloc.alloc_layer(), LayerId(1));
        alloc.reset();
        assert_eq!(alloc.alloc_clip(), ClipId(0));
    }

    #[test]
    fn name_hash_is_stable_and_distinguishes_sides() {
        // FNV-1a reference values.
        assert_eq!(name_hash(""), 0x811c_9dc5_u32 as i32);
        assert_eq!(name_hash("a"), 0xe40c_292c_u32 as i32);
        assert_ne!(name_hash("LeftArm"), name_hash("RightArm"));
        assert_eq!(name_hash("Hips"), name_hash("Hips"));
    }
}
