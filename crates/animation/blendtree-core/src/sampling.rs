//! Bind samples: the per-node scratch buffers that hold the latest sampled or
//! blended values for one channel identity.
//!
//! Leaves fill theirs straight from clip channels; mixers fill theirs from the
//! matching samples of their children (see [`crate::accumulate`]).

use serde::{Deserialize, Serialize};

use crate::cursor::PlaybackCursor;
use crate::data::{ChannelIdentity, ChannelKind, Clip};
use crate::interp::functions::normalize_quat;

/// Where a [`BindSample`] gets its values from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleSource {
    /// Index into the leaf clip's channels.
    Channel(usize),
    /// Index into the owning mixer's sample groups.
    Group(usize),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BindSample {
    pub identity: ChannelIdentity,
    pub source: SampleSource,
    data: [f32; 4],
}

impl BindSample {
    pub fn new(identity: ChannelIdentity, source: SampleSource) -> Self {
        let data = match identity.kind {
            ChannelKind::Rotation => [0.0, 0.0, 0.0, 1.0],
            ChannelKind::Scale => [1.0, 1.0, 1.0, 0.0],
            _ => [0.0; 4],
        };
        Self {
            identity,
            source,
            data,
        }
    }

    #[inline]
    pub fn kind(&self) -> ChannelKind {
        self.identity.kind
    }

    #[inline]
    pub fn target_hash(&self) -> i32 {
        self.identity.target_hash
    }

    /// Raw values; blended rotations are not normalized.
    #[inline]
    pub fn values(&self) -> &[f32] {
        &self.data[..self.identity.kind.required_count()]
    }

    #[inline]
    pub fn values_mut(&mut self) -> &mut [f32] {
        let n = self.identity.kind.required_count();
        &mut self.data[..n]
    }

    /// Values ready for a consumer: rotations normalized, everything else as-is.
    pub fn output_values(&self) -> [f32; 4] {
        match self.identity.kind {
            ChannelKind::Rotation => normalize_quat(self.data),
            _ => self.data,
        }
    }
}

/// Resample every channel-backed sample of a leaf at the cursor position.
pub fn sample_clip_channels(clip: &Clip, cursor: &PlaybackCursor, samples: &mut [BindSample]) {
    let (a, b, r) = (cursor.frame_a(), cursor.frame_b(), cursor.ratio());
    for sample in samples.iter_mut() {
        if let SampleSource::Channel(idx) = sample.source {
            if let Some(channel) = clip.channels().get(idx) {
                channel.sample_into(a, b, r, sample.values_mut());
            }
        }
    }
}

/// Sample the clip's root-motion channel at the cursor, loop offsets applied.
pub fn sample_root_position(clip: &Clip, cursor: &PlaybackCursor) -> Option<[f32; 3]> {
    let rm = clip.root_motion()?;
    let channel = clip.channels().get(rm.channel)?;
    Some(rm.sample(
        channel,
        cursor.frame_a(),
        cursor.frame_b(),
        cursor.ratio(),
        cursor.loops_a(),
        cursor.loops_b(),
    ))
}
