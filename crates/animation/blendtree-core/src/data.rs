//! Clip data model: keyframe tracks, channels, clips and the clip library.
//!
//! `*Data` structs are the serde input shapes produced by an external importer;
//! [`Clip::from_data`] validates them into the immutable runtime form.

use serde::{Deserialize, Serialize};

use crate::error::BlendError;
use crate::ids::{name_hash, ClipId};
use crate::interp::functions::lerp_f32;
use crate::Result;

/// One animatable scalar track.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameSet {
    frames: Vec<f32>,
}

impl FrameSet {
    /// Returns `None` for an empty track.
    pub fn new(frames: Vec<f32>) -> Option<Self> {
        if frames.is_empty() {
            None
        } else {
            Some(Self { frames })
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    pub fn frames(&self) -> &[f32] {
        &self.frames
    }

    /// Interpolate between two frame indices. Indices past the end read the last frame.
    #[inline]
    pub fn sample(&self, frame_a: usize, frame_b: usize, ratio: f32) -> f32 {
        let last = self.frames.len() - 1;
        let a = self.frames[frame_a.min(last)];
        let b = self.frames[frame_b.min(last)];
        lerp_f32(a, b, ratio)
    }

    /// Read a single frame, clamped into `[0, len - 1]`.
    #[inline]
    pub fn sample_at(&self, frame: isize) -> f32 {
        let last = self.frames.len() as isize - 1;
        self.frames[frame.clamp(0, last) as usize]
    }

    pub fn negate(&mut self) {
        for v in &mut self.frames {
            *v = -*v;
        }
    }
}

/// What a channel animates. Decides how many frame sets it owns and how it blends.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Position,
    /// Quaternion `[x, y, z, w]`.
    Rotation,
    Scale,
    Blendshape,
}

impl ChannelKind {
    #[inline]
    pub fn required_count(self) -> usize {
        match self {
            ChannelKind::Position | ChannelKind::Scale => 3,
            ChannelKind::Rotation => 4,
            ChannelKind::Blendshape => 1,
        }
    }
}

/// Blend identity of a channel: two samples merge when target and kind match.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelIdentity {
    pub target_hash: i32,
    pub kind: ChannelKind,
}

/// Importer-facing channel description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelData {
    pub kind: ChannelKind,
    pub target_name: String,
    /// Precomputed hash; derived from `target_name` when absent.
    #[serde(default)]
    pub target_hash: Option<i32>,
    pub frames: Vec<Vec<f32>>,
}

/// One animated property bound to a named target.
#[derive(Clone, Debug, PartialEq)]
pub struct Channel {
    kind: ChannelKind,
    target_name: String,
    target_hash: i32,
    frame_sets: Vec<FrameSet>,
}

impl Channel {
    pub fn new(kind: ChannelKind, target_name: impl Into<String>, frames: Vec<Vec<f32>>) -> Result<Self> {
        let target_name = target_name.into();
        let hash = name_hash(&target_name);
        Self::with_hash(kind, target_name, hash, frames)
    }

    pub fn with_hash(
        kind: ChannelKind,
        target_name: String,
        target_hash: i32,
        frames: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if frames.len() != kind.required_count() {
            return Err(BlendError::FrameSetCount {
                target: target_name,
                kind,
                expected: kind.required_count(),
                found: frames.len(),
            });
        }
        let mut frame_sets = Vec::with_capacity(frames.len());
        for (index, track) in frames.into_iter().enumerate() {
            match FrameSet::new(track) {
                Some(fs) => frame_sets.push(fs),
                None => {
                    return Err(BlendError::EmptyFrameSet {
                        target: target_name,
                        index,
                    })
                }
            }
        }
        Ok(Self {
            kind,
            target_name,
            target_hash,
            frame_sets,
        })
    }

    pub fn from_data(data: ChannelData) -> Result<Self> {
        let hash = data
            .target_hash
            .unwrap_or_else(|| name_hash(&data.target_name));
        Self::with_hash(data.kind, data.target_name, hash, data.frames)
    }

    #[inline]
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    #[inline]
    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    #[inline]
    pub fn target_hash(&self) -> i32 {
        self.target_hash
    }

    #[inline]
    pub fn identity(&self) -> ChannelIdentity {
        ChannelIdentity {
            target_hash: self.target_hash,
            kind: self.kind,
        }
    }

    #[inline]
    pub fn frame_sets(&self) -> &[FrameSet] {
        &self.frame_sets
    }

    /// Longest frame set; the clip length contribution of this channel.
    pub fn frame_count(&self) -> usize {
        self.frame_sets.iter().map(FrameSet::len).max().unwrap_or(0)
    }

    /// Sample every frame set into `out` (length >= required count).
    #[inline]
    pub fn sample_into(&self, frame_a: usize, frame_b: usize, ratio: f32, out: &mut [f32]) {
        for (dst, fs) in out.iter_mut().zip(&self.frame_sets) {
            *dst = fs.sample(frame_a, frame_b, ratio);
        }
    }

    /// Mirror across the YZ plane and swap the target's Left/Right side.
    pub fn mirror(&mut self) {
        match self.kind {
            ChannelKind::Position => self.frame_sets[0].negate(),
            ChannelKind::Rotation => {
                self.frame_sets[1].negate();
                self.frame_sets[2].negate();
            }
            ChannelKind::Scale | ChannelKind::Blendshape => {}
        }
        let renamed = mirror_name(&self.target_name);
        if renamed != self.target_name {
            self.target_hash = name_hash(&renamed);
            self.target_name = renamed;
        }
    }
}

const SIDE_WORDS: [(&str, &str); 3] = [("Left", "Right"), ("left", "right"), ("LEFT", "RIGHT")];
const SIDE_SUFFIXES: [(&str, &str); 2] = [("_L", "_R"), (".L", ".R")];
const SIDE_PREFIXES: [(&str, &str); 1] = [("L_", "R_")];

/// Swap the side marker of a symmetric target name. Names without one are returned as-is.
pub fn mirror_name(name: &str) -> String {
    for (l, r) in SIDE_WORDS {
        if name.contains(l) {
            return name.replacen(l, r, 1);
        }
        if name.contains(r) {
            return name.replacen(r, l, 1);
        }
    }
    for (l, r) in SIDE_SUFFIXES {
        if let Some(stem) = name.strip_suffix(l) {
            return format!("{stem}{r}");
        }
        if let Some(stem) = name.strip_suffix(r) {
            return format!("{stem}{l}");
        }
    }
    for (l, r) in SIDE_PREFIXES {
        if let Some(rest) = name.strip_prefix(l) {
            return format!("{r}{rest}");
        }
        if let Some(rest) = name.strip_prefix(r) {
            return format!("{l}{rest}");
        }
    }
    name.to_string()
}

/// Importer-facing event descriptor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipEventData {
    pub name: String,
    /// Normalized trigger position in `[0, 1)`.
    ///
    /// Playback starts on position 0, so such an event fires on the first forward
    /// tick. Played backwards, an event fires once progress drops below it.
    pub position: f32,
}

/// Importer-facing clip description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipData {
    pub name: String,
    pub framerate: f32,
    pub channels: Vec<ChannelData>,
    /// Target name of the position channel that drives root motion.
    #[serde(default)]
    pub root_motion: Option<String>,
    #[serde(default)]
    pub events: Vec<ClipEventData>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClipEvent {
    pub name: String,
    pub position: f32,
}

/// Precomputed root-motion data for one clip.
#[derive(Clone, Debug, PartialEq)]
pub struct RootMotion {
    /// Index into [`Clip::channels`].
    pub channel: usize,
    /// Root position at frame 0.
    pub start: [f32; 3],
    /// Translation accumulated by one full loop, vertical axis zeroed.
    pub loop_offset: [f32; 3],
}

impl RootMotion {
    fn compute(channel_index: usize, channel: &Channel) -> Self {
        let mut start = [0.0; 3];
        let mut loop_offset = [0.0; 3];
        for (axis, fs) in channel.frame_sets().iter().enumerate() {
            let frames = fs.frames();
            let first = frames[0];
            let last = frames[frames.len() - 1];
            start[axis] = first;
            if frames.len() > 1 {
                // Continue the last frame's velocity one step past the seam.
                let velocity = last - frames[frames.len() - 2];
                loop_offset[axis] = last + velocity - first;
            }
        }
        loop_offset[1] = 0.0;
        Self {
            channel: channel_index,
            start,
            loop_offset,
        }
    }

    /// Root position at a cursor location, with each endpoint shifted by its loop count.
    pub fn sample(
        &self,
        channel: &Channel,
        frame_a: usize,
        frame_b: usize,
        ratio: f32,
        loops_a: i32,
        loops_b: i32,
    ) -> [f32; 3] {
        let mut out = [0.0; 3];
        for (axis, fs) in channel.frame_sets().iter().enumerate() {
            let a = fs.sample_at(frame_a as isize) + loops_a as f32 * self.loop_offset[axis];
            let b = fs.sample_at(frame_b as isize) + loops_b as f32 * self.loop_offset[axis];
            out[axis] = lerp_f32(a, b, ratio);
        }
        out
    }
}

/// Immutable animation clip.
#[derive(Clone, Debug, PartialEq)]
pub struct Clip {
    pub name: String,
    pub framerate: f32,
    frame_count: usize,
    channels: Vec<Channel>,
    root_motion: Option<RootMotion>,
    events: Vec<ClipEvent>,
}

impl Clip {
    pub fn new(
        name: impl Into<String>,
        framerate: f32,
        channels: Vec<Channel>,
        root_motion_target: Option<&str>,
        events: Vec<ClipEvent>,
    ) -> Result<Self> {
        let name = name.into();
        if !framerate.is_finite() || framerate <= 0.0 {
            return Err(BlendError::InvalidFramerate {
                clip: name,
                framerate,
            });
        }
        let frame_count = channels.iter().map(Channel::frame_count).max().unwrap_or(0);
        if frame_count == 0 {
            return Err(BlendError::EmptyClip { clip: name });
        }
        for ev in &events {
            if !(0.0..1.0).contains(&ev.position) {
                return Err(BlendError::InvalidEventPosition {
                    clip: name,
                    event: ev.name.clone(),
                    position: ev.position,
                });
            }
        }
        let root_motion = match root_motion_target {
            None => None,
            Some(target) => {
                let found = channels.iter().enumerate().find(|(_, c)| {
                    c.kind() == ChannelKind::Position && c.target_name() == target
                });
                match found {
                    Some((idx, ch)) => Some(RootMotion::compute(idx, ch)),
                    None => {
                        return Err(BlendError::RootMotionTarget {
                            clip: name,
                            target: target.to_string(),
                        })
                    }
                }
            }
        };
        Ok(Self {
            name,
            framerate,
            frame_count,
            channels,
            root_motion,
            events,
        })
    }

    pub fn from_data(data: ClipData) -> Result<Self> {
        let channels = data
            .channels
            .into_iter()
            .map(Channel::from_data)
            .collect::<Result<Vec<_>>>()?;
        let events = data
            .events
            .into_iter()
            .map(|e| ClipEvent {
                name: e.name,
                position: e.position,
            })
            .collect();
        Self::new(
            data.name,
            data.framerate,
            channels,
            data.root_motion.as_deref(),
            events,
        )
    }

    /// Deep copy with every channel mirrored and root motion recomputed.
    pub fn mirrored(&self, name: impl Into<String>) -> Self {
        let mut out = self.clone();
        out.name = name.into();
        for ch in &mut out.channels {
            ch.mirror();
        }
        if let Some(rm) = &self.root_motion {
            out.root_motion = Some(RootMotion::compute(rm.channel, &out.channels[rm.channel]));
        }
        out
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    #[inline]
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    #[inline]
    pub fn root_motion(&self) -> Option<&RootMotion> {
        self.root_motion.as_ref()
    }

    #[inline]
    pub fn events(&self) -> &[ClipEvent] {
        &self.events
    }

    /// Root position at frame 0, or the origin for clips without root motion.
    pub fn root_start(&self) -> [f32; 3] {
        self.root_motion.as_ref().map(|rm| rm.start).unwrap_or([0.0; 3])
    }
}

/// Minimal clip library storage.
#[derive(Default, Debug)]
pub struct ClipLibrary {
    items: Vec<(ClipId, Clip)>,
}

impl ClipLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ClipId, clip: Clip) {
        self.items.push((id, clip));
    }

    pub fn get(&self, id: ClipId) -> Option<&Clip> {
        self.items
            .iter()
            .find_map(|(c, clip)| if *c == id { Some(clip) } else { None })
    }

    pub fn find(&self, name: &str) -> Option<ClipId> {
        self.items
            .iter()
            .find_map(|(id, clip)| if clip.name == name { Some(*id) } else { None })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Vec<f32> {
        (0..n).map(|i| i as f32).collect()
    }

    #[test]
    fn sample_past_end_reads_last_frame() {
        let fs = FrameSet::new(vec![1.0, 2.0, 5.0]).unwrap();
        for r in [0.0, 0.3, 0.99] {
            assert_eq!(fs.sample(3, 7, r), 5.0);
        }
        assert_eq!(fs.sample_at(-4), 1.0);
        assert_eq!(fs.sample_at(99), 5.0);
    }

    #[test]
    fn same_index_ignores_ratio() {
        let fs = FrameSet::new(vec![0.5, -2.0]).unwrap();
        assert_eq!(fs.sample(1, 1, 0.75), -2.0);
    }

    #[test]
    fn wrong_frame_set_count_is_rejected() {
        let err = Channel::new(ChannelKind::Rotation, "Spine", vec![ramp(2); 3]).unwrap_err();
        assert!(matches!(
            err,
            BlendError::FrameSetCount {
                expected: 4,
                found: 3,
                ..
            }
        ));
        let err = Channel::new(ChannelKind::Blendshape, "Smile", vec![vec![]]).unwrap_err();
        assert!(matches!(err, BlendError::EmptyFrameSet { index: 0, .. }));
    }

    #[test]
    fn mirror_name_swaps_sides() {
        assert_eq!(mirror_name("LeftUpLeg"), "RightUpLeg");
        assert_eq!(mirror_name("hand_right"), "hand_left");
        assert_eq!(mirror_name("upperarm.L"), "upperarm.R");
        assert_eq!(mirror_name("foot_R"), "foot_L");
        assert_eq!(mirror_name("L_eye"), "R_eye");
        assert_eq!(mirror_name("Spine"), "Spine");
    }

    #[test]
    fn mirror_negates_position_x_and_rotation_yz() {
        let mut pos = Channel::new(
            ChannelKind::Position,
            "LeftHand",
            vec![vec![1.0], vec![2.0], vec![3.0]],
        )
        .unwrap();
        pos.mirror();
        assert_eq!(pos.target_name(), "RightHand");
        assert_eq!(pos.target_hash(), name_hash("RightHand"));
        let mut out = [0.0; 3];
        pos.sample_into(0, 0, 0.0, &mut out);
        assert_eq!(out, [-1.0, 2.0, 3.0]);

        let mut rot = Channel::new(
            ChannelKind::Rotation,
            "Spine",
            vec![vec![0.1], vec![0.2], vec![0.3], vec![0.9]],
        )
        .unwrap();
        let hash = rot.target_hash();
        rot.mirror();
        assert_eq!(rot.target_hash(), hash);
        let mut q = [0.0; 4];
        rot.sample_into(0, 0, 0.0, &mut q);
        assert_eq!(q, [0.1, -0.2, -0.3, 0.9]);
    }

    #[test]
    fn root_motion_offset_extrapolates_last_velocity() {
        let root = Channel::new(
            ChannelKind::Position,
            "Root",
            vec![vec![0.0, 0.5, 1.0], vec![0.0, 0.2, 0.1], vec![0.0, 0.0, 0.0]],
        )
        .unwrap();
        let clip = Clip::new("walk", 30.0, vec![root], Some("Root"), vec![]).unwrap();
        let rm = clip.root_motion().unwrap();
        assert_eq!(rm.loop_offset, [1.5, 0.0, 0.0]);
        assert_eq!(rm.start, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn root_motion_requires_position_channel() {
        let blend = Channel::new(ChannelKind::Blendshape, "Root", vec![vec![0.0]]).unwrap();
        let err = Clip::new("c", 30.0, vec![blend], Some("Root"), vec![]).unwrap_err();
        assert!(matches!(err, BlendError::RootMotionTarget { .. }));
    }

    #[test]
    fn channel_data_hash_defaults_to_name_hash() {
        let data: ChannelData = serde_json::from_str(
            r#"{ "kind": "blendshape", "targetName": "Blink", "frames": [[0, 1]] }"#,
        )
        .unwrap();
        let ch = Channel::from_data(data).unwrap();
        assert_eq!(ch.target_hash(), name_hash("Blink"));
    }
}
