//! Per-instance playback position over a clip timeline.
//!
//! A [`PlaybackCursor`] decouples one shared clip definition from the many places it
//! can be playing at once. `frame` is continuous and unbounded; [`PlaybackCursor::constrain`]
//! derives the two sample indices, the blend ratio between them, and the loop
//! counters of each endpoint.

use serde::{Deserialize, Serialize};

use crate::ids::WeightId;
use crate::weights::WeightTable;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaybackCursor {
    max_frames: usize,
    frame: f32,
    frame_a: usize,
    frame_b: usize,
    ratio: f32,
    loops_a: i32,
    loops_b: i32,
    holding: bool,
    /// Root position sampled on the previous tick.
    pub last_root_pos: [f32; 3],
    /// Own speed multiplier, seeded from the node's default speed.
    pub speed: f32,
    /// Optional external speed knob multiplied in on every advance.
    pub speed_weight: Option<WeightId>,
    /// Phase-matching scale written by a parent mixer before each read.
    pub match_scale: f32,
}

impl PlaybackCursor {
    pub fn new(max_frames: usize, speed: f32, speed_weight: Option<WeightId>) -> Self {
        let mut cursor = Self {
            max_frames: max_frames.max(1),
            frame: 0.0,
            frame_a: 0,
            frame_b: 0,
            ratio: 0.0,
            loops_a: 0,
            loops_b: 0,
            holding: false,
            last_root_pos: [0.0; 3],
            speed,
            speed_weight,
            match_scale: 1.0,
        };
        cursor.constrain();
        cursor
    }

    /// Recompute indices, ratio and loop counters from the continuous frame.
    pub fn constrain(&mut self) {
        if !self.frame.is_finite() {
            self.frame = 0.0;
        }
        let max = self.max_frames as f32;
        let mut read = self.frame;
        if read < 0.0 {
            read += (-read / max).ceil() * max;
        }
        let whole = read.floor();
        self.ratio = read - whole;
        self.frame_a = (whole as usize) % self.max_frames;
        self.frame_b = (self.frame_a + 1) % self.max_frames;
        self.loops_a = (self.frame / max).floor() as i32;
        self.loops_b = ((self.frame + 1.0) / max).floor() as i32;
    }

    /// Step the cursor by `frame_step` frames.
    ///
    /// Looping cursors wrap freely. Clamped cursors stop on the last frame and hold
    /// it; a negative step rewinds them to frame 0.
    pub fn advance(&mut self, frame_step: f32, allow_looping: bool) {
        if !frame_step.is_finite() {
            return;
        }
        if allow_looping {
            self.frame += frame_step;
            self.holding = false;
        } else if frame_step < 0.0 {
            self.frame = 0.0;
            self.holding = false;
        } else {
            let end = (self.max_frames - 1) as f32;
            self.frame += frame_step;
            if self.frame >= end {
                self.frame = end;
                self.holding = true;
            }
        }
        self.constrain();
    }

    /// Effective speed: own speed × external weight × mixer phase scale.
    pub fn effective_speed(&self, weights: &WeightTable) -> f32 {
        let external = self.speed_weight.map(|w| weights.value(w)).unwrap_or(1.0);
        self.speed * external * self.match_scale
    }

    /// Place the cursor at a normalized position of its current lap.
    pub fn sync_normalized(&mut self, normalized: f32) {
        let lap = (self.frame / self.max_frames as f32).floor();
        self.frame = (lap + normalized.clamp(0.0, 1.0)) * self.max_frames as f32;
        self.constrain();
    }

    #[inline]
    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    #[inline]
    pub fn frame(&self) -> f32 {
        self.frame
    }

    #[inline]
    pub fn frame_a(&self) -> usize {
        self.frame_a
    }

    #[inline]
    pub fn frame_b(&self) -> usize {
        self.frame_b
    }

    #[inline]
    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    #[inline]
    pub fn loops_a(&self) -> i32 {
        self.loops_a
    }

    #[inline]
    pub fn loops_b(&self) -> i32 {
        self.loops_b
    }

    /// True once a clamped cursor has reached its last frame.
    #[inline]
    pub fn is_holding(&self) -> bool {
        self.holding
    }

    /// Position within the current lap, in `[0, 1)`.
    #[inline]
    pub fn normalized_time(&self) -> f32 {
        (self.frame_a as f32 + self.ratio) / self.max_frames as f32
    }

    /// Continuous progress in laps. A held cursor counts its lap as finished.
    #[inline]
    pub fn progress(&self) -> f32 {
        if self.holding {
            self.loops_a as f32 + 1.0
        } else {
            self.frame / self.max_frames as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn looping_wraps_and_counts_laps() {
        let mut c = PlaybackCursor::new(10, 1.0, None);
        c.advance(12.5, true);
        assert_eq!(c.frame_a(), 2);
        assert_eq!(c.frame_b(), 3);
        assert_abs_diff_eq!(c.ratio(), 0.5, epsilon = 1e-6);
        assert_eq!(c.loops_a(), 1);
        assert_eq!(c.loops_b(), 1);
    }

    #[test]
    fn loop_counters_split_at_the_seam() {
        let mut c = PlaybackCursor::new(10, 1.0, None);
        c.advance(9.25, true);
        assert_eq!(c.frame_a(), 9);
        assert_eq!(c.frame_b(), 0);
        assert_eq!(c.loops_a(), 0);
        assert_eq!(c.loops_b(), 1);
    }

    #[test]
    fn negative_frames_wrap_forward() {
        let mut c = PlaybackCursor::new(10, 1.0, None);
        c.advance(-2.5, true);
        assert_eq!(c.frame_a(), 7);
        assert_eq!(c.frame_b(), 8);
        assert_abs_diff_eq!(c.ratio(), 0.5, epsilon = 1e-6);
        assert_eq!(c.loops_a(), -1);
    }

    #[test]
    fn clamped_rewinds_on_negative_step() {
        let mut c = PlaybackCursor::new(10, 1.0, None);
        c.advance(4.0, false);
        c.advance(-1.0, false);
        assert_eq!(c.frame(), 0.0);
        assert!(!c.is_holding());
    }

    #[test]
    fn single_frame_clip_stays_put() {
        let mut c = PlaybackCursor::new(1, 1.0, None);
        c.advance(3.7, true);
        assert_eq!(c.frame_a(), 0);
        assert_eq!(c.frame_b(), 0);
    }
}
