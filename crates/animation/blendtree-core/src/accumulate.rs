//! Accumulation of per-child contributions into a mixer's bind samples.
//!
//! Rotations use a weighted quaternion average: each contribution is flipped into
//! the hemisphere of a reference quaternion (the first significant contributor)
//! before being summed. The sum is left unnormalized so an upstream mixer can keep
//! averaging it; consumers normalize on use ([`BindSample::output_values`]).
//! Every other kind is a plain weighted sum.
//!
//! [`BindSample::output_values`]: crate::sampling::BindSample::output_values

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::data::{ChannelIdentity, ChannelKind};
use crate::interp::functions::dot4;
use crate::sampling::BindSample;

/// One child sample feeding a group.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    /// Child ordinal within the mixer.
    pub child: usize,
    /// Index into that child's bind samples.
    pub sample: usize,
}

/// All contributions sharing one channel identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleGroup {
    pub identity: ChannelIdentity,
    pub contributors: Vec<Contribution>,
}

/// Group the samples of a mixer's children by channel identity, in first-seen order.
pub fn build_groups<'a, I>(children: I) -> Vec<SampleGroup>
where
    I: IntoIterator<Item = &'a [BindSample]>,
{
    let mut groups: Vec<SampleGroup> = Vec::new();
    let mut index: HashMap<ChannelIdentity, usize> = HashMap::new();
    for (child, samples) in children.into_iter().enumerate() {
        for (sample, s) in samples.iter().enumerate() {
            let slot = *index.entry(s.identity).or_insert_with(|| {
                groups.push(SampleGroup {
                    identity: s.identity,
                    contributors: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].contributors.push(Contribution { child, sample });
        }
    }
    groups
}

/// Running sum for one group.
#[derive(Clone, Debug)]
enum GroupAccumulator {
    Linear {
        sum: [f32; 4],
        seeded: bool,
    },
    Rotation {
        sum: [f32; 4],
        reference: Option<[f32; 4]>,
        epsilon: f32,
    },
}

impl GroupAccumulator {
    fn new(kind: ChannelKind, rotation_epsilon: f32) -> Self {
        match kind {
            ChannelKind::Rotation => GroupAccumulator::Rotation {
                sum: [0.0; 4],
                reference: None,
                epsilon: rotation_epsilon,
            },
            _ => GroupAccumulator::Linear {
                sum: [0.0; 4],
                seeded: false,
            },
        }
    }

    fn add(&mut self, values: &[f32], w: f32) {
        match self {
            GroupAccumulator::Linear { sum, seeded } => {
                if !*seeded {
                    // First contributor seeds the buffer.
                    for (dst, v) in sum.iter_mut().zip(values) {
                        *dst = v * w;
                    }
                    *seeded = true;
                } else {
                    for (dst, v) in sum.iter_mut().zip(values) {
                        *dst += v * w;
                    }
                }
            }
            GroupAccumulator::Rotation {
                sum,
                reference,
                epsilon,
            } => {
                if w <= *epsilon || values.len() < 4 {
                    return;
                }
                let q = [values[0], values[1], values[2], values[3]];
                let r = *reference.get_or_insert(q);
                let sign = if dot4(q, r) < 0.0 { -w } else { w };
                for (dst, v) in sum.iter_mut().zip(q) {
                    *dst += v * sign;
                }
            }
        }
    }

    /// Write the result; returns false when nothing contributed.
    fn finish(self, out: &mut [f32]) -> bool {
        let (sum, any) = match self {
            GroupAccumulator::Linear { sum, seeded } => (sum, seeded),
            GroupAccumulator::Rotation { sum, reference, .. } => (sum, reference.is_some()),
        };
        if any {
            for (dst, v) in out.iter_mut().zip(sum) {
                *dst = v;
            }
        }
        any
    }
}

/// Blend `(values, weight)` contributions of one group into `out`.
///
/// Leaves `out` untouched when no contribution qualifies.
pub fn blend_group<'a, I>(kind: ChannelKind, contributions: I, rotation_epsilon: f32, out: &mut [f32]) -> bool
where
    I: IntoIterator<Item = (&'a [f32], f32)>,
{
    let mut acc = GroupAccumulator::new(kind, rotation_epsilon);
    for (values, w) in contributions {
        acc.add(values, w);
    }
    acc.finish(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::SampleSource;
    use approx::assert_abs_diff_eq;

    fn sample(hash: i32, kind: ChannelKind) -> BindSample {
        BindSample::new(
            ChannelIdentity {
                target_hash: hash,
                kind,
            },
            SampleSource::Channel(0),
        )
    }

    #[test]
    fn groups_merge_by_identity() {
        let a = vec![sample(1, ChannelKind::Position), sample(2, ChannelKind::Rotation)];
        let b = vec![sample(2, ChannelKind::Rotation), sample(1, ChannelKind::Scale)];
        let groups = build_groups([a.as_slice(), b.as_slice()]);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[1].identity.target_hash, 2);
        assert_eq!(
            groups[1].contributors,
            vec![
                Contribution { child: 0, sample: 1 },
                Contribution { child: 1, sample: 0 }
            ]
        );
    }

    #[test]
    fn linear_is_weighted_sum() {
        let a = [1.0, 2.0, 3.0];
        let b = [3.0, 2.0, 1.0];
        let mut out = [9.0; 3];
        assert!(blend_group(
            ChannelKind::Position,
            [(&a[..], 0.25), (&b[..], 0.75)],
            1e-5,
            &mut out
        ));
        assert_eq!(out, [2.5, 2.0, 1.5]);
    }

    #[test]
    fn rotation_flips_into_reference_hemisphere() {
        let a = [0.0, 0.0, 0.0, 1.0];
        let b = [0.0, 0.0, 0.0, -1.0];
        let mut out = [0.0; 4];
        blend_group(ChannelKind::Rotation, [(&a[..], 0.5), (&b[..], 0.5)], 1e-5, &mut out);
        assert_abs_diff_eq!(out[3], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn rotation_skips_negligible_weights() {
        let a = [0.0, 0.0, 0.0, 1.0];
        let mut out = [7.0; 4];
        assert!(!blend_group(ChannelKind::Rotation, [(&a[..], 0.0)], 1e-5, &mut out));
        assert_eq!(out, [7.0; 4]);
    }
}
