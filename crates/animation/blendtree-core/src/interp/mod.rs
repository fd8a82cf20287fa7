//! Interpolation helpers shared by channel sampling, blending and cross-fades.
//!
//! Quaternions are stored as `[x, y, z, w]` throughout the crate.

pub mod functions;

pub use functions::{ease_in_out_quad, lerp_f32, normalize_quat, slerp_quat};
