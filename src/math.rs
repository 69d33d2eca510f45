//! Scalar math used by the solver.
//!
//! The default backend, [`FastMath`], trades accuracy (a few parts per
//! thousand) for determinism and independence from libm: a bit-trick inverse
//! square root, a table-driven sine and a rational `atan2`. [`StdMath`] routes
//! the same signatures to the exact `f32` methods.

use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, TAU};

use bevy::prelude::*;

/// Set of scalar functions the constraint enforcers and the solver are
/// generic over.
pub trait MathBackend {
    fn sqrt(x: f32) -> f32;
    fn sin(x: f32) -> f32;
    fn cos(x: f32) -> f32;
    fn atan2(y: f32, x: f32) -> f32;
}

/// Table and bit-trick approximations. This is the default backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Reflect)]
pub struct FastMath;

impl MathBackend for FastMath {
    #[inline]
    fn sqrt(x: f32) -> f32 {
        fast_sqrt(x)
    }

    #[inline]
    fn sin(x: f32) -> f32 {
        fast_sin(x)
    }

    #[inline]
    fn cos(x: f32) -> f32 {
        fast_cos(x)
    }

    #[inline]
    fn atan2(y: f32, x: f32) -> f32 {
        fast_atan2(y, x)
    }
}

/// Exact `f32` functions, for callers that need tighter accuracy than
/// [`FastMath`] gives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Reflect)]
pub struct StdMath;

impl MathBackend for StdMath {
    #[inline]
    fn sqrt(x: f32) -> f32 {
        x.sqrt()
    }

    #[inline]
    fn sin(x: f32) -> f32 {
        x.sin()
    }

    #[inline]
    fn cos(x: f32) -> f32 {
        x.cos()
    }

    #[inline]
    fn atan2(y: f32, x: f32) -> f32 {
        y.atan2(x)
    }
}

const SINE_TABLE_SIZE: usize = 256;
const SINE_TABLE_MASK: usize = SINE_TABLE_SIZE - 1;

// One full period, sampled at `i * TAU / 256`.
#[rustfmt::skip]
static SINE_TABLE: [f32; SINE_TABLE_SIZE] = [
    0.0000, 0.0245, 0.0491, 0.0736, 0.0980, 0.1224, 0.1467, 0.1710,
    0.1951, 0.2191, 0.2430, 0.2667, 0.2903, 0.3137, 0.3369, 0.3599,
    0.3827, 0.4052, 0.4276, 0.4496, 0.4714, 0.4929, 0.5141, 0.5350,
    0.5556, 0.5758, 0.5957, 0.6152, 0.6344, 0.6532, 0.6716, 0.6895,
    0.7071, 0.7242, 0.7409, 0.7572, 0.7730, 0.7883, 0.8032, 0.8176,
    0.8315, 0.8449, 0.8577, 0.8701, 0.8819, 0.8932, 0.9040, 0.9142,
    0.9239, 0.9330, 0.9415, 0.9495, 0.9569, 0.9638, 0.9700, 0.9757,
    0.9808, 0.9853, 0.9892, 0.9925, 0.9952, 0.9973, 0.9988, 0.9997,
    1.0000, 0.9997, 0.9988, 0.9973, 0.9952, 0.9925, 0.9892, 0.9853,
    0.9808, 0.9757, 0.9700, 0.9638, 0.9569, 0.9495, 0.9415, 0.9330,
    0.9239, 0.9142, 0.9040, 0.8932, 0.8819, 0.8701, 0.8577, 0.8449,
    0.8315, 0.8176, 0.8032, 0.7883, 0.7730, 0.7572, 0.7409, 0.7242,
    0.7071, 0.6895, 0.6716, 0.6532, 0.6344, 0.6152, 0.5957, 0.5758,
    0.5556, 0.5350, 0.5141, 0.4929, 0.4714, 0.4496, 0.4276, 0.4052,
    0.3827, 0.3599, 0.3369, 0.3137, 0.2903, 0.2667, 0.2430, 0.2191,
    0.1951, 0.1710, 0.1467, 0.1224, 0.0980, 0.0736, 0.0491, 0.0245,
    0.0000, -0.0245, -0.0491, -0.0736, -0.0980, -0.1224, -0.1467, -0.1710,
    -0.1951, -0.2191, -0.2430, -0.2667, -0.2903, -0.3137, -0.3369, -0.3599,
    -0.3827, -0.4052, -0.4276, -0.4496, -0.4714, -0.4929, -0.5141, -0.5350,
    -0.5556, -0.5758, -0.5957, -0.6152, -0.6344, -0.6532, -0.6716, -0.6895,
    -0.7071, -0.7242, -0.7409, -0.7572, -0.7730, -0.7883, -0.8032, -0.8176,
    -0.8315, -0.8449, -0.8577, -0.8701, -0.8819, -0.8932, -0.9040, -0.9142,
    -0.9239, -0.9330, -0.9415, -0.9495, -0.9569, -0.9638, -0.9700, -0.9757,
    -0.9808, -0.9853, -0.9892, -0.9925, -0.9952, -0.9973, -0.9988, -0.9997,
    -1.0000, -0.9997, -0.9988, -0.9973, -0.9952, -0.9925, -0.9892, -0.9853,
    -0.9808, -0.9757, -0.9700, -0.9638, -0.9569, -0.9495, -0.9415, -0.9330,
    -0.9239, -0.9142, -0.9040, -0.8932, -0.8819, -0.8701, -0.8577, -0.8449,
    -0.8315, -0.8176, -0.8032, -0.7883, -0.7730, -0.7572, -0.7409, -0.7242,
    -0.7071, -0.6895, -0.6716, -0.6532, -0.6344, -0.6152, -0.5957, -0.5758,
    -0.5556, -0.5350, -0.5141, -0.4929, -0.4714, -0.4496, -0.4276, -0.4052,
    -0.3827, -0.3599, -0.3369, -0.3137, -0.2903, -0.2667, -0.2430, -0.2191,
    -0.1951, -0.1710, -0.1467, -0.1224, -0.0980, -0.0736, -0.0491, -0.0245,
];

/// Approximate `1 / sqrt(x)`: bit-pattern initial guess refined by one
/// Newton-Raphson step. The result never overshoots the exact value for
/// positive input, and the relative error stays below 0.2%.
#[inline]
pub fn fast_inv_sqrt(x: f32) -> f32 {
    let half = x * 0.5;
    let y = f32::from_bits(0x5f37_59df_u32.wrapping_sub(x.to_bits() >> 1));

    y * (1.5 - half * y * y)
}

/// Approximate square root, `x * fast_inv_sqrt(x)`. Returns 0 for 0.
#[inline]
pub fn fast_sqrt(x: f32) -> f32 {
    x * fast_inv_sqrt(x)
}

/// Table sine with linear interpolation between adjacent samples.
#[inline]
pub fn fast_sin(x: f32) -> f32 {
    // Truncating reduction leaves negative input in (-TAU, 0].
    let mut x = x - TAU * ((x * (1.0 / TAU)) as i32) as f32;
    if x < 0.0 {
        x += TAU;
    }

    let index = x * (SINE_TABLE_SIZE as f32 / TAU);
    let whole = index as i32;
    let frac = index - whole as f32;

    let i0 = whole as usize & SINE_TABLE_MASK;
    let i1 = (i0 + 1) & SINE_TABLE_MASK;

    SINE_TABLE[i0] + frac * (SINE_TABLE[i1] - SINE_TABLE[i0])
}

/// Table cosine, the sine shifted by a quarter period.
#[inline]
pub fn fast_cos(x: f32) -> f32 {
    fast_sin(x + FRAC_PI_2)
}

/// Quadrant-aware rational approximation of `atan2`. Odd in `y`; exact at
/// multiples of π/4, worst case around 0.07 rad in between.
///
/// `x == 0` yields `±π/2` (and `π/2` for the undefined `(0, 0)`).
#[inline]
pub fn fast_atan2(y: f32, x: f32) -> f32 {
    let abs_y = y.abs();

    let angle = if x > 0.0 {
        let r = (x - abs_y) / (x + abs_y);
        FRAC_PI_4 - FRAC_PI_4 * r
    } else if x < 0.0 {
        let r = (x + abs_y) / (abs_y - x);
        3.0 * FRAC_PI_4 - FRAC_PI_4 * r
    } else {
        FRAC_PI_2
    };

    if y < 0.0 {
        -angle
    } else {
        angle
    }
}
