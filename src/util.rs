use bevy::prelude::*;

use crate::math::{FastMath, MathBackend};

/// Vectors shorter than this normalize to [`Vec3::ZERO`].
pub const NORMALIZE_EPSILON: f32 = 1e-9;

const HINGE_PROJECTION_EPSILON: f32 = 1e-8;

pub trait Vec3Ext: Sized {
    fn length_with<M: MathBackend>(self) -> f32;
    fn normalize_with<M: MathBackend>(self) -> Vec3;

    fn fast_length(self) -> f32 {
        self.length_with::<FastMath>()
    }

    fn fast_normalize(self) -> Vec3 {
        self.normalize_with::<FastMath>()
    }
}

impl Vec3Ext for Vec3 {
    #[inline]
    fn length_with<M: MathBackend>(self) -> f32 {
        M::sqrt(self.length_squared())
    }

    /// Unit vector in the same direction, or zero when the length is at or
    /// below [`NORMALIZE_EPSILON`]. Never produces NaN for finite input.
    #[inline]
    fn normalize_with<M: MathBackend>(self) -> Vec3 {
        let length = self.length_with::<M>();
        if length > NORMALIZE_EPSILON {
            self * (1.0 / length)
        } else {
            Vec3::ZERO
        }
    }
}

/// An arbitrary unit direction perpendicular to `axis`, built against +Y or,
/// when `axis` is nearly parallel to +Y, against +X.
pub(crate) fn hinge_reference<M: MathBackend>(axis: Vec3) -> Vec3 {
    let up = if axis.dot(Vec3::Y).abs() > 0.99 {
        Vec3::X
    } else {
        Vec3::Y
    };
    axis.cross(up).normalize_with::<M>()
}

/// Unit projection of `rest_direction` onto the plane perpendicular to `axis`,
/// falling back to [`hinge_reference`] when the rest direction lies along the
/// axis.
pub(crate) fn project_rest_on_hinge<M: MathBackend>(rest_direction: Vec3, axis: Vec3) -> Vec3 {
    let projected = rest_direction.reject_from_normalized(axis);
    if projected.length_squared() < HINGE_PROJECTION_EPSILON {
        hinge_reference::<M>(axis)
    } else {
        projected.normalize_with::<M>()
    }
}

/// Unit projection of the bone direction `dir` onto the hinge plane. A bone
/// lying along the axis borrows the projected rest direction instead.
pub(crate) fn project_bone_on_hinge<M: MathBackend>(
    dir: Vec3,
    axis: Vec3,
    rest_direction: Vec3,
) -> Vec3 {
    let projected = dir.reject_from_normalized(axis);
    let length = projected.length_with::<M>();
    if length < HINGE_PROJECTION_EPSILON {
        project_rest_on_hinge::<M>(rest_direction, axis)
    } else {
        projected * (1.0 / length)
    }
}

/// Signed angle from `from` to `to` about `axis`; both lie in the plane
/// perpendicular to `axis`.
pub(crate) fn signed_plane_angle<M: MathBackend>(from: Vec3, to: Vec3, axis: Vec3) -> f32 {
    let cos_angle = from.dot(to);
    let sin_angle = from.cross(to).dot(axis);
    M::atan2(sin_angle, cos_angle)
}
