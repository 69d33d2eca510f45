use std::f32::consts::PI;

use bevy::prelude::*;

use crate::math::{FastMath, MathBackend};
use crate::util::*;

const MIN_HINGE_BONE_LENGTH: f32 = 1e-8;

/// Rotational limit of a single bone, measured against the bone's rest
/// direction.
///
/// As a component it belongs on the joint entity the bone starts from. Joints
/// without one are treated as [`BoneConstraint::UNCONSTRAINED`].
#[derive(Component, Clone, Copy, Debug, PartialEq, Reflect)]
pub enum BoneConstraint {
    /// Keeps the bone inside a cone of `max_half_angle` radians around the
    /// rest direction.
    Spherical { max_half_angle: f32 },
    /// Keeps the bone in the plane perpendicular to `axis` (a unit vector),
    /// between `min_angle` and `max_angle` radians of the rest direction's
    /// projection onto that plane.
    Hinge {
        axis: Vec3,
        min_angle: f32,
        max_angle: f32,
    },
}

impl Default for BoneConstraint {
    fn default() -> Self {
        Self::UNCONSTRAINED
    }
}

impl BoneConstraint {
    /// A cone wide enough to never trigger.
    pub const UNCONSTRAINED: Self = Self::Spherical { max_half_angle: PI };

    pub fn cone(max_half_angle: f32) -> Self {
        Self::Spherical { max_half_angle }
    }

    pub fn hinge(axis: Vec3, min_angle: f32, max_angle: f32) -> Self {
        Self::Hinge {
            axis,
            min_angle,
            max_angle,
        }
    }

    /// A hinge frozen within `epsilon` of `angle`, typically a value read back
    /// with [`hinge_angle`].
    pub fn locked_hinge(axis: Vec3, angle: f32, epsilon: f32) -> Self {
        Self::hinge(axis, angle - epsilon, angle + epsilon)
    }

    /// Moves `child` back onto the allowed region around `parent`, keeping
    /// the bone length.
    #[inline]
    pub fn enforce<M: MathBackend>(&self, parent: Vec3, child: &mut Vec3, rest_direction: Vec3) {
        match *self {
            Self::Spherical { max_half_angle } => {
                enforce_cone::<M>(parent, child, rest_direction, max_half_angle)
            }
            Self::Hinge {
                axis,
                min_angle,
                max_angle,
            } => enforce_hinge::<M>(parent, child, axis, min_angle, max_angle, rest_direction),
        }
    }
}

/// Clamps the bone `parent -> child` to the cone of half-angle
/// `max_half_angle` around `rest_direction`. A bone outside the cone is turned
/// onto its boundary, in the plane spanned by the rest and current directions.
pub fn enforce_cone<M: MathBackend>(
    parent: Vec3,
    child: &mut Vec3,
    rest_direction: Vec3,
    max_half_angle: f32,
) {
    let dir = (*child - parent).normalize_with::<M>();
    let cos_max = M::cos(max_half_angle);

    if rest_direction.dot(dir) >= cos_max {
        return;
    }

    let axis = rest_direction.cross(dir).normalize_with::<M>();
    let ortho = if axis == Vec3::ZERO {
        // Bone points straight against the rest direction; any side will do.
        rest_direction.any_orthonormal_vector().normalize_with::<M>()
    } else {
        axis.cross(rest_direction).normalize_with::<M>()
    };

    let new_dir = rest_direction * cos_max + ortho * M::sin(max_half_angle);
    let length = (*child - parent).length_with::<M>();

    *child = parent + new_dir * length;
}

/// Confines the bone `parent -> child` to the hinge plane of `axis` and to the
/// angular range `[min_angle, max_angle]` measured from the projected
/// `rest_direction`. Bones shorter than 1e-8 are left alone.
pub fn enforce_hinge<M: MathBackend>(
    parent: Vec3,
    child: &mut Vec3,
    axis: Vec3,
    min_angle: f32,
    max_angle: f32,
    rest_direction: Vec3,
) {
    let bone = *child - parent;
    let length = bone.length_with::<M>();
    if length < MIN_HINGE_BONE_LENGTH {
        return;
    }

    let dir = bone * (1.0 / length);
    let projected = project_bone_on_hinge::<M>(dir, axis, rest_direction);
    let rest_projected = project_rest_on_hinge::<M>(rest_direction, axis);

    // max wins over min when the range is inverted
    let angle = signed_plane_angle::<M>(rest_projected, projected, axis)
        .max(min_angle)
        .min(max_angle);

    // axis is perpendicular to rest_projected, so Rodrigues loses its last term
    let new_dir = rest_projected * M::cos(angle) + axis.cross(rest_projected) * M::sin(angle);

    *child = parent + new_dir * length;
}

/// Current signed angle of the bone `parent -> child` about the hinge `axis`,
/// relative to `rest_direction`, computed with [`FastMath`].
pub fn hinge_angle(parent: Vec3, child: Vec3, axis: Vec3, rest_direction: Vec3) -> f32 {
    hinge_angle_with::<FastMath>(parent, child, axis, rest_direction)
}

/// [`hinge_angle`] with an explicit math backend.
pub fn hinge_angle_with<M: MathBackend>(
    parent: Vec3,
    child: Vec3,
    axis: Vec3,
    rest_direction: Vec3,
) -> f32 {
    let dir = (child - parent).normalize_with::<M>();
    let projected = project_bone_on_hinge::<M>(dir, axis, rest_direction);
    let rest_projected = project_rest_on_hinge::<M>(rest_direction, axis);

    signed_plane_angle::<M>(rest_projected, projected, axis)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::math::StdMath;

    fn assert_vec_eq(a: Vec3, b: Vec3, epsilon: f32) {
        assert!(
            a.abs_diff_eq(b, epsilon),
            "{a:?} differs from {b:?} by more than {epsilon}"
        );
    }

    #[test]
    fn cone_leaves_inside_bones_alone() {
        let parent = Vec3::new(1.0, 2.0, 3.0);
        let original = parent + Vec3::new(1.0, 0.1, 0.0);
        let mut child = original;

        enforce_cone::<StdMath>(parent, &mut child, Vec3::X, 0.5);
        assert_eq!(child, original);

        enforce_cone::<FastMath>(parent, &mut child, Vec3::X, 0.5);
        assert_eq!(child, original);
    }

    #[test]
    fn cone_clamps_to_boundary() {
        let mut child = Vec3::new(0.0, 2.0, 0.0);
        enforce_cone::<StdMath>(Vec3::ZERO, &mut child, Vec3::X, 0.5);

        assert_vec_eq(child, Vec3::new(0.5_f32.cos(), 0.5_f32.sin(), 0.0) * 2.0, 1e-5);
    }

    #[test]
    fn fast_cone_clamps_close_to_boundary() {
        let mut child = Vec3::new(0.0, 0.0, -1.5);
        enforce_cone::<FastMath>(Vec3::ZERO, &mut child, Vec3::X, 0.3);

        let expected = Vec3::new(0.3_f32.cos(), 0.0, -0.3_f32.sin()) * 1.5;
        assert_vec_eq(child, expected, 5e-3);
    }

    #[test]
    fn zero_cone_locks_to_rest_direction() {
        let rest = Vec3::new(0.0, 0.6, 0.8);
        let mut child = Vec3::new(-3.0, 1.0, 2.0);
        let length = child.length();

        enforce_cone::<StdMath>(Vec3::ZERO, &mut child, rest, 0.0);

        assert_vec_eq(child, rest * length, 1e-5);
    }

    #[test]
    fn cone_handles_bone_opposite_rest() {
        let mut child = Vec3::new(-2.0, 0.0, 0.0);
        enforce_cone::<StdMath>(Vec3::ZERO, &mut child, Vec3::X, 0.5);

        assert!(child.is_finite());
        assert_abs_diff_eq!(child.length(), 2.0, epsilon = 1e-5);
        assert_abs_diff_eq!(child.normalize().dot(Vec3::X), 0.5_f32.cos(), epsilon = 1e-5);
    }

    #[test]
    fn hinge_clamps_angle() {
        let mut child = Vec3::new(1.0_f32.cos(), 1.0_f32.sin(), 0.0) * 3.0;
        enforce_hinge::<StdMath>(Vec3::ZERO, &mut child, Vec3::Z, -0.5, 0.5, Vec3::X);

        assert_vec_eq(child, Vec3::new(0.5_f32.cos(), 0.5_f32.sin(), 0.0) * 3.0, 1e-5);

        let mut child = Vec3::new((-1.0_f32).cos(), (-1.0_f32).sin(), 0.0);
        enforce_hinge::<StdMath>(Vec3::ZERO, &mut child, Vec3::Z, -0.5, 0.5, Vec3::X);

        assert_vec_eq(child, Vec3::new(0.5_f32.cos(), -(0.5_f32.sin()), 0.0), 1e-5);
    }

    #[test]
    fn hinge_flattens_bone_into_plane() {
        let parent = Vec3::new(0.0, 0.0, 1.0);
        let mut child = parent + Vec3::new(1.0, 0.0, 1.0);
        enforce_hinge::<StdMath>(parent, &mut child, Vec3::Z, -PI, PI, Vec3::X);

        assert_vec_eq(child, parent + Vec3::new(2.0_f32.sqrt(), 0.0, 0.0), 1e-5);
    }

    #[test]
    fn hinge_bone_along_axis_falls_back_to_rest() {
        let mut child = Vec3::new(0.0, 0.0, 2.0);
        enforce_hinge::<StdMath>(Vec3::ZERO, &mut child, Vec3::Z, -1.0, 1.0, Vec3::X);

        assert_vec_eq(child, Vec3::new(2.0, 0.0, 0.0), 1e-5);
    }

    #[test]
    fn hinge_rest_along_axis_uses_reference() {
        let mut child = Vec3::new(0.0, 0.0, 1.0);
        enforce_hinge::<StdMath>(Vec3::ZERO, &mut child, Vec3::Z, 0.0, 0.0, Vec3::Z);

        assert!(child.is_finite());
        assert_vec_eq(child, Vec3::new(-1.0, 0.0, 0.0), 1e-5);
    }

    #[test]
    fn hinge_ignores_degenerate_bone() {
        let mut child = Vec3::splat(1e-9);
        enforce_hinge::<FastMath>(Vec3::ZERO, &mut child, Vec3::Z, 0.0, 0.0, Vec3::X);

        assert_eq!(child, Vec3::splat(1e-9));
    }

    #[test]
    fn enforce_dispatches_per_variant() {
        let mut cone_child = Vec3::Y;
        BoneConstraint::cone(0.0).enforce::<StdMath>(Vec3::ZERO, &mut cone_child, Vec3::X);
        assert_vec_eq(cone_child, Vec3::X, 1e-6);

        let mut hinge_child = Vec3::new(0.0, 1.0, 1.0);
        BoneConstraint::hinge(Vec3::X, -PI, PI).enforce::<StdMath>(
            Vec3::ZERO,
            &mut hinge_child,
            Vec3::Y,
        );
        assert_vec_eq(hinge_child, Vec3::new(0.0, 1.0, 1.0), 1e-5);
    }

    #[test]
    fn angle_query_reports_signed_angle() {
        let parent = Vec3::new(1.0, 1.0, 0.0);
        let up = parent + Vec3::new(0.3_f32.cos(), 0.3_f32.sin(), 0.7);
        let down = parent + Vec3::new(0.3_f32.cos(), -(0.3_f32.sin()), -0.7);

        assert_abs_diff_eq!(hinge_angle_with::<StdMath>(parent, up, Vec3::Z, Vec3::X), 0.3, epsilon = 1e-5);
        assert_abs_diff_eq!(hinge_angle_with::<StdMath>(parent, down, Vec3::Z, Vec3::X), -0.3, epsilon = 1e-5);
        assert_abs_diff_eq!(hinge_angle(parent, up, Vec3::Z, Vec3::X), 0.3, epsilon = 0.075);
    }

    #[test]
    fn angle_query_matches_enforced_pose() {
        let mut child = Vec3::new(-1.0, 0.5, 0.0);
        enforce_hinge::<StdMath>(Vec3::ZERO, &mut child, Vec3::Z, -0.25, 0.75, Vec3::X);

        assert_abs_diff_eq!(hinge_angle_with::<StdMath>(Vec3::ZERO, child, Vec3::Z, Vec3::X), 0.75, epsilon = 1e-5);
    }

    #[test]
    fn locked_hinge_brackets_angle() {
        let BoneConstraint::Hinge { min_angle, max_angle, .. } =
            BoneConstraint::locked_hinge(Vec3::Y, 0.4, 0.01)
        else {
            panic!("expected a hinge");
        };
        assert_abs_diff_eq!(min_angle, 0.39, epsilon = 1e-6);
        assert_abs_diff_eq!(max_angle, 0.41, epsilon = 1e-6);
    }
}
