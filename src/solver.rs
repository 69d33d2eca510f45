use std::marker::PhantomData;

use bevy::prelude::*;

use crate::constraint::BoneConstraint;
use crate::math::{FastMath, MathBackend};
use crate::util::Vec3Ext;

/// Largest chain, in joints, a single solve accepts.
pub const MAX_JOINTS: usize = 128;

const MIN_BONE_LENGTH: f32 = 1e-10;

const DEFAULT_TOLERANCE: f32 = 1e-3;
const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Outcome of a solve. The discriminants are the stable integer codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum SolveStatus {
    /// The end effector is within tolerance of the target.
    Converged = 0,
    /// The iteration budget ran out; the joints hold the last computed pose.
    MaxIterationsReached = 1,
    /// Malformed chain or degenerate bone. The joints were not touched.
    InvalidInput = 2,
    /// The target lies beyond the chain's reach; the chain was stretched
    /// straight toward it.
    TargetUnreachable = 3,
}

impl SolveStatus {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// True when the joints hold a pose produced by this solve.
    pub fn is_posed(self) -> bool {
        self != Self::InvalidInput
    }
}

impl TryFrom<i32> for SolveStatus {
    type Error = i32;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Converged),
            1 => Ok(Self::MaxIterationsReached),
            2 => Ok(Self::InvalidInput),
            3 => Ok(Self::TargetUnreachable),
            other => Err(other),
        }
    }
}

/// Convergence settings for a solve.
#[derive(Clone, Copy, Debug, PartialEq, Reflect)]
pub struct SolveSettings {
    /// Distance from the target at which the end effector counts as arrived.
    pub tolerance: f32,
    /// Upper bound on forward/backward iterations per solve.
    pub max_iterations: usize,
}

impl Default for SolveSettings {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl SolveSettings {
    pub const fn new(tolerance: f32, max_iterations: usize) -> Self {
        Self {
            tolerance,
            max_iterations,
        }
    }

    pub const fn with_tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub const fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// FABRIK solver over a flat joint array, generic over its math backend.
///
/// The solver keeps no state between calls; rest lengths and directions are
/// taken from the joints passed to each call. It never allocates: scratch
/// space lives on the stack and is bounded by [`MAX_JOINTS`].
#[derive(Clone, Copy, Debug)]
pub struct FabrikSolver<M: MathBackend = FastMath> {
    pub settings: SolveSettings,
    backend: PhantomData<M>,
}

impl<M: MathBackend> Default for FabrikSolver<M> {
    fn default() -> Self {
        Self::new(SolveSettings::default())
    }
}

impl<M: MathBackend> FabrikSolver<M> {
    pub const fn new(settings: SolveSettings) -> Self {
        Self {
            settings,
            backend: PhantomData,
        }
    }

    /// Moves `joints` so the last one approaches `target`.
    ///
    /// `joints[0]` is the anchored root. `constraints[i]` limits the bone from
    /// `joints[i]` to `joints[i + 1]`, relative to that bone's direction on
    /// entry. Returns [`SolveStatus::InvalidInput`] without touching `joints`
    /// when there are fewer than 2 or more than [`MAX_JOINTS`] joints, fewer
    /// constraints than bones, a bone shorter than 1e-10, or a non-finite
    /// target or tolerance.
    pub fn solve(
        &self,
        joints: &mut [Vec3],
        target: Vec3,
        constraints: &[BoneConstraint],
    ) -> SolveStatus {
        self.solve_inner(joints, target, constraints, None)
    }

    /// Like [`solve`](Self::solve), but constraints are measured from the
    /// given rest directions (one per bone, e.g. from a bind pose) instead of
    /// the bone directions on entry. A zero rest direction is invalid input.
    pub fn solve_with_rest(
        &self,
        joints: &mut [Vec3],
        target: Vec3,
        constraints: &[BoneConstraint],
        rest_directions: &[Vec3],
    ) -> SolveStatus {
        self.solve_inner(joints, target, constraints, Some(rest_directions))
    }

    fn solve_inner(
        &self,
        joints: &mut [Vec3],
        target: Vec3,
        constraints: &[BoneConstraint],
        rest_directions: Option<&[Vec3]>,
    ) -> SolveStatus {
        let joint_count = joints.len();
        if !(2..=MAX_JOINTS).contains(&joint_count) {
            return SolveStatus::InvalidInput;
        }

        let bone_count = joint_count - 1;
        if constraints.len() < bone_count
            || rest_directions.is_some_and(|dirs| dirs.len() < bone_count)
        {
            return SolveStatus::InvalidInput;
        }

        let tolerance = self.settings.tolerance;
        if !target.is_finite() || !tolerance.is_finite() || tolerance < 0.0 {
            return SolveStatus::InvalidInput;
        }

        let mut lengths = [0.0_f32; MAX_JOINTS];
        let mut rest = [Vec3::ZERO; MAX_JOINTS];
        let mut total_length = 0.0;

        for i in 0..bone_count {
            let bone = joints[i + 1] - joints[i];
            let length = bone.length_with::<M>();

            // Also rejects NaN.
            if !(length >= MIN_BONE_LENGTH) {
                return SolveStatus::InvalidInput;
            }

            lengths[i] = length;
            total_length += length;

            rest[i] = match rest_directions {
                Some(dirs) => {
                    let dir = dirs[i].normalize_with::<M>();
                    if dir == Vec3::ZERO {
                        return SolveStatus::InvalidInput;
                    }
                    dir
                }
                None => bone.normalize_with::<M>(),
            };
        }

        let root = joints[0];
        let to_target = target - root;

        if to_target.length_squared() > total_length * total_length {
            let dir = to_target.normalize_with::<M>();
            for i in 1..joint_count {
                joints[i] = joints[i - 1] + dir * lengths[i - 1];
            }
            return SolveStatus::TargetUnreachable;
        }

        let end = joint_count - 1;

        for _ in 0..self.settings.max_iterations {
            // Forward: pin the end effector to the target, pull toward it.
            joints[end] = target;
            for i in (0..bone_count).rev() {
                let dir = (joints[i] - joints[i + 1]).normalize_with::<M>();
                joints[i] = joints[i + 1] + dir * lengths[i];
            }

            // Backward: re-anchor the root, constrain each bone on the way out.
            joints[0] = root;
            for i in 0..bone_count {
                let parent = joints[i];
                let dir = (joints[i + 1] - parent).normalize_with::<M>();
                joints[i + 1] = parent + dir * lengths[i];

                constraints[i].enforce::<M>(parent, &mut joints[i + 1], rest[i]);
            }

            if (joints[end] - target).length_squared() <= tolerance * tolerance {
                return SolveStatus::Converged;
            }
        }

        SolveStatus::MaxIterationsReached
    }
}

/// Solves with the default [`FastMath`] backend. See [`FabrikSolver::solve`].
pub fn fabrik_solve(
    joints: &mut [Vec3],
    target: Vec3,
    constraints: &[BoneConstraint],
    settings: &SolveSettings,
) -> SolveStatus {
    FabrikSolver::<FastMath>::new(*settings).solve(joints, target, constraints)
}
