//! [FABRIK] inverse kinematics with cone and hinge joint limits, for [Bevy].
//!
//! The solver core ([`FabrikSolver`], [`fabrik_solve`]) works on a flat slice
//! of joint positions, never allocates and keeps no state between calls.
//! [`InverseKinematicsPlugin`] drives it from entity hierarchies tagged with
//! [`IkChain`].
//!
//! [FABRIK]: https://www.andreasaristidou.com/FABRIK.html
//! [Bevy]: https://bevyengine.org

mod chain;
mod constraint;
pub mod math;
mod solver;
mod util;

use bevy::prelude::*;

pub use crate::chain::{IkChain, IkChainError, MathPrecision, RestMode};
pub use crate::constraint::{
    enforce_cone, enforce_hinge, hinge_angle, hinge_angle_with, BoneConstraint,
};
pub use crate::math::{FastMath, MathBackend, StdMath};
pub use crate::solver::{fabrik_solve, FabrikSolver, SolveSettings, SolveStatus, MAX_JOINTS};
pub use crate::util::{Vec3Ext, NORMALIZE_EPSILON};

/// System set the IK solve runs in, for ordering target updates before it.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct IkSolveSet;

fn ik_solve(
    mut chain_query: Query<(Entity, &mut IkChain)>,
    joint_query: Query<(Option<&Parent>, &GlobalTransform, Option<&BoneConstraint>)>,
    mut transform_query: Query<&mut Transform>,
) {
    // TODO: Multi-chain structures sharing joints are solved one after another, not jointly.
    for (entity, mut chain) in chain_query.iter_mut() {
        match chain.solve(entity, &joint_query, &mut transform_query) {
            Ok(Some(SolveStatus::InvalidInput)) => {
                warn!("IK chain {:?} has degenerate bones or bad settings", entity);
            }
            Ok(Some(SolveStatus::TargetUnreachable)) => {
                debug!("IK chain {:?} cannot reach {}", entity, chain.target);
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to solve IK chain: {}", e),
        }
    }
}

/// [`Plugin`] for inverse kinematics. Needs to be added to the [`App`] for
/// [`IkChain`] components to solve and apply transforms.
pub struct InverseKinematicsPlugin;

impl Plugin for InverseKinematicsPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<IkChain>()
            .register_type::<BoneConstraint>()
            .register_type::<SolveSettings>()
            .register_type::<MathPrecision>()
            .register_type::<RestMode>()
            .add_systems(Update, ik_solve.in_set(IkSolveSet));
    }
}
