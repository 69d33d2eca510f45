use bevy::{
    ecs::{
        component::{ComponentHooks, ComponentId, StorageType},
        query::QueryEntityError,
        world::DeferredWorld,
    },
    prelude::*,
};

use crate::constraint::BoneConstraint;
use crate::math::{FastMath, MathBackend, StdMath};
use crate::solver::{FabrikSolver, SolveSettings, SolveStatus, MAX_JOINTS};

/// Errors raised while turning an entity hierarchy into a joint chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IkChainError {
    /// A chain entity lacks a required component.
    ComponentQuery,
    /// The hierarchy ended before `joint_count` joints were found.
    MissingParent(Entity),
    /// `joint_count` is outside `2..=MAX_JOINTS`.
    JointCount(usize),
}

impl std::error::Error for IkChainError {}

impl std::fmt::Display for IkChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ComponentQuery => write!(f, "Failed to query required IK chain components"),
            Self::MissingParent(entity) => {
                write!(f, "Parent not found for entity {entity:?} while walking IK chain")
            }
            Self::JointCount(count) => write!(
                f,
                "IK chain must have between 2 and {MAX_JOINTS} joints, got {count}"
            ),
        }
    }
}

impl From<QueryEntityError> for IkChainError {
    fn from(_: QueryEntityError) -> Self {
        Self::ComponentQuery
    }
}

/// Which math backend a chain is solved with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Reflect)]
pub enum MathPrecision {
    /// Table and bit-trick approximations ([`FastMath`]).
    #[default]
    Fast,
    /// Exact `f32` functions ([`StdMath`]).
    Exact,
}

/// What the constraints' zero angle is measured against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Reflect)]
pub enum RestMode {
    /// The bone directions at the start of each solve, i.e. last frame's pose.
    #[default]
    PerSolve,
    /// The bone directions captured when the [`IkChain`] was inserted.
    BindPose,
}

/// Main component that defines an IK chain. Add this to the end entity of a
/// chain of parented entities to solve the chain's inverse kinematics.
///
/// Joint constraints are read from [`BoneConstraint`] components on the
/// joint each bone starts from.
#[derive(Reflect, Debug, Clone)]
pub struct IkChain {
    /// If false, the chain will not be solved.
    pub enabled: bool,
    /// The target position for the end effector.
    pub target: Vec3,
    pub settings: SolveSettings,
    pub precision: MathPrecision,
    pub rest_mode: RestMode,
    pub(crate) joint_count: usize,
    pub(crate) bind_directions: Vec<Vec3>,
    #[reflect(ignore)]
    pub(crate) last_status: Option<SolveStatus>,
}

impl Component for IkChain {
    const STORAGE_TYPE: StorageType = StorageType::Table;

    fn register_component_hooks(hooks: &mut ComponentHooks) {
        hooks.on_insert(ik_chain_insert_hook);
    }
}

/// Joint data gathered from the hierarchy, root first.
struct GatheredChain {
    entities: [Entity; MAX_JOINTS],
    globals: [GlobalTransform; MAX_JOINTS],
    positions: [Vec3; MAX_JOINTS],
    constraints: [BoneConstraint; MAX_JOINTS],
    root_parent: Option<GlobalTransform>,
}

impl IkChain {
    /// Creates a new IK chain with the given number of joints, counting the
    /// entity it is inserted on.
    ///
    /// With [`RestMode::BindPose`] the parent entities need to already exist
    /// in the [`World`] with propagated [`GlobalTransform`]s when the chain is
    /// inserted.
    pub fn new(joint_count: usize) -> Self {
        Self {
            enabled: true,
            target: Vec3::ZERO,
            settings: SolveSettings::default(),
            precision: MathPrecision::default(),
            rest_mode: RestMode::default(),
            joint_count,
            bind_directions: vec![],
            last_status: None,
        }
    }

    pub fn with_target(mut self, target: Vec3) -> Self {
        self.target = target;
        self
    }

    pub fn with_settings(mut self, settings: SolveSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_precision(mut self, precision: MathPrecision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_rest_mode(mut self, rest_mode: RestMode) -> Self {
        self.rest_mode = rest_mode;
        self
    }

    pub fn joint_count(&self) -> usize {
        self.joint_count
    }

    /// Outcome of the most recent solve, if the chain has been solved.
    pub fn last_status(&self) -> Option<SolveStatus> {
        self.last_status
    }

    /// Bone directions captured at insertion in [`RestMode::BindPose`].
    pub fn bind_directions(&self) -> &[Vec3] {
        &self.bind_directions
    }

    pub(crate) fn solve(
        &mut self,
        entity: Entity,
        joint_query: &Query<(Option<&Parent>, &GlobalTransform, Option<&BoneConstraint>)>,
        transform_query: &mut Query<&mut Transform>,
    ) -> Result<Option<SolveStatus>, IkChainError> {
        if !self.enabled {
            return Ok(None);
        }

        let mut chain = self.gather(entity, joint_query)?;
        let count = self.joint_count;
        let end = chain.positions[count - 1];

        if end.distance_squared(self.target) <= self.settings.tolerance * self.settings.tolerance {
            self.last_status = Some(SolveStatus::Converged);
            return Ok(self.last_status);
        }

        let status = match self.precision {
            MathPrecision::Fast => self.run_solver::<FastMath>(&mut chain),
            MathPrecision::Exact => self.run_solver::<StdMath>(&mut chain),
        };
        self.last_status = Some(status);

        if status.is_posed() {
            apply_pose(&chain, count, transform_query)?;
        }

        Ok(Some(status))
    }

    fn run_solver<M: MathBackend>(&self, chain: &mut GatheredChain) -> SolveStatus {
        let count = self.joint_count;
        let solver = FabrikSolver::<M>::new(self.settings);
        let joints = &mut chain.positions[..count];
        let constraints = &chain.constraints[..count - 1];

        match self.rest_mode {
            RestMode::PerSolve => solver.solve(joints, self.target, constraints),
            RestMode::BindPose => {
                solver.solve_with_rest(joints, self.target, constraints, &self.bind_directions)
            }
        }
    }

    fn gather(
        &self,
        entity: Entity,
        joint_query: &Query<(Option<&Parent>, &GlobalTransform, Option<&BoneConstraint>)>,
    ) -> Result<GatheredChain, IkChainError> {
        let mut entities = [Entity::PLACEHOLDER; MAX_JOINTS];
        walk_chain(entity, self.joint_count, &mut entities, |joint| {
            joint_query
                .get(joint)
                .ok()
                .and_then(|(parent, _, _)| parent.map(Parent::get))
        })?;

        let mut chain = GatheredChain {
            entities,
            globals: [GlobalTransform::IDENTITY; MAX_JOINTS],
            positions: [Vec3::ZERO; MAX_JOINTS],
            constraints: [BoneConstraint::UNCONSTRAINED; MAX_JOINTS],
            root_parent: None,
        };

        for i in 0..self.joint_count {
            let (parent, global, constraint) = joint_query.get(chain.entities[i])?;
            chain.globals[i] = *global;
            chain.positions[i] = global.translation();
            if let Some(constraint) = constraint {
                chain.constraints[i] = *constraint;
            }

            if i == 0 {
                if let Some(parent) = parent {
                    chain.root_parent = Some(*joint_query.get(parent.get())?.1);
                }
            }
        }

        Ok(chain)
    }
}

/// Fills `entities[..joint_count]` root first, ending with `end`.
fn walk_chain(
    end: Entity,
    joint_count: usize,
    entities: &mut [Entity; MAX_JOINTS],
    parent_of: impl Fn(Entity) -> Option<Entity>,
) -> Result<(), IkChainError> {
    if !(2..=MAX_JOINTS).contains(&joint_count) {
        return Err(IkChainError::JointCount(joint_count));
    }

    let mut current = end;
    entities[joint_count - 1] = end;
    for i in (0..joint_count - 1).rev() {
        current = parent_of(current).ok_or(IkChainError::MissingParent(current))?;
        entities[i] = current;
    }

    Ok(())
}

/// Writes the solved positions back as local transforms. Each joint turns by
/// the arc between its old and new outgoing bone; the end effector follows its
/// incoming bone.
fn apply_pose(
    chain: &GatheredChain,
    count: usize,
    transform_query: &mut Query<&mut Transform>,
) -> Result<(), IkChainError> {
    let mut posed = [Transform::IDENTITY; MAX_JOINTS];

    for i in 0..count {
        let old = chain.globals[i].compute_transform();
        let (a, b) = if i + 1 < count { (i, i + 1) } else { (i - 1, i) };

        let before = old_bone(chain, a, b);
        let after = chain.positions[b] - chain.positions[a];
        let turn = match (before.try_normalize(), after.try_normalize()) {
            (Some(from), Some(to)) => Quat::from_rotation_arc(from, to),
            _ => Quat::IDENTITY,
        };

        posed[i] = Transform {
            translation: chain.positions[i],
            rotation: (turn * old.rotation).normalize(),
            scale: old.scale,
        };
    }

    for i in 0..count {
        let global = GlobalTransform::from(posed[i]);
        let local = if i == 0 {
            match chain.root_parent {
                Some(parent) => global.reparented_to(&parent),
                None => posed[0],
            }
        } else {
            global.reparented_to(&GlobalTransform::from(posed[i - 1]))
        };

        let mut transform = transform_query.get_mut(chain.entities[i])?;
        transform.translation = local.translation;
        transform.rotation = local.rotation;
    }

    Ok(())
}

fn old_bone(chain: &GatheredChain, a: usize, b: usize) -> Vec3 {
    chain.globals[b].translation() - chain.globals[a].translation()
}

fn ik_chain_insert_hook(mut world: DeferredWorld, entity: Entity, _component_id: ComponentId) {
    let (joint_count, rest_mode) = match world.get::<IkChain>(entity) {
        Some(chain) => (chain.joint_count, chain.rest_mode),
        None => return,
    };

    if rest_mode != RestMode::BindPose {
        return;
    }

    let mut entities = [Entity::PLACEHOLDER; MAX_JOINTS];
    let walked = walk_chain(entity, joint_count, &mut entities, |joint| {
        world.get::<Parent>(joint).map(Parent::get)
    });
    if let Err(e) = walked {
        warn!("Cannot capture bind pose for IK chain {:?}: {}", entity, e);
        return;
    }

    let mut directions = Vec::with_capacity(joint_count - 1);
    for pair in entities[..joint_count].windows(2) {
        let (Some(parent), Some(child)) = (
            world.get::<GlobalTransform>(pair[0]),
            world.get::<GlobalTransform>(pair[1]),
        ) else {
            warn!(
                "Transform not found while capturing bind pose for IK chain {:?}",
                entity
            );
            return;
        };
        directions.push((child.translation() - parent.translation()).normalize_or_zero());
    }

    if let Some(mut chain) = world.get_mut::<IkChain>(entity) {
        debug!("Captured bind pose for IK chain {:?}: {:?}", entity, directions);
        chain.bind_directions = directions;
    }
}
