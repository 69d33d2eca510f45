//! Headless pick-and-place: a two-bone arm with a hinged elbow fetches points
//! and stacks them in a row, logging each frame's solve.

use std::f32::consts::PI;

use bevy::log::LogPlugin;
use bevy::prelude::*;

use bevy_fabrik_limits::*;

const FRAME_COUNT: usize = 225;
const FRAME_TIME: f32 = 0.16;
const TARGET_SPEED: f32 = 2.5;
const GRAB_DISTANCE: f32 = 0.05;

const PICKUPS: [Vec3; 4] = [
    Vec3::new(2.0, 1.0, 0.0),
    Vec3::new(1.0, 1.5, -1.0),
    Vec3::new(-1.5, 1.0, 0.5),
    Vec3::new(0.5, 0.5, 2.0),
];

#[derive(Resource)]
struct PickAndPlace {
    goal: Vec3,
    current: Vec3,
    holding: bool,
    placed: Vec<Vec3>,
    next_pickup: usize,
}

#[derive(Component)]
struct Hand;

fn main() {
    let mut app = App::new();
    app.add_plugins((
        MinimalPlugins,
        LogPlugin::default(),
        TransformPlugin,
        HierarchyPlugin,
        InverseKinematicsPlugin,
    ))
    .insert_resource(PickAndPlace {
        goal: PICKUPS[0],
        current: Vec3::new(3.0, 0.0, 0.0),
        holding: false,
        placed: vec![],
        next_pickup: 1,
    })
    .add_systems(Update, steer_target.before(IkSolveSet));
    app.finish();
    app.cleanup();

    let hand = spawn_arm(app.world_mut());
    // Propagate transforms before the chain needs them.
    app.update();
    app.world_mut().entity_mut(hand).insert(
        IkChain::new(3)
            .with_target(Vec3::new(3.0, 0.0, 0.0))
            .with_settings(SolveSettings::new(1e-5, 16))
            .with_precision(MathPrecision::Exact),
    );

    info!("start simulation");
    for frame in 0..FRAME_COUNT {
        app.update();

        let Some(status) = app
            .world()
            .get::<IkChain>(hand)
            .and_then(IkChain::last_status)
        else {
            continue;
        };
        let end = app
            .world()
            .get::<GlobalTransform>(hand)
            .map(GlobalTransform::translation)
            .unwrap_or_default();

        match status {
            SolveStatus::TargetUnreachable => {
                warn!("[{frame:3}] target unreachable, clamped at max reach");
                break;
            }
            SolveStatus::InvalidInput => {
                warn!("[{frame:3}] invalid chain");
                break;
            }
            SolveStatus::MaxIterationsReached => {
                debug!("[{frame:3}] did not converge, hand at {end}");
            }
            SolveStatus::Converged => {
                debug!("[{frame:3}] hand at {end}");
            }
        }
    }

    let placed = app.world().resource::<PickAndPlace>().placed.len();
    info!("finished simulation, placed {placed} items");
}

fn spawn_arm(world: &mut World) -> Entity {
    let shoulder = world
        .spawn((TransformBundle::default(), BoneConstraint::cone(PI)))
        .id();
    let elbow = world
        .spawn((
            TransformBundle::from_transform(Transform::from_xyz(1.5, 0.0, 0.0)),
            BoneConstraint::hinge(Vec3::Z, -PI, PI),
        ))
        .id();
    let hand = world
        .spawn((
            TransformBundle::from_transform(Transform::from_xyz(1.5, 0.0, 0.0)),
            Hand,
        ))
        .id();
    world.entity_mut(shoulder).add_child(elbow);
    world.entity_mut(elbow).add_child(hand);
    hand
}

/// Eases the chain target toward the current goal. Reaching a pickup switches
/// the goal to the next free drop slot; reaching a drop slot switches it to
/// the next pickup.
fn steer_target(mut task: ResMut<PickAndPlace>, mut chains: Query<&mut IkChain, With<Hand>>) {
    if task.current.distance(task.goal) < GRAB_DISTANCE {
        if task.holding {
            let goal = task.goal;
            task.placed.push(goal);
            task.goal = PICKUPS[task.next_pickup % PICKUPS.len()];
            task.next_pickup += 1;
        } else {
            let slot = task.placed.len() as f32;
            task.goal = Vec3::new(-1.0 + 0.25 * slot, -0.5, 1.0);
        }
        task.holding = !task.holding;
    }

    task.current = task.current.lerp(task.goal, TARGET_SPEED * FRAME_TIME);

    for mut chain in chains.iter_mut() {
        chain.target = task.current;
    }
}
