//! Two limited chains chasing orbiting targets: a tentacle of cone-limited
//! capsules and a two-bone arm whose elbow only bends one way.

use std::f32::consts::{FRAC_PI_2, TAU};

use bevy::prelude::*;
use bevy::transform::TransformSystem;

use bevy_fabrik_limits::*;

const TENTACLE_SEGMENTS: usize = 12;
const TENTACLE_SEGMENT_LENGTH: f32 = 0.35;
const TENTACLE_CONE: f32 = 0.5;

const ARM_BONE_LENGTH: f32 = 1.4;
const ELBOW_RANGE: (f32, f32) = (-2.4, 0.0);

fn main() {
    App::new()
        .add_plugins((DefaultPlugins, InverseKinematicsPlugin))
        .add_systems(Startup, spawn_scene)
        // Bind poses are read from GlobalTransforms, so chains go in after propagation.
        .add_systems(
            PostStartup,
            attach_chains.after(TransformSystem::TransformPropagate),
        )
        .add_systems(
            Update,
            (orbit_targets, follow_targets, report_unreachable)
                .chain()
                .before(IkSolveSet),
        )
        .run();
}

/// Moves a target around `center` in the plane spanned by `u` and `v`.
#[derive(Component)]
struct Orbit {
    center: Vec3,
    u: Vec3,
    v: Vec3,
    speed: f32,
}

/// Chain end that should chase the given target entity.
#[derive(Component)]
struct Follows(Entity);

/// Chain waiting for its hierarchy to get global transforms.
#[derive(Component)]
struct PendingChain(IkChain);

fn spawn_scene(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let target_mesh = meshes.add(Sphere { radius: 0.08 });

    let tentacle_target = commands
        .spawn((
            PbrBundle {
                mesh: target_mesh.clone(),
                material: materials.add(Color::srgb(0.9, 0.2, 0.1)),
                ..default()
            },
            Orbit {
                center: Vec3::new(-1.5, 2.8, 0.0),
                u: Vec3::X * 1.8,
                v: Vec3::new(0.0, 0.6, 1.6),
                speed: 0.7,
            },
        ))
        .id();
    let arm_target = commands
        .spawn((
            PbrBundle {
                mesh: target_mesh,
                material: materials.add(Color::srgb(0.1, 0.4, 0.9)),
                ..default()
            },
            Orbit {
                center: Vec3::new(2.3, 1.4, 0.0),
                u: Vec3::X * 0.8,
                v: Vec3::Y * 0.9,
                speed: 1.3,
            },
        ))
        .id();

    let capsule = meshes.add(Capsule3d {
        radius: 0.07,
        half_length: TENTACLE_SEGMENT_LENGTH * 0.35,
    });
    let tentacle_material = materials.add(StandardMaterial {
        base_color: Color::srgb(0.8, 0.7, 0.5),
        ..default()
    });

    let tentacle_base = commands
        .spawn(SpatialBundle::from_transform(Transform::from_xyz(-1.5, 0.0, 0.0)))
        .id();
    let mut parent = tentacle_base;
    for _ in 0..TENTACLE_SEGMENTS {
        parent = spawn_joint(
            &mut commands,
            parent,
            Vec3::Y * TENTACLE_SEGMENT_LENGTH,
            (capsule.clone(), tentacle_material.clone()),
            BoneConstraint::cone(TENTACLE_CONE),
        );
    }
    // The tip has no outgoing bone, so no mesh or limit.
    let tentacle_tip = commands
        .spawn(SpatialBundle::from_transform(Transform::from_translation(
            Vec3::Y * TENTACLE_SEGMENT_LENGTH,
        )))
        .id();
    commands.entity(parent).add_child(tentacle_tip);
    commands.entity(tentacle_tip).insert((
        Follows(tentacle_target),
        PendingChain(
            IkChain::new(TENTACLE_SEGMENTS + 2)
                .with_settings(SolveSettings::new(1e-3, 16))
                .with_rest_mode(RestMode::BindPose),
        ),
    ));

    let bone = meshes.add(Cuboid::new(0.12, ARM_BONE_LENGTH * 0.8, 0.12));
    let arm_material = materials.add(Color::srgb(0.5, 0.5, 0.55));

    let shoulder = commands
        .spawn((
            SpatialBundle::from_transform(Transform::from_xyz(1.5, 0.0, 0.0)),
            BoneConstraint::cone(FRAC_PI_2),
        ))
        .id();
    let elbow = spawn_joint(
        &mut commands,
        shoulder,
        Vec3::Y * ARM_BONE_LENGTH,
        (bone.clone(), arm_material.clone()),
        BoneConstraint::hinge(Vec3::Z, ELBOW_RANGE.0, ELBOW_RANGE.1),
    );
    let hand = commands
        .spawn(SpatialBundle::from_transform(Transform::from_translation(
            Vec3::Y * ARM_BONE_LENGTH,
        )))
        .id();
    commands.entity(elbow).add_child(hand);
    commands.entity(hand).insert((
        Follows(arm_target),
        PendingChain(
            IkChain::new(3)
                .with_precision(MathPrecision::Exact)
                .with_rest_mode(RestMode::BindPose),
        ),
    ));
    // Upper arm mesh hangs off the shoulder, centered on its bone.
    let upper_arm = commands
        .spawn(PbrBundle {
            mesh: bone,
            material: arm_material,
            transform: Transform::from_translation(Vec3::Y * ARM_BONE_LENGTH * 0.5),
            ..default()
        })
        .id();
    commands.entity(shoulder).add_child(upper_arm);

    commands.spawn(Camera3dBundle {
        transform: Transform::from_xyz(0.0, 4.0, 9.5).looking_at(Vec3::Y * 2.0, Vec3::Y),
        ..default()
    });
    commands.spawn(DirectionalLightBundle {
        directional_light: DirectionalLight {
            illuminance: 2_000.,
            shadows_enabled: true,
            ..default()
        },
        transform: Transform::from_xyz(-20.0, 40.0, 30.0).looking_at(Vec3::ZERO, Vec3::Y),
        ..default()
    });
}

/// Spawns a joint at `offset` from `parent`. The mesh is drawn halfway along
/// the bone leaving the joint, so it follows the joint's rotation.
fn spawn_joint(
    commands: &mut Commands,
    parent: Entity,
    offset: Vec3,
    (mesh, material): (Handle<Mesh>, Handle<StandardMaterial>),
    constraint: BoneConstraint,
) -> Entity {
    let joint = commands
        .spawn((
            SpatialBundle::from_transform(Transform::from_translation(offset)),
            constraint,
        ))
        .with_children(|joint| {
            joint.spawn(PbrBundle {
                mesh,
                material,
                transform: Transform::from_translation(offset * 0.5),
                ..default()
            });
        })
        .id();
    commands.entity(parent).add_child(joint);
    joint
}

fn attach_chains(mut commands: Commands, pending: Query<(Entity, &PendingChain)>) {
    for (entity, PendingChain(chain)) in pending.iter() {
        commands
            .entity(entity)
            .insert(chain.clone())
            .remove::<PendingChain>();
    }
}

fn orbit_targets(time: Res<Time>, mut targets: Query<(&mut Transform, &Orbit)>) {
    let t = time.elapsed_seconds();
    for (mut transform, orbit) in targets.iter_mut() {
        let phase = (t * orbit.speed) % TAU;
        transform.translation = orbit.center + orbit.u * phase.cos() + orbit.v * phase.sin();
    }
}

fn follow_targets(mut chains: Query<(&mut IkChain, &Follows)>, targets: Query<&Transform>) {
    for (mut chain, Follows(target)) in chains.iter_mut() {
        if let Ok(target) = targets.get(*target) {
            chain.target = target.translation;
        }
    }
}

fn report_unreachable(chains: Query<(Entity, &IkChain)>) {
    for (entity, chain) in chains.iter() {
        if chain.last_status() == Some(SolveStatus::TargetUnreachable) {
            debug!("Chain {:?} stretched toward {}", entity, chain.target);
        }
    }
}
