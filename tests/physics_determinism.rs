use glam::Vec3;
use rapier3d::prelude::RigidBodyHandle;
use scenedrop::config::StageConfig;
use scenedrop::physics::{BodyDef, PhysicsParams, ProxyShape};
use scenedrop::scene::SceneEnvironment;
use scenedrop::world::WorldPair;

const TEST_DT: f32 = 1.0 / 120.0;
const TEST_STEPS: usize = 240;

#[test]
fn fixed_step_remains_deterministic_across_worlds() {
    let (mut world_a, body_a) = spawn_tumbling_world();
    let (mut world_b, body_b) = spawn_tumbling_world();

    run_fixed_steps(&mut world_a, TEST_STEPS, TEST_DT);
    run_fixed_steps(&mut world_b, TEST_STEPS, TEST_DT);

    let (position_a, rotation_a) = world_a.physics().body_pose(body_a).expect("body exists in world A");
    let (position_b, rotation_b) = world_b.physics().body_pose(body_b).expect("body exists in world B");
    assert_vec3_near(position_a, position_b, 1e-5);
    assert!(rotation_a.dot(rotation_b).abs() > 1.0 - 1e-5);
    assert_vec3_near(
        world_a.physics().linvel(body_a).expect("velocity in world A"),
        world_b.physics().linvel(body_b).expect("velocity in world B"),
        1e-5,
    );
}

#[test]
fn one_large_delta_matches_the_same_time_in_small_ticks() {
    let (mut coarse, body_coarse) = spawn_tumbling_world();
    let (mut fine, body_fine) = spawn_tumbling_world();

    // 0.05 s is split into three 1/60 s sub-steps internally.
    coarse.run_tick(0.05);
    for _ in 0..3 {
        fine.run_tick(1.0 / 60.0);
    }

    assert!((coarse.physics().simulated_time() - fine.physics().simulated_time()).abs() < 1e-6);
    assert_eq!(coarse.physics().steps_taken(), fine.physics().steps_taken());
    let (a, _) = coarse.physics().body_pose(body_coarse).expect("coarse body");
    let (b, _) = fine.physics().body_pose(body_fine).expect("fine body");
    assert_vec3_near(a, b, 1e-4);
}

fn spawn_tumbling_world() -> (WorldPair, RigidBodyHandle) {
    let mut world = WorldPair::new(PhysicsParams::default());
    world.configure(SceneEnvironment::default(), &StageConfig::default());
    let def = BodyDef::dynamic(ProxyShape::Cuboid { half_extents: Vec3::new(0.5, 0.25, 1.0) }, Vec3::new(2.0, 3.0, 1.0))
        .with_mass(78.0);
    let body = world.physics_mut().spawn_body(&def).expect("body").body;
    world.physics_mut().set_linvel(body, Vec3::new(1.4, 0.5, -0.3));
    world.physics_mut().set_angvel(body, Vec3::new(0.2, 1.0, 0.0));
    (world, body)
}

fn run_fixed_steps(world: &mut WorldPair, steps: usize, dt: f32) {
    for _ in 0..steps {
        world.run_tick(dt);
    }
}

fn assert_vec3_near(a: Vec3, b: Vec3, epsilon: f32) {
    assert!(
        (a - b).length() <= epsilon,
        "vectors differed: left={:?}, right={:?}, epsilon={}",
        a,
        b,
        epsilon
    );
}
