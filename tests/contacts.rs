mod common;

use common::{run_frames, session_with, CubeLoader};
use glam::{Vec2, Vec3};
use scenedrop::config::StageConfig;
use scenedrop::contacts::{contacts_of, is_in_contact, touches_any};
use scenedrop::events::{ContactParty, SessionEvent};
use scenedrop::physics::{BodyDef, PhysicsParams, ProxyShape};
use scenedrop::placement::PlacementRequest;
use scenedrop::scene::SceneEnvironment;
use scenedrop::world::WorldPair;

fn configured_world() -> WorldPair {
    let mut world = WorldPair::new(PhysicsParams::default());
    world.configure(SceneEnvironment::default(), &StageConfig::default());
    world
}

#[test]
fn contact_queries_are_symmetric() {
    let mut world = configured_world();
    let ground = world.fixtures().by_name("ground").and_then(|fixture| fixture.body).expect("ground");
    let wall = world.fixtures().by_name("wall").and_then(|fixture| fixture.body).expect("wall");
    let resting = world
        .physics_mut()
        .spawn_body(&BodyDef::dynamic(ProxyShape::Cuboid { half_extents: Vec3::splat(0.5) }, Vec3::new(0.0, 0.5, 0.0)))
        .expect("box")
        .body;
    let floating = world
        .physics_mut()
        .spawn_body(&BodyDef::dynamic(ProxyShape::Ball { radius: 0.5 }, Vec3::new(-5.0, 30.0, 0.0)))
        .expect("ball")
        .body;

    for _ in 0..5 {
        world.run_tick(1.0 / 60.0);
    }
    let physics = world.physics();
    assert!(is_in_contact(physics, resting, ground));
    assert!(is_in_contact(physics, ground, resting));
    assert!(!is_in_contact(physics, resting, wall));
    assert!(!is_in_contact(physics, floating, ground));
    assert!(!is_in_contact(physics, ground, floating));
    assert_eq!(contacts_of(physics, resting), vec![ground]);
    assert!(contacts_of(physics, floating).is_empty());
    assert!(touches_any(physics, resting, &[wall, ground]));
    assert!(!touches_any(physics, floating, &[wall, ground]));
}

#[test]
fn landing_entities_report_contact_with_the_stage() {
    let (mut session, _) = session_with(CubeLoader::default());
    let id = session.place(PlacementRequest::new("gltf", "Box.gltf", Vec2::new(400.0, 300.0))).expect("box");
    run_frames(&mut session, 200);

    let events = session.drain_events();
    let started = SessionEvent::contact_started(ContactParty::Entity(id), ContactParty::Stage("ground".into()));
    assert!(events.contains(&started), "events: {events:?}");
    // Pairs are ordered, so the same contact reads the same from either side.
    assert_eq!(
        started,
        SessionEvent::contact_started(ContactParty::Stage("ground".into()), ContactParty::Entity(id))
    );
}
