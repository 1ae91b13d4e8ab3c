mod common;

use common::{assert_vec3_near, run_frames, session_with, session_with_config, CubeLoader, FailingLoader};
use glam::{Vec2, Vec3};
use rapier3d::parry::shape::ShapeType;
use scenedrop::assets::{AssetLoadError, AssetPath, LoadFuture, ModelLoader};
use scenedrop::camera3d::Camera3D;
use scenedrop::catalog::{AssetCatalog, DropEvent};
use scenedrop::config::{CameraConfig, EngineConfig, ProxyPolicy};
use scenedrop::events::SessionEvent;
use scenedrop::listeners::NullListenerHost;
use scenedrop::model::{MeshGeometry, ModelBundle, ModelNode};
use scenedrop::physics::{PhysicsMaterial, PhysicsParams};
use scenedrop::placement::{resolve_drop_point, DropSource, PlacementError, PlacementRequest, PlacementSettings};
use scenedrop::scene::subtree_len;
use scenedrop::world::WorldPair;
use scenedrop::{EntityId, Session};
use std::io::Write;
use tempfile::NamedTempFile;
use winit::dpi::PhysicalSize;

const VIEWPORT: PhysicalSize<u32> = PhysicalSize::new(800, 600);
const CENTRE: Vec2 = Vec2::new(400.0, 300.0);

fn box_request() -> PlacementRequest {
    PlacementRequest::new("gltf", "Box.gltf", CENTRE)
}

#[test]
fn identical_placements_get_distinct_ids() {
    let (mut session, _) = session_with(CubeLoader::default());
    let first = session.place(box_request()).expect("first placement");
    let second = session.place(box_request()).expect("second placement");
    assert_ne!(first, second);

    let world = session.world().expect("mounted");
    assert_eq!(world.bindings().len(), 2);
    // Ground and wall plus one body per entity.
    assert_eq!(world.physics().body_count(), 4);
}

#[test]
fn failed_load_registers_nothing() {
    let (mut session, _) = session_with(FailingLoader);
    let err = session.place(box_request()).expect_err("load fails");
    match err {
        PlacementError::AssetLoad(load) => assert_eq!(load.file_name, "Box.gltf"),
        other => panic!("unexpected error {other:?}"),
    }

    let world = session.world().expect("mounted");
    assert!(world.bindings().is_empty());
    assert_eq!(world.physics().body_count(), 2);
    let events = session.drain_events();
    assert!(events.iter().any(|event| matches!(event, SessionEvent::PlacementFailed { file_name, .. } if file_name == "Box.gltf")));
}

#[test]
fn empty_scene_falls_back_to_reference_plane() {
    let mut world = WorldPair::new(PhysicsParams::default());
    let camera = Camera3D::from_config(&CameraConfig::default());
    let settings = PlacementSettings::default();

    let point = resolve_drop_point(&mut world, &camera, VIEWPORT, CENTRE, &settings);
    assert_eq!(point.source, DropSource::ReferencePlane);
    assert!((point.position.y - 15.0).abs() < 1e-3);
    // The centre ray runs from (-25, 25, 0) towards (0, 2, 0) and crosses y = 15 at x = -25 + 25 * 10 / 23.
    assert!((point.position.x - (-25.0 + 250.0 / 23.0)).abs() < 1e-2);
    assert!(point.position.z.abs() < 1e-3);
}

#[test]
fn rays_that_never_reach_the_plane_still_resolve() {
    let mut world = WorldPair::new(PhysicsParams::default());
    let camera = Camera3D::new(Vec3::new(0.0, 20.0, 0.0), Vec3::new(10.0, 20.0, 0.0), 1.0, 0.1, 1000.0);
    let settings = PlacementSettings::default();

    let point = resolve_drop_point(&mut world, &camera, VIEWPORT, Vec2::new(400.0, 0.0), &settings);
    assert_eq!(point.source, DropSource::RayFallback);
    assert_eq!(point.position.y, settings.reference_plane_height);
    assert!(point.position.x > 0.0);
}

#[test]
fn drops_on_the_wall_resolve_to_its_face() {
    let (mut session, _) = session_with(CubeLoader::default());
    let camera = session.camera().clone();
    let screen = camera.project_point(Vec3::new(10.0, 5.0, 0.0), VIEWPORT).expect("wall on screen");
    let world = session.world_mut().expect("mounted");

    let point = resolve_drop_point(world, &camera, VIEWPORT, screen, &PlacementSettings::default());
    assert_eq!(point.source, DropSource::SurfaceHit);
    assert!((point.position.x - 9.5).abs() < 1e-2, "hit {:?}", point.position);
}

#[test]
fn cat_falls_and_comes_to_rest_on_the_ground() {
    let loader = CubeLoader::default().with_size("Cat.glb", Vec3::new(4.0, 3.0, 8.0));
    let (mut session, _) = session_with(loader);
    session.request_placement(PlacementRequest::new("glb", "Cat.glb", CENTRE)).expect("requested");
    session.frame(common::FRAME_DT);

    let world = session.world().expect("mounted");
    let id = *world.bindings().ids().first().expect("cat registered on the first frame");
    let row = world.entity(id).cloned().expect("row");
    // Catalog scale 0.1 and y offset -0.5 apply when the request omits them.
    assert_vec3_near(row.dimensions, Vec3::new(0.4, 0.3, 0.8), 1e-4);
    assert_eq!(row.y_offset, -0.5);

    let mut heights = Vec::new();
    for _ in 0..600 {
        session.frame(common::FRAME_DT);
        let world = session.world().expect("mounted");
        heights.push(world.physics().body_pose(row.body).expect("body").0.y);
    }
    for pair in heights[..30].windows(2) {
        assert!(pair[1] < pair[0], "cat should fall during the first ticks: {pair:?}");
    }
    let rest = heights
        .windows(10)
        .position(|window| {
            let (lo, hi) = window.iter().fold((f32::MAX, f32::MIN), |(lo, hi), y| (lo.min(*y), hi.max(*y)));
            hi - lo < 1e-2 && hi < 1.0
        })
        .expect("cat comes to rest");
    assert!(rest > 30);
    let resting = *heights.last().expect("heights");
    assert!((resting - 0.15).abs() < 0.05, "cat rests on its half height, got {resting}");

    let world = session.world().expect("mounted");
    let (body_position, _) = world.physics().body_pose(row.body).expect("body");
    let node = world.node_transform(id).expect("node");
    assert_vec3_near(node.translation, body_position + Vec3::new(0.0, -0.15, 0.0), 1e-4);
}

#[test]
fn character_gets_rig_low_friction_and_control() {
    let (mut session, _) = session_with(CubeLoader::default());
    let id = session.place(PlacementRequest::new("glb", "Soldier.glb", CENTRE)).expect("soldier");
    assert_eq!(session.controller().target(), Some(id));

    let world = session.world().expect("mounted");
    let row = world.entity(id).expect("row");
    assert!(row.is_character);
    assert!(row.has_rig);
    let material = PhysicsMaterial(world.physics().collider(row.collider).expect("collider").user_data as u32);
    assert_eq!(world.physics().friction_table().get(material, PhysicsMaterial::GROUND), Some(0.02));
    assert_eq!(world.physics().friction_table().get(PhysicsMaterial::GROUND, material), Some(0.02));

    let other = session.place(box_request()).expect("box");
    let world = session.world().expect("mounted");
    assert!(!world.entity(other).expect("row").is_character);
    assert_eq!(session.controller().target(), Some(id));
}

#[test]
fn removing_an_entity_removes_node_and_body() {
    let (mut session, _) = session_with(CubeLoader::default());
    let id = session.place(box_request()).expect("box");
    run_frames(&mut session, 3);
    let row = session.world().expect("mounted").entity(id).cloned().expect("row");

    assert!(session.remove_entity(id));
    assert!(!session.remove_entity(id));
    let world = session.world().expect("mounted");
    assert!(world.entity(id).is_none());
    assert!(!world.physics().contains_body(row.body));
    assert_eq!(subtree_len(&world.world, row.node), 0);
    assert!(session.drain_events().contains(&SessionEvent::EntityRemoved { id }));
}

#[test]
fn catalog_drops_outside_the_viewport_are_ignored() {
    let (mut session, _) = session_with(CubeLoader::default());
    let cat = session.catalog().by_name("Cat.glb").expect("cat").id;

    assert!(session.drop_asset(&DropEvent::new(cat, Vec2::new(900.0, 10.0))).is_none());
    let ticket = session.drop_asset(&DropEvent::new(cat, CENTRE)).expect("inside").expect("mounted");
    let outcomes = session.poll_placements();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].ticket(), ticket);
    assert!(outcomes[0].placed().is_some());
}

/// Every load resolves to a single flat 2 x 2 quad.
struct FlatLoader;

impl ModelLoader for FlatLoader {
    fn load(&self, path: &AssetPath) -> LoadFuture {
        let bundle = ModelBundle::new(ModelNode::named(path.file_name.as_str()).with_mesh(MeshGeometry::plane(2.0, 2.0)));
        Box::pin(async move { Ok::<_, AssetLoadError>(bundle) })
    }
}

fn hull_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.placement.proxy_policy = ProxyPolicy::ConvexHull;
    config
}

fn collider_shape(session: &Session, id: EntityId) -> ShapeType {
    let world = session.world().expect("mounted");
    let row = world.entity(id).expect("row");
    world.physics().collider(row.collider).expect("collider").shape().shape_type()
}

#[test]
fn hull_policy_wraps_the_mesh_in_a_convex_hull() {
    let (mut session, _) = session_with_config(hull_config(), CubeLoader::default());
    let id = session.place(box_request()).expect("box");
    assert_eq!(collider_shape(&session, id), ShapeType::ConvexPolyhedron);
    let row = session.world().expect("mounted").entity(id).cloned().expect("row");
    assert_vec3_near(row.dimensions, CubeLoader::DEFAULT_SIZE, 1e-5);

    let (mut boxed, _) = session_with(CubeLoader::default());
    let id = boxed.place(box_request()).expect("box");
    assert_eq!(collider_shape(&boxed, id), ShapeType::Cuboid);
}

#[test]
fn flat_meshes_fall_back_to_a_bounding_box() {
    let (mut session, _) = session_with_config(hull_config(), FlatLoader);
    let id = session.place(PlacementRequest::new("gltf", "Tile.gltf", CENTRE)).expect("tile");
    assert_eq!(collider_shape(&session, id), ShapeType::Cuboid);
    let world = session.world().expect("mounted");
    assert_vec3_near(world.entity(id).expect("row").dimensions, Vec3::new(2.0, 0.0, 2.0), 1e-5);
}

#[test]
fn catalog_entries_decide_which_asset_is_a_character() {
    let mut temp = NamedTempFile::new().expect("temp catalog");
    write!(temp, r#"{{"glb":[{{"name":"Cat.glb","can_be_character":true}},{{"name":"Soldier.glb"}}]}}"#)
        .expect("write catalog");
    let catalog = AssetCatalog::load(temp.path()).expect("load catalog");

    let mut config = EngineConfig::default();
    config.character.asset = "Nobody.glb".into();
    let host = NullListenerHost::shared();
    let renderer = common::RecordingRenderer::default();
    let mut session =
        Session::new(config, Box::new(CubeLoader::default()), Box::new(renderer), host).with_catalog(catalog);
    assert!(session.mount());

    let soldier = session.place(PlacementRequest::new("glb", "Soldier.glb", CENTRE)).expect("soldier");
    let cat = session.place(PlacementRequest::new("glb", "Cat.glb", CENTRE)).expect("cat");
    let world = session.world().expect("mounted");
    assert!(!world.entity(soldier).expect("soldier row").is_character);
    assert!(world.entity(cat).expect("cat row").is_character);
    assert_eq!(session.controller().target(), Some(cat));
}

#[test]
fn repeated_characters_share_one_friction_entry() {
    let (mut session, _) = session_with(CubeLoader::default());
    for _ in 0..3 {
        let id = session.place(PlacementRequest::new("glb", "Soldier.glb", CENTRE)).expect("soldier");
        assert!(session.remove_entity(id));
    }
    session.place(PlacementRequest::new("glb", "Soldier.glb", CENTRE)).expect("soldier");

    let table = session.world().expect("mounted").physics().friction_table();
    assert_eq!(table.len(), 1);
    assert_eq!(table.get(PhysicsMaterial::CHARACTER, PhysicsMaterial::GROUND), Some(0.02));
}
