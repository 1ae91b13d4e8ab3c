mod common;

use common::{run_frames, session_with, CubeLoader, DeferredLoader, RecordingHost, RecordingRenderer};
use glam::Vec2;
use scenedrop::catalog::{PlacedAsset, ScreenPosition};
use scenedrop::config::EngineConfig;
use scenedrop::events::SessionEvent;
use scenedrop::input::InputEvent;
use scenedrop::listeners::{ListenerKind, SharedListenerHost};
use scenedrop::placement::{PlacementError, PlacementRequest};
use scenedrop::{PlacementOutcome, Session};
use std::cell::RefCell;
use std::rc::Rc;

fn record(file_name: &str, asset_type: &str, x: f32, y: f32) -> PlacedAsset {
    PlacedAsset {
        file_name: file_name.to_string(),
        asset_type: asset_type.to_string(),
        position: ScreenPosition { x, y },
        scale: None,
        y_diff: None,
    }
}

#[test]
fn listeners_live_exactly_as_long_as_the_mount() {
    let host = Rc::new(RefCell::new(RecordingHost::default()));
    let shared: SharedListenerHost = host.clone();
    let mut session = Session::new(
        EngineConfig::default(),
        Box::new(CubeLoader::default()),
        Box::new(RecordingRenderer::default()),
        shared,
    );
    assert!(host.borrow().active.is_empty());

    assert!(session.mount());
    assert!(!session.mount());
    let kinds: Vec<ListenerKind> = host.borrow().active.iter().map(|(_, kind)| *kind).collect();
    assert_eq!(kinds, vec![ListenerKind::Resize, ListenerKind::Key]);

    session.unmount();
    assert!(host.borrow().active.is_empty());
    assert_eq!(host.borrow().removed.len(), 2);

    assert!(session.mount());
    assert_eq!(host.borrow().active.len(), 2);
    drop(session);
    assert!(host.borrow().active.is_empty());
}

#[test]
fn unmount_destroys_everything() {
    let (mut session, _) = session_with(CubeLoader::default());
    session.place(PlacementRequest::new("gltf", "Box.gltf", Vec2::new(400.0, 300.0))).expect("box");
    session.place(PlacementRequest::new("glb", "Soldier.glb", Vec2::new(300.0, 300.0))).expect("soldier");
    run_frames(&mut session, 5);
    assert!(session.controller().target().is_some());

    assert!(session.unmount());
    assert!(session.world().is_none());
    assert!(session.controller().target().is_none());
    assert_eq!(session.listener_count(), 0);
    let err = session.place(PlacementRequest::new("gltf", "Box.gltf", Vec2::ZERO)).expect_err("unmounted");
    assert_eq!(err, PlacementError::NotMounted);
    assert!(session.handle_input(&InputEvent::character("w", true)).is_empty());
}

#[test]
fn loads_finishing_after_unmount_are_discarded() {
    let loader = DeferredLoader::default();
    let gate = loader.gate();
    let (mut session, _) = session_with(loader);
    let ticket = session.request_placement(PlacementRequest::new("gltf", "Box.gltf", Vec2::new(400.0, 300.0))).expect("requested");
    session.frame(common::FRAME_DT);

    session.unmount();
    gate.set(true);
    let outcomes = session.poll_placements();
    assert_eq!(outcomes, vec![PlacementOutcome::Discarded { ticket, file_name: "Box.gltf".into() }]);
    assert!(session.drain_events().contains(&SessionEvent::PlacementDiscarded { file_name: "Box.gltf".into() }));

    // A remount is a new session; the old load never lands in it.
    assert!(session.mount());
    assert!(session.world().expect("mounted").bindings().is_empty());
}

#[test]
fn loads_from_a_previous_mount_never_reach_a_new_one() {
    let loader = DeferredLoader::default();
    let gate = loader.gate();
    let (mut session, _) = session_with(loader);
    session.request_placement(PlacementRequest::new("gltf", "Box.gltf", Vec2::new(400.0, 300.0))).expect("requested");
    session.unmount();
    session.mount();

    gate.set(true);
    run_frames(&mut session, 2);
    assert!(session.world().expect("mounted").bindings().is_empty());
    assert_eq!(session.pending_placements(), 0);
}

#[test]
fn sync_places_new_records_and_skips_known_ones() {
    let loader = CubeLoader::default();
    let loads = loader.loads();
    let (mut session, _) = session_with(loader);
    let mut records = vec![record("Box.gltf", "gltf", 400.0, 300.0), record("Cat.glb", "glb", 200.0, 300.0)];

    assert_eq!(session.sync_placements(&records).expect("mounted"), 2);
    session.frame(common::FRAME_DT);
    assert_eq!(session.world().expect("mounted").bindings().len(), 2);

    assert_eq!(session.sync_placements(&records).expect("mounted"), 0);
    assert_eq!(loads.get(), 2);

    records.push(record("Buggy.gltf", "gltf", 600.0, 300.0));
    assert_eq!(session.sync_placements(&records).expect("mounted"), 1);
    session.frame(common::FRAME_DT);
    assert_eq!(session.world().expect("mounted").bindings().len(), 3);
}

#[test]
fn sync_replaces_changed_records_and_drops_removed_ones() {
    let (mut session, _) = session_with(CubeLoader::default());
    let records = vec![record("Box.gltf", "gltf", 400.0, 300.0), record("Cat.glb", "glb", 200.0, 300.0)];
    session.sync_placements(&records).expect("mounted");
    session.frame(common::FRAME_DT);
    let before: Vec<_> = session.world().expect("mounted").bindings().ids().to_vec();

    let changed = vec![record("Box.gltf", "gltf", 100.0, 100.0)];
    assert_eq!(session.sync_placements(&changed).expect("mounted"), 1);
    session.frame(common::FRAME_DT);

    let world = session.world().expect("mounted");
    assert_eq!(world.bindings().len(), 1);
    for id in before {
        assert!(world.entity(id).is_none());
    }
}

#[test]
fn superseded_sync_loads_are_discarded() {
    let loader = DeferredLoader::default();
    let gate = loader.gate();
    let (mut session, _) = session_with(loader);
    session.sync_placements(&[record("Box.gltf", "gltf", 400.0, 300.0)]).expect("mounted");
    session.sync_placements(&[record("Box.gltf", "gltf", 100.0, 100.0)]).expect("mounted");

    gate.set(true);
    let outcomes = session.poll_placements();
    assert_eq!(outcomes.len(), 2);
    assert!(matches!(outcomes[0], PlacementOutcome::Discarded { .. }));
    assert!(outcomes[1].placed().is_some());
    assert_eq!(session.world().expect("mounted").bindings().len(), 1);
}

#[test]
fn resize_events_reach_the_viewport() {
    let (mut session, _) = session_with(CubeLoader::default());
    session.handle_input(&InputEvent::Resize { width: 1024, height: 768 });
    assert_eq!((session.viewport().width, session.viewport().height), (1024, 768));
}
