use scenedrop::cli::CliOverrides;
use scenedrop::config::{BlendMode, EngineConfig, ProxyPolicy};
use scenedrop::scene::ShadowQuality;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn defaults_describe_the_stock_viewport() {
    let config = EngineConfig::default();
    assert_eq!((config.viewport.width, config.viewport.height), (800, 600));
    assert_eq!(config.physics.gravity, [0.0, -9.82, 0.0]);
    assert_eq!(config.physics.max_frame_delta, 0.1);
    assert_eq!(config.placement.reference_plane_height, 15.0);
    assert_eq!(config.placement.proxy_policy, ProxyPolicy::BoundingBox);
    assert_eq!(config.character.asset, "Soldier.glb");
    assert_eq!(config.character.speed, 10.0);
    assert_eq!(config.character.ground_friction, 0.02);
    assert_eq!(config.character.blend, BlendMode::Switch);

    let environment = config.stage.environment();
    assert_eq!(environment.background, 0xaaaaaa);
    assert!(environment.shadows_enabled);
    assert_eq!(environment.shadow_quality, ShadowQuality::SoftPcf);
}

#[test]
fn partial_files_keep_defaults_for_missing_fields() {
    let mut temp = NamedTempFile::new().expect("temp config");
    write!(
        temp,
        r#"{{"physics":{{"gravity":[0,-20,0]}},"character":{{"speed":4,"blend":"crossfade"}},"stage":{{"wall":false}}}}"#
    )
    .expect("write config");

    let config = EngineConfig::load(temp.path()).expect("load config");
    assert_eq!(config.physics.gravity, [0.0, -20.0, 0.0]);
    assert_eq!(config.physics.max_substep, 1.0 / 60.0);
    assert_eq!(config.character.speed, 4.0);
    assert_eq!(config.character.blend, BlendMode::Crossfade);
    assert_eq!(config.character.crossfade_seconds, 0.2);
    assert!(!config.stage.wall);
    assert!(config.stage.ground);
    assert_eq!(config.viewport.width, 800);
}

#[test]
fn unreadable_files_fall_back_to_defaults() {
    let mut temp = NamedTempFile::new().expect("temp config");
    write!(temp, "[1, 2").expect("write config");
    assert!(EngineConfig::load(temp.path()).is_err());
    let config = EngineConfig::load_or_default(temp.path());
    assert_eq!(config.viewport.width, 800);
    let config = EngineConfig::load_or_default("/no/such/config.json");
    assert_eq!(config.character.asset, "Soldier.glb");
}

#[test]
fn cli_overrides_apply_on_top_of_the_file() {
    let cli = CliOverrides::parse(["scenedrop", "--width", "1280", "--assets", "/srv/assets"]).expect("parse");
    let overrides = cli.config_overrides();
    assert_eq!(overrides.applied_fields(), vec!["width", "assets"]);

    let mut config = EngineConfig::default();
    config.apply_overrides(&overrides);
    assert_eq!(config.viewport.width, 1280);
    assert_eq!(config.viewport.height, 600);
    assert_eq!(config.assets.root, "/srv/assets");
}
