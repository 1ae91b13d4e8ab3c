use anyhow::{Context, Result};
use scenedrop::assets::GltfModelLoader;
use scenedrop::catalog::load_placements;
use scenedrop::cli::CliOverrides;
use scenedrop::config::EngineConfig;
use scenedrop::listeners::NullListenerHost;
use scenedrop::render::HeadlessRenderer;
use scenedrop::time::Time;
use scenedrop::Session;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_TICKS: u32 = 600;
const FIXED_FRAME_DELTA: f32 = 1.0 / 60.0;

fn main() {
    init_tracing();
    let cli = match CliOverrides::parse_from_env() {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("[cli] {err}");
            std::process::exit(2);
        }
    };
    if let Err(err) = run(&cli) {
        eprintln!("Application error: {err:?}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).compact().init();
}

fn run(cli: &CliOverrides) -> Result<()> {
    let mut config = match cli.config() {
        Some(path) => EngineConfig::load_or_default(path),
        None => EngineConfig::default(),
    };
    let overrides = cli.config_overrides();
    if !overrides.is_empty() {
        info!(target: "config", fields = ?overrides.applied_fields(), "CLI overrides applied");
    }
    config.apply_overrides(&overrides);

    let placements = match cli.scene() {
        Some(path) => load_placements(path).with_context(|| format!("Loading scene {}", path.display()))?,
        None => Vec::new(),
    };

    let loader = GltfModelLoader::new(&config.assets.root);
    let mut session =
        Session::new(config, Box::new(loader), Box::new(HeadlessRenderer::new()), NullListenerHost::shared());
    session.mount();
    let requested = session.sync_placements(&placements)?;
    info!(target: "placement", requested, "scene records queued");

    let ticks = cli.ticks().unwrap_or(DEFAULT_TICKS);
    let mut time = Time::new();
    for _ in 0..ticks {
        let dt = if cli.realtime() {
            std::thread::sleep(Duration::from_secs_f32(FIXED_FRAME_DELTA));
            time.tick()
        } else {
            FIXED_FRAME_DELTA
        };
        session.frame(dt);
        for event in session.drain_events() {
            info!(target: "placement", "{event}");
        }
    }
    if session.pending_placements() > 0 {
        warn!(target: "placement", pending = session.pending_placements(), "loads still in flight at exit");
    }

    if let Some(world) = session.world() {
        world.for_each(|row| {
            let pose = world.physics().body_pose(row.body);
            info!(target: "physics", id = %row.id, file = %row.file_name, pose = ?pose, "final pose");
        });
    }
    info!(target: "physics", ticks = session.ticks(), "run finished");
    session.unmount();
    Ok(())
}
