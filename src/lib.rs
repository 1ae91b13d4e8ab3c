pub mod animation;
pub mod assets;
pub mod binding;
pub mod camera3d;
pub mod catalog;
pub mod character;
pub mod cli;
pub mod config;
pub mod contacts;
pub mod events;
pub mod input;
pub mod listeners;
pub mod model;
pub mod physics;
pub mod picking;
pub mod placement;
pub mod render;
pub mod scene;
pub mod session;
pub mod step_loop;
pub mod time;
pub mod world;

pub use binding::EntityId;
pub use config::EngineConfig;
pub use session::{PlacementOutcome, PlacementTicket, Session};
