pub mod app;
pub mod assembly;
pub mod atlas;
pub mod camera;
pub mod cli;
pub mod config;
pub mod decoder;
pub mod demo_assets;
pub mod error;
pub mod frame_clock;
pub mod frame_compute;
pub mod geometry;
pub mod highlight;
pub mod instance_state;
pub mod layout;
pub mod logging;
pub mod material;
pub mod mesh_source;
pub mod ping_pong;
pub mod renderer;
pub mod scene;
pub mod time;
pub mod trigger;

pub use app::{run, run_with_overrides, App};
