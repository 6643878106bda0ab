// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod app_dirs;
pub mod clip;
pub mod clock;
pub mod config;
pub mod controller;
pub mod evaluator;
pub mod history;
pub mod manifest;
pub mod playback;
pub mod runtime;
pub mod selection;
pub mod session;
pub mod timers;
pub mod trainer;
