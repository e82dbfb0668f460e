//! # Lantern
//!
//! Opens the lighting scene.
//!
//! ```bash
//! cargo run --release -- [shader_dir]
//! ```
//!
//! W/A/S/D move, the mouse looks around, the wheel zooms. Hold Left Ctrl to
//! free the pointer for the "Scene Editor" panel. Escape quits.

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = lantern::AppConfig::from_args(std::env::args().skip(1));
    lantern::run(config)
}
