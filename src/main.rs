mod app;
mod camera;
mod gfx;
mod math;
mod profiler;
mod render;
mod scene;
mod voxel;
mod worldgen;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let debug = std::env::args().any(|arg| arg == "--debug");
    let app = pollster::block_on(app::App::new(1280, 720, "brickray", debug))?;
    app.run()
}
