use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Result;
use glam::Vec2;
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, MouseButton, WindowEvent},
    event_loop::EventLoop,
    window::WindowBuilder,
};

use crate::{
    camera::{Camera, CameraController, Projection},
    gfx,
    profiler::Profiler,
    render::Renderer,
    scene::{self, Frustum, Scene},
    voxel::Brush,
    worldgen,
};

/// A queued brush gesture. Edits captured during Input only touch the scene
/// in the next Update phase, never while an encoder is alive.
struct EditRequest {
    mouse: Vec2,
    erase: bool,
}

pub struct App {
    window: Arc<winit::window::Window>,
    event_loop: EventLoop<()>,
    context: gfx::Context<'static>,
    renderer: Renderer,
    camera_controller: CameraController,
    scene: Scene,
    profiler: Profiler,
    debug: bool,
}

impl App {
    pub async fn new(width: u32, height: u32, title: &str, debug: bool) -> Result<Self> {
        log::info!("Initialising window...");
        let size = PhysicalSize::new(width, height);
        let event_loop = EventLoop::new()?;
        let window = Arc::new(
            WindowBuilder::new()
                .with_title(title)
                .with_inner_size(size)
                .build(&event_loop)?,
        );

        // The traversal pass binds more storage slots than the WebGPU
        // defaults allow.
        let limits = wgpu::Limits {
            max_storage_buffers_per_shader_stage: 8,
            max_storage_textures_per_shader_stage: 8,
            ..Default::default()
        };
        let context = gfx::Context::new(window.clone(), limits).await?;

        let camera_controller = CameraController::new(
            &context,
            Camera::new(
                glam::vec3(0.0, 12.0, 24.0),
                -90.0_f32.to_radians(),
                -15.0_f32.to_radians(),
            ),
            Projection::new(width, height, 90.0_f32.to_radians(), 0.1, 1000.0),
            16.0,
        );

        log::info!("Generating demo scene...");
        let scene = worldgen::build_demo_scene(&worldgen::GenerationSettings::default());

        let renderer = Renderer::new(&context, &camera_controller)?;

        Ok(Self {
            window,
            event_loop,
            context,
            renderer,
            camera_controller,
            scene,
            profiler: Profiler::new(debug),
            debug,
        })
    }

    pub fn run(self) -> Result<()> {
        let App {
            window,
            event_loop,
            mut context,
            mut renderer,
            mut camera_controller,
            mut scene,
            mut profiler,
            debug,
        } = self;

        let brush = Brush::Sphere { radius: 3.0 };
        let mut mouse_pos = Vec2::ZERO;
        let mut pending_edits: Vec<EditRequest> = Vec::new();
        let mut last_frame = Instant::now();

        event_loop.run(move |event, elwt| {
            let event = match event {
                Event::WindowEvent {
                    window_id,
                    ref event,
                } if window_id == window.id() => event,
                Event::AboutToWait => {
                    window.request_redraw();
                    return;
                }
                _ => return,
            };

            if context.handle_window_event(event, elwt) {
                if matches!(
                    event,
                    WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. }
                ) {
                    // The surface was reconfigured; the render targets and
                    // camera aspect must follow the new size.
                    camera_controller.resize(context.size.width, context.size.height);
                    if let Err(e) = renderer.resize(&context, &camera_controller) {
                        log::error!("Failed to resize render targets: {e:#}");
                    }
                }
                return;
            }

            match event {
                WindowEvent::RedrawRequested => {
                    let now = Instant::now();
                    let dt = now - last_frame;
                    last_frame = now;
                    if let Err(e) = run_frame(
                        &context,
                        &mut renderer,
                        &mut camera_controller,
                        &mut scene,
                        &mut profiler,
                        &mut pending_edits,
                        &brush,
                        debug,
                        dt,
                    ) {
                        log::error!("Frame failed: {e:#}");
                    }
                }
                WindowEvent::CursorMoved { position, .. } => {
                    mouse_pos = Vec2::new(position.x as f32, position.y as f32);
                }
                WindowEvent::MouseInput {
                    state: ElementState::Pressed,
                    button,
                    ..
                } => match button {
                    MouseButton::Left => pending_edits.push(EditRequest {
                        mouse: mouse_pos,
                        erase: false,
                    }),
                    MouseButton::Right => pending_edits.push(EditRequest {
                        mouse: mouse_pos,
                        erase: true,
                    }),
                    _ => {}
                },
                _ => {
                    camera_controller.process_events(event);
                }
            }
        })?;

        Ok(())
    }
}

/// One frame: Update (edits, commit, uploads) then Render-Encode, Submit,
/// Present. Every host write to a device buffer happens before the encoder
/// is created; that ordering is the edit frame barrier.
#[allow(clippy::too_many_arguments)]
fn run_frame(
    context: &gfx::Context,
    renderer: &mut Renderer,
    camera_controller: &mut CameraController,
    scene: &mut Scene,
    profiler: &mut Profiler,
    pending_edits: &mut Vec<EditRequest>,
    brush: &Brush,
    debug: bool,
    dt: Duration,
) -> Result<()> {
    profiler.begin_phase("edit");
    let viewport = Vec2::new(context.size.width as f32, context.size.height as f32);
    for edit in pending_edits.drain(..) {
        let (origin, dir) = scene::pick_ray(edit.mouse, viewport, camera_controller.camera());
        if let Some(hit) = scene::pick(scene, origin, dir) {
            let value = if edit.erase { 0 } else { 1 };
            scene::apply_brush(scene, &hit, brush, value);
        }
    }

    profiler.begin_phase("commit");
    camera_controller.update(dt);
    let hiz = renderer.take_hiz(context);
    let view_proj = camera_controller.view_proj();
    let frustum = Frustum::from_view_proj(&view_proj);
    let commit = scene::commit_scene(scene, &frustum, hiz.as_ref());

    profiler.begin_phase("upload");
    let light_hint = scene
        .lights
        .first()
        .map(|l| l.position)
        .unwrap_or(glam::Vec3::ZERO);
    camera_controller.update_buffer(
        context,
        light_hint,
        scene.ambient,
        debug as u32,
        0,
        scene.lights.len() as u32,
    );
    renderer.update(context, camera_controller, scene, &commit)?;

    profiler.begin_phase("render");
    renderer.render(context, view_proj)?;
    profiler.end_frame();
    Ok(())
}
