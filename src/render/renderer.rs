use anyhow::Result;
use glam::Mat4;

use crate::{
    camera::CameraController,
    gfx::{self, BindGroupBuilder, BindGroupLayoutBuilder, Texture, TextureBuilder},
    scene::{CommitOutput, HiZData, Scene},
};

use super::{hiz::HiZPyramid, scene_buffers::SceneBuffers};

/// The frame's render targets, recreated on resize. All are written by
/// compute passes, so every format here must be storage-capable; the
/// weight sum therefore rides in r32float.
struct RenderTargets {
    gbuffer_depth: Texture,
    gbuffer_normal: Texture,
    gbuffer_material: Texture,
    gbuffer_worldpos: Texture,
    accum_color: Texture,
    accum_weight: Texture,
    opaque: Texture,
    present: Texture,
}

impl RenderTargets {
    fn new(context: &gfx::Context) -> Result<Self> {
        let (width, height) = (context.size.width, context.size.height);
        let storage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::STORAGE_BINDING;
        let compute_visible = wgpu::ShaderStages::COMPUTE;

        let target = |format: wgpu::TextureFormat| {
            TextureBuilder::new()
                .with_size(width, height, 1)
                .with_format(format)
                .with_usage(storage)
                .with_shader_visibility(compute_visible)
                .build(context)
        };

        Ok(Self {
            gbuffer_depth: target(wgpu::TextureFormat::Rgba32Float)?,
            gbuffer_normal: target(wgpu::TextureFormat::Rgba16Float)?,
            gbuffer_material: target(wgpu::TextureFormat::Rgba32Float)?,
            gbuffer_worldpos: target(wgpu::TextureFormat::Rgba32Float)?,
            accum_color: target(wgpu::TextureFormat::Rgba16Float)?,
            accum_weight: target(wgpu::TextureFormat::R32Float)?,
            opaque: target(wgpu::TextureFormat::Rgba8Unorm)?,
            present: TextureBuilder::new()
                .with_size(width, height, 1)
                .with_format(wgpu::TextureFormat::Rgba8Unorm)
                .with_usage(storage)
                .with_shader_visibility(
                    wgpu::ShaderStages::FRAGMENT | wgpu::ShaderStages::COMPUTE,
                )
                .build(context)?,
        })
    }
}

/// Encodes the frame: raytrace -> Hi-Z reduce -> lighting -> OIT resolve ->
/// blit. Owns the pipelines, the scene buffers and the render targets; the
/// app drives it strictly in the Update then Render-Encode order.
pub struct Renderer {
    targets: RenderTargets,
    scene_buffers: SceneBuffers,
    hiz: HiZPyramid,

    raytrace_layout: wgpu::BindGroupLayout,
    raytrace_pipeline: wgpu::ComputePipeline,
    raytrace_bind_group: wgpu::BindGroup,

    lighting_layout: wgpu::BindGroupLayout,
    lighting_pipeline: wgpu::ComputePipeline,
    lighting_bind_group: wgpu::BindGroup,

    resolve_layout: wgpu::BindGroupLayout,
    resolve_pipeline: wgpu::ComputePipeline,
    resolve_bind_group: wgpu::BindGroup,

    blit_pipeline: wgpu::RenderPipeline,
}

impl Renderer {
    pub fn new(context: &gfx::Context, camera: &CameraController) -> Result<Self> {
        let targets = RenderTargets::new(context)?;
        let scene_buffers = SceneBuffers::new(context);
        let hiz = HiZPyramid::new(context, &targets.gbuffer_depth.view)?;

        log::info!("Creating raytrace pipeline...");
        let raytrace_shader = context
            .device
            .create_shader_module(wgpu::include_wgsl!("../../assets/shaders/raytrace.wgsl"));
        let raytrace_layout = BindGroupLayoutBuilder::new()
            .with_label("Raytrace BGL")
            .with_uniform_entry(wgpu::ShaderStages::COMPUTE)
            .with_ro_storage_entry(wgpu::ShaderStages::COMPUTE) // instances
            .with_ro_storage_entry(wgpu::ShaderStages::COMPUTE) // sectors
            .with_ro_storage_entry(wgpu::ShaderStages::COMPUTE) // bricks
            .with_ro_storage_entry(wgpu::ShaderStages::COMPUTE) // payload
            .with_ro_storage_entry(wgpu::ShaderStages::COMPUTE) // sector grids
            .with_ro_storage_entry(wgpu::ShaderStages::COMPUTE) // materials
            .with_ro_storage_entry(wgpu::ShaderStages::COMPUTE) // tlas
            .with_storage_texture_entry(
                wgpu::ShaderStages::COMPUTE,
                wgpu::TextureFormat::Rgba32Float,
                wgpu::StorageTextureAccess::WriteOnly,
            )
            .with_storage_texture_entry(
                wgpu::ShaderStages::COMPUTE,
                wgpu::TextureFormat::Rgba16Float,
                wgpu::StorageTextureAccess::WriteOnly,
            )
            .with_storage_texture_entry(
                wgpu::ShaderStages::COMPUTE,
                wgpu::TextureFormat::Rgba32Float,
                wgpu::StorageTextureAccess::WriteOnly,
            )
            .with_storage_texture_entry(
                wgpu::ShaderStages::COMPUTE,
                wgpu::TextureFormat::Rgba32Float,
                wgpu::StorageTextureAccess::WriteOnly,
            )
            .with_storage_texture_entry(
                wgpu::ShaderStages::COMPUTE,
                wgpu::TextureFormat::Rgba16Float,
                wgpu::StorageTextureAccess::WriteOnly,
            )
            .with_storage_texture_entry(
                wgpu::ShaderStages::COMPUTE,
                wgpu::TextureFormat::R32Float,
                wgpu::StorageTextureAccess::WriteOnly,
            )
            .build(context);
        let raytrace_pipeline =
            context
                .device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some("Raytrace Pipeline"),
                    layout: Some(&context.device.create_pipeline_layout(
                        &wgpu::PipelineLayoutDescriptor {
                            label: Some("Raytrace PL"),
                            bind_group_layouts: &[&raytrace_layout],
                            push_constant_ranges: &[],
                        },
                    )),
                    module: &raytrace_shader,
                    entry_point: "trace",
                });

        log::info!("Creating lighting pipeline...");
        let lighting_shader = context
            .device
            .create_shader_module(wgpu::include_wgsl!("../../assets/shaders/lighting.wgsl"));
        let lighting_layout = BindGroupLayoutBuilder::new()
            .with_label("Lighting BGL")
            .with_uniform_entry(wgpu::ShaderStages::COMPUTE)
            .with_ro_storage_entry(wgpu::ShaderStages::COMPUTE) // lights
            .with_unfiltered_texture_entry(wgpu::ShaderStages::COMPUTE) // depth
            .with_unfiltered_texture_entry(wgpu::ShaderStages::COMPUTE) // normal
            .with_unfiltered_texture_entry(wgpu::ShaderStages::COMPUTE) // material
            .with_unfiltered_texture_entry(wgpu::ShaderStages::COMPUTE) // world pos
            .with_storage_texture_entry(
                wgpu::ShaderStages::COMPUTE,
                wgpu::TextureFormat::Rgba8Unorm,
                wgpu::StorageTextureAccess::WriteOnly,
            )
            .build(context);
        let lighting_pipeline =
            context
                .device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some("Lighting Pipeline"),
                    layout: Some(&context.device.create_pipeline_layout(
                        &wgpu::PipelineLayoutDescriptor {
                            label: Some("Lighting PL"),
                            bind_group_layouts: &[&lighting_layout],
                            push_constant_ranges: &[],
                        },
                    )),
                    module: &lighting_shader,
                    entry_point: "shade",
                });

        log::info!("Creating resolve pipeline...");
        let resolve_shader = context
            .device
            .create_shader_module(wgpu::include_wgsl!("../../assets/shaders/resolve.wgsl"));
        let resolve_layout = BindGroupLayoutBuilder::new()
            .with_label("Resolve BGL")
            .with_unfiltered_texture_entry(wgpu::ShaderStages::COMPUTE) // opaque
            .with_unfiltered_texture_entry(wgpu::ShaderStages::COMPUTE) // accum color
            .with_unfiltered_texture_entry(wgpu::ShaderStages::COMPUTE) // accum weight
            .with_storage_texture_entry(
                wgpu::ShaderStages::COMPUTE,
                wgpu::TextureFormat::Rgba8Unorm,
                wgpu::StorageTextureAccess::WriteOnly,
            )
            .build(context);
        let resolve_pipeline =
            context
                .device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some("Resolve Pipeline"),
                    layout: Some(&context.device.create_pipeline_layout(
                        &wgpu::PipelineLayoutDescriptor {
                            label: Some("Resolve PL"),
                            bind_group_layouts: &[&resolve_layout],
                            push_constant_ranges: &[],
                        },
                    )),
                    module: &resolve_shader,
                    entry_point: "resolve",
                });

        log::info!("Creating blit pipeline...");
        let blit_shader = context
            .device
            .create_shader_module(wgpu::include_wgsl!("../../assets/shaders/blit.wgsl"));
        let blit_pipeline =
            context
                .device
                .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some("Blit Quad"),
                    layout: Some(&context.device.create_pipeline_layout(
                        &wgpu::PipelineLayoutDescriptor {
                            label: Some("Blit PL"),
                            bind_group_layouts: &[&targets.present.bind_group_layout],
                            push_constant_ranges: &[],
                        },
                    )),
                    vertex: wgpu::VertexState {
                        module: &blit_shader,
                        entry_point: "vertex",
                        buffers: &[],
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &blit_shader,
                        entry_point: "fragment",
                        targets: &[Some(context.surface_config.format.into())],
                    }),
                    primitive: wgpu::PrimitiveState::default(),
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                });

        let raytrace_bind_group = Self::build_raytrace_bind_group(
            context,
            &raytrace_layout,
            camera,
            &scene_buffers,
            &targets,
        )?;
        let lighting_bind_group = Self::build_lighting_bind_group(
            context,
            &lighting_layout,
            camera,
            &scene_buffers,
            &targets,
        )?;
        let resolve_bind_group =
            Self::build_resolve_bind_group(context, &resolve_layout, &targets)?;

        Ok(Self {
            targets,
            scene_buffers,
            hiz,
            raytrace_layout,
            raytrace_pipeline,
            raytrace_bind_group,
            lighting_layout,
            lighting_pipeline,
            lighting_bind_group,
            resolve_layout,
            resolve_pipeline,
            resolve_bind_group,
            blit_pipeline,
        })
    }

    fn build_raytrace_bind_group(
        context: &gfx::Context,
        layout: &wgpu::BindGroupLayout,
        camera: &CameraController,
        buffers: &SceneBuffers,
        targets: &RenderTargets,
    ) -> Result<wgpu::BindGroup> {
        BindGroupBuilder::new()
            .with_label("Raytrace BG")
            .with_layout(layout)
            .with_entry(camera.get_buffer().as_entire_binding())
            .with_entry(buffers.instances_buffer().as_entire_binding())
            .with_entry(buffers.sectors_buffer().as_entire_binding())
            .with_entry(buffers.bricks_buffer().as_entire_binding())
            .with_entry(buffers.payload_buffer().as_entire_binding())
            .with_entry(buffers.grids_buffer().as_entire_binding())
            .with_entry(buffers.materials_buffer().as_entire_binding())
            .with_entry(buffers.tlas_buffer().as_entire_binding())
            .with_entry(wgpu::BindingResource::TextureView(
                &targets.gbuffer_depth.view,
            ))
            .with_entry(wgpu::BindingResource::TextureView(
                &targets.gbuffer_normal.view,
            ))
            .with_entry(wgpu::BindingResource::TextureView(
                &targets.gbuffer_material.view,
            ))
            .with_entry(wgpu::BindingResource::TextureView(
                &targets.gbuffer_worldpos.view,
            ))
            .with_entry(wgpu::BindingResource::TextureView(
                &targets.accum_color.view,
            ))
            .with_entry(wgpu::BindingResource::TextureView(
                &targets.accum_weight.view,
            ))
            .build(context)
    }

    fn build_lighting_bind_group(
        context: &gfx::Context,
        layout: &wgpu::BindGroupLayout,
        camera: &CameraController,
        buffers: &SceneBuffers,
        targets: &RenderTargets,
    ) -> Result<wgpu::BindGroup> {
        BindGroupBuilder::new()
            .with_label("Lighting BG")
            .with_layout(layout)
            .with_entry(camera.get_buffer().as_entire_binding())
            .with_entry(buffers.lights_buffer().as_entire_binding())
            .with_entry(wgpu::BindingResource::TextureView(
                &targets.gbuffer_depth.view,
            ))
            .with_entry(wgpu::BindingResource::TextureView(
                &targets.gbuffer_normal.view,
            ))
            .with_entry(wgpu::BindingResource::TextureView(
                &targets.gbuffer_material.view,
            ))
            .with_entry(wgpu::BindingResource::TextureView(
                &targets.gbuffer_worldpos.view,
            ))
            .with_entry(wgpu::BindingResource::TextureView(&targets.opaque.view))
            .build(context)
    }

    fn build_resolve_bind_group(
        context: &gfx::Context,
        layout: &wgpu::BindGroupLayout,
        targets: &RenderTargets,
    ) -> Result<wgpu::BindGroup> {
        BindGroupBuilder::new()
            .with_label("Resolve BG")
            .with_layout(layout)
            .with_entry(wgpu::BindingResource::TextureView(&targets.opaque.view))
            .with_entry(wgpu::BindingResource::TextureView(
                &targets.accum_color.view,
            ))
            .with_entry(wgpu::BindingResource::TextureView(
                &targets.accum_weight.view,
            ))
            .with_entry(wgpu::BindingResource::TextureView(&targets.present.view))
            .build(context)
    }

    fn rebuild_scene_bind_groups(
        &mut self,
        context: &gfx::Context,
        camera: &CameraController,
    ) -> Result<()> {
        self.raytrace_bind_group = Self::build_raytrace_bind_group(
            context,
            &self.raytrace_layout,
            camera,
            &self.scene_buffers,
            &self.targets,
        )?;
        self.lighting_bind_group = Self::build_lighting_bind_group(
            context,
            &self.lighting_layout,
            camera,
            &self.scene_buffers,
            &self.targets,
        )?;
        Ok(())
    }

    /// Recreates the render targets, the Hi-Z chain and every bind group
    /// that references them.
    pub fn resize(&mut self, context: &gfx::Context, camera: &CameraController) -> Result<()> {
        self.targets = RenderTargets::new(context)?;
        self.hiz = HiZPyramid::new(context, &self.targets.gbuffer_depth.view)?;
        self.rebuild_scene_bind_groups(context, camera)?;
        self.resolve_bind_group =
            Self::build_resolve_bind_group(context, &self.resolve_layout, &self.targets)?;
        Ok(())
    }

    /// Last frame's reduced depth for occlusion culling, if available.
    pub fn take_hiz(&mut self, context: &gfx::Context) -> Option<HiZData> {
        self.hiz.take_readback(context)
    }

    /// Update phase: pushes the committed scene into device buffers and
    /// flushes byte-granular edits. All host writes to captured resources
    /// happen here, before the frame's encoder exists.
    pub fn update(
        &mut self,
        context: &gfx::Context,
        camera: &CameraController,
        scene: &Scene,
        commit: &CommitOutput,
    ) -> Result<()> {
        let recreated = self.scene_buffers.update_scene(context, scene, commit);
        self.scene_buffers.flush_edits(context, scene);
        if recreated {
            log::info!("Scene buffers recreated; rebuilding bind groups");
            self.rebuild_scene_bind_groups(context, camera)?;
        }
        Ok(())
    }

    /// Render-Encode, Submit and Present. `view_proj` is stored with the
    /// Hi-Z dispatch so next frame's occlusion test reprojects correctly.
    pub fn render(&mut self, context: &gfx::Context, view_proj: Mat4) -> Result<()> {
        let frame = match context.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost or outdated; reconfiguring and skipping the frame");
                context
                    .surface
                    .configure(&context.device, &context.surface_config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("Surface acquisition timed out; skipping the frame");
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("Surface acquisition ran out of memory; aborting");
                std::process::exit(1);
            }
            Err(e) => return Err(e.into()),
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor::default());

        let (width, height) = (context.size.width, context.size.height);
        let groups = (width.div_ceil(8), height.div_ceil(8));

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor::default());
            pass.set_pipeline(&self.raytrace_pipeline);
            pass.set_bind_group(0, &self.raytrace_bind_group, &[]);
            pass.dispatch_workgroups(groups.0, groups.1, 1);
        }

        self.hiz.dispatch(&mut encoder, view_proj);

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor::default());
            pass.set_pipeline(&self.lighting_pipeline);
            pass.set_bind_group(0, &self.lighting_bind_group, &[]);
            pass.dispatch_workgroups(groups.0, groups.1, 1);
        }

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor::default());
            pass.set_pipeline(&self.resolve_pipeline);
            pass.set_bind_group(0, &self.resolve_bind_group, &[]);
            pass.dispatch_workgroups(groups.0, groups.1, 1);
        }

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Blit Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            ..Default::default()
        });
        render_pass.set_pipeline(&self.blit_pipeline);
        render_pass.set_bind_group(0, &self.targets.present.bind_group, &[]);
        render_pass.draw(0..6, 0..1);
        drop(render_pass);

        context.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }
}
