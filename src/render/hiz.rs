use anyhow::Result;
use glam::Mat4;

use crate::{
    gfx::{BindGroupBuilder, BindGroupLayoutBuilder, BufferExt, Context, Texture, TextureBuilder},
    scene::HiZData,
};

/// Largest width of the mip that gets read back for CPU culling.
const READBACK_MAX_WIDTH: u32 = 64;

/// Max-reduction depth pyramid. Each frame the G-buffer depth (linear ray
/// distance) is reduced down the mip chain and one coarse level is copied
/// into a mappable buffer. The host maps it with a synchronous poll one
/// frame later, by which point the copy has normally completed and the
/// wait is negligible.
pub struct HiZPyramid {
    pyramid: Texture,
    mip_sizes: Vec<(u32, u32)>,
    readback_mip: u32,
    padded_bytes_per_row: u32,
    readback_buffer: wgpu::Buffer,
    pipeline: wgpu::ComputePipeline,
    bind_groups: Vec<wgpu::BindGroup>,
    viewport: (u32, u32),
    /// View-projection captured at dispatch; present while a readback is in
    /// flight.
    pending: Option<Mat4>,
}

impl HiZPyramid {
    pub fn new(context: &Context, depth_view: &wgpu::TextureView) -> Result<Self> {
        let (width, height) = (context.size.width, context.size.height);
        let mip_count = 32 - width.max(height).leading_zeros();

        let pyramid = TextureBuilder::new()
            .with_size(width, height, 1)
            .with_format(wgpu::TextureFormat::R32Float)
            .with_usage(
                wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::STORAGE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
            )
            .with_mip_level_count(mip_count)
            .with_shader_visibility(wgpu::ShaderStages::COMPUTE)
            .build(context)?;

        let mip_sizes: Vec<(u32, u32)> = (0..mip_count)
            .map(|level| ((width >> level).max(1), (height >> level).max(1)))
            .collect();
        let readback_mip = mip_sizes
            .iter()
            .position(|&(w, _)| w <= READBACK_MAX_WIDTH)
            .unwrap_or(mip_sizes.len() - 1) as u32;
        let (rb_width, rb_height) = mip_sizes[readback_mip as usize];

        // COPY_BYTES_PER_ROW_ALIGNMENT padding for the texture-to-buffer copy.
        let padded_bytes_per_row = (rb_width * 4).next_multiple_of(256);
        let readback_buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Hi-Z Readback"),
            size: padded_bytes_per_row as u64 * rb_height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let shader = context
            .device
            .create_shader_module(wgpu::include_wgsl!("../../assets/shaders/hiz_reduce.wgsl"));
        let layout = BindGroupLayoutBuilder::new()
            .with_label("Hi-Z Reduce BGL")
            .with_unfiltered_texture_entry(wgpu::ShaderStages::COMPUTE)
            .with_storage_texture_entry(
                wgpu::ShaderStages::COMPUTE,
                wgpu::TextureFormat::R32Float,
                wgpu::StorageTextureAccess::WriteOnly,
            )
            .build(context);
        let pipeline = context
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Hi-Z Reduce Pipeline"),
                layout: Some(&context.device.create_pipeline_layout(
                    &wgpu::PipelineLayoutDescriptor {
                        label: Some("Hi-Z Reduce PL"),
                        bind_group_layouts: &[&layout],
                        push_constant_ranges: &[],
                    },
                )),
                module: &shader,
                entry_point: "reduce",
            });

        // Step 0 reads the G-buffer depth into mip 0; step N reads mip N-1.
        let mut bind_groups = Vec::with_capacity(mip_count as usize);
        for level in 0..mip_count {
            let src = if level == 0 {
                None
            } else {
                Some(pyramid.mip_view(level - 1))
            };
            let dst = pyramid.mip_view(level);
            let bind_group = BindGroupBuilder::new()
                .with_label("Hi-Z Reduce BG")
                .with_layout(&layout)
                .with_entry(wgpu::BindingResource::TextureView(
                    src.as_ref().unwrap_or(depth_view),
                ))
                .with_entry(wgpu::BindingResource::TextureView(&dst))
                .build(context)?;
            bind_groups.push(bind_group);
        }

        Ok(Self {
            pyramid,
            mip_sizes,
            readback_mip,
            padded_bytes_per_row,
            readback_buffer,
            pipeline,
            bind_groups,
            viewport: (width, height),
            pending: None,
        })
    }

    /// Encodes the reduction chain and the readback copy of the chosen mip.
    /// `view_proj` is the matrix the depth was rendered with; the host pairs
    /// it with the data when it arrives next frame.
    pub fn dispatch(&mut self, encoder: &mut wgpu::CommandEncoder, view_proj: Mat4) {
        for (level, bind_group) in self.bind_groups.iter().enumerate() {
            let (w, h) = self.mip_sizes[level];
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor::default());
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(w.div_ceil(8), h.div_ceil(8), 1);
        }

        let (rb_width, rb_height) = self.mip_sizes[self.readback_mip as usize];
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.pyramid.texture,
                mip_level: self.readback_mip,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &self.readback_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(rb_height),
                },
            },
            wgpu::Extent3d {
                width: rb_width,
                height: rb_height,
                depth_or_array_layers: 1,
            },
        );
        self.pending = Some(view_proj);
    }

    /// Collects last frame's reduced depth, if a dispatch is in flight.
    /// Polls the device until the map completes; the one-frame delay means
    /// the copy is normally already done.
    pub fn take_readback(&mut self, context: &Context) -> Option<HiZData> {
        let view_proj = self.pending.take()?;
        let (rb_width, rb_height) = self.mip_sizes[self.readback_mip as usize];

        let bytes: Vec<u8> =
            self.readback_buffer
                .get_mapped_range(context, 0..self.readback_buffer.size());
        let mut depth = Vec::with_capacity((rb_width * rb_height) as usize);
        for row in 0..rb_height {
            let start = (row * self.padded_bytes_per_row) as usize;
            let row_bytes = &bytes[start..start + (rb_width * 4) as usize];
            depth.extend(
                row_bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
            );
        }

        Some(HiZData {
            width: rb_width,
            height: rb_height,
            viewport_width: self.viewport.0 as f32,
            viewport_height: self.viewport.1 as f32,
            depth,
            view_proj,
        })
    }
}
