use super::{BindGroupBuilder, BindGroupLayoutBuilder, Context};

#[derive(Debug, Clone)]
pub struct TextureAttributes {
    pub size: wgpu::Extent3d,
    pub dimension: wgpu::TextureDimension,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
    pub mip_level_count: u32,
    pub address_mode: wgpu::AddressMode,
    pub filter_mode: wgpu::FilterMode,
    pub shader_visibility: wgpu::ShaderStages,
}

impl Default for TextureAttributes {
    fn default() -> Self {
        Self {
            size: Default::default(),
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            mip_level_count: 1,
            address_mode: wgpu::AddressMode::ClampToEdge,
            filter_mode: wgpu::FilterMode::default(),
            shader_visibility: wgpu::ShaderStages::FRAGMENT,
        }
    }
}

#[derive(Debug)]
pub struct TextureBuilder {
    pub attributes: TextureAttributes,
}

impl Default for TextureBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureBuilder {
    pub fn new() -> Self {
        Self {
            attributes: Default::default(),
        }
    }

    #[inline]
    pub fn with_size(mut self, width: u32, height: u32, depth: u32) -> Self {
        self.attributes.size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: depth,
        };
        self
    }

    #[inline]
    pub fn with_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.attributes.format = format;
        self
    }

    #[inline]
    pub fn with_usage(mut self, usage: wgpu::TextureUsages) -> Self {
        self.attributes.usage = usage;
        self
    }

    #[inline]
    pub fn with_mip_level_count(mut self, count: u32) -> Self {
        self.attributes.mip_level_count = count;
        self
    }

    #[inline]
    pub fn with_shader_visibility(mut self, visibility: wgpu::ShaderStages) -> Self {
        self.attributes.shader_visibility = visibility;
        self
    }

    #[inline]
    pub fn build(self, context: &Context) -> anyhow::Result<Texture> {
        Texture::new(context, self.attributes)
    }
}

/// 32-bit float formats sample as non-filterable floats and pair with a
/// non-filtering sampler; everything else this engine uses filters fine.
fn is_filterable(format: wgpu::TextureFormat) -> bool {
    !matches!(
        format,
        wgpu::TextureFormat::R32Float
            | wgpu::TextureFormat::Rg32Float
            | wgpu::TextureFormat::Rgba32Float
    )
}

#[derive(Debug)]
pub struct Texture {
    pub attributes: TextureAttributes,
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub bind_group: wgpu::BindGroup,
}

impl Texture {
    pub fn new(context: &Context, attributes: TextureAttributes) -> anyhow::Result<Self> {
        let texture = context.device.create_texture(&wgpu::TextureDescriptor {
            label: None,
            size: attributes.size,
            mip_level_count: attributes.mip_level_count,
            sample_count: 1,
            dimension: attributes.dimension,
            format: attributes.format,
            usage: attributes.usage,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let filterable = is_filterable(attributes.format);
        let filter_mode = if filterable {
            attributes.filter_mode
        } else {
            wgpu::FilterMode::Nearest
        };
        let sampler = context.device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: attributes.address_mode,
            address_mode_v: attributes.address_mode,
            address_mode_w: attributes.address_mode,
            mag_filter: filter_mode,
            min_filter: filter_mode,
            mipmap_filter: filter_mode,
            ..Default::default()
        });

        let view_dimension = match attributes.dimension {
            wgpu::TextureDimension::D1 => wgpu::TextureViewDimension::D1,
            wgpu::TextureDimension::D2 => wgpu::TextureViewDimension::D2,
            wgpu::TextureDimension::D3 => wgpu::TextureViewDimension::D3,
        };

        let bind_group_layout = BindGroupLayoutBuilder::new()
            .with_entry(
                attributes.shader_visibility,
                wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable },
                    view_dimension,
                    multisampled: false,
                },
                None,
            )
            .with_entry(
                attributes.shader_visibility,
                wgpu::BindingType::Sampler(if filterable {
                    wgpu::SamplerBindingType::Filtering
                } else {
                    wgpu::SamplerBindingType::NonFiltering
                }),
                None,
            )
            .build(context);
        let bind_group = BindGroupBuilder::new()
            .with_layout(&bind_group_layout)
            .with_entry(wgpu::BindingResource::TextureView(&view))
            .with_entry(wgpu::BindingResource::Sampler(&sampler))
            .build(context)?;

        Ok(Self {
            attributes,
            texture,
            view,
            sampler,
            bind_group_layout,
            bind_group,
        })
    }

    /// View of a single mip level; the Hi-Z reduction binds these.
    pub fn mip_view(&self, level: u32) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            base_mip_level: level,
            mip_level_count: Some(1),
            ..Default::default()
        })
    }
}
