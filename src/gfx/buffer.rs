use bytemuck::{NoUninit, Pod};
use wgpu::util::DeviceExt;

use super::Context;

enum BufferSource<'a> {
    Init {
        label: &'a str,
        contents: Vec<u8>,
    },
    Empty {
        label: &'a str,
        size: u64,
        mapped_at_creation: bool,
    },
}

/// Declares a batch of buffers sharing usage runs, then creates them all in
/// order. Keeps the big buffer-creation sites declarative.
pub struct BulkBufferBuilder<'a> {
    sources: Vec<(wgpu::BufferUsages, BufferSource<'a>)>,
    current_usage: wgpu::BufferUsages,
}

impl<'a> Default for BulkBufferBuilder<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> BulkBufferBuilder<'a> {
    pub fn new() -> Self {
        Self {
            sources: vec![],
            current_usage: wgpu::BufferUsages::UNIFORM,
        }
    }

    pub fn set_usage(mut self, usage: wgpu::BufferUsages) -> Self {
        self.current_usage = usage;
        self
    }

    pub fn with_init_buffer(mut self, label: &'a str, contents: &[u8]) -> Self {
        self.sources.push((
            self.current_usage,
            BufferSource::Init {
                label,
                contents: contents.to_vec(),
            },
        ));
        self
    }

    pub fn with_init_buffer_bm<A: NoUninit>(self, label: &'a str, contents: &[A]) -> Self {
        self.with_init_buffer(label, bytemuck::cast_slice(contents))
    }

    pub fn with_buffer(mut self, label: &'a str, size: u64, mapped_at_creation: bool) -> Self {
        self.sources.push((
            self.current_usage,
            BufferSource::Empty {
                label,
                size,
                mapped_at_creation,
            },
        ));
        self
    }

    pub fn build(self, context: &Context) -> Vec<wgpu::Buffer> {
        let mut buffers = vec![];
        for (usage, source) in self.sources {
            let buffer = match source {
                BufferSource::Init { label, contents } => {
                    context
                        .device
                        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some(label),
                            contents: &contents,
                            usage,
                        })
                }
                BufferSource::Empty {
                    label,
                    size,
                    mapped_at_creation,
                } => context.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(label),
                    size,
                    usage,
                    mapped_at_creation,
                }),
            };
            buffers.push(buffer);
        }
        buffers
    }
}

pub trait BufferExt {
    /// Maps a MAP_READ buffer range, blocks until the device catches up,
    /// and returns a typed copy of the contents.
    fn get_mapped_range<T: Pod>(&self, context: &Context, range: std::ops::Range<u64>) -> Vec<T>;
}

impl BufferExt for wgpu::Buffer {
    fn get_mapped_range<T: Pod>(&self, context: &Context, range: std::ops::Range<u64>) -> Vec<T> {
        let slice = self.slice(range);
        slice.map_async(wgpu::MapMode::Read, |result| {
            if let Err(e) = result {
                log::error!("Failed to map buffer for reading: {e}");
            }
        });
        context.device.poll(wgpu::Maintain::Wait);

        let data = {
            let view = slice.get_mapped_range();
            bytemuck::cast_slice(&view[..]).to_vec()
        };
        self.unmap();
        data
    }
}
