mod bind_group;
mod buffer;
mod context;
mod texture;

pub use self::{
    bind_group::{BindGroupBuilder, BindGroupLayoutBuilder},
    buffer::{BufferExt, BulkBufferBuilder},
    context::Context,
    texture::{Texture, TextureBuilder},
};
