mod hiz;
mod renderer;
mod scene_buffers;

pub use self::{
    hiz::HiZPyramid,
    renderer::Renderer,
    scene_buffers::{
        serialize_map, BrickRecord, InstanceRecord, LightRecord, MapGeometry, MaterialRecord,
        SceneBuffers, SectorRecord,
    },
};
