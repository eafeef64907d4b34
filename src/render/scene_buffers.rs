use std::collections::HashMap;

use glam::{IVec3, UVec3};

use crate::{
    gfx::{BulkBufferBuilder, Context},
    math::to_1d_index,
    scene::{CommitOutput, Light, LightKind, Material, Scene, VoxelObject},
    voxel::{BrickKey, Sector, XBrickMap},
};

/// Per-instance record bound by the raytrace pass. 256 bytes.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRecord {
    pub object_to_world: [[f32; 4]; 4],
    pub world_to_object: [[f32; 4]; 4],
    pub aabb_min: [f32; 4],
    pub aabb_max: [f32; 4],
    pub world_min: [f32; 4],
    pub world_max: [f32; 4],
    /// Sector-grid origin in sector coordinates; w unused.
    pub grid_min: [i32; 4],
    /// Sector-grid dimensions; w unused.
    pub grid_dims: [u32; 4],
    pub material_base: u32,
    pub material_len: u32,
    pub sector_base: u32,
    pub brick_base: u32,
    pub payload_base: u32,
    pub grid_base: u32,
    pub _pad: [u32; 2],
}

/// One sector on the wire: brick presence mask plus the base index of its
/// packed bricks. 16 bytes.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SectorRecord {
    pub brick_mask_lo: u32,
    pub brick_mask_hi: u32,
    pub brick_base: u32,
    pub _pad: u32,
}

/// One brick on the wire. 16 bytes.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BrickRecord {
    pub occupancy_lo: u32,
    pub occupancy_hi: u32,
    pub atlas_offset: u32,
    pub flags: u32,
}

/// Material table entry. 32 bytes.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialRecord {
    pub base_color: u32,
    pub emissive: u32,
    pub roughness: f32,
    pub metalness: f32,
    pub ior: f32,
    pub transparency: f32,
    pub _pad: [f32; 2],
}

impl From<&Material> for MaterialRecord {
    fn from(m: &Material) -> Self {
        let pack = |c: [u8; 4]| {
            (c[0] as u32) | (c[1] as u32) << 8 | (c[2] as u32) << 16 | (c[3] as u32) << 24
        };
        Self {
            base_color: pack(m.base_color),
            emissive: pack(m.emissive),
            roughness: m.roughness,
            metalness: m.metalness,
            ior: m.ior,
            transparency: m.transparency,
            _pad: [0.0; 2],
        }
    }
}

/// Light record. 64 bytes.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightRecord {
    pub position: [f32; 4],
    pub direction: [f32; 4],
    /// rgb plus intensity in w.
    pub color: [f32; 4],
    /// range, cone cosine, kind, pad.
    pub params: [f32; 4],
}

impl From<&Light> for LightRecord {
    fn from(l: &Light) -> Self {
        Self {
            position: l.position.extend(1.0).to_array(),
            direction: l.direction.extend(0.0).to_array(),
            color: l.color.extend(l.intensity).to_array(),
            params: [
                l.range,
                l.cone_cos,
                match l.kind {
                    LightKind::Directional => 0.0,
                    LightKind::Point => 1.0,
                    LightKind::Spot => 2.0,
                },
                0.0,
            ],
        }
    }
}

/// CPU-side serialization of one map: everything the traversal reads,
/// before the per-map device offsets are applied.
#[derive(Debug)]
pub struct MapGeometry {
    pub sectors: Vec<SectorRecord>,
    pub bricks: Vec<BrickRecord>,
    /// One byte per atlas element; holes from freed slots stay zeroed.
    pub payload: Vec<u8>,
    /// Dense sector indirection over the sector-coordinate bounds:
    /// 0 = absent, otherwise local sector index + 1.
    pub grid: Vec<u32>,
    pub grid_min: IVec3,
    pub grid_dims: UVec3,
    /// Local brick record index per brick key, for byte-granular updates.
    pub brick_index: HashMap<BrickKey, u32>,
}

/// Serializes a map into contiguous records. Sectors are emitted in
/// (z, y, x)-sorted coordinate order, bricks in packed order, so output is
/// deterministic for a given map state.
pub fn serialize_map(map: &XBrickMap) -> MapGeometry {
    let mut coords: Vec<IVec3> = map.sectors().map(|(c, _)| *c).collect();
    coords.sort_by_key(|c| (c.z, c.y, c.x));

    let (grid_min, grid_dims) = match (
        coords.iter().copied().reduce(|a, b| a.min(b)),
        coords.iter().copied().reduce(|a, b| a.max(b)),
    ) {
        (Some(lo), Some(hi)) => (lo, (hi - lo + IVec3::ONE).as_uvec3()),
        _ => (IVec3::ZERO, UVec3::ZERO),
    };
    let grid_len = (grid_dims.x * grid_dims.y * grid_dims.z) as usize;
    if grid_len > 4_000_000 {
        log::warn!("sector grid of {grid_len} cells; map is extremely sparse");
    }

    let mut geometry = MapGeometry {
        sectors: Vec::with_capacity(coords.len()),
        bricks: Vec::with_capacity(map.brick_count()),
        payload: vec![0u8; map.atlas_capacity() as usize],
        grid: vec![0u32; grid_len],
        grid_min,
        grid_dims,
        brick_index: HashMap::new(),
    };

    for (sector_index, coord) in coords.iter().enumerate() {
        let sector: &Sector = map.sector(*coord).expect("coord from live map");
        let grid_cell = to_1d_index((*coord - grid_min).as_uvec3(), grid_dims);
        geometry.grid[grid_cell] = sector_index as u32 + 1;

        geometry.sectors.push(SectorRecord {
            brick_mask_lo: sector.brick_mask as u32,
            brick_mask_hi: (sector.brick_mask >> 32) as u32,
            brick_base: geometry.bricks.len() as u32,
            _pad: 0,
        });

        for (brick_pos, brick) in sector.iter() {
            geometry
                .brick_index
                .insert((*coord, brick_pos), geometry.bricks.len() as u32);
            geometry.bricks.push(BrickRecord {
                occupancy_lo: brick.occupancy_mask as u32,
                occupancy_hi: (brick.occupancy_mask >> 32) as u32,
                atlas_offset: brick.atlas_offset,
                flags: brick.flags,
            });
            if !brick.is_solid() {
                let base = brick.atlas_offset as usize;
                geometry.payload[base..base + brick.payload().len()]
                    .copy_from_slice(brick.payload());
            }
        }
    }

    geometry
}

/// Where one map's geometry landed inside the shared device buffers.
#[derive(Debug)]
struct MapSlot {
    sector_base: u32,
    brick_base: u32,
    /// Element (byte) offset of the map's payload region.
    payload_base: u32,
    grid_base: u32,
    grid_min: IVec3,
    grid_dims: UVec3,
    /// Global brick record index per key, for `flush_edits`.
    brick_index: HashMap<BrickKey, u32>,
}

fn instance_record(
    object: &VoxelObject,
    slot: &MapSlot,
    material_base: u32,
    material_len: u32,
) -> InstanceRecord {
    let object_aabb = object.map.borrow().current_aabb().unwrap_or_else(|| {
        crate::math::Aabb::new(glam::Vec3::ZERO, glam::Vec3::ZERO)
    });
    let world_aabb = object.world_aabb.unwrap_or(object_aabb);
    InstanceRecord {
        object_to_world: object.object_to_world().to_cols_array_2d(),
        world_to_object: object.world_to_object().to_cols_array_2d(),
        aabb_min: object_aabb.min.extend(0.0).to_array(),
        aabb_max: object_aabb.max.extend(0.0).to_array(),
        world_min: world_aabb.min.extend(0.0).to_array(),
        world_max: world_aabb.max.extend(0.0).to_array(),
        grid_min: [slot.grid_min.x, slot.grid_min.y, slot.grid_min.z, 0],
        grid_dims: [slot.grid_dims.x, slot.grid_dims.y, slot.grid_dims.z, 0],
        material_base,
        material_len,
        sector_base: slot.sector_base,
        brick_base: slot.brick_base,
        payload_base: slot.payload_base,
        grid_base: slot.grid_base,
        _pad: [0; 2],
    }
}

/// Owns every scene-derived device buffer and is their sole writer.
/// Geometry for all maps lives concatenated in shared sector/brick/payload/
/// grid buffers; per-map base offsets are recorded in the instance records.
pub struct SceneBuffers {
    instances: wgpu::Buffer,
    sectors: wgpu::Buffer,
    bricks: wgpu::Buffer,
    payload: wgpu::Buffer,
    grids: wgpu::Buffer,
    materials: wgpu::Buffer,
    lights: wgpu::Buffer,
    tlas: wgpu::Buffer,
    slots: HashMap<u64, MapSlot>,
}

/// Buffers start at this many bytes and grow by doubling.
const MIN_BUFFER_SIZE: u64 = 256;

fn grown_size(needed: u64) -> u64 {
    needed.next_power_of_two().max(MIN_BUFFER_SIZE)
}

impl SceneBuffers {
    pub fn new(context: &Context) -> Self {
        let mut buffers = BulkBufferBuilder::new()
            .set_usage(wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST)
            .with_buffer("Instances", MIN_BUFFER_SIZE, false)
            .with_buffer("Sectors", MIN_BUFFER_SIZE, false)
            .with_buffer("Bricks", MIN_BUFFER_SIZE, false)
            .with_buffer("Payload Atlas", MIN_BUFFER_SIZE, false)
            .with_buffer("Sector Grids", MIN_BUFFER_SIZE, false)
            .with_buffer("Materials", MIN_BUFFER_SIZE, false)
            .with_buffer("Lights", MIN_BUFFER_SIZE, false)
            .with_buffer("TLAS Nodes", MIN_BUFFER_SIZE, false)
            .build(context);

        Self {
            instances: buffers.remove(0),
            sectors: buffers.remove(0),
            bricks: buffers.remove(0),
            payload: buffers.remove(0),
            grids: buffers.remove(0),
            materials: buffers.remove(0),
            lights: buffers.remove(0),
            tlas: buffers.remove(0),
            slots: HashMap::new(),
        }
    }

    pub fn instances_buffer(&self) -> &wgpu::Buffer {
        &self.instances
    }
    pub fn sectors_buffer(&self) -> &wgpu::Buffer {
        &self.sectors
    }
    pub fn bricks_buffer(&self) -> &wgpu::Buffer {
        &self.bricks
    }
    pub fn payload_buffer(&self) -> &wgpu::Buffer {
        &self.payload
    }
    pub fn grids_buffer(&self) -> &wgpu::Buffer {
        &self.grids
    }
    pub fn materials_buffer(&self) -> &wgpu::Buffer {
        &self.materials
    }
    pub fn lights_buffer(&self) -> &wgpu::Buffer {
        &self.lights
    }
    pub fn tlas_buffer(&self) -> &wgpu::Buffer {
        &self.tlas
    }

    /// Recreates `buffer` when `needed` outgrows it (or it shrank to a
    /// quarter of capacity); returns whether it was recreated.
    fn ensure_capacity(
        context: &Context,
        buffer: &mut wgpu::Buffer,
        label: &str,
        needed: u64,
    ) -> bool {
        let capacity = buffer.size();
        let grow = needed > capacity;
        let shrink = capacity > MIN_BUFFER_SIZE && needed < capacity / 4;
        if !grow && !shrink {
            return false;
        }
        let size = grown_size(needed);
        log::info!("Recreating buffer '{label}': {capacity} -> {size} bytes");
        *buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        true
    }

    /// Uploads the committed scene. Geometry buffers are rebuilt wholesale
    /// when any visible map changed structurally or the visible map set
    /// changed identity; instance/material/light/TLAS data re-uploads every
    /// call. Returns true when any buffer was recreated or map identities
    /// changed, in which case the caller must rebuild its bind groups.
    pub fn update_scene(
        &mut self,
        context: &Context,
        scene: &Scene,
        commit: &CommitOutput,
    ) -> bool {
        let mut recreated = false;

        // Unique visible maps, first-appearance order.
        let mut visible_maps: Vec<(u64, crate::scene::SharedMap)> = Vec::new();
        for &index in &commit.visible {
            let map = &scene.objects[index].map;
            let id = map.borrow().id();
            if !visible_maps.iter().any(|(seen, _)| *seen == id) {
                visible_maps.push((id, map.clone()));
            }
        }

        let identity_changed = visible_maps.len() != self.slots.len()
            || visible_maps.iter().any(|(id, _)| !self.slots.contains_key(id));
        let structural = visible_maps
            .iter()
            .any(|(_, map)| map.borrow().structure_dirty);

        if identity_changed || structural {
            recreated |= self.rebuild_geometry(context, &visible_maps);
        }

        // Instance records in visible order: TLAS leaves index this array.
        let mut instances = Vec::with_capacity(commit.visible.len());
        let mut materials: Vec<MaterialRecord> = Vec::new();
        for &index in &commit.visible {
            let object = &scene.objects[index];
            let id = object.map.borrow().id();
            let slot = &self.slots[&id];
            let material_base = materials.len() as u32;
            materials.extend(object.materials.iter().map(MaterialRecord::from));
            instances.push(instance_record(
                object,
                slot,
                material_base,
                object.materials.len() as u32,
            ));
        }
        let lights: Vec<LightRecord> = scene.lights.iter().map(LightRecord::from).collect();

        recreated |= Self::upload(context, &mut self.instances, "Instances", &instances);
        recreated |= Self::upload(context, &mut self.materials, "Materials", &materials);
        recreated |= Self::upload(context, &mut self.lights, "Lights", &lights);
        recreated |= Self::upload(context, &mut self.tlas, "TLAS Nodes", &commit.tlas);

        recreated || identity_changed
    }

    fn upload<T: bytemuck::NoUninit>(
        context: &Context,
        buffer: &mut wgpu::Buffer,
        label: &str,
        records: &[T],
    ) -> bool {
        let bytes: &[u8] = bytemuck::cast_slice(records);
        let recreated = Self::ensure_capacity(context, buffer, label, bytes.len() as u64);
        if !bytes.is_empty() {
            context.queue.write_buffer(buffer, 0, bytes);
        }
        recreated
    }

    /// Re-serializes every visible map and uploads the shared geometry
    /// buffers. Assigns fresh per-map base offsets.
    fn rebuild_geometry(
        &mut self,
        context: &Context,
        visible_maps: &[(u64, crate::scene::SharedMap)],
    ) -> bool {
        let mut sectors: Vec<SectorRecord> = Vec::new();
        let mut bricks: Vec<BrickRecord> = Vec::new();
        let mut payload: Vec<u8> = Vec::new();
        let mut grids: Vec<u32> = Vec::new();
        self.slots.clear();

        for (id, map) in visible_maps {
            let mut map = map.borrow_mut();
            let geometry = serialize_map(&map);

            let sector_base = sectors.len() as u32;
            let brick_base = bricks.len() as u32;
            let payload_base = payload.len() as u32;
            let grid_base = grids.len() as u32;

            // Per-map record indices become global by adding the bases.
            sectors.extend(geometry.sectors.iter().map(|s| SectorRecord {
                brick_base: s.brick_base + brick_base,
                ..*s
            }));
            bricks.extend_from_slice(&geometry.bricks);
            payload.extend_from_slice(&geometry.payload);
            grids.extend_from_slice(&geometry.grid);

            self.slots.insert(
                *id,
                MapSlot {
                    sector_base,
                    brick_base,
                    payload_base,
                    grid_base,
                    grid_min: geometry.grid_min,
                    grid_dims: geometry.grid_dims,
                    brick_index: geometry
                        .brick_index
                        .into_iter()
                        .map(|(key, local)| (key, local + brick_base))
                        .collect(),
                },
            );
            map.clear_dirty();
        }

        log::info!(
            "Rebuilt scene geometry: {} maps, {} sectors, {} bricks, {} payload bytes",
            visible_maps.len(),
            sectors.len(),
            bricks.len(),
            payload.len()
        );

        let mut recreated = false;
        recreated |= Self::upload(context, &mut self.sectors, "Sectors", &sectors);
        recreated |= Self::upload(context, &mut self.bricks, "Bricks", &bricks);
        recreated |= Self::upload(context, &mut self.payload, "Payload Atlas", &payload);
        recreated |= Self::upload(context, &mut self.grids, "Sector Grids", &grids);
        recreated
    }

    /// Drains per-brick dirt from maps whose layout is intact, writing
    /// byte-granular record and payload-tile updates into the live buffers.
    /// Runs in the Update phase, before the frame's encoder exists.
    pub fn flush_edits(&mut self, context: &Context, scene: &Scene) {
        for object in &scene.objects {
            let mut map = object.map.borrow_mut();
            if map.structure_dirty || map.dirty_bricks.is_empty() {
                continue;
            }
            let map_id = map.id();
            let Some(slot) = self.slots.get(&map_id) else {
                continue;
            };

            let dirty: Vec<BrickKey> = map.dirty_bricks.iter().copied().collect();
            for key in dirty {
                let Some(&record_index) = slot.brick_index.get(&key) else {
                    // Brick appeared since the last rebuild; that flips
                    // structure_dirty, so we never get here for live maps.
                    continue;
                };
                let Some(brick) = map.brick(key) else {
                    continue;
                };
                let record = BrickRecord {
                    occupancy_lo: brick.occupancy_mask as u32,
                    occupancy_hi: (brick.occupancy_mask >> 32) as u32,
                    atlas_offset: brick.atlas_offset,
                    flags: brick.flags,
                };
                context.queue.write_buffer(
                    &self.bricks,
                    record_index as u64 * std::mem::size_of::<BrickRecord>() as u64,
                    bytemuck::bytes_of(&record),
                );
                if !brick.is_solid() {
                    context.queue.write_buffer(
                        &self.payload,
                        (slot.payload_base + brick.atlas_offset) as u64,
                        brick.payload(),
                    );
                }
            }
            map.clear_dirty();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::IVec3;

    #[test]
    fn record_sizes_match_the_wire_layout() {
        assert_eq!(std::mem::size_of::<InstanceRecord>(), 256);
        assert_eq!(std::mem::size_of::<SectorRecord>(), 16);
        assert_eq!(std::mem::size_of::<BrickRecord>(), 16);
        assert_eq!(std::mem::size_of::<MaterialRecord>(), 32);
        assert_eq!(std::mem::size_of::<LightRecord>(), 64);
    }

    #[test]
    fn serialize_single_brick_map() {
        let mut map = XBrickMap::new();
        map.set_voxel(IVec3::new(1, 2, 3), 7);

        let geometry = serialize_map(&map);
        assert_eq!(geometry.sectors.len(), 1);
        assert_eq!(geometry.bricks.len(), 1);
        assert_eq!(geometry.grid_min, IVec3::ZERO);
        assert_eq!(geometry.grid_dims, UVec3::ONE);
        assert_eq!(geometry.grid, vec![1]);

        let sector = &geometry.sectors[0];
        assert_eq!(sector.brick_mask_lo, 1, "brick (0,0,0) is bit 0");
        assert_eq!(sector.brick_base, 0);

        let brick = &geometry.bricks[0];
        assert_eq!(brick.atlas_offset, 0);
        assert_eq!(brick.flags, 0);
        // Voxel (1,2,3) in X-major order.
        let voxel_index = 1 + 2 * 8 + 3 * 64;
        assert_eq!(geometry.payload[voxel_index], 7);
        assert_eq!(geometry.payload.len(), 512);
    }

    #[test]
    fn serialize_orders_sectors_and_offsets_bases() {
        let mut map = XBrickMap::new();
        map.set_voxel(IVec3::new(40, 0, 0), 1); // sector (1,0,0)
        map.set_voxel(IVec3::new(0, 0, 0), 2); // sector (0,0,0)
        map.set_voxel(IVec3::new(0, 0, 40), 3); // sector (0,0,1)

        let geometry = serialize_map(&map);
        assert_eq!(geometry.sectors.len(), 3);
        assert_eq!(geometry.grid_min, IVec3::ZERO);
        assert_eq!(geometry.grid_dims, UVec3::new(2, 1, 2));
        // (z,y,x) sort: (0,0,0), (1,0,0), (0,0,1). Grid is x-major.
        assert_eq!(geometry.grid, vec![1, 2, 3, 0]);

        // Each sector owns one brick, bases ascend.
        let bases: Vec<u32> = geometry.sectors.iter().map(|s| s.brick_base).collect();
        assert_eq!(bases, vec![0, 1, 2]);

        // Payload slots are disjoint 512-element tiles.
        let mut offsets: Vec<u32> = geometry.bricks.iter().map(|b| b.atlas_offset).collect();
        offsets.sort_unstable();
        assert_eq!(offsets, vec![0, 512, 1024]);
    }

    #[test]
    fn serialize_skips_payload_for_solid_bricks() {
        let mut map = XBrickMap::new();
        for z in 0..8 {
            for y in 0..8 {
                for x in 0..8 {
                    map.set_voxel(IVec3::new(x, y, z), 4);
                }
            }
        }

        let geometry = serialize_map(&map);
        assert_eq!(geometry.bricks.len(), 1);
        let brick = &geometry.bricks[0];
        assert_eq!(brick.flags & crate::voxel::BRICK_FLAG_SOLID, 1);
        assert_eq!(brick.atlas_offset & 0xFF, 4);
        assert!(
            geometry.payload.iter().all(|&b| b == 0),
            "SOLID payload stays out of the atlas"
        );
    }

    #[test]
    fn brick_index_points_at_records() {
        let mut map = XBrickMap::new();
        map.set_voxel(IVec3::new(0, 0, 0), 1);
        map.set_voxel(IVec3::new(9, 0, 0), 2); // second brick, same sector

        let geometry = serialize_map(&map);
        assert_eq!(geometry.bricks.len(), 2);
        let key_a: BrickKey = (IVec3::ZERO, glam::UVec3::new(0, 0, 0));
        let key_b: BrickKey = (IVec3::ZERO, glam::UVec3::new(1, 0, 0));
        let ia = geometry.brick_index[&key_a];
        let ib = geometry.brick_index[&key_b];
        assert_eq!((ia, ib), (0, 1), "packed order is ascending bit order");
    }
}
