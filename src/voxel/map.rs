use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use glam::{IVec3, UVec3};

use crate::math::{floor_div, floor_rem, Aabb};

use super::{
    brick::{Brick, BRICK_DIM},
    sector::{Sector, SECTOR_SIZE},
};

/// Elements per atlas slot: one full brick payload.
pub const ATLAS_SLOT_SIZE: u32 = 512;

/// Largest dense lattice `split_disconnected_components` will rasterize.
const SPLIT_VOLUME_CAP: u64 = 4_000_000;
/// Largest lattice `resample` will iterate.
const RESAMPLE_VOLUME_CAP: u64 = 100_000_000;

/// Identifies a brick across the whole map: owning sector coordinate plus
/// brick coordinate inside the sector.
pub type BrickKey = (IVec3, UVec3);

static NEXT_MAP_ID: AtomicU64 = AtomicU64::new(1);

fn fresh_map_id() -> u64 {
    NEXT_MAP_ID.fetch_add(1, Ordering::Relaxed)
}

/// Result of [`XBrickMap::split_disconnected_components`].
#[derive(Debug)]
pub enum SplitOutcome {
    /// The dense occupancy scan would exceed the volume cap; not attempted.
    TooLarge,
    /// Exactly one connected component; splitting would be a no-op.
    Single,
    /// Two or more components, each in the original coordinate frame.
    Split(Vec<XBrickMap>),
}

/// Slot allocator for the shared payload atlas. Freed slots are reused
/// LIFO before the high-water mark advances, so a brick that round-trips
/// through SOLID usually lands back on the offset it had.
#[derive(Debug, Clone, Default)]
struct AtlasAllocator {
    high_water: u32,
    free_slots: Vec<u32>,
    by_key: HashMap<BrickKey, u32>,
}

impl AtlasAllocator {
    /// Returns the assigned offset and whether the high-water mark advanced.
    fn allocate(&mut self, key: BrickKey) -> (u32, bool) {
        debug_assert!(!self.by_key.contains_key(&key), "double allocate");
        if let Some(offset) = self.free_slots.pop() {
            self.by_key.insert(key, offset);
            (offset, false)
        } else {
            let offset = self.high_water;
            self.high_water += ATLAS_SLOT_SIZE;
            self.by_key.insert(key, offset);
            (offset, true)
        }
    }

    fn free(&mut self, key: BrickKey) {
        if let Some(offset) = self.by_key.remove(&key) {
            self.free_slots.push(offset);
        }
    }

    /// Total atlas extent in elements, holes included.
    fn capacity(&self) -> u32 {
        self.high_water
    }
}

/// Sparse mapping from sector coordinate to [`Sector`]: the object-level
/// voxel container. Tracks atlas slots for every non-SOLID brick and the
/// dirty state the GPU buffer manager consumes.
#[derive(Debug)]
pub struct XBrickMap {
    id: u64,
    sectors: HashMap<IVec3, Sector>,
    atlas: AtlasAllocator,
    pub dirty_sectors: HashSet<IVec3>,
    pub dirty_bricks: HashSet<BrickKey>,
    pub structure_dirty: bool,
    pub aabb_dirty: bool,
    cached_aabb: Option<Aabb>,
}

impl Default for XBrickMap {
    fn default() -> Self {
        Self::new()
    }
}

impl XBrickMap {
    pub fn new() -> Self {
        Self {
            id: fresh_map_id(),
            sectors: HashMap::new(),
            atlas: AtlasAllocator::default(),
            dirty_sectors: HashSet::new(),
            dirty_bricks: HashSet::new(),
            structure_dirty: true,
            aabb_dirty: true,
            cached_aabb: None,
        }
    }

    /// Identity of this map. Fresh per construction and per [`copy`], which
    /// is what lets the buffer manager assign payload bases per map.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }

    pub fn sector_count(&self) -> usize {
        self.sectors.len()
    }

    pub fn brick_count(&self) -> usize {
        self.sectors.values().map(Sector::brick_count).sum()
    }

    pub fn sector(&self, coord: IVec3) -> Option<&Sector> {
        self.sectors.get(&coord)
    }

    pub fn sectors(&self) -> impl Iterator<Item = (&IVec3, &Sector)> {
        self.sectors.iter()
    }

    pub fn brick(&self, key: BrickKey) -> Option<&Brick> {
        self.sectors.get(&key.0).and_then(|s| s.get(key.1))
    }

    /// Total atlas extent in elements (holes from freed slots included).
    pub fn atlas_capacity(&self) -> u32 {
        self.atlas.capacity()
    }

    /// Splits a global voxel coordinate into sector coordinate, brick
    /// coordinate and voxel-in-brick, flooring for negatives.
    #[inline]
    pub fn split_coord(g: IVec3) -> (IVec3, UVec3, UVec3) {
        let sector = floor_div(g, SECTOR_SIZE as i32);
        let local = floor_rem(g, SECTOR_SIZE as i32);
        (sector, local / BRICK_DIM, local % BRICK_DIM)
    }

    pub fn get_voxel(&self, g: IVec3) -> u8 {
        let (sc, bc, vc) = Self::split_coord(g);
        match self.sectors.get(&sc).and_then(|s| s.get(bc)) {
            Some(brick) if brick.is_solid() => brick.solid_value(),
            Some(brick) => brick.get(vc),
            None => 0,
        }
    }

    pub fn set_voxel(&mut self, g: IVec3, val: u8) {
        let (sc, bc, vc) = Self::split_coord(g);
        let key = (sc, bc);

        if val == 0 {
            let Some(sector) = self.sectors.get_mut(&sc) else {
                return;
            };
            let Some(brick) = sector.get_mut(bc) else {
                return;
            };
            if brick.is_solid() {
                // A hole in a uniform brick needs the payload back in the atlas.
                let prior = brick.solid_value();
                brick.expand(prior);
                let (offset, grew) = self.atlas.allocate(key);
                brick.atlas_offset = offset;
                self.structure_dirty |= grew;
            } else if brick.get(vc) == 0 {
                return;
            }
            brick.set(vc, 0);
            self.aabb_dirty = true;
            self.dirty_bricks.insert(key);
            self.dirty_sectors.insert(sc);

            let brick_empty = brick.is_empty();
            if brick_empty {
                self.atlas.free(key);
                sector.remove_if_empty(bc);
                self.structure_dirty = true;
                self.dirty_bricks.remove(&key);
            }
            if sector.is_empty() {
                self.sectors.remove(&sc);
                self.dirty_sectors.remove(&sc);
            }
            return;
        }

        let sector = self.sectors.entry(sc).or_default();
        let (brick, created) = sector.get_or_create(bc);
        if created {
            let (offset, _) = self.atlas.allocate(key);
            brick.atlas_offset = offset;
            self.structure_dirty = true;
        }
        if brick.is_solid() {
            if brick.solid_value() == val {
                return;
            }
            let prior = brick.solid_value();
            brick.expand(prior);
            let (offset, grew) = self.atlas.allocate(key);
            brick.atlas_offset = offset;
            self.structure_dirty |= grew;
        } else if !created && brick.get(vc) == val {
            return;
        }

        brick.set(vc, val);
        self.aabb_dirty = true;
        self.dirty_bricks.insert(key);
        self.dirty_sectors.insert(sc);

        if brick.try_compress() {
            self.atlas.free(key);
        }
    }

    /// Tight object-space AABB, recomputed only while `aabb_dirty`.
    /// `None` for an empty map.
    pub fn compute_aabb(&mut self) -> Option<Aabb> {
        if !self.aabb_dirty {
            return self.cached_aabb;
        }
        self.cached_aabb = self
            .voxel_bounds()
            .map(|(lo, hi)| Aabb::new(lo.as_vec3(), (hi + IVec3::ONE).as_vec3()));
        self.aabb_dirty = false;
        self.cached_aabb
    }

    /// The AABB without touching the cache; valid cache wins, otherwise a
    /// fresh scan. Lets `&self` consumers (ray march) stay allocation-free.
    pub(crate) fn current_aabb(&self) -> Option<Aabb> {
        if !self.aabb_dirty {
            return self.cached_aabb;
        }
        self.voxel_bounds()
            .map(|(lo, hi)| Aabb::new(lo.as_vec3(), (hi + IVec3::ONE).as_vec3()))
    }

    /// Inclusive voxel-coordinate bounds of all non-zero voxels.
    /// SOLID bricks contribute their full 8x8x8 extent; for the rest the
    /// occupancy mask narrows the scan to occupied micro-blocks.
    fn voxel_bounds(&self) -> Option<(IVec3, IVec3)> {
        let mut lo = IVec3::MAX;
        let mut hi = IVec3::MIN;
        let mut any = false;

        for (coord, sector) in &self.sectors {
            for (bpos, brick) in sector.iter() {
                let base = *coord * SECTOR_SIZE as i32 + bpos.as_ivec3() * BRICK_DIM as i32;
                if brick.is_solid() {
                    any = true;
                    lo = lo.min(base);
                    hi = hi.max(base + IVec3::splat(BRICK_DIM as i32 - 1));
                    continue;
                }
                for mz in 0..4u32 {
                    for my in 0..4u32 {
                        for mx in 0..4u32 {
                            let bit = 1u64 << (mx + 4 * my + 16 * mz);
                            if brick.occupancy_mask & bit == 0 {
                                continue;
                            }
                            let micro = UVec3::new(mx, my, mz) * 2;
                            for dz in 0..2u32 {
                                for dy in 0..2u32 {
                                    for dx in 0..2u32 {
                                        let v = micro + UVec3::new(dx, dy, dz);
                                        if brick.get(v) != 0 {
                                            any = true;
                                            let p = base + v.as_ivec3();
                                            lo = lo.min(p);
                                            hi = hi.max(p);
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        any.then_some((lo, hi))
    }

    /// Deep copy with a fresh identity. Observationally equal under
    /// `get_voxel`/`compute_aabb`; subsequent edits never cross over, and the
    /// buffer manager assigns the clone its own payload region.
    pub fn copy(&self) -> XBrickMap {
        XBrickMap {
            id: fresh_map_id(),
            sectors: self.sectors.clone(),
            atlas: self.atlas.clone(),
            dirty_sectors: HashSet::new(),
            dirty_bricks: HashSet::new(),
            structure_dirty: true,
            aabb_dirty: self.aabb_dirty,
            cached_aabb: self.cached_aabb,
        }
    }

    /// Nearest-neighbour rescale: the projected centre of each new voxel,
    /// `(g + 0.5) / scale`, is floored into the source grid. `None` when the
    /// target lattice exceeds the volume cap.
    pub fn resample(&self, scale: f32) -> Option<XBrickMap> {
        let mut out = XBrickMap::new();
        let Some((lo, hi)) = self.voxel_bounds() else {
            return Some(out);
        };

        let new_lo = ((lo.as_vec3() * scale) - 0.5).ceil().as_ivec3();
        let new_hi = (((hi + IVec3::ONE).as_vec3() * scale) - 0.5).floor().as_ivec3();
        let extent = (new_hi - new_lo + IVec3::ONE).max(IVec3::ZERO);
        let volume = extent.x as u64 * extent.y as u64 * extent.z as u64;
        if volume > RESAMPLE_VOLUME_CAP {
            log::warn!(
                "resample({scale}) rejected: {volume} lattice points exceeds cap"
            );
            return None;
        }

        for z in new_lo.z..=new_hi.z {
            for y in new_lo.y..=new_hi.y {
                for x in new_lo.x..=new_hi.x {
                    let g = IVec3::new(x, y, z);
                    let src = ((g.as_vec3() + 0.5) / scale).floor().as_ivec3();
                    let val = self.get_voxel(src);
                    if val != 0 {
                        out.set_voxel(g, val);
                    }
                }
            }
        }
        Some(out)
    }

    /// New map with every present voxel translated by `delta`.
    pub fn shift(&self, delta: IVec3) -> XBrickMap {
        let mut out = XBrickMap::new();
        for (coord, sector) in &self.sectors {
            for (bpos, brick) in sector.iter() {
                let base = *coord * SECTOR_SIZE as i32 + bpos.as_ivec3() * BRICK_DIM as i32;
                for z in 0..BRICK_DIM {
                    for y in 0..BRICK_DIM {
                        for x in 0..BRICK_DIM {
                            let v = UVec3::new(x, y, z);
                            let val = if brick.is_solid() {
                                brick.solid_value()
                            } else {
                                brick.get(v)
                            };
                            if val != 0 {
                                out.set_voxel(base + v.as_ivec3() + delta, val);
                            }
                        }
                    }
                }
            }
        }
        out
    }

    /// Re-centres the map on the origin; returns the new map and the
    /// pre-shift centre.
    pub fn center(&self) -> (XBrickMap, IVec3) {
        let Some((lo, hi)) = self.voxel_bounds() else {
            return (XBrickMap::new(), IVec3::ZERO);
        };
        let center = ((lo.as_vec3() + (hi + IVec3::ONE).as_vec3()) * 0.5)
            .floor()
            .as_ivec3();
        (self.shift(-center), center)
    }

    /// Rasterizes presence into a dense bitset over the tight AABB and runs a
    /// 6-connected BFS. SOLID bricks count as fully present 8x8x8 blocks.
    pub fn split_disconnected_components(&self) -> SplitOutcome {
        let Some((lo, hi)) = self.voxel_bounds() else {
            return SplitOutcome::Single;
        };
        let dims = hi - lo + IVec3::ONE;
        let volume = dims.x as u64 * dims.y as u64 * dims.z as u64;
        if volume > SPLIT_VOLUME_CAP {
            log::warn!("split rejected: {volume} lattice points exceeds cap");
            return SplitOutcome::TooLarge;
        }

        let idx_of = |p: IVec3| -> usize {
            let r = p - lo;
            (r.x + r.y * dims.x + r.z * dims.x * dims.y) as usize
        };

        let mut present = vec![false; volume as usize];
        for (coord, sector) in &self.sectors {
            for (bpos, brick) in sector.iter() {
                let base = *coord * SECTOR_SIZE as i32 + bpos.as_ivec3() * BRICK_DIM as i32;
                for z in 0..BRICK_DIM {
                    for y in 0..BRICK_DIM {
                        for x in 0..BRICK_DIM {
                            let v = UVec3::new(x, y, z);
                            let occupied = brick.is_solid() || brick.get(v) != 0;
                            if occupied {
                                present[idx_of(base + v.as_ivec3())] = true;
                            }
                        }
                    }
                }
            }
        }

        const NEIGHBOURS: [IVec3; 6] = [
            IVec3::new(1, 0, 0),
            IVec3::new(-1, 0, 0),
            IVec3::new(0, 1, 0),
            IVec3::new(0, -1, 0),
            IVec3::new(0, 0, 1),
            IVec3::new(0, 0, -1),
        ];

        let mut visited = vec![false; volume as usize];
        let mut components = Vec::new();
        for z in lo.z..=hi.z {
            for y in lo.y..=hi.y {
                for x in lo.x..=hi.x {
                    let seed = IVec3::new(x, y, z);
                    let seed_idx = idx_of(seed);
                    if !present[seed_idx] || visited[seed_idx] {
                        continue;
                    }

                    let mut component = XBrickMap::new();
                    let mut queue = VecDeque::new();
                    visited[seed_idx] = true;
                    queue.push_back(seed);
                    while let Some(p) = queue.pop_front() {
                        component.set_voxel(p, self.get_voxel(p));
                        for step in NEIGHBOURS {
                            let n = p + step;
                            if n.cmplt(lo).any() || n.cmpgt(hi).any() {
                                continue;
                            }
                            let n_idx = idx_of(n);
                            if present[n_idx] && !visited[n_idx] {
                                visited[n_idx] = true;
                                queue.push_back(n);
                            }
                        }
                    }
                    components.push(component);
                }
            }
        }

        match components.len() {
            0 | 1 => SplitOutcome::Single,
            _ => SplitOutcome::Split(components),
        }
    }

    /// Called by the buffer manager once the device copies are up to date.
    pub fn clear_dirty(&mut self) {
        self.dirty_sectors.clear();
        self.dirty_bricks.clear();
        self.structure_dirty = false;
    }

    /// Multiset of live atlas slots; test support for the conservation
    /// invariant.
    #[cfg(test)]
    pub fn live_atlas_slots(&self) -> Vec<u32> {
        let mut slots: Vec<u32> = self.atlas.by_key.values().copied().collect();
        slots.sort_unstable();
        slots
    }

    #[cfg(test)]
    pub fn free_atlas_slots(&self) -> &[u32] {
        &self.atlas.free_slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn fill_box(map: &mut XBrickMap, lo: IVec3, hi: IVec3, val: u8) {
        for z in lo.z..=hi.z {
            for y in lo.y..=hi.y {
                for x in lo.x..=hi.x {
                    map.set_voxel(IVec3::new(x, y, z), val);
                }
            }
        }
    }

    #[test]
    fn set_get_round_trip_with_negative_coords() {
        let mut map = XBrickMap::new();
        let coords = [
            IVec3::new(0, 0, 0),
            IVec3::new(-1, -1, -1),
            IVec3::new(31, 32, 33),
            IVec3::new(-100, 50, -7),
        ];
        for (i, &c) in coords.iter().enumerate() {
            map.set_voxel(c, (i + 1) as u8);
        }
        for (i, &c) in coords.iter().enumerate() {
            assert_eq!(map.get_voxel(c), (i + 1) as u8);
        }
        assert_eq!(map.get_voxel(IVec3::new(1000, 0, 0)), 0);

        for &c in &coords {
            map.set_voxel(c, 0);
        }
        assert!(map.is_empty(), "clearing every voxel drops all sectors");
    }

    #[test]
    fn aabb_is_tight_and_cached() {
        let mut map = XBrickMap::new();
        assert_eq!(map.compute_aabb(), None);

        map.set_voxel(IVec3::new(2, 3, 4), 1);
        map.set_voxel(IVec3::new(10, 3, 4), 1);
        let aabb = map.compute_aabb().unwrap();
        assert_eq!(aabb.min, Vec3::new(2.0, 3.0, 4.0));
        assert_eq!(aabb.max, Vec3::new(11.0, 4.0, 5.0));

        assert!(!map.aabb_dirty);
        map.set_voxel(IVec3::new(-5, 3, 4), 1);
        assert!(map.aabb_dirty);
        let aabb = map.compute_aabb().unwrap();
        assert_eq!(aabb.min.x, -5.0);
    }

    #[test]
    fn solid_round_trip_keeps_offset_and_frees_slot() {
        let mut map = XBrickMap::new();
        fill_box(&mut map, IVec3::ZERO, IVec3::splat(7), 9);

        let key = (IVec3::ZERO, UVec3::ZERO);
        let brick = map.brick(key).unwrap();
        assert!(brick.is_solid(), "uniform fill must compress");
        assert_eq!(brick.solid_value(), 9);
        assert!(
            map.live_atlas_slots().is_empty(),
            "SOLID brick holds no atlas slot"
        );
        let freed = map.free_atlas_slots().to_vec();
        assert_eq!(freed, vec![0]);

        // Punch a hole: expand must reuse the freed slot, LIFO.
        map.set_voxel(IVec3::ZERO, 0);
        let brick = map.brick(key).unwrap();
        assert!(!brick.is_solid());
        assert_eq!(brick.atlas_offset, 0, "freed slot reused before high water");
        assert_eq!(map.get_voxel(IVec3::ZERO), 0);
        assert_eq!(map.get_voxel(IVec3::new(1, 0, 0)), 9);
    }

    #[test]
    fn atlas_slots_stay_disjoint_under_random_edits() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut map = XBrickMap::new();
        for _ in 0..4000 {
            let p = IVec3::new(
                rng.gen_range(-24..24),
                rng.gen_range(-24..24),
                rng.gen_range(-24..24),
            );
            let val = if rng.gen_bool(0.3) { 0 } else { rng.gen_range(1..=255) as u8 };
            map.set_voxel(p, val);

            let slots = map.live_atlas_slots();
            let mut deduped = slots.clone();
            deduped.dedup();
            assert_eq!(slots, deduped, "live atlas slots must be disjoint");
            for free in map.free_atlas_slots() {
                assert!(
                    !slots.contains(free),
                    "freed slot {free} still assigned to a brick"
                );
            }
        }
    }

    #[test]
    fn copy_is_independent() {
        let mut map = XBrickMap::new();
        fill_box(&mut map, IVec3::ZERO, IVec3::new(9, 2, 2), 5);
        let original_aabb = map.compute_aabb();

        let mut copy = map.copy();
        assert_ne!(copy.id(), map.id());
        assert_eq!(copy.compute_aabb(), original_aabb);
        for z in 0..3 {
            for y in 0..3 {
                for x in 0..10 {
                    let p = IVec3::new(x, y, z);
                    assert_eq!(copy.get_voxel(p), map.get_voxel(p));
                }
            }
        }

        copy.set_voxel(IVec3::new(0, 0, 0), 0);
        copy.set_voxel(IVec3::new(50, 0, 0), 7);
        assert_eq!(map.get_voxel(IVec3::new(0, 0, 0)), 5);
        assert_eq!(map.get_voxel(IVec3::new(50, 0, 0)), 0);
        assert_eq!(map.compute_aabb(), original_aabb);
    }

    #[test]
    fn resample_doubles_the_cube() {
        // S5: [0..3]^3 at scale 2 becomes [0..7]^3.
        let mut map = XBrickMap::new();
        fill_box(&mut map, IVec3::ZERO, IVec3::splat(3), 1);

        let mut out = map.resample(2.0).unwrap();
        let aabb = out.compute_aabb().unwrap();
        assert_eq!(aabb.min, Vec3::ZERO);
        assert_eq!(aabb.max, Vec3::splat(8.0));
        assert_eq!(out.get_voxel(IVec3::splat(7)), 1);
        assert_eq!(out.get_voxel(IVec3::new(8, 0, 0)), 0);
    }

    #[test]
    fn resample_rejects_oversized_targets() {
        let mut map = XBrickMap::new();
        map.set_voxel(IVec3::ZERO, 1);
        map.set_voxel(IVec3::new(600, 600, 600), 1);
        assert!(map.resample(2.0).is_none());
    }

    #[test]
    fn shift_and_center() {
        let mut map = XBrickMap::new();
        fill_box(&mut map, IVec3::new(10, 10, 10), IVec3::new(13, 13, 13), 2);

        let mut shifted = map.shift(IVec3::new(-10, 0, 5));
        assert_eq!(shifted.get_voxel(IVec3::new(0, 10, 15)), 2);
        assert_eq!(shifted.get_voxel(IVec3::new(10, 10, 10)), 0);
        let aabb = shifted.compute_aabb().unwrap();
        assert_eq!(aabb.min, Vec3::new(0.0, 10.0, 15.0));

        let (mut centered, center) = map.center();
        assert_eq!(center, IVec3::new(12, 12, 12));
        let aabb = centered.compute_aabb().unwrap();
        assert_eq!(aabb.min, Vec3::splat(-2.0));
        assert_eq!(aabb.max, Vec3::splat(2.0));
    }

    #[test]
    fn sphere_carve_splits_bar_in_two() {
        // S2: a 20x5x5 bar, sphere of radius 6 erased at its middle.
        let mut map = XBrickMap::new();
        fill_box(&mut map, IVec3::ZERO, IVec3::new(19, 4, 4), 1);

        let center = Vec3::new(10.0, 2.5, 2.5);
        for z in 0..5 {
            for y in 0..5 {
                for x in 0..20 {
                    let p = IVec3::new(x, y, z);
                    if (p.as_vec3() + 0.5 - center).length() <= 6.0 {
                        map.set_voxel(p, 0);
                    }
                }
            }
        }

        match map.split_disconnected_components() {
            SplitOutcome::Split(parts) => assert_eq!(parts.len(), 2),
            other => panic!("expected two components, got {other:?}"),
        }
    }

    #[test]
    fn bridged_cubes_stay_single() {
        // S3: two 3^3 cubes joined by a 1-voxel bridge.
        let mut map = XBrickMap::new();
        fill_box(&mut map, IVec3::ZERO, IVec3::splat(2), 1);
        fill_box(&mut map, IVec3::splat(5), IVec3::splat(7), 1);
        for x in 3..=5 {
            map.set_voxel(IVec3::new(x, 0, 0), 1);
        }

        assert!(matches!(
            map.split_disconnected_components(),
            SplitOutcome::Single
        ));
    }

    #[test]
    fn split_components_preserve_values_and_frame() {
        let mut map = XBrickMap::new();
        map.set_voxel(IVec3::new(0, 0, 0), 3);
        map.set_voxel(IVec3::new(40, 0, 0), 4);

        let SplitOutcome::Split(parts) = map.split_disconnected_components() else {
            panic!("expected a split");
        };
        assert_eq!(parts.len(), 2);
        let total: u32 = parts
            .iter()
            .map(|p| p.get_voxel(IVec3::ZERO) as u32 + p.get_voxel(IVec3::new(40, 0, 0)) as u32)
            .sum();
        assert_eq!(total, 7, "components keep original values and coordinates");
    }

    #[test]
    fn split_respects_volume_cap() {
        let mut map = XBrickMap::new();
        map.set_voxel(IVec3::ZERO, 1);
        map.set_voxel(IVec3::new(200, 200, 200), 1);
        assert!(matches!(
            map.split_disconnected_components(),
            SplitOutcome::TooLarge
        ));
    }

    #[test]
    fn structural_edits_raise_dirty_flags() {
        let mut map = XBrickMap::new();
        map.clear_dirty();

        map.set_voxel(IVec3::ZERO, 1);
        assert!(map.structure_dirty, "new brick is structural");
        assert!(map.dirty_bricks.contains(&(IVec3::ZERO, UVec3::ZERO)));

        map.clear_dirty();
        map.set_voxel(IVec3::new(1, 0, 0), 1);
        assert!(
            !map.structure_dirty,
            "write into an existing brick is byte-granular"
        );
        assert_eq!(map.dirty_bricks.len(), 1);
    }
}
