use glam::UVec3;

/// Voxels per brick axis.
pub const BRICK_DIM: u32 = 8;
/// Voxels per brick.
pub const BRICK_VOLUME: usize = 512;
/// Micro-blocks per brick axis (2x2x2 voxels each).
pub const MICRO_DIM: u32 = 4;

/// Brick flag: every voxel holds the same non-zero palette value and the
/// payload is carried in the low byte of `atlas_offset` instead of the atlas.
pub const BRICK_FLAG_SOLID: u32 = 1;

/// Dense 8x8x8 voxel tile. `occupancy_mask` has one bit per 2x2x2
/// micro-block, set iff that micro-block contains any non-zero voxel.
#[derive(Debug, Clone)]
pub struct Brick {
    payload: [u8; BRICK_VOLUME],
    pub occupancy_mask: u64,
    pub flags: u32,
    pub atlas_offset: u32,
}

impl Default for Brick {
    fn default() -> Self {
        Self::new()
    }
}

impl Brick {
    pub fn new() -> Self {
        Self {
            payload: [0; BRICK_VOLUME],
            occupancy_mask: 0,
            flags: 0,
            atlas_offset: 0,
        }
    }

    /// X-major flat index of a voxel inside the brick.
    #[inline]
    pub fn voxel_index(pos: UVec3) -> usize {
        (pos.x + pos.y * BRICK_DIM + pos.z * BRICK_DIM * BRICK_DIM) as usize
    }

    /// Bit index of the micro-block containing `pos`.
    #[inline]
    pub fn micro_bit(pos: UVec3) -> u64 {
        let m = pos / 2;
        1u64 << (m.x + MICRO_DIM * m.y + MICRO_DIM * MICRO_DIM * m.z)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.occupancy_mask == 0
    }

    #[inline]
    pub fn is_solid(&self) -> bool {
        self.flags & BRICK_FLAG_SOLID != 0
    }

    /// The uniform palette value of a SOLID brick.
    #[inline]
    pub fn solid_value(&self) -> u8 {
        (self.atlas_offset & 0xFF) as u8
    }

    #[inline]
    pub fn get(&self, pos: UVec3) -> u8 {
        self.payload[Self::voxel_index(pos)]
    }

    pub fn payload(&self) -> &[u8; BRICK_VOLUME] {
        &self.payload
    }

    /// Writes one voxel and maintains the micro-block occupancy bit.
    /// Callers must `expand` a SOLID brick before writing into it.
    pub fn set(&mut self, pos: UVec3, val: u8) {
        debug_assert!(!self.is_solid(), "set() on a SOLID brick");
        self.payload[Self::voxel_index(pos)] = val;

        let bit = Self::micro_bit(pos);
        if val != 0 {
            self.occupancy_mask |= bit;
        } else if self.occupancy_mask & bit != 0 && self.micro_block_empty(pos / 2) {
            self.occupancy_mask &= !bit;
        }
    }

    fn micro_block_empty(&self, micro: UVec3) -> bool {
        let base = micro * 2;
        for dz in 0..2 {
            for dy in 0..2 {
                for dx in 0..2 {
                    if self.get(base + UVec3::new(dx, dy, dz)) != 0 {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Marks the brick SOLID iff the payload is uniform and non-zero,
    /// stashing the common value in the low byte of `atlas_offset`.
    /// The atlas slot itself is released by the owning map.
    pub fn try_compress(&mut self) -> bool {
        if self.is_solid() {
            return true;
        }
        let val = self.payload[0];
        if val == 0 || self.payload.iter().any(|&v| v != val) {
            return false;
        }
        self.flags |= BRICK_FLAG_SOLID;
        self.atlas_offset = val as u32;
        true
    }

    /// Clears SOLID and refills the payload with `val`. The caller assigns a
    /// fresh atlas slot afterwards.
    pub fn expand(&mut self, val: u8) {
        self.flags &= !BRICK_FLAG_SOLID;
        self.payload = [val; BRICK_VOLUME];
        self.occupancy_mask = if val == 0 { 0 } else { u64::MAX };
        self.atlas_offset = 0;
    }

    /// Occupancy recomputed from scratch; `set` keeps the incremental mask
    /// equal to this.
    #[cfg(test)]
    pub fn reference_mask(&self) -> u64 {
        let mut mask = 0u64;
        for (idx, &val) in self.payload.iter().enumerate() {
            if val != 0 {
                let pos = UVec3::new(
                    idx as u32 % BRICK_DIM,
                    (idx as u32 / BRICK_DIM) % BRICK_DIM,
                    idx as u32 / (BRICK_DIM * BRICK_DIM),
                );
                mask |= Self::micro_bit(pos);
            }
        }
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occupancy_tracks_payload() {
        let mut brick = Brick::new();
        assert!(brick.is_empty());

        brick.set(UVec3::new(0, 0, 0), 7);
        brick.set(UVec3::new(1, 1, 1), 7);
        brick.set(UVec3::new(7, 7, 7), 3);
        assert_eq!(brick.occupancy_mask, brick.reference_mask());
        assert_eq!(brick.occupancy_mask.count_ones(), 2);

        // Clearing one voxel of a shared micro-block keeps the bit set.
        brick.set(UVec3::new(0, 0, 0), 0);
        assert_eq!(brick.occupancy_mask, brick.reference_mask());
        assert_eq!(brick.occupancy_mask.count_ones(), 2);

        // Clearing the last voxel of the micro-block drops the bit.
        brick.set(UVec3::new(1, 1, 1), 0);
        assert_eq!(brick.occupancy_mask, brick.reference_mask());
        assert_eq!(brick.occupancy_mask.count_ones(), 1);

        brick.set(UVec3::new(7, 7, 7), 0);
        assert!(brick.is_empty());
    }

    #[test]
    fn micro_bit_layout() {
        // bit (mx + 4*my + 16*mz)
        assert_eq!(Brick::micro_bit(UVec3::new(0, 0, 0)), 1);
        assert_eq!(Brick::micro_bit(UVec3::new(2, 0, 0)), 1 << 1);
        assert_eq!(Brick::micro_bit(UVec3::new(0, 2, 0)), 1 << 4);
        assert_eq!(Brick::micro_bit(UVec3::new(0, 0, 2)), 1 << 16);
        assert_eq!(Brick::micro_bit(UVec3::new(7, 7, 7)), 1 << 63);
    }

    #[test]
    fn compress_expand_round_trip() {
        let mut brick = Brick::new();
        assert!(!brick.try_compress(), "empty brick must not compress");

        for z in 0..BRICK_DIM {
            for y in 0..BRICK_DIM {
                for x in 0..BRICK_DIM {
                    brick.set(UVec3::new(x, y, z), 42);
                }
            }
        }
        assert!(brick.try_compress());
        assert!(brick.is_solid());
        assert_eq!(brick.solid_value(), 42);
        assert_eq!(brick.atlas_offset & 0xFF, 42);

        brick.expand(42);
        assert!(!brick.is_solid());
        assert_eq!(brick.occupancy_mask, u64::MAX);
        assert!(brick.payload().iter().all(|&v| v == 42));
        assert!(brick.try_compress(), "expand is inverse of compress");
    }

    #[test]
    fn mixed_brick_does_not_compress() {
        let mut brick = Brick::new();
        brick.set(UVec3::new(0, 0, 0), 1);
        brick.set(UVec3::new(1, 0, 0), 2);
        assert!(!brick.try_compress());
        assert!(!brick.is_solid());
    }
}
