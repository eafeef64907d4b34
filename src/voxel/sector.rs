use glam::UVec3;

use super::brick::Brick;

/// Bricks per sector axis.
pub const SECTOR_DIM: u32 = 4;
/// Voxels per sector axis.
pub const SECTOR_SIZE: u32 = SECTOR_DIM * super::brick::BRICK_DIM;

/// 4x4x4 grid of bricks, stored as a presence bitmask plus a packed array of
/// the present bricks in ascending bit order. Memory stays proportional to
/// occupancy while lookups remain O(1) via popcount-below.
#[derive(Debug, Clone, Default)]
pub struct Sector {
    pub brick_mask: u64,
    packed_bricks: Vec<Brick>,
}

impl Sector {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn flat_index(pos: UVec3) -> u32 {
        pos.x + SECTOR_DIM * pos.y + SECTOR_DIM * SECTOR_DIM * pos.z
    }

    /// Position of a present brick inside `packed_bricks`: the number of set
    /// mask bits below its flat index.
    #[inline]
    fn packed_index(&self, flat: u32) -> usize {
        (self.brick_mask & ((1u64 << flat) - 1)).count_ones() as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.brick_mask == 0
    }

    pub fn brick_count(&self) -> usize {
        self.packed_bricks.len()
    }

    pub fn get(&self, pos: UVec3) -> Option<&Brick> {
        let flat = Self::flat_index(pos);
        if self.brick_mask & (1u64 << flat) == 0 {
            return None;
        }
        Some(&self.packed_bricks[self.packed_index(flat)])
    }

    pub fn get_mut(&mut self, pos: UVec3) -> Option<&mut Brick> {
        let flat = Self::flat_index(pos);
        if self.brick_mask & (1u64 << flat) == 0 {
            return None;
        }
        let idx = self.packed_index(flat);
        Some(&mut self.packed_bricks[idx])
    }

    /// Returns the brick at `pos`, inserting a zeroed brick at its packed
    /// position if absent. The flag reports whether an insert happened.
    pub fn get_or_create(&mut self, pos: UVec3) -> (&mut Brick, bool) {
        let flat = Self::flat_index(pos);
        let idx = self.packed_index(flat);
        let created = self.brick_mask & (1u64 << flat) == 0;
        if created {
            self.packed_bricks.insert(idx, Brick::new());
            self.brick_mask |= 1u64 << flat;
        }
        (&mut self.packed_bricks[idx], created)
    }

    /// Drops the brick at `pos` when its occupancy mask is zero.
    /// Returns true if a brick was removed.
    pub fn remove_if_empty(&mut self, pos: UVec3) -> bool {
        let flat = Self::flat_index(pos);
        if self.brick_mask & (1u64 << flat) == 0 {
            return false;
        }
        let idx = self.packed_index(flat);
        if !self.packed_bricks[idx].is_empty() {
            return false;
        }
        self.packed_bricks.remove(idx);
        self.brick_mask &= !(1u64 << flat);
        true
    }

    /// Present bricks in packed (ascending bit) order with their local
    /// brick coordinates.
    pub fn iter(&self) -> impl Iterator<Item = (UVec3, &Brick)> {
        let mask = self.brick_mask;
        self.packed_bricks.iter().scan(0u32, move |next_bit, brick| {
            let mut flat = *next_bit;
            while mask & (1u64 << flat) == 0 {
                flat += 1;
            }
            *next_bit = flat + 1;
            let pos = UVec3::new(
                flat % SECTOR_DIM,
                (flat / SECTOR_DIM) % SECTOR_DIM,
                flat / (SECTOR_DIM * SECTOR_DIM),
            );
            Some((pos, brick))
        })
    }

    #[cfg(test)]
    pub fn check_consistency(&self) {
        assert_eq!(
            self.brick_mask.count_ones() as usize,
            self.packed_bricks.len(),
            "mask/packed-array desync"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn popcount_matches_packed_len() {
        let mut sector = Sector::new();
        for pos in [
            UVec3::new(3, 0, 0),
            UVec3::new(0, 0, 0),
            UVec3::new(1, 2, 3),
            UVec3::new(3, 3, 3),
        ] {
            let (brick, created) = sector.get_or_create(pos);
            assert!(created);
            brick.set(UVec3::new(0, 0, 0), 1);
            sector.check_consistency();
        }
        assert_eq!(sector.brick_count(), 4);

        let (_, created) = sector.get_or_create(UVec3::new(0, 0, 0));
        assert!(!created, "existing brick must not be re-created");
        assert_eq!(sector.brick_count(), 4);
    }

    #[test]
    fn packed_order_is_ascending_bit_order() {
        let mut sector = Sector::new();
        // Insert out of order; iteration must come back sorted by flat index.
        for (pos, val) in [
            (UVec3::new(2, 1, 0), 3u8),
            (UVec3::new(0, 0, 0), 1),
            (UVec3::new(1, 0, 0), 2),
        ] {
            let (brick, _) = sector.get_or_create(pos);
            brick.set(UVec3::new(0, 0, 0), val);
        }

        let order: Vec<u32> = sector.iter().map(|(pos, _)| Sector::flat_index(pos)).collect();
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(order, sorted);

        // Values land where their coordinates say.
        assert_eq!(sector.get(UVec3::new(1, 0, 0)).unwrap().get(UVec3::ZERO), 2);
        assert_eq!(sector.get(UVec3::new(2, 1, 0)).unwrap().get(UVec3::ZERO), 3);
        assert!(sector.get(UVec3::new(3, 3, 3)).is_none());
    }

    #[test]
    fn remove_if_empty_only_drops_empty_bricks() {
        let mut sector = Sector::new();
        let (brick, _) = sector.get_or_create(UVec3::new(1, 1, 1));
        brick.set(UVec3::new(4, 4, 4), 9);

        assert!(!sector.remove_if_empty(UVec3::new(1, 1, 1)));
        assert_eq!(sector.brick_count(), 1);

        sector
            .get_mut(UVec3::new(1, 1, 1))
            .unwrap()
            .set(UVec3::new(4, 4, 4), 0);
        assert!(sector.remove_if_empty(UVec3::new(1, 1, 1)));
        assert!(sector.is_empty());
        sector.check_consistency();
    }
}
