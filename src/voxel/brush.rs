use glam::{IVec3, Vec3, Vec3Swizzles};

use super::map::XBrickMap;

/// Stamping primitives for interactive editing. Every variant shares the
/// same contract: visit each lattice point of the bounding region and write
/// `val` where the shape predicate holds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Brush {
    Sphere { radius: f32 },
    Cube { half_extent: f32 },
    /// Base disc at the stamp centre, apex `height` voxels up.
    Cone { radius: f32, height: f32 },
    /// Square base at the stamp centre, apex `height` voxels up.
    Pyramid { half_extent: f32, height: f32 },
    Point,
}

impl Brush {
    /// Inclusive lattice offsets of the stamped region around the centre.
    fn bounds(&self) -> (IVec3, IVec3) {
        match *self {
            Brush::Sphere { radius } => {
                let r = radius.ceil() as i32;
                (IVec3::splat(-r), IVec3::splat(r))
            }
            Brush::Cube { half_extent } => {
                let r = half_extent.ceil() as i32;
                (IVec3::splat(-r), IVec3::splat(r))
            }
            Brush::Cone { radius, height } => {
                let r = radius.ceil() as i32;
                (IVec3::new(-r, 0, -r), IVec3::new(r, height.ceil() as i32, r))
            }
            Brush::Pyramid {
                half_extent,
                height,
            } => {
                let r = half_extent.ceil() as i32;
                (IVec3::new(-r, 0, -r), IVec3::new(r, height.ceil() as i32, r))
            }
            Brush::Point => (IVec3::ZERO, IVec3::ZERO),
        }
    }

    fn contains(&self, offset: Vec3) -> bool {
        match *self {
            Brush::Sphere { radius } => offset.length() <= radius,
            Brush::Cube { half_extent } => offset.abs().max_element() <= half_extent,
            Brush::Cone { radius, height } => {
                if offset.y < 0.0 || offset.y > height {
                    return false;
                }
                let r = radius * (1.0 - offset.y / height.max(1e-6));
                offset.xz().length() <= r
            }
            Brush::Pyramid {
                half_extent,
                height,
            } => {
                if offset.y < 0.0 || offset.y > height {
                    return false;
                }
                let r = half_extent * (1.0 - offset.y / height.max(1e-6));
                offset.x.abs() <= r && offset.z.abs() <= r
            }
            Brush::Point => offset == Vec3::ZERO,
        }
    }

    /// Writes `val` (0 erases) at every lattice point of the shape centred
    /// on `center`.
    pub fn stamp(&self, map: &mut XBrickMap, center: IVec3, val: u8) {
        let (lo, hi) = self.bounds();
        for z in lo.z..=hi.z {
            for y in lo.y..=hi.y {
                for x in lo.x..=hi.x {
                    let offset = IVec3::new(x, y, z);
                    if self.contains(offset.as_vec3()) {
                        map.set_voxel(center + offset, val);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_voxels(map: &XBrickMap, lo: IVec3, hi: IVec3) -> usize {
        let mut n = 0;
        for z in lo.z..=hi.z {
            for y in lo.y..=hi.y {
                for x in lo.x..=hi.x {
                    if map.get_voxel(IVec3::new(x, y, z)) != 0 {
                        n += 1;
                    }
                }
            }
        }
        n
    }

    #[test]
    fn sphere_radius_one_is_a_plus_shape() {
        let mut map = XBrickMap::new();
        Brush::Sphere { radius: 1.0 }.stamp(&mut map, IVec3::splat(10), 1);
        // Centre plus six face neighbours.
        assert_eq!(count_voxels(&map, IVec3::splat(5), IVec3::splat(15)), 7);
        assert_eq!(map.get_voxel(IVec3::new(11, 10, 10)), 1);
        assert_eq!(map.get_voxel(IVec3::new(11, 11, 10)), 0);
    }

    #[test]
    fn cube_brush_fills_the_box() {
        let mut map = XBrickMap::new();
        Brush::Cube { half_extent: 1.0 }.stamp(&mut map, IVec3::ZERO, 3);
        assert_eq!(count_voxels(&map, IVec3::splat(-2), IVec3::splat(2)), 27);
    }

    #[test]
    fn point_brush_writes_one_voxel() {
        let mut map = XBrickMap::new();
        Brush::Point.stamp(&mut map, IVec3::new(4, 5, 6), 2);
        assert_eq!(count_voxels(&map, IVec3::ZERO, IVec3::splat(10)), 1);
        assert_eq!(map.get_voxel(IVec3::new(4, 5, 6)), 2);
    }

    #[test]
    fn cone_narrows_towards_apex() {
        let mut map = XBrickMap::new();
        Brush::Cone {
            radius: 2.0,
            height: 2.0,
        }
        .stamp(&mut map, IVec3::ZERO, 1);

        assert_eq!(map.get_voxel(IVec3::new(2, 0, 0)), 1);
        assert_eq!(map.get_voxel(IVec3::new(2, 1, 0)), 0);
        assert_eq!(map.get_voxel(IVec3::new(1, 1, 0)), 1);
        assert_eq!(map.get_voxel(IVec3::new(0, 2, 0)), 1, "apex present");
        assert_eq!(map.get_voxel(IVec3::new(1, 2, 0)), 0);
    }

    #[test]
    fn erase_stamp_clears_voxels() {
        let mut map = XBrickMap::new();
        Brush::Cube { half_extent: 2.0 }.stamp(&mut map, IVec3::ZERO, 5);
        let before = count_voxels(&map, IVec3::splat(-3), IVec3::splat(3));
        Brush::Sphere { radius: 1.0 }.stamp(&mut map, IVec3::ZERO, 0);
        let after = count_voxels(&map, IVec3::splat(-3), IVec3::splat(3));
        assert_eq!(before - after, 7);
    }
}
