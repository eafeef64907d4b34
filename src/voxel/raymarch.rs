use glam::{IVec3, Vec3};

use crate::math::safe_inv_dir;

use super::{
    brick::{Brick, BRICK_DIM},
    map::XBrickMap,
    sector::SECTOR_SIZE,
};

/// Hard bound on DDA iterations; reaching it reports a miss.
pub const MAX_RAY_STEPS: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub t: f32,
    pub voxel: IVec3,
    pub normal: Vec3,
    pub value: u8,
}

/// Distance along the ray to the next `cell`-aligned plane past `p`.
/// `p` already carries the traversal bias, so the returned t is strictly
/// ahead of the current position.
fn step_to_boundary(p: Vec3, origin: Vec3, dir: Vec3, inv_dir: Vec3, cell: f32) -> f32 {
    let mut t_next = f32::INFINITY;
    for axis in 0..3 {
        let boundary = if dir[axis] >= 0.0 {
            ((p[axis] / cell).floor() + 1.0) * cell
        } else {
            (p[axis] / cell).floor() * cell
        };
        t_next = t_next.min((boundary - origin[axis]) * inv_dir[axis]);
    }
    t_next
}

fn face_normal(origin: Vec3, dir: Vec3, t: f32, voxel: IVec3) -> Vec3 {
    // Dominant axis of the hit point's offset from the voxel centre; its
    // sign picks the face. X wins exact ties, then Y.
    let local = origin + dir * t - (voxel.as_vec3() + 0.5);
    let mut axis = 0;
    for candidate in 1..3 {
        if local[candidate].abs() > local[axis].abs() {
            axis = candidate;
        }
    }
    let mut normal = Vec3::ZERO;
    normal[axis] = local[axis].signum();
    normal
}

impl XBrickMap {
    /// Hierarchical DDA through the map in object space. Empty space is
    /// skipped at sector (32), brick (8) and micro-block (2) granularity
    /// using the presence bitmasks; SOLID bricks hit immediately.
    pub fn ray_march(&self, origin: Vec3, dir: Vec3, t_min: f32, t_max: f32) -> Option<RayHit> {
        let aabb = self.current_aabb()?;
        let inv_dir = safe_inv_dir(dir);
        let (enter, exit) = aabb.ray_intersect(origin, inv_dir, t_min, t_max)?;

        let mut t = enter;
        for _ in 0..MAX_RAY_STEPS {
            if t > exit {
                return None;
            }
            // Nudge across the boundary we just stepped to. The bias scales
            // up once t is large enough for float spacing to swallow 1e-3.
            let bias = if t < 100.0 { 1e-3 } else { 5e-3 };
            let p = origin + dir * (t + bias);
            let g = p.floor().as_ivec3();
            let (sc, bc, vc) = Self::split_coord(g);

            let Some(sector) = self.sector(sc) else {
                t = step_to_boundary(p, origin, dir, inv_dir, SECTOR_SIZE as f32).max(t);
                continue;
            };
            let Some(brick) = sector.get(bc) else {
                t = step_to_boundary(p, origin, dir, inv_dir, BRICK_DIM as f32).max(t);
                continue;
            };
            if brick.is_solid() {
                return Some(RayHit {
                    t,
                    voxel: g,
                    normal: face_normal(origin, dir, t, g),
                    value: brick.solid_value(),
                });
            }
            if brick.occupancy_mask & Brick::micro_bit(vc) == 0 {
                t = step_to_boundary(p, origin, dir, inv_dir, 2.0).max(t);
                continue;
            }
            let value = brick.get(vc);
            if value != 0 {
                return Some(RayHit {
                    t,
                    voxel: g,
                    normal: face_normal(origin, dir, t, g),
                    value,
                });
            }
            t = step_to_boundary(p, origin, dir, inv_dir, 1.0).max(t);
        }

        log::debug!("ray march exhausted {MAX_RAY_STEPS} steps, reporting no hit");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// First non-zero voxel along +x at the given row, by brute force.
    fn scan_row_x(map: &XBrickMap, y: i32, z: i32, range: std::ops::Range<i32>) -> Option<IVec3> {
        for x in range {
            if map.get_voxel(IVec3::new(x, y, z)) != 0 {
                return Some(IVec3::new(x, y, z));
            }
        }
        None
    }

    #[test]
    fn ray_through_void_hits_lone_voxel() {
        // S4: one voxel at (100, 0, 0), ray from the origin along +x.
        let mut map = XBrickMap::new();
        map.set_voxel(IVec3::new(100, 0, 0), 1);

        let hit = map
            .ray_march(Vec3::ZERO, Vec3::X, 0.0, 1000.0)
            .expect("ray must reach the voxel");
        assert_eq!(hit.voxel, IVec3::new(100, 0, 0));
        assert!((hit.t - 100.0).abs() < 0.01, "t = {}", hit.t);
        assert_eq!(hit.normal, Vec3::new(-1.0, 0.0, 0.0));
        assert_eq!(hit.value, 1);
    }

    #[test]
    fn ray_march_agrees_with_naive_scan() {
        let mut map = XBrickMap::new();
        map.set_voxel(IVec3::new(3, 2, 2), 5);
        map.set_voxel(IVec3::new(6, 2, 2), 6);
        map.set_voxel(IVec3::new(0, 5, 1), 7);

        for (y, z) in [(2, 2), (5, 1), (0, 0)] {
            let expected = scan_row_x(&map, y, z, -8..16);
            let origin = Vec3::new(-8.0, y as f32 + 0.5, z as f32 + 0.5);
            let hit = map.ray_march(origin, Vec3::X, 0.0, 100.0);
            assert_eq!(hit.map(|h| h.voxel), expected, "row y={y} z={z}");
        }
    }

    #[test]
    fn reverse_ray_hits_far_voxel_first() {
        let mut map = XBrickMap::new();
        map.set_voxel(IVec3::new(3, 2, 2), 5);
        map.set_voxel(IVec3::new(6, 2, 2), 6);

        let origin = Vec3::new(20.0, 2.5, 2.5);
        let hit = map.ray_march(origin, -Vec3::X, 0.0, 100.0).unwrap();
        assert_eq!(hit.voxel, IVec3::new(6, 2, 2));
        assert_eq!(hit.normal, Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn miss_rays_report_no_hit() {
        let mut map = XBrickMap::new();
        map.set_voxel(IVec3::new(100, 0, 0), 1);

        assert!(map.ray_march(Vec3::ZERO, Vec3::Y, 0.0, 1000.0).is_none());
        assert!(map
            .ray_march(Vec3::new(0.0, 10.0, 0.0), Vec3::X, 0.0, 1000.0)
            .is_none());
        // Range too short to reach.
        assert!(map.ray_march(Vec3::ZERO, Vec3::X, 0.0, 50.0).is_none());
    }

    #[test]
    fn solid_brick_hits_with_uniform_value() {
        let mut map = XBrickMap::new();
        for z in 0..8 {
            for y in 0..8 {
                for x in 0..8 {
                    map.set_voxel(IVec3::new(x, y, z), 9);
                }
            }
        }
        assert!(map.brick((IVec3::ZERO, glam::UVec3::ZERO)).unwrap().is_solid());

        let hit = map
            .ray_march(Vec3::new(-4.0, 4.5, 4.5), Vec3::X, 0.0, 100.0)
            .unwrap();
        assert_eq!(hit.value, 9);
        assert!((hit.t - 4.0).abs() < 0.01);
    }

    #[test]
    fn empty_map_never_hits() {
        let map = XBrickMap::new();
        assert!(map.ray_march(Vec3::ZERO, Vec3::X, 0.0, 1000.0).is_none());
    }
}
