use glam::{IVec3, Mat4, UVec3, Vec3, Vec4Swizzles};

/// Axis-aligned bounding box. `max` is exclusive for lattice-derived boxes:
/// a box over voxels `0..=3` has `min = 0.0`, `max = 4.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// The "nothing yet" box that any `grow` call replaces.
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn grow(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Tight box over the eight transformed corners.
    pub fn transform(&self, matrix: &Mat4) -> Aabb {
        let mut out = Aabb::empty();
        for corner in self.corners() {
            out.grow(matrix.transform_point3(corner));
        }
        out
    }

    /// Slab test. `inv_dir` must already be clamped away from zero.
    /// Returns the entry/exit distances clipped to `[t_min, t_max]`.
    pub fn ray_intersect(
        &self,
        origin: Vec3,
        inv_dir: Vec3,
        t_min: f32,
        t_max: f32,
    ) -> Option<(f32, f32)> {
        let t0 = (self.min - origin) * inv_dir;
        let t1 = (self.max - origin) * inv_dir;
        let t_near = t0.min(t1);
        let t_far = t0.max(t1);
        let enter = t_near.max_element().max(t_min);
        let exit = t_far.min_element().min(t_max);
        if enter <= exit {
            Some((enter, exit))
        } else {
            None
        }
    }
}

/// Reciprocal direction with each component clamped away from zero so the
/// slab and DDA boundary maths never divide by (almost) zero.
pub fn safe_inv_dir(dir: Vec3) -> Vec3 {
    const EPS: f32 = 1e-7;
    let clamp = |d: f32| {
        if d.abs() < EPS {
            if d.is_sign_negative() {
                -EPS
            } else {
                EPS
            }
        } else {
            d
        }
    };
    Vec3::new(1.0 / clamp(dir.x), 1.0 / clamp(dir.y), 1.0 / clamp(dir.z))
}

/// Component-wise floor division, giving sector/brick coordinates with the
/// correct semantics for negative voxel coordinates.
pub fn floor_div(p: IVec3, divisor: i32) -> IVec3 {
    IVec3::new(
        p.x.div_euclid(divisor),
        p.y.div_euclid(divisor),
        p.z.div_euclid(divisor),
    )
}

/// Component-wise euclidean remainder, the local coordinate that pairs with
/// [`floor_div`].
pub fn floor_rem(p: IVec3, divisor: i32) -> UVec3 {
    IVec3::new(
        p.x.rem_euclid(divisor),
        p.y.rem_euclid(divisor),
        p.z.rem_euclid(divisor),
    )
    .as_uvec3()
}

/// Maps a 3d index to a 1d index
pub fn to_1d_index(p: UVec3, dim: UVec3) -> usize {
    (p.x + p.y * dim.x + p.z * dim.x * dim.y) as usize
}

/// Computes a uniform grid of trilinear interpolations.
/// Expected order of `p` is from a nested `for` loop with the outer loop
/// being `z`.
#[inline]
pub fn tri_lerp_block(p: &[f32], dims: &[u32], vals: &mut [f32]) {
    assert_eq!(p.len(), 8);
    assert_eq!(dims.len(), 3);

    // Precalculate coefficients
    let a0 = p[0];
    let a1 = -p[0] + p[1];
    let a2 = -p[0] + p[2];
    let a3 = -p[0] + p[4];
    let a4 = p[0] - p[2] - p[1] + p[3];
    let a5 = p[0] - p[4] - p[1] + p[5];
    let a6 = p[0] - p[4] - p[2] + p[6];
    let a7 = -p[0] + p[4] + p[2] - p[6] + p[1] - p[5] - p[3] + p[7];

    // Calculate each value
    let dx_max = (dims[0] - 1) as f32;
    let dy_max = (dims[1] - 1) as f32;
    let dz_max = (dims[2] - 1) as f32;
    let mut i = 0;
    for z in 0..dims[0] {
        for y in 0..dims[1] {
            for x in 0..dims[2] {
                let dx = x as f32 / dx_max;
                let dy = y as f32 / dy_max;
                let dz = z as f32 / dz_max;

                let val = a0
                    + a1 * dx
                    + a2 * dy
                    + a3 * dz
                    + a4 * dx * dy
                    + a5 * dx * dz
                    + a6 * dy * dz
                    + a7 * dx * dy * dz;
                vals[i] = val;
                i += 1;
            }
        }
    }
}

/// Clip-space position to pixel coordinates plus the clip-w distance.
/// `None` when the point is on or behind the projection plane.
pub fn project_to_screen(clip: glam::Vec4, viewport_width: f32, viewport_height: f32) -> Option<Vec3> {
    if clip.w <= 0.0 {
        return None;
    }
    let ndc = clip.xyz() / clip.w;
    Some(Vec3::new(
        (ndc.x * 0.5 + 0.5) * viewport_width,
        (1.0 - (ndc.y * 0.5 + 0.5)) * viewport_height,
        clip.w,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_div_negative_coords() {
        assert_eq!(floor_div(IVec3::new(-1, 0, 31), 32), IVec3::new(-1, 0, 0));
        assert_eq!(
            floor_div(IVec3::new(-32, -33, 32), 32),
            IVec3::new(-1, -2, 1)
        );
        assert_eq!(floor_rem(IVec3::new(-1, 0, 33), 32), UVec3::new(31, 0, 1));
    }

    #[test]
    fn aabb_slab_test() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::splat(8.0));
        let inv = safe_inv_dir(Vec3::X);
        let hit = aabb.ray_intersect(Vec3::new(-4.0, 4.0, 4.0), inv, 0.0, 100.0);
        assert_eq!(hit, Some((4.0, 12.0)));
        assert!(aabb
            .ray_intersect(Vec3::new(-4.0, 9.0, 4.0), inv, 0.0, 100.0)
            .is_none());
    }

    #[test]
    fn aabb_transform_is_tight_over_corners() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let m = Mat4::from_translation(Vec3::new(3.0, 0.0, 0.0));
        let out = aabb.transform(&m);
        assert_eq!(out.min, Vec3::new(3.0, 0.0, 0.0));
        assert_eq!(out.max, Vec3::new(4.0, 1.0, 1.0));
    }
}
