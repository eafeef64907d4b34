use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::math::{project_to_screen, Aabb};

use super::{build_tlas, Scene, TlasNode};

/// Six inward-facing frustum planes `Ax + By + Cz + D >= 0`, extracted from
/// a view-projection matrix.
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    pub fn from_view_proj(view_proj: &Mat4) -> Self {
        let r0 = view_proj.row(0);
        let r1 = view_proj.row(1);
        let r2 = view_proj.row(2);
        let r3 = view_proj.row(3);
        Self {
            // left, right, bottom, top, near (z' >= 0), far
            planes: [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2],
        }
    }

    /// Standard p-vertex test: the corner furthest along each plane normal
    /// must sit on the inside. Boxes straddling a plane pass.
    pub fn contains_aabb(&self, aabb: &Aabb) -> bool {
        for plane in &self.planes {
            let p = Vec3::new(
                if plane.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            if plane.dot(p.extend(1.0)) < 0.0 {
                return false;
            }
        }
        true
    }
}

/// Host copy of one Hi-Z readback level: max-reduced linear ray distance
/// from the previous frame, plus the view-projection that produced it.
#[derive(Debug, Clone)]
pub struct HiZData {
    pub width: u32,
    pub height: u32,
    pub viewport_width: f32,
    pub viewport_height: f32,
    pub depth: Vec<f32>,
    pub view_proj: Mat4,
}

impl HiZData {
    /// Max depth over an inclusive texel rectangle, clamped to the level.
    fn max_depth_in(&self, lo: Vec2, hi: Vec2) -> Option<f32> {
        let scale_x = self.width as f32 / self.viewport_width;
        let scale_y = self.height as f32 / self.viewport_height;
        let x0 = ((lo.x * scale_x).floor() as i64).clamp(0, self.width as i64 - 1) as u32;
        let x1 = ((hi.x * scale_x).ceil() as i64).clamp(0, self.width as i64 - 1) as u32;
        let y0 = ((lo.y * scale_y).floor() as i64).clamp(0, self.height as i64 - 1) as u32;
        let y1 = ((hi.y * scale_y).ceil() as i64).clamp(0, self.height as i64 - 1) as u32;
        if x1 < x0 || y1 < y0 {
            return None;
        }
        let mut max = f32::NEG_INFINITY;
        for y in y0..=y1 {
            for x in x0..=x1 {
                max = max.max(self.depth[(y * self.width + x) as usize]);
            }
        }
        Some(max)
    }
}

/// Conservative occlusion test against last frame's Hi-Z. Anything touching
/// the projection plane, or whose screen rectangle degenerates, counts as
/// visible.
fn occluded_by_hiz(aabb: &Aabb, hiz: &HiZData) -> bool {
    let mut min_w = f32::INFINITY;
    let mut rect_lo = Vec2::splat(f32::INFINITY);
    let mut rect_hi = Vec2::splat(f32::NEG_INFINITY);

    for corner in aabb.corners() {
        let clip = hiz.view_proj * corner.extend(1.0);
        let Some(screen) = project_to_screen(clip, hiz.viewport_width, hiz.viewport_height) else {
            return false;
        };
        rect_lo = rect_lo.min(Vec2::new(screen.x, screen.y));
        rect_hi = rect_hi.max(Vec2::new(screen.x, screen.y));
        min_w = min_w.min(screen.z);
    }

    match hiz.max_depth_in(rect_lo, rect_hi) {
        Some(max_occluder) => min_w > max_occluder,
        None => false,
    }
}

#[derive(Debug)]
pub struct CommitOutput {
    /// Indices into `scene.objects`, in scene order.
    pub visible: Vec<usize>,
    pub tlas: Vec<TlasNode>,
}

/// Recomputes stale world AABBs from the object AABB and transform.
pub fn refresh_world_aabbs(scene: &mut Scene) {
    for object in &mut scene.objects {
        let map_aabb_dirty = object.map.borrow().aabb_dirty;
        if !object.transform_dirty() && !map_aabb_dirty && object.world_aabb.is_some() {
            continue;
        }
        let object_aabb = object.map.borrow_mut().compute_aabb();
        object.world_aabb = object_aabb.map(|aabb| aabb.transform(&object.object_to_world()));
        object.clear_transform_dirty();
    }
}

/// The per-frame commit: refresh world AABBs, cull against the frustum and
/// (when available) last frame's Hi-Z, rebuild the TLAS over the visible
/// set. The TLAS is rebuilt whenever anything is visible because identity
/// and order may change even when the count does not.
pub fn commit_scene(scene: &mut Scene, frustum: &Frustum, hiz: Option<&HiZData>) -> CommitOutput {
    refresh_world_aabbs(scene);

    let mut visible = Vec::new();
    for (index, object) in scene.objects.iter().enumerate() {
        let Some(world_aabb) = object.world_aabb else {
            continue;
        };
        if !frustum.contains_aabb(&world_aabb) {
            continue;
        }
        if let Some(hiz) = hiz {
            if occluded_by_hiz(&world_aabb, hiz) {
                continue;
            }
        }
        visible.push(index);
    }

    let aabbs: Vec<Aabb> = visible
        .iter()
        .map(|&i| scene.objects[i].world_aabb.expect("culled above"))
        .collect();
    let tlas = build_tlas(&aabbs);

    CommitOutput { visible, tlas }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frustum() -> Frustum {
        // S6: perspective, 90 degree vertical FOV, aspect 1, near 1,
        // far 100, camera at the origin looking along -z.
        let proj = Mat4::perspective_rh(90_f32.to_radians(), 1.0, 1.0, 100.0);
        Frustum::from_view_proj(&proj)
    }

    #[test]
    fn frustum_keeps_box_in_front() {
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, -10.0), Vec3::new(1.0, 1.0, -5.0));
        assert!(test_frustum().contains_aabb(&aabb));
    }

    #[test]
    fn frustum_rejects_box_behind_camera() {
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, 2.0), Vec3::new(1.0, 1.0, 5.0));
        assert!(!test_frustum().contains_aabb(&aabb));
    }

    #[test]
    fn frustum_rejects_box_beyond_far_plane() {
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, -200.0), Vec3::new(1.0, 1.0, -150.0));
        assert!(!test_frustum().contains_aabb(&aabb));
    }

    #[test]
    fn frustum_keeps_straddling_and_enclosing_boxes() {
        let frustum = test_frustum();
        // Straddles the left plane.
        let straddle = Aabb::new(Vec3::new(-20.0, -1.0, -8.0), Vec3::new(0.0, 1.0, -6.0));
        assert!(frustum.contains_aabb(&straddle));
        // Fully encloses the frustum.
        let enclosing = Aabb::new(Vec3::splat(-1000.0), Vec3::splat(1000.0));
        assert!(frustum.contains_aabb(&enclosing));
        // Strictly outside one plane.
        let outside = Aabb::new(Vec3::new(-40.0, -1.0, -8.0), Vec3::new(-30.0, 1.0, -6.0));
        assert!(!frustum.contains_aabb(&outside));
    }

    fn flat_hiz(depth: f32) -> HiZData {
        HiZData {
            width: 4,
            height: 4,
            viewport_width: 256.0,
            viewport_height: 256.0,
            depth: vec![depth; 16],
            view_proj: Mat4::perspective_rh(90_f32.to_radians(), 1.0, 1.0, 100.0),
        }
    }

    #[test]
    fn hiz_occludes_box_behind_uniform_depth() {
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, -21.0), Vec3::new(1.0, 1.0, -20.0));
        assert!(occluded_by_hiz(&aabb, &flat_hiz(5.0)));
        assert!(!occluded_by_hiz(&aabb, &flat_hiz(50.0)));
    }

    #[test]
    fn hiz_near_plane_corners_are_visible() {
        // One corner lands behind the projection plane: clip-w <= 0.
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, -5.0), Vec3::new(1.0, 1.0, 5.0));
        assert!(!occluded_by_hiz(&aabb, &flat_hiz(0.1)));
    }

    #[test]
    fn commit_culls_and_builds_tlas() {
        use crate::voxel::XBrickMap;
        use glam::IVec3;

        let mut scene = Scene::new();
        for x in [-2.0_f32, 2.0] {
            let mut map = XBrickMap::new();
            map.set_voxel(IVec3::ZERO, 1);
            let mut object = crate::scene::VoxelObject::new(map);
            object.set_translation(Vec3::new(x, 0.0, -10.0));
            scene.add_object(object);
        }
        // A third object behind the camera gets culled.
        let mut map = XBrickMap::new();
        map.set_voxel(IVec3::ZERO, 1);
        let mut object = crate::scene::VoxelObject::new(map);
        object.set_translation(Vec3::new(0.0, 0.0, 50.0));
        scene.add_object(object);
        // An empty map has no world AABB and is never visible.
        scene.add_object(crate::scene::VoxelObject::new(XBrickMap::new()));

        let output = commit_scene(&mut scene, &test_frustum(), None);
        assert_eq!(output.visible, vec![0, 1]);
        assert_eq!(output.tlas.len(), 3);
    }
}
