use glam::{IVec3, Vec2, Vec3};

use crate::{camera::Camera, math::safe_inv_dir, voxel::Brush};

use super::Scene;

/// Vertical field of view used for pick rays.
const PICK_FOV_Y: f32 = std::f32::consts::FRAC_PI_3; // 60 degrees

/// World-space ray under the mouse cursor. Pure function of its inputs.
pub fn pick_ray(mouse: Vec2, viewport: Vec2, camera: &Camera) -> (Vec3, Vec3) {
    let ndc_x = 2.0 * mouse.x / viewport.x - 1.0;
    let ndc_y = 1.0 - 2.0 * mouse.y / viewport.y;
    let tan_half = (PICK_FOV_Y * 0.5).tan();
    let aspect = viewport.x / viewport.y;

    let dir = (camera.forward()
        + camera.right() * ndc_x * aspect * tan_half
        + camera.up() * ndc_y * tan_half)
        .normalize();
    (camera.position, dir)
}

/// The closest voxel under a ray. `voxel` and `normal` are in the hit
/// instance's object space, which is where brushes stamp; `t` is the
/// world-space distance used to order hits across instances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickHit {
    pub object: usize,
    pub t: f32,
    pub voxel: IVec3,
    pub normal: Vec3,
    pub value: u8,
}

/// Broad phase: slab test against every instance's world AABB. Narrow
/// phase: object-space ray march. Keeps the closest hit.
pub fn pick(scene: &Scene, origin: Vec3, dir: Vec3) -> Option<PickHit> {
    let inv_dir = safe_inv_dir(dir);
    let mut best: Option<PickHit> = None;

    for (index, object) in scene.objects.iter().enumerate() {
        let Some(world_aabb) = object.world_aabb else {
            continue;
        };
        if world_aabb
            .ray_intersect(origin, inv_dir, 0.0, f32::INFINITY)
            .is_none()
        {
            continue;
        }

        let world_to_object = object.world_to_object();
        let local_origin = world_to_object.transform_point3(origin);
        let local_dir = world_to_object.transform_vector3(dir).normalize();

        let map = object.map.borrow();
        let Some(hit) = map.ray_march(local_origin, local_dir, 0.0, f32::MAX) else {
            continue;
        };

        let world_point = object
            .object_to_world()
            .transform_point3(local_origin + local_dir * hit.t);
        let t_world = (world_point - origin).length();
        if best.map_or(true, |b| t_world < b.t) {
            best = Some(PickHit {
                object: index,
                t: t_world,
                voxel: hit.voxel,
                normal: hit.normal,
                value: hit.value,
            });
        }
    }

    best
}

/// Stamps `brush` at a pick hit. Additive stamps deposit on the hit surface
/// by offsetting along the face normal; erase stamps in place. Shared maps
/// are cloned before the first write.
pub fn apply_brush(scene: &mut Scene, hit: &PickHit, brush: &Brush, value: u8) {
    let object = &mut scene.objects[hit.object];
    if object.make_map_unique() {
        log::info!(
            "copy-on-write: instance {} cloned its shared map before editing",
            hit.object
        );
    }

    let center = if value != 0 {
        hit.voxel + hit.normal.round().as_ivec3()
    } else {
        hit.voxel
    };
    brush.stamp(&mut object.map.borrow_mut(), center, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{refresh_world_aabbs, VoxelObject};
    use crate::voxel::XBrickMap;

    fn lone_voxel_object(at: Vec3) -> VoxelObject {
        let mut map = XBrickMap::new();
        map.set_voxel(IVec3::ZERO, 1);
        let mut object = VoxelObject::new(map);
        object.set_translation(at);
        object
    }

    #[test]
    fn center_pick_ray_is_the_camera_forward() {
        let camera = Camera::new(Vec3::new(1.0, 2.0, 3.0), -1.2, 0.3);
        let (origin, dir) = pick_ray(
            Vec2::new(320.0, 240.0),
            Vec2::new(640.0, 480.0),
            &camera,
        );
        assert_eq!(origin, camera.position);
        assert!((dir - camera.forward()).length() < 1e-5);
    }

    #[test]
    fn pick_returns_the_closest_instance() {
        let mut scene = Scene::new();
        scene.add_object(lone_voxel_object(Vec3::new(0.0, 0.0, -20.0)));
        scene.add_object(lone_voxel_object(Vec3::new(0.0, 0.0, -8.0)));
        refresh_world_aabbs(&mut scene);

        let hit = pick(&scene, Vec3::new(0.5, 0.5, 0.0), Vec3::NEG_Z).expect("must hit");
        assert_eq!(hit.object, 1);
        assert_eq!(hit.voxel, IVec3::ZERO);
        assert!((hit.t - 7.0).abs() < 0.05, "t = {}", hit.t);
        assert_eq!(hit.normal, Vec3::Z);
    }

    #[test]
    fn pick_misses_when_nothing_is_under_the_ray() {
        let mut scene = Scene::new();
        scene.add_object(lone_voxel_object(Vec3::new(0.0, 0.0, -20.0)));
        refresh_world_aabbs(&mut scene);

        assert!(pick(&scene, Vec3::new(10.0, 0.0, 0.0), Vec3::NEG_Z).is_none());
    }

    #[test]
    fn additive_brush_deposits_on_the_surface() {
        let mut scene = Scene::new();
        scene.add_object(lone_voxel_object(Vec3::new(0.0, 0.0, -8.0)));
        refresh_world_aabbs(&mut scene);

        let hit = pick(&scene, Vec3::new(0.5, 0.5, 0.0), Vec3::NEG_Z).unwrap();
        apply_brush(&mut scene, &hit, &Brush::Point, 2);

        let map = scene.objects[0].map.borrow();
        assert_eq!(map.get_voxel(IVec3::ZERO), 1, "original voxel untouched");
        assert_eq!(map.get_voxel(IVec3::new(0, 0, 1)), 2, "deposit on +z face");
    }

    #[test]
    fn erase_brush_stamps_in_place() {
        let mut scene = Scene::new();
        scene.add_object(lone_voxel_object(Vec3::new(0.0, 0.0, -8.0)));
        refresh_world_aabbs(&mut scene);

        let hit = pick(&scene, Vec3::new(0.5, 0.5, 0.0), Vec3::NEG_Z).unwrap();
        apply_brush(&mut scene, &hit, &Brush::Point, 0);
        assert_eq!(scene.objects[0].map.borrow().get_voxel(IVec3::ZERO), 0);
    }

    #[test]
    fn editing_a_shared_map_leaves_the_other_instance_intact() {
        let mut map = XBrickMap::new();
        map.set_voxel(IVec3::ZERO, 1);

        let mut scene = Scene::new();
        let first = VoxelObject::new(map);
        let shared = first.map.clone();
        scene.add_object(first);
        let mut second = VoxelObject::from_shared(shared);
        second.set_translation(Vec3::new(0.0, 0.0, -8.0));
        scene.add_object(second);
        refresh_world_aabbs(&mut scene);

        let hit = pick(&scene, Vec3::new(0.5, 0.5, 0.0), Vec3::NEG_Z).unwrap();
        assert_eq!(hit.object, 1);
        apply_brush(&mut scene, &hit, &Brush::Point, 0);

        assert_eq!(
            scene.objects[1].map.borrow().get_voxel(IVec3::ZERO),
            0,
            "edited instance sees the erase"
        );
        assert_eq!(
            scene.objects[0].map.borrow().get_voxel(IVec3::ZERO),
            1,
            "sibling instance keeps the pre-edit value"
        );
        assert_ne!(
            scene.objects[0].map.borrow().id(),
            scene.objects[1].map.borrow().id(),
            "maps diverged"
        );
    }
}
