mod commit;
mod picking;
mod tlas;

pub use {
    commit::{commit_scene, refresh_world_aabbs, CommitOutput, Frustum, HiZData},
    picking::{apply_brush, pick, pick_ray, PickHit},
    tlas::{build_tlas, TlasNode},
};

use std::{cell::RefCell, rc::Rc};

use glam::{Mat4, Quat, Vec3};

use crate::{math::Aabb, voxel::XBrickMap};

/// An instance's material table entry; palette value `v` indexes entry
/// `v - 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub base_color: [u8; 4],
    pub emissive: [u8; 4],
    pub roughness: f32,
    pub metalness: f32,
    pub ior: f32,
    pub transparency: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color: [200, 200, 200, 255],
            emissive: [0, 0, 0, 0],
            roughness: 0.8,
            metalness: 0.0,
            ior: 1.45,
            transparency: 0.0,
        }
    }
}

impl Material {
    pub fn with_color(base_color: [u8; 4]) -> Self {
        Self {
            base_color,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    Directional = 0,
    Point = 1,
    Spot = 2,
}

#[derive(Debug, Clone, Copy)]
pub struct Light {
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
    pub cone_cos: f32,
    pub kind: LightKind,
}

impl Light {
    pub fn directional(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            position: Vec3::ZERO,
            direction: direction.normalize(),
            color,
            intensity,
            range: f32::INFINITY,
            cone_cos: -1.0,
            kind: LightKind::Directional,
        }
    }

    pub fn point(position: Vec3, color: Vec3, intensity: f32, range: f32) -> Self {
        Self {
            position,
            direction: Vec3::NEG_Y,
            color,
            intensity,
            range,
            cone_cos: -1.0,
            kind: LightKind::Point,
        }
    }

    pub fn spot(
        position: Vec3,
        direction: Vec3,
        color: Vec3,
        intensity: f32,
        range: f32,
        cone_angle: f32,
    ) -> Self {
        Self {
            position,
            direction: direction.normalize(),
            color,
            intensity,
            range,
            cone_cos: cone_angle.cos(),
            kind: LightKind::Spot,
        }
    }
}

/// A map shared between instances; cloned on first write when more than one
/// instance still points at it.
pub type SharedMap = Rc<RefCell<XBrickMap>>;

/// A placed voxel volume: transform, shared geometry, material table.
#[derive(Debug)]
pub struct VoxelObject {
    translation: Vec3,
    rotation: Quat,
    scale: Vec3,
    pub map: SharedMap,
    pub materials: Vec<Material>,
    /// Tight world box over the transformed object AABB; absent while the
    /// map is empty. Maintained by `commit_scene`.
    pub world_aabb: Option<Aabb>,
    /// Distance beyond which a coarser representation may be substituted.
    pub lod_threshold: f32,
    transform_dirty: bool,
}

impl VoxelObject {
    pub fn new(map: XBrickMap) -> Self {
        Self::from_shared(Rc::new(RefCell::new(map)))
    }

    /// Instances `map` without copying; edits trigger copy-on-write.
    pub fn from_shared(map: SharedMap) -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            map,
            materials: vec![Material::default()],
            world_aabb: None,
            lod_threshold: f32::INFINITY,
            transform_dirty: true,
        }
    }

    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn set_transform(&mut self, translation: Vec3, rotation: Quat, scale: Vec3) {
        self.translation = translation;
        self.rotation = rotation;
        self.scale = scale;
        self.transform_dirty = true;
    }

    pub fn set_translation(&mut self, translation: Vec3) {
        self.translation = translation;
        self.transform_dirty = true;
    }

    pub fn transform_dirty(&self) -> bool {
        self.transform_dirty
    }

    pub(crate) fn clear_transform_dirty(&mut self) {
        self.transform_dirty = false;
    }

    pub fn object_to_world(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    pub fn world_to_object(&self) -> Mat4 {
        self.object_to_world().inverse()
    }

    /// Copy-on-write: clones the map when another instance still shares it.
    /// Returns whether a clone happened.
    pub fn make_map_unique(&mut self) -> bool {
        if Rc::strong_count(&self.map) <= 1 {
            return false;
        }
        let clone = self.map.borrow().copy();
        self.map = Rc::new(RefCell::new(clone));
        true
    }
}

#[derive(Debug, Default)]
pub struct Scene {
    pub objects: Vec<VoxelObject>,
    pub lights: Vec<Light>,
    pub ambient: Vec3,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            lights: Vec::new(),
            ambient: Vec3::splat(0.03),
        }
    }

    pub fn add_object(&mut self, object: VoxelObject) -> usize {
        self.objects.push(object);
        self.objects.len() - 1
    }
}
