use glam::{IVec3, Quat, UVec3, Vec3};

use crate::{
    math,
    scene::{Light, Material, Scene, VoxelObject},
    voxel::{Brush, XBrickMap, BRICK_DIM},
};

#[derive(Debug, Clone, Copy)]
pub struct GenerationSettings {
    pub seed: i32,
    pub frequency: f32,
    pub octaves: u8,
    pub gain: f32,
    pub lacunarity: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            seed: 42,
            frequency: 0.04,
            octaves: 4,
            gain: 0.5,
            lacunarity: 2.0,
        }
    }
}

/// Fills a map with fBm terrain. Noise is sampled once per 8-voxel block
/// corner and trilinearly interpolated inside, so blocks whose corners are
/// all outside the surface are skipped wholesale.
pub fn terrain_map(settings: &GenerationSettings, dims: UVec3) -> XBrickMap {
    let blocks = dims / BRICK_DIM;
    let noise_dims = blocks + UVec3::ONE;
    let noise = simdnoise::NoiseBuilder::fbm_3d_offset(
        0.0,
        noise_dims.x as usize,
        0.0,
        noise_dims.y as usize,
        0.0,
        noise_dims.z as usize,
    )
    .with_seed(settings.seed)
    .with_freq(settings.frequency)
    .with_octaves(settings.octaves)
    .with_gain(settings.gain)
    .with_lacunarity(settings.lacunarity)
    .generate()
    .0;

    let mut map = XBrickMap::new();
    for bz in 0..blocks.z {
        for by in 0..blocks.y {
            for bx in 0..blocks.x {
                let block = UVec3::new(bx, by, bz);

                // Corner noise values; all-negative means an empty block.
                let mut corners = [0.0f32; 8];
                let mut sign_sum = 0.0;
                let mut i = 0;
                for dz in 0..2 {
                    for dy in 0..2 {
                        for dx in 0..2 {
                            let corner = block + UVec3::new(dx, dy, dz);
                            let val = noise[math::to_1d_index(corner, noise_dims)];
                            corners[i] = val;
                            sign_sum += val.signum();
                            i += 1;
                        }
                    }
                }
                if sign_sum == -8.0 {
                    continue;
                }

                let mut vals = [0.0f32; 512];
                math::tri_lerp_block(&corners, &[8, 8, 8], &mut vals);

                let base = (block * BRICK_DIM).as_ivec3();
                let mut i = 0;
                for z in 0..BRICK_DIM {
                    for y in 0..BRICK_DIM {
                        for x in 0..BRICK_DIM {
                            let val = vals[i as usize];
                            i += 1;
                            if val <= 0.0 {
                                continue;
                            }
                            // Palette by depth: grass on top, stone below.
                            let gy = base.y + y as i32;
                            let layer = gy as f32 / dims.y as f32;
                            let palette = if layer > 0.6 {
                                1
                            } else if layer > 0.3 {
                                2
                            } else {
                                3
                            };
                            map.set_voxel(base + IVec3::new(x as i32, y as i32, z as i32), palette);
                        }
                    }
                }
            }
        }
    }
    map
}

fn terrain_materials() -> Vec<Material> {
    vec![
        Material::with_color([92, 160, 70, 255]),  // grass
        Material::with_color([120, 92, 60, 255]),  // dirt
        Material::with_color([110, 110, 118, 255]), // stone
    ]
}

/// The out-of-the-box scene: a terrain slab, a brush-built sphere and a
/// second instance sharing the sphere's map (so the first edit exercises
/// copy-on-write), under a sun and a fill light.
pub fn build_demo_scene(settings: &GenerationSettings) -> Scene {
    let mut scene = Scene::new();

    let mut terrain = VoxelObject::new(terrain_map(settings, UVec3::new(128, 32, 128)));
    terrain.materials = terrain_materials();
    terrain.set_translation(Vec3::new(-64.0, -32.0, -64.0));
    scene.add_object(terrain);

    let mut sphere_map = XBrickMap::new();
    Brush::Sphere { radius: 6.0 }.stamp(&mut sphere_map, IVec3::ZERO, 1);
    let mut sphere = VoxelObject::new(sphere_map);
    sphere.materials = vec![Material::with_color([200, 60, 50, 255])];
    sphere.set_translation(Vec3::new(-12.0, 8.0, -20.0));
    let shared = sphere.map.clone();
    scene.add_object(sphere);

    let mut twin = VoxelObject::from_shared(shared);
    twin.materials = vec![Material::with_color([60, 110, 200, 255])];
    twin.set_transform(
        Vec3::new(12.0, 8.0, -20.0),
        Quat::from_rotation_y(0.7),
        Vec3::splat(0.5),
    );
    scene.add_object(twin);

    scene.lights.push(Light::directional(
        Vec3::new(-0.4, -1.0, -0.3),
        Vec3::new(1.0, 0.96, 0.9),
        1.2,
    ));
    scene.lights.push(Light::point(
        Vec3::new(0.0, 20.0, -20.0),
        Vec3::new(0.4, 0.5, 1.0),
        8.0,
        120.0,
    ));
    scene.lights.push(Light::spot(
        Vec3::new(24.0, 30.0, 12.0),
        Vec3::new(-0.4, -1.0, -0.2),
        Vec3::new(1.0, 0.85, 0.6),
        6.0,
        200.0,
        0.5,
    ));
    scene.ambient = Vec3::new(0.05, 0.06, 0.08);

    scene
}
