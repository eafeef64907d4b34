use std::time::Duration;
use wgpu::util::DeviceExt;
use winit::{
    event::{ElementState, KeyEvent, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
};

use crate::gfx::Context;

/// Camera uniform as every GPU pass binds it. The four matrices plus four
/// packed vec4s pin the layout at 320 bytes.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    view_proj: [[f32; 4]; 4],
    proj: [[f32; 4]; 4],
    inv_view: [[f32; 4]; 4],
    inv_proj: [[f32; 4]; 4],
    pos: [f32; 4],
    light_hint: [f32; 4],
    ambient: [f32; 4],
    /// debug mode, render mode, visible light count, pad.
    modes: [u32; 4],
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraUniform {
    pub fn new() -> Self {
        Self {
            view_proj: glam::Mat4::IDENTITY.to_cols_array_2d(),
            proj: glam::Mat4::IDENTITY.to_cols_array_2d(),
            inv_view: glam::Mat4::IDENTITY.to_cols_array_2d(),
            inv_proj: glam::Mat4::IDENTITY.to_cols_array_2d(),
            pos: [0.0; 4],
            light_hint: [0.0; 4],
            ambient: [0.0; 4],
            modes: [0; 4],
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        view: glam::Mat4,
        projection: glam::Mat4,
        pos: glam::Vec3,
        light_hint: glam::Vec3,
        ambient: glam::Vec3,
        debug_mode: u32,
        render_mode: u32,
        light_count: u32,
    ) {
        self.view_proj = (projection * view).to_cols_array_2d();
        self.proj = projection.to_cols_array_2d();
        self.inv_view = view.inverse().to_cols_array_2d();
        self.inv_proj = projection.inverse().to_cols_array_2d();
        self.pos = pos.extend(1.0).to_array();
        self.light_hint = light_hint.extend(1.0).to_array();
        self.ambient = ambient.extend(1.0).to_array();
        self.modes = [debug_mode, render_mode, light_count, 0];
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub position: glam::Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

impl Camera {
    pub fn new(position: glam::Vec3, yaw: f32, pitch: f32) -> Self {
        Self {
            position,
            yaw,
            pitch,
        }
    }

    pub fn forward(&self) -> glam::Vec3 {
        glam::vec3(
            self.pitch.cos() * self.yaw.cos(),
            self.pitch.sin(),
            self.pitch.cos() * self.yaw.sin(),
        )
        .normalize()
    }

    pub fn right(&self) -> glam::Vec3 {
        self.forward().cross(glam::Vec3::Y).normalize()
    }

    pub fn up(&self) -> glam::Vec3 {
        self.right().cross(self.forward()).normalize()
    }

    pub fn get_view_matrix(&self) -> glam::Mat4 {
        glam::Mat4::look_to_rh(self.position, self.forward(), glam::Vec3::Y)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Projection {
    aspect: f32,
    fov_y: f32,
    z_near: f32,
    z_far: f32,
}

impl Projection {
    pub fn new(width: u32, height: u32, fov_y: f32, z_near: f32, z_far: f32) -> Self {
        Self {
            aspect: width as f32 / height as f32,
            fov_y,
            z_near,
            z_far,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height as f32;
    }

    pub fn get_matrix(&self) -> glam::Mat4 {
        glam::Mat4::perspective_rh(self.fov_y, self.aspect, self.z_near, self.z_far)
    }
}

#[derive(Debug)]
pub struct CameraController {
    camera: Camera,
    projection: Projection,
    uniform: CameraUniform,
    buffer: wgpu::Buffer,
    move_speed: f32,
    move_dirs_pressed: glam::IVec3,
    rot_dirs_pressed: glam::IVec2,
}

impl CameraController {
    pub fn new(context: &Context, camera: Camera, projection: Projection, move_speed: f32) -> Self {
        let uniform = CameraUniform::new();
        let buffer = context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Camera"),
                contents: bytemuck::cast_slice(&[uniform]),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

        Self {
            camera,
            projection,
            uniform,
            buffer,
            move_speed,
            move_dirs_pressed: glam::ivec3(0, 0, 0),
            rot_dirs_pressed: glam::ivec2(0, 0),
        }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn view_proj(&self) -> glam::Mat4 {
        self.projection.get_matrix() * self.camera.get_view_matrix()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.projection.resize(width, height);
    }

    pub fn process_events(&mut self, event: &WindowEvent) -> bool {
        let mut handled = true;
        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state,
                        physical_key: PhysicalKey::Code(keycode),
                        ..
                    },
                ..
            } => {
                let val = match state {
                    ElementState::Pressed => 1,
                    ElementState::Released => 0,
                };

                match keycode {
                    KeyCode::KeyW => self.move_dirs_pressed.z = val,
                    KeyCode::KeyS => self.move_dirs_pressed.z = -val,
                    KeyCode::KeyA => self.move_dirs_pressed.x = -val,
                    KeyCode::KeyD => self.move_dirs_pressed.x = val,
                    KeyCode::KeyQ => self.move_dirs_pressed.y = val,
                    KeyCode::KeyE => self.move_dirs_pressed.y = -val,
                    KeyCode::ArrowUp => self.rot_dirs_pressed.y = val,
                    KeyCode::ArrowDown => self.rot_dirs_pressed.y = -val,
                    KeyCode::ArrowLeft => self.rot_dirs_pressed.x = -val,
                    KeyCode::ArrowRight => self.rot_dirs_pressed.x = val,
                    _ => handled = false,
                }
            }
            _ => handled = false,
        }

        handled
    }

    pub fn update(&mut self, dt: Duration) {
        let dt = dt.as_secs_f32();
        let front = self.camera.forward();
        let right = self.camera.right();
        let up = self.camera.up();

        let ms = self.move_speed * dt;
        self.camera.position += front * ms * self.move_dirs_pressed.z as f32;
        self.camera.position += right * ms * self.move_dirs_pressed.x as f32;
        self.camera.position += up * ms * self.move_dirs_pressed.y as f32;

        let rot_ms = (self.move_speed * self.move_speed).to_radians() * dt;
        let max_pitch = 85_f32.to_radians();
        self.camera.yaw += rot_ms * self.rot_dirs_pressed.x as f32;
        self.camera.pitch += rot_ms * self.rot_dirs_pressed.y as f32;
        self.camera.pitch = self.camera.pitch.clamp(-max_pitch, max_pitch);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update_buffer(
        &mut self,
        context: &Context,
        light_hint: glam::Vec3,
        ambient: glam::Vec3,
        debug_mode: u32,
        render_mode: u32,
        light_count: u32,
    ) {
        self.uniform.update(
            self.camera.get_view_matrix(),
            self.projection.get_matrix(),
            self.camera.position,
            light_hint,
            ambient,
            debug_mode,
            render_mode,
            light_count,
        );
        context
            .queue
            .write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }

    pub fn get_buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_is_exactly_320_bytes() {
        assert_eq!(std::mem::size_of::<CameraUniform>(), 320);
    }

    #[test]
    fn camera_basis_is_orthonormal() {
        let camera = Camera::new(glam::Vec3::ZERO, 0.4, -0.2);
        let (f, r, u) = (camera.forward(), camera.right(), camera.up());
        assert!(f.dot(r).abs() < 1e-5);
        assert!(f.dot(u).abs() < 1e-5);
        assert!((f.length() - 1.0).abs() < 1e-5);
    }
}
