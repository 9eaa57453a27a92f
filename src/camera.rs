use winit::event::{
    ElementState, KeyboardInput, MouseScrollDelta, VirtualKeyCode, WindowEvent,
};

/// Perspective camera the renderer reads each frame. Field of view is kept
/// in degrees, matching the option surface.
pub struct Camera {
    pub eye: glam::Vec3,
    pub target: glam::Vec3,
    pub up: glam::Vec3,
    pub aspect: f32,
    pub fov_y_deg: f32,
    pub z_near: f32,
    pub z_far: f32,
}

impl Camera {
    pub const MIN_FOV: f32 = 1.0;
    pub const MAX_FOV: f32 = 160.0;

    /// Transform from camera space into the world, consumed by the kernel
    /// for ray origins and directions.
    pub fn camera_to_world(&self) -> glam::Mat4 {
        glam::Mat4::look_at_rh(self.eye, self.target, self.up).inverse()
    }

    pub fn inverse_projection(&self) -> glam::Mat4 {
        glam::Mat4::perspective_rh(
            self.fov_y_deg.to_radians(),
            self.aspect,
            self.z_near,
            self.z_far,
        )
        .inverse()
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: glam::Vec3::new(0.0, 40.0, -120.0),
            target: glam::Vec3::ZERO,
            up: glam::Vec3::Y,
            aspect: 1.0,
            fov_y_deg: 60.0,
            z_near: 0.1,
            z_far: 1000.0,
        }
    }
}

pub struct CameraController {
    pub move_speed: f32,
    pub orbit_speed: f32,
}

impl CameraController {
    pub fn new(move_speed: f32, orbit_speed: f32) -> Self {
        Self {
            move_speed,
            orbit_speed,
        }
    }

    pub fn process_events(&self, camera: &mut Camera, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput {
                input:
                    KeyboardInput {
                        state,
                        virtual_keycode: Some(keycode),
                        ..
                    },
                ..
            } if *state == ElementState::Pressed => match keycode {
                VirtualKeyCode::W => {
                    self.dolly(camera, self.move_speed);
                    true
                }
                VirtualKeyCode::S => {
                    self.dolly(camera, -self.move_speed);
                    true
                }
                VirtualKeyCode::A => {
                    self.orbit(camera, self.orbit_speed);
                    true
                }
                VirtualKeyCode::D => {
                    self.orbit(camera, -self.orbit_speed);
                    true
                }
                VirtualKeyCode::Z => {
                    camera.fov_y_deg = (camera.fov_y_deg - 5.0).max(Camera::MIN_FOV);
                    tracing::debug!(fov = camera.fov_y_deg, "field of view narrowed");
                    true
                }
                VirtualKeyCode::X => {
                    camera.fov_y_deg = (camera.fov_y_deg + 5.0).min(Camera::MAX_FOV);
                    tracing::debug!(fov = camera.fov_y_deg, "field of view widened");
                    true
                }
                _ => false,
            },
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(position) => position.y as f32 / 40.0,
                };
                self.dolly(camera, scroll * self.move_speed);
                true
            }
            _ => false,
        }
    }

    /// Move the eye along the view direction without crossing the target.
    fn dolly(&self, camera: &mut Camera, amount: f32) {
        let to_target = camera.target - camera.eye;
        let distance = to_target.length();
        if distance - amount > camera.z_near * 10.0 {
            camera.eye += to_target / distance * amount;
        }
    }

    /// Rotate the eye around the target about the world up axis.
    fn orbit(&self, camera: &mut Camera, angle: f32) {
        let offset = camera.eye - camera.target;
        camera.eye = camera.target + glam::Quat::from_rotation_y(angle) * offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_to_world_inverts_the_view() {
        let camera = Camera::default();
        let view = glam::Mat4::look_at_rh(camera.eye, camera.target, camera.up);
        let round_trip = camera.camera_to_world() * view;
        assert!(round_trip.abs_diff_eq(glam::Mat4::IDENTITY, 1e-4));
    }

    #[test]
    fn orbit_preserves_the_distance_to_the_target() {
        let controller = CameraController::new(4.0, 0.1);
        let mut camera = Camera::default();
        let before = (camera.eye - camera.target).length();
        controller.orbit(&mut camera, 0.5);
        let after = (camera.eye - camera.target).length();
        assert!((before - after).abs() < 1e-3);
    }
}
