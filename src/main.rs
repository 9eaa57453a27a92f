use std::path::Path;

use progressive_tracer_lib::{
    application::{AppState, Application, Layer, Screen},
    camera::{Camera, CameraController},
    change::FrameInputs,
    config::{RendererConfig, MAX_REFLECTION_BOUNCE},
    driver::FrameDriver,
};
use wgpu::{CommandEncoderDescriptor, TextureViewDescriptor};
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent},
};

struct ProgressiveTracer {
    camera: Camera,
    camera_controller: CameraController,
    driver: FrameDriver,
    shade_enabled: bool,
    bounce_count: u32,
    light_yaw: f32,
    light_pitch: f32,
    light_intensity: f32,
}

impl ProgressiveTracer {
    fn light_direction(&self) -> glam::Vec3 {
        let orientation = glam::Quat::from_rotation_y(self.light_yaw)
            * glam::Quat::from_rotation_x(self.light_pitch);
        orientation * -glam::Vec3::Z
    }

    fn frame_inputs(&self) -> FrameInputs {
        FrameInputs {
            camera_to_world: self.camera.camera_to_world(),
            inverse_projection: self.camera.inverse_projection(),
            field_of_view: self.camera.fov_y_deg,
            shade_enabled: self.shade_enabled,
            bounce_count: self.bounce_count,
            light_direction: self.light_direction(),
            light_intensity: self.light_intensity,
        }
    }
}

impl Layer for ProgressiveTracer {
    type LayerErr = ();

    fn start(screen: &mut Screen, _app: &AppState) -> Self {
        let config = RendererConfig::default();
        let shade_enabled = config.shade_enabled;
        let bounce_count = config.bounce();

        let camera = Camera {
            aspect: screen.aspect_ratio(),
            ..Camera::default()
        };
        let driver =
            FrameDriver::new(screen, config).expect("default renderer configuration is valid");

        Self {
            camera,
            camera_controller: CameraController::new(4.0, 0.05),
            driver,
            shade_enabled,
            bounce_count,
            light_yaw: 0.6,
            light_pitch: -0.9,
            light_intensity: 1.2,
        }
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>, _state: &AppState, _screen: &mut Screen) {
        self.camera.aspect = new_size.width as f32 / new_size.height as f32;
    }

    fn process_event(&mut self, event: &Event<()>, screen: &mut Screen) {
        let Event::WindowEvent { event, .. } = event else {
            return;
        };

        self.camera_controller.process_events(&mut self.camera, event);

        let WindowEvent::KeyboardInput {
            input:
                KeyboardInput {
                    state: ElementState::Pressed,
                    virtual_keycode: Some(keycode),
                    ..
                },
            ..
        } = event
        else {
            return;
        };

        match keycode {
            VirtualKeyCode::T => {
                self.shade_enabled = !self.shade_enabled;
                tracing::info!(shade = self.shade_enabled, "shading toggled");
            }
            VirtualKeyCode::B => {
                self.bounce_count = (self.bounce_count + 1) % (MAX_REFLECTION_BOUNCE + 1);
                tracing::info!(bounces = self.bounce_count, "reflection bounce count cycled");
            }
            VirtualKeyCode::Left => self.light_yaw -= 0.1,
            VirtualKeyCode::Right => self.light_yaw += 0.1,
            VirtualKeyCode::Up => self.light_pitch = (self.light_pitch + 0.1).min(-0.1),
            VirtualKeyCode::Down => self.light_pitch = (self.light_pitch - 0.1).max(-1.5),
            VirtualKeyCode::Equals => self.light_intensity = (self.light_intensity * 1.25).min(20.0),
            VirtualKeyCode::Minus => self.light_intensity = (self.light_intensity * 0.8).max(0.05),
            VirtualKeyCode::G => {
                if let Err(err) = self.driver.enable(&screen.device) {
                    tracing::error!(%err, "scene regeneration failed");
                }
            }
            VirtualKeyCode::P => {
                if self.driver.enabled() {
                    self.driver.disable();
                } else if let Err(err) = self.driver.enable(&screen.device) {
                    tracing::error!(%err, "re-enabling the renderer failed");
                }
            }
            VirtualKeyCode::F12 => {
                if let Err(err) = self.driver.capture(screen, Path::new("screenshot.png")) {
                    tracing::error!(%err, "screenshot failed");
                }
            }
            _ => {}
        }
    }

    fn update(&mut self, app: &AppState, _screen: &mut Screen) {
        if app.frame_index() % 240 == 0 {
            tracing::debug!(
                delta_ms = app.delta_seconds() * 1000.0,
                samples = self.driver.sample_count(),
                "frame timing"
            );
        }
    }

    fn render(&mut self, _app: &AppState, screen: &mut Screen) -> Result<(), wgpu::SurfaceError> {
        let output = screen.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&TextureViewDescriptor::default());
        let mut encoder = screen
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        let inputs = self.frame_inputs();
        self.driver.frame(screen, &mut encoder, &view, &inputs);

        screen.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }

    fn shutdown(&mut self, _app: &AppState, _screen: &mut Screen) -> Result<(), Self::LayerErr> {
        self.driver.disable();
        tracing::info!("exiting");
        Ok(())
    }
}

fn main() {
    tracing_subscriber::fmt::init();
    pollster::block_on(Application::<ProgressiveTracer>::init());
}
