use std::path::Path;

use glam::Vec2;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use thiserror::Error;

use crate::accumulation::AccumulationTarget;
use crate::application::Screen;
use crate::change::{ChangeDetector, FrameInputs};
use crate::config::{ConfigError, RendererConfig};
use crate::kernel::{tile_count, KernelParams, KernelPort, TraceKernel};
use crate::renderer::{BlitPipeline, SphereBuffer};
use crate::scene::{self, SceneConfig};

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.01,
    g: 0.01,
    b: 0.015,
    a: 1.0,
};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no accumulation buffer to capture")]
    NoTarget,
    #[error("buffer mapping failed: {0}")]
    Map(#[from] wgpu::BufferAsyncError),
    #[error("mapping result never arrived")]
    Channel,
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Orchestrates one rendered frame: invalidation check, target sizing,
/// kernel dispatch over the tile grid, composite, presentation. Owns every
/// piece of mutable rendering state; lifecycle is tied to enable/disable.
pub struct FrameDriver<K: KernelPort = TraceKernel> {
    config: RendererConfig,
    kernel: K,
    spheres: SphereBuffer,
    target: AccumulationTarget,
    detector: ChangeDetector,
    blit: BlitPipeline,
    blit_binds: Option<[wgpu::BindGroup; 2]>,
    /// Seeded stream handing out one scene seed per generation run.
    scene_rng: SmallRng,
    /// Entropy stream for the per-frame sub-pixel jitter.
    jitter_rng: SmallRng,
    enabled: bool,
}

impl FrameDriver<TraceKernel> {
    pub fn new(screen: &Screen, config: RendererConfig) -> Result<Self, ConfigError> {
        let kernel = TraceKernel::new(&screen.device);
        Self::with_kernel(screen, config, kernel)
    }
}

impl<K: KernelPort> FrameDriver<K> {
    pub fn with_kernel(
        screen: &Screen,
        config: RendererConfig,
        kernel: K,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let seed = config.resolve_seed();
        tracing::info!(seed, "scene generation stream seeded");

        let mut driver = Self {
            kernel,
            spheres: SphereBuffer::new(),
            target: AccumulationTarget::new(&screen.device),
            detector: ChangeDetector::new(),
            blit: BlitPipeline::new(&screen.device, screen.config.format),
            blit_binds: None,
            scene_rng: SmallRng::seed_from_u64(seed),
            jitter_rng: SmallRng::from_entropy(),
            config,
            enabled: false,
        };
        driver.enable(&screen.device)?;
        Ok(driver)
    }

    /// Regenerate the scene and restart accumulation. Each run draws a fresh
    /// seed from the driver's stream, so re-enabling produces a new scene
    /// while the whole sequence stays reproducible from the configured seed.
    pub fn enable(&mut self, device: &wgpu::Device) -> Result<(), ConfigError> {
        let scene_config = SceneConfig {
            radius_range: self.config.sphere_radius,
            max_sphere_count: self.config.max_sphere_count,
            placement_radius: self.config.placement_radius,
            seed: self.scene_rng.gen(),
        };
        let spheres = scene::generate(&scene_config)?;
        tracing::info!(
            requested = scene_config.max_sphere_count,
            accepted = spheres.len(),
            "scene generated"
        );

        self.spheres.rebuild(device, &spheres);
        self.kernel.scene_changed();
        self.target.reset();
        self.enabled = true;
        Ok(())
    }

    /// Release the GPU scene resources. Frames present the clear color until
    /// the driver is enabled again.
    pub fn disable(&mut self) {
        self.spheres.release();
        self.kernel.scene_changed();
        self.enabled = false;
        tracing::info!("renderer disabled, sphere buffer released");
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn sample_count(&self) -> u32 {
        self.target.sample_count()
    }

    /// Drive one rendered frame and record it into `encoder`, presenting
    /// into `view`.
    pub fn frame(
        &mut self,
        screen: &Screen,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        inputs: &FrameInputs,
    ) {
        let mut converged = false;

        if self.enabled {
            if self.detector.should_reset(inputs) {
                tracing::debug!("watched input changed, accumulation restarted");
                self.target.reset();
            }

            let (width, height) = (screen.config.width, screen.config.height);
            self.kernel.ensure_size(&screen.device, width, height);

            if let Some(sample_view) = self.kernel.output_view() {
                if self
                    .target
                    .ensure_size(&screen.device, width, height, sample_view)
                {
                    if let Some(views) = self.target.views() {
                        self.blit_binds = Some([
                            self.blit.bind(&screen.device, views[0]),
                            self.blit.bind(&screen.device, views[1]),
                        ]);
                    }
                }

                self.kernel.prepare(&screen.device, &self.spheres);

                let params = KernelParams {
                    camera_to_world: inputs.camera_to_world,
                    inverse_projection: inputs.inverse_projection,
                    pixel_offset: Vec2::new(self.jitter_rng.gen(), self.jitter_rng.gen()),
                    shade_enabled: inputs.shade_enabled,
                    bounce_count: inputs.bounce_count,
                    light_direction: inputs.light_direction,
                    light_intensity: inputs.light_intensity,
                };
                self.kernel.set_parameters(&screen.queue, &params);

                if self
                    .kernel
                    .dispatch(encoder, tile_count(width), tile_count(height))
                {
                    self.target.composite(&screen.queue, encoder);
                    converged = true;
                }
            }
        }

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Present Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                    store: true,
                },
            })],
            depth_stencil_attachment: None,
        });
        if converged {
            if let Some(binds) = &self.blit_binds {
                self.blit.draw(&mut pass, &binds[self.target.front_index()]);
            }
        }
    }

    /// Read the converged image back and save it as a PNG.
    pub fn capture(&self, screen: &Screen, path: &Path) -> Result<(), CaptureError> {
        let texture = self.target.front_texture().ok_or(CaptureError::NoTarget)?;
        let (width, height) = (self.target.width(), self.target.height());

        const PIXEL_BYTES: u32 = 16; // rgba32float
        let unpadded_bytes_per_row = width * PIXEL_BYTES;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = (unpadded_bytes_per_row + align - 1) / align * align;

        let readback = screen.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Capture Buffer"),
            size: padded_bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = screen
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Capture Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &readback,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        screen.queue.submit(std::iter::once(encoder.finish()));

        let slice = readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        screen.device.poll(wgpu::Maintain::Wait);
        rx.recv().map_err(|_| CaptureError::Channel)??;

        let data = slice.get_mapped_range();
        let mut img = image::RgbaImage::new(width, height);
        for y in 0..height {
            let row_start = (y * padded_bytes_per_row) as usize;
            let row = &data[row_start..row_start + unpadded_bytes_per_row as usize];
            let texels: &[f32] = bytemuck::cast_slice(row);
            for x in 0..width {
                let texel = &texels[(x * 4) as usize..];
                let to_byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0) as u8;
                img.put_pixel(
                    x,
                    y,
                    image::Rgba([to_byte(texel[0]), to_byte(texel[1]), to_byte(texel[2]), 255]),
                );
            }
        }
        drop(data);
        readback.unmap();

        img.save(path)?;
        tracing::info!(
            path = %path.display(),
            samples = self.target.sample_count(),
            "screenshot saved"
        );
        Ok(())
    }
}
