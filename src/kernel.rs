use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};
use wgpu::util::DeviceExt;

use crate::config::MAX_REFLECTION_BOUNCE;
use crate::renderer::SphereBuffer;

/// Square tile edge used for every compute dispatch. Must match the
/// @workgroup_size declared in the shaders.
pub const TILE_SIZE: u32 = 8;

/// Number of tiles needed to cover `extent` pixels, rounded up over any
/// remainder.
pub fn tile_count(extent: u32) -> u32 {
    (extent + TILE_SIZE - 1) / TILE_SIZE
}

/// Per-frame parameters the driver pushes across the kernel boundary.
#[derive(Debug, Clone, Copy)]
pub struct KernelParams {
    pub camera_to_world: Mat4,
    pub inverse_projection: Mat4,
    pub pixel_offset: Vec2,
    pub shade_enabled: bool,
    pub bounce_count: u32,
    pub light_direction: Vec3,
    pub light_intensity: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
struct TraceUniforms {
    camera_to_world: [[f32; 4]; 4],
    inverse_projection: [[f32; 4]; 4],
    directional_light: [f32; 4],
    pixel_offset: [f32; 2],
    width: u32,
    height: u32,
    bounce_count: u32,
    shade_enabled: u32,
    sphere_count: u32,
    _pad: u32,
}

impl TraceUniforms {
    fn pack(params: &KernelParams, width: u32, height: u32, sphere_count: u32) -> Self {
        let light = params.light_direction;
        Self {
            camera_to_world: params.camera_to_world.to_cols_array_2d(),
            inverse_projection: params.inverse_projection.to_cols_array_2d(),
            directional_light: [light.x, light.y, light.z, params.light_intensity],
            pixel_offset: params.pixel_offset.to_array(),
            width,
            height,
            bounce_count: params.bounce_count.min(MAX_REFLECTION_BOUNCE),
            shade_enabled: params.shade_enabled as u32,
            sphere_count,
            _pad: 0,
        }
    }
}

/// Capability boundary to the opaque trace kernel: the driver supplies
/// buffers and parameters and dispatches over the tile grid; it never
/// inspects what the kernel does with them.
pub trait KernelPort {
    /// Size the kernel's output image to the viewport; true when the image
    /// was (re)created.
    fn ensure_size(&mut self, device: &wgpu::Device, width: u32, height: u32) -> bool;
    /// Invalidate bindings that reference the sphere buffer, after a rebuild
    /// or release.
    fn scene_changed(&mut self);
    /// Rebuild stale bindings; a scene without spheres binds a placeholder
    /// and renders the sky only.
    fn prepare(&mut self, device: &wgpu::Device, spheres: &SphereBuffer);
    /// Push the per-frame uniform values.
    fn set_parameters(&mut self, queue: &wgpu::Queue, params: &KernelParams);
    /// Record one dispatch covering the tile grid; false when bindings are
    /// not ready and the frame must be skipped.
    fn dispatch(&self, encoder: &mut wgpu::CommandEncoder, tiles_x: u32, tiles_y: u32) -> bool;
    /// View of the image the kernel renders into.
    fn output_view(&self) -> Option<&wgpu::TextureView>;
}

struct KernelOutput {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// Production kernel: the WGSL path tracing compute pipeline.
pub struct TraceKernel {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    /// Bound in place of the sphere list when the scene is empty.
    placeholder: wgpu::Buffer,
    output: Option<KernelOutput>,
    bind_group: Option<wgpu::BindGroup>,
    width: u32,
    height: u32,
    sphere_count: u32,
}

impl TraceKernel {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::include_wgsl!("asset/shader/trace.wgsl"));

        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::StorageTexture {
                            access: wgpu::StorageTextureAccess::WriteOnly,
                            format: wgpu::TextureFormat::Rgba32Float,
                            view_dimension: wgpu::TextureViewDimension::D2,
                        },
                        count: None,
                    },
                ],
                label: Some("trace_bind_group_layout"),
            });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Trace Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Trace Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: "main",
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Trace Uniform Buffer"),
            size: std::mem::size_of::<TraceUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // One zeroed record; the kernel never reads it while sphere_count
        // stays zero.
        let placeholder = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Sphere Placeholder Buffer"),
            contents: &[0u8; 40],
            usage: wgpu::BufferUsages::STORAGE,
        });

        Self {
            pipeline,
            bind_group_layout,
            uniform_buffer,
            placeholder,
            output: None,
            bind_group: None,
            width: 0,
            height: 0,
            sphere_count: 0,
        }
    }
}

impl KernelPort for TraceKernel {
    fn ensure_size(&mut self, device: &wgpu::Device, width: u32, height: u32) -> bool {
        if self.output.is_some() && self.width == width && self.height == height {
            return false;
        }

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Trace Output Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba32Float,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.output = Some(KernelOutput {
            _texture: texture,
            view,
        });
        self.width = width;
        self.height = height;
        self.bind_group = None;
        true
    }

    fn scene_changed(&mut self) {
        self.bind_group = None;
    }

    fn prepare(&mut self, device: &wgpu::Device, spheres: &SphereBuffer) {
        if self.bind_group.is_some() {
            return;
        }
        let Some(output) = &self.output else {
            return;
        };

        let sphere_binding = spheres.buffer().unwrap_or(&self.placeholder);
        self.bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: sphere_binding.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&output.view),
                },
            ],
            label: Some("trace_bind_group"),
        }));
        self.sphere_count = spheres.count();
    }

    fn set_parameters(&mut self, queue: &wgpu::Queue, params: &KernelParams) {
        let uniforms = TraceUniforms::pack(params, self.width, self.height, self.sphere_count);
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
    }

    fn dispatch(&self, encoder: &mut wgpu::CommandEncoder, tiles_x: u32, tiles_y: u32) -> bool {
        let Some(bind_group) = &self.bind_group else {
            return false;
        };

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Trace Pass"),
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(tiles_x, tiles_y, 1);
        true
    }

    fn output_view(&self) -> Option<&wgpu::TextureView> {
        self.output.as_ref().map(|output| &output.view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_grid_rounds_up_over_remainder_pixels() {
        assert_eq!(tile_count(8), 1);
        assert_eq!(tile_count(9), 2);
        assert_eq!(tile_count(800), 100);
        assert_eq!(tile_count(801), 101);
        assert_eq!(tile_count(1), 1);
    }

    #[test]
    fn trace_uniforms_match_the_shader_layout() {
        assert_eq!(std::mem::size_of::<TraceUniforms>(), 176);
    }

    #[test]
    fn packed_uniforms_carry_the_frame_parameters() {
        let params = KernelParams {
            camera_to_world: Mat4::IDENTITY,
            inverse_projection: Mat4::IDENTITY,
            pixel_offset: Vec2::new(0.25, 0.75),
            shade_enabled: true,
            bounce_count: 2,
            light_direction: Vec3::new(0.0, -1.0, 0.0),
            light_intensity: 1.5,
        };
        let uniforms = TraceUniforms::pack(&params, 800, 600, 42);
        assert_eq!(uniforms.directional_light, [0.0, -1.0, 0.0, 1.5]);
        assert_eq!(uniforms.pixel_offset, [0.25, 0.75]);
        assert_eq!((uniforms.width, uniforms.height), (800, 600));
        assert_eq!(uniforms.bounce_count, 2);
        assert_eq!(uniforms.shade_enabled, 1);
        assert_eq!(uniforms.sphere_count, 42);
    }

    #[test]
    fn bounce_count_is_clamped_defensively() {
        let params = KernelParams {
            camera_to_world: Mat4::IDENTITY,
            inverse_projection: Mat4::IDENTITY,
            pixel_offset: Vec2::ZERO,
            shade_enabled: false,
            bounce_count: 99,
            light_direction: Vec3::NEG_Y,
            light_intensity: 1.0,
        };
        let uniforms = TraceUniforms::pack(&params, 1, 1, 0);
        assert_eq!(uniforms.bounce_count, MAX_REFLECTION_BOUNCE);
        assert_eq!(uniforms.shade_enabled, 0);
    }
}
