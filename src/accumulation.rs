use bytemuck::{Pod, Zeroable};

use crate::kernel::tile_count;

/// CPU-side accumulation bookkeeping: target dimensions and the monotonic
/// sample counter that drives the blend weight.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AccumulationState {
    sample_count: u32,
    width: u32,
    height: u32,
    allocated: bool,
}

impl AccumulationState {
    /// True when the buffer must be (re)created for the requested size.
    pub fn needs_realloc(&self, width: u32, height: u32) -> bool {
        !self.allocated || self.width != width || self.height != height
    }

    /// Record a fresh allocation; accumulated samples are gone with the old
    /// buffer.
    pub fn note_allocated(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.allocated = true;
        self.sample_count = 0;
    }

    /// Discard convergence without touching the allocation.
    pub fn reset(&mut self) {
        self.sample_count = 0;
    }

    pub fn advance(&mut self) {
        self.sample_count += 1;
    }

    /// Running-average weight for the next sample: every past sample ends up
    /// contributing equally once the new one is blended in.
    pub fn blend_weight(&self) -> f32 {
        1.0 / (self.sample_count as f32 + 1.0)
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct CompositeUniforms {
    weight: f32,
    width: u32,
    height: u32,
    _pad: u32,
}

struct Resources {
    textures: [wgpu::Texture; 2],
    views: [wgpu::TextureView; 2],
    bind_groups: [wgpu::BindGroup; 2],
    front: usize,
}

/// Owns the persistent floating-point image the kernel's samples converge
/// into. A ping-pong texture pair is blended through a small compute pass:
/// the front texture always holds the most recently composited result.
pub struct AccumulationTarget {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    state: AccumulationState,
    resources: Option<Resources>,
}

impl AccumulationTarget {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader =
            device.create_shader_module(wgpu::include_wgsl!("asset/shader/composite.wgsl"));

        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[
                    texture_entry(0),
                    texture_entry(1),
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
                    wgpu::BindGroupLayoutEntry {
                        binding: 3,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
                label: Some("composite_bind_group_layout"),
            });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Composite Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Composite Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: "main",
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Composite Uniform Buffer"),
            size: std::mem::size_of::<CompositeUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            pipeline,
            bind_group_layout,
            uniform_buffer,
            state: AccumulationState::default(),
            resources: None,
        }
    }

    /// Compare requested dimensions to the current buffer; reallocate and
    /// restart accumulation only when they differ or no buffer exists yet.
    /// Returns true on reallocation so dependent bind groups can follow.
    pub fn ensure_size(
        &mut self,
        device: &wgpu::Device,
        width: u32,
        height: u32,
        sample_view: &wgpu::TextureView,
    ) -> bool {
        if !self.state.needs_realloc(width, height) {
            return false;
        }

        let textures = [
            create_target_texture(device, width, height),
            create_target_texture(device, width, height),
        ];
        let views = [
            textures[0].create_view(&wgpu::TextureViewDescriptor::default()),
            textures[1].create_view(&wgpu::TextureViewDescriptor::default()),
        ];
        let bind_groups = [
            self.bind(device, sample_view, &views[0], &views[1]),
            self.bind(device, sample_view, &views[1], &views[0]),
        ];

        self.resources = Some(Resources {
            textures,
            views,
            bind_groups,
            front: 0,
        });
        self.state.note_allocated(width, height);
        tracing::info!(width, height, "accumulation target allocated");
        true
    }

    fn bind(
        &self,
        device: &wgpu::Device,
        sample_view: &wgpu::TextureView,
        history: &wgpu::TextureView,
        output: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(sample_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(history),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(output),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
            ],
            label: Some("composite_bind_group"),
        })
    }

    /// Discard convergence; the allocation is untouched because the next
    /// composite overwrites it with full weight.
    pub fn reset(&mut self) {
        self.state.reset();
    }

    /// Blend the kernel's freshly rendered sample into the history with
    /// weight `1/(sample_count+1)` and advance the counter.
    pub fn composite(&mut self, queue: &wgpu::Queue, encoder: &mut wgpu::CommandEncoder) {
        let Some(resources) = &mut self.resources else {
            return;
        };

        let uniforms = CompositeUniforms {
            weight: self.state.blend_weight(),
            width: self.state.width,
            height: self.state.height,
            _pad: 0,
        };
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Composite Pass"),
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &resources.bind_groups[resources.front], &[]);
            pass.dispatch_workgroups(
                tile_count(self.state.width),
                tile_count(self.state.height),
                1,
            );
        }

        resources.front = 1 - resources.front;
        self.state.advance();
    }

    /// Both accumulation views, for building presentation bind groups.
    pub fn views(&self) -> Option<[&wgpu::TextureView; 2]> {
        self.resources
            .as_ref()
            .map(|resources| [&resources.views[0], &resources.views[1]])
    }

    /// Index of the most recently composited view.
    pub fn front_index(&self) -> usize {
        self.resources
            .as_ref()
            .map(|resources| resources.front)
            .unwrap_or(0)
    }

    /// The texture holding the converged image, if allocated.
    pub fn front_texture(&self) -> Option<&wgpu::Texture> {
        self.resources
            .as_ref()
            .map(|resources| &resources.textures[resources.front])
    }

    pub fn sample_count(&self) -> u32 {
        self.state.sample_count()
    }

    pub fn width(&self) -> u32 {
        self.state.width()
    }

    pub fn height(&self) -> u32 {
        self.state.height()
    }
}

fn create_target_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Accumulation Texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba32Float,
        usage: wgpu::TextureUsages::STORAGE_BINDING
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension: wgpu::TextureViewDimension::D2,
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
        },
        count: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_weights_reproduce_the_exact_running_average() {
        // composite(1.0) then composite(3.0) from a fresh state yields the
        // plain mean with full precision.
        let mut state = AccumulationState::default();
        state.note_allocated(800, 600);

        let mut buffer = 0.0f32;
        for sample in [1.0f32, 3.0] {
            let weight = state.blend_weight();
            buffer = buffer * (1.0 - weight) + sample * weight;
            state.advance();
        }
        assert_eq!(buffer, 2.0);
        assert_eq!(state.sample_count(), 2);
    }

    #[test]
    fn long_runs_stay_close_to_the_plain_mean() {
        let mut state = AccumulationState::default();
        state.note_allocated(64, 64);

        let samples: Vec<f32> = (1..=32).map(|i| i as f32).collect();
        let mut buffer = 0.0f32;
        for &sample in &samples {
            let weight = state.blend_weight();
            buffer = buffer * (1.0 - weight) + sample * weight;
            state.advance();
        }
        let mean = samples.iter().sum::<f32>() / samples.len() as f32;
        assert!((buffer - mean).abs() < 1e-4);
        assert_eq!(state.sample_count(), samples.len() as u32);
    }

    #[test]
    fn same_dimensions_do_not_force_a_realloc() {
        let mut state = AccumulationState::default();
        assert!(state.needs_realloc(800, 600));

        state.note_allocated(800, 600);
        state.advance();
        state.advance();
        assert!(!state.needs_realloc(800, 600));
        assert_eq!(state.sample_count(), 2);
    }

    #[test]
    fn resize_forces_a_realloc_and_restarts_accumulation() {
        let mut state = AccumulationState::default();
        state.note_allocated(800, 600);
        state.advance();

        assert!(state.needs_realloc(1920, 1080));
        state.note_allocated(1920, 1080);
        assert_eq!(state.sample_count(), 0);
        assert_eq!((state.width(), state.height()), (1920, 1080));
    }

    #[test]
    fn reset_zeroes_the_counter_without_touching_the_allocation() {
        let mut state = AccumulationState::default();
        state.note_allocated(800, 600);
        state.advance();
        state.advance();
        state.advance();

        state.reset();
        assert_eq!(state.sample_count(), 0);
        assert!(!state.needs_realloc(800, 600));
        // The first sample after a reset fully replaces the stale history.
        assert_eq!(state.blend_weight(), 1.0);
    }
}
