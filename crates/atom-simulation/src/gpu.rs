//! wgpu compute backend
//!
//! Device, shader and pipeline are created once and live as long as the backend.
//! Each step packs the frame, uploads it into fresh buffers, runs one dispatch and
//! blocks until the results are mapped back. There is no timeout on that wait.

use wgpu::util::DeviceExt;

use crate::backend::{ForceBackend, Frame};
use crate::error::{GpuError, StepError};
use crate::packing::{pack_frame, GpuAtom, PackedFrame};
use crate::params::PhysicsParams;

const WORKGROUP_SIZE: u32 = 64;

pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
    adapter_name: String,
    dispatches: u64,
}

impl GpuBackend {
    /// Open the default high-performance adapter, blocking until ready.
    pub fn new() -> Result<Self, GpuError> {
        pollster::block_on(Self::request())
    }

    pub async fn request() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;

        let adapter_name = adapter.get_info().name;
        log::info!("✓ Using GPU: {}", adapter_name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Atom Physics Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        Self::from_device(device, queue, adapter_name).await
    }

    /// Build the pipeline on an existing device (e.g. one shared with a renderer).
    pub async fn from_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        adapter_name: String,
    ) -> Result<Self, GpuError> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Atom Physics Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/atom_physics.wgsl").into()),
        });

        // 0: params (uniform)
        // 1-6: atoms, bond params, chunk table, bond offsets, bond counts, bond indices
        // 7: atoms out
        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        entries.extend((1..=7).map(|binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage {
                    read_only: binding != 7,
                },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }));

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Atom Physics Bind Group Layout"),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Atom Physics Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Atom Physics Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        if let Some(error) = device.pop_error_scope().await {
            return Err(GpuError::Pipeline(error.to_string()));
        }
        log::info!("Atom physics pipeline created");

        Ok(Self {
            device,
            queue,
            bind_group_layout,
            pipeline,
            adapter_name,
            dispatches: 0,
        })
    }

    pub fn dispatch_count(&self) -> u64 {
        self.dispatches
    }

    /// Run the kernel on a packed frame and read the updated atoms back.
    pub fn dispatch(
        &mut self,
        frame: &PackedFrame,
        params: &PhysicsParams,
    ) -> Result<Vec<GpuAtom>, GpuError> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }

        let params_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Physics Params Buffer"),
            contents: bytemuck::cast_slice(&[*params]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let atoms_in = self.storage("Atoms In Buffer", bytemuck::cast_slice(&frame.atoms));
        let bond_params = self.storage(
            "Bond Params Buffer",
            bytemuck::cast_slice(&frame.bond_params),
        );
        let chunks = self.storage("Chunk Table Buffer", bytemuck::cast_slice(&frame.chunks));
        let bond_offsets = self.storage(
            "Bond Offsets Buffer",
            bytemuck::cast_slice(&frame.bond_offsets),
        );
        let bond_counts = self.storage(
            "Bond Counts Buffer",
            bytemuck::cast_slice(&frame.bond_counts),
        );
        // Zero-sized bindings are invalid
        let indices: &[u32] = if frame.bond_indices.is_empty() {
            &[0]
        } else {
            &frame.bond_indices
        };
        let bond_indices = self.storage("Bond Indices Buffer", bytemuck::cast_slice(indices));

        let output_size = std::mem::size_of_val(frame.atoms.as_slice()) as u64;
        let atoms_out = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Atoms Out Buffer"),
            size: output_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Atoms Readback Staging Buffer"),
            size: output_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Atom Physics Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: atoms_in.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: bond_params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: chunks.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: bond_offsets.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: bond_counts.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: bond_indices.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 7,
                    resource: atoms_out.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Atom Physics Encoder"),
        });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Atom Physics Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            compute_pass.dispatch_workgroups(params.atom_count().div_ceil(WORKGROUP_SIZE), 1, 1);
        }
        encoder.copy_buffer_to_buffer(&atoms_out, 0, &staging, 0, output_size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        })?;
        receiver.recv().map_err(|_| GpuError::ReadbackDropped)??;

        let results = {
            let data = slice.get_mapped_range();
            bytemuck::cast_slice::<u8, GpuAtom>(&data).to_vec()
        };
        staging.unmap();

        self.dispatches += 1;
        log::trace!("gpu dispatch {}: {} atoms", self.dispatches, results.len());
        Ok(results)
    }

    fn storage(&self, label: &str, contents: &[u8]) -> wgpu::Buffer {
        self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage: wgpu::BufferUsages::STORAGE,
        })
    }
}

impl ForceBackend for GpuBackend {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn evaluate_and_integrate(&mut self, frame: Frame<'_>, dt: f32) -> Result<(), StepError> {
        let packed = pack_frame(frame.atoms, frame.bonds, frame.chunks)?;
        if packed.is_empty() {
            return Ok(());
        }
        let params = packed.params(frame.forces, dt);
        let results = self.dispatch(&packed, &params)?;
        packed.unpack_into(&results, frame.atoms);
        Ok(())
    }
}

impl Drop for GpuBackend {
    fn drop(&mut self) {
        log::info!(
            "Releasing GPU backend on {} after {} dispatches",
            self.adapter_name,
            self.dispatches
        );
    }
}
