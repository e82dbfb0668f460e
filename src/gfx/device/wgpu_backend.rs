// src/gfx/device/wgpu_backend.rs
//! wgpu backend
//!
//! Draws issued through the context are queued between [`begin_frame`] and
//! [`end_frame`] and replayed into a single render pass. Render pipelines
//! are created lazily, one per program and attribute layout, and cached.
//!
//! [`begin_frame`]: WgpuBackend::begin_frame
//! [`end_frame`]: WgpuBackend::end_frame

use std::{
    borrow::Cow,
    collections::{HashMap, HashSet},
    sync::Arc,
};

use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::gfx::resources::shader::LinkedProgram;

use super::{
    AttributeDescriptor, Backend, BufferKind, ComponentType, DrawCall, GfxError, Handle,
    HandleAllocator, Result,
};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

struct GpuProgram {
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    vertex_entry: String,
    fragment_entry: String,
    layout: wgpu::PipelineLayout,
    has_uniforms: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: Handle,
    attributes: Vec<AttributeDescriptor>,
}

/// One vertex buffer slot of a pipeline: every attribute reading from the
/// same buffer with the same stride and base offset.
struct VertexSlot {
    buffer: Handle,
    base: u64,
    stride: u32,
    attributes: Vec<wgpu::VertexAttribute>,
}

struct QueuedDraw {
    pipeline: wgpu::RenderPipeline,
    vertex_buffers: Vec<(wgpu::Buffer, u64)>,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    bind_group: Option<wgpu::BindGroup>,
}

/// Window-backed [`Backend`](super::Backend).
pub struct WgpuBackend {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth_view: wgpu::TextureView,
    uniform_layout: wgpu::BindGroupLayout,
    handles: HandleAllocator,
    buffers: HashMap<Handle, Option<wgpu::Buffer>>,
    binding_sets: HashSet<Handle>,
    programs: HashMap<Handle, GpuProgram>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    queued: Vec<QueuedDraw>,
}

impl WgpuBackend {
    /// Creates the surface, device and depth buffer for `window`.
    ///
    /// # Errors
    /// [`GfxError::NoDevice`] when no adapter or device can be obtained.
    pub async fn new(
        window: Arc<Window>,
        width: u32,
        height: u32,
        present_mode: wgpu::PresentMode,
    ) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window)
            .map_err(|e| GfxError::NoDevice(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| GfxError::NoDevice(e.to_string()))?;
        log::info!("using adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Lantern Device"),
                required_features: wgpu::Features::default(),
                required_limits: wgpu::Limits::downlevel_defaults()
                    .using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| GfxError::NoDevice(e.to_string()))?;

        let surface_capabilities = surface.get_capabilities(&adapter);
        let format = surface_capabilities
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_capabilities.formats.first().copied())
            .ok_or_else(|| GfxError::NoDevice("surface reports no formats".into()))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode,
            alpha_mode: surface_capabilities.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        let depth_view = create_depth_view(&device, &config);

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Uniform Block Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        Ok(Self {
            surface,
            device,
            queue,
            config,
            depth_view,
            uniform_layout,
            handles: HandleAllocator::default(),
            buffers: HashMap::new(),
            binding_sets: HashSet::new(),
            programs: HashMap::new(),
            pipelines: HashMap::new(),
            queued: Vec::new(),
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.depth_view = create_depth_view(&self.device, &self.config);
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn aspect(&self) -> f32 {
        self.config.width as f32 / self.config.height as f32
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Discards anything queued by an unfinished frame.
    pub fn begin_frame(&mut self) {
        self.queued.clear();
    }

    /// Clears the surface, replays the queued draws and presents.
    ///
    /// `overlay` runs after the scene pass with the same encoder and target
    /// view, which is where the UI renders.
    ///
    /// # Errors
    /// Surface acquisition failures other than a lost or outdated surface.
    pub fn end_frame<F>(&mut self, clear: wgpu::Color, overlay: F) -> Result<()>
    where
        F: FnOnce(&wgpu::Device, &wgpu::Queue, &mut wgpu::CommandEncoder, &wgpu::TextureView),
    {
        let queued = std::mem::take(&mut self.queued);
        let surface_texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("surface lost or outdated; reconfiguring");
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            for draw in &queued {
                render_pass.set_pipeline(&draw.pipeline);
                if let Some(bind_group) = &draw.bind_group {
                    render_pass.set_bind_group(0, bind_group, &[]);
                }
                for (slot, (buffer, base)) in draw.vertex_buffers.iter().enumerate() {
                    render_pass.set_vertex_buffer(slot as u32, buffer.slice(*base..));
                }
                render_pass.set_index_buffer(draw.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..draw.index_count, 0, 0..1);
            }
        }

        overlay(&self.device, &self.queue, &mut encoder, &view);

        self.queue.submit(std::iter::once(encoder.finish()));
        surface_texture.present();
        Ok(())
    }

    fn allocate_buffer(&self, kind: BufferKind, bytes: &[u8]) -> wgpu::Buffer {
        let usage = match kind {
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
            BufferKind::Index => wgpu::BufferUsages::INDEX,
        };
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{kind} buffer")),
                contents: bytes,
                usage: usage | wgpu::BufferUsages::COPY_DST,
            })
    }

    fn live_buffer(&self, handle: Handle) -> Result<&wgpu::Buffer> {
        self.buffers
            .get(&handle)
            .and_then(Option::as_ref)
            .ok_or(GfxError::NotBound {
                what: "a buffer with uploaded data",
                operation: "drawing",
            })
    }

    fn pipeline(&mut self, key: &PipelineKey, slots: &[VertexSlot]) -> Result<wgpu::RenderPipeline> {
        if let Some(pipeline) = self.pipelines.get(key) {
            return Ok(pipeline.clone());
        }

        let program = self.programs.get(&key.program).ok_or(GfxError::NotBound {
            what: "a live shader program",
            operation: "drawing",
        })?;
        let buffers = slots
            .iter()
            .map(|slot| wgpu::VertexBufferLayout {
                array_stride: slot.stride as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &slot.attributes,
            })
            .collect::<Vec<_>>();

        log::debug!(
            "creating pipeline for program {} with {} vertex buffer(s)",
            key.program,
            buffers.len()
        );
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&format!("Program {} Pipeline", key.program)),
                layout: Some(&program.layout),
                vertex: wgpu::VertexState {
                    module: &program.vertex,
                    entry_point: Some(&program.vertex_entry),
                    buffers: &buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &program.fragment,
                    entry_point: Some(&program.fragment_entry),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.config.format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });

        self.pipelines.insert(key.clone(), pipeline.clone());
        Ok(pipeline)
    }
}

impl Backend for WgpuBackend {
    fn create_buffer(&mut self, _kind: BufferKind) -> Result<Handle> {
        let handle = self.handles.allocate();
        // wgpu has no zero-sized buffers; storage appears with the first upload
        self.buffers.insert(handle, None);
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: Handle, kind: BufferKind, bytes: &[u8]) -> Result<()> {
        let reuse = self
            .buffers
            .get(&buffer)
            .and_then(Option::as_ref)
            .filter(|existing| existing.size() == bytes.len() as u64);
        match reuse {
            Some(existing) => self.queue.write_buffer(existing, 0, bytes),
            None => {
                let fresh = self.allocate_buffer(kind, bytes);
                if let Some(Some(old)) = self.buffers.insert(buffer, Some(fresh)) {
                    old.destroy();
                }
            }
        }
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: Handle) {
        if let Some(Some(old)) = self.buffers.remove(&buffer) {
            old.destroy();
        }
    }

    fn create_binding_set(&mut self) -> Result<Handle> {
        let handle = self.handles.allocate();
        self.binding_sets.insert(handle);
        Ok(handle)
    }

    fn destroy_binding_set(&mut self, binding_set: Handle) {
        self.binding_sets.remove(&binding_set);
    }

    fn create_program(&mut self, program: &LinkedProgram) -> Result<Handle> {
        let handle = self.handles.allocate();
        let vertex = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("Program {handle} Vertex")),
                source: wgpu::ShaderSource::Naga(Cow::Owned(program.vertex_module().clone())),
            });
        let fragment = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("Program {handle} Fragment")),
                source: wgpu::ShaderSource::Naga(Cow::Owned(program.fragment_module().clone())),
            });

        let has_uniforms = program.uniform_block_size() > 0;
        let uniform_layouts = [&self.uniform_layout];
        let bind_group_layouts: &[&wgpu::BindGroupLayout] = if has_uniforms {
            &uniform_layouts
        } else {
            &[]
        };
        let layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("Program {handle} Layout")),
                bind_group_layouts,
                push_constant_ranges: &[],
            });

        self.programs.insert(
            handle,
            GpuProgram {
                vertex,
                fragment,
                vertex_entry: program.vertex_entry_point().to_string(),
                fragment_entry: program.fragment_entry_point().to_string(),
                layout,
                has_uniforms,
            },
        );
        Ok(handle)
    }

    fn destroy_program(&mut self, program: Handle) {
        self.programs.remove(&program);
        self.pipelines.retain(|key, _| key.program != program);
    }

    fn draw_indexed(&mut self, call: DrawCall<'_>) -> Result<()> {
        let slots = vertex_slots(call.attributes)?;
        let key = PipelineKey {
            program: call.program,
            attributes: call.attributes.to_vec(),
        };
        let pipeline = self.pipeline(&key, &slots)?;

        let vertex_buffers = slots
            .iter()
            .map(|slot| Ok((self.live_buffer(slot.buffer)?.clone(), slot.base)))
            .collect::<Result<Vec<_>>>()?;
        let index_buffer = self.live_buffer(call.index_buffer)?.clone();

        let has_uniforms = self
            .programs
            .get(&call.program)
            .is_some_and(|program| program.has_uniforms);
        let bind_group = has_uniforms.then(|| {
            // Each draw snapshots the block so later uniform writes in the
            // same frame do not leak into earlier draws.
            let uniforms = self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Uniform Block"),
                    contents: call.uniforms,
                    usage: wgpu::BufferUsages::UNIFORM,
                });
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Uniform Block Bind Group"),
                layout: &self.uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniforms.as_entire_binding(),
                }],
            })
        });

        self.queued.push(QueuedDraw {
            pipeline,
            vertex_buffers,
            index_buffer,
            index_count: call.index_count,
            bind_group,
        });
        Ok(())
    }
}

fn create_depth_view(
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d {
            width: config.width,
            height: config.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

/// Groups attributes into vertex buffer slots.
///
/// Attributes share a slot when they read the same buffer with the same
/// stride and their offsets fall inside the same vertex; an offset beyond
/// the stride moves the slot's base instead.
fn vertex_slots(attributes: &[AttributeDescriptor]) -> Result<Vec<VertexSlot>> {
    let mut slots: Vec<VertexSlot> = Vec::new();
    for attribute in attributes {
        let stride = attribute.effective_stride();
        // Tightly packed data starts its own slot at the attribute's offset.
        let within = if attribute.stride == 0 {
            0
        } else {
            attribute.offset % stride as u64
        };
        let base = attribute.offset - within;
        let vertex_attribute = wgpu::VertexAttribute {
            format: vertex_format(attribute)?,
            offset: within,
            shader_location: attribute.slot,
        };
        match slots
            .iter_mut()
            .find(|s| s.buffer == attribute.buffer && s.stride == stride && s.base == base)
        {
            Some(slot) => slot.attributes.push(vertex_attribute),
            None => slots.push(VertexSlot {
                buffer: attribute.buffer,
                base,
                stride,
                attributes: vec![vertex_attribute],
            }),
        }
    }
    Ok(slots)
}

fn vertex_format(attribute: &AttributeDescriptor) -> Result<wgpu::VertexFormat> {
    use wgpu::VertexFormat as F;
    let format = match (attribute.component_type, attribute.component_count) {
        (ComponentType::Float, 1) => F::Float32,
        (ComponentType::Float, 2) => F::Float32x2,
        (ComponentType::Float, 3) => F::Float32x3,
        (ComponentType::Float, 4) => F::Float32x4,
        (ComponentType::Int, 1) => F::Sint32,
        (ComponentType::Int, 2) => F::Sint32x2,
        (ComponentType::Int, 3) => F::Sint32x3,
        (ComponentType::Int, 4) => F::Sint32x4,
        (ComponentType::UnsignedInt, 1) => F::Uint32,
        (ComponentType::UnsignedInt, 2) => F::Uint32x2,
        (ComponentType::UnsignedInt, 3) => F::Uint32x3,
        (ComponentType::UnsignedInt, 4) => F::Uint32x4,
        (ComponentType::UnsignedByte, 2) => F::Unorm8x2,
        (ComponentType::UnsignedByte, 4) => F::Unorm8x4,
        (component_type, count) => {
            return Err(GfxError::UnsupportedAttribute {
                slot: attribute.slot,
                reason: format!("no vertex format for {count} x {component_type:?}"),
            })
        }
    };
    Ok(format)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(allocator: &mut HandleAllocator) -> Handle {
        allocator.allocate()
    }

    fn float(buffer: Handle, slot: u32, count: u32, stride: u32, offset: u64) -> AttributeDescriptor {
        AttributeDescriptor {
            buffer,
            slot,
            component_count: count,
            component_type: ComponentType::Float,
            normalized: false,
            stride,
            offset,
        }
    }

    #[test]
    fn test_interleaved_attributes_share_a_slot() {
        let mut handles = HandleAllocator::default();
        let buffer = handle(&mut handles);
        let slots =
            vertex_slots(&[float(buffer, 0, 3, 24, 0), float(buffer, 1, 3, 24, 12)]).unwrap();

        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].stride, 24);
        assert_eq!(slots[0].base, 0);
        let offsets: Vec<u64> = slots[0].attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12]);
    }

    #[test]
    fn test_planar_attributes_get_separate_slots() {
        let mut handles = HandleAllocator::default();
        let buffer = handle(&mut handles);
        // Positions then normals, each tightly packed.
        let slots =
            vertex_slots(&[float(buffer, 0, 3, 0, 0), float(buffer, 1, 3, 0, 288)]).unwrap();

        assert_eq!(slots.len(), 2);
        assert_eq!((slots[0].base, slots[0].stride), (0, 12));
        assert_eq!((slots[1].base, slots[1].stride), (288, 12));
        assert_eq!(slots[1].attributes[0].offset, 0);
    }

    #[test]
    fn test_vertex_formats() {
        let mut handles = HandleAllocator::default();
        let buffer = handle(&mut handles);
        assert_eq!(
            vertex_format(&float(buffer, 0, 3, 0, 0)).unwrap(),
            wgpu::VertexFormat::Float32x3
        );
        let color = AttributeDescriptor {
            component_type: ComponentType::UnsignedByte,
            normalized: true,
            ..float(buffer, 2, 4, 0, 0)
        };
        assert_eq!(vertex_format(&color).unwrap(), wgpu::VertexFormat::Unorm8x4);
        let odd = AttributeDescriptor {
            component_type: ComponentType::UnsignedByte,
            ..float(buffer, 2, 3, 0, 0)
        };
        assert!(vertex_format(&odd).is_err());
    }
}
