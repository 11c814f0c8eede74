//! wgpu distortion renderer.
//!
//! Presents a rendered eye texture through the lens correction, either via
//! the pre-distorted mesh (default, cheaper) or via the per-pixel warp
//! shader (fallback). Both paths are fed from the same
//! [`DistortionParameters`], so they produce visually matching output.
//!
//! All GPU state lives in an explicit [`RenderContext`] handed to each
//! call; there are no process-wide materials or other globals.

use bytemuck::{Pod, Zeroable};
use log::info;
use wgpu::{
    BindGroup, BindGroupLayout, Buffer, Device, Queue, RenderPipeline, Sampler, TextureFormat,
    TextureUsages,
};

use crate::mesh::{DistortionMesh, DistortionVertex};
use crate::warp::DistortionParameters;

/// GPU-side mirror of [`DistortionParameters`]; layout matches the WGSL
/// uniform block in `shaders/distortion_pixel.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct WarpUniforms {
    center: [f32; 2],
    scale_in: [f32; 2],
    scale: [f32; 2],
    _pad: [f32; 2],
    warp_coeffs: [f32; 4],
}

impl From<&DistortionParameters> for WarpUniforms {
    fn from(p: &DistortionParameters) -> Self {
        Self {
            center: p.center.to_array(),
            scale_in: p.scale_in.to_array(),
            scale: p.scale.to_array(),
            _pad: [0.0; 2],
            warp_coeffs: p.warp_coeffs,
        }
    }
}

/// Device, queue and target format bundle passed explicitly to every
/// renderer operation.
pub struct RenderContext {
    pub device: Device,
    pub queue: Queue,
    pub format: TextureFormat,
}

impl RenderContext {
    /// Creates a context with no surface, for off-screen rendering.
    pub fn headless(format: TextureFormat) -> Result<Self, String> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| "no suitable GPU adapter".to_string())?;

        let (device, queue) =
            pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default(), None))
                .map_err(|e| format!("failed to create device: {e}"))?;

        info!("headless render context on {}", adapter.get_info().name);

        Ok(Self {
            device,
            queue,
            format,
        })
    }

    /// Off-screen color target one eye renders into before distortion.
    pub fn create_eye_texture(
        &self,
        width: u32,
        height: u32,
    ) -> (wgpu::Texture, wgpu::TextureView) {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Eye Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.format,
            usage: TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        (texture, view)
    }
}

/// GPU resources for one eye's distortion pass: mesh buffers, warp
/// uniforms, and the bind group tying them to that eye's source texture.
pub struct EyePass {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
    uniform_buffer: Buffer,
    bind_group: BindGroup,
}

/// The distortion pipelines, shared by both eyes.
pub struct DistortionRenderer {
    mesh_pipeline: RenderPipeline,
    pixel_pipeline: RenderPipeline,
    bind_group_layout: BindGroupLayout,
    sampler: Sampler,
}

impl DistortionRenderer {
    pub fn new(ctx: &RenderContext) -> Self {
        let device = &ctx.device;

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Distortion Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Distortion Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let mesh_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Distortion Mesh Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/distortion_mesh.wgsl").into()),
        });

        let mesh_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Distortion Mesh Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &mesh_shader,
                entry_point: Some("vs_main"),
                buffers: &[DistortionVertex::buffer_layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &mesh_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: ctx.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let pixel_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Distortion Pixel Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/distortion_pixel.wgsl").into()),
        });

        let pixel_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Distortion Pixel Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &pixel_shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &pixel_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: ctx.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        info!("distortion pipelines ready (mesh + pixel fallback)");

        Self {
            mesh_pipeline,
            pixel_pipeline,
            bind_group_layout,
            sampler,
        }
    }

    /// Allocates the per-eye GPU resources and uploads the initial mesh and
    /// parameters. `source` is the eye's rendered (undistorted) texture.
    pub fn create_eye_pass(
        &self,
        ctx: &RenderContext,
        mesh: &DistortionMesh,
        params: &DistortionParameters,
        source: &wgpu::TextureView,
    ) -> EyePass {
        let vertex_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Distortion Vertex Buffer"),
            size: mesh.vertex_bytes().len() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let index_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Distortion Index Buffer"),
            size: mesh.index_bytes().len() as u64,
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Warp Uniform Buffer"),
            size: std::mem::size_of::<WarpUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        ctx.queue.write_buffer(&vertex_buffer, 0, mesh.vertex_bytes());
        ctx.queue.write_buffer(&index_buffer, 0, mesh.index_bytes());
        ctx.queue.write_buffer(
            &uniform_buffer,
            0,
            bytemuck::bytes_of(&WarpUniforms::from(params)),
        );

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Distortion Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(source),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
        });

        EyePass {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
            uniform_buffer,
            bind_group,
        }
    }

    /// Re-uploads a regenerated mesh. The topology is fixed, so the buffer
    /// sizes never change and the upload is a plain overwrite.
    pub fn update_mesh(&self, ctx: &RenderContext, pass: &mut EyePass, mesh: &DistortionMesh) {
        debug_assert_eq!(pass.index_count as usize, mesh.indices.len());
        ctx.queue.write_buffer(&pass.vertex_buffer, 0, mesh.vertex_bytes());
        ctx.queue.write_buffer(&pass.index_buffer, 0, mesh.index_bytes());
    }

    /// Re-uploads the warp uniforms for the pixel path.
    pub fn update_parameters(
        &self,
        ctx: &RenderContext,
        pass: &EyePass,
        params: &DistortionParameters,
    ) {
        ctx.queue.write_buffer(
            &pass.uniform_buffer,
            0,
            bytemuck::bytes_of(&WarpUniforms::from(params)),
        );
    }

    /// Draws one eye through the pre-distorted mesh.
    pub fn draw_mesh(&self, rpass: &mut wgpu::RenderPass<'_>, pass: &EyePass) {
        rpass.set_pipeline(&self.mesh_pipeline);
        rpass.set_bind_group(0, &pass.bind_group, &[]);
        rpass.set_vertex_buffer(0, pass.vertex_buffer.slice(..));
        rpass.set_index_buffer(pass.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        rpass.draw_indexed(0..pass.index_count, 0, 0..1);
    }

    /// Draws one eye through the per-pixel warp shader (fallback path).
    pub fn draw_pixel(&self, rpass: &mut wgpu::RenderPass<'_>, pass: &EyePass) {
        rpass.set_pipeline(&self.pixel_pipeline);
        rpass.set_bind_group(0, &pass.bind_group, &[]);
        rpass.draw(0..6, 0..1);
    }
}
