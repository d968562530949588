//! Render pipeline construction shared by every renderable and peel pass.
//!
//! All pipelines in this crate use `vs_main` / `fs_main` entry points, a
//! single sample, and no pipeline cache; only the layout, vertex buffers,
//! targets, topology and depth state differ.

use smallvec::SmallVec;

use crate::errors::{PeelError, Result};

/// Variable part of a render pipeline.
pub struct PipelineDesc<'a> {
    pub label: &'a str,
    pub module: &'a wgpu::ShaderModule,
    pub layout: &'a wgpu::PipelineLayout,
    pub vertex_buffers: &'a [wgpu::VertexBufferLayout<'a>],
    /// Empty for depth-only pipelines (no fragment stage).
    pub targets: &'a [Option<wgpu::ColorTargetState>],
    pub topology: wgpu::PrimitiveTopology,
    pub depth_stencil: Option<wgpu::DepthStencilState>,
}

impl<'a> PipelineDesc<'a> {
    /// Triangle list, no depth, no vertex buffers.
    #[must_use]
    pub fn new(
        label: &'a str,
        module: &'a wgpu::ShaderModule,
        layout: &'a wgpu::PipelineLayout,
    ) -> Self {
        Self {
            label,
            module,
            layout,
            vertex_buffers: &[],
            targets: &[],
            topology: wgpu::PrimitiveTopology::TriangleList,
            depth_stencil: None,
        }
    }
}

/// Runs `create` inside validation and internal error scopes.
///
/// A shader that does not parse, or a pipeline the backend cannot
/// translate, comes back as [`PeelError::GpuValidation`] instead of
/// reaching the device's uncaptured-error handler.
pub fn with_validation_scope<T>(
    device: &wgpu::Device,
    label: &str,
    create: impl FnOnce() -> T,
) -> Result<T> {
    let validation = device.push_error_scope(wgpu::ErrorFilter::Validation);
    let internal = device.push_error_scope(wgpu::ErrorFilter::Internal);
    let created = create();
    let internal = pollster::block_on(internal.pop());
    let validation = pollster::block_on(validation.pop());

    match internal.or(validation) {
        Some(error) => Err(PeelError::GpuValidation {
            label: label.to_string(),
            message: error.to_string(),
        }),
        None => Ok(created),
    }
}

/// Builds the pipeline described by `desc`.
pub fn create_render_pipeline(
    device: &wgpu::Device,
    desc: &PipelineDesc<'_>,
) -> Result<wgpu::RenderPipeline> {
    log::debug!("Compiling render pipeline {}", desc.label);

    let fragment = (!desc.targets.is_empty()).then(|| wgpu::FragmentState {
        module: desc.module,
        entry_point: Some("fs_main"),
        targets: desc.targets,
        compilation_options: wgpu::PipelineCompilationOptions::default(),
    });

    with_validation_scope(device, desc.label, || {
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(desc.label),
            layout: Some(desc.layout),
            vertex: wgpu::VertexState {
                module: desc.module,
                entry_point: Some("vs_main"),
                buffers: desc.vertex_buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment,
            primitive: wgpu::PrimitiveState {
                topology: desc.topology,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: desc.depth_stencil.clone(),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        })
    })
}

/// Builds a pipeline layout over `layouts` (in group order).
#[must_use]
pub fn create_pipeline_layout(
    device: &wgpu::Device,
    label: &str,
    layouts: &[&wgpu::BindGroupLayout],
) -> wgpu::PipelineLayout {
    let layouts: SmallVec<[Option<&wgpu::BindGroupLayout>; 4]> =
        layouts.iter().copied().map(Some).collect();
    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &layouts,
        immediate_size: 0,
    })
}

/// Color targets of `formats`, all sharing one blend state.
#[must_use]
pub fn color_targets(
    formats: &[wgpu::TextureFormat],
    blend: Option<wgpu::BlendState>,
) -> SmallVec<[Option<wgpu::ColorTargetState>; 4]> {
    formats
        .iter()
        .map(|&format| {
            Some(wgpu::ColorTargetState {
                format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })
        })
        .collect()
}

// ─── Bind group layout entries ───────────────────────────────────────────────

/// Uniform buffer entry.
#[must_use]
pub const fn uniform_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Unfilterable float texture read with `textureLoad` in the fragment stage.
///
/// Also used for `Depth32Float` views, which every backend (GL included)
/// can load as `texture_2d<f32>`.
#[must_use]
pub const fn float_texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}
