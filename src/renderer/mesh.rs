//! Mesh Renderable
//!
//! Mirrors an immutable [`MeshData`] snapshot into one GPU vertex buffer and
//! draws it as independent triangles, shaded by an embedded
//! [`ShadingParameters`].
//!
//! # Buffer Layout
//!
//! The indexed triangle list is de-indexed on upload:
//!
//! ```text
//! [ p0 p1 p2 | p3 p4 p5 | ... ][ n0 n1 n2 | n3 n4 n5 | ... ]
//!   positions: 3·T × f32x3       normals: 3·T × f32x3
//! ```
//!
//! Both halves are bound as separate vertex-buffer slices (slot 0 and 1).
//!
//! # Bind Groups
//!
//! | Group | Contents                                 | Used by                      |
//! |-------|------------------------------------------|------------------------------|
//! | 0     | transform only                           | depth-only and peel-init     |
//! | 0     | transform + [`ShadingUniforms`]          | color draws and peel passes  |
//! | 1     | free for per-pass inputs (`before` hook) | transparency algorithm       |

use std::sync::Arc;

use glam::Vec3;

use crate::errors::{PeelError, Result};
use crate::renderer::core::{GpuContext, SceneView, Tracked};
use crate::renderer::lifecycle::{GpuResources, RenderableLifecycle};
use crate::renderer::pipeline::factory::{
    PipelineDesc, color_targets, create_pipeline_layout, create_render_pipeline, uniform_entry,
};
use crate::renderer::pipeline::states::{TargetKind, opaque_depth_state};
use crate::renderer::renderable::{NOT_INITIALIZED, Renderable};
use crate::renderer::shading::{ObjectTransform, ShadingParameters, ShadingUniforms};

// ============================================================================
// MeshData
// ============================================================================

/// Triangulated geometry with per-vertex normals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    /// Triangle list; three indices per face.
    pub indices: Vec<u32>,
}

impl MeshData {
    #[must_use]
    pub fn new(positions: Vec<Vec3>, normals: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            normals,
            indices,
        }
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() || self.triangle_count() == 0
    }

    /// De-indexed `[positions..., normals...]` stream, `3 × triangle_count`
    /// entries per half.
    ///
    /// Out-of-range indices read as the origin / a zero normal.
    #[must_use]
    pub fn vertex_stream(&self) -> Vec<[f32; 3]> {
        let count = self.triangle_count() * 3;
        let corners = &self.indices[..count];
        let fetch = |list: &[Vec3], i: u32| {
            list.get(i as usize)
                .copied()
                .unwrap_or_default()
                .to_array()
        };

        let mut stream = Vec::with_capacity(2 * count);
        stream.extend(corners.iter().map(|&i| fetch(&self.positions, i)));
        stream.extend(corners.iter().map(|&i| fetch(&self.normals, i)));
        stream
    }
}

// ============================================================================
// GPU layout
// ============================================================================

const POSITION_ATTRIBUTES: [wgpu::VertexAttribute; 1] =
    wgpu::vertex_attr_array![0 => Float32x3];
const NORMAL_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x3];

const VERTEX_STRIDE: wgpu::BufferAddress = std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress;

/// Vertex buffer layouts of every mesh pipeline: positions in slot 0,
/// normals in slot 1.
#[must_use]
pub fn vertex_buffer_layouts() -> [wgpu::VertexBufferLayout<'static>; 2] {
    [
        wgpu::VertexBufferLayout {
            array_stride: VERTEX_STRIDE,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &POSITION_ATTRIBUTES,
        },
        wgpu::VertexBufferLayout {
            array_stride: VERTEX_STRIDE,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &NORMAL_ATTRIBUTES,
        },
    ]
}

/// Group 0 entries when only the transform is bound.
#[must_use]
pub fn transform_layout_entries() -> [wgpu::BindGroupLayoutEntry; 1] {
    [uniform_entry(0, wgpu::ShaderStages::VERTEX)]
}

/// Group 0 entries when transform and shading are bound.
#[must_use]
pub fn shaded_layout_entries() -> [wgpu::BindGroupLayoutEntry; 2] {
    [
        uniform_entry(0, wgpu::ShaderStages::VERTEX),
        uniform_entry(1, wgpu::ShaderStages::VERTEX_FRAGMENT),
    ]
}

/// Builds the two group-0 layouts `(transform_only, shaded)`.
#[must_use]
pub fn create_mesh_layouts(device: &wgpu::Device) -> (wgpu::BindGroupLayout, wgpu::BindGroupLayout) {
    let transform = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Mesh Transform Layout"),
        entries: &transform_layout_entries(),
    });
    let shaded = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Mesh Shaded Layout"),
        entries: &shaded_layout_entries(),
    });
    (transform, shaded)
}

// ─── Domain state ────────────────────────────────────────────────────────────

struct MeshPipelines {
    transform_layout: wgpu::BindGroupLayout,
    shaded_layout: wgpu::BindGroupLayout,
    color: Tracked<wgpu::RenderPipeline>,
    color_blend: wgpu::RenderPipeline,
    depth_only: wgpu::RenderPipeline,
}

struct MeshBuffers {
    vertices: Tracked<wgpu::Buffer>,
    /// Byte offset of the normal half.
    normals_offset: wgpu::BufferAddress,
    vertex_count: u32,
    transform: wgpu::Buffer,
    shading: wgpu::Buffer,
}

struct MeshBindGroups {
    transform_only: wgpu::BindGroup,
    shaded: wgpu::BindGroup,
}

// ============================================================================
// MeshRenderable
// ============================================================================

/// GPU mirror of one mesh snapshot.
pub struct MeshRenderable {
    label: String,
    lifecycle: RenderableLifecycle,
    mesh: Arc<MeshData>,
    shading: ShadingParameters,
    classical_rendering: bool,

    pipelines: Option<MeshPipelines>,
    buffers: Option<MeshBuffers>,
    bind_groups: Option<MeshBindGroups>,
}

impl MeshRenderable {
    #[must_use]
    pub fn new(label: impl Into<String>, mesh: Arc<MeshData>) -> Self {
        Self {
            label: label.into(),
            lifecycle: RenderableLifecycle::new(),
            mesh,
            shading: ShadingParameters::default(),
            classical_rendering: true,
            pipelines: None,
            buffers: None,
            bind_groups: None,
        }
    }

    /// Swaps the geometry snapshot; the buffer is refilled on the next
    /// `initialize`.
    pub fn set_mesh(&mut self, mesh: Arc<MeshData>) {
        self.mesh = mesh;
        self.request_update_aux();
    }

    #[must_use]
    pub fn mesh(&self) -> &Arc<MeshData> {
        &self.mesh
    }

    #[must_use]
    pub fn shading(&self) -> &ShadingParameters {
        &self.shading
    }

    pub fn shading_mut(&mut self) -> &mut ShadingParameters {
        &mut self.shading
    }

    #[must_use]
    pub fn with_shading(mut self, shading: ShadingParameters) -> Self {
        self.shading = shading;
        self
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.shading.opacity = opacity;
    }

    #[must_use]
    pub fn opacity(&self) -> f32 {
        self.shading.opacity
    }

    /// `false` while the mesh belongs to a transparency compositor, which
    /// then handles blending itself.
    #[must_use]
    pub fn classical_rendering(&self) -> bool {
        self.classical_rendering
    }

    pub fn set_classical_rendering(&mut self, classical: bool) {
        self.classical_rendering = classical;
    }

    /// Number of vertices drawn (`3 × triangle_count`), 0 before upload.
    #[must_use]
    pub fn vertex_count(&self) -> u32 {
        self.buffers.as_ref().map_or(0, |b| b.vertex_count)
    }

    /// Id of the current vertex buffer, if allocated.
    #[must_use]
    pub fn vertex_buffer_id(&self) -> Option<u64> {
        self.buffers.as_ref().map(|b| b.vertices.id())
    }

    /// Id of the current color pipeline, if compiled.
    #[must_use]
    pub fn pipeline_id(&self) -> Option<u64> {
        self.pipelines.as_ref().map(|p| p.color.id())
    }

    /// Draws the mesh with a caller-supplied pipeline.
    ///
    /// `pipeline` must use [`vertex_buffer_layouts`] and, for group 0, the
    /// layout selected by `with_shading` ([`shaded_layout_entries`] or
    /// [`transform_layout_entries`]). `before` runs after group 0 is bound and
    /// before the draw; `after` runs right after it.
    pub fn render_mesh<'p>(
        &self,
        pass: &mut wgpu::RenderPass<'p>,
        pipeline: &wgpu::RenderPipeline,
        with_shading: bool,
        before: impl FnOnce(&mut wgpu::RenderPass<'p>),
        after: impl FnOnce(&mut wgpu::RenderPass<'p>),
    ) {
        let (Some(buffers), Some(groups)) = (&self.buffers, &self.bind_groups) else {
            log::error!("{}: {NOT_INITIALIZED}", self.label);
            return;
        };

        pass.set_pipeline(pipeline);
        let group = if with_shading {
            &groups.shaded
        } else {
            &groups.transform_only
        };
        pass.set_bind_group(0, group, &[]);

        before(pass);

        pass.set_vertex_buffer(0, buffers.vertices.slice(..buffers.normals_offset));
        pass.set_vertex_buffer(1, buffers.vertices.slice(buffers.normals_offset..));
        pass.draw(0..buffers.vertex_count, 0..1);

        after(pass);
    }

    fn rebuild_bind_groups(&mut self, device: &wgpu::Device) {
        let (Some(pipelines), Some(buffers)) = (&self.pipelines, &self.buffers) else {
            self.bind_groups = None;
            return;
        };

        let transform_only = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Mesh Transform BindGroup"),
            layout: &pipelines.transform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffers.transform.as_entire_binding(),
            }],
        });
        let shaded = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Mesh Shaded BindGroup"),
            layout: &pipelines.shaded_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffers.transform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: buffers.shading.as_entire_binding(),
                },
            ],
        });

        self.bind_groups = Some(MeshBindGroups {
            transform_only,
            shaded,
        });
    }

    fn upload_vertices(&self, gpu: &GpuContext) -> Result<(wgpu::Buffer, u64, u32)> {
        if self.mesh.is_empty() {
            return Err(PeelError::EmptyMesh);
        }

        let stream = self.mesh.vertex_stream();
        let vertex_count = (stream.len() / 2) as u32;
        let bytes: &[u8] = bytemuck::cast_slice(&stream);

        let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&self.label),
            size: bytes.len() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        gpu.queue.write_buffer(&buffer, 0, bytes);

        Ok((buffer, bytes.len() as u64 / 2, vertex_count))
    }
}

impl GpuResources for MeshRenderable {
    type Context = GpuContext;

    fn lifecycle(&self) -> &RenderableLifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut RenderableLifecycle {
        &mut self.lifecycle
    }

    fn label(&self) -> &str {
        &self.label
    }

    // --- Shaders ---

    fn init_shaders(&mut self, gpu: &GpuContext) -> Result<()> {
        let module = gpu.load_shader("Shaders:mesh")?;
        let device = &gpu.device;

        let (transform_layout, shaded_layout) = create_mesh_layouts(device);
        let shaded = create_pipeline_layout(device, "Mesh Shaded Pipeline Layout", &[&shaded_layout]);
        let transform =
            create_pipeline_layout(device, "Mesh Depth Pipeline Layout", &[&transform_layout]);

        let buffers = vertex_buffer_layouts();
        let color_format = [gpu.color_format()];

        let opaque_targets = color_targets(&color_format, None);
        let color = create_render_pipeline(
            device,
            &PipelineDesc {
                vertex_buffers: &buffers,
                targets: &opaque_targets,
                depth_stencil: Some(opaque_depth_state(TargetKind::Color.depth_format())),
                ..PipelineDesc::new("Mesh Color Pipeline", &module, &shaded)
            },
        )?;

        let blend_targets = color_targets(&color_format, Some(wgpu::BlendState::ALPHA_BLENDING));
        let color_blend = create_render_pipeline(
            device,
            &PipelineDesc {
                vertex_buffers: &buffers,
                targets: &blend_targets,
                depth_stencil: Some(opaque_depth_state(TargetKind::Color.depth_format())),
                ..PipelineDesc::new("Mesh Blend Pipeline", &module, &shaded)
            },
        )?;

        let depth_module = gpu.load_shader("Shaders:mesh_depth")?;
        let depth_only = create_render_pipeline(
            device,
            &PipelineDesc {
                vertex_buffers: &buffers,
                depth_stencil: Some(opaque_depth_state(TargetKind::DepthOnly.depth_format())),
                ..PipelineDesc::new("Mesh Depth Pipeline", &depth_module, &transform)
            },
        )?;

        self.pipelines = Some(MeshPipelines {
            transform_layout,
            shaded_layout,
            color: Tracked::new(color),
            color_blend,
            depth_only,
        });
        self.rebuild_bind_groups(device);
        Ok(())
    }

    fn delete_shaders(&mut self) {
        self.pipelines = None;
        self.bind_groups = None;
    }

    fn shaders_initialized(&self) -> bool {
        self.pipelines.is_some()
    }

    // --- Render targets: none ---

    fn init_targets(&mut self, _gpu: &GpuContext, _width: u32, _height: u32) -> Result<()> {
        Ok(())
    }

    fn update_targets(&mut self, _gpu: &GpuContext, _width: u32, _height: u32) -> Result<()> {
        Ok(())
    }

    fn delete_targets(&mut self) {}

    fn targets_initialized(&self) -> bool {
        true
    }

    // --- Auxiliary objects ---

    fn init_aux(&mut self, gpu: &GpuContext) -> Result<()> {
        let (vertices, normals_offset, vertex_count) = self.upload_vertices(gpu)?;

        let transform = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Mesh Transform Uniforms"),
            size: std::mem::size_of::<ObjectTransform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let shading = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Mesh Shading Uniforms"),
            size: std::mem::size_of::<ShadingUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        self.buffers = Some(MeshBuffers {
            vertices: Tracked::new(vertices),
            normals_offset,
            vertex_count,
            transform,
            shading,
        });
        self.rebuild_bind_groups(&gpu.device);
        log::debug!("{}: uploaded {vertex_count} vertices", self.label);
        Ok(())
    }

    /// Refills the vertex buffer in place when the snapshot keeps its size.
    fn update_aux(&mut self, gpu: &GpuContext) -> Result<()> {
        let same_size = self
            .buffers
            .as_ref()
            .is_some_and(|b| b.vertex_count as usize == 3 * self.mesh.triangle_count());
        if !same_size || self.mesh.is_empty() {
            self.delete_aux();
            return self.init_aux(gpu);
        }

        let stream = self.mesh.vertex_stream();
        if let Some(buffers) = &self.buffers {
            gpu.queue
                .write_buffer(&buffers.vertices, 0, bytemuck::cast_slice(&stream));
        }
        Ok(())
    }

    fn delete_aux(&mut self) {
        self.buffers = None;
        self.bind_groups = None;
    }

    fn aux_initialized(&self) -> bool {
        self.buffers.is_some()
    }
}

impl Renderable for MeshRenderable {
    fn prepare(&mut self, gpu: &GpuContext, view: &SceneView) {
        let Some(buffers) = &self.buffers else {
            return;
        };

        let transform = ObjectTransform::new(view.model_view_projection());
        let shading = self.shading.bind(view.model_view());
        gpu.queue
            .write_buffer(&buffers.transform, 0, bytemuck::bytes_of(&transform));
        gpu.queue
            .write_buffer(&buffers.shading, 0, bytemuck::bytes_of(&shading));
    }

    fn render(&self, pass: &mut wgpu::RenderPass<'_>, kind: TargetKind) {
        if !self.is_ready() {
            log::error!("{}: {NOT_INITIALIZED}", self.label);
            return;
        }
        let Some(pipelines) = &self.pipelines else {
            return;
        };

        match kind {
            TargetKind::Color => {
                let pipeline = if self.classical_rendering && self.shading.is_translucent() {
                    &pipelines.color_blend
                } else {
                    &*pipelines.color
                };
                self.render_mesh(pass, pipeline, true, |_| {}, |_| {});
            }
            TargetKind::DepthOnly => {
                self.render_mesh(pass, &pipelines.depth_only, false, |_| {}, |_| {});
            }
        }
    }

    fn as_mesh(&self) -> Option<&MeshRenderable> {
        Some(self)
    }

    fn as_mesh_mut(&mut self) -> Option<&mut MeshRenderable> {
        Some(self)
    }
}
