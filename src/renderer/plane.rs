//! Plane Renderable
//!
//! A square of half-width `width` centered on a plane's origin (shifted along
//! the second basis vector), drawn as a flat, optionally translucent quad and
//! outlined by four [`PathRenderable`] edges.
//!
//! ```text
//!          edge 0
//!     pt1 ──────── pt2        i, j: orthonormal basis of the plane
//!      │            │
//!  e 3 │            │ e 1
//!      │            │
//!     pt4 ──────── pt3
//!          edge 2
//! ```
//!
//! The edges are owned sub-renderables; they live in this object's
//! render-target domain, so a plane change rebuilds them on the next
//! `initialize`.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::errors::Result;
use crate::renderer::core::{GpuContext, SceneView};
use crate::renderer::lifecycle::{Domains, GpuResources, RenderableLifecycle};
use crate::renderer::path::PathRenderable;
use crate::renderer::pipeline::factory::{
    PipelineDesc, color_targets, create_pipeline_layout, create_render_pipeline, uniform_entry,
};
use crate::renderer::pipeline::states::{TargetKind, opaque_depth_state};
use crate::renderer::renderable::{NOT_INITIALIZED, Renderable};

/// Default half-width of the square.
pub const DEFAULT_PLANE_WIDTH: f32 = 50.0;

const CORNER_COUNT: usize = 4;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable, PartialEq)]
struct ColorUniforms {
    model_view_projection: [[f32; 4]; 4],
    color: [f32; 4],
}

const CORNER_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];

struct PlanePipelines {
    layout: wgpu::BindGroupLayout,
    opaque: wgpu::RenderPipeline,
    blend: wgpu::RenderPipeline,
    depth_only: wgpu::RenderPipeline,
}

struct PlaneBuffers {
    corners: wgpu::Buffer,
    uniforms: wgpu::Buffer,
}

/// Translucent square spanning a plane, with an opaque outline.
pub struct PlaneRenderable {
    label: String,
    lifecycle: RenderableLifecycle,

    origin: Vec3,
    normal: Vec3,
    color: Vec3,
    opacity: f32,
    width: f32,
    shift: f32,
    thickness: f32,
    corners: [Vec3; CORNER_COUNT],
    edges: Vec<PathRenderable>,

    pipelines: Option<PlanePipelines>,
    buffers: Option<PlaneBuffers>,
    bind_group: Option<wgpu::BindGroup>,
}

impl PlaneRenderable {
    /// An empty plane; call [`set_plane`](Self::set_plane) before drawing.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            lifecycle: RenderableLifecycle::new(),
            origin: Vec3::ZERO,
            normal: Vec3::Z,
            color: Vec3::ZERO,
            opacity: 1.0,
            width: DEFAULT_PLANE_WIDTH,
            shift: 0.0,
            thickness: crate::renderer::path::DEFAULT_THICKNESS,
            corners: [Vec3::ZERO; CORNER_COUNT],
            edges: Vec::new(),
            pipelines: None,
            buffers: None,
            bind_group: None,
        }
    }

    /// Places the square on the plane through `origin` with `normal`.
    ///
    /// Width and shift set beforehand apply to the new square.
    pub fn set_plane(&mut self, origin: Vec3, normal: Vec3, color: Vec3) {
        self.origin = origin;
        self.normal = normal.try_normalize().unwrap_or(Vec3::Z);
        self.color = color;

        self.corners = self.compute_corners();
        self.edges = self.build_edges();

        self.request_update_targets();
        self.request_update_aux();
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity;
    }

    #[must_use]
    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn set_plane_width(&mut self, width: f32) {
        self.width = width;
    }

    pub fn set_plane_shift(&mut self, shift: f32) {
        self.shift = shift;
    }

    /// Outline width in pixels.
    pub fn set_thickness(&mut self, thickness: f32) {
        self.thickness = thickness;
        for edge in &mut self.edges {
            edge.set_thickness(thickness);
        }
    }

    /// Corners in outline order (`pt1..pt4`).
    #[must_use]
    pub fn corners(&self) -> &[Vec3; CORNER_COUNT] {
        &self.corners
    }

    #[must_use]
    pub fn edges(&self) -> &[PathRenderable] {
        &self.edges
    }

    fn compute_corners(&self) -> [Vec3; CORNER_COUNT] {
        let (i, j) = self.normal.any_orthonormal_pair();
        let o = self.origin + self.shift * j;
        let w = self.width;
        [
            o - w * i - w * j,
            o - w * i + w * j,
            o + w * i + w * j,
            o + w * i - w * j,
        ]
    }

    fn build_edges(&self) -> Vec<PathRenderable> {
        (0..CORNER_COUNT)
            .map(|k| {
                let mut edge = PathRenderable::segment(
                    format!("{} edge {k}", self.label),
                    self.corners[k],
                    self.corners[(k + 1) % CORNER_COUNT],
                    self.color,
                );
                edge.set_thickness(self.thickness);
                edge
            })
            .collect()
    }

    /// Quad corners in triangle-strip order.
    fn strip_vertices(&self) -> [[f32; 3]; CORNER_COUNT] {
        let [pt1, pt2, pt3, pt4] = self.corners;
        [pt1.to_array(), pt2.to_array(), pt4.to_array(), pt3.to_array()]
    }

    fn rebuild_bind_group(&mut self, device: &wgpu::Device) {
        self.bind_group = match (&self.pipelines, &self.buffers) {
            (Some(pipelines), Some(buffers)) => {
                Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Plane BindGroup"),
                    layout: &pipelines.layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffers.uniforms.as_entire_binding(),
                    }],
                }))
            }
            _ => None,
        };
    }
}

impl GpuResources for PlaneRenderable {
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

    fn init_shaders(&mut self, gpu: &GpuContext) -> Result<()> {
        let module = gpu.load_shader("Shaders:color")?;
        let device = &gpu.device;

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Plane Layout"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX_FRAGMENT)],
        });
        let pipeline_layout = create_pipeline_layout(device, "Plane Pipeline Layout", &[&layout]);

        let buffers = [wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &CORNER_ATTRIBUTES,
        }];
        let format = [gpu.color_format()];

        let build = |label: &str, targets: &[Option<wgpu::ColorTargetState>], kind: TargetKind| {
            create_render_pipeline(
                device,
                &PipelineDesc {
                    vertex_buffers: &buffers,
                    targets,
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    depth_stencil: Some(opaque_depth_state(kind.depth_format())),
                    ..PipelineDesc::new(label, &module, &pipeline_layout)
                },
            )
        };

        let opaque = build(
            "Plane Color Pipeline",
            &color_targets(&format, None)[..],
            TargetKind::Color,
        )?;
        let blend = build(
            "Plane Blend Pipeline",
            &color_targets(&format, Some(wgpu::BlendState::ALPHA_BLENDING))[..],
            TargetKind::Color,
        )?;
        let depth_only = build("Plane Depth Pipeline", &[], TargetKind::DepthOnly)?;

        self.pipelines = Some(PlanePipelines {
            layout,
            opaque,
            blend,
            depth_only,
        });
        self.rebuild_bind_group(device);
        Ok(())
    }

    fn delete_shaders(&mut self) {
        self.pipelines = None;
        self.bind_group = None;
    }

    fn shaders_initialized(&self) -> bool {
        self.pipelines.is_some()
    }

    // --- Render targets: the outline paths ---

    fn init_targets(&mut self, gpu: &GpuContext, width: u32, height: u32) -> Result<()> {
        self.update_targets(gpu, width, height)
    }

    fn update_targets(&mut self, gpu: &GpuContext, width: u32, height: u32) -> Result<()> {
        let mut all_ready = true;
        for edge in &mut self.edges {
            if !edge.is_ready() {
                all_ready &= edge.initialize(gpu, width, height);
            }
        }
        if !all_ready {
            log::error!("{}: some outline edges failed to initialize", self.label);
        }
        Ok(())
    }

    fn delete_targets(&mut self) {
        // Fresh, unallocated edges; the old ones drop their GPU handles.
        self.edges = self.build_edges();
    }

    fn targets_initialized(&self) -> bool {
        self.edges.iter().all(|e| e.is_ready())
    }

    /// Edges compile their own pipelines, so they go stale too and are
    /// re-initialized through the targets domain.
    fn request_update_shaders(&mut self) {
        self.lifecycle.request_update(Domains::SHADERS | Domains::TARGETS);
        for edge in &mut self.edges {
            edge.request_update_shaders();
        }
    }

    // --- Auxiliary objects: quad + uniforms ---

    fn init_aux(&mut self, gpu: &GpuContext) -> Result<()> {
        let corners = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Plane Corners"),
            size: std::mem::size_of::<[[f32; 3]; CORNER_COUNT]>() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniforms = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Plane Uniforms"),
            size: std::mem::size_of::<ColorUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.buffers = Some(PlaneBuffers { corners, uniforms });
        self.rebuild_bind_group(&gpu.device);
        self.update_aux(gpu)
    }

    /// Rewrites the corner buffer in place.
    fn update_aux(&mut self, gpu: &GpuContext) -> Result<()> {
        if self.buffers.is_none() {
            return self.init_aux(gpu);
        }
        if let Some(buffers) = &self.buffers {
            let vertices = self.strip_vertices();
            gpu.queue
                .write_buffer(&buffers.corners, 0, bytemuck::cast_slice(&vertices));
        }
        Ok(())
    }

    fn delete_aux(&mut self) {
        self.buffers = None;
        self.bind_group = None;
    }

    fn aux_initialized(&self) -> bool {
        self.buffers.is_some()
    }
}

impl Renderable for PlaneRenderable {
    fn prepare(&mut self, gpu: &GpuContext, view: &SceneView) {
        if let Some(buffers) = &self.buffers {
            let uniforms = ColorUniforms {
                model_view_projection: view.model_view_projection().to_cols_array_2d(),
                color: self.color.extend(self.opacity).to_array(),
            };
            gpu.queue
                .write_buffer(&buffers.uniforms, 0, bytemuck::bytes_of(&uniforms));
        }
        for edge in &mut self.edges {
            edge.prepare(gpu, view);
        }
    }

    fn render(&self, pass: &mut wgpu::RenderPass<'_>, kind: TargetKind) {
        if !self.is_ready() {
            log::error!("{}: {NOT_INITIALIZED}", self.label);
            return;
        }
        let (Some(pipelines), Some(buffers), Some(bind_group)) =
            (&self.pipelines, &self.buffers, &self.bind_group)
        else {
            return;
        };

        let pipeline = match kind {
            TargetKind::Color if self.opacity < 1.0 => &pipelines.blend,
            TargetKind::Color => &pipelines.opaque,
            TargetKind::DepthOnly => &pipelines.depth_only,
        };
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.set_vertex_buffer(0, buffers.corners.slice(..));
        pass.draw(0..CORNER_COUNT as u32, 0..1);

        for edge in self.edges.iter().filter(|e| e.is_ready()) {
            edge.render(pass, kind);
        }
    }
}
