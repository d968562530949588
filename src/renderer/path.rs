//! Path Renderable
//!
//! Thick polylines. Each segment is one instance of a six-vertex quad that
//! the vertex shader extrudes in screen space, so the line keeps a constant
//! pixel width regardless of depth.
//!
//! ```text
//!   strip:  p0 ── p1 ── p2 ── p3      segments (p0,p1) (p1,p2) (p2,p3)
//!   list:   p0 ── p1   p2 ── p3       segments (p0,p1) (p2,p3)
//! ```

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

use crate::errors::{PeelError, Result};
use crate::renderer::core::{GpuContext, SceneView, Tracked};
use crate::renderer::lifecycle::{GpuResources, RenderableLifecycle};
use crate::renderer::pipeline::factory::{
    PipelineDesc, color_targets, create_pipeline_layout, create_render_pipeline, uniform_entry,
};
use crate::renderer::pipeline::states::{TargetKind, opaque_depth_state};
use crate::renderer::renderable::{NOT_INITIALIZED, Renderable};

/// Line width in pixels used when none is set.
pub const DEFAULT_THICKNESS: f32 = 2.0;

const VERTICES_PER_SEGMENT: u32 = 6;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable, PartialEq)]
pub struct PathSegment {
    pub start: [f32; 3],
    pub end: [f32; 3],
    pub color: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable, PartialEq)]
struct PathUniforms {
    model_view_projection: [[f32; 4]; 4],
    viewport: [f32; 2],
    thickness: f32,
    _pad: f32,
}

const SEGMENT_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x4];

struct PathPipelines {
    layout: wgpu::BindGroupLayout,
    color: wgpu::RenderPipeline,
    depth_only: wgpu::RenderPipeline,
}

struct PathBuffers {
    segments: Tracked<wgpu::Buffer>,
    segment_count: u32,
    uniforms: wgpu::Buffer,
}

/// Polyline drawn with a fixed screen-space thickness.
pub struct PathRenderable {
    label: String,
    lifecycle: RenderableLifecycle,
    points: Vec<Vec3>,
    color: Vec4,
    strip: bool,
    thickness: f32,

    pipelines: Option<PathPipelines>,
    buffers: Option<PathBuffers>,
    bind_group: Option<wgpu::BindGroup>,
}

impl PathRenderable {
    /// A path through `points`. With `strip` every consecutive pair is
    /// joined; otherwise points are taken two by two.
    #[must_use]
    pub fn new(label: impl Into<String>, points: Vec<Vec3>, color: Vec3, strip: bool) -> Self {
        Self {
            label: label.into(),
            lifecycle: RenderableLifecycle::new(),
            points,
            color: color.extend(1.0),
            strip,
            thickness: DEFAULT_THICKNESS,
            pipelines: None,
            buffers: None,
            bind_group: None,
        }
    }

    /// A single segment.
    #[must_use]
    pub fn segment(label: impl Into<String>, start: Vec3, end: Vec3, color: Vec3) -> Self {
        Self::new(label, vec![start, end], color, false)
    }

    pub fn set_points(&mut self, points: Vec<Vec3>) {
        self.points = points;
        self.request_update_aux();
    }

    #[must_use]
    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    pub fn set_color(&mut self, color: Vec3) {
        self.color = color.extend(1.0);
        self.request_update_aux();
    }

    /// Width in pixels; takes effect on the next `prepare`.
    pub fn set_thickness(&mut self, thickness: f32) {
        self.thickness = thickness.max(0.0);
    }

    #[must_use]
    pub fn thickness(&self) -> f32 {
        self.thickness
    }

    /// Segments drawn for the current points.
    #[must_use]
    pub fn segments(&self) -> Vec<PathSegment> {
        let color = self.color.to_array();
        let segment = |a: &Vec3, b: &Vec3| PathSegment {
            start: a.to_array(),
            end: b.to_array(),
            color,
        };

        if self.strip {
            self.points.windows(2).map(|w| segment(&w[0], &w[1])).collect()
        } else {
            self.points
                .chunks_exact(2)
                .map(|w| segment(&w[0], &w[1]))
                .collect()
        }
    }
}

impl GpuResources for PathRenderable {
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
        let module = gpu.load_shader("Shaders:path")?;
        let device = &gpu.device;

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Path Layout"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX)],
        });
        let pipeline_layout = create_pipeline_layout(device, "Path Pipeline Layout", &[&layout]);

        let buffers = [wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<PathSegment>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &SEGMENT_ATTRIBUTES,
        }];

        let targets = color_targets(&[gpu.color_format()], None);
        let color = create_render_pipeline(
            device,
            &PipelineDesc {
                vertex_buffers: &buffers,
                targets: &targets,
                depth_stencil: Some(opaque_depth_state(TargetKind::Color.depth_format())),
                ..PipelineDesc::new("Path Color Pipeline", &module, &pipeline_layout)
            },
        )?;
        let depth_only = create_render_pipeline(
            device,
            &PipelineDesc {
                vertex_buffers: &buffers,
                depth_stencil: Some(opaque_depth_state(TargetKind::DepthOnly.depth_format())),
                ..PipelineDesc::new("Path Depth Pipeline", &module, &pipeline_layout)
            },
        )?;

        self.pipelines = Some(PathPipelines {
            layout,
            color,
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

    fn init_aux(&mut self, gpu: &GpuContext) -> Result<()> {
        let segments = self.segments();
        if segments.is_empty() {
            return Err(PeelError::EmptyPath);
        }

        let bytes: &[u8] = bytemuck::cast_slice(&segments);
        let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&self.label),
            size: bytes.len() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        gpu.queue.write_buffer(&buffer, 0, bytes);

        let uniforms = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Path Uniforms"),
            size: std::mem::size_of::<PathUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        self.buffers = Some(PathBuffers {
            segments: Tracked::new(buffer),
            segment_count: segments.len() as u32,
            uniforms,
        });
        self.rebuild_bind_group(&gpu.device);
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

impl PathRenderable {
    fn rebuild_bind_group(&mut self, device: &wgpu::Device) {
        self.bind_group = match (&self.pipelines, &self.buffers) {
            (Some(pipelines), Some(buffers)) => {
                Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Path BindGroup"),
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

impl Renderable for PathRenderable {
    fn prepare(&mut self, gpu: &GpuContext, view: &SceneView) {
        let Some(buffers) = &self.buffers else {
            return;
        };
        let uniforms = PathUniforms {
            model_view_projection: view.model_view_projection().to_cols_array_2d(),
            viewport: [view.viewport.0 as f32, view.viewport.1 as f32],
            thickness: self.thickness,
            _pad: 0.0,
        };
        gpu.queue
            .write_buffer(&buffers.uniforms, 0, bytemuck::bytes_of(&uniforms));
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
            TargetKind::Color => &pipelines.color,
            TargetKind::DepthOnly => &pipelines.depth_only,
        };
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.set_vertex_buffer(0, buffers.segments.slice(..));
        pass.draw(0..VERTICES_PER_SEGMENT, 0..buffers.segment_count);
    }
}
