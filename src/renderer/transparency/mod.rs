//! Order-Independent Transparency
//!
//! The [`TransparencyCompositor`] renders opaque objects offscreen, then hands
//! the frame to a [`TransparencyAlgorithm`] that composites the transparent
//! meshes over them and writes the output view.
//!
//! # Frame Structure
//!
//! ```text
//! ┌─────────────────────────────┐
//! │ opaque pass                 │ color + depth-stencil, cleared to background
//! ├─────────────────────────────┤
//! │ opaque depth-only pass      │ Depth32Float reference for the peel shaders
//! ├─────────────────────────────┤
//! │ algorithm                   │ e.g. dual depth peeling:
//! │   init ─▶ peel/blend × N    │   N decided by occlusion query or fixed
//! │   final composite ─▶ output │
//! └─────────────────────────────┘
//! ```

pub mod compositor;
pub mod dual_depth_peeling;
pub mod occlusion;

pub use compositor::TransparencyCompositor;
pub use dual_depth_peeling::{DualDepthPeeling, PeelLoop};
pub use occlusion::OcclusionQuery;

use glam::Vec3;

use crate::errors::Result;
use crate::renderer::core::{GpuContext, Tracked};
use crate::renderer::mesh::MeshRenderable;

// ============================================================================
// Fullscreen quad
// ============================================================================

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

/// NDC corners in triangle-strip order.
const QUAD_VERTICES: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]];

/// Four-vertex strip covering the viewport.
pub struct FullscreenQuad {
    buffer: wgpu::Buffer,
}

impl FullscreenQuad {
    #[must_use]
    pub fn new(gpu: &GpuContext) -> Self {
        let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Fullscreen Quad"),
            size: std::mem::size_of_val(&QUAD_VERTICES) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        gpu.queue
            .write_buffer(&buffer, 0, bytemuck::cast_slice(&QUAD_VERTICES));
        Self { buffer }
    }

    /// Vertex layout every fullscreen pipeline must use (topology:
    /// `TriangleStrip`).
    #[must_use]
    pub fn vertex_layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &QUAD_ATTRIBUTES,
        }
    }

    /// Draws the quad with whatever pipeline and bind groups are set.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.buffer.slice(..));
        pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
    }
}

// ============================================================================
// Frame inputs
// ============================================================================

/// Offscreen results of the opaque passes.
pub struct OpaqueTargets<'a> {
    /// Opaque color, cleared to the background.
    pub color: &'a Tracked<wgpu::TextureView>,
    /// Depth-only reference (`Depth32Float`).
    pub depth: &'a Tracked<wgpu::TextureView>,
}

/// Everything an algorithm needs to composite one frame.
///
/// `encoder` already holds the opaque passes. An algorithm may submit it and
/// replace it with a fresh one (e.g. to read back a query); the compositor
/// submits whatever encoder is left when the hook returns.
pub struct TransparentFrame<'a> {
    pub gpu: &'a GpuContext,
    pub encoder: &'a mut wgpu::CommandEncoder,
    /// Transparent meshes, each already prepared for this frame.
    pub meshes: &'a [&'a MeshRenderable],
    pub opaque: OpaqueTargets<'a>,
    pub quad: &'a FullscreenQuad,
    pub output: &'a wgpu::TextureView,
    pub background: Vec3,
}

impl TransparentFrame<'_> {
    /// Submits the current encoder and starts a new one.
    pub fn flush(&mut self) {
        let fresh = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Transparency Encoder"),
            });
        let recorded = std::mem::replace(self.encoder, fresh);
        self.gpu.queue.submit(Some(recorded.finish()));
    }
}

// ============================================================================
// TransparencyAlgorithm
// ============================================================================

/// A transparency technique plugged into a [`TransparencyCompositor`].
///
/// The hooks mirror [`GpuResources`](crate::renderer::lifecycle::GpuResources)
/// and are driven by the compositor's own lifecycle, so the algorithm's
/// resources are created, resized and released together with the opaque
/// targets.
pub trait TransparencyAlgorithm {
    fn name(&self) -> &str;

    fn init_shaders(&mut self, gpu: &GpuContext) -> Result<()>;
    fn delete_shaders(&mut self);
    fn shaders_initialized(&self) -> bool;

    fn init_targets(&mut self, gpu: &GpuContext, width: u32, height: u32) -> Result<()>;
    fn update_targets(&mut self, gpu: &GpuContext, width: u32, height: u32) -> Result<()> {
        self.delete_targets();
        self.init_targets(gpu, width, height)
    }
    fn delete_targets(&mut self);
    fn targets_initialized(&self) -> bool;

    fn init_aux(&mut self, gpu: &GpuContext) -> Result<()>;
    fn delete_aux(&mut self);
    fn aux_initialized(&self) -> bool;

    /// Composites `frame.meshes` over the opaque targets and writes
    /// `frame.output`, clearing it to `frame.background` first.
    fn render_transparent_objects(&mut self, frame: &mut TransparentFrame<'_>) -> Result<()>;
}
