//! Drawable objects.
//!
//! A [`Renderable`] is a [`GpuResources`] implementor bound to a
//! [`GpuContext`] that can upload per-frame uniforms and record its draw
//! calls into an open render pass.
//!
//! ```text
//! compositor.render()
//!   ├── initialize()                 lazy, per stale domain
//!   ├── prepare(gpu, view)           queue.write_buffer, once per frame
//!   └── render(pass, kind)           once per target kind, no allocation
//! ```

use crate::renderer::core::{GpuContext, SceneView};
use crate::renderer::lifecycle::GpuResources;
use crate::renderer::mesh::MeshRenderable;
use crate::renderer::pipeline::states::TargetKind;

/// Log line emitted when a draw is attempted before initialization.
pub(crate) const NOT_INITIALIZED: &str = "Internal error: data not initialized";

pub trait Renderable: GpuResources<Context = GpuContext> {
    /// Uploads this frame's uniforms. Values stay constant for every pass of
    /// the frame.
    fn prepare(&mut self, gpu: &GpuContext, view: &SceneView);

    /// Records the draw calls of this object.
    ///
    /// Must be a no-op (with an error log) when [`GpuResources::is_ready`]
    /// is false.
    fn render(&self, pass: &mut wgpu::RenderPass<'_>, kind: TargetKind);

    /// Mesh renderables are the only ones allowed in the transparent set.
    fn as_mesh(&self) -> Option<&MeshRenderable> {
        None
    }

    fn as_mesh_mut(&mut self) -> Option<&mut MeshRenderable> {
        None
    }
}
