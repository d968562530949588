//! GPU core: context, tracked handles and render-target allocation.
//!
//! - [`GpuContext`]: device, queue, output format, target precision and the
//!   shared shader manager
//! - [`Tracked`]: id-tagged wrapper used to observe reallocation
//! - [`RenderTarget`]: a sized texture + view pair
//! - [`SceneView`]: per-frame camera and model matrices

pub mod context;
pub mod targets;
pub mod tracked;
pub mod view;

pub use context::GpuContext;
pub use targets::RenderTarget;
pub use tracked::Tracked;
pub use view::SceneView;
