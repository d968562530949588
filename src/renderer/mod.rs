//! Renderer
//!
//! Everything that touches the GPU.
//!
//! - [`core`]: GPU context, tracked handles, render targets, scene view
//! - [`lifecycle`]: three-domain lazy resource management ([`GpuResources`])
//! - [`renderable`], [`registry`]: drawable objects and their owner
//! - [`mesh`], [`path`], [`plane`]: the concrete drawables
//! - [`shading`]: material / light / opacity uniform block
//! - [`transparency`]: the compositor and dual depth peeling
//! - [`pipeline`]: shader templates, pipeline and blend-state helpers
//! - [`settings`]: context and compositor configuration

pub mod core;
pub mod lifecycle;
pub mod mesh;
pub mod path;
pub mod pipeline;
pub mod plane;
pub mod registry;
pub mod renderable;
pub mod settings;
pub mod shading;
pub mod transparency;

pub use self::core::{GpuContext, RenderTarget, SceneView, Tracked};
pub use lifecycle::{Domains, GpuResources, RenderableLifecycle, ResourceContext};
pub use mesh::{MeshData, MeshRenderable};
pub use path::PathRenderable;
pub use plane::PlaneRenderable;
pub use registry::{RenderRegistry, RenderableId};
pub use renderable::Renderable;
pub use settings::{PeelSettings, RendererSettings, TargetPrecision};
pub use shading::ShadingParameters;
pub use transparency::{DualDepthPeeling, TransparencyAlgorithm, TransparencyCompositor};
