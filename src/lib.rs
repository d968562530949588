#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! Order-independent transparency for wgpu.
//!
//! A [`TransparencyCompositor`] draws registered opaque renderables
//! offscreen and composites transparent meshes over them with dual depth
//! peeling. Every drawable follows the same lazy, three-domain resource
//! lifecycle ([`GpuResources`]).

pub mod errors;
pub mod logging;
pub mod renderer;

pub use errors::{PeelError, Result};
pub use logging::{LoggingConfig, init_logging};
pub use renderer::{
    DualDepthPeeling, GpuContext, GpuResources, MeshData, MeshRenderable, PathRenderable,
    PeelSettings, PlaneRenderable, RenderRegistry, Renderable, RenderableId, RendererSettings,
    SceneView, ShadingParameters, TransparencyCompositor,
};
