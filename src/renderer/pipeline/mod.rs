//! Shader and pipeline-state utilities.
//!
//! - [`shader_manager`]: logical `Shaders:` names, minijinja templating and
//!   the shader module cache
//! - [`shader_watch`]: polling hot reload for on-disk shader roots
//! - [`states`]: blend / depth states shared by the render passes
//! - [`factory`]: pipeline, layout and bind-group-entry helpers

pub mod factory;
pub mod shader_manager;
pub mod shader_watch;
pub mod states;

pub use factory::{PipelineDesc, create_pipeline_layout, create_render_pipeline};
pub use shader_manager::{ShaderDefines, ShaderManager, init_shader_search_paths};
pub use shader_watch::ShaderWatcher;
