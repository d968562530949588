//! Error Types
//!
//! This module defines the error types used throughout the crate.
//!
//! # Overview
//!
//! The main error type [`PeelError`] covers three families of failure:
//! - **Context errors**: no usable GPU adapter/device, or a resource used with
//!   a GPU context other than the one it was created on
//! - **Resource errors**: missing or malformed shader sources, empty geometry,
//!   zero-sized render targets, failed query readback
//! - **Usage errors**: registering a renderable that does not exist or has
//!   the wrong kind
//!
//! Domain hooks return [`Result<T>`]; the lifecycle layer turns failures into
//! a logged message and a cleared ready flag, so no error ever crosses the
//! render boundary.
//!
//! ```rust,ignore
//! use depth_peel::errors::{PeelError, Result};
//!
//! fn check_mesh(vertex_count: usize) -> Result<()> {
//!     if vertex_count == 0 {
//!         return Err(PeelError::EmptyMesh);
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The main error type for the transparency core.
#[derive(Error, Debug)]
pub enum PeelError {
    // ========================================================================
    // Context Errors
    // ========================================================================
    /// Failed to request a compatible GPU adapter.
    #[error("Failed to request WGPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[error("Failed to create WGPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),

    /// The resource was created on another GPU context.
    #[error("Resources belong to GPU context #{bound}, not #{requested}")]
    ContextMismatch {
        /// Context the resources were created on
        bound: u64,
        /// Context passed to the current call
        requested: u64,
    },

    // ========================================================================
    // Shader Errors
    // ========================================================================
    /// The logical shader path could not be resolved.
    #[error("Shader not found: {0}")]
    ShaderNotFound(String),

    /// The shader template failed to render.
    #[error("Shader template error: {0}")]
    ShaderTemplate(#[from] minijinja::Error),

    /// The device rejected a shader module or pipeline.
    #[error("{label}: GPU validation failed: {message}")]
    GpuValidation { label: String, message: String },

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// A mesh snapshot with no triangles was handed to a mesh renderable.
    #[error("internal error, empty mesh")]
    EmptyMesh,

    /// A path with fewer than two points was handed to a path renderable.
    #[error("internal error, empty path")]
    EmptyPath,

    /// Render targets cannot be allocated with a zero extent.
    #[error("Render target '{label}' has zero size ({width}x{height})")]
    ZeroSizedTarget {
        /// Target label
        label: &'static str,
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
    },

    /// A domain was used before it was created.
    #[error("{0}: Internal error: data not initialized")]
    NotInitialized(String),

    /// Reading back an occlusion query result failed.
    #[error("Occlusion query readback failed: {0}")]
    QueryReadback(String),

    // ========================================================================
    // Usage Errors
    // ========================================================================
    /// The handle does not refer to a live renderable.
    #[error("Cannot add a null renderer ('{0}')")]
    NullRenderable(String),

    /// Only mesh renderables can join the transparent set.
    #[error("Renderer '{0}' is not a mesh and cannot be rendered as transparent")]
    NotAMesh(String),

    // ========================================================================
    // I/O Errors
    // ========================================================================
    /// File I/O error (shader hot reload).
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Alias for `Result<T, PeelError>`.
pub type Result<T> = std::result::Result<T, PeelError>;
