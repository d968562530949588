//! Renderer Settings
//!
//! Configuration consumed when the GPU context and the transparency
//! compositor are created.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use depth_peel::renderer::settings::{PeelSettings, RendererSettings};
//!
//! // Defaults: occlusion-query driven peeling, white background
//! let settings = RendererSettings::default();
//!
//! // Deterministic frame cost: always run three peel passes
//! let settings = RendererSettings {
//!     peel: PeelSettings {
//!         use_occlusion_query: false,
//!         number_of_passes: 4,
//!     },
//!     ..Default::default()
//! };
//! ```

use glam::Vec3;

// ---------------------------------------------------------------------------
// TargetPrecision
// ---------------------------------------------------------------------------

/// Floating-point precision of the offscreen accumulation targets.
///
/// | Precision | Depth target | Color targets | Requirement                 |
/// |-----------|--------------|---------------|-----------------------------|
/// | `Full`    | `Rg32Float`  | `Rgba32Float` | `Features::FLOAT32_BLENDABLE` |
/// | `Half`    | `Rg16Float`  | `Rgba16Float` | none                        |
///
/// Peeling relies on MAX blending of these targets, and 32-bit float targets
/// are only blendable with the `FLOAT32_BLENDABLE` feature. With `Half`
/// precision the peel shaders round fragment depth to f16 before every
/// comparison so layer equality tests stay exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TargetPrecision {
    #[default]
    Full,
    Half,
}

impl TargetPrecision {
    /// Picks the best precision the adapter can blend.
    #[must_use]
    pub fn for_features(features: wgpu::Features, prefer_full: bool) -> Self {
        if prefer_full && features.contains(wgpu::Features::FLOAT32_BLENDABLE) {
            Self::Full
        } else {
            Self::Half
        }
    }

    /// Format of the two-channel `(-min, max)` depth targets.
    #[inline]
    #[must_use]
    pub fn depth_pair_format(self) -> wgpu::TextureFormat {
        match self {
            Self::Full => wgpu::TextureFormat::Rg32Float,
            Self::Half => wgpu::TextureFormat::Rg16Float,
        }
    }

    /// Format of the color accumulation targets (opaque color, front, back).
    #[inline]
    #[must_use]
    pub fn color_format(self) -> wgpu::TextureFormat {
        match self {
            Self::Full => wgpu::TextureFormat::Rgba32Float,
            Self::Half => wgpu::TextureFormat::Rgba16Float,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_half(self) -> bool {
        matches!(self, Self::Half)
    }
}

// ---------------------------------------------------------------------------
// PeelSettings
// ---------------------------------------------------------------------------

/// Loop control for dual depth peeling.
///
/// With `use_occlusion_query` the loop stops at the first pass that peels
/// nothing, at the cost of one CPU/GPU synchronization per pass. Without it
/// the loop always runs `number_of_passes - 1` peel passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeelSettings {
    pub use_occlusion_query: bool,
    pub number_of_passes: u32,
}

impl Default for PeelSettings {
    fn default() -> Self {
        Self {
            use_occlusion_query: true,
            number_of_passes: 4,
        }
    }
}

// ---------------------------------------------------------------------------
// RendererSettings
// ---------------------------------------------------------------------------

/// Global configuration for GPU context and compositor creation.
///
/// # Fields
///
/// | Field                 | Description                            | Default           |
/// |-----------------------|----------------------------------------|-------------------|
/// | `power_preference`    | GPU adapter selection strategy         | `HighPerformance` |
/// | `required_features`   | Features the adapter must support      | Empty             |
/// | `required_limits`     | Required wgpu limits                   | Default           |
/// | `prefer_full_precision` | Use 32-bit targets when blendable    | `true`            |
/// | `output_format`       | Format of the final (presented) target | `Rgba8Unorm`      |
/// | `background_color`    | Color behind all geometry              | White             |
/// | `peel`                | Peel loop control                      | OQ on, 4 passes   |
#[derive(Debug, Clone)]
pub struct RendererSettings {
    // === GPU / Backend Configuration ===
    /// GPU adapter selection preference.
    pub power_preference: wgpu::PowerPreference,

    /// Required wgpu features that must be supported by the adapter.
    ///
    /// `FLOAT32_BLENDABLE` is added automatically when the adapter has it and
    /// `prefer_full_precision` is set.
    pub required_features: wgpu::Features,

    /// Required wgpu limits.
    pub required_limits: wgpu::Limits,

    /// Request 32-bit float accumulation targets when the adapter allows it.
    pub prefer_full_precision: bool,

    /// Format of the view the final composite is written to.
    ///
    /// Replaced by the surface format when the context is built for a window.
    pub output_format: wgpu::TextureFormat,

    // === Compositor Defaults ===
    /// Background color (linear RGB, 0–1).
    pub background_color: Vec3,

    /// Peel loop control.
    pub peel: PeelSettings,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            prefer_full_precision: true,
            output_format: wgpu::TextureFormat::Rgba8Unorm,
            background_color: Vec3::ONE,
            peel: PeelSettings::default(),
        }
    }
}
