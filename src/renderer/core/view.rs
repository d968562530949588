//! Scene View
//!
//! [`SceneView`] is the per-frame camera input handed to the compositor by
//! the host: a view matrix, a projection matrix, the scene model matrix and
//! the viewport size in device pixels.
//!
//! The camera itself (trackball, zoom, projection math) lives outside this
//! crate; only the resulting matrices flow in.
//!
//! # Data Flow
//!
//! ```text
//! host camera ──▶ SceneView ──▶ TransparencyCompositor::render()
//!                                   ├── Renderable::prepare()   (uniform upload)
//!                                   └── Renderable::render()    (draw)
//! ```

use glam::{Mat3, Mat4};

/// Camera and scene matrices for one frame.
///
/// Positions are transformed as `projection · view · model · p`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneView {
    pub view: Mat4,
    pub projection: Mat4,
    pub model: Mat4,
    /// Viewport size in device pixels.
    pub viewport: (u32, u32),
}

impl Default for SceneView {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            model: Mat4::IDENTITY,
            viewport: (1, 1),
        }
    }
}

impl SceneView {
    #[must_use]
    pub fn new(view: Mat4, projection: Mat4, model: Mat4) -> Self {
        Self {
            view,
            projection,
            model,
            viewport: (1, 1),
        }
    }

    #[must_use]
    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = (width.max(1), height.max(1));
        self
    }

    #[inline]
    #[must_use]
    pub fn model_view(&self) -> Mat4 {
        self.view * self.model
    }

    #[inline]
    #[must_use]
    pub fn model_view_projection(&self) -> Mat4 {
        self.projection * self.view * self.model
    }

    /// Inverse-transpose of the upper 3×3 of `model_view`.
    #[must_use]
    pub fn normal_matrix(&self) -> Mat3 {
        normal_matrix(self.model_view())
    }
}

/// Inverse-transpose of the upper 3×3 of `m` (identity when singular).
#[must_use]
pub fn normal_matrix(m: Mat4) -> Mat3 {
    let upper = Mat3::from_mat4(m);
    if upper.determinant().abs() <= f32::EPSILON {
        return Mat3::IDENTITY;
    }
    upper.inverse().transpose()
}
