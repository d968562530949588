//! Shading Parameters
//!
//! [`ShadingParameters`] is the material/light/opacity state embedded in
//! drawables (mesh renderables today). It is not a renderer on its own:
//! [`ShadingParameters::bind`] turns it into a [`ShadingUniforms`] block that
//! the owning drawable uploads next to its transform.
//!
//! The lighting rig is fixed: one directional light shining down the view
//! axis and one spot light with no distance attenuation. Both are expressed
//! in view space.
//!
//! # GPU Layout
//!
//! ```text
//! group(0) binding(0)  ObjectTransform  { mvp }
//! group(0) binding(1)  ShadingUniforms  { model_view, normal_matrix, color,
//!                                         flags, material, dir_light, spot_light }
//! ```
//!
//! Every field is 16-byte aligned so the Rust and WGSL layouts match
//! without explicit padding members.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::renderer::core::view::normal_matrix;

/// Vertex-stage transform of one drawable.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable, PartialEq)]
pub struct ObjectTransform {
    pub model_view_projection: [[f32; 4]; 4],
}

impl ObjectTransform {
    #[must_use]
    pub fn new(model_view_projection: Mat4) -> Self {
        Self {
            model_view_projection: model_view_projection.to_cols_array_2d(),
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable, PartialEq)]
pub struct MaterialBlock {
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    /// `w` holds the shininess exponent.
    pub specular: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable, PartialEq)]
pub struct DirectionalLightBlock {
    pub direction: [f32; 4],
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable, PartialEq)]
pub struct SpotLightBlock {
    pub position: [f32; 4],
    pub direction: [f32; 4],
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    /// `(constant, linear, quadratic, 0)`
    pub attenuation: [f32; 4],
    /// `(cos cut_off, cos outer_cut_off, 0, 0)`
    pub cone: [f32; 4],
}

/// Fragment-stage shading inputs of one drawable.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable, PartialEq)]
pub struct ShadingUniforms {
    pub model_view: [[f32; 4]; 4],
    /// Upper 3×3 inverse-transpose, stored in a 4×4 for alignment.
    pub normal_matrix: [[f32; 4]; 4],
    /// Flat color in `rgb`, opacity in `a`.
    pub color: [f32; 4],
    /// `(use_ambient_light, material_on, 0, 0)`
    pub flags: [u32; 4],
    pub material: MaterialBlock,
    pub dir_light: DirectionalLightBlock,
    pub spot_light: SpotLightBlock,
}

// ============================================================================
// Fixed lighting rig
// ============================================================================

/// View-space directional light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
}

/// View-space spot light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotLight {
    pub position: Vec3,
    pub direction: Vec3,
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub constant: f32,
    pub linear: f32,
    pub quadratic: f32,
    /// Cosine of the inner cone angle.
    pub cut_off: f32,
    /// Cosine of the outer cone angle.
    pub outer_cut_off: f32,
}

pub const DIRECTIONAL_LIGHT: DirectionalLight = DirectionalLight {
    direction: Vec3::new(0.0, 0.0, -1.0),
    ambient: Vec3::splat(0.2),
    diffuse: Vec3::splat(0.7),
    specular: Vec3::splat(0.3),
};

/// The fixed spot light. Linear and quadratic terms are zero, so distance
/// does not attenuate it.
#[must_use]
pub fn spot_light() -> SpotLight {
    SpotLight {
        position: Vec3::new(200.0, 100.0, 500.0),
        direction: Vec3::new(0.0, 0.7, -0.7),
        ambient: Vec3::splat(0.1),
        diffuse: Vec3::splat(0.4),
        specular: Vec3::ZERO,
        constant: 1.0,
        linear: 0.0,
        quadratic: 0.0,
        cut_off: 70.0_f32.to_radians().cos(),
        outer_cut_off: 0.0_f32.to_radians().cos(),
    }
}

fn vec4(v: Vec3, w: f32) -> [f32; 4] {
    v.extend(w).to_array()
}

fn mat3_cols(m: glam::Mat3) -> [[f32; 4]; 4] {
    Mat4::from_mat3(m).to_cols_array_2d()
}

// ============================================================================
// ShadingParameters
// ============================================================================

/// Material colors used when `material_on` is set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialColors {
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub shininess: f32,
}

impl Default for MaterialColors {
    fn default() -> Self {
        Self {
            ambient: Vec3::splat(0.35),
            diffuse: Vec3::splat(0.8),
            specular: Vec3::ZERO,
            shininess: 32.0,
        }
    }
}

/// Material, light toggles and opacity of a drawable.
///
/// - `use_ambient_light`: light the surface with the fixed rig; when off the
///   flat `color` is output unlit.
/// - `material_on`: use the material colors; when off the flat `color`
///   drives ambient and diffuse terms (plastic look).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadingParameters {
    pub use_ambient_light: bool,
    pub material_on: bool,
    pub material: MaterialColors,
    pub color: Vec3,
    pub opacity: f32,
}

impl Default for ShadingParameters {
    fn default() -> Self {
        Self {
            use_ambient_light: true,
            material_on: true,
            material: MaterialColors::default(),
            color: Vec3::ZERO,
            opacity: 1.0,
        }
    }
}

impl ShadingParameters {
    /// `true` when blending is needed to draw this surface correctly.
    #[inline]
    #[must_use]
    pub fn is_translucent(&self) -> bool {
        self.opacity < 1.0
    }

    /// Builds the uniform block for the given model-view matrix.
    ///
    /// Light and material slots are zeroed when `use_ambient_light` is off.
    #[must_use]
    pub fn bind(&self, model_view: Mat4) -> ShadingUniforms {
        let mut uniforms = ShadingUniforms {
            model_view: model_view.to_cols_array_2d(),
            normal_matrix: mat3_cols(normal_matrix(model_view)),
            color: vec4(self.color, self.opacity),
            flags: [
                u32::from(self.use_ambient_light),
                u32::from(self.material_on),
                0,
                0,
            ],
            ..ShadingUniforms::zeroed()
        };

        if !self.use_ambient_light {
            return uniforms;
        }

        uniforms.material = MaterialBlock {
            ambient: vec4(self.material.ambient, 0.0),
            diffuse: vec4(self.material.diffuse, 0.0),
            specular: vec4(self.material.specular, self.material.shininess),
        };

        let dir = DIRECTIONAL_LIGHT;
        uniforms.dir_light = DirectionalLightBlock {
            direction: vec4(dir.direction, 0.0),
            ambient: vec4(dir.ambient, 0.0),
            diffuse: vec4(dir.diffuse, 0.0),
            specular: vec4(dir.specular, 0.0),
        };

        let spot = spot_light();
        uniforms.spot_light = SpotLightBlock {
            position: vec4(spot.position, 1.0),
            direction: vec4(spot.direction, 0.0),
            ambient: vec4(spot.ambient, 0.0),
            diffuse: vec4(spot.diffuse, 0.0),
            specular: vec4(spot.specular, 0.0),
            attenuation: [spot.constant, spot.linear, spot.quadratic, 0.0],
            cone: [spot.cut_off, spot.outer_cut_off, 0.0, 0.0],
        };

        uniforms
    }
}
