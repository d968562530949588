//! Shading Parameter Tests
//!
//! Tests for:
//! - ShadingParameters defaults
//! - Uniform block contents with and without the light rig
//! - GPU struct layout sizes shared with WGSL

use glam::{Mat3, Mat4, Vec3};

use depth_peel::renderer::shading::{
    DIRECTIONAL_LIGHT, ObjectTransform, ShadingParameters, ShadingUniforms, spot_light,
};

const EPSILON: f32 = 1e-5;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

// ============================================================================
// Defaults
// ============================================================================

#[test]
fn defaults_are_opaque_black_with_material() {
    let shading = ShadingParameters::default();
    assert!(shading.use_ambient_light);
    assert!(shading.material_on);
    assert_eq!(shading.color, Vec3::ZERO);
    assert!(approx(shading.opacity, 1.0));
    assert!(!shading.is_translucent());

    assert_eq!(shading.material.ambient, Vec3::splat(0.35));
    assert_eq!(shading.material.diffuse, Vec3::splat(0.8));
    assert_eq!(shading.material.specular, Vec3::ZERO);
}

#[test]
fn translucent_below_full_opacity() {
    let shading = ShadingParameters {
        opacity: 0.5,
        ..Default::default()
    };
    assert!(shading.is_translucent());
}

// ============================================================================
// bind()
// ============================================================================

#[test]
fn bind_always_writes_color_and_matrices() {
    let shading = ShadingParameters {
        use_ambient_light: false,
        color: Vec3::new(0.2, 0.4, 0.6),
        opacity: 0.25,
        ..Default::default()
    };
    let model_view = Mat4::from_translation(Vec3::new(0.0, 0.0, -3.0));
    let block = shading.bind(model_view);

    assert_eq!(block.color, [0.2, 0.4, 0.6, 0.25]);
    assert_eq!(block.model_view, model_view.to_cols_array_2d());
    assert_eq!(block.flags, [0, 1, 0, 0]);
    assert_eq!(
        block.normal_matrix,
        Mat4::from_mat3(Mat3::IDENTITY).to_cols_array_2d()
    );
}

#[test]
fn lights_and_material_zeroed_without_ambient_light() {
    let shading = ShadingParameters {
        use_ambient_light: false,
        ..Default::default()
    };
    let block = shading.bind(Mat4::IDENTITY);

    assert_eq!(block.material.ambient, [0.0; 4]);
    assert_eq!(block.dir_light.diffuse, [0.0; 4]);
    assert_eq!(block.spot_light.position, [0.0; 4]);
}

#[test]
fn light_rig_is_bound_with_ambient_light() {
    let block = ShadingParameters::default().bind(Mat4::IDENTITY);

    assert_eq!(block.flags, [1, 1, 0, 0]);
    assert_eq!(block.material.ambient, [0.35, 0.35, 0.35, 0.0]);
    assert_eq!(block.material.diffuse, [0.8, 0.8, 0.8, 0.0]);

    assert_eq!(block.dir_light.direction, [0.0, 0.0, -1.0, 0.0]);
    assert_eq!(block.dir_light.ambient[0], 0.2);
    assert_eq!(block.dir_light.diffuse[0], 0.7);
    assert_eq!(block.dir_light.specular[0], 0.3);

    assert_eq!(block.spot_light.position, [200.0, 100.0, 500.0, 1.0]);
    assert_eq!(block.spot_light.attenuation, [1.0, 0.0, 0.0, 0.0]);
    assert!(approx(block.spot_light.cone[0], 70.0_f32.to_radians().cos()));
    assert!(approx(block.spot_light.cone[1], 1.0));
}

#[test]
fn bind_has_no_side_effects() {
    let shading = ShadingParameters::default();
    let before = shading;
    let a = shading.bind(Mat4::IDENTITY);
    let b = shading.bind(Mat4::IDENTITY);
    assert_eq!(a, b);
    assert_eq!(shading, before);
}

// ============================================================================
// Fixed rig and layout
// ============================================================================

#[test]
fn spot_light_constants() {
    let spot = spot_light();
    assert_eq!(spot.direction, Vec3::new(0.0, 0.7, -0.7));
    assert_eq!(spot.ambient, Vec3::splat(0.1));
    assert_eq!(spot.diffuse, Vec3::splat(0.4));
    assert_eq!(spot.specular, Vec3::ZERO);
    assert_eq!(DIRECTIONAL_LIGHT.direction, Vec3::NEG_Z);
}

#[test]
fn uniform_blocks_are_16_byte_multiples() {
    assert_eq!(std::mem::size_of::<ObjectTransform>(), 64);
    assert_eq!(std::mem::size_of::<ShadingUniforms>() % 16, 0);
    // 2 mat4 + color + flags + material(3) + dir(4) + spot(7)
    assert_eq!(std::mem::size_of::<ShadingUniforms>(), 2 * 64 + 16 * (2 + 3 + 4 + 7));
}
