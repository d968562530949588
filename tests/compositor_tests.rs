//! Compositor and Dual Depth Peeling Tests (GPU)
//!
//! Tests for:
//! - Composite color of overlapping translucent quads
//! - Order independence of registration
//! - Peel pass counts with and without occlusion queries
//! - Opaque-only frames and occlusion by opaque geometry
//! - Failure isolation of a broken renderable
//! - Idempotent initialization (tracked resource ids)
//!
//! Every test builds a headless context and returns early when the machine
//! has no usable adapter.

use std::sync::Arc;

use glam::Vec3;

use depth_peel::errors::Result;
use depth_peel::logging::{LoggingConfig, init_logging};
use depth_peel::renderer::lifecycle::{GpuResources, RenderableLifecycle};
use depth_peel::renderer::pipeline::states::TargetKind;
use depth_peel::renderer::{
    GpuContext, MeshData, MeshRenderable, RenderRegistry, Renderable, RendererSettings,
    SceneView, ShadingParameters, TransparencyCompositor,
};

const SIZE: u32 = 64;
const BYTES_PER_ROW: u32 = SIZE * 4;
const TOLERANCE: i32 = 3;

// ============================================================================
// Helpers
// ============================================================================

fn gpu() -> Option<GpuContext> {
    init_logging(LoggingConfig::for_tests());
    match GpuContext::new_headless_blocking(&RendererSettings::default()) {
        Ok(gpu) => Some(gpu),
        Err(e) => {
            log::warn!("Skipping GPU test: {e}");
            None
        }
    }
}

/// Square in the `z` plane covering `[-half, half]²` of clip space.
fn quad_mesh(half: f32, z: f32) -> Arc<MeshData> {
    Arc::new(MeshData::new(
        vec![
            Vec3::new(-half, -half, z),
            Vec3::new(half, -half, z),
            Vec3::new(half, half, z),
            Vec3::new(-half, half, z),
        ],
        vec![Vec3::Z; 4],
        vec![0, 1, 2, 0, 2, 3],
    ))
}

/// Unlit quad of a flat color.
fn flat_quad(label: &str, half: f32, z: f32, color: Vec3, opacity: f32) -> MeshRenderable {
    MeshRenderable::new(label, quad_mesh(half, z)).with_shading(ShadingParameters {
        use_ambient_light: false,
        color,
        opacity,
        ..Default::default()
    })
}

struct Output {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

fn output(gpu: &GpuContext) -> Output {
    let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Test Output"),
        size: wgpu::Extent3d {
            width: SIZE,
            height: SIZE,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: gpu.output_format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Output { texture, view }
}

fn read_pixel(gpu: &GpuContext, texture: &wgpu::Texture, x: u32, y: u32) -> [u8; 4] {
    let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Test Readback"),
        size: u64::from(BYTES_PER_ROW * SIZE),
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(BYTES_PER_ROW),
                rows_per_image: Some(SIZE),
            },
        },
        wgpu::Extent3d {
            width: SIZE,
            height: SIZE,
            depth_or_array_layers: 1,
        },
    );
    gpu.queue.submit(Some(encoder.finish()));

    let slice = buffer.slice(..);
    slice.map_async(wgpu::MapMode::Read, |_| {});
    gpu.device
        .poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        })
        .unwrap();

    let data = slice.get_mapped_range();
    let offset = (y * BYTES_PER_ROW + x * 4) as usize;
    [
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ]
}

fn assert_rgb(actual: [u8; 4], expected: [u8; 3]) {
    for channel in 0..3 {
        let delta = i32::from(actual[channel]) - i32::from(expected[channel]);
        assert!(
            delta.abs() <= TOLERANCE,
            "Expected {expected:?}, got {actual:?}"
        );
    }
}

fn view() -> SceneView {
    SceneView::default().with_viewport(SIZE, SIZE)
}

fn initialized_compositor(gpu: &GpuContext) -> TransparencyCompositor {
    let mut compositor = TransparencyCompositor::from_settings(&RendererSettings::default());
    assert!(compositor.initialize(gpu, SIZE, SIZE));
    compositor
}

/// Renders one frame and returns the center pixel.
fn render_center(
    gpu: &GpuContext,
    compositor: &mut TransparencyCompositor,
    registry: &mut RenderRegistry,
) -> [u8; 4] {
    let target = output(gpu);
    assert!(compositor.render(gpu, registry, &view(), &target.view));
    read_pixel(gpu, &target.texture, SIZE / 2, SIZE / 2)
}

const RED: Vec3 = Vec3::new(1.0, 0.0, 0.0);
const BLUE: Vec3 = Vec3::new(0.0, 0.0, 1.0);
const GREEN: Vec3 = Vec3::new(0.0, 1.0, 0.0);

/// Red at 0.5 over blue at 0.5 over white: (0.75, 0.25, 0.5).
const RED_OVER_BLUE_OVER_WHITE: [u8; 3] = [191, 64, 128];

// ============================================================================
// Composite correctness
// ============================================================================

#[test]
fn two_half_transparent_quads_over_background() {
    let Some(gpu) = gpu() else { return };
    let mut registry = RenderRegistry::new();
    let mut compositor = initialized_compositor(&gpu);

    let near = registry.insert(flat_quad("near", 0.5, 0.3, RED, 0.5));
    let far = registry.insert(flat_quad("far", 0.5, 0.6, BLUE, 0.5));
    compositor
        .append_transparent_object(&mut registry, "near", near)
        .unwrap();
    compositor
        .append_transparent_object(&mut registry, "far", far)
        .unwrap();

    let pixel = render_center(&gpu, &mut compositor, &mut registry);
    assert_rgb(pixel, RED_OVER_BLUE_OVER_WHITE);
    assert_eq!(compositor.last_pass_count(), 2);
}

#[test]
fn registration_order_does_not_change_the_result() {
    let Some(gpu) = gpu() else { return };
    let mut registry = RenderRegistry::new();
    let mut compositor = initialized_compositor(&gpu);

    let far = registry.insert(flat_quad("far", 0.5, 0.6, BLUE, 0.5));
    let near = registry.insert(flat_quad("near", 0.5, 0.3, RED, 0.5));
    compositor
        .append_transparent_object(&mut registry, "a", far)
        .unwrap();
    compositor
        .append_transparent_object(&mut registry, "b", near)
        .unwrap();

    let pixel = render_center(&gpu, &mut compositor, &mut registry);
    assert_rgb(pixel, RED_OVER_BLUE_OVER_WHITE);
}

#[test]
fn fixed_pass_budget_gives_the_same_image() {
    let Some(gpu) = gpu() else { return };
    let mut registry = RenderRegistry::new();
    let mut compositor = initialized_compositor(&gpu);
    compositor.set_occlusion_query_enabled(false);
    compositor.set_number_of_passes(4);

    let near = registry.insert(flat_quad("near", 0.5, 0.3, RED, 0.5));
    let far = registry.insert(flat_quad("far", 0.5, 0.6, BLUE, 0.5));
    compositor
        .append_transparent_object(&mut registry, "near", near)
        .unwrap();
    compositor
        .append_transparent_object(&mut registry, "far", far)
        .unwrap();

    let pixel = render_center(&gpu, &mut compositor, &mut registry);
    assert_rgb(pixel, RED_OVER_BLUE_OVER_WHITE);
    assert_eq!(compositor.last_pass_count(), 3);
}

// ============================================================================
// Pass counts
// ============================================================================

#[test]
fn single_layer_needs_one_pass() {
    let Some(gpu) = gpu() else { return };
    let mut registry = RenderRegistry::new();
    let mut compositor = initialized_compositor(&gpu);

    let id = registry.insert(flat_quad("only", 0.5, 0.5, RED, 0.5));
    compositor
        .append_transparent_object(&mut registry, "only", id)
        .unwrap();

    // Red at 0.5 over white.
    let pixel = render_center(&gpu, &mut compositor, &mut registry);
    assert_rgb(pixel, [255, 128, 128]);
    assert_eq!(compositor.last_pass_count(), 1);
}

/// Near to far: red, green, blue, red, each at 0.5 over white.
const FOUR_LAYERS: [(&str, f32, Vec3); 4] = [
    ("first", 0.2, RED),
    ("second", 0.4, GREEN),
    ("third", 0.6, BLUE),
    ("fourth", 0.8, RED),
];

/// Back-to-front "over" of [`FOUR_LAYERS`]: (0.625, 0.3125, 0.1875).
const FOUR_LAYERS_OVER_WHITE: [u8; 3] = [159, 80, 48];

fn render_four_layers(gpu: &GpuContext, order: [usize; 4]) -> ([u8; 4], u32) {
    let mut registry = RenderRegistry::new();
    let mut compositor = initialized_compositor(gpu);

    for index in order {
        let (name, z, color) = FOUR_LAYERS[index];
        let id = registry.insert(flat_quad(name, 0.5, z, color, 0.5));
        compositor
            .append_transparent_object(&mut registry, name, id)
            .unwrap();
    }

    let pixel = render_center(gpu, &mut compositor, &mut registry);
    (pixel, compositor.last_pass_count())
}

#[test]
fn four_layers_need_three_passes() {
    let Some(gpu) = gpu() else { return };

    for order in [[0, 1, 2, 3], [3, 1, 0, 2]] {
        let (pixel, passes) = render_four_layers(&gpu, order);
        assert_rgb(pixel, FOUR_LAYERS_OVER_WHITE);
        // Two layers per pass, then one pass that peels nothing.
        assert_eq!(passes, 3, "order {order:?}");
    }
}

// ============================================================================
// Opaque geometry
// ============================================================================

#[test]
fn zero_transparent_objects_render_the_opaque_scene() {
    let Some(gpu) = gpu() else { return };
    let mut registry = RenderRegistry::new();
    let mut compositor = initialized_compositor(&gpu);

    let ground = registry.insert(flat_quad("ground", 0.5, 0.8, GREEN, 1.0));
    compositor
        .append_opaque_object(&registry, "ground", ground)
        .unwrap();

    let target = output(&gpu);
    assert!(compositor.render(&gpu, &mut registry, &view(), &target.view));
    assert_rgb(read_pixel(&gpu, &target.texture, SIZE / 2, SIZE / 2), [0, 255, 0]);
    // Outside the quad the background shows.
    assert_rgb(read_pixel(&gpu, &target.texture, 1, 1), [255, 255, 255]);
}

#[test]
fn transparent_behind_opaque_is_hidden() {
    let Some(gpu) = gpu() else { return };
    let mut registry = RenderRegistry::new();
    let mut compositor = initialized_compositor(&gpu);

    let ground = registry.insert(flat_quad("ground", 0.5, 0.5, GREEN, 1.0));
    let hidden = registry.insert(flat_quad("hidden", 0.5, 0.9, RED, 0.5));
    compositor
        .append_opaque_object(&registry, "ground", ground)
        .unwrap();
    compositor
        .append_transparent_object(&mut registry, "hidden", hidden)
        .unwrap();

    let pixel = render_center(&gpu, &mut compositor, &mut registry);
    assert_rgb(pixel, [0, 255, 0]);
}

#[test]
fn background_color_is_used() {
    let Some(gpu) = gpu() else { return };
    let mut registry = RenderRegistry::new();
    let mut compositor = initialized_compositor(&gpu);
    compositor.set_background_color(Vec3::ZERO);

    let pixel = render_center(&gpu, &mut compositor, &mut registry);
    assert_rgb(pixel, [0, 0, 0]);
}

// ============================================================================
// Failure isolation
// ============================================================================

/// A renderable whose shader cannot be found.
#[derive(Default)]
struct BrokenShader {
    lifecycle: RenderableLifecycle,
}

impl GpuResources for BrokenShader {
    type Context = GpuContext;

    fn lifecycle(&self) -> &RenderableLifecycle {
        &self.lifecycle
    }
    fn lifecycle_mut(&mut self) -> &mut RenderableLifecycle {
        &mut self.lifecycle
    }
    fn init_shaders(&mut self, gpu: &GpuContext) -> Result<()> {
        gpu.load_shader("Shaders:does_not_exist").map(|_| ())
    }
    fn delete_shaders(&mut self) {}
    fn shaders_initialized(&self) -> bool {
        false
    }
    fn init_targets(&mut self, _gpu: &GpuContext, _w: u32, _h: u32) -> Result<()> {
        Ok(())
    }
    fn delete_targets(&mut self) {}
    fn targets_initialized(&self) -> bool {
        true
    }
    fn init_aux(&mut self, _gpu: &GpuContext) -> Result<()> {
        Ok(())
    }
    fn delete_aux(&mut self) {}
    fn aux_initialized(&self) -> bool {
        true
    }
}

impl Renderable for BrokenShader {
    fn prepare(&mut self, _gpu: &GpuContext, _view: &SceneView) {}
    fn render(&self, _pass: &mut wgpu::RenderPass<'_>, _kind: TargetKind) {
        panic!("a renderable that is not ready must never be drawn");
    }
}

#[test]
fn broken_renderable_is_skipped() {
    let Some(gpu) = gpu() else { return };
    let mut registry = RenderRegistry::new();
    let mut compositor = initialized_compositor(&gpu);

    let broken = registry.insert(BrokenShader::default());
    let ground = registry.insert(flat_quad("ground", 0.5, 0.8, GREEN, 1.0));
    compositor
        .append_opaque_object(&registry, "broken", broken)
        .unwrap();
    compositor
        .append_opaque_object(&registry, "ground", ground)
        .unwrap();

    let pixel = render_center(&gpu, &mut compositor, &mut registry);
    assert_rgb(pixel, [0, 255, 0]);
    assert!(!registry.get(broken).unwrap().is_ready());
}

#[test]
fn empty_mesh_is_skipped() {
    let Some(gpu) = gpu() else { return };
    let mut registry = RenderRegistry::new();
    let mut compositor = initialized_compositor(&gpu);

    let empty = registry.insert(MeshRenderable::new("empty", Arc::new(MeshData::default())));
    compositor
        .append_transparent_object(&mut registry, "empty", empty)
        .unwrap();

    let pixel = render_center(&gpu, &mut compositor, &mut registry);
    assert_rgb(pixel, [255, 255, 255]);
}

#[test]
fn render_without_initialize_is_refused() {
    let Some(gpu) = gpu() else { return };
    let mut registry = RenderRegistry::new();
    let mut compositor: TransparencyCompositor = TransparencyCompositor::default();
    let target = output(&gpu);
    assert!(!compositor.render(&gpu, &mut registry, &view(), &target.view));
}

// ============================================================================
// Lifecycle on real resources
// ============================================================================

#[test]
fn mesh_initialize_is_idempotent() {
    let Some(gpu) = gpu() else { return };
    let mut mesh = flat_quad("m", 0.5, 0.5, RED, 1.0);

    assert!(mesh.initialize(&gpu, SIZE, SIZE));
    let buffer = mesh.vertex_buffer_id();
    let pipeline = mesh.pipeline_id();
    assert!(buffer.is_some() && pipeline.is_some());

    assert!(mesh.initialize(&gpu, SIZE, SIZE));
    assert_eq!(mesh.vertex_buffer_id(), buffer);
    assert_eq!(mesh.pipeline_id(), pipeline);
    assert_eq!(mesh.vertex_count(), 6);
}

#[test]
fn new_snapshot_of_same_size_is_written_in_place() {
    let Some(gpu) = gpu() else { return };
    let mut mesh = flat_quad("m", 0.5, 0.5, RED, 1.0);
    assert!(mesh.initialize(&gpu, SIZE, SIZE));
    let buffer = mesh.vertex_buffer_id();
    let pipeline = mesh.pipeline_id();

    mesh.set_mesh(quad_mesh(0.25, 0.5));
    assert!(!mesh.is_ready());
    assert!(mesh.initialize(&gpu, SIZE, SIZE));
    assert_eq!(mesh.vertex_buffer_id(), buffer);
    assert_eq!(mesh.pipeline_id(), pipeline);
}

#[test]
fn compositor_resize_keeps_shaders() {
    let Some(gpu) = gpu() else { return };
    let mut compositor = initialized_compositor(&gpu);

    compositor.prepare_for_resize();
    assert!(!compositor.is_ready());
    assert!(compositor.set_size(&gpu, SIZE * 2, SIZE));
    assert!(compositor.is_ready());
    assert_eq!(compositor.lifecycle().size(), (SIZE * 2, SIZE));

    compositor.cleanup(&gpu);
    assert!(!compositor.is_ready());
    assert!(!compositor.lifecycle().is_fully_initialized());
}

#[test]
fn shader_reload_rebuilds_on_next_frame() {
    let Some(gpu) = gpu() else { return };
    let mut registry = RenderRegistry::new();
    let mut compositor = initialized_compositor(&gpu);

    let near = registry.insert(flat_quad("near", 0.5, 0.3, RED, 0.5));
    compositor
        .append_transparent_object(&mut registry, "near", near)
        .unwrap();
    render_center(&gpu, &mut compositor, &mut registry);
    let pipeline = registry.mesh(near).unwrap().pipeline_id();

    compositor.reload_shaders(&gpu, &mut registry);
    assert!(!compositor.is_ready());

    let pixel = render_center(&gpu, &mut compositor, &mut registry);
    assert_rgb(pixel, [255, 128, 128]);
    assert_ne!(registry.mesh(near).unwrap().pipeline_id(), pipeline);
}
