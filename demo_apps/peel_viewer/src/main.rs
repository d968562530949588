//! Peel Viewer
//!
//! Three translucent spheres floating over an opaque ground plane,
//! composited with dual depth peeling.
//!
//! Keys:
//! - `O`: toggle the occlusion query
//! - `+` / `-`: change the fixed peel pass budget
//! - `R`: reload shaders from disk
//!
//! Shader files under `DEPTH_PEEL_SHADER_DIR` are polled for changes and
//! reloaded automatically.

use std::f32::consts::{PI, TAU};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use glam::{Mat4, Vec3};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

use depth_peel::renderer::pipeline::shader_watch::ShaderWatcher;
use depth_peel::renderer::{
    GpuContext, GpuResources, MeshData, MeshRenderable, PlaneRenderable, RenderRegistry,
    RendererSettings, SceneView, ShadingParameters, TransparencyCompositor,
};
use depth_peel::{LoggingConfig, init_logging};

const SKY: Vec3 = Vec3::new(44.0 / 255.0, 183.0 / 255.0, 185.0 / 255.0);
const WATCH_INTERVAL: Duration = Duration::from_millis(500);

fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default());

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new();
    event_loop.run_app(&mut app)?;
    Ok(())
}

// ============================================================================
// Scene
// ============================================================================

/// UV sphere with outward normals.
fn sphere(center: Vec3, radius: f32, stacks: u32, slices: u32) -> MeshData {
    let mut positions = Vec::with_capacity(((stacks + 1) * (slices + 1)) as usize);
    let mut normals = Vec::with_capacity(positions.capacity());

    for i in 0..=stacks {
        let phi = PI * i as f32 / stacks as f32;
        for j in 0..=slices {
            let theta = TAU * j as f32 / slices as f32;
            let normal = Vec3::new(phi.sin() * theta.cos(), phi.sin() * theta.sin(), phi.cos());
            positions.push(center + normal * radius);
            normals.push(normal);
        }
    }

    let row = slices + 1;
    let mut indices = Vec::with_capacity((stacks * slices * 6) as usize);
    for i in 0..stacks {
        for j in 0..slices {
            let a = i * row + j;
            let b = a + row;
            indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
        }
    }

    MeshData::new(positions, normals, indices)
}

fn translucent_sphere(label: &str, center: Vec3, color: Vec3) -> MeshRenderable {
    let mut shading = ShadingParameters {
        color,
        opacity: 0.5,
        ..Default::default()
    };
    shading.material.ambient = Vec3::new(100.0, 60.0, 20.0) / 255.0;

    MeshRenderable::new(label, Arc::new(sphere(center, 8.0, 32, 48))).with_shading(shading)
}

/// Orbiting camera looking at the origin with `+z` up.
fn scene_view(width: u32, height: u32, time: f32) -> SceneView {
    let eye = Vec3::new(70.0 * (0.2 * time).cos(), 70.0 * (0.2 * time).sin(), 45.0);
    let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Z);
    let aspect = width as f32 / height.max(1) as f32;
    let projection = Mat4::perspective_rh(45f32.to_radians(), aspect, 1.0, 500.0);
    SceneView::new(view, projection, Mat4::IDENTITY).with_viewport(width, height)
}

// ============================================================================
// Application
// ============================================================================

struct Graphics {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    gpu: GpuContext,
}

impl Graphics {
    async fn new(window: Arc<Window>, settings: &RendererSettings) -> anyhow::Result<Self> {
        let size = window.inner_size();
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: settings.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;

        let config = surface
            .get_default_config(&adapter, size.width.max(1), size.height.max(1))
            .context("surface is not supported by the adapter")?;

        let gpu = GpuContext::from_adapter(&adapter, settings, config.format).await?;
        surface.configure(&gpu.device, &config);

        Ok(Self {
            window,
            surface,
            config,
            gpu,
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.gpu.device, &self.config);
        }
    }
}

struct App {
    settings: RendererSettings,
    graphics: Option<Graphics>,
    registry: RenderRegistry,
    compositor: TransparencyCompositor,
    watcher: Option<ShaderWatcher>,
    last_watch: Instant,
    start_time: Instant,
}

impl App {
    fn new() -> Self {
        let settings = RendererSettings {
            background_color: SKY,
            ..Default::default()
        };
        let compositor = TransparencyCompositor::from_settings(&settings);
        let now = Instant::now();

        Self {
            settings,
            graphics: None,
            registry: RenderRegistry::new(),
            compositor,
            watcher: ShaderWatcher::for_search_path(),
            last_watch: now,
            start_time: now,
        }
    }

    fn build_scene(&mut self) -> anyhow::Result<()> {
        let mut ground = PlaneRenderable::new("ground");
        ground.set_plane(Vec3::new(0.0, 0.0, -10.0), Vec3::Z, Vec3::splat(0.75));
        let ground = self.registry.insert(ground);
        self.compositor
            .append_opaque_object(&self.registry, "ground", ground)?;

        let spheres = [
            ("red", Vec3::new(-6.0, 0.0, 0.0), Vec3::new(0.9, 0.1, 0.1)),
            ("green", Vec3::new(6.0, 0.0, 0.0), Vec3::new(0.1, 0.8, 0.2)),
            ("blue", Vec3::new(0.0, 8.0, 4.0), Vec3::new(0.1, 0.2, 0.9)),
        ];
        for (name, center, color) in spheres {
            let id = self.registry.insert(translucent_sphere(name, center, color));
            self.compositor
                .append_transparent_object(&mut self.registry, name, id)?;
        }
        Ok(())
    }

    fn reload_shaders(&mut self) {
        if let Some(graphics) = &self.graphics {
            log::info!("Reloading shaders");
            self.compositor
                .reload_shaders(&graphics.gpu, &mut self.registry);
        }
    }

    fn poll_shaders(&mut self) {
        if self.last_watch.elapsed() < WATCH_INTERVAL {
            return;
        }
        self.last_watch = Instant::now();

        let Some(watcher) = &mut self.watcher else {
            return;
        };
        match watcher.poll() {
            Ok(changed) if !changed.is_empty() => {
                log::debug!("Shader files changed: {changed:?}");
                self.reload_shaders();
            }
            Ok(_) => {}
            Err(e) => log::warn!("Shader watch failed: {e}"),
        }
    }

    fn render(&mut self) {
        let Some(graphics) = &mut self.graphics else {
            return;
        };

        let output = match graphics.surface.get_current_texture() {
            wgpu::CurrentSurfaceTexture::Success(output)
            | wgpu::CurrentSurfaceTexture::Suboptimal(output) => output,
            wgpu::CurrentSurfaceTexture::Outdated | wgpu::CurrentSurfaceTexture::Lost => {
                let (width, height) = (graphics.config.width, graphics.config.height);
                graphics.resize(width, height);
                return;
            }
            wgpu::CurrentSurfaceTexture::Timeout | wgpu::CurrentSurfaceTexture::Occluded => return,
            wgpu::CurrentSurfaceTexture::Validation => {
                log::error!("Surface texture acquisition failed validation");
                return;
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let time = self.start_time.elapsed().as_secs_f32();
        let scene = scene_view(graphics.config.width, graphics.config.height, time);

        if self
            .compositor
            .render(&graphics.gpu, &mut self.registry, &scene, &view)
        {
            graphics.window.pre_present_notify();
            output.present();
        }
    }

    fn handle_key(&mut self, event: &KeyEvent) {
        if event.state != ElementState::Pressed {
            return;
        }
        match event.logical_key.as_ref() {
            Key::Character("o" | "O") => {
                let enabled = !self.compositor.algorithm().settings().use_occlusion_query;
                self.compositor.set_occlusion_query_enabled(enabled);
                log::info!("Occlusion query: {enabled}");
            }
            Key::Character("+" | "=") => {
                let passes = self.compositor.algorithm().settings().number_of_passes + 1;
                self.compositor.set_number_of_passes(passes);
                log::info!("Peel pass budget: {passes}");
            }
            Key::Character("-") => {
                let passes = self
                    .compositor
                    .algorithm()
                    .settings()
                    .number_of_passes
                    .saturating_sub(1)
                    .max(1);
                self.compositor.set_number_of_passes(passes);
                log::info!("Peel pass budget: {passes}");
            }
            Key::Character("r" | "R") => self.reload_shaders(),
            Key::Named(NamedKey::F1) => {
                log::info!("Last frame ran {} peel passes", self.compositor.last_pass_count());
            }
            _ => {}
        }
    }

    fn shutdown(&mut self) {
        if let Some(graphics) = &self.graphics {
            self.compositor
                .clear_transparent_objects(&mut self.registry);
            self.compositor.clear_opaque_objects();
            self.compositor.cleanup(&graphics.gpu);
            self.registry.cleanup_all(&graphics.gpu);
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.graphics.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title("Dual Depth Peeling")
            .with_inner_size(winit::dpi::LogicalSize::new(1280.0, 720.0));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };

        log::info!("Initializing renderer...");
        let graphics = match pollster::block_on(Graphics::new(window, &self.settings)) {
            Ok(graphics) => graphics,
            Err(e) => {
                log::error!("Fatal renderer error: {e:#}");
                event_loop.exit();
                return;
            }
        };

        let (width, height) = (graphics.config.width, graphics.config.height);
        if !self.compositor.initialize(&graphics.gpu, width, height) {
            log::error!("Compositor failed to initialize");
            event_loop.exit();
            return;
        }
        self.graphics = Some(graphics);

        if let Err(e) = self.build_scene() {
            log::error!("Failed to build scene: {e}");
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.shutdown();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(graphics) = &mut self.graphics {
                    graphics.resize(size.width, size.height);
                    if size.width > 0 && size.height > 0 {
                        self.compositor
                            .set_size(&graphics.gpu, size.width, size.height);
                    }
                }
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(&event),
            WindowEvent::RedrawRequested => {
                self.poll_shaders();
                self.render();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(graphics) = &self.graphics {
            graphics.window.request_redraw();
        }
    }
}
