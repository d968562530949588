//! GPU Context
//!
//! The [`GpuContext`] holds the core GPU handles every renderable needs:
//! device, queue, the format of the final output view, the precision of the
//! offscreen accumulation targets, and the shared [`ShaderManager`].
//!
//! Every context carries a process-unique id. Renderables record the id of
//! the context their resources were created on, which lets the lifecycle
//! refuse destructive calls made with a different device instead of handing
//! foreign handles to wgpu.

use parking_lot::{Mutex, MutexGuard};

use crate::errors::{PeelError, Result};
use crate::renderer::core::tracked::next_id;
use crate::renderer::pipeline::shader_manager::{
    ShaderDefines, ShaderManager, init_shader_search_paths,
};
use crate::renderer::settings::{RendererSettings, TargetPrecision};

/// Core wgpu context shared by the compositor and all renderables.
pub struct GpuContext {
    id: u64,
    /// The wgpu device for resource creation
    pub device: wgpu::Device,
    /// The command queue for submitting work
    pub queue: wgpu::Queue,
    /// Format of the view the final composite is written to
    pub output_format: wgpu::TextureFormat,
    /// Precision of the offscreen accumulation targets
    pub precision: TargetPrecision,
    /// Features enabled on `device`
    pub features: wgpu::Features,

    shaders: Mutex<ShaderManager>,
}

impl GpuContext {
    /// Creates a context without a presentation surface.
    ///
    /// Used by tests and offscreen hosts; the output view is any texture of
    /// `settings.output_format`.
    pub async fn new_headless(settings: &RendererSettings) -> Result<Self> {
        let instance = wgpu::Instance::default();

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: settings.power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| PeelError::AdapterRequestFailed(e.to_string()))?;

        Self::from_adapter(&adapter, settings, settings.output_format).await
    }

    /// Blocking form of [`new_headless`](Self::new_headless).
    pub fn new_headless_blocking(settings: &RendererSettings) -> Result<Self> {
        pollster::block_on(Self::new_headless(settings))
    }

    /// Requests a device from `adapter` and builds the context around it.
    ///
    /// `output_format` is usually the surface format chosen by the host.
    pub async fn from_adapter(
        adapter: &wgpu::Adapter,
        settings: &RendererSettings,
        output_format: wgpu::TextureFormat,
    ) -> Result<Self> {
        let precision =
            TargetPrecision::for_features(adapter.features(), settings.prefer_full_precision);

        let mut required_features = settings.required_features;
        if precision == TargetPrecision::Full {
            required_features |= wgpu::Features::FLOAT32_BLENDABLE;
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("depth-peel device"),
                required_features,
                required_limits: settings.required_limits.clone(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await?;

        log::debug!(
            "GPU context ready: adapter {:?}, precision {precision:?}, output {output_format:?}",
            adapter.get_info().name,
        );

        Ok(Self::from_device(
            device,
            queue,
            output_format,
            precision,
            required_features,
        ))
    }

    /// Wraps a device the host already owns.
    ///
    /// `precision` must be [`TargetPrecision::Half`] unless `features`
    /// contains `FLOAT32_BLENDABLE`.
    #[must_use]
    pub fn from_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        output_format: wgpu::TextureFormat,
        precision: TargetPrecision,
        features: wgpu::Features,
    ) -> Self {
        init_shader_search_paths();

        let precision = if features.contains(wgpu::Features::FLOAT32_BLENDABLE) {
            precision
        } else {
            TargetPrecision::Half
        };

        Self {
            id: next_id(),
            device,
            queue,
            output_format,
            precision,
            features,
            shaders: Mutex::new(ShaderManager::new()),
        }
    }

    /// Process-unique id of this context.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Locks the shared shader manager.
    pub fn shaders(&self) -> MutexGuard<'_, ShaderManager> {
        self.shaders.lock()
    }

    /// Template defines matching this context's target precision.
    #[must_use]
    pub fn shader_defines(&self) -> ShaderDefines {
        ShaderDefines {
            half_precision: self.precision.is_half(),
            ..Default::default()
        }
    }

    /// Compiles (or fetches from cache) a logical shader for this context.
    pub fn load_shader(&self, name: &str) -> Result<wgpu::ShaderModule> {
        let defines = self.shader_defines();
        self.shaders.lock().load(&self.device, name, &defines)
    }

    /// Format of the `(-min, max)` depth targets.
    #[inline]
    #[must_use]
    pub fn depth_pair_format(&self) -> wgpu::TextureFormat {
        self.precision.depth_pair_format()
    }

    /// Format of the offscreen color targets.
    #[inline]
    #[must_use]
    pub fn color_format(&self) -> wgpu::TextureFormat {
        self.precision.color_format()
    }
}
