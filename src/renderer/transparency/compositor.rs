//! Transparency Compositor
//!
//! Owns the offscreen opaque targets and two named collections of
//! renderables, and drives one frame:
//!
//! 1. lazily initialize registered renderables that are not ready
//! 2. draw the opaque set into color + depth-stencil (cleared to background)
//! 3. redraw the opaque set into the depth-only reference
//! 4. hand the transparent meshes to the [`TransparencyAlgorithm`], which
//!    writes the output view
//!
//! Renderables are owned by a [`RenderRegistry`]; the compositor keeps
//! [`RenderableId`] keys by name. A key whose entry was removed from the
//! registry is skipped with a warning.
//!
//! ```rust,ignore
//! let mut registry = RenderRegistry::new();
//! let mut compositor = TransparencyCompositor::from_settings(&settings);
//! compositor.initialize(&gpu, width, height);
//!
//! let plane = registry.insert(PlaneRenderable::new("ground"));
//! let bunny = registry.insert(MeshRenderable::new("bunny", mesh));
//! compositor.append_opaque_object(&registry, "ground", plane)?;
//! compositor.append_transparent_object(&mut registry, "bunny", bunny)?;
//!
//! compositor.render(&gpu, &mut registry, &view, &output_view);
//! ```

use glam::Vec3;
use rustc_hash::FxHashMap;

use crate::errors::{PeelError, Result};
use crate::renderer::core::{GpuContext, RenderTarget, SceneView};
use crate::renderer::lifecycle::{GpuResources, RenderableLifecycle};
use crate::renderer::mesh::MeshRenderable;
use crate::renderer::pipeline::states::{
    OPAQUE_DEPTH_FORMAT, OPAQUE_DEPTH_STENCIL_FORMAT, TargetKind,
};
use crate::renderer::registry::{RenderRegistry, RenderableId};
use crate::renderer::renderable::NOT_INITIALIZED;
use crate::renderer::settings::RendererSettings;
use crate::renderer::transparency::dual_depth_peeling::DualDepthPeeling;
use crate::renderer::transparency::{
    FullscreenQuad, OpaqueTargets, TransparencyAlgorithm, TransparentFrame,
};

struct OpaqueFrameTargets {
    color: RenderTarget,
    depth_stencil: RenderTarget,
    depth_only: RenderTarget,
}

/// Renders opaque objects, then composites transparent meshes over them.
pub struct TransparencyCompositor<A: TransparencyAlgorithm = DualDepthPeeling> {
    lifecycle: RenderableLifecycle,
    algorithm: A,
    background_color: Vec3,

    opaque_objects: FxHashMap<String, RenderableId>,
    transparent_objects: FxHashMap<String, RenderableId>,

    targets: Option<OpaqueFrameTargets>,
    quad: Option<FullscreenQuad>,
}

impl TransparencyCompositor<DualDepthPeeling> {
    /// Dual depth peeling configured from `settings`.
    #[must_use]
    pub fn from_settings(settings: &RendererSettings) -> Self {
        Self::new(DualDepthPeeling::new(settings.peel))
            .with_background_color(settings.background_color)
    }

    pub fn set_occlusion_query_enabled(&mut self, enabled: bool) {
        self.algorithm.set_occlusion_query_enabled(enabled);
    }

    pub fn set_number_of_passes(&mut self, number_of_passes: u32) {
        self.algorithm.set_number_of_passes(number_of_passes);
    }

    /// Peel passes run by the last frame.
    #[must_use]
    pub fn last_pass_count(&self) -> u32 {
        self.algorithm.last_pass_count()
    }
}

impl Default for TransparencyCompositor<DualDepthPeeling> {
    fn default() -> Self {
        Self::new(DualDepthPeeling::default())
    }
}

impl<A: TransparencyAlgorithm> TransparencyCompositor<A> {
    #[must_use]
    pub fn new(algorithm: A) -> Self {
        Self {
            lifecycle: RenderableLifecycle::new(),
            algorithm,
            background_color: Vec3::ONE,
            opaque_objects: FxHashMap::default(),
            transparent_objects: FxHashMap::default(),
            targets: None,
            quad: None,
        }
    }

    #[must_use]
    pub fn with_background_color(mut self, color: Vec3) -> Self {
        self.background_color = color;
        self
    }

    pub fn algorithm(&self) -> &A {
        &self.algorithm
    }

    pub fn algorithm_mut(&mut self) -> &mut A {
        &mut self.algorithm
    }

    // ========================================================================
    // Settings
    // ========================================================================

    /// Linear RGB in `[0, 1]`; takes effect on the next frame.
    pub fn set_background_color(&mut self, color: Vec3) {
        self.background_color = color;
    }

    #[must_use]
    pub fn background_color(&self) -> Vec3 {
        self.background_color
    }

    /// Marks the targets stale without reallocating them. The next
    /// `initialize`, `set_size` or `render` call rebuilds them at the
    /// recorded size.
    pub fn prepare_for_resize(&mut self) {
        self.request_update_targets();
    }

    /// Drops cached shader modules and marks the shader domain of the
    /// compositor and of every registered renderable stale.
    pub fn reload_shaders(&mut self, gpu: &GpuContext, registry: &mut RenderRegistry) {
        gpu.shaders().reload();
        self.request_update_shaders();
        for (_, renderable) in registry.iter_mut() {
            renderable.request_update_shaders();
        }
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Adds (or replaces) a renderable drawn in the opaque passes.
    pub fn append_opaque_object(
        &mut self,
        registry: &RenderRegistry,
        name: impl Into<String>,
        id: RenderableId,
    ) -> Result<()> {
        let name = name.into();
        if !registry.contains(id) {
            return Err(PeelError::NullRenderable(name));
        }
        self.opaque_objects.insert(name, id);
        Ok(())
    }

    /// Adds (or replaces) a mesh composited by the transparency algorithm.
    ///
    /// The mesh stops blending on its own while it is registered here.
    pub fn append_transparent_object(
        &mut self,
        registry: &mut RenderRegistry,
        name: impl Into<String>,
        id: RenderableId,
    ) -> Result<()> {
        let name = name.into();
        if !registry.contains(id) {
            return Err(PeelError::NullRenderable(name));
        }
        let Some(mesh) = registry.mesh_mut(id) else {
            return Err(PeelError::NotAMesh(name));
        };
        mesh.set_classical_rendering(false);

        if let Some(previous) = self.transparent_objects.insert(name, id)
            && previous != id
        {
            self.release_mesh(registry, previous);
        }
        Ok(())
    }

    /// Erases `name`; a missing name is ignored.
    pub fn remove_opaque_object(&mut self, name: &str) {
        self.opaque_objects.remove(name);
    }

    /// Erases `name` and gives the mesh its own blending back.
    pub fn remove_transparent_object(&mut self, registry: &mut RenderRegistry, name: &str) {
        if let Some(id) = self.transparent_objects.remove(name) {
            self.release_mesh(registry, id);
        }
    }

    #[must_use]
    pub fn contains_opaque_object(&self, name: &str) -> bool {
        self.opaque_objects.contains_key(name)
    }

    #[must_use]
    pub fn contains_transparent_object(&self, name: &str) -> bool {
        self.transparent_objects.contains_key(name)
    }

    pub fn clear_opaque_objects(&mut self) {
        self.opaque_objects.clear();
    }

    pub fn clear_transparent_objects(&mut self, registry: &mut RenderRegistry) {
        for (_, id) in self.transparent_objects.drain() {
            if let Some(mesh) = registry.mesh_mut(id) {
                mesh.set_classical_rendering(true);
            }
        }
    }

    #[must_use]
    pub fn opaque_count(&self) -> usize {
        self.opaque_objects.len()
    }

    #[must_use]
    pub fn transparent_count(&self) -> usize {
        self.transparent_objects.len()
    }

    // ========================================================================
    // Frame
    // ========================================================================

    /// Renders one frame into `output` (a view of `gpu.output_format`, sized
    /// like the compositor).
    ///
    /// Returns `false` when nothing could be composited. Renderables that
    /// fail to initialize are skipped; the rest of the frame still renders.
    pub fn render(
        &mut self,
        gpu: &GpuContext,
        registry: &mut RenderRegistry,
        view: &SceneView,
        output: &wgpu::TextureView,
    ) -> bool {
        let (width, height) = self.lifecycle.size();
        if !self.is_ready() {
            let recovered =
                self.lifecycle.is_fully_initialized() && self.initialize(gpu, width, height);
            if !recovered {
                log::error!("{}: {NOT_INITIALIZED}", self.label());
                return false;
            }
        }

        let opaque = self.prepare_objects(gpu, registry, view, Collection::Opaque);
        let transparent = self.prepare_objects(gpu, registry, view, Collection::Transparent);

        let (Some(targets), Some(quad)) = (&self.targets, &self.quad) else {
            return false;
        };

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Transparency Encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Opaque Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: targets.color.view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(to_clear_color(self.background_color)),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: targets.depth_stencil.view(),
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(0),
                        store: wgpu::StoreOp::Store,
                    }),
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            for &id in &opaque {
                if let Some(renderable) = registry.get(id) {
                    renderable.render(&mut pass, TargetKind::Color);
                }
            }
        }

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Opaque Depth Pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: targets.depth_only.view(),
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            for &id in &opaque {
                if let Some(renderable) = registry.get(id) {
                    renderable.render(&mut pass, TargetKind::DepthOnly);
                }
            }
        }

        let meshes: Vec<&MeshRenderable> = transparent
            .iter()
            .filter_map(|&id| registry.mesh(id))
            .collect();

        let mut frame = TransparentFrame {
            gpu,
            encoder: &mut encoder,
            meshes: &meshes,
            opaque: OpaqueTargets {
                color: targets.color.view(),
                depth: targets.depth_only.view(),
            },
            quad,
            output,
            background: self.background_color,
        };
        let result = self.algorithm.render_transparent_objects(&mut frame);
        gpu.queue.submit(Some(encoder.finish()));

        match result {
            Ok(()) => true,
            Err(e) => {
                log::error!("{}: {e}", self.algorithm.name());
                false
            }
        }
    }

    /// Restores the mesh's own blending unless another name still holds it.
    fn release_mesh(&self, registry: &mut RenderRegistry, id: RenderableId) {
        if self.transparent_objects.values().any(|&other| other == id) {
            return;
        }
        if let Some(mesh) = registry.mesh_mut(id) {
            mesh.set_classical_rendering(true);
        }
    }

    /// Initializes and uploads uniforms for one collection; returns the ids
    /// that are ready to draw.
    fn prepare_objects(
        &self,
        gpu: &GpuContext,
        registry: &mut RenderRegistry,
        view: &SceneView,
        collection: Collection,
    ) -> Vec<RenderableId> {
        let (width, height) = self.lifecycle.size();
        let objects = match collection {
            Collection::Opaque => &self.opaque_objects,
            Collection::Transparent => &self.transparent_objects,
        };

        let mut ready = Vec::with_capacity(objects.len());
        for (name, &id) in objects {
            let Some(renderable) = registry.get_mut(id) else {
                log::warn!("{}: '{name}' no longer exists, skipped", self.label());
                continue;
            };
            if !renderable.is_ready() && !renderable.initialize(gpu, width, height) {
                log::error!("{}: '{name}' is not ready, skipped", self.label());
                continue;
            }
            renderable.prepare(gpu, view);
            ready.push(id);
        }
        ready
    }
}

#[derive(Debug, Clone, Copy)]
enum Collection {
    Opaque,
    Transparent,
}

fn to_clear_color(color: Vec3) -> wgpu::Color {
    wgpu::Color {
        r: f64::from(color.x),
        g: f64::from(color.y),
        b: f64::from(color.z),
        a: 1.0,
    }
}

impl<A: TransparencyAlgorithm> GpuResources for TransparencyCompositor<A> {
    type Context = GpuContext;

    fn lifecycle(&self) -> &RenderableLifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut RenderableLifecycle {
        &mut self.lifecycle
    }

    fn label(&self) -> &str {
        "TransparencyCompositor"
    }

    fn init_shaders(&mut self, gpu: &GpuContext) -> Result<()> {
        self.algorithm.init_shaders(gpu)
    }

    fn delete_shaders(&mut self) {
        self.algorithm.delete_shaders();
    }

    fn shaders_initialized(&self) -> bool {
        self.algorithm.shaders_initialized()
    }

    fn init_targets(&mut self, gpu: &GpuContext, width: u32, height: u32) -> Result<()> {
        let device = &gpu.device;
        let color =
            RenderTarget::sampled_color(device, "Opaque Color", width, height, gpu.color_format())?;
        let depth_stencil = RenderTarget::new(
            device,
            "Opaque Depth Stencil",
            width,
            height,
            OPAQUE_DEPTH_STENCIL_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        )?;
        let depth_only = RenderTarget::new(
            device,
            "Opaque Depth",
            width,
            height,
            OPAQUE_DEPTH_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        )?;

        self.algorithm.init_targets(gpu, width, height)?;
        self.targets = Some(OpaqueFrameTargets {
            color,
            depth_stencil,
            depth_only,
        });
        Ok(())
    }

    fn update_targets(&mut self, gpu: &GpuContext, width: u32, height: u32) -> Result<()> {
        self.delete_targets();
        self.init_targets(gpu, width, height)
    }

    fn delete_targets(&mut self) {
        self.targets = None;
        self.algorithm.delete_targets();
    }

    fn targets_initialized(&self) -> bool {
        self.targets.is_some() && self.algorithm.targets_initialized()
    }

    fn init_aux(&mut self, gpu: &GpuContext) -> Result<()> {
        self.algorithm.init_aux(gpu)?;
        self.quad = Some(FullscreenQuad::new(gpu));
        Ok(())
    }

    fn delete_aux(&mut self) {
        self.quad = None;
        self.algorithm.delete_aux();
    }

    fn aux_initialized(&self) -> bool {
        self.quad.is_some() && self.algorithm.aux_initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::renderer::mesh::MeshData;
    use crate::renderer::path::PathRenderable;

    fn compositor() -> TransparencyCompositor {
        TransparencyCompositor::default()
    }

    fn mesh() -> MeshRenderable {
        MeshRenderable::new("m", Arc::new(MeshData::default()))
    }

    #[test]
    fn transparent_round_trip_restores_classical_rendering() {
        let mut registry = RenderRegistry::new();
        let id = registry.insert(mesh());
        let mut compositor = compositor();

        compositor
            .append_transparent_object(&mut registry, "m", id)
            .unwrap();
        assert!(compositor.contains_transparent_object("m"));
        assert!(!registry.mesh(id).unwrap().classical_rendering());

        compositor.remove_transparent_object(&mut registry, "m");
        assert!(!compositor.contains_transparent_object("m"));
        assert!(registry.mesh(id).unwrap().classical_rendering());
    }

    #[test]
    fn stale_ids_are_null() {
        let mut registry = RenderRegistry::new();
        let id = registry.insert(mesh());
        registry.remove(id);
        let mut compositor = compositor();

        let err = compositor
            .append_opaque_object(&registry, "gone", id)
            .unwrap_err();
        assert!(matches!(err, PeelError::NullRenderable(name) if name == "gone"));
        assert!(matches!(
            compositor.append_transparent_object(&mut registry, "gone", id),
            Err(PeelError::NullRenderable(_))
        ));
        assert_eq!(compositor.opaque_count(), 0);
    }

    #[test]
    fn only_meshes_can_be_transparent() {
        let mut registry = RenderRegistry::new();
        let id = registry.insert(PathRenderable::segment("p", Vec3::ZERO, Vec3::X, Vec3::ONE));
        let mut compositor = compositor();

        assert!(matches!(
            compositor.append_transparent_object(&mut registry, "p", id),
            Err(PeelError::NotAMesh(_))
        ));
        compositor.append_opaque_object(&registry, "p", id).unwrap();
        assert!(compositor.contains_opaque_object("p"));
    }

    #[test]
    fn overwriting_a_name_releases_the_previous_mesh() {
        let mut registry = RenderRegistry::new();
        let first = registry.insert(mesh());
        let second = registry.insert(mesh());
        let mut compositor = compositor();

        compositor
            .append_transparent_object(&mut registry, "m", first)
            .unwrap();
        compositor
            .append_transparent_object(&mut registry, "m", second)
            .unwrap();

        assert_eq!(compositor.transparent_count(), 1);
        assert!(registry.mesh(first).unwrap().classical_rendering());
        assert!(!registry.mesh(second).unwrap().classical_rendering());
    }

    #[test]
    fn mesh_under_two_names_stays_transparent_until_both_are_gone() {
        let mut registry = RenderRegistry::new();
        let id = registry.insert(mesh());
        let mut compositor = compositor();
        compositor
            .append_transparent_object(&mut registry, "a", id)
            .unwrap();
        compositor
            .append_transparent_object(&mut registry, "b", id)
            .unwrap();

        compositor.remove_transparent_object(&mut registry, "a");
        assert!(!registry.mesh(id).unwrap().classical_rendering());
        compositor.remove_transparent_object(&mut registry, "b");
        assert!(registry.mesh(id).unwrap().classical_rendering());
    }

    #[test]
    fn removing_missing_names_is_tolerated() {
        let mut registry = RenderRegistry::new();
        let mut compositor = compositor();
        compositor.remove_opaque_object("nothing");
        compositor.remove_transparent_object(&mut registry, "nothing");
        assert_eq!(compositor.transparent_count(), 0);
    }

    #[test]
    fn clear_transparent_releases_every_mesh() {
        let mut registry = RenderRegistry::new();
        let a = registry.insert(mesh());
        let b = registry.insert(mesh());
        let mut compositor = compositor();
        compositor
            .append_transparent_object(&mut registry, "a", a)
            .unwrap();
        compositor
            .append_transparent_object(&mut registry, "b", b)
            .unwrap();

        compositor.clear_transparent_objects(&mut registry);
        assert_eq!(compositor.transparent_count(), 0);
        assert!(registry.mesh(a).unwrap().classical_rendering());
        assert!(registry.mesh(b).unwrap().classical_rendering());
    }

    #[test]
    fn prepare_for_resize_only_flips_the_targets_flag() {
        use crate::renderer::lifecycle::Domains;

        let mut compositor = compositor();
        compositor.lifecycle_mut().set_ready(Domains::all(), true);
        compositor.prepare_for_resize();
        assert_eq!(
            compositor.lifecycle().ready(),
            Domains::SHADERS | Domains::AUX
        );
    }

    #[test]
    fn settings_flow_into_the_algorithm() {
        let settings = RendererSettings {
            background_color: Vec3::new(0.1, 0.2, 0.3),
            ..Default::default()
        };
        let mut compositor = TransparencyCompositor::from_settings(&settings);
        assert_eq!(compositor.background_color(), Vec3::new(0.1, 0.2, 0.3));

        compositor.set_occlusion_query_enabled(false);
        compositor.set_number_of_passes(3);
        assert!(!compositor.algorithm().settings().use_occlusion_query);
        assert_eq!(compositor.algorithm().settings().number_of_passes, 3);
    }
}
