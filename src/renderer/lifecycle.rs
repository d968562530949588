//! Renderable Lifecycle
//!
//! Every drawable object owns GPU state split into three independent
//! domains:
//!
//! | Domain    | Typical contents                                  | Invalidated by          |
//! |-----------|---------------------------------------------------|-------------------------|
//! | `SHADERS` | shader modules, bind group layouts, pipelines     | shader hot reload       |
//! | `TARGETS` | size-dependent textures and their bind groups     | resize                  |
//! | `AUX`     | vertex buffers, query sets, uniform buffers       | new geometry snapshot   |
//!
//! [`GpuResources`] provides the state machine over those domains; types
//! only implement the per-domain hooks.
//!
//! # State Machine
//!
//! ```text
//!                 initialize() ok
//!   Uninitialized ───────────────▶ FullyInitialized ◀──┐
//!         ▲                          │   request_update_*()
//!         │ cleanup()                ▼                 │ initialize():
//!         └───────────────────── Stale domain(s) ──────┘ re-run stale only
//! ```
//!
//! `fully_initialized` is set once after the first successful pass through
//! all three domains. Invalidating a domain never clears it; only
//! [`cleanup`](GpuResources::cleanup) does.

use bitflags::bitflags;

use crate::errors::{PeelError, Result};
use crate::renderer::core::GpuContext;

bitflags! {
    /// Set of resource domains.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Domains: u8 {
        const SHADERS = 1 << 0;
        const TARGETS = 1 << 1;
        const AUX     = 1 << 2;
    }
}

/// Anything resources can be created on. Only its identity matters to the
/// lifecycle; the hooks use the concrete type.
pub trait ResourceContext {
    fn context_id(&self) -> u64;
}

impl ResourceContext for GpuContext {
    #[inline]
    fn context_id(&self) -> u64 {
        self.id()
    }
}

/// Ready flags, size and owning context of one renderable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderableLifecycle {
    ready: Domains,
    fully_initialized: bool,
    width: u32,
    height: u32,
    context: Option<u64>,
}

impl RenderableLifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn ready(&self) -> Domains {
        self.ready
    }

    #[inline]
    #[must_use]
    pub fn is_domain_ready(&self, domain: Domains) -> bool {
        self.ready.contains(domain)
    }

    #[inline]
    pub fn set_ready(&mut self, domain: Domains, ready: bool) {
        self.ready.set(domain, ready);
    }

    /// Marks `domain` stale. Cheap and idempotent.
    #[inline]
    pub fn request_update(&mut self, domain: Domains) {
        self.ready.remove(domain);
    }

    #[inline]
    #[must_use]
    pub fn is_fully_initialized(&self) -> bool {
        self.fully_initialized
    }

    /// Last size passed to `initialize`.
    #[inline]
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Id of the context the resources were created on.
    #[inline]
    #[must_use]
    pub fn context(&self) -> Option<u64> {
        self.context
    }

    /// Fails if resources already exist on a different context.
    pub fn check_owner(&self, ctx: &impl ResourceContext) -> Result<()> {
        match self.context {
            Some(bound) if bound != ctx.context_id() => Err(PeelError::ContextMismatch {
                bound,
                requested: ctx.context_id(),
            }),
            _ => Ok(()),
        }
    }

    fn reset(&mut self) {
        self.ready = Domains::empty();
        self.fully_initialized = false;
        self.context = None;
    }
}

fn report(label: &str, domain: &str, result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            log::error!("{label}: failed to initialize {domain}: {e}");
            false
        }
    }
}

/// Three-domain lazy GPU resource management.
///
/// Implementors provide `init_*`, `delete_*` and `*_initialized` for each
/// domain; `update_targets` / `update_aux` default to delete + init and may
/// be overridden to reuse existing objects. Hooks must tolerate `delete_*`
/// on a domain that holds nothing.
pub trait GpuResources {
    type Context: ResourceContext;

    fn lifecycle(&self) -> &RenderableLifecycle;
    fn lifecycle_mut(&mut self) -> &mut RenderableLifecycle;

    /// Name used in log messages.
    fn label(&self) -> &str {
        "renderable"
    }

    // --- Shaders ---
    fn init_shaders(&mut self, ctx: &Self::Context) -> Result<()>;
    fn delete_shaders(&mut self);
    fn shaders_initialized(&self) -> bool;

    // --- Render targets ---
    fn init_targets(&mut self, ctx: &Self::Context, width: u32, height: u32) -> Result<()>;
    fn update_targets(&mut self, ctx: &Self::Context, width: u32, height: u32) -> Result<()> {
        self.delete_targets();
        self.init_targets(ctx, width, height)
    }
    fn delete_targets(&mut self);
    fn targets_initialized(&self) -> bool;

    // --- Auxiliary objects ---
    fn init_aux(&mut self, ctx: &Self::Context) -> Result<()>;
    fn update_aux(&mut self, ctx: &Self::Context) -> Result<()> {
        self.delete_aux();
        self.init_aux(ctx)
    }
    fn delete_aux(&mut self);
    fn aux_initialized(&self) -> bool;

    // ========================================================================
    // Provided state machine
    // ========================================================================

    /// Creates (or re-creates stale) resources. Idempotent.
    fn initialize(&mut self, ctx: &Self::Context, width: u32, height: u32) -> bool {
        {
            let lifecycle = self.lifecycle_mut();
            lifecycle.width = width;
            lifecycle.height = height;
        }

        if self.lifecycle().is_fully_initialized() {
            if let Err(e) = self.lifecycle().check_owner(ctx) {
                log::error!("{}: {e}", self.label());
                return false;
            }

            if !self.lifecycle().is_domain_ready(Domains::SHADERS) {
                self.delete_shaders();
                let result = self.init_shaders(ctx);
                let ok = report(self.label(), "shaders", result);
                self.lifecycle_mut().set_ready(Domains::SHADERS, ok);
            }
            if !self.lifecycle().is_domain_ready(Domains::TARGETS) {
                let result = self.update_targets(ctx, width, height);
                let ok = report(self.label(), "render targets", result);
                self.lifecycle_mut().set_ready(Domains::TARGETS, ok);
            }
            if !self.lifecycle().is_domain_ready(Domains::AUX) {
                let result = self.update_aux(ctx);
                let ok = report(self.label(), "auxiliary objects", result);
                self.lifecycle_mut().set_ready(Domains::AUX, ok);
            }

            return self.is_ready();
        }

        let holds_resources =
            self.shaders_initialized() || self.targets_initialized() || self.aux_initialized();
        if holds_resources && let Err(e) = self.lifecycle().check_owner(ctx) {
            log::error!("{}: Fail to bind GPU context: {e}", self.label());
            return false;
        }
        self.lifecycle_mut().context = Some(ctx.context_id());

        let result = self.init_shaders(ctx);
        let shaders = report(self.label(), "shaders", result);
        self.lifecycle_mut().set_ready(Domains::SHADERS, shaders);

        let result = self.init_targets(ctx, width, height);
        let targets = report(self.label(), "render targets", result);
        self.lifecycle_mut().set_ready(Domains::TARGETS, targets);

        let result = self.init_aux(ctx);
        let aux = report(self.label(), "auxiliary objects", result);
        self.lifecycle_mut().set_ready(Domains::AUX, aux);

        if !self.is_ready() {
            log::error!("{}: Cannot initialize shaders and render targets", self.label());
            return false;
        }

        self.lifecycle_mut().fully_initialized = true;
        log::debug!("{} initialized ({width}x{height})", self.label());
        true
    }

    /// Releases every domain (targets, aux, shaders) if fully initialized.
    fn cleanup(&mut self, ctx: &Self::Context) {
        if !self.lifecycle().is_fully_initialized() {
            return;
        }
        if let Err(e) = self.lifecycle().check_owner(ctx) {
            log::error!("{}: cleanup skipped: {e}", self.label());
            return;
        }

        if self.targets_initialized() {
            self.delete_targets();
        }
        if self.aux_initialized() {
            self.delete_aux();
        }
        if self.shaders_initialized() {
            self.delete_shaders();
        }

        self.lifecycle_mut().reset();
        log::debug!("{} released", self.label());
    }

    /// Marks targets stale and re-initializes.
    fn set_size(&mut self, ctx: &Self::Context, width: u32, height: u32) -> bool {
        self.request_update_targets();
        self.initialize(ctx, width, height)
    }

    /// All three flags set and every domain check agrees.
    fn is_ready(&self) -> bool {
        self.lifecycle().ready().is_all()
            && self.shaders_initialized()
            && self.targets_initialized()
            && self.aux_initialized()
    }

    fn request_update_shaders(&mut self) {
        self.lifecycle_mut().request_update(Domains::SHADERS);
    }

    fn request_update_targets(&mut self) {
        self.lifecycle_mut().request_update(Domains::TARGETS);
    }

    fn request_update_aux(&mut self) {
        self.lifecycle_mut().request_update(Domains::AUX);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ctx(u64);

    impl ResourceContext for Ctx {
        fn context_id(&self) -> u64 {
            self.0
        }
    }

    #[derive(Default)]
    struct FlagResource {
        lifecycle: RenderableLifecycle,
        shaders: bool,
        targets: bool,
        aux: bool,
    }

    impl GpuResources for FlagResource {
        type Context = Ctx;

        fn lifecycle(&self) -> &RenderableLifecycle {
            &self.lifecycle
        }
        fn lifecycle_mut(&mut self) -> &mut RenderableLifecycle {
            &mut self.lifecycle
        }
        fn init_shaders(&mut self, _ctx: &Ctx) -> Result<()> {
            self.shaders = true;
            Ok(())
        }
        fn delete_shaders(&mut self) {
            self.shaders = false;
        }
        fn shaders_initialized(&self) -> bool {
            self.shaders
        }
        fn init_targets(&mut self, _ctx: &Ctx, _w: u32, _h: u32) -> Result<()> {
            self.targets = true;
            Ok(())
        }
        fn delete_targets(&mut self) {
            self.targets = false;
        }
        fn targets_initialized(&self) -> bool {
            self.targets
        }
        fn init_aux(&mut self, _ctx: &Ctx) -> Result<()> {
            self.aux = true;
            Ok(())
        }
        fn delete_aux(&mut self) {
            self.aux = false;
        }
        fn aux_initialized(&self) -> bool {
            self.aux
        }
    }

    #[test]
    fn request_update_clears_only_one_flag() {
        let mut lifecycle = RenderableLifecycle::new();
        lifecycle.set_ready(Domains::all(), true);
        lifecycle.request_update(Domains::TARGETS);
        assert_eq!(lifecycle.ready(), Domains::SHADERS | Domains::AUX);
        lifecycle.request_update(Domains::TARGETS);
        assert_eq!(lifecycle.ready(), Domains::SHADERS | Domains::AUX);
    }

    #[test]
    fn initialize_records_size_and_context() {
        let mut resource = FlagResource::default();
        assert!(resource.initialize(&Ctx(7), 640, 480));
        assert_eq!(resource.lifecycle().size(), (640, 480));
        assert_eq!(resource.lifecycle().context(), Some(7));
        assert!(resource.lifecycle().is_fully_initialized());
    }

    #[test]
    fn foreign_context_is_refused() {
        let mut resource = FlagResource::default();
        assert!(resource.initialize(&Ctx(1), 8, 8));
        resource.request_update_shaders();
        assert!(!resource.initialize(&Ctx(2), 8, 8));

        resource.cleanup(&Ctx(2));
        assert!(resource.lifecycle().is_fully_initialized());

        resource.cleanup(&Ctx(1));
        assert!(!resource.lifecycle().is_fully_initialized());
        assert_eq!(resource.lifecycle().context(), None);

        // Released resources may be recreated anywhere.
        assert!(resource.initialize(&Ctx(2), 8, 8));
    }

    #[test]
    fn domain_disagreement_means_not_ready() {
        let mut resource = FlagResource::default();
        assert!(resource.initialize(&Ctx(1), 8, 8));
        resource.aux = false;
        assert!(!resource.is_ready());
    }
}
