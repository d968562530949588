//! Resource Lifecycle Tests
//!
//! Tests for:
//! - First initialization order and failure reporting
//! - Idempotent re-initialization
//! - Selective invalidation of one domain (set_size, request_update_*)
//! - Cleanup order and context ownership

use std::cell::RefCell;

use depth_peel::errors::{PeelError, Result};
use depth_peel::renderer::lifecycle::{Domains, GpuResources, RenderableLifecycle, ResourceContext};

struct Ctx(u64);

impl ResourceContext for Ctx {
    fn context_id(&self) -> u64 {
        self.0
    }
}

/// Records every hook call and can be told to fail one domain.
#[derive(Default)]
struct Recorder {
    lifecycle: RenderableLifecycle,
    calls: RefCell<Vec<&'static str>>,
    fail_shaders: bool,
    shaders: bool,
    targets: Option<(u32, u32)>,
    aux: bool,
}

impl Recorder {
    fn record(&self, call: &'static str) {
        self.calls.borrow_mut().push(call);
    }

    fn take_calls(&self) -> Vec<&'static str> {
        std::mem::take(&mut *self.calls.borrow_mut())
    }
}

impl GpuResources for Recorder {
    type Context = Ctx;

    fn lifecycle(&self) -> &RenderableLifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut RenderableLifecycle {
        &mut self.lifecycle
    }

    fn init_shaders(&mut self, _ctx: &Ctx) -> Result<()> {
        self.record("init_shaders");
        if self.fail_shaders {
            return Err(PeelError::ShaderNotFound("Shaders:broken".to_string()));
        }
        self.shaders = true;
        Ok(())
    }

    fn delete_shaders(&mut self) {
        self.record("delete_shaders");
        self.shaders = false;
    }

    fn shaders_initialized(&self) -> bool {
        self.shaders
    }

    fn init_targets(&mut self, _ctx: &Ctx, width: u32, height: u32) -> Result<()> {
        self.record("init_targets");
        self.targets = Some((width, height));
        Ok(())
    }

    fn update_targets(&mut self, _ctx: &Ctx, width: u32, height: u32) -> Result<()> {
        self.record("update_targets");
        self.targets = Some((width, height));
        Ok(())
    }

    fn delete_targets(&mut self) {
        self.record("delete_targets");
        self.targets = None;
    }

    fn targets_initialized(&self) -> bool {
        self.targets.is_some()
    }

    fn init_aux(&mut self, _ctx: &Ctx) -> Result<()> {
        self.record("init_aux");
        self.aux = true;
        Ok(())
    }

    fn update_aux(&mut self, _ctx: &Ctx) -> Result<()> {
        self.record("update_aux");
        self.aux = true;
        Ok(())
    }

    fn delete_aux(&mut self) {
        self.record("delete_aux");
        self.aux = false;
    }

    fn aux_initialized(&self) -> bool {
        self.aux
    }
}

fn initialized() -> Recorder {
    let mut recorder = Recorder::default();
    assert!(recorder.initialize(&Ctx(1), 800, 600));
    recorder.take_calls();
    recorder
}

// ============================================================================
// First initialization
// ============================================================================

#[test]
fn first_initialize_runs_domains_in_order() {
    let mut recorder = Recorder::default();
    assert!(!recorder.is_ready());

    assert!(recorder.initialize(&Ctx(1), 800, 600));
    assert_eq!(
        recorder.take_calls(),
        ["init_shaders", "init_targets", "init_aux"]
    );
    assert!(recorder.is_ready());
    assert!(recorder.lifecycle().is_fully_initialized());
    assert_eq!(recorder.targets, Some((800, 600)));
}

#[test]
fn failed_domain_leaves_object_not_ready() {
    let mut recorder = Recorder {
        fail_shaders: true,
        ..Default::default()
    };

    assert!(!recorder.initialize(&Ctx(1), 8, 8));
    assert!(!recorder.is_ready());
    assert!(!recorder.lifecycle().is_fully_initialized());
    assert_eq!(recorder.lifecycle().ready(), Domains::TARGETS | Domains::AUX);

    // The next attempt starts over from scratch.
    recorder.fail_shaders = false;
    recorder.take_calls();
    assert!(recorder.initialize(&Ctx(1), 8, 8));
    assert_eq!(
        recorder.take_calls(),
        ["init_shaders", "init_targets", "init_aux"]
    );
}

// ============================================================================
// Re-initialization
// ============================================================================

#[test]
fn initialize_is_idempotent() {
    let mut recorder = initialized();
    assert!(recorder.initialize(&Ctx(1), 800, 600));
    assert!(recorder.initialize(&Ctx(1), 800, 600));
    assert!(recorder.take_calls().is_empty());
}

#[test]
fn set_size_reruns_only_targets() {
    let mut recorder = initialized();
    assert!(recorder.set_size(&Ctx(1), 1024, 768));
    assert_eq!(recorder.take_calls(), ["update_targets"]);
    assert_eq!(recorder.targets, Some((1024, 768)));
    assert_eq!(recorder.lifecycle().size(), (1024, 768));
}

#[test]
fn stale_shaders_are_deleted_then_recreated() {
    let mut recorder = initialized();
    recorder.request_update_shaders();
    assert!(!recorder.is_ready());

    assert!(recorder.initialize(&Ctx(1), 800, 600));
    assert_eq!(recorder.take_calls(), ["delete_shaders", "init_shaders"]);
}

#[test]
fn stale_aux_uses_update_hook() {
    let mut recorder = initialized();
    recorder.request_update_aux();
    recorder.request_update_aux();

    assert!(recorder.initialize(&Ctx(1), 800, 600));
    assert_eq!(recorder.take_calls(), ["update_aux"]);
}

#[test]
fn failed_reinit_keeps_fully_initialized() {
    let mut recorder = initialized();
    recorder.fail_shaders = true;
    recorder.request_update_shaders();

    assert!(!recorder.initialize(&Ctx(1), 800, 600));
    assert!(recorder.lifecycle().is_fully_initialized());
    assert!(!recorder.lifecycle().is_domain_ready(Domains::SHADERS));
}

// ============================================================================
// Cleanup
// ============================================================================

#[test]
fn cleanup_releases_targets_aux_then_shaders() {
    let mut recorder = initialized();
    recorder.cleanup(&Ctx(1));

    assert_eq!(
        recorder.take_calls(),
        ["delete_targets", "delete_aux", "delete_shaders"]
    );
    assert!(!recorder.lifecycle().is_fully_initialized());
    assert_eq!(recorder.lifecycle().ready(), Domains::empty());
}

#[test]
fn cleanup_before_initialize_is_a_no_op() {
    let mut recorder = Recorder::default();
    recorder.cleanup(&Ctx(1));
    assert!(recorder.take_calls().is_empty());
}

#[test]
fn cleanup_with_foreign_context_is_skipped() {
    let mut recorder = initialized();
    recorder.cleanup(&Ctx(2));

    assert!(recorder.take_calls().is_empty());
    assert!(recorder.is_ready());
}

#[test]
fn reinitialize_with_foreign_context_is_refused() {
    let mut recorder = initialized();
    recorder.request_update_targets();
    assert!(!recorder.initialize(&Ctx(2), 800, 600));
    assert!(recorder.take_calls().is_empty());
}
