//! Renderable Registry
//!
//! The host owns every drawable through a [`RenderRegistry`]; the compositor
//! only stores [`RenderableId`] keys. A removed entry leaves its key dangling,
//! and every lookup through a dangling key yields `None`.

use slotmap::{SlotMap, new_key_type};

use crate::renderer::core::GpuContext;
use crate::renderer::mesh::MeshRenderable;
use crate::renderer::renderable::Renderable;

new_key_type! {
    /// Handle to a renderable stored in a [`RenderRegistry`].
    pub struct RenderableId;
}

/// Owner of all renderables of one host.
pub struct RenderRegistry {
    items: SlotMap<RenderableId, Box<dyn Renderable>>,
}

impl Default for RenderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: SlotMap::with_key(),
        }
    }

    pub fn insert<R: Renderable + 'static>(&mut self, renderable: R) -> RenderableId {
        self.items.insert(Box::new(renderable))
    }

    /// Takes a renderable out of the registry.
    ///
    /// The caller is responsible for calling `cleanup` on it; dropping the
    /// box releases the wgpu handles either way.
    pub fn remove(&mut self, id: RenderableId) -> Option<Box<dyn Renderable>> {
        self.items.remove(id)
    }

    #[must_use]
    pub fn contains(&self, id: RenderableId) -> bool {
        self.items.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: RenderableId) -> Option<&dyn Renderable> {
        self.items.get(id).map(|r| &**r)
    }

    pub fn get_mut(&mut self, id: RenderableId) -> Option<&mut (dyn Renderable + 'static)> {
        self.items.get_mut(id).map(|r| &mut **r)
    }

    #[must_use]
    pub fn mesh(&self, id: RenderableId) -> Option<&MeshRenderable> {
        self.get(id).and_then(|r| r.as_mesh())
    }

    pub fn mesh_mut(&mut self, id: RenderableId) -> Option<&mut MeshRenderable> {
        self.get_mut(id).and_then(|r| r.as_mesh_mut())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RenderableId, &dyn Renderable)> {
        self.items.iter().map(|(id, r)| (id, &**r))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (RenderableId, &mut (dyn Renderable + 'static))> {
        self.items.iter_mut().map(|(id, r)| (id, &mut **r))
    }

    /// Releases the GPU resources of every entry (entries stay registered).
    pub fn cleanup_all(&mut self, gpu: &GpuContext) {
        for renderable in self.items.values_mut() {
            renderable.cleanup(gpu);
        }
    }
}
