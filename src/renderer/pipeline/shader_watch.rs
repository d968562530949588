//! Shader Hot Reload
//!
//! [`ShaderWatcher`] snapshots the modification times of every `.wgsl` file
//! under an on-disk shader root and reports which ones changed since the
//! last poll. The host reacts by calling
//! [`TransparencyCompositor::reload_shaders`], which clears the shader cache
//! and marks the shader domain of every renderable stale; the next frame
//! rebuilds the pipelines.
//!
//! Only useful when the `Shaders:` prefix resolves to a directory (debug
//! native builds, or `DEPTH_PEEL_SHADER_DIR`).
//!
//! [`TransparencyCompositor::reload_shaders`]: crate::renderer::transparency::TransparencyCompositor::reload_shaders

use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::errors::Result;
use crate::renderer::pipeline::shader_manager::{ShaderRoot, init_shader_search_paths};

/// Polling watcher over a shader directory.
pub struct ShaderWatcher {
    root: PathBuf,
    stamps: FxHashMap<PathBuf, SystemTime>,
}

impl ShaderWatcher {
    /// Watches the registered shader root, if it is a directory.
    #[must_use]
    pub fn for_search_path() -> Option<Self> {
        match init_shader_search_paths() {
            ShaderRoot::Directory(dir) => match Self::new(dir) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    log::warn!("Shader hot reload disabled: {e}");
                    None
                }
            },
            ShaderRoot::Embedded => None,
        }
    }

    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let stamps = scan(&root)?;
        log::debug!(
            "Watching {} shader files under {}",
            stamps.len(),
            root.display()
        );
        Ok(Self { root, stamps })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the files added, modified or removed since the last poll.
    pub fn poll(&mut self) -> Result<Vec<PathBuf>> {
        let current = scan(&self.root)?;

        let mut changed: Vec<PathBuf> = current
            .iter()
            .filter(|(path, stamp)| self.stamps.get(*path) != Some(*stamp))
            .map(|(path, _)| path.clone())
            .collect();
        changed.extend(
            self.stamps
                .keys()
                .filter(|path| !current.contains_key(*path))
                .cloned(),
        );
        changed.sort();

        if !changed.is_empty() {
            log::info!("{} shader file(s) changed", changed.len());
        }

        self.stamps = current;
        Ok(changed)
    }
}

fn scan(root: &Path) -> Result<FxHashMap<PathBuf, SystemTime>> {
    let mut stamps = FxHashMap::default();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("wgsl"))
            {
                let modified = std::fs::metadata(&path)?.modified()?;
                stamps.insert(path, modified);
            }
        }
    }

    Ok(stamps)
}
