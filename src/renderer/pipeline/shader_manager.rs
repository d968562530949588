//! Shader Template Manager
//!
//! Resolves logical shader names, renders them through minijinja and caches
//! the resulting `wgpu::ShaderModule`s.
//!
//! ## Logical search path
//!
//! Renderables never name files. They ask for `"Shaders:<name>"`, and the
//! `Shaders` prefix is mapped once per process (see
//! [`init_shader_search_paths`]) to one of two roots:
//!
//! | Root        | When                                                     |
//! |-------------|----------------------------------------------------------|
//! | Directory   | `DEPTH_PEEL_SHADER_DIR` is set, or debug native builds whose source tree is present |
//! | Embedded    | Everything else (sources packaged with `rust-embed`)     |
//!
//! ## Templates
//!
//! Sources use `{$ ... $}` blocks; `{$ include "shading" $}` pulls
//! `chunks/shading.wgsl`. Every template receives the [`ShaderDefines`]
//! of the requesting renderable.

use minijinja::{Environment, Error, ErrorKind, syntax::SyntaxConfig};
use rust_embed::RustEmbed;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use xxhash_rust::xxh3::xxh3_128;

use crate::errors::{PeelError, Result};
use crate::renderer::pipeline::factory::with_validation_scope;
use crate::renderer::transparency::dual_depth_peeling::MAX_DEPTH;

/// Logical prefix of every shader name.
pub const SHADER_SEARCH_PREFIX: &str = "Shaders";

/// Environment variable that forces an on-disk shader root.
pub const SHADER_DIR_ENV: &str = "DEPTH_PEEL_SHADER_DIR";

#[derive(RustEmbed)]
#[folder = "src/renderer/pipeline/shaders"]
struct ShaderAssets;

/// Where the `Shaders:` prefix points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderRoot {
    Embedded,
    Directory(PathBuf),
}

static SHADER_ROOT: OnceLock<ShaderRoot> = OnceLock::new();

/// Registers the `Shaders:` search path. Runs once per process.
///
/// Called by every `GpuContext` constructor, so hosts only need it when they
/// want to resolve shader names before a context exists.
pub fn init_shader_search_paths() -> &'static ShaderRoot {
    SHADER_ROOT.get_or_init(|| {
        let root = pick_shader_root();
        match &root {
            ShaderRoot::Embedded => log::debug!("Add shaders search path <embedded>"),
            ShaderRoot::Directory(dir) => {
                log::debug!("Add shaders search path {}", dir.display());
            }
        }
        root
    })
}

fn pick_shader_root() -> ShaderRoot {
    if let Some(dir) = std::env::var_os(SHADER_DIR_ENV) {
        return ShaderRoot::Directory(PathBuf::from(dir));
    }

    #[cfg(all(debug_assertions, not(target_arch = "wasm32")))]
    {
        let source_dir =
            Path::new(env!("CARGO_MANIFEST_DIR")).join("src/renderer/pipeline/shaders");
        if source_dir.is_dir() {
            return ShaderRoot::Directory(source_dir);
        }
    }

    ShaderRoot::Embedded
}

/// Maps `"Shaders:peel/peel"` to the template name `"peel/peel.wgsl"`.
pub fn resolve_logical_name(name: &str) -> Result<String> {
    let Some((prefix, path)) = name.split_once(':') else {
        return Err(PeelError::ShaderNotFound(name.to_string()));
    };
    if prefix != SHADER_SEARCH_PREFIX || path.is_empty() {
        return Err(PeelError::ShaderNotFound(name.to_string()));
    }
    Ok(with_wgsl_extension(path).into_owned())
}

fn with_wgsl_extension(name: &str) -> Cow<'_, str> {
    if Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wgsl"))
    {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("{name}.wgsl"))
    }
}

fn shader_loader(name: &str) -> std::result::Result<Option<String>, Error> {
    let filename = with_wgsl_extension(name);

    if let ShaderRoot::Directory(dir) = init_shader_search_paths() {
        let path = dir.join(filename.as_ref());
        if path.exists() {
            return std::fs::read_to_string(&path).map(Some).map_err(|e| {
                Error::new(
                    ErrorKind::TemplateNotFound,
                    format!("Failed to read file {}: {e}", path.display()),
                )
            });
        }
    }

    if let Some(file) = ShaderAssets::get(&filename)
        && let Ok(source) = std::str::from_utf8(file.data.as_ref())
    {
        return Ok(Some(source.to_string()));
    }

    Ok(None)
}

fn build_environment() -> Environment<'static> {
    let mut env = Environment::new();

    match SyntaxConfig::builder()
        .block_delimiters("{$", "$}")
        .variable_delimiters("{{", "}}")
        .line_statement_prefix("$$")
        .build()
    {
        Ok(syntax) => env.set_syntax(syntax),
        Err(e) => log::error!("Failed to configure shader template syntax: {e}"),
    }

    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
    env.set_loader(shader_loader);
    env.set_path_join_callback(|name, _parent| format!("chunks/{name}").into());

    env
}

// ─── ShaderDefines ───────────────────────────────────────────────────────────

/// Compile-time values substituted into every template.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShaderDefines {
    /// Round fragment depth to f16 before peel comparisons.
    pub half_precision: bool,
    /// Sentinel for "no geometry" in the `(-min, max)` depth targets.
    pub max_depth: f32,
}

impl Default for ShaderDefines {
    fn default() -> Self {
        Self {
            half_precision: false,
            max_depth: MAX_DEPTH as f32,
        }
    }
}

// ─── ShaderManager ───────────────────────────────────────────────────────────

/// Template environment plus a module cache keyed by the xxh3-128 hash of
/// the final WGSL source.
pub struct ShaderManager {
    env: Environment<'static>,
    module_cache: FxHashMap<u128, wgpu::ShaderModule>,
}

impl Default for ShaderManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            env: build_environment(),
            module_cache: FxHashMap::default(),
        }
    }

    /// Renders the template behind a logical name to WGSL.
    pub fn render_source(&self, name: &str, defines: &ShaderDefines) -> Result<String> {
        let template_name = resolve_logical_name(name)?;
        let template = self.env.get_template(&template_name).map_err(|e| {
            if e.kind() == ErrorKind::TemplateNotFound {
                PeelError::ShaderNotFound(name.to_string())
            } else {
                PeelError::ShaderTemplate(e)
            }
        })?;
        Ok(template.render(defines)?)
    }

    /// Compiles a logical shader (or returns the cached module).
    pub fn load(
        &mut self,
        device: &wgpu::Device,
        name: &str,
        defines: &ShaderDefines,
    ) -> Result<wgpu::ShaderModule> {
        let source = self.render_source(name, defines)?;
        log::trace!("Generated shader {name}:\n{source}");

        let hash = xxh3_128(source.as_bytes());
        if let Some(module) = self.module_cache.get(&hash) {
            return Ok(module.clone());
        }

        log::debug!("Compiling shader module {name}");
        let module = with_validation_scope(device, name, || {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(name),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        })?;
        self.module_cache.insert(hash, module.clone());
        Ok(module)
    }

    /// Drops every cached template and module.
    ///
    /// The next [`load`](Self::load) re-reads sources from the search root.
    pub fn reload(&mut self) {
        self.env.clear_templates();
        self.module_cache.clear();
        log::info!("Shader cache cleared");
    }

    /// Returns the number of cached shader modules.
    #[must_use]
    pub fn module_count(&self) -> usize {
        self.module_cache.len()
    }
}
