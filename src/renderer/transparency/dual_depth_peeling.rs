//! Dual Depth Peeling
//!
//! Peels the nearest and the farthest unpeeled transparent layer of every
//! pixel in the same pass, so `N` layers need about `N / 2` passes.
//!
//! # Targets
//!
//! | Target          | Count | Format (full / half)      | Contents                          |
//! |-----------------|-------|---------------------------|-----------------------------------|
//! | `depth`         | 2     | `Rg32Float` / `Rg16Float` | `(-nearest, farthest)` unpeeled   |
//! | `front`         | 2     | `Rgba32Float` / `Rgba16Float` | front-to-back accumulation    |
//! | `back`          | 2     | same                      | farthest layer peeled this pass   |
//! | `back_blend`    | 1     | same                      | back-to-front accumulation        |
//!
//! Every pair ping-pongs on `curr = pass % 2`; pass `p` reads `[1 - curr]`
//! and writes `[curr]`.
//!
//! # Frame
//!
//! ```text
//! clear front[0], back[0] = 0, back_blend = (0,0,0,1)
//! init:  depth[0] = MAX over meshes of (-z, z)            (behind-opaque discarded)
//! loop:  peel  depth[prev], front[prev] ─▶ depth/front/back[curr]   (MAX blend)
//!        blend back[curr] ─▶ back_blend                              (occlusion query)
//! final: output = front + (1 - front.a) · (back_blend + back_blend.a · opaque)
//! ```

use crate::errors::{PeelError, Result};
use crate::renderer::core::{GpuContext, RenderTarget};
use crate::renderer::mesh::{create_mesh_layouts, vertex_buffer_layouts};
use crate::renderer::pipeline::factory::{
    PipelineDesc, color_targets, create_pipeline_layout, create_render_pipeline,
    float_texture_entry,
};
use crate::renderer::pipeline::states::{BACK_BLEND, MAX_BLEND};
use crate::renderer::settings::PeelSettings;
use crate::renderer::transparency::occlusion::OcclusionQuery;
use crate::renderer::transparency::{FullscreenQuad, TransparencyAlgorithm, TransparentFrame};

/// Sentinel depth of the `(-nearest, farthest)` targets.
pub const MAX_DEPTH: f64 = 1.0;

/// Upper bound on query-driven passes. Guards against a query that never
/// reaches zero (e.g. coplanar layers that quantize to the same depth).
pub const MAX_QUERY_PASSES: u32 = 64;

const TRANSPARENT_BLACK: wgpu::Color = wgpu::Color::TRANSPARENT;

/// Cleared depth pair: nothing unpeeled.
const EMPTY_DEPTH: wgpu::Color = wgpu::Color {
    r: -MAX_DEPTH,
    g: -MAX_DEPTH,
    b: 0.0,
    a: 0.0,
};

/// Back-blend starts fully transmissive.
const EMPTY_BACK_BLEND: wgpu::Color = wgpu::Color {
    r: 0.0,
    g: 0.0,
    b: 0.0,
    a: 1.0,
};

// ============================================================================
// PeelLoop
// ============================================================================

/// Loop control of one frame, independent of the GPU.
///
/// ```rust,ignore
/// let mut peel = PeelLoop::new(&settings);
/// while peel.should_continue() {
///     let (curr, prev) = (peel.current(), peel.previous());
///     // peel + blend ...
///     peel.finish_pass(samples);
/// }
/// let front = peel.last_written();
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeelLoop {
    use_occlusion_query: bool,
    number_of_passes: u32,
    pass: u32,
    samples: u64,
    last_written: usize,
}

impl PeelLoop {
    #[must_use]
    pub fn new(settings: &PeelSettings) -> Self {
        Self {
            use_occlusion_query: settings.use_occlusion_query,
            number_of_passes: settings.number_of_passes,
            pass: 1,
            samples: 1,
            last_written: 0,
        }
    }

    /// `true` while another peel pass must run.
    #[must_use]
    pub fn should_continue(&self) -> bool {
        if self.use_occlusion_query {
            self.samples > 0 && self.pass <= MAX_QUERY_PASSES
        } else {
            self.pass < self.number_of_passes
        }
    }

    /// Ping-pong index written by the running pass.
    #[inline]
    #[must_use]
    pub fn current(&self) -> usize {
        (self.pass % 2) as usize
    }

    /// Ping-pong index read by the running pass.
    #[inline]
    #[must_use]
    pub fn previous(&self) -> usize {
        1 - self.current()
    }

    /// Ends the running pass. `samples` is the query result, `None` when
    /// queries are off.
    pub fn finish_pass(&mut self, samples: Option<u64>) {
        self.last_written = self.current();
        if let Some(samples) = samples {
            self.samples = samples;
        }
        self.pass += 1;
    }

    #[must_use]
    pub fn passes_run(&self) -> u32 {
        self.pass - 1
    }

    /// Index holding the final front accumulation (0 if no pass ran).
    #[must_use]
    pub fn last_written(&self) -> usize {
        self.last_written
    }
}

// ============================================================================
// GPU state
// ============================================================================

struct PeelPipelines {
    opaque_depth_layout: wgpu::BindGroupLayout,
    peel_inputs_layout: wgpu::BindGroupLayout,
    blend_layout: wgpu::BindGroupLayout,
    final_layout: wgpu::BindGroupLayout,
    init: wgpu::RenderPipeline,
    peel: wgpu::RenderPipeline,
    blend: wgpu::RenderPipeline,
    composite: wgpu::RenderPipeline,
}

struct PeelTargets {
    depth: [RenderTarget; 2],
    front: [RenderTarget; 2],
    back: [RenderTarget; 2],
    back_blend: RenderTarget,
}

/// Bind groups over the current targets, rebuilt when the opaque views the
/// compositor hands in are reallocated.
struct PeelBindGroups {
    opaque_color: u64,
    opaque_depth: u64,
    init: wgpu::BindGroup,
    /// Indexed by the pass's `previous()`.
    peel: [wgpu::BindGroup; 2],
    /// Indexed by the pass's `current()`.
    blend: [wgpu::BindGroup; 2],
    /// Indexed by the front buffer holding the result.
    composite: [wgpu::BindGroup; 2],
}

/// Dual depth peeling with occlusion-query driven termination.
pub struct DualDepthPeeling {
    settings: PeelSettings,
    last_pass_count: u32,

    pipelines: Option<PeelPipelines>,
    targets: Option<PeelTargets>,
    bind_groups: Option<PeelBindGroups>,
    query: Option<OcclusionQuery>,
}

impl Default for DualDepthPeeling {
    fn default() -> Self {
        Self::new(PeelSettings::default())
    }
}

impl DualDepthPeeling {
    #[must_use]
    pub fn new(settings: PeelSettings) -> Self {
        Self {
            settings,
            last_pass_count: 0,
            pipelines: None,
            targets: None,
            bind_groups: None,
            query: None,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &PeelSettings {
        &self.settings
    }

    /// Stop at the first pass that peels nothing instead of running a fixed
    /// number of passes.
    pub fn set_occlusion_query_enabled(&mut self, enabled: bool) {
        self.settings.use_occlusion_query = enabled;
    }

    /// Pass budget used when occlusion queries are off; runs
    /// `number_of_passes - 1` peel passes.
    pub fn set_number_of_passes(&mut self, number_of_passes: u32) {
        self.settings.number_of_passes = number_of_passes;
    }

    /// Peel passes run by the last frame.
    #[must_use]
    pub fn last_pass_count(&self) -> u32 {
        self.last_pass_count
    }

    fn ensure_bind_groups(
        &mut self,
        gpu: &GpuContext,
        frame: &TransparentFrame<'_>,
    ) -> Result<()> {
        let color_id = frame.opaque.color.id();
        let depth_id = frame.opaque.depth.id();
        if self
            .bind_groups
            .as_ref()
            .is_some_and(|g| g.opaque_color == color_id && g.opaque_depth == depth_id)
        {
            return Ok(());
        }

        let (Some(pipelines), Some(targets)) = (&self.pipelines, &self.targets) else {
            return Err(PeelError::NotInitialized(self.name().to_string()));
        };
        let device = &gpu.device;
        let opaque_color: &wgpu::TextureView = frame.opaque.color;
        let opaque_depth: &wgpu::TextureView = frame.opaque.depth;

        let init = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Peel Init BindGroup"),
            layout: &pipelines.opaque_depth_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(opaque_depth),
            }],
        });

        let peel = [0usize, 1].map(|prev| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Peel Inputs BindGroup"),
                layout: &pipelines.peel_inputs_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(targets.depth[prev].view()),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(targets.front[prev].view()),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(opaque_depth),
                    },
                ],
            })
        });

        let blend = [0usize, 1].map(|curr| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Peel Blend BindGroup"),
                layout: &pipelines.blend_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(targets.back[curr].view()),
                }],
            })
        });

        let composite = [0usize, 1].map(|curr| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Peel Final BindGroup"),
                layout: &pipelines.final_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(opaque_color),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(targets.front[curr].view()),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(targets.back_blend.view()),
                    },
                ],
            })
        });

        log::debug!("{}: rebuilt bind groups", self.name());
        self.bind_groups = Some(PeelBindGroups {
            opaque_color: color_id,
            opaque_depth: depth_id,
            init,
            peel,
            blend,
            composite,
        });
        Ok(())
    }
}

fn clear_attachment(
    view: &wgpu::TextureView,
    color: wgpu::Color,
) -> Option<wgpu::RenderPassColorAttachment<'_>> {
    Some(wgpu::RenderPassColorAttachment {
        view,
        resolve_target: None,
        ops: wgpu::Operations {
            load: wgpu::LoadOp::Clear(color),
            store: wgpu::StoreOp::Store,
        },
        depth_slice: None,
    })
}

fn load_attachment(view: &wgpu::TextureView) -> Option<wgpu::RenderPassColorAttachment<'_>> {
    Some(wgpu::RenderPassColorAttachment {
        view,
        resolve_target: None,
        ops: wgpu::Operations {
            load: wgpu::LoadOp::Load,
            store: wgpu::StoreOp::Store,
        },
        depth_slice: None,
    })
}

fn color_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    label: &str,
    attachments: &[Option<wgpu::RenderPassColorAttachment<'_>>],
    occlusion_query_set: Option<&wgpu::QuerySet>,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: attachments,
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set,
        multiview_mask: None,
    })
}

impl TransparencyAlgorithm for DualDepthPeeling {
    fn name(&self) -> &str {
        "Dual Depth Peeling"
    }

    // --- Shaders ---

    fn init_shaders(&mut self, gpu: &GpuContext) -> Result<()> {
        let device = &gpu.device;
        let depth_format = gpu.depth_pair_format();
        let color_format = gpu.color_format();

        let (transform_layout, shaded_layout) = create_mesh_layouts(device);
        let opaque_depth_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Peel Opaque Depth Layout"),
            entries: &[float_texture_entry(0)],
        });
        let peel_inputs_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Peel Inputs Layout"),
            entries: &[
                float_texture_entry(0),
                float_texture_entry(1),
                float_texture_entry(2),
            ],
        });
        let blend_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Peel Blend Layout"),
            entries: &[float_texture_entry(0)],
        });
        let final_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Peel Final Layout"),
            entries: &[
                float_texture_entry(0),
                float_texture_entry(1),
                float_texture_entry(2),
            ],
        });

        let mesh_buffers = vertex_buffer_layouts();
        let quad_buffers = [FullscreenQuad::vertex_layout()];

        let module = gpu.load_shader("Shaders:peel/init")?;
        let layout = create_pipeline_layout(
            device,
            "Peel Init Pipeline Layout",
            &[&transform_layout, &opaque_depth_layout],
        );
        let targets = color_targets(&[depth_format], Some(MAX_BLEND));
        let init = create_render_pipeline(
            device,
            &PipelineDesc {
                vertex_buffers: &mesh_buffers,
                targets: &targets,
                ..PipelineDesc::new("Peel Init Pipeline", &module, &layout)
            },
        )?;

        let module = gpu.load_shader("Shaders:peel/peel")?;
        let layout = create_pipeline_layout(
            device,
            "Peel Pipeline Layout",
            &[&shaded_layout, &peel_inputs_layout],
        );
        let targets = color_targets(&[depth_format, color_format, color_format], Some(MAX_BLEND));
        let peel = create_render_pipeline(
            device,
            &PipelineDesc {
                vertex_buffers: &mesh_buffers,
                targets: &targets,
                ..PipelineDesc::new("Peel Pipeline", &module, &layout)
            },
        )?;

        let module = gpu.load_shader("Shaders:peel/blend")?;
        let layout = create_pipeline_layout(device, "Peel Blend Pipeline Layout", &[&blend_layout]);
        let targets = color_targets(&[color_format], Some(BACK_BLEND));
        let blend = create_render_pipeline(
            device,
            &PipelineDesc {
                vertex_buffers: &quad_buffers,
                targets: &targets,
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..PipelineDesc::new("Peel Blend Pipeline", &module, &layout)
            },
        )?;

        let module = gpu.load_shader("Shaders:peel/final")?;
        let layout = create_pipeline_layout(device, "Peel Final Pipeline Layout", &[&final_layout]);
        let targets = color_targets(&[gpu.output_format], None);
        let composite = create_render_pipeline(
            device,
            &PipelineDesc {
                vertex_buffers: &quad_buffers,
                targets: &targets,
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..PipelineDesc::new("Peel Final Pipeline", &module, &layout)
            },
        )?;

        self.pipelines = Some(PeelPipelines {
            opaque_depth_layout,
            peel_inputs_layout,
            blend_layout,
            final_layout,
            init,
            peel,
            blend,
            composite,
        });
        self.bind_groups = None;
        Ok(())
    }

    fn delete_shaders(&mut self) {
        self.pipelines = None;
        self.bind_groups = None;
    }

    fn shaders_initialized(&self) -> bool {
        self.pipelines.is_some()
    }

    // --- Render targets ---

    fn init_targets(&mut self, gpu: &GpuContext, width: u32, height: u32) -> Result<()> {
        let device = &gpu.device;
        let depth_format = gpu.depth_pair_format();
        let color_format = gpu.color_format();
        let target = |label, format| RenderTarget::sampled_color(device, label, width, height, format);

        self.targets = Some(PeelTargets {
            depth: [
                target("Peel Depth 0", depth_format)?,
                target("Peel Depth 1", depth_format)?,
            ],
            front: [
                target("Peel Front 0", color_format)?,
                target("Peel Front 1", color_format)?,
            ],
            back: [
                target("Peel Back 0", color_format)?,
                target("Peel Back 1", color_format)?,
            ],
            back_blend: target("Peel Back Blend", color_format)?,
        });
        self.bind_groups = None;
        log::debug!("{}: allocated targets {width}x{height}", self.name());
        Ok(())
    }

    fn delete_targets(&mut self) {
        self.targets = None;
        self.bind_groups = None;
    }

    fn targets_initialized(&self) -> bool {
        self.targets.is_some()
    }

    // --- Auxiliary objects ---

    fn init_aux(&mut self, gpu: &GpuContext) -> Result<()> {
        self.query = Some(OcclusionQuery::new(&gpu.device));
        Ok(())
    }

    fn delete_aux(&mut self) {
        self.query = None;
    }

    fn aux_initialized(&self) -> bool {
        self.query.is_some()
    }

    // --- Frame ---

    fn render_transparent_objects(&mut self, frame: &mut TransparentFrame<'_>) -> Result<()> {
        let gpu = frame.gpu;
        self.ensure_bind_groups(gpu, frame)?;

        let (Some(pipelines), Some(targets), Some(groups), Some(query)) =
            (&self.pipelines, &self.targets, &self.bind_groups, &self.query)
        else {
            return Err(PeelError::NotInitialized(self.name().to_string()));
        };

        // Clear the accumulators the first pass reads.
        {
            let _pass = color_pass(
                frame.encoder,
                "Peel Clear Pass",
                &[
                    clear_attachment(targets.front[0].view(), TRANSPARENT_BLACK),
                    clear_attachment(targets.back[0].view(), TRANSPARENT_BLACK),
                    clear_attachment(targets.back_blend.view(), EMPTY_BACK_BLEND),
                ],
                None,
            );
        }

        // Nearest and farthest layer over all meshes.
        {
            let mut pass = color_pass(
                frame.encoder,
                "Peel Init Pass",
                &[clear_attachment(targets.depth[0].view(), EMPTY_DEPTH)],
                None,
            );
            for mesh in frame.meshes {
                mesh.render_mesh(
                    &mut pass,
                    &pipelines.init,
                    false,
                    |pass| pass.set_bind_group(1, &groups.init, &[]),
                    |_| {},
                );
            }
        }

        let mut peel = PeelLoop::new(&self.settings);
        while peel.should_continue() {
            let (curr, prev) = (peel.current(), peel.previous());

            {
                let mut pass = color_pass(
                    frame.encoder,
                    "Peel Pass",
                    &[
                        clear_attachment(targets.depth[curr].view(), EMPTY_DEPTH),
                        clear_attachment(targets.front[curr].view(), TRANSPARENT_BLACK),
                        clear_attachment(targets.back[curr].view(), TRANSPARENT_BLACK),
                    ],
                    None,
                );
                let inputs = &groups.peel[prev];
                for mesh in frame.meshes {
                    mesh.render_mesh(
                        &mut pass,
                        &pipelines.peel,
                        true,
                        |pass| pass.set_bind_group(1, inputs, &[]),
                        |_| {},
                    );
                }
            }

            let query_set = self.settings.use_occlusion_query.then(|| query.query_set());
            {
                let mut pass = color_pass(
                    frame.encoder,
                    "Peel Blend Pass",
                    &[load_attachment(targets.back_blend.view())],
                    query_set,
                );
                if query_set.is_some() {
                    pass.begin_occlusion_query(0);
                }
                pass.set_pipeline(&pipelines.blend);
                pass.set_bind_group(0, &groups.blend[curr], &[]);
                frame.quad.draw(&mut pass);
                if query_set.is_some() {
                    pass.end_occlusion_query();
                }
            }

            let samples = if query_set.is_some() {
                query.resolve(frame.encoder);
                frame.flush();
                let samples = query.read_samples(&gpu.device).unwrap_or_else(|e| {
                    log::error!("{}: {e}", self.name());
                    0
                });
                log::trace!(
                    "{}: pass {} wrote {samples} samples",
                    self.name(),
                    peel.passes_run() + 1
                );
                Some(samples)
            } else {
                None
            };
            peel.finish_pass(samples);
        }

        let background = frame.background;
        {
            let mut pass = color_pass(
                frame.encoder,
                "Peel Final Pass",
                &[clear_attachment(
                    frame.output,
                    wgpu::Color {
                        r: f64::from(background.x),
                        g: f64::from(background.y),
                        b: f64::from(background.z),
                        a: 1.0,
                    },
                )],
                None,
            );
            pass.set_pipeline(&pipelines.composite);
            pass.set_bind_group(0, &groups.composite[peel.last_written()], &[]);
            frame.quad.draw(&mut pass);
        }

        self.last_pass_count = peel.passes_run();
        Ok(())
    }
}
