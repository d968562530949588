//! Fixed-function states shared by the renderables and the peel passes.

/// Depth-stencil format of the opaque color pass.
pub const OPAQUE_DEPTH_STENCIL_FORMAT: wgpu::TextureFormat =
    wgpu::TextureFormat::Depth24PlusStencil8;

/// Format of the depth-only reference target sampled by the peel shaders.
pub const OPAQUE_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// `MAX(src, dst)` on every channel.
///
/// WebGPU requires `One`/`One` factors for min/max operations.
pub const MAX_BLEND: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Max,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Max,
    },
};

/// Back-to-front "over" for the back-blend accumulator.
///
/// Color: `src.rgb * src.a + dst.rgb * (1 - src.a)`.
/// Alpha: `dst.a * (1 - src.a)`, i.e. the remaining transmittance.
pub const BACK_BLEND: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::Zero,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    },
};

/// Depth state for opaque drawing into either depth target.
#[must_use]
pub fn opaque_depth_state(format: wgpu::TextureFormat) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format,
        depth_write_enabled: Some(true),
        depth_compare: Some(wgpu::CompareFunction::Less),
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

/// Where an opaque-set renderable is being drawn this pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// Offscreen color + depth-stencil (the visible opaque image).
    Color,
    /// Depth-only reference target (no fragment stage).
    DepthOnly,
}

impl TargetKind {
    pub const ALL: [TargetKind; 2] = [TargetKind::Color, TargetKind::DepthOnly];

    #[must_use]
    pub fn depth_format(self) -> wgpu::TextureFormat {
        match self {
            Self::Color => OPAQUE_DEPTH_STENCIL_FORMAT,
            Self::DepthOnly => OPAQUE_DEPTH_FORMAT,
        }
    }
}
