use crate::errors::{PeelError, Result};
use crate::renderer::core::tracked::Tracked;

/// A 2D texture sized to the surface, with its default view.
pub struct RenderTarget {
    texture: wgpu::Texture,
    view: Tracked<wgpu::TextureView>,
}

impl RenderTarget {
    /// Allocates a single-sample, single-mip 2D target.
    pub fn new(
        device: &wgpu::Device,
        label: &'static str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(PeelError::ZeroSizedTarget {
                label,
                width,
                height,
            });
        }

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            texture,
            view: Tracked::new(view),
        })
    }

    /// A color target that later passes sample with `textureLoad`.
    pub fn sampled_color(
        device: &wgpu::Device,
        label: &'static str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Result<Self> {
        Self::new(
            device,
            label,
            width,
            height,
            format,
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        )
    }

    #[inline]
    #[must_use]
    pub fn view(&self) -> &Tracked<wgpu::TextureView> {
        &self.view
    }

    #[inline]
    #[must_use]
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.texture.width(), self.texture.height())
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> wgpu::TextureFormat {
        self.texture.format()
    }
}
