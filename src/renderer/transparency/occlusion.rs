//! Occlusion query with synchronous readback.
//!
//! ```text
//! begin_occlusion_query(0) ... end ──▶ resolve_query_set ──▶ copy ──▶ readback
//!                                        (QUERY_RESOLVE)            (MAP_READ)
//! submit ──▶ map_async ──▶ device.poll(Wait) ──▶ u64 sample count
//! ```
//!
//! The readback stalls the CPU until the GPU drains the submitted work.

use std::sync::mpsc;

use crate::errors::{PeelError, Result};

/// Bytes of one resolved occlusion query result.
const QUERY_BYTES: wgpu::BufferAddress = std::mem::size_of::<u64>() as wgpu::BufferAddress;

/// A single-slot occlusion query plus its resolve and readback buffers.
pub struct OcclusionQuery {
    query_set: wgpu::QuerySet,
    resolve: wgpu::Buffer,
    readback: wgpu::Buffer,
}

impl OcclusionQuery {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let query_set = device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("Peel Occlusion Query"),
            ty: wgpu::QueryType::Occlusion,
            count: 1,
        });
        let resolve = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Peel Query Resolve"),
            size: QUERY_BYTES,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Peel Query Readback"),
            size: QUERY_BYTES,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            query_set,
            resolve,
            readback,
        }
    }

    /// Set to attach to the render pass being measured (query index 0).
    #[must_use]
    pub fn query_set(&self) -> &wgpu::QuerySet {
        &self.query_set
    }

    /// Records the resolve and the copy into the mappable buffer.
    pub fn resolve(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.resolve_query_set(&self.query_set, 0..1, &self.resolve, 0);
        encoder.copy_buffer_to_buffer(&self.resolve, 0, &self.readback, 0, QUERY_BYTES);
    }

    /// Blocks until the resolved result is readable and returns the number
    /// of samples that passed.
    ///
    /// The encoder holding [`resolve`](Self::resolve) must already be
    /// submitted.
    pub fn read_samples(&self, device: &wgpu::Device) -> Result<u64> {
        let slice = self.readback.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        if let Err(e) = device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        }) {
            self.abandon_pending_map();
            return Err(PeelError::QueryReadback(e.to_string()));
        }

        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(PeelError::QueryReadback(e.to_string())),
            Err(_) => {
                return Err(PeelError::QueryReadback(
                    "map callback was dropped".to_string(),
                ));
            }
        }

        let samples = {
            let data = slice.get_mapped_range();
            bytemuck::pod_read_unaligned::<u64>(&data[..QUERY_BYTES as usize])
        };
        self.readback.unmap();

        Ok(samples)
    }

    /// Cancels an unfinished `map_async` so the next frame can map again.
    fn abandon_pending_map(&self) {
        self.readback.unmap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::core::GpuContext;
    use crate::renderer::settings::RendererSettings;

    /// Runs an empty occlusion query over a tiny target and resolves it.
    fn submit_empty_query(gpu: &GpuContext, query: &OcclusionQuery) {
        let target = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Query Target"),
            size: wgpu::Extent3d {
                width: 4,
                height: 4,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = target.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Query Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: Some(query.query_set()),
                multiview_mask: None,
            });
            pass.begin_occlusion_query(0);
            pass.end_occlusion_query();
        }
        query.resolve(&mut encoder);
        gpu.queue.submit([encoder.finish()]);
    }

    #[test]
    fn empty_query_reads_zero_samples() {
        let Ok(gpu) = GpuContext::new_headless_blocking(&RendererSettings::default()) else {
            log::warn!("Skipping GPU test: no adapter");
            return;
        };
        let query = OcclusionQuery::new(&gpu.device);

        for _ in 0..2 {
            submit_empty_query(&gpu, &query);
            assert_eq!(query.read_samples(&gpu.device).unwrap(), 0);
        }
    }

    #[test]
    fn abandoned_map_does_not_block_next_readback() {
        let Ok(gpu) = GpuContext::new_headless_blocking(&RendererSettings::default()) else {
            log::warn!("Skipping GPU test: no adapter");
            return;
        };
        let query = OcclusionQuery::new(&gpu.device);

        query.readback.slice(..).map_async(wgpu::MapMode::Read, |_| {});
        query.abandon_pending_map();

        submit_empty_query(&gpu, &query);
        assert_eq!(query.read_samples(&gpu.device).unwrap(), 0);
    }
}
