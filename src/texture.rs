//! The per-frame texture contract and its import strategies.
//!
//! The engine calls [`ExternalTexture::populate_texture`] once per frame from
//! its render thread. A [`SurfaceTexture`] obtains the current platform
//! buffer from its callback, rebuilds its GPU image and memory only when the
//! buffer handle changed since the last successful import, and always hands
//! the buffer back to the compositor before returning — the GPU-side
//! resources, not the platform buffer, are what persist across frames.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::capability::CapabilityProbe;
use crate::error::{Result, TextureError};
use crate::format;
use crate::gpu::{GpuDevice, ImageSpec, ImageTiling};
use crate::image::ImageResources;
use crate::import;
use crate::surface::{MappedPlane, PlatformSurface, SurfaceCallback, SurfaceId, SurfaceInfo};

/// Handles and metadata the engine needs to sample the current frame.
/// Populated fresh on every successful `populate_texture` call.
#[derive(Debug, Clone, Copy)]
pub struct FrameDescriptor {
    pub image: vk::Image,
    /// First backing allocation; for disjoint images the remaining plane
    /// allocations stay owned by the texture.
    pub memory: vk::DeviceMemory,
    pub format: vk::Format,
    pub width: u32,
    pub height: u32,
    pub allocation_size: vk::DeviceSize,
    pub format_features: vk::FormatFeatureFlags,
}

/// The contract the rendering engine calls once per frame.
pub trait ExternalTexture {
    fn populate_texture(&mut self, width: u32, height: u32) -> Result<FrameDescriptor>;
}

/// Buffer-sharing strategy, fixed at texture construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStrategy {
    /// Zero-copy: import the buffer's dma-buf fds as device memory.
    DmaBuf,
    /// Compatibility fallback: copy the CPU-mapped pixel planes into an
    /// ordinary host-visible allocation each time the buffer changes.
    HostMapped,
}

impl ImportStrategy {
    /// Zero-copy when the device can import dma-bufs, else the mapped copy.
    pub fn detect(gpu: &dyn GpuDevice) -> Self {
        if gpu.supports_dma_buf_import() {
            ImportStrategy::DmaBuf
        } else {
            ImportStrategy::HostMapped
        }
    }
}

/// An external texture backed by compositor-owned platform buffers.
pub struct SurfaceTexture {
    gpu: Arc<dyn GpuDevice>,
    callback: SurfaceCallback,
    strategy: ImportStrategy,
    resources: ImageResources,
    /// Identity of the buffer last imported successfully. `Some` iff
    /// `resources` holds a live image for it.
    last_surface: Option<SurfaceId>,
    format: vk::Format,
    width: u32,
    height: u32,
}

impl SurfaceTexture {
    pub fn new(gpu: Arc<dyn GpuDevice>, callback: SurfaceCallback, strategy: ImportStrategy) -> Self {
        Self {
            resources: ImageResources::new(gpu.clone()),
            gpu,
            callback,
            strategy,
            last_surface: None,
            format: vk::Format::UNDEFINED,
            width: 0,
            height: 0,
        }
    }

    /// Constructs with the strategy detected from the device's dma-buf
    /// import support.
    pub fn with_detected_strategy(gpu: Arc<dyn GpuDevice>, callback: SurfaceCallback) -> Self {
        let strategy = ImportStrategy::detect(&*gpu);
        Self::new(gpu, callback, strategy)
    }

    pub fn strategy(&self) -> ImportStrategy {
        self.strategy
    }

    /// Releases the GPU image and memory and forgets the imported handle, so
    /// the next frame imports from scratch. Idempotent.
    pub fn release_image(&mut self) {
        self.resources.release();
        self.last_surface = None;
    }

    fn create_or_update(&mut self, surface: &dyn PlatformSurface) -> Result<()> {
        let id = surface.id();
        if self.last_surface == Some(id) {
            return Ok(());
        }
        self.release_image();

        let info = surface.query_info()?;
        let vk_format = format::vk_format_for(info.fourcc);
        if vk_format == vk::Format::UNDEFINED {
            return Err(TextureError::UnsupportedFormat(info.fourcc));
        }

        let imported = match self.strategy {
            ImportStrategy::DmaBuf => self.import_dma(surface, &info, vk_format),
            ImportStrategy::HostMapped => self.upload_mapped(surface, &info, vk_format),
        };
        if let Err(err) = imported {
            self.release_image();
            return Err(err);
        }

        self.last_surface = Some(id);
        self.format = vk_format;
        self.width = info.width;
        self.height = info.height;
        debug!(?id, format = ?vk_format, width = info.width, height = info.height,
            "imported platform buffer");
        Ok(())
    }

    /// Zero-copy import: modifier-tiled image over the buffer's plane
    /// layouts, memory imported from its dma-buf fds.
    fn import_dma(
        &mut self,
        surface: &dyn PlatformSurface,
        info: &SurfaceInfo,
        vk_format: vk::Format,
    ) -> Result<()> {
        let probe = CapabilityProbe::new(&*self.gpu);
        let modifier = probe.linear_modifier_properties(vk_format)?;

        let mut plane_layouts =
            vec![vk::SubresourceLayout::default(); modifier.drm_format_modifier_plane_count as usize];
        for (layout, plane) in plane_layouts.iter_mut().zip(&info.planes) {
            layout.offset = plane.offset as u64;
            layout.size = plane.size as u64;
            layout.row_pitch = plane.stride as u64;
        }

        let buffer_objects = surface.buffer_object_count();
        let disjoint = buffer_objects > 1 && probe.supports_disjoint(vk_format);

        let spec = ImageSpec {
            format: vk_format,
            width: info.width,
            height: info.height,
            usage: vk::ImageUsageFlags::SAMPLED,
            tiling: ImageTiling::LinearModifier(plane_layouts),
            disjoint,
            external_dma_buf: true,
        };
        let image = self.resources.create_image(&spec)?;

        if disjoint {
            let memories = import::import_per_plane(&*self.gpu, surface, image, buffer_objects)?;
            self.resources.adopt_memories(memories.clone());
            import::bind_per_plane(&*self.gpu, image, &memories)?;
        } else {
            let memory = import::import_unified(&*self.gpu, surface, image)?;
            self.resources.adopt_memories(vec![memory]);
            import::bind_unified(&*self.gpu, image, memory)?;
        }
        Ok(())
    }

    /// Fallback path: linear host-visible image, plane-by-plane copy from the
    /// CPU-mapped surface. Only the two-plane 4:2:0 format is supported,
    /// and only where the device samples it from linear tiling.
    fn upload_mapped(
        &mut self,
        surface: &dyn PlatformSurface,
        info: &SurfaceInfo,
        vk_format: vk::Format,
    ) -> Result<()> {
        if vk_format != vk::Format::G8_B8R8_2PLANE_420_UNORM {
            return Err(TextureError::HostSamplingUnsupported(vk_format));
        }
        let probe = CapabilityProbe::new(&*self.gpu);
        if !probe.supports_host_sampled_ycbcr(vk_format) {
            return Err(TextureError::HostSamplingUnsupported(vk_format));
        }

        let spec = ImageSpec {
            format: vk_format,
            width: info.width,
            height: info.height,
            usage: vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST,
            tiling: ImageTiling::Linear,
            disjoint: false,
            external_dma_buf: false,
        };
        let image = self.resources.create_image(&spec)?;

        let requirements = self.gpu.image_memory_requirements(image);
        let memory_type_index = probe.find_memory_type(
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        let memory = self
            .gpu
            .allocate_memory(requirements.size, memory_type_index, None)?;
        self.resources.adopt_memories(vec![memory]);

        self.copy_planes(surface, info, image, memory, requirements.size)?;
        import::bind_unified(&*self.gpu, image, memory)
    }

    fn copy_planes(
        &self,
        surface: &dyn PlatformSurface,
        info: &SurfaceInfo,
        image: vk::Image,
        memory: vk::DeviceMemory,
        size: vk::DeviceSize,
    ) -> Result<()> {
        let destination = self.gpu.map_memory(memory, size)?;
        let copied = self.copy_planes_into(surface, info, image, destination);
        let flushed = copied.and_then(|()| self.gpu.flush_memory(memory));
        self.gpu.unmap_memory(memory);
        flushed
    }

    fn copy_planes_into(
        &self,
        surface: &dyn PlatformSurface,
        info: &SurfaceInfo,
        image: vk::Image,
        destination: *mut u8,
    ) -> Result<()> {
        let map = surface.map_read()?;
        if map.planes.len() < 2 {
            return Err(TextureError::SurfaceQuery);
        }
        // NV12: full-height luma rows, then half-height interleaved chroma
        // rows; both are `width` bytes wide.
        let row_bytes = info.width as usize;
        let luma = self
            .gpu
            .subresource_layout(image, vk::ImageAspectFlags::PLANE_0);
        copy_plane_rows(&map.planes[0], destination, &luma, row_bytes, info.height as usize)?;
        let chroma = self
            .gpu
            .subresource_layout(image, vk::ImageAspectFlags::PLANE_1);
        copy_plane_rows(
            &map.planes[1],
            destination,
            &chroma,
            row_bytes,
            (info.height / 2) as usize,
        )
    }
}

impl ExternalTexture for SurfaceTexture {
    fn populate_texture(&mut self, width: u32, height: u32) -> Result<FrameDescriptor> {
        let descriptor = (self.callback)(width, height).ok_or(TextureError::NoSurface)?;
        let updated = self.create_or_update(descriptor.surface());
        // The buffer goes back to the compositor on every path, success or
        // failure; only the GPU-side resources outlive this call.
        drop(descriptor);
        updated?;

        let image = self
            .resources
            .image()
            .expect("import reported success without a live image");
        let memory = self
            .resources
            .primary_memory()
            .expect("import reported success without backing memory");
        Ok(FrameDescriptor {
            image,
            memory,
            format: self.format,
            width: self.width,
            height: self.height,
            allocation_size: self.resources.allocation_size(),
            format_features: self.gpu.linear_tiling_features(self.format),
        })
    }
}

fn copy_plane_rows(
    source: &MappedPlane<'_>,
    destination: *mut u8,
    layout: &vk::SubresourceLayout,
    row_bytes: usize,
    rows: usize,
) -> Result<()> {
    for row in 0..rows {
        let source_offset = row * source.stride as usize;
        // A mapping shorter than the queried extent claims is compositor
        // misbehavior; fail the frame rather than read past the slice.
        let source_row = source
            .data
            .get(source_offset..source_offset + row_bytes)
            .ok_or(TextureError::SurfaceQuery)?;
        let destination_offset = layout.offset as usize + row * layout.row_pitch as usize;
        // The mapping covers the image's full memory requirements, which
        // contain every subresource layout the driver reported.
        unsafe {
            std::ptr::copy_nonoverlapping(
                source_row.as_ptr(),
                destination.add(destination_offset),
                row_bytes,
            );
        }
    }
    Ok(())
}
