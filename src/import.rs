//! Importing platform buffer memory into Vulkan allocations.
//!
//! Two strategies: one fd backing the whole buffer becomes one allocation
//! bound at offset 0; a disjoint buffer's N fds become N allocations, each
//! bound to its own image-plane aspect at offset 0 within its allocation.
//! Duplicated fds are consumed by the driver on success and closed on
//! failure; the compositor's own descriptors are never touched.

use std::os::fd::AsFd;

use ash::vk;
use tracing::debug;

use crate::capability::CapabilityProbe;
use crate::error::{Result, TextureError};
use crate::gpu::{GpuDevice, PlaneBinding};
use crate::surface::PlatformSurface;

const PLANE_ASPECTS: [vk::ImageAspectFlags; 3] = [
    vk::ImageAspectFlags::PLANE_0,
    vk::ImageAspectFlags::PLANE_1,
    vk::ImageAspectFlags::PLANE_2,
];

/// Imports the buffer's single backing object as one allocation sized to the
/// whole image's requirements.
pub fn import_unified(
    gpu: &dyn GpuDevice,
    surface: &dyn PlatformSurface,
    image: vk::Image,
) -> Result<vk::DeviceMemory> {
    let probe = CapabilityProbe::new(gpu);
    let fd = surface.export_buffer_fd(0)?;
    let memory_type_index = probe.fd_memory_type_index(fd.as_fd())?;
    let size = gpu.image_memory_requirements(image).size;
    let memory = gpu.allocate_memory(size, memory_type_index, Some(fd))?;
    debug!(
        size,
        buffer_object_size = surface.buffer_object_size(0),
        memory_type_index,
        "imported unified dma-buf memory"
    );
    Ok(memory)
}

/// Imports one allocation per buffer object for a disjoint image. Either
/// every plane imports or the whole set is freed.
pub fn import_per_plane(
    gpu: &dyn GpuDevice,
    surface: &dyn PlatformSurface,
    image: vk::Image,
    buffer_object_count: usize,
) -> Result<Vec<vk::DeviceMemory>> {
    if buffer_object_count > PLANE_ASPECTS.len() {
        return Err(TextureError::TooManyBufferObjects(buffer_object_count));
    }
    let probe = CapabilityProbe::new(gpu);
    let mut memories = Vec::with_capacity(buffer_object_count);
    for index in 0..buffer_object_count {
        let imported = surface
            .export_buffer_fd(index)
            .map_err(Into::into)
            .and_then(|fd| {
                let memory_type_index = probe.fd_memory_type_index(fd.as_fd())?;
                let requirements = probe.plane_requirements(image, PLANE_ASPECTS[index]);
                gpu.allocate_memory(requirements.size, memory_type_index, Some(fd))
            });
        match imported {
            Ok(memory) => memories.push(memory),
            Err(err) => {
                for memory in memories {
                    gpu.free_memory(memory);
                }
                return Err(err);
            }
        }
    }
    debug!(planes = buffer_object_count, "imported per-plane dma-buf memory");
    Ok(memories)
}

/// Binds a single allocation to the whole image at offset 0.
pub fn bind_unified(
    gpu: &dyn GpuDevice,
    image: vk::Image,
    memory: vk::DeviceMemory,
) -> Result<()> {
    gpu.bind_image_memory(image, memory, 0)
}

/// Binds each plane's allocation to its aspect. Every allocation is bound at
/// offset 0 within itself; plane placement comes from the aspect alone.
pub fn bind_per_plane(
    gpu: &dyn GpuDevice,
    image: vk::Image,
    memories: &[vk::DeviceMemory],
) -> Result<()> {
    let bindings: Vec<PlaneBinding> = memories
        .iter()
        .zip(PLANE_ASPECTS)
        .map(|(&memory, aspect)| PlaneBinding { aspect, memory })
        .collect();
    gpu.bind_image_planes(image, &bindings)
}
