//! GPU-driver boundary for the import pipeline.
//!
//! The pipeline never owns the Vulkan device; it issues a narrow set of
//! device-level calls against this trait. [`crate::AshDevice`] implements it
//! over real `ash` handles supplied by the renderer; the integration tests
//! implement it with a counting mock. All methods are synchronous and must
//! only be called from one thread at a time, mirroring Vulkan's external
//! synchronization rules for device-level objects.

use std::os::fd::{BorrowedFd, OwnedFd};

use ash::vk;

use crate::error::Result;

/// Tiling strategy for a created image.
#[derive(Debug, Clone)]
pub enum ImageTiling {
    /// Plain `VK_IMAGE_TILING_LINEAR`, used by the host-mapped path.
    Linear,
    /// `VK_IMAGE_TILING_DRM_FORMAT_MODIFIER_EXT` with the linear modifier and
    /// explicit per-plane layouts taken from the platform buffer.
    LinearModifier(Vec<vk::SubresourceLayout>),
}

/// Plain description of the image to create, lowered to a `pNext` chain by
/// the implementation.
#[derive(Debug, Clone)]
pub struct ImageSpec {
    pub format: vk::Format,
    pub width: u32,
    pub height: u32,
    pub usage: vk::ImageUsageFlags,
    pub tiling: ImageTiling,
    /// Create with `VK_IMAGE_CREATE_DISJOINT_BIT` for per-plane binding.
    pub disjoint: bool,
    /// Chain `VkExternalMemoryImageCreateInfo` with the dma-buf handle type.
    pub external_dma_buf: bool,
}

/// One plane's memory binding in the disjoint case. The allocation is bound
/// at offset 0 within itself; plane placement is expressed solely by the
/// aspect, never by an accumulated offset.
#[derive(Debug, Clone, Copy)]
pub struct PlaneBinding {
    pub aspect: vk::ImageAspectFlags,
    pub memory: vk::DeviceMemory,
}

/// Device-level operations the import pipeline needs from the GPU driver.
pub trait GpuDevice {
    fn create_image(&self, spec: &ImageSpec) -> Result<vk::Image>;
    fn destroy_image(&self, image: vk::Image);

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements;
    fn plane_memory_requirements(
        &self,
        image: vk::Image,
        plane: vk::ImageAspectFlags,
    ) -> vk::MemoryRequirements;

    /// The device's memory-type table, in index order.
    fn memory_types(&self) -> Vec<vk::MemoryType>;

    /// Memory-type bits importable from the given dma-buf fd
    /// (`vkGetMemoryFdPropertiesKHR`).
    fn fd_memory_type_bits(&self, fd: BorrowedFd<'_>) -> Result<u32>;

    /// Allocates device memory. When `import` is given, the fd is handed to
    /// the driver (`VkImportMemoryFdInfoKHR`) and consumed on success; on
    /// failure the implementation closes it before returning.
    fn allocate_memory(
        &self,
        size: vk::DeviceSize,
        memory_type_index: u32,
        import: Option<OwnedFd>,
    ) -> Result<vk::DeviceMemory>;
    fn free_memory(&self, memory: vk::DeviceMemory);

    fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> Result<()>;

    /// Binds each plane's allocation to its image-plane aspect
    /// (`vkBindImageMemory2` with `VkBindImagePlaneMemoryInfo`).
    fn bind_image_planes(&self, image: vk::Image, bindings: &[PlaneBinding]) -> Result<()>;

    /// All DRM format-modifier properties the device advertises for `format`.
    fn drm_modifier_properties(&self, format: vk::Format)
        -> Vec<vk::DrmFormatModifierPropertiesEXT>;

    /// Linear-tiling feature flags for `format`, reported fresh per query.
    fn linear_tiling_features(&self, format: vk::Format) -> vk::FormatFeatureFlags;

    /// Row/offset layout of one subresource of a linearly tiled image.
    fn subresource_layout(
        &self,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
    ) -> vk::SubresourceLayout;

    fn map_memory(&self, memory: vk::DeviceMemory, size: vk::DeviceSize) -> Result<*mut u8>;
    fn flush_memory(&self, memory: vk::DeviceMemory) -> Result<()>;
    fn unmap_memory(&self, memory: vk::DeviceMemory);

    /// Whether the device was created with the dma-buf external-memory
    /// extensions, deciding zero-copy import vs. the host-mapped fallback.
    fn supports_dma_buf_import(&self) -> bool;
}
