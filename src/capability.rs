//! Read-only capability queries against the GPU device.
//!
//! Every probe failure is fatal to the current frame's import attempt only;
//! the caller releases whatever it created and reports a recoverable error.

use std::os::fd::BorrowedFd;

use ash::vk;
use drm_fourcc::DrmModifier;
use tracing::warn;

use crate::error::{Result, TextureError};
use crate::format;
use crate::gpu::GpuDevice;

/// Scans a memory-type table for the first index whose bit is set in
/// `type_bits` and whose property flags fully contain `required`. First
/// match, not best match.
pub fn find_memory_type_in(
    types: &[vk::MemoryType],
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    types.iter().enumerate().find_map(|(index, memory_type)| {
        let selectable = type_bits & (1 << index) != 0;
        (selectable && memory_type.property_flags.contains(required)).then_some(index as u32)
    })
}

/// Stateless queries against one device, borrowed per import attempt.
pub struct CapabilityProbe<'a> {
    gpu: &'a dyn GpuDevice,
}

impl<'a> CapabilityProbe<'a> {
    pub fn new(gpu: &'a dyn GpuDevice) -> Self {
        Self { gpu }
    }

    /// First device memory type matching `type_bits` and `required`.
    pub fn find_memory_type(
        &self,
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    ) -> Result<u32> {
        find_memory_type_in(&self.gpu.memory_types(), type_bits, required)
            .ok_or(TextureError::NoMemoryType { type_bits })
    }

    /// Lowest memory-type index importable from the given dma-buf fd.
    pub fn fd_memory_type_index(&self, fd: BorrowedFd<'_>) -> Result<u32> {
        let type_bits = self.gpu.fd_memory_type_bits(fd)?;
        if type_bits == 0 {
            return Err(TextureError::NoMemoryType { type_bits });
        }
        Ok(type_bits.trailing_zeros())
    }

    /// The linear-layout DRM modifier entry for `format`, if the device
    /// advertises one.
    pub fn linear_modifier_properties(
        &self,
        format: vk::Format,
    ) -> Result<vk::DrmFormatModifierPropertiesEXT> {
        let linear: u64 = DrmModifier::Linear.into();
        self.gpu
            .drm_modifier_properties(format)
            .into_iter()
            .find(|properties| properties.drm_format_modifier == linear)
            .ok_or_else(|| {
                warn!(?format, "device advertises no linear DRM format modifier");
                TextureError::NoLinearModifier(format)
            })
    }

    /// Per-plane memory requirements of a disjoint image.
    pub fn plane_requirements(
        &self,
        image: vk::Image,
        plane: vk::ImageAspectFlags,
    ) -> vk::MemoryRequirements {
        self.gpu.plane_memory_requirements(image, plane)
    }

    /// True when `format` is a recognized multi-planar format whose linear
    /// modifier advertises disjoint binding.
    pub fn supports_disjoint(&self, format: vk::Format) -> bool {
        if !format::is_multi_planar(format) {
            return false;
        }
        match self.linear_modifier_properties(format) {
            Ok(properties) => properties
                .drm_format_modifier_tiling_features
                .contains(vk::FormatFeatureFlags::DISJOINT),
            Err(_) => false,
        }
    }

    /// Whether linearly tiled images of `format` can be sampled with YCbCr
    /// conversion, gating the host-mapped fallback for planar formats.
    pub fn supports_host_sampled_ycbcr(&self, format: vk::Format) -> bool {
        let features = self.gpu.linear_tiling_features(format);
        features.contains(
            vk::FormatFeatureFlags::SAMPLED_IMAGE
                | vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR
                | vk::FormatFeatureFlags::SAMPLED_IMAGE_YCBCR_CONVERSION_LINEAR_FILTER
                | vk::FormatFeatureFlags::COSITED_CHROMA_SAMPLES,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_type(flags: vk::MemoryPropertyFlags) -> vk::MemoryType {
        vk::MemoryType {
            property_flags: flags,
            heap_index: 0,
        }
    }

    #[test]
    fn picks_first_index_with_matching_bit_and_flags() {
        let types = [
            memory_type(vk::MemoryPropertyFlags::DEVICE_LOCAL),
            memory_type(
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            ),
            memory_type(
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            ),
        ];
        let index = find_memory_type_in(
            &types,
            0b110,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        assert_eq!(index, Some(1));
    }

    #[test]
    fn requires_full_flag_containment() {
        let types = [memory_type(vk::MemoryPropertyFlags::HOST_VISIBLE)];
        let index = find_memory_type_in(
            &types,
            0b1,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        assert_eq!(index, None);
    }

    #[test]
    fn type_bits_mask_excludes_otherwise_suitable_types() {
        let types = [
            memory_type(vk::MemoryPropertyFlags::HOST_VISIBLE),
            memory_type(vk::MemoryPropertyFlags::HOST_VISIBLE),
        ];
        let index =
            find_memory_type_in(&types, 0b10, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert_eq!(index, Some(1));
    }

    #[test]
    fn empty_mask_finds_nothing() {
        let types = [memory_type(vk::MemoryPropertyFlags::HOST_VISIBLE)];
        assert_eq!(
            find_memory_type_in(&types, 0, vk::MemoryPropertyFlags::HOST_VISIBLE),
            None
        );
    }
}
