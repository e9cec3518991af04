//! Translation between TBM/DRM fourcc pixel formats and Vulkan formats.
//!
//! TBM format codes are the same fourcc values used by DRM, so the mapping is
//! keyed on [`DrmFourcc`]. The translation is total: formats without a Vulkan
//! equivalent map to `vk::Format::UNDEFINED`, which callers must treat as
//! "import not possible", not as an error in itself.

use ash::vk;
use drm_fourcc::DrmFourcc;

/// Maps a platform fourcc code to the Vulkan format used for sampling it.
///
/// NV12-class planar YUV becomes the two-plane 4:2:0 format; packed RGB
/// variants collapse onto `R8G8B8A8_UNORM` or `B8G8R8A8_UNORM` depending on
/// channel order. Anything unrecognized yields `vk::Format::UNDEFINED`.
pub fn vk_format_for(fourcc: u32) -> vk::Format {
    match DrmFourcc::try_from(fourcc) {
        Ok(DrmFourcc::Nv12) | Ok(DrmFourcc::Nv21) => vk::Format::G8_B8R8_2PLANE_420_UNORM,
        Ok(DrmFourcc::Rgba8888)
        | Ok(DrmFourcc::Argb8888)
        | Ok(DrmFourcc::Rgbx8888)
        | Ok(DrmFourcc::Xrgb8888)
        | Ok(DrmFourcc::Rgb888) => vk::Format::R8G8B8A8_UNORM,
        Ok(DrmFourcc::Bgr888)
        | Ok(DrmFourcc::Xbgr8888)
        | Ok(DrmFourcc::Bgrx8888)
        | Ok(DrmFourcc::Abgr8888)
        | Ok(DrmFourcc::Bgra8888) => vk::Format::B8G8R8A8_UNORM,
        _ => vk::Format::UNDEFINED,
    }
}

/// Reverse mapping for descriptor reporting. Collapsed variants report their
/// canonical fourcc.
pub fn fourcc_for(format: vk::Format) -> Option<DrmFourcc> {
    match format {
        vk::Format::G8_B8R8_2PLANE_420_UNORM => Some(DrmFourcc::Nv12),
        vk::Format::R8G8B8A8_UNORM => Some(DrmFourcc::Rgba8888),
        vk::Format::B8G8R8A8_UNORM => Some(DrmFourcc::Bgra8888),
        _ => None,
    }
}

/// True for the multi-planar Vulkan formats this pipeline can create
/// disjoint images for.
pub fn is_multi_planar(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::G8_B8R8_2PLANE_420_UNORM
            | vk::Format::G8_B8_R8_3PLANE_420_UNORM
            | vk::Format::G8_B8R8_2PLANE_422_UNORM
            | vk::Format::G8_B8_R8_3PLANE_422_UNORM
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planar_yuv_maps_to_two_plane_420() {
        for fourcc in [DrmFourcc::Nv12, DrmFourcc::Nv21] {
            assert_eq!(
                vk_format_for(fourcc as u32),
                vk::Format::G8_B8R8_2PLANE_420_UNORM
            );
        }
    }

    #[test]
    fn rgba_class_maps_to_rgba8() {
        for fourcc in [
            DrmFourcc::Rgba8888,
            DrmFourcc::Argb8888,
            DrmFourcc::Rgbx8888,
            DrmFourcc::Xrgb8888,
            DrmFourcc::Rgb888,
        ] {
            assert_eq!(vk_format_for(fourcc as u32), vk::Format::R8G8B8A8_UNORM);
        }
    }

    #[test]
    fn bgra_class_maps_to_bgra8() {
        for fourcc in [
            DrmFourcc::Bgr888,
            DrmFourcc::Xbgr8888,
            DrmFourcc::Bgrx8888,
            DrmFourcc::Abgr8888,
            DrmFourcc::Bgra8888,
        ] {
            assert_eq!(vk_format_for(fourcc as u32), vk::Format::B8G8R8A8_UNORM);
        }
    }

    #[test]
    fn unknown_formats_yield_the_undefined_sentinel() {
        assert_eq!(vk_format_for(DrmFourcc::Yuyv as u32), vk::Format::UNDEFINED);
        assert_eq!(vk_format_for(0), vk::Format::UNDEFINED);
        assert_eq!(vk_format_for(u32::MAX), vk::Format::UNDEFINED);
    }

    #[test]
    fn reverse_mapping_reports_canonical_fourcc() {
        assert_eq!(
            fourcc_for(vk::Format::G8_B8R8_2PLANE_420_UNORM),
            Some(DrmFourcc::Nv12)
        );
        assert_eq!(fourcc_for(vk::Format::UNDEFINED), None);
    }
}
