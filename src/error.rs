//! Error type for the external-texture import pipeline.
//!
//! Every failure here is recoverable at the frame level: the current import
//! attempt is abandoned, resources created so far are released, and the next
//! frame retries from scratch with a fresh surface descriptor.

use ash::vk;
use thiserror::Error;

/// Errors surfaced by one `populate_texture` attempt.
#[derive(Debug, Error)]
pub enum TextureError {
    /// A Vulkan driver call returned a non-success status.
    #[error("vulkan call failed: {0}")]
    Vk(#[from] vk::Result),

    /// An fd duplication or other OS-level operation failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The platform callback produced no buffer for this frame.
    #[error("no surface available for this frame")]
    NoSurface,

    /// The platform compositor failed to report the surface's metadata.
    #[error("surface info query failed")]
    SurfaceQuery,

    /// The surface's pixel format has no Vulkan equivalent.
    #[error("unsupported pixel format {0:#010x}")]
    UnsupportedFormat(u32),

    /// The device advertises no linear DRM format modifier for the format.
    #[error("no linear DRM format modifier for {0:?}")]
    NoLinearModifier(vk::Format),

    /// No device memory type satisfies the import or mapping requirements.
    #[error("no compatible memory type (type bits {type_bits:#010b})")]
    NoMemoryType { type_bits: u32 },

    /// The format cannot be sampled from linearly tiled host memory.
    #[error("format {0:?} cannot be sampled from host-mapped memory")]
    HostSamplingUnsupported(vk::Format),

    /// The buffer reports more backing objects than image planes can address.
    #[error("buffer has {0} backing objects, more than the addressable image planes")]
    TooManyBufferObjects(usize),
}

pub type Result<T, E = TextureError> = std::result::Result<T, E>;
