//! External-texture import pipeline for TBM-surface-backed platform buffers.
//!
//! Bridges compositor-owned pixel buffers into Vulkan images the rendering
//! engine can sample directly. The zero-copy path imports the buffer's
//! dma-buf fds as device memory behind a DRM-format-modifier image, with
//! per-plane disjoint binding when format and device allow it; a host-mapped
//! fallback copies pixel planes through a linear host-visible image where
//! import support is missing. Per-frame state tracking avoids rebuilding GPU
//! objects while the platform keeps handing out the same buffer.
//!
//! The Vulkan instance, physical device and logical device are owned by the
//! surrounding renderer and passed in; this crate only creates images and
//! memory bound to them.

pub mod capability;
pub mod error;
pub mod format;
pub mod gpu;
pub mod image;
pub mod import;
pub mod surface;
pub mod texture;

mod ash_device;

pub use ash_device::AshDevice;
pub use error::{Result, TextureError};
pub use gpu::{GpuDevice, ImageSpec, ImageTiling, PlaneBinding};
pub use image::ImageResources;
pub use surface::{
    MappedPlane, PlaneInfo, PlatformSurface, SurfaceCallback, SurfaceDescriptor, SurfaceId,
    SurfaceInfo, SurfaceMap,
};
pub use texture::{ExternalTexture, FrameDescriptor, ImportStrategy, SurfaceTexture};
