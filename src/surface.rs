//! Platform-compositor boundary: TBM-surface-shaped buffers and the per-frame
//! release contract.
//!
//! The compositor owns the buffers; this crate only borrows them for the
//! duration of one `populate_texture` call. Two ownership rules are made
//! structural here: buffer-object fds cross into Vulkan only as duplicated,
//! move-only [`OwnedFd`]s, and the per-frame release callback is fired exactly
//! once when the [`SurfaceDescriptor`] is dropped.

use std::os::fd::OwnedFd;

use crate::error::Result;

/// Stable identity of a platform buffer, used for change detection between
/// frames. On Tizen this is the `tbm_surface_h` pointer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u64);

/// Per-plane layout of a platform buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneInfo {
    pub offset: u32,
    pub stride: u32,
    pub size: u32,
}

/// Metadata reported by the compositor for one buffer.
#[derive(Debug, Clone)]
pub struct SurfaceInfo {
    /// Pixel format as a DRM/TBM fourcc code.
    pub fourcc: u32,
    pub width: u32,
    pub height: u32,
    /// One entry for packed formats, two or three for planar YUV.
    pub planes: Vec<PlaneInfo>,
}

/// One plane of a CPU-mapped surface view.
pub struct MappedPlane<'a> {
    /// Plane bytes starting at the plane's own offset; rows are `stride`
    /// bytes apart.
    pub data: &'a [u8],
    pub stride: u32,
}

/// A CPU-readable view of a surface, unmapped on drop.
pub struct SurfaceMap<'a> {
    pub planes: Vec<MappedPlane<'a>>,
    unmap: Option<Box<dyn FnOnce() + 'a>>,
}

impl<'a> SurfaceMap<'a> {
    pub fn new(planes: Vec<MappedPlane<'a>>, unmap: impl FnOnce() + 'a) -> Self {
        Self {
            planes,
            unmap: Some(Box::new(unmap)),
        }
    }
}

impl Drop for SurfaceMap<'_> {
    fn drop(&mut self) {
        if let Some(unmap) = self.unmap.take() {
            unmap();
        }
    }
}

/// An opaque compositor-managed pixel buffer, possibly multi-planar, possibly
/// backed by multiple independent buffer objects.
pub trait PlatformSurface {
    /// Identity of the underlying handle, stable for the buffer's lifetime.
    fn id(&self) -> SurfaceId;

    /// Queries format, extent and plane layout from the compositor.
    fn query_info(&self) -> Result<SurfaceInfo>;

    /// Number of distinct memory objects backing this buffer. Greater than
    /// one means the planes live in independent allocations (disjoint).
    fn buffer_object_count(&self) -> usize;

    /// Byte size of one buffer object.
    fn buffer_object_size(&self, index: usize) -> u64;

    /// Duplicates the buffer object's dma-buf fd. The compositor keeps its
    /// own descriptor; the returned one is the caller's to consume or close.
    fn export_buffer_fd(&self, index: usize) -> std::io::Result<OwnedFd>;

    /// Maps the surface for CPU reads, for the host-mapped fallback path.
    fn map_read(&self) -> Result<SurfaceMap<'_>>;
}

/// A per-frame buffer handed out by the compositor, paired with its release
/// callback. Dropping the descriptor returns the buffer to the compositor's
/// queue; holding it back stalls the queue.
pub struct SurfaceDescriptor {
    surface: std::sync::Arc<dyn PlatformSurface>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl SurfaceDescriptor {
    pub fn new(
        surface: std::sync::Arc<dyn PlatformSurface>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            surface,
            release: Some(Box::new(release)),
        }
    }

    pub fn surface(&self) -> &dyn PlatformSurface {
        &*self.surface
    }
}

impl Drop for SurfaceDescriptor {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// The platform callback queried once per frame for the current buffer.
/// Returning `None` means no buffer is available this frame.
pub type SurfaceCallback = Box<dyn FnMut(u32, u32) -> Option<SurfaceDescriptor> + Send>;
