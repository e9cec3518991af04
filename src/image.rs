//! Ownership of one GPU image and the memory backing it.
//!
//! The image and its allocations form one atomic unit: they are created,
//! imported and bound together, and any failure partway releases everything
//! created so far. Release is idempotent and also runs on drop.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::error::Result;
use crate::gpu::{GpuDevice, ImageSpec};

pub struct ImageResources {
    gpu: Arc<dyn GpuDevice>,
    image: Option<vk::Image>,
    memories: Vec<vk::DeviceMemory>,
}

impl ImageResources {
    pub fn new(gpu: Arc<dyn GpuDevice>) -> Self {
        Self {
            gpu,
            image: None,
            memories: Vec::new(),
        }
    }

    /// Creates the image for this unit. Any previous image must have been
    /// released first; creating over live resources is a contract violation.
    pub fn create_image(&mut self, spec: &ImageSpec) -> Result<vk::Image> {
        assert!(
            self.image.is_none() && self.memories.is_empty(),
            "create_image called over live GPU resources"
        );
        let image = self.gpu.create_image(spec)?;
        self.image = Some(image);
        Ok(image)
    }

    /// The live image, if the unit currently holds one.
    pub fn image(&self) -> Option<vk::Image> {
        self.image
    }

    /// First allocation of the unit; the handle exported to the engine.
    pub fn primary_memory(&self) -> Option<vk::DeviceMemory> {
        self.memories.first().copied()
    }

    /// Takes ownership of allocations backing the image, so a later release
    /// frees them together with it.
    pub fn adopt_memories(&mut self, memories: Vec<vk::DeviceMemory>) {
        assert!(
            self.image.is_some(),
            "adopt_memories called with no image created"
        );
        self.memories.extend(memories);
    }

    /// Total size the driver reports for the live image, queried fresh.
    pub fn allocation_size(&self) -> vk::DeviceSize {
        match self.image {
            Some(image) => self.gpu.image_memory_requirements(image).size,
            None => 0,
        }
    }

    /// Destroys the image and frees every adopted allocation. Safe to call
    /// repeatedly; later calls are no-ops.
    pub fn release(&mut self) {
        if let Some(image) = self.image.take() {
            self.gpu.destroy_image(image);
            debug!(?image, "released external texture image");
        }
        for memory in self.memories.drain(..) {
            self.gpu.free_memory(memory);
        }
    }
}

impl Drop for ImageResources {
    fn drop(&mut self) {
        self.release();
    }
}
