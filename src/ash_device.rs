//! [`GpuDevice`] implemented over `ash`, issuing the real driver calls.
//!
//! The instance, physical device and logical device are created and owned by
//! the renderer; this type only borrows them for image and memory work. It
//! never creates or destroys the device or its queues.

use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd};
use std::sync::Arc;

use ash::vk;
use drm_fourcc::DrmModifier;
use tracing::{debug, error};

use crate::error::Result;
use crate::gpu::{GpuDevice, ImageSpec, ImageTiling, PlaneBinding};

pub struct AshDevice {
    instance: Arc<ash::Instance>,
    physical_device: vk::PhysicalDevice,
    device: Arc<ash::Device>,
    external_memory_fd: ash::extensions::khr::ExternalMemoryFd,
    dma_buf_import: bool,
}

impl AshDevice {
    /// Wraps renderer-owned handles. `dma_buf_import` reports whether the
    /// device was created with `VK_KHR_external_memory_fd` and
    /// `VK_EXT_external_memory_dma_buf` enabled; the caller knows, since it
    /// built the device.
    pub fn new(
        instance: Arc<ash::Instance>,
        physical_device: vk::PhysicalDevice,
        device: Arc<ash::Device>,
        dma_buf_import: bool,
    ) -> Self {
        let external_memory_fd =
            ash::extensions::khr::ExternalMemoryFd::new(&instance, &device);
        Self {
            instance,
            physical_device,
            device,
            external_memory_fd,
            dma_buf_import,
        }
    }
}

impl GpuDevice for AshDevice {
    fn create_image(&self, spec: &ImageSpec) -> Result<vk::Image> {
        let mut external_info = vk::ExternalMemoryImageCreateInfo::builder()
            .handle_types(vk::ExternalMemoryHandleTypeFlags::DMA_BUF_EXT);
        let mut modifier_info;

        let mut flags = vk::ImageCreateFlags::empty();
        if spec.disjoint {
            flags |= vk::ImageCreateFlags::DISJOINT;
        }

        let mut image_info = vk::ImageCreateInfo::builder()
            .flags(flags)
            .image_type(vk::ImageType::TYPE_2D)
            .format(spec.format)
            .extent(vk::Extent3D {
                width: spec.width,
                height: spec.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .usage(spec.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        image_info = match &spec.tiling {
            ImageTiling::Linear => image_info.tiling(vk::ImageTiling::LINEAR),
            ImageTiling::LinearModifier(plane_layouts) => {
                modifier_info = vk::ImageDrmFormatModifierExplicitCreateInfoEXT::builder()
                    .drm_format_modifier(DrmModifier::Linear.into())
                    .plane_layouts(plane_layouts);
                image_info
                    .tiling(vk::ImageTiling::DRM_FORMAT_MODIFIER_EXT)
                    .push_next(&mut modifier_info)
            }
        };
        if spec.external_dma_buf {
            image_info = image_info.push_next(&mut external_info);
        }

        let image = unsafe { self.device.create_image(&image_info, None) }.map_err(|err| {
            error!(
                format = ?spec.format,
                width = spec.width,
                height = spec.height,
                "vkCreateImage failed: {err}"
            );
            err
        })?;
        debug!(?image, format = ?spec.format, "created external texture image");
        Ok(image)
    }

    fn destroy_image(&self, image: vk::Image) {
        unsafe { self.device.destroy_image(image, None) };
    }

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        unsafe { self.device.get_image_memory_requirements(image) }
    }

    fn plane_memory_requirements(
        &self,
        image: vk::Image,
        plane: vk::ImageAspectFlags,
    ) -> vk::MemoryRequirements {
        let mut plane_info =
            vk::ImagePlaneMemoryRequirementsInfo::builder().plane_aspect(plane);
        let info = vk::ImageMemoryRequirementsInfo2::builder()
            .image(image)
            .push_next(&mut plane_info);
        let mut requirements = vk::MemoryRequirements2::default();
        unsafe {
            self.device
                .get_image_memory_requirements2(&info, &mut requirements)
        };
        requirements.memory_requirements
    }

    fn memory_types(&self) -> Vec<vk::MemoryType> {
        let properties = unsafe {
            self.instance
                .get_physical_device_memory_properties(self.physical_device)
        };
        properties.memory_types[..properties.memory_type_count as usize].to_vec()
    }

    fn fd_memory_type_bits(&self, fd: BorrowedFd<'_>) -> Result<u32> {
        let properties = unsafe {
            self.external_memory_fd.get_memory_fd_properties(
                vk::ExternalMemoryHandleTypeFlags::DMA_BUF_EXT,
                fd.as_raw_fd(),
            )
        }
        .map_err(|err| {
            error!(fd = fd.as_raw_fd(), "vkGetMemoryFdPropertiesKHR failed: {err}");
            err
        })?;
        Ok(properties.memory_type_bits)
    }

    fn allocate_memory(
        &self,
        size: vk::DeviceSize,
        memory_type_index: u32,
        import: Option<OwnedFd>,
    ) -> Result<vk::DeviceMemory> {
        let raw_fd = import.map(IntoRawFd::into_raw_fd);
        let allocated = match raw_fd {
            Some(fd) => {
                let mut import_info = vk::ImportMemoryFdInfoKHR::builder()
                    .handle_type(vk::ExternalMemoryHandleTypeFlags::DMA_BUF_EXT)
                    .fd(fd);
                let alloc_info = vk::MemoryAllocateInfo::builder()
                    .allocation_size(size)
                    .memory_type_index(memory_type_index)
                    .push_next(&mut import_info);
                unsafe { self.device.allocate_memory(&alloc_info, None) }
            }
            None => {
                let alloc_info = vk::MemoryAllocateInfo::builder()
                    .allocation_size(size)
                    .memory_type_index(memory_type_index);
                unsafe { self.device.allocate_memory(&alloc_info, None) }
            }
        };
        match allocated {
            Ok(memory) => Ok(memory),
            Err(err) => {
                // The driver only consumes the fd on success; reclaim it so
                // it is closed instead of leaked.
                if let Some(fd) = raw_fd {
                    drop(unsafe { OwnedFd::from_raw_fd(fd) });
                }
                error!(size, memory_type_index, "vkAllocateMemory failed: {err}");
                Err(err.into())
            }
        }
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.free_memory(memory, None) };
    }

    fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> Result<()> {
        unsafe { self.device.bind_image_memory(image, memory, offset) }.map_err(|err| {
            error!(?image, "vkBindImageMemory failed: {err}");
            err.into()
        })
    }

    fn bind_image_planes(&self, image: vk::Image, bindings: &[PlaneBinding]) -> Result<()> {
        let mut plane_infos: Vec<vk::BindImagePlaneMemoryInfo> = bindings
            .iter()
            .map(|binding| {
                vk::BindImagePlaneMemoryInfo::builder()
                    .plane_aspect(binding.aspect)
                    .build()
            })
            .collect();
        let bind_infos: Vec<vk::BindImageMemoryInfo> = bindings
            .iter()
            .zip(plane_infos.iter_mut())
            .map(|(binding, plane_info)| {
                vk::BindImageMemoryInfo::builder()
                    .image(image)
                    .memory(binding.memory)
                    .memory_offset(0)
                    .push_next(plane_info)
                    .build()
            })
            .collect();
        unsafe { self.device.bind_image_memory2(&bind_infos) }.map_err(|err| {
            error!(?image, planes = bindings.len(), "vkBindImageMemory2 failed: {err}");
            err.into()
        })
    }

    fn drm_modifier_properties(
        &self,
        format: vk::Format,
    ) -> Vec<vk::DrmFormatModifierPropertiesEXT> {
        // Two-call returned-array pattern: count first, then the entries.
        let mut list = vk::DrmFormatModifierPropertiesListEXT::default();
        let mut properties = vk::FormatProperties2::default();
        properties.p_next =
            (&mut list as *mut vk::DrmFormatModifierPropertiesListEXT).cast();
        unsafe {
            self.instance.get_physical_device_format_properties2(
                self.physical_device,
                format,
                &mut properties,
            )
        };
        let count = list.drm_format_modifier_count as usize;
        if count == 0 {
            return Vec::new();
        }
        let mut entries = vec![vk::DrmFormatModifierPropertiesEXT::default(); count];
        list.p_drm_format_modifier_properties = entries.as_mut_ptr();
        unsafe {
            self.instance.get_physical_device_format_properties2(
                self.physical_device,
                format,
                &mut properties,
            )
        };
        entries.truncate(list.drm_format_modifier_count as usize);
        entries
    }

    fn linear_tiling_features(&self, format: vk::Format) -> vk::FormatFeatureFlags {
        let properties = unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        };
        properties.linear_tiling_features
    }

    fn subresource_layout(
        &self,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
    ) -> vk::SubresourceLayout {
        let subresource = vk::ImageSubresource {
            aspect_mask: aspect,
            mip_level: 0,
            array_layer: 0,
        };
        unsafe { self.device.get_image_subresource_layout(image, subresource) }
    }

    fn map_memory(&self, memory: vk::DeviceMemory, size: vk::DeviceSize) -> Result<*mut u8> {
        let pointer = unsafe {
            self.device
                .map_memory(memory, 0, size, vk::MemoryMapFlags::empty())
        }
        .map_err(|err| {
            error!(size, "vkMapMemory failed: {err}");
            err
        })?;
        Ok(pointer.cast())
    }

    fn flush_memory(&self, memory: vk::DeviceMemory) -> Result<()> {
        let range = vk::MappedMemoryRange::builder()
            .memory(memory)
            .offset(0)
            .size(vk::WHOLE_SIZE);
        unsafe { self.device.flush_mapped_memory_ranges(&[range.build()]) }.map_err(|err| {
            error!("vkFlushMappedMemoryRanges failed: {err}");
            err.into()
        })
    }

    fn unmap_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.unmap_memory(memory) };
    }

    fn supports_dma_buf_import(&self) -> bool {
        self.dma_buf_import
    }
}
