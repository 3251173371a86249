// GPU memory: buffers and images backed by gpu-allocator
//
// Provides helpers for vertex, uniform, staging and readback buffers plus
// the depth and texture images. Every object frees its allocation on drop.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

use super::handle::ImageView;
use super::VulkanDevice;

pub const DEPTH_FORMAT: vk::Format = vk::Format::D16_UNORM;

/// A buffer plus the memory bound to it
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

impl GpuBuffer {
    pub fn new(
        device: &Arc<VulkanDevice>,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device.device.create_buffer(&buffer_info, None)
                .with_context(|| format!("Failed to create buffer '{}'", name))?
        };

        // From here on, drop cleans up whatever exists
        let mut this = Self {
            buffer,
            size,
            allocation: None,
            device: device.clone(),
        };

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let allocation = device.allocator.lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .with_context(|| format!("Failed to allocate memory for buffer '{}'", name))?;

        let (memory, offset) = unsafe { (allocation.memory(), allocation.offset()) };
        this.allocation = Some(allocation);

        unsafe {
            device.device.bind_buffer_memory(buffer, memory, offset)
                .with_context(|| format!("Failed to bind memory for buffer '{}'", name))?;
        }

        Ok(this)
    }

    /// Copy `data` to the start of a host-visible buffer
    pub fn upload<T: bytemuck::Pod>(&mut self, data: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let mapped = self.allocation
            .as_mut()
            .and_then(|a| a.mapped_slice_mut())
            .context("Buffer is not host visible")?;

        if bytes.len() > mapped.len() {
            anyhow::bail!("Upload of {} bytes does not fit in {} byte buffer", bytes.len(), mapped.len());
        }
        mapped[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Host view of a mapped buffer (after the GPU is done writing it)
    pub fn mapped(&self) -> Result<&[u8]> {
        self.allocation
            .as_ref()
            .and_then(|a| a.mapped_slice())
            .context("Buffer is not host visible")
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_buffer(self.buffer, None) };
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.device.allocator.lock().free(allocation) {
                log::error!("Failed to free buffer memory: {}", e);
            }
        }
    }
}

/// Create a host-visible buffer and fill it with data
pub fn create_buffer_with_data<T: bytemuck::Pod>(
    device: &Arc<VulkanDevice>,
    name: &str,
    usage: vk::BufferUsageFlags,
    data: &[T],
) -> Result<GpuBuffer> {
    let size = std::mem::size_of_val(data) as vk::DeviceSize;
    let mut buffer = GpuBuffer::new(device, name, size, usage, MemoryLocation::CpuToGpu)?;
    buffer.upload(data)?;
    Ok(buffer)
}

/// An image plus the memory bound to it
pub struct GpuImage {
    pub image: vk::Image,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

impl GpuImage {
    /// Device-local, optimally tiled 2D image with a single mip and layer
    pub fn new(
        device: &Arc<VulkanDevice>,
        name: &str,
        format: vk::Format,
        extent: vk::Extent2D,
        usage: vk::ImageUsageFlags,
    ) -> Result<Self> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe {
            device.device.create_image(&image_info, None)
                .with_context(|| format!("Failed to create image '{}'", name))?
        };

        let mut this = Self {
            image,
            format,
            extent,
            allocation: None,
            device: device.clone(),
        };

        let requirements = unsafe { device.device.get_image_memory_requirements(image) };

        let allocation = device.allocator.lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .with_context(|| format!("Failed to allocate memory for image '{}'", name))?;

        let (memory, offset) = unsafe { (allocation.memory(), allocation.offset()) };
        this.allocation = Some(allocation);

        unsafe {
            device.device.bind_image_memory(image, memory, offset)
                .with_context(|| format!("Failed to bind memory for image '{}'", name))?;
        }

        Ok(this)
    }

    pub fn create_view(&self, aspect_mask: vk::ImageAspectFlags) -> Result<ImageView> {
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(self.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(self.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe {
            self.device.device.create_image_view(&view_info, None)
                .context("Failed to create image view")?
        };
        Ok(ImageView::from_raw(&self.device, view))
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_image(self.image, None) };
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.device.allocator.lock().free(allocation) {
                log::error!("Failed to free image memory: {}", e);
            }
        }
    }
}

/// Create a depth buffer image and view
pub fn create_depth_buffer(
    device: &Arc<VulkanDevice>,
    extent: vk::Extent2D,
) -> Result<(GpuImage, ImageView)> {
    let image = GpuImage::new(
        device,
        "depth",
        DEPTH_FORMAT,
        extent,
        vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
    )?;
    let view = image.create_view(vk::ImageAspectFlags::DEPTH)?;
    Ok((image, view))
}
