// Texture - the image the fragment shader samples when it is not specialized
//
// Pixels come from an image file if one is configured, otherwise from a
// generated checkerboard. Upload goes through a staging buffer into an
// optimally tiled image.

use anyhow::{Context, Result};
use ash::vk;
use image::{Rgba, RgbaImage};
use std::path::Path;
use std::sync::Arc;

use super::buffer::{create_buffer_with_data, GpuImage};
use super::command;
use super::handle::{CommandPool, ImageView, Sampler};
use super::VulkanDevice;

pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

const LIGHT: Rgba<u8> = Rgba([0xe8, 0xe8, 0xe8, 0xff]);
const DARK: Rgba<u8> = Rgba([0x3a, 0x5f, 0xa0, 0xff]);

/// `size`×`size` checkerboard with `cells` squares per side
pub fn checkerboard(size: u32, cells: u32) -> RgbaImage {
    let cell = (size / cells.max(1)).max(1);
    RgbaImage::from_fn(size, size, |x, y| {
        if ((x / cell) + (y / cell)) % 2 == 0 {
            LIGHT
        } else {
            DARK
        }
    })
}

/// Pixels for the cube texture
pub fn load_pixels(path: Option<&Path>, fallback_size: u32) -> Result<RgbaImage> {
    match path {
        Some(path) => {
            let pixels = image::open(path)
                .with_context(|| format!("Failed to load texture {:?}", path))?
                .to_rgba8();
            log::info!("Loaded texture {:?} ({}x{})", path, pixels.width(), pixels.height());
            Ok(pixels)
        }
        None => {
            log::info!("Using generated {}x{} checkerboard texture", fallback_size, fallback_size);
            Ok(checkerboard(fallback_size.max(1), 8))
        }
    }
}

/// A sampled 2D texture. Field order is drop order.
pub struct Texture {
    pub sampler: Sampler,
    pub view: ImageView,
    pub image: GpuImage,
}

impl Texture {
    pub fn upload(
        device: &Arc<VulkanDevice>,
        pool: &CommandPool,
        pixels: &RgbaImage,
        fence_timeout_ns: u64,
    ) -> Result<Self> {
        let extent = vk::Extent2D {
            width: pixels.width(),
            height: pixels.height(),
        };

        let staging = create_buffer_with_data(
            device,
            "texture staging",
            vk::BufferUsageFlags::TRANSFER_SRC,
            pixels.as_raw().as_slice(),
        )?;

        let image = GpuImage::new(
            device,
            "texture",
            TEXTURE_FORMAT,
            extent,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        )?;

        let subresource_range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };

        command::submit_and_wait(device, pool, fence_timeout_ns, |cmd| {
            let to_transfer = vk::ImageMemoryBarrier::builder()
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image.image)
                .subresource_range(subresource_range)
                .build();

            let region = vk::BufferImageCopy::builder()
                .buffer_offset(0)
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_extent(vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                })
                .build();

            let to_shader = vk::ImageMemoryBarrier::builder()
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::SHADER_READ)
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image.image)
                .subresource_range(subresource_range)
                .build();

            unsafe {
                device.device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_transfer],
                );
                device.device.cmd_copy_buffer_to_image(
                    cmd,
                    staging.buffer,
                    image.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
                device.device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_shader],
                );
            }
            Ok(())
        })
        .context("Failed to upload texture")?;

        // Staging memory is no longer needed once the copy has completed
        drop(staging);

        let view = image.create_view(vk::ImageAspectFlags::COLOR)?;

        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::NEAREST)
            .min_filter(vk::Filter::NEAREST)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .compare_op(vk::CompareOp::NEVER)
            .min_lod(0.0)
            .max_lod(0.0)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE);

        let sampler = unsafe {
            device.device.create_sampler(&sampler_info, None)
                .context("Failed to create sampler")?
        };

        Ok(Self {
            sampler: Sampler::from_raw(device, sampler),
            view,
            image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkerboard_alternates() {
        let board = checkerboard(64, 8);
        assert_eq!(board.dimensions(), (64, 64));
        assert_eq!(*board.get_pixel(0, 0), LIGHT);
        assert_eq!(*board.get_pixel(8, 0), DARK);
        assert_eq!(*board.get_pixel(8, 8), LIGHT);
        assert_eq!(*board.get_pixel(63, 0), DARK);
    }

    #[test]
    fn tiny_checkerboard_does_not_divide_by_zero() {
        let board = checkerboard(4, 8);
        assert_eq!(board.dimensions(), (4, 4));
        assert_eq!(*board.get_pixel(1, 0), DARK);
    }

    #[test]
    fn fallback_when_no_path() {
        let pixels = load_pixels(None, 32).unwrap();
        assert_eq!(pixels.dimensions(), (32, 32));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_pixels(Some(Path::new("no/such/texture.png")), 32).is_err());
    }
}
