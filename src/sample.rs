// =============================================================================
// SAMPLE CONTEXT - Everything needed to draw one specialized cube
// =============================================================================
//
// BUILD ORDER:
// device -> swapchain -> depth -> command pool -> texture -> MVP buffer
//   -> set/pipeline layouts -> render pass -> shaders -> specialization block
//   -> framebuffers -> vertex buffer -> descriptor set -> pipeline cache
//   -> pipeline
//
// Teardown is the reverse, done by Drop through field order. An error at any
// step drops whatever was already built.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::MemoryLocation;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::sync::Arc;

use crate::backend::buffer::{create_buffer_with_data, create_depth_buffer, GpuBuffer, GpuImage};
use crate::backend::handle::{
    CommandPool, DescriptorPool, DescriptorSetLayout, Framebuffer, ImageView, Pipeline,
    PipelineCache, PipelineLayout, RenderPass, ShaderModule,
};
use crate::backend::texture::{self, Texture};
use crate::backend::{command, pipeline, shader, sync};
use crate::backend::{Swapchain, VulkanDevice};
use crate::capture::{self, Capture};
use crate::config::Config;
use crate::cube::{self, CUBE_VERTICES, VERTEX_COUNT};
use crate::shader::{reflect, ShaderTools};
use crate::specialization::{self, SpecializationBlock};

/// All GPU state for the sample.
///
/// IMPORTANT: Field order is drop order. Later acquisitions are listed first
/// and the device comes last.
pub struct SampleContext {
    pipeline: Pipeline,
    _pipeline_cache: PipelineCache,
    descriptor_set: vk::DescriptorSet,
    _descriptor_pool: DescriptorPool,
    vertex_buffer: GpuBuffer,
    framebuffers: Vec<Framebuffer>,
    fragment_constants: SpecializationBlock,
    _fragment_module: ShaderModule,
    _vertex_module: ShaderModule,
    render_pass: RenderPass,
    pipeline_layout: PipelineLayout,
    _set_layout: DescriptorSetLayout,
    _uniform_buffer: GpuBuffer,
    _texture: Texture,
    command_pool: CommandPool,
    _depth_view: ImageView,
    _depth_image: GpuImage,
    swapchain: Swapchain,
    device: Arc<VulkanDevice>,

    clear_color: [f32; 4],
    fence_timeout_ns: u64,
}

/// What came out of `render_frame`
pub struct FrameResult {
    pub image_index: u32,
    pub suboptimal: bool,
    pub capture: Option<Capture>,
}

impl SampleContext {
    pub fn new(
        config: &Config,
        display: RawDisplayHandle,
        window: RawWindowHandle,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let device = VulkanDevice::new(
            &config.window.title,
            config.validation_enabled(),
            display,
            window,
        )?;

        let swapchain = Swapchain::new(device.clone(), config.get_present_mode(), width, height)?;
        let extent = swapchain.extent;

        let (depth_image, depth_view) = create_depth_buffer(&device, extent)?;

        let command_pool = command::create_command_pool(&device)?;

        let pixels = texture::load_pixels(config.texture.path.as_deref(), config.texture.size)?;
        let texture = Texture::upload(
            &device,
            &command_pool,
            &pixels,
            config.graphics.fence_timeout_ns,
        )?;

        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let mvp = cube::model_view_projection(aspect);
        let uniform_buffer = create_buffer_with_data(
            &device,
            "mvp",
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            &[mvp.to_cols_array()],
        )?;

        let set_layout = pipeline::create_descriptor_set_layout(&device)?;
        let pipeline_layout = pipeline::create_pipeline_layout(&device, &set_layout)?;
        let render_pass = pipeline::create_render_pass(&device, swapchain.format)?;

        // ─────────────────────────────────────────────────────────────────────
        // Shaders + specialization data
        // ─────────────────────────────────────────────────────────────────────
        let tools = ShaderTools::from_config(&config.shaders)?;
        let vertex_words = tools.vertex_words()?;
        let fragment_words = tools.fragment_words(config.shaders.fragment_source)?;

        let fragment_constants = specialization::fragment_block(
            config.specialization.mode,
            config.specialization.draw_user_color,
            config.specialization.user_color,
        )
        .context("Failed to build fragment specialization data")?;

        if config.shaders.verify_spec_ids {
            let declared = reflect::declared_spec_constants(&fragment_words)?;
            log::debug!("Fragment module declares {:?}", declared);
            fragment_constants
                .verify_declared(&declared)
                .context("Specialization data does not match the fragment shader")?;
        }

        let vertex_module = shader::create_shader_module(&device, &vertex_words)?;
        let fragment_module = shader::create_shader_module(&device, &fragment_words)?;

        let framebuffers = pipeline::create_framebuffers(
            &device,
            &swapchain.image_views,
            depth_view.raw,
            &render_pass,
            extent,
        )?;

        let vertex_buffer = create_buffer_with_data(
            &device,
            "cube vertices",
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &CUBE_VERTICES,
        )?;

        let descriptor_pool = pipeline::create_descriptor_pool(&device)?;
        let descriptor_set = pipeline::create_descriptor_set(
            &device,
            &descriptor_pool,
            &set_layout,
            &uniform_buffer,
            &texture,
        )?;

        let pipeline_cache = pipeline::create_pipeline_cache(&device)?;
        let pipeline = pipeline::create_graphics_pipeline(
            &device,
            &pipeline_cache,
            &render_pass,
            &pipeline_layout,
            extent,
            vertex_module.raw,
            fragment_module.raw,
            &fragment_constants,
        )?;

        log::info!(
            "Pipeline ready: {} specialization constant(s), {} byte(s) of data",
            fragment_constants.len(),
            fragment_constants.data().len()
        );

        Ok(Self {
            pipeline,
            _pipeline_cache: pipeline_cache,
            descriptor_set,
            _descriptor_pool: descriptor_pool,
            vertex_buffer,
            framebuffers,
            fragment_constants,
            _fragment_module: fragment_module,
            _vertex_module: vertex_module,
            render_pass,
            pipeline_layout,
            _set_layout: set_layout,
            _uniform_buffer: uniform_buffer,
            _texture: texture,
            command_pool,
            _depth_view: depth_view,
            _depth_image: depth_image,
            swapchain,
            device,
            clear_color: config.graphics.clear_color,
            fence_timeout_ns: config.graphics.fence_timeout_ns,
        })
    }

    pub fn fragment_constants(&self) -> &SpecializationBlock {
        &self.fragment_constants
    }

    // =========================================================================
    // THE FRAME
    // =========================================================================

    /// Draw the cube once and present it.
    ///
    /// With `want_capture`, the presented image is also copied to host memory
    /// before it is handed to the presentation engine.
    pub fn render_frame(&self, want_capture: bool) -> Result<FrameResult> {
        let device = &self.device;

        let image_acquired = sync::create_semaphore(device)?;
        let (image_index, acquire_suboptimal) =
            self.swapchain.acquire_next_image(u64::MAX, image_acquired.raw)?;

        let capture_format = self.swapchain.format;
        let readback = if !want_capture {
            None
        } else if !self.swapchain.readable {
            log::warn!("Swapchain images cannot be copied from; skipping capture");
            None
        } else if !capture::supports(capture_format) {
            log::warn!("Cannot capture swapchain format {:?}; skipping", capture_format);
            None
        } else {
            let extent = self.swapchain.extent;
            let size = extent.width as vk::DeviceSize * extent.height as vk::DeviceSize * 4;
            Some(GpuBuffer::new(
                device,
                "frame readback",
                size,
                vk::BufferUsageFlags::TRANSFER_DST,
                MemoryLocation::GpuToCpu,
            )?)
        };

        let cmd = command::allocate_command_buffer(device, &self.command_pool)?;
        let result = self.submit_frame(cmd, image_index, image_acquired.raw, readback.as_ref());
        command::release_command_buffer(device, &self.command_pool, cmd, result)?;

        // ─────────────────────────────────────────────────────────────────────
        // Present (GPU already finished, so no semaphore to wait on)
        // ─────────────────────────────────────────────────────────────────────
        let present_suboptimal = self.swapchain.present(device.graphics_queue, image_index, &[])?;
        log::info!("Presented swapchain image {}", image_index);

        let capture = match readback {
            Some(buffer) => {
                let extent = self.swapchain.extent;
                Some(Capture {
                    format: capture_format,
                    width: extent.width,
                    height: extent.height,
                    bytes: buffer.mapped()?.to_vec(),
                })
            }
            None => None,
        };

        Ok(FrameResult {
            image_index,
            suboptimal: acquire_suboptimal || present_suboptimal,
            capture,
        })
    }

    /// Record, submit and wait for the frame's command buffer
    fn submit_frame(
        &self,
        cmd: vk::CommandBuffer,
        image_index: u32,
        image_acquired: vk::Semaphore,
        readback: Option<&GpuBuffer>,
    ) -> Result<()> {
        let device = &self.device;
        self.record(cmd, image_index, readback)?;

        let fence = sync::create_fence(device)?;
        let wait_semaphores = [image_acquired];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [cmd];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers);

        unsafe {
            device.device.queue_submit(device.graphics_queue, &[submit_info.build()], fence.raw)
                .context("Failed to submit frame")?;
        }

        let timeouts = sync::wait_for_fence(device, fence.raw, self.fence_timeout_ns)?;
        if timeouts > 0 {
            log::debug!("Frame fence needed {} extra wait(s)", timeouts);
        }
        Ok(())
    }

    fn record(&self, cmd: vk::CommandBuffer, image_index: u32, readback: Option<&GpuBuffer>) -> Result<()> {
        let device = &self.device.device;
        let extent = self.swapchain.extent;
        let framebuffer = self.framebuffers
            .get(image_index as usize)
            .context("Swapchain returned an image index without a framebuffer")?;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue { float32: self.clear_color },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ];

        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.render_pass.raw)
            .framebuffer(framebuffer.raw)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        unsafe {
            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device.begin_command_buffer(cmd, &begin_info)?;

            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.raw);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout.raw,
                0,
                &[self.descriptor_set],
                &[],
            );
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer], &[0]);
            device.cmd_draw(cmd, VERTEX_COUNT, 1, 0, 0);
            device.cmd_end_render_pass(cmd);
        }

        if let Some(buffer) = readback {
            self.record_readback(cmd, image_index, buffer)?;
        }

        unsafe { device.end_command_buffer(cmd) }?;
        Ok(())
    }

    /// PRESENT_SRC -> TRANSFER_SRC, copy to `buffer`, back to PRESENT_SRC
    fn record_readback(&self, cmd: vk::CommandBuffer, image_index: u32, buffer: &GpuBuffer) -> Result<()> {
        let device = &self.device.device;
        let extent = self.swapchain.extent;
        let image = *self.swapchain.images
            .get(image_index as usize)
            .context("Swapchain image index out of range")?;

        let subresource_range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };

        let to_transfer = vk::ImageMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dst_access_mask(vk::AccessFlags::TRANSFER_READ)
            .old_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .new_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
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

        let to_present = vk::ImageMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::TRANSFER_READ)
            .dst_access_mask(vk::AccessFlags::empty())
            .old_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(subresource_range)
            .build();

        let host_visible = vk::BufferMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::HOST_READ)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .buffer(buffer.buffer)
            .offset(0)
            .size(vk::WHOLE_SIZE)
            .build();

        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_transfer],
            );
            device.cmd_copy_image_to_buffer(
                cmd,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                buffer.buffer,
                &[region],
            );
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE | vk::PipelineStageFlags::HOST,
                vk::DependencyFlags::empty(),
                &[],
                &[host_visible],
                &[to_present],
            );
        }
        Ok(())
    }
}

impl Drop for SampleContext {
    fn drop(&mut self) {
        log::info!("Releasing sample resources");
        // Nothing may be destroyed while the GPU still uses it
        if let Err(e) = self.device.wait_idle() {
            log::error!("wait_idle failed during teardown: {:?}", e);
        }
    }
}
