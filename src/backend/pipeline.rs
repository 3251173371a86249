// Graphics pipeline creation and management
//
// The graphics pipeline defines how vertices are processed and rasterized.
// It includes: vertex input, shaders (with specialization data for the
// fragment stage), rasterization, depth/stencil, blending.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::buffer::{GpuBuffer, DEPTH_FORMAT};
use super::handle::{
    DescriptorPool, DescriptorSetLayout, Framebuffer, Pipeline, PipelineCache, PipelineLayout,
    RenderPass,
};
use super::texture::Texture;
use super::VulkanDevice;
use crate::cube::Vertex;
use crate::specialization::SpecializationBlock;

/// Create a render pass for basic color attachment rendering with depth
pub fn create_render_pass(device: &Arc<VulkanDevice>, format: vk::Format) -> Result<RenderPass> {
    // Color attachment (the swapchain image)
    let color_attachment = vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build();
    
    // Depth attachment
    let depth_attachment = vk::AttachmentDescription::builder()
        .format(DEPTH_FORMAT)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE) // Don't need to store depth
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        .build();
    
    // Reference to color attachment
    let color_attachment_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();
    
    // Reference to depth attachment
    let depth_attachment_ref = vk::AttachmentReference::builder()
        .attachment(1)
        .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        .build();
    
    // Single subpass with color and depth
    let color_attachments = &[color_attachment_ref];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(color_attachments)
        .depth_stencil_attachment(&depth_attachment_ref)
        .build();
    
    // Subpass dependency
    let dependency = vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
        .build();
    
    let attachments = &[color_attachment, depth_attachment];
    let subpasses = &[subpass];
    let dependencies = &[dependency];
    
    let render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(attachments)
        .subpasses(subpasses)
        .dependencies(dependencies);
    
    let raw = unsafe {
        device.device.create_render_pass(&render_pass_info, None)
            .context("Failed to create render pass")?
    };
    Ok(RenderPass::from_raw(device, raw))
}

/// Create framebuffers for each swapchain image (with depth attachment)
pub fn create_framebuffers(
    device: &Arc<VulkanDevice>,
    image_views: &[vk::ImageView],
    depth_image_view: vk::ImageView,
    render_pass: &RenderPass,
    extent: vk::Extent2D,
) -> Result<Vec<Framebuffer>> {
    image_views.iter().map(|&image_view| {
        let attachments = &[image_view, depth_image_view];
        let framebuffer_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass.raw)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        
        let raw = unsafe {
            device.device.create_framebuffer(&framebuffer_info, None)
                .context("Failed to create framebuffer")?
        };
        Ok(Framebuffer::from_raw(device, raw))
    }).collect()
}

/// Vertex input description for the cube (vec4 position + vec2 uv)
pub fn get_vertex_input_info() -> (
    Vec<vk::VertexInputBindingDescription>,
    Vec<vk::VertexInputAttributeDescription>,
) {
    // One binding for interleaved position + uv data
    let binding = vk::VertexInputBindingDescription::builder()
        .binding(0)
        .stride(std::mem::size_of::<Vertex>() as u32)
        .input_rate(vk::VertexInputRate::VERTEX)
        .build();
    
    // Position attribute (location 0)
    let position_attr = vk::VertexInputAttributeDescription::builder()
        .binding(0)
        .location(0)
        .format(vk::Format::R32G32B32A32_SFLOAT)
        .offset(Vertex::POSITION_OFFSET)
        .build();
    
    // Texture coordinate attribute (location 1)
    let uv_attr = vk::VertexInputAttributeDescription::builder()
        .binding(0)
        .location(1)
        .format(vk::Format::R32G32_SFLOAT)
        .offset(Vertex::UV_OFFSET)
        .build();
    
    (vec![binding], vec![position_attr, uv_attr])
}

/// Binding 0: MVP uniform (vertex), binding 1: texture (fragment)
pub fn create_descriptor_set_layout(device: &Arc<VulkanDevice>) -> Result<DescriptorSetLayout> {
    let bindings = [
        vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .build(),
        vk::DescriptorSetLayoutBinding::builder()
            .binding(1)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            .build(),
    ];
    
    let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
    
    let raw = unsafe {
        device.device.create_descriptor_set_layout(&layout_info, None)
            .context("Failed to create descriptor set layout")?
    };
    Ok(DescriptorSetLayout::from_raw(device, raw))
}

/// Pool sized for the single set the cube uses
pub fn create_descriptor_pool(device: &Arc<VulkanDevice>) -> Result<DescriptorPool> {
    let pool_sizes = [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 1,
        },
    ];
    let pool_info = vk::DescriptorPoolCreateInfo::builder()
        .max_sets(1)
        .pool_sizes(&pool_sizes);

    let raw = unsafe {
        device.device.create_descriptor_pool(&pool_info, None)
            .context("Failed to create descriptor pool")?
    };
    Ok(DescriptorPool::from_raw(device, raw))
}

/// Allocate the set and point it at the MVP buffer and the texture
pub fn create_descriptor_set(
    device: &VulkanDevice,
    pool: &DescriptorPool,
    layout: &DescriptorSetLayout,
    uniform: &GpuBuffer,
    texture: &Texture,
) -> Result<vk::DescriptorSet> {
    let set_layouts = [layout.raw];
    let alloc_info = vk::DescriptorSetAllocateInfo::builder()
        .descriptor_pool(pool.raw)
        .set_layouts(&set_layouts);

    let sets = unsafe { device.device.allocate_descriptor_sets(&alloc_info) }
        .context("Failed to allocate descriptor set")?;
    let set = sets.first().copied().context("Driver returned no descriptor set")?;

    let buffer_info = [vk::DescriptorBufferInfo {
        buffer: uniform.buffer,
        offset: 0,
        range: uniform.size,
    }];
    let image_info = [vk::DescriptorImageInfo {
        sampler: texture.sampler.raw,
        image_view: texture.view.raw,
        image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    }];

    let writes = [
        vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_info)
            .build(),
        vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(1)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_info)
            .build(),
    ];
    unsafe { device.device.update_descriptor_sets(&writes, &[]) };

    Ok(set)
}

pub fn create_pipeline_layout(
    device: &Arc<VulkanDevice>,
    set_layout: &DescriptorSetLayout,
) -> Result<PipelineLayout> {
    let set_layouts = [set_layout.raw];
    let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
    
    let raw = unsafe {
        device.device.create_pipeline_layout(&layout_info, None)
            .context("Failed to create pipeline layout")?
    };
    Ok(PipelineLayout::from_raw(device, raw))
}

/// An empty cache; nothing is persisted between runs
fn pipeline_cache_info() -> vk::PipelineCacheCreateInfoBuilder<'static> {
    vk::PipelineCacheCreateInfo::builder()
}

pub fn create_pipeline_cache(device: &Arc<VulkanDevice>) -> Result<PipelineCache> {
    let raw = unsafe { device.device.create_pipeline_cache(&pipeline_cache_info(), None) }
        .context("Failed to create pipeline cache")?;
    Ok(PipelineCache::from_raw(device, raw))
}

/// Create the graphics pipeline for the cube.
///
/// `fragment_constants` is attached to the fragment stage; the driver copies
/// what it needs, so the block may be dropped once this returns.
pub fn create_graphics_pipeline(
    device: &Arc<VulkanDevice>,
    cache: &PipelineCache,
    render_pass: &RenderPass,
    layout: &PipelineLayout,
    extent: vk::Extent2D,
    vert_shader: vk::ShaderModule,
    frag_shader: vk::ShaderModule,
    fragment_constants: &SpecializationBlock,
) -> Result<Pipeline> {
    // Shader stages
    let entry_point = c"main";
    
    let map_entries = fragment_constants.map_entries();
    let specialization = fragment_constants.info(&map_entries);
    
    let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::VERTEX)
        .module(vert_shader)
        .name(entry_point)
        .build();
    
    let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::FRAGMENT)
        .module(frag_shader)
        .name(entry_point)
        .specialization_info(&specialization)
        .build();
    
    let shader_stages = &[vert_stage, frag_stage];
    
    // Vertex input
    let (bindings, attributes) = get_vertex_input_info();
    let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);
    
    // Input assembly
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);
    
    // Viewport and scissor
    let viewport = vk::Viewport::builder()
        .x(0.0)
        .y(0.0)
        .width(extent.width as f32)
        .height(extent.height as f32)
        .min_depth(0.0)
        .max_depth(1.0)
        .build();
    
    let scissor = vk::Rect2D::builder()
        .offset(vk::Offset2D { x: 0, y: 0 })
        .extent(extent)
        .build();
    
    let viewports = &[viewport];
    let scissors = &[scissor];
    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewports(viewports)
        .scissors(scissors);
    
    // Rasterization (both faces; depth testing sorts them out)
    let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::NONE)
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(false);
    
    // Multisampling (disabled)
    let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);
    
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
        .depth_test_enable(true)
        .depth_write_enable(true)
        .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false);
    
    // Color blending (no blending, opaque)
    let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)
        .build();
    
    let color_blend_attachments = &[color_blend_attachment];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .attachments(color_blend_attachments);
    
    // Create pipeline
    let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(shader_stages)
        .vertex_input_state(&vertex_input_info)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blending)
        .layout(layout.raw)
        .render_pass(render_pass.raw)
        .subpass(0)
        .build();
    
    let pipelines = unsafe {
        device.device.create_graphics_pipelines(
            cache.raw,
            &[pipeline_info],
            None,
        ).map_err(|(_, e)| e)
            .context("Failed to create graphics pipeline")?
    };
    
    let raw = pipelines.first().copied().context("Driver returned no pipeline")?;
    Ok(Pipeline::from_raw(device, raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_matches_shader_inputs() {
        let (bindings, attributes) = get_vertex_input_info();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].stride, 24);
        assert_eq!(attributes[0].location, 0);
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[1].location, 1);
        assert_eq!(attributes[1].offset, 16);
        assert_eq!(attributes[1].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn pipeline_cache_starts_empty() {
        let info = pipeline_cache_info();
        assert_eq!(info.initial_data_size, 0);
        assert!(info.p_initial_data.is_null());
        assert_eq!(info.s_type, vk::StructureType::PIPELINE_CACHE_CREATE_INFO);
    }
}
