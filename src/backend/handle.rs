// Owned device handles
//
// Each wrapper keeps the device alive and destroys its handle on drop, so a
// failure halfway through setup still releases everything created so far.
// Struct fields drop in declaration order: list dependents before what
// they depend on.

use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;

macro_rules! owned_handle {
    ($(#[$meta:meta])* $name:ident, $raw:ty, $destroy:ident) => {
        $(#[$meta])*
        pub struct $name {
            pub raw: $raw,
            device: Arc<VulkanDevice>,
        }

        impl $name {
            /// Take ownership of `raw`; it is destroyed when this value drops
            pub fn from_raw(device: &Arc<VulkanDevice>, raw: $raw) -> Self {
                Self { raw, device: device.clone() }
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                unsafe { self.device.device.$destroy(self.raw, None) };
            }
        }
    };
}

owned_handle!(RenderPass, vk::RenderPass, destroy_render_pass);
owned_handle!(Framebuffer, vk::Framebuffer, destroy_framebuffer);
owned_handle!(Pipeline, vk::Pipeline, destroy_pipeline);
owned_handle!(PipelineCache, vk::PipelineCache, destroy_pipeline_cache);
owned_handle!(PipelineLayout, vk::PipelineLayout, destroy_pipeline_layout);
owned_handle!(DescriptorSetLayout, vk::DescriptorSetLayout, destroy_descriptor_set_layout);
owned_handle!(
    /// Destroying the pool frees its sets
    DescriptorPool, vk::DescriptorPool, destroy_descriptor_pool
);
owned_handle!(ShaderModule, vk::ShaderModule, destroy_shader_module);
owned_handle!(Sampler, vk::Sampler, destroy_sampler);
owned_handle!(ImageView, vk::ImageView, destroy_image_view);
owned_handle!(
    /// Destroying the pool frees its command buffers
    CommandPool, vk::CommandPool, destroy_command_pool
);
owned_handle!(Fence, vk::Fence, destroy_fence);
owned_handle!(Semaphore, vk::Semaphore, destroy_semaphore);
