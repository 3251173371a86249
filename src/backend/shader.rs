// Shader module creation
//
// Vulkan consumes SPIR-V as 32-bit words. Where the words come from
// (front end or assembler) is decided in `crate::shader`.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::handle::ShaderModule;
use super::VulkanDevice;

/// Create a shader module from SPIR-V words
pub fn create_shader_module(device: &Arc<VulkanDevice>, code: &[u32]) -> Result<ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

    let raw = unsafe {
        device.device.create_shader_module(&create_info, None)
            .context("Failed to create shader module")?
    };
    Ok(ShaderModule::from_raw(device, raw))
}
