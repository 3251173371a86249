// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash with safety and ergonomics. Every object
// owns its Vulkan handle and releases it on drop.

pub mod buffer;
pub mod command;
pub mod device;
pub mod handle;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use device::VulkanDevice;
pub use swapchain::Swapchain;
