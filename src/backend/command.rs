// Command pool and one-off submissions

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::handle::CommandPool;
use super::sync;
use super::VulkanDevice;

pub fn create_command_pool(device: &Arc<VulkanDevice>) -> Result<CommandPool> {
    let pool_info = vk::CommandPoolCreateInfo::builder()
        .queue_family_index(device.graphics_queue_family)
        // RESET: Allow individual buffer reset
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

    let raw = unsafe { device.device.create_command_pool(&pool_info, None) }
        .context("Failed to create command pool")?;
    Ok(CommandPool::from_raw(device, raw))
}

pub fn allocate_command_buffer(device: &VulkanDevice, pool: &CommandPool) -> Result<vk::CommandBuffer> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(pool.raw)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    let buffers = unsafe { device.device.allocate_command_buffers(&alloc_info) }
        .context("Failed to allocate command buffer")?;
    buffers.first().copied().context("Driver returned no command buffer")
}

/// Record with `record`, submit, and block until the GPU has finished
pub fn submit_and_wait<F>(
    device: &Arc<VulkanDevice>,
    pool: &CommandPool,
    fence_timeout_ns: u64,
    record: F,
) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer) -> Result<()>,
{
    let cmd = allocate_command_buffer(device, pool)?;
    let result = submit_recorded(device, cmd, fence_timeout_ns, record);
    release_command_buffer(device, pool, cmd, result)
}

/// Free `cmd` once it can no longer be pending.
///
/// After a failed submit or fence wait the buffer may still be in flight, so
/// the device is drained first. `result` is passed through unchanged.
pub fn release_command_buffer<T>(
    device: &VulkanDevice,
    pool: &CommandPool,
    cmd: vk::CommandBuffer,
    result: Result<T>,
) -> Result<T> {
    settle(
        result,
        || {
            if let Err(e) = device.wait_idle() {
                log::warn!("wait_idle failed before freeing command buffer: {:?}", e);
            }
        },
        || unsafe { device.device.free_command_buffers(pool.raw, &[cmd]) },
    )
}

fn settle<T>(result: Result<T>, drain: impl FnOnce(), free: impl FnOnce()) -> Result<T> {
    if result.is_err() {
        drain();
    }
    free();
    result
}

fn submit_recorded<F>(device: &Arc<VulkanDevice>, cmd: vk::CommandBuffer, fence_timeout_ns: u64, record: F) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer) -> Result<()>,
{
    let begin_info = vk::CommandBufferBeginInfo::builder()
        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    unsafe { device.device.begin_command_buffer(cmd, &begin_info) }?;
    record(cmd)?;
    unsafe { device.device.end_command_buffer(cmd) }?;

    let fence = sync::create_fence(device)?;
    let command_buffers = [cmd];
    let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
    unsafe {
        device.device.queue_submit(device.graphics_queue, &[submit_info.build()], fence.raw)
            .context("Failed to submit one-off commands")?;
    }
    sync::wait_for_fence(device, fence.raw, fence_timeout_ns)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn steps(result: Result<()>) -> (Vec<&'static str>, bool) {
        let log = RefCell::new(Vec::new());
        let out = settle(result, || log.borrow_mut().push("drain"), || log.borrow_mut().push("free"));
        (log.into_inner(), out.is_ok())
    }

    #[test]
    fn success_frees_without_draining() {
        assert_eq!(steps(Ok(())), (vec!["free"], true));
    }

    #[test]
    fn failure_drains_before_freeing() {
        let lost = Err(anyhow::Error::from(vk::Result::ERROR_DEVICE_LOST));
        assert_eq!(steps(lost), (vec!["drain", "free"], false));
    }
}
