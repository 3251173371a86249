// Synchronization primitives
//
// One semaphore (image acquired -> rendering) and one fence (GPU done ->
// CPU may present / read back) for the single frame this sample draws.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::handle::{Fence, Semaphore};
use super::VulkanDevice;

pub fn create_semaphore(device: &Arc<VulkanDevice>) -> Result<Semaphore> {
    let semaphore_info = vk::SemaphoreCreateInfo::builder();
    let raw = unsafe { device.device.create_semaphore(&semaphore_info, None) }
        .context("Failed to create semaphore")?;
    Ok(Semaphore::from_raw(device, raw))
}

/// Unsignaled fence
pub fn create_fence(device: &Arc<VulkanDevice>) -> Result<Fence> {
    let fence_info = vk::FenceCreateInfo::builder();
    let raw = unsafe { device.device.create_fence(&fence_info, None) }
        .context("Failed to create fence")?;
    Ok(Fence::from_raw(device, raw))
}

/// Block until `fence` signals, waiting at most `timeout_ns` per attempt.
///
/// Returns the number of attempts that timed out first.
pub fn wait_for_fence(device: &VulkanDevice, fence: vk::Fence, timeout_ns: u64) -> Result<u32> {
    poll_until_signaled(|| unsafe {
        device.device.wait_for_fences(&[fence], true, timeout_ns)
    })
}

/// Retry `wait` for as long as it reports `TIMEOUT`; any other error is fatal
pub fn poll_until_signaled<F>(mut wait: F) -> Result<u32>
where
    F: FnMut() -> Result<(), vk::Result>,
{
    let mut timeouts = 0u32;
    loop {
        match wait() {
            Ok(()) => return Ok(timeouts),
            Err(vk::Result::TIMEOUT) => {
                timeouts = timeouts.saturating_add(1);
                log::trace!("Fence wait timed out ({}), retrying", timeouts);
            }
            Err(e) => return Err(e).context("Failed waiting for fence"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signaled_immediately() {
        assert_eq!(poll_until_signaled(|| Ok(())).unwrap(), 0);
    }

    #[test]
    fn retries_through_timeouts() {
        let mut remaining = 3;
        let timeouts = poll_until_signaled(|| {
            if remaining > 0 {
                remaining -= 1;
                Err(vk::Result::TIMEOUT)
            } else {
                Ok(())
            }
        })
        .unwrap();
        assert_eq!(timeouts, 3);
    }

    #[test]
    fn device_lost_is_fatal() {
        let mut calls = 0;
        let result = poll_until_signaled(|| {
            calls += 1;
            Err(vk::Result::ERROR_DEVICE_LOST)
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
