// Command pool and command buffer helpers

use anyhow::{Context, Result};
use ash::vk;
use super::VulkanDevice;

/// Pool on the graphics family whose buffers can be reset one at a time
pub fn create_command_pool(device: &VulkanDevice) -> Result<vk::CommandPool> {
    let pool_info = vk::CommandPoolCreateInfo::builder()
        .queue_family_index(device.graphics_queue_family)
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

    unsafe {
        device
            .device
            .create_command_pool(&pool_info, None)
            .context("failed to create command pool")
    }
}

pub fn allocate_command_buffers(
    device: &VulkanDevice,
    pool: vk::CommandPool,
    count: u32,
) -> Result<Vec<vk::CommandBuffer>> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(count);

    unsafe {
        device
            .device
            .allocate_command_buffers(&alloc_info)
            .context("failed to allocate command buffers")
    }
}

/// Record commands with `record`, submit them to the graphics queue and
/// block until they have executed.
///
/// Used for uploads during initialization; not meant for the frame loop.
pub fn submit_one_time<F>(device: &VulkanDevice, pool: vk::CommandPool, record: F) -> Result<()>
where
    F: FnOnce(&ash::Device, vk::CommandBuffer),
{
    let command_buffer = allocate_command_buffers(device, pool, 1)?[0];

    let result = (|| -> Result<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            device
                .device
                .begin_command_buffer(command_buffer, &begin_info)
                .context("failed to begin one-time command buffer")?;

            record(&device.device, command_buffer);

            device
                .device
                .end_command_buffer(command_buffer)
                .context("failed to end one-time command buffer")?;

            let command_buffers = [command_buffer];
            let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

            device
                .device
                .queue_submit(device.graphics_queue, &[submit_info.build()], vk::Fence::null())
                .context("failed to submit one-time command buffer")?;
            device.device.queue_wait_idle(device.graphics_queue)?;
        }

        Ok(())
    })();

    unsafe {
        device.device.free_command_buffers(pool, &[command_buffer]);
    }

    result
}
