// Buffer utilities for vertex, index, staging and uniform buffers
//
// Memory comes from the device's gpu-allocator instance. Host-visible
// allocations stay mapped for their whole lifetime.

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::Pod;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use super::cleanup::{keep_or_release, release_on_err};
use super::{command, VulkanDevice};

/// A buffer together with the memory backing it
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
    allocation: Option<Allocation>,
}

impl GpuBuffer {
    /// Create a buffer and bind freshly allocated memory to it
    pub fn new(
        device: &VulkanDevice,
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
            device
                .device
                .create_buffer(&buffer_info, None)
                .with_context(|| format!("failed to create buffer '{}'", name))?
        };

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let allocation = device
            .allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            });
        let allocation = release_on_err(allocation, || unsafe {
            device.device.destroy_buffer(buffer, None)
        })
        .with_context(|| format!("failed to allocate buffer memory for '{}'", name))?;

        let bound = unsafe {
            device
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        let allocation = keep_or_release(bound, allocation, |allocation| {
            unsafe { device.device.destroy_buffer(buffer, None) };
            free_allocation(device, allocation);
        })
        .context("failed to bind buffer memory")?;

        Ok(Self {
            buffer,
            size,
            allocation: Some(allocation),
        })
    }

    /// Copy `data` to the start of a host-visible buffer
    pub fn write<T: Pod>(&mut self, data: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let mapped = self
            .allocation
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .context("buffer memory is not host visible")?;

        ensure_fits(bytes.len(), self.size)?;
        mapped[..bytes.len()].copy_from_slice(bytes);

        Ok(())
    }

    pub fn destroy(&mut self, device: &VulkanDevice) {
        unsafe { device.device.destroy_buffer(self.buffer, None) };
        if let Some(allocation) = self.allocation.take() {
            free_allocation(device, allocation);
        }
    }
}

/// Writes may not run past the size the buffer was created with
pub fn ensure_fits(len: usize, size: vk::DeviceSize) -> Result<()> {
    anyhow::ensure!(
        len as vk::DeviceSize <= size,
        "write of {} bytes exceeds buffer of {} bytes",
        len,
        size
    );
    Ok(())
}

/// Return memory to the device allocator; failures are logged
pub fn free_allocation(device: &VulkanDevice, allocation: Allocation) {
    if let Err(e) = device.allocator.lock().free(allocation) {
        log::error!("Failed to free GPU memory: {}", e);
    }
}

/// Upload `data` into a new device-local buffer through a staging buffer
pub fn create_device_local_buffer<T: Pod>(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    name: &str,
    usage: vk::BufferUsageFlags,
    data: &[T],
) -> Result<GpuBuffer> {
    let size = std::mem::size_of_val(data) as vk::DeviceSize;

    let mut staging = GpuBuffer::new(
        device,
        &format!("{} staging", name),
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryLocation::CpuToGpu,
    )?;

    let result = staging.write(data).and_then(|()| {
        let mut buffer = GpuBuffer::new(
            device,
            name,
            size,
            vk::BufferUsageFlags::TRANSFER_DST | usage,
            MemoryLocation::GpuOnly,
        )?;

        if let Err(e) = copy_buffer(device, command_pool, staging.buffer, buffer.buffer, size) {
            buffer.destroy(device);
            return Err(e);
        }

        Ok(buffer)
    });

    staging.destroy(device);
    result
}

/// Copy `size` bytes between buffers and wait for completion
pub fn copy_buffer(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    src: vk::Buffer,
    dst: vk::Buffer,
    size: vk::DeviceSize,
) -> Result<()> {
    command::submit_one_time(device, command_pool, |d, cmd| {
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        unsafe { d.cmd_copy_buffer(cmd, src, dst, &[region]) };
    })
}

/// One host-visible uniform buffer per frame in flight
pub fn create_uniform_buffers(
    device: &VulkanDevice,
    size: vk::DeviceSize,
    count: usize,
) -> Result<Vec<GpuBuffer>> {
    (0..count)
        .map(|i| {
            GpuBuffer::new(
                device,
                &format!("uniform buffer {}", i),
                size,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                MemoryLocation::CpuToGpu,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::UniformBufferObject;

    #[test]
    fn test_uniform_block_fits_uniform_buffer() {
        let size = UniformBufferObject::SIZE as vk::DeviceSize;
        assert!(ensure_fits(UniformBufferObject::SIZE, size).is_ok());
        assert!(ensure_fits(0, size).is_ok());
    }

    #[test]
    fn test_oversized_write_rejected() {
        // Allocations may be rounded up, the buffer's own size is the limit
        let err = ensure_fits(200, 192).unwrap_err();
        assert!(err.to_string().contains("exceeds buffer of 192 bytes"));
    }
}
