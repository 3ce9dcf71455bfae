// Synchronization primitives
//
// Fences and semaphores for GPU-CPU and GPU-GPU sync, one set per frame in flight

use ash::vk;
use anyhow::{Context, Result};
use super::cleanup::release_on_err;
use super::VulkanDevice;

/// Frame synchronization - one per frame in flight
#[derive(Debug, Clone, Copy)]
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &VulkanDevice) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Signaled so the very first wait on this slot returns immediately
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        let device = &device.device;

        let image_available = unsafe { device.create_semaphore(&semaphore_info, None) }
            .context("failed to create semaphore")?;

        let render_finished = release_on_err(
            unsafe { device.create_semaphore(&semaphore_info, None) },
            || unsafe { device.destroy_semaphore(image_available, None) },
        )
        .context("failed to create semaphore")?;

        let in_flight_fence = release_on_err(
            unsafe { device.create_fence(&fence_info, None) },
            || unsafe {
                device.destroy_semaphore(render_finished, None);
                device.destroy_semaphore(image_available, None);
            },
        )
        .context("failed to create fence")?;

        Ok(Self {
            image_available,
            render_finished,
            in_flight_fence,
        })
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight_fence, None);
        }
    }
}

/// Which frame-in-flight slot the CPU is currently preparing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCycle {
    current: usize,
    frames_in_flight: usize,
}

impl FrameCycle {
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            current: 0,
            frames_in_flight: frames_in_flight.max(1),
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Move to the next slot, wrapping around
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.frames_in_flight;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_cycle_wraps() {
        let mut cycle = FrameCycle::new(2);
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(cycle.current());
            cycle.advance();
        }
        assert_eq!(seen, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_frame_cycle_single_slot() {
        let mut cycle = FrameCycle::new(1);
        cycle.advance();
        cycle.advance();
        assert_eq!(cycle.current(), 0);
    }

    #[test]
    fn test_frame_cycle_clamps_zero() {
        let mut cycle = FrameCycle::new(0);
        assert_eq!(cycle.frames_in_flight(), 1);
        cycle.advance();
        assert_eq!(cycle.current(), 0);
    }

    #[test]
    fn test_frame_sync_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FrameSync>();
    }
}
