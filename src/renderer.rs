// =============================================================================
// RENDERER - Vulkan resources and the per-frame draw routine
// =============================================================================
//
// CREATION ORDER:
//   device (instance, surface, queues) -> swapchain -> render pass
//   -> descriptor set layout -> pipeline -> framebuffers -> command pool
//   -> texture -> vertex/index buffers -> uniform buffers
//   -> descriptor pool/sets -> command buffers -> sync objects
//
// Drop tears everything down in reverse; the device goes last.
//
// FRAME FLOW:
//   wait fence -> acquire image -> update UBO -> reset fence -> record
//   -> submit -> present -> advance frame slot

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::backend::buffer::{self, GpuBuffer};
use crate::backend::swapchain::AcquireOutcome;
use crate::backend::sync::{FrameCycle, FrameSync};
use crate::backend::texture::Texture;
use crate::backend::{command, descriptor, pipeline, swapchain, Swapchain, VulkanDevice};
use crate::config::{Config, SceneConfig};
use crate::geometry::{UniformBufferObject, QUAD_INDICES, QUAD_VERTICES};

/// What `draw_frame` does before waiting on the frame fence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStart {
    /// The window has no area
    Skip,
    /// Rebuild the swapchain first, then render
    Recreate,
    Render,
}

pub fn frame_start(size: (u32, u32), has_swapchain: bool, resize_pending: bool) -> FrameStart {
    if size.0 == 0 || size.1 == 0 {
        FrameStart::Skip
    } else if !has_swapchain || resize_pending {
        FrameStart::Recreate
    } else {
        FrameStart::Render
    }
}

/// Image to render into, or `None` when the swapchain is out of date and the
/// frame must be abandoned before its fence is reset.
///
/// A suboptimal image is still rendered; the rebuild happens after present.
pub fn acquired_image(outcome: AcquireOutcome) -> Option<u32> {
    match outcome {
        AcquireOutcome::Acquired { index, suboptimal } => {
            if suboptimal {
                log::debug!("Acquired suboptimal swapchain image {}", index);
            }
            Some(index)
        }
        AcquireOutcome::OutOfDate => None,
    }
}

/// Present reported out-of-date/suboptimal, or the window changed size
pub fn recreate_after_present(present_wants_recreate: bool, resize_pending: bool) -> bool {
    present_wants_recreate || resize_pending
}

/// Owner of every Vulkan object the demo creates.
///
/// Handles are plain values; `Drop` destroys them in reverse creation order.
pub struct Renderer {
    // Swapchain-dependent, rebuilt on resize
    swapchain: Option<Swapchain>,
    framebuffers: Vec<vk::Framebuffer>,

    render_pass: vk::RenderPass,
    descriptor_set_layout: vk::DescriptorSetLayout,
    pipeline_layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,

    command_pool: vk::CommandPool,
    /// One per frame in flight, re-recorded every frame
    command_buffers: Vec<vk::CommandBuffer>,

    texture: Texture,
    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
    uniform_buffers: Vec<GpuBuffer>,

    descriptor_pool: vk::DescriptorPool,
    descriptor_sets: Vec<vk::DescriptorSet>,

    frame_sync: Vec<FrameSync>,
    frames: FrameCycle,

    clear_color: [f32; 4],
    present_mode: vk::PresentModeKHR,
    scene: SceneConfig,
    start_time: Instant,

    /// Set by the window layer; the swapchain is rebuilt before the next frame
    pub framebuffer_resized: bool,

    device: Arc<VulkanDevice>,
}

impl Renderer {
    /// Initialize all Vulkan resources for `window`.
    pub fn new<W>(window: &W, size: (u32, u32), config: &Config) -> Result<Self>
    where
        W: HasRawDisplayHandle + HasRawWindowHandle,
    {
        log::info!("Initializing Vulkan...");

        let enable_validation = cfg!(debug_assertions) && config.debug.validation_layers;
        let device = VulkanDevice::new(&config.window.title, enable_validation, window)?;

        let present_mode = config.get_present_mode();
        let swapchain = Swapchain::new(device.clone(), size.0, size.1, present_mode)?;

        let render_pass = pipeline::create_render_pass(&device, swapchain.format)?;
        let descriptor_set_layout = descriptor::create_descriptor_set_layout(&device)?;
        let (pipeline, pipeline_layout) = pipeline::create_graphics_pipeline(
            &device,
            render_pass,
            descriptor_set_layout,
            &config.assets.vertex_shader,
            &config.assets.fragment_shader,
        )?;
        let framebuffers = pipeline::create_framebuffers(
            &device,
            &swapchain.image_views,
            render_pass,
            swapchain.extent,
        )?;

        let command_pool = command::create_command_pool(&device)?;

        let texture = Texture::load(&device, command_pool, &config.assets.texture)?;

        let vertex_buffer = buffer::create_device_local_buffer(
            &device,
            command_pool,
            "vertex buffer",
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &QUAD_VERTICES,
        )?;
        let index_buffer = buffer::create_device_local_buffer(
            &device,
            command_pool,
            "index buffer",
            vk::BufferUsageFlags::INDEX_BUFFER,
            &QUAD_INDICES,
        )?;

        let frames = FrameCycle::new(config.frames_in_flight());
        let frame_count = frames.frames_in_flight();

        let uniform_buffers = buffer::create_uniform_buffers(
            &device,
            UniformBufferObject::SIZE as vk::DeviceSize,
            frame_count,
        )?;

        let descriptor_pool = descriptor::create_descriptor_pool(&device, frame_count as u32)?;
        let uniform_handles: Vec<_> = uniform_buffers.iter().map(|b| b.buffer).collect();
        let descriptor_sets = descriptor::create_descriptor_sets(
            &device,
            descriptor_pool,
            descriptor_set_layout,
            &uniform_handles,
            UniformBufferObject::SIZE as vk::DeviceSize,
            texture.view,
            texture.sampler,
        )?;

        let command_buffers =
            command::allocate_command_buffers(&device, command_pool, frame_count as u32)?;

        let frame_sync = (0..frame_count)
            .map(|_| FrameSync::new(&device))
            .collect::<Result<Vec<_>>>()?;

        log::info!("Vulkan initialized with {} frames in flight", frame_count);

        Ok(Self {
            swapchain: Some(swapchain),
            framebuffers,
            render_pass,
            descriptor_set_layout,
            pipeline_layout,
            pipeline,
            command_pool,
            command_buffers,
            texture,
            vertex_buffer,
            index_buffer,
            uniform_buffers,
            descriptor_pool,
            descriptor_sets,
            frame_sync,
            frames,
            clear_color: config.graphics.clear_color,
            present_mode,
            scene: config.scene.clone(),
            start_time: Instant::now(),
            framebuffer_resized: false,
            device,
        })
    }

    // =========================================================================
    // SWAPCHAIN RECREATION
    // =========================================================================

    /// Rebuild the swapchain, its views and framebuffers for a new size.
    ///
    /// Returns `false` and leaves the resize pending while either the window
    /// or the surface has no area (minimized).
    pub fn recreate_swapchain(&mut self, size: (u32, u32)) -> Result<bool> {
        if size.0 == 0 || size.1 == 0 {
            self.framebuffer_resized = true;
            return Ok(false);
        }

        let extent = swapchain::surface_extent(&self.device, size.0, size.1)?;
        if !swapchain::has_area(extent) {
            log::debug!("Surface extent is {}x{}, deferring swapchain rebuild", extent.width, extent.height);
            self.framebuffer_resized = true;
            return Ok(false);
        }

        self.device.wait_idle()?;

        self.destroy_swapchain_resources();

        let swapchain = Swapchain::new(self.device.clone(), size.0, size.1, self.present_mode)?;
        self.framebuffers = pipeline::create_framebuffers(
            &self.device,
            &swapchain.image_views,
            self.render_pass,
            swapchain.extent,
        )?;
        self.swapchain = Some(swapchain);
        self.framebuffer_resized = false;

        Ok(true)
    }

    fn destroy_swapchain_resources(&mut self) {
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.device.device.destroy_framebuffer(framebuffer, None);
            }
        }
        self.framebuffers.clear();
        // Views and the swapchain itself go with the Drop impl
        self.swapchain = None;
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    /// Render a single frame at the given framebuffer size.
    ///
    /// Returns `Ok(false)` when nothing was presented (minimized window or a
    /// swapchain that had to be rebuilt first).
    pub fn draw_frame(&mut self, size: (u32, u32)) -> Result<bool> {
        match frame_start(size, self.swapchain.is_some(), self.framebuffer_resized) {
            FrameStart::Skip => return Ok(false),
            FrameStart::Recreate => {
                if !self.recreate_swapchain(size)? {
                    return Ok(false);
                }
            }
            FrameStart::Render => {}
        }

        let frame = self.frames.current();
        let sync = self.frame_sync[frame];

        // Wait until the GPU is done with this slot's command buffer and UBO
        unsafe {
            self.device
                .device
                .wait_for_fences(&[sync.in_flight_fence], true, u64::MAX)
                .context("failed to wait for in-flight fence")?;
        }

        let swapchain = self.swapchain.as_ref().context("Swapchain not initialized")?;
        let outcome = swapchain.acquire_next_image(u64::MAX, sync.image_available)?;
        let Some(image_index) = acquired_image(outcome) else {
            // Fence is still signaled, so the next attempt won't block
            self.recreate_swapchain(size)?;
            return Ok(false);
        };
        let extent = swapchain.extent;

        self.update_uniform_buffer(frame, extent)?;

        let cmd = self.command_buffers[frame];
        unsafe {
            self.device
                .device
                .reset_fences(&[sync.in_flight_fence])
                .context("failed to reset in-flight fence")?;
            self.device
                .device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
        }
        self.record_command_buffer(cmd, image_index, frame, extent)?;

        let wait_semaphores = [sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [sync.render_finished];
        let command_buffers = [cmd];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .device
                .queue_submit(
                    self.device.graphics_queue,
                    &[submit_info.build()],
                    sync.in_flight_fence,
                )
                .context("failed to submit draw command buffer")?;
        }

        let swapchain = self.swapchain.as_ref().context("Swapchain not initialized")?;
        let needs_recreate = swapchain.present(
            self.device.present_queue,
            image_index,
            &signal_semaphores,
        )?;

        if recreate_after_present(needs_recreate, self.framebuffer_resized) {
            log::debug!("Recreating swapchain for {}x{}", size.0, size.1);
            self.recreate_swapchain(size)?;
        }

        self.frames.advance();

        Ok(true)
    }

    fn update_uniform_buffer(&mut self, frame: usize, extent: vk::Extent2D) -> Result<()> {
        let elapsed = self.start_time.elapsed().as_secs_f32();
        let ubo = UniformBufferObject::animated(elapsed, extent, &self.scene);
        self.uniform_buffers[frame].write(std::slice::from_ref(&ubo))
    }

    fn record_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        image_index: u32,
        frame: usize,
        extent: vk::Extent2D,
    ) -> Result<()> {
        let device = &self.device.device;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }];

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.render_pass)
            .framebuffer(self.framebuffers[image_index as usize])
            .render_area(render_area)
            .clear_values(&clear_values);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            let begin_info = vk::CommandBufferBeginInfo::builder();
            device
                .begin_command_buffer(cmd, &begin_info)
                .context("failed to begin recording command buffer")?;

            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);

            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(cmd, 0, &[render_area]);

            device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer], &[0]);
            device.cmd_bind_index_buffer(cmd, self.index_buffer.buffer, 0, vk::IndexType::UINT16);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout,
                0,
                &[self.descriptor_sets[frame]],
                &[],
            );

            device.cmd_draw_indexed(cmd, QUAD_INDICES.len() as u32, 1, 0, 0, 0);
            device.cmd_end_render_pass(cmd);

            device
                .end_command_buffer(cmd)
                .context("failed to record command buffer")?;
        }

        Ok(())
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        let _ = self.device.wait_idle();

        self.destroy_swapchain_resources();

        let device = self.device.clone();
        self.texture.destroy(&device);

        unsafe {
            device.device.destroy_pipeline(self.pipeline, None);
            device.device.destroy_pipeline_layout(self.pipeline_layout, None);
            device.device.destroy_render_pass(self.render_pass, None);
        }

        for buffer in &mut self.uniform_buffers {
            buffer.destroy(&device);
        }

        unsafe {
            device.device.destroy_descriptor_pool(self.descriptor_pool, None);
            device
                .device
                .destroy_descriptor_set_layout(self.descriptor_set_layout, None);
        }

        self.index_buffer.destroy(&device);
        self.vertex_buffer.destroy(&device);

        for sync in &self.frame_sync {
            sync.destroy(&device.device);
        }

        // Also frees the command buffers
        unsafe { device.device.destroy_command_pool(self.command_pool, None) };

        log::info!("Cleanup complete");
        // The device (and with it surface and instance) drops with the last Arc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimized_window_skips_frame() {
        assert_eq!(frame_start((0, 0), true, false), FrameStart::Skip);
        assert_eq!(frame_start((800, 0), true, false), FrameStart::Skip);
        // A pending resize waits until the window has area again
        assert_eq!(frame_start((0, 600), true, true), FrameStart::Skip);
    }

    #[test]
    fn test_pending_resize_rebuilds_before_rendering() {
        assert_eq!(frame_start((1024, 768), true, true), FrameStart::Recreate);
        assert_eq!(frame_start((1024, 768), false, false), FrameStart::Recreate);
        assert_eq!(frame_start((800, 600), true, false), FrameStart::Render);
    }

    #[test]
    fn test_out_of_date_acquire_abandons_frame() {
        assert_eq!(acquired_image(AcquireOutcome::OutOfDate), None);
    }

    #[test]
    fn test_suboptimal_acquire_still_renders() {
        let outcome = AcquireOutcome::Acquired { index: 2, suboptimal: true };
        assert_eq!(acquired_image(outcome), Some(2));

        let outcome = AcquireOutcome::Acquired { index: 0, suboptimal: false };
        assert_eq!(acquired_image(outcome), Some(0));
    }

    #[test]
    fn test_recreate_after_present() {
        assert!(recreate_after_present(true, false));
        assert!(recreate_after_present(false, true));
        assert!(recreate_after_present(true, true));
        assert!(!recreate_after_present(false, false));
    }
}
