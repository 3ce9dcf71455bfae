// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Recreated whenever the surface goes out of date (resize, fullscreen toggle).

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::vk;
use std::sync::Arc;
use super::VulkanDevice;

/// Prefer 8-bit sRGB, otherwise take whatever the surface lists first
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// Use `preferred` when available, then MAILBOX, then FIFO.
///
/// FIFO is the only mode every implementation must support.
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    [preferred, vk::PresentModeKHR::MAILBOX]
        .into_iter()
        .find(|mode| available.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// The surface dictates the extent unless it reports the `u32::MAX`
/// sentinel, in which case the framebuffer size is clamped into range.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// A swapchain may not be created with a zero-sized extent
pub fn has_area(extent: vk::Extent2D) -> bool {
    extent.width > 0 && extent.height > 0
}

/// Extent a swapchain created now would get for a `width` x `height` window
pub fn surface_extent(device: &VulkanDevice, width: u32, height: u32) -> Result<vk::Extent2D> {
    let caps = unsafe {
        device
            .surface_loader
            .get_physical_device_surface_capabilities(device.physical_device, device.surface)
    }
    .context("failed to query surface capabilities")?;
    Ok(choose_extent(&caps, width, height))
}

/// One more than the minimum; `max_image_count == 0` means unbounded
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = caps.min_image_count + 1;
    if caps.max_image_count > 0 && image_count > caps.max_image_count {
        caps.max_image_count
    } else {
        image_count
    }
}

/// Result of asking the swapchain for the next image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { index: u32, suboptimal: bool },
    /// The surface changed; the swapchain must be recreated before use
    OutOfDate,
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: khr::Swapchain,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    device: Arc<VulkanDevice>,
}

impl Swapchain {
    pub fn new(
        device: Arc<VulkanDevice>,
        width: u32,
        height: u32,
        preferred_present_mode: vk::PresentModeKHR,
    ) -> Result<Self> {
        let surface = device.surface;
        let surface_loader = &device.surface_loader;

        let surface_caps = unsafe {
            surface_loader.get_physical_device_surface_capabilities(device.physical_device, surface)
        }?;
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(device.physical_device, surface)
        }?;
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(device.physical_device, surface)
        }?;

        let surface_format = choose_surface_format(&formats).context("No suitable surface format")?;
        let present_mode = choose_present_mode(&present_modes, preferred_present_mode);
        let extent = choose_extent(&surface_caps, width, height);
        anyhow::ensure!(
            has_area(extent),
            "surface extent {}x{} has no area",
            extent.width,
            extent.height
        );
        let image_count = choose_image_count(&surface_caps);

        log::info!(
            "Creating swapchain: {}x{} {:?} {:?}",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode
        );

        let queue_family_indices = [device.graphics_queue_family, device.present_queue_family];

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        create_info = if device.separate_present_queue() {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_family_indices)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let swapchain_loader = khr::Swapchain::new(&device.instance, &device.device);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .context("failed to create swap chain")?;

        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain) }?;

        log::info!("Created swapchain with {} images", images.len());

        let image_views = images
            .iter()
            .map(|&image| create_image_view(&device, image, surface_format.format))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            swapchain,
            swapchain_loader,
            image_views,
            format: surface_format.format,
            extent,
            device,
        })
    }

    /// Acquire next image for rendering
    pub fn acquire_next_image(&self, timeout: u64, semaphore: vk::Semaphore) -> Result<AcquireOutcome> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout,
                semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, suboptimal)) => Ok(AcquireOutcome::Acquired { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(e).context("failed to acquire swap chain image"),
        }
    }

    /// Present rendered image to screen.
    ///
    /// Returns `true` when the swapchain should be recreated.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };

        match result {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(e).context("failed to present swap chain image"),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// 2D color view over a single-mip, single-layer image
pub fn create_image_view(
    device: &VulkanDevice,
    image: vk::Image,
    format: vk::Format,
) -> Result<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe {
        device
            .device
            .create_image_view(&create_info, None)
            .context("failed to create image view")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: current.0, height: current.1 },
            min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
            max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_srgb() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];

        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn test_choose_surface_format_needs_matching_color_space() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R16G16B16A16_SFLOAT,
                color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT,
            },
        ];

        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::R16G16B16A16_SFLOAT);
    }

    #[test]
    fn test_choose_surface_format_empty() {
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn test_choose_present_mode_uses_preference() {
        let modes = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
    }

    #[test]
    fn test_choose_present_mode_falls_back() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::MAILBOX
        );

        let modes = [vk::PresentModeKHR::FIFO];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(choose_present_mode(&[], vk::PresentModeKHR::MAILBOX), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let caps = caps((1920, 1080), (1, 1), (4096, 4096));
        let extent = choose_extent(&caps, 800, 600);
        assert_eq!((extent.width, extent.height), (1920, 1080));
    }

    #[test]
    fn test_choose_extent_clamps_framebuffer_size() {
        let caps = caps((u32::MAX, u32::MAX), (100, 100), (1000, 800));

        let extent = choose_extent(&caps, 800, 600);
        assert_eq!((extent.width, extent.height), (800, 600));

        let extent = choose_extent(&caps, 5000, 10);
        assert_eq!((extent.width, extent.height), (1000, 100));
    }

    #[test]
    fn test_minimized_surface_extent_has_no_area() {
        // Surface already minimized while the window still reports its old size
        let caps = caps((0, 0), (0, 0), (4096, 4096));
        let extent = choose_extent(&caps, 800, 600);
        assert!(!has_area(extent));

        assert!(!has_area(vk::Extent2D { width: 800, height: 0 }));
        assert!(has_area(vk::Extent2D { width: 1, height: 1 }));
    }

    #[test]
    fn test_choose_image_count() {
        let mut caps = caps((800, 600), (1, 1), (800, 600));
        assert_eq!(choose_image_count(&caps), 3);

        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);

        caps.max_image_count = 8;
        assert_eq!(choose_image_count(&caps), 3);
    }
}
