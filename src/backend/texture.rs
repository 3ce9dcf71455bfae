// Texture loading - image file to sampled GPU image
//
// Upload path: decode to RGBA8 -> staging buffer -> transition to
// TRANSFER_DST -> buffer-to-image copy -> transition to SHADER_READ_ONLY.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::path::Path;
use super::buffer::{free_allocation, GpuBuffer};
use super::cleanup::{keep_or_release, release_on_err};
use super::swapchain::create_image_view;
use super::{command, VulkanDevice};

pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Access masks and pipeline stages for an image layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Barrier parameters for the transitions a texture upload needs
pub fn layout_transition(old: vk::ImageLayout, new: vk::ImageLayout) -> Result<LayoutTransition> {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok(LayoutTransition {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        }),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok(LayoutTransition {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            })
        }
        _ => anyhow::bail!("unsupported layout transition: {:?} -> {:?}", old, new),
    }
}

/// Decoded RGBA8 pixels
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    pub fn load(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("failed to load texture image {:?}", path))?;
        Ok(Self::from_image(image))
    }

    pub fn from_image(image: image::DynamicImage) -> Self {
        let rgba = image.into_rgba8();
        let (width, height) = rgba.dimensions();
        Self {
            width,
            height,
            pixels: rgba.into_raw(),
        }
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.width as vk::DeviceSize * self.height as vk::DeviceSize * 4
    }
}

/// Sampled 2D texture: image, memory, view and sampler
pub struct Texture {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
    pub extent: vk::Extent2D,
    allocation: Option<Allocation>,
}

impl Texture {
    pub fn load(device: &VulkanDevice, command_pool: vk::CommandPool, path: &Path) -> Result<Self> {
        let data = TextureData::load(path)?;
        log::info!("Loaded texture {:?}: {}x{}", path, data.width, data.height);
        Self::from_data(device, command_pool, &data)
    }

    pub fn from_data(
        device: &VulkanDevice,
        command_pool: vk::CommandPool,
        data: &TextureData,
    ) -> Result<Self> {
        let mut staging = GpuBuffer::new(
            device,
            "texture staging",
            data.size(),
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
        )?;

        let result = staging
            .write(&data.pixels)
            .and_then(|()| Self::create_image(device, data.width, data.height))
            .and_then(|(image, allocation)| {
                let mut texture = Self {
                    image,
                    view: vk::ImageView::null(),
                    sampler: vk::Sampler::null(),
                    extent: vk::Extent2D {
                        width: data.width,
                        height: data.height,
                    },
                    allocation: Some(allocation),
                };

                match texture.finish_upload(device, command_pool, staging.buffer) {
                    Ok(()) => Ok(texture),
                    Err(e) => {
                        texture.destroy(device);
                        Err(e)
                    }
                }
            });

        staging.destroy(device);
        result
    }

    fn create_image(device: &VulkanDevice, width: u32, height: u32) -> Result<(vk::Image, Allocation)> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(TEXTURE_FORMAT)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe {
            device
                .device
                .create_image(&image_info, None)
                .context("failed to create image")?
        };

        let requirements = unsafe { device.device.get_image_memory_requirements(image) };

        let allocation = device.allocator.lock().allocate(&AllocationCreateDesc {
            name: "texture",
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = release_on_err(allocation, || unsafe {
            device.device.destroy_image(image, None)
        })
        .context("failed to allocate image memory")?;

        let bound = unsafe {
            device
                .device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        let allocation = keep_or_release(bound, allocation, |allocation| {
            unsafe { device.device.destroy_image(image, None) };
            free_allocation(device, allocation);
        })
        .context("failed to bind image memory")?;

        Ok((image, allocation))
    }

    /// Copy pixels in and create the view and sampler
    fn finish_upload(
        &mut self,
        device: &VulkanDevice,
        command_pool: vk::CommandPool,
        staging: vk::Buffer,
    ) -> Result<()> {
        transition_image_layout(
            device,
            command_pool,
            self.image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        copy_buffer_to_image(device, command_pool, staging, self.image, self.extent)?;
        transition_image_layout(
            device,
            command_pool,
            self.image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;

        self.view = create_image_view(device, self.image, TEXTURE_FORMAT)?;
        self.sampler = create_sampler(device)?;

        Ok(())
    }

    pub fn destroy(&mut self, device: &VulkanDevice) {
        unsafe {
            if self.sampler != vk::Sampler::null() {
                device.device.destroy_sampler(self.sampler, None);
            }
            if self.view != vk::ImageView::null() {
                device.device.destroy_image_view(self.view, None);
            }
            device.device.destroy_image(self.image, None);
        }
        if let Some(allocation) = self.allocation.take() {
            free_allocation(device, allocation);
        }
    }
}

/// Record and run a layout transition barrier over the whole color image
pub fn transition_image_layout(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<()> {
    let transition = layout_transition(old_layout, new_layout)?;

    let barrier = vk::ImageMemoryBarrier::builder()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .src_access_mask(transition.src_access)
        .dst_access_mask(transition.dst_access)
        .build();

    command::submit_one_time(device, command_pool, |d, cmd| unsafe {
        d.cmd_pipeline_barrier(
            cmd,
            transition.src_stage,
            transition.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    })
}

/// Copy tightly packed pixels from a buffer into mip 0 of an image
pub fn copy_buffer_to_image(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    buffer: vk::Buffer,
    image: vk::Image,
    extent: vk::Extent2D,
) -> Result<()> {
    let region = vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        },
        image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
        image_extent: vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        },
    };

    command::submit_one_time(device, command_pool, |d, cmd| unsafe {
        d.cmd_copy_buffer_to_image(
            cmd,
            buffer,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
    })
}

/// Linear, repeating sampler at the device's maximum anisotropy
pub fn create_sampler(device: &VulkanDevice) -> Result<vk::Sampler> {
    let sampler_info = sampler_create_info(device.properties.limits.max_sampler_anisotropy);

    unsafe {
        device
            .device
            .create_sampler(&sampler_info, None)
            .context("failed to create texture sampler")
    }
}

fn sampler_create_info(max_anisotropy: f32) -> vk::SamplerCreateInfo {
    vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(true)
        .max_anisotropy(max_anisotropy)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(0.0)
        .build()
}
