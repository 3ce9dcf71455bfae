// Descriptor layout, pool and per-frame sets
//
// Binding 0: uniform buffer (vertex stage)
// Binding 1: combined image sampler (fragment stage)

use anyhow::{Context, Result};
use ash::vk;
use super::VulkanDevice;

pub const UBO_BINDING: u32 = 0;
pub const SAMPLER_BINDING: u32 = 1;

pub fn layout_bindings() -> [vk::DescriptorSetLayoutBinding; 2] {
    [
        vk::DescriptorSetLayoutBinding::builder()
            .binding(UBO_BINDING)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .build(),
        vk::DescriptorSetLayoutBinding::builder()
            .binding(SAMPLER_BINDING)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            .build(),
    ]
}

/// One uniform buffer and one sampler descriptor for each of `set_count` sets
pub fn pool_sizes(set_count: u32) -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: set_count,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: set_count,
        },
    ]
}

pub fn create_descriptor_set_layout(device: &VulkanDevice) -> Result<vk::DescriptorSetLayout> {
    let bindings = layout_bindings();
    let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

    unsafe {
        device
            .device
            .create_descriptor_set_layout(&layout_info, None)
            .context("failed to create descriptor set layout")
    }
}

pub fn create_descriptor_pool(device: &VulkanDevice, set_count: u32) -> Result<vk::DescriptorPool> {
    let sizes = pool_sizes(set_count);
    let pool_info = vk::DescriptorPoolCreateInfo::builder()
        .pool_sizes(&sizes)
        .max_sets(set_count);

    unsafe {
        device
            .device
            .create_descriptor_pool(&pool_info, None)
            .context("failed to create descriptor pool")
    }
}

/// Allocate one set per uniform buffer and point each at its buffer and the
/// shared texture.
pub fn create_descriptor_sets(
    device: &VulkanDevice,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
    uniform_buffers: &[vk::Buffer],
    ubo_range: vk::DeviceSize,
    texture_view: vk::ImageView,
    sampler: vk::Sampler,
) -> Result<Vec<vk::DescriptorSet>> {
    let layouts = vec![layout; uniform_buffers.len()];
    let alloc_info = vk::DescriptorSetAllocateInfo::builder()
        .descriptor_pool(pool)
        .set_layouts(&layouts);

    let sets = unsafe {
        device
            .device
            .allocate_descriptor_sets(&alloc_info)
            .context("failed to allocate descriptor sets")?
    };

    for (&set, &buffer) in sets.iter().zip(uniform_buffers) {
        let buffer_info = [vk::DescriptorBufferInfo {
            buffer,
            offset: 0,
            range: ubo_range,
        }];
        let image_info = [vk::DescriptorImageInfo {
            sampler,
            image_view: texture_view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }];

        let writes = [
            vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(UBO_BINDING)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&buffer_info)
                .build(),
            vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(SAMPLER_BINDING)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(&image_info)
                .build(),
        ];

        unsafe { device.device.update_descriptor_sets(&writes, &[]) };
    }

    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_bindings_match_shaders() {
        let bindings = layout_bindings();

        assert_eq!(bindings[0].binding, 0);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(bindings[0].stage_flags, vk::ShaderStageFlags::VERTEX);

        assert_eq!(bindings[1].binding, 1);
        assert_eq!(bindings[1].descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(bindings[1].stage_flags, vk::ShaderStageFlags::FRAGMENT);

        assert!(bindings.iter().all(|b| b.descriptor_count == 1));
    }

    #[test]
    fn test_pool_sizes_cover_every_frame() {
        let sizes = pool_sizes(3);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert!(sizes.iter().all(|s| s.descriptor_count == 3));
    }
}
