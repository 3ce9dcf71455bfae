// Graphics pipeline creation and management
//
// The graphics pipeline defines how vertices are processed and rasterized.
// Viewport and scissor are dynamic so the pipeline survives swapchain resizes.

use anyhow::{Context, Result};
use ash::vk;
use std::path::Path;
use super::{shader, VulkanDevice};
use crate::geometry::Vertex;

pub const DYNAMIC_STATES: [vk::DynamicState; 2] =
    [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

/// Wait for the previous frame's color output before writing this one
pub fn subpass_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .build()
}

/// Create a render pass with a single cleared color attachment
pub fn create_render_pass(device: &VulkanDevice, format: vk::Format) -> Result<vk::RenderPass> {
    // The swapchain image
    let color_attachment = vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build();

    let color_attachment_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    let color_attachments = &[color_attachment_ref];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(color_attachments)
        .build();

    let attachments = &[color_attachment];
    let subpasses = &[subpass];
    let dependencies = &[subpass_dependency()];

    let render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(attachments)
        .subpasses(subpasses)
        .dependencies(dependencies);

    unsafe {
        device
            .device
            .create_render_pass(&render_pass_info, None)
            .context("failed to create render pass")
    }
}

/// Create one framebuffer per swapchain image view
pub fn create_framebuffers(
    device: &VulkanDevice,
    image_views: &[vk::ImageView],
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
) -> Result<Vec<vk::Framebuffer>> {
    image_views
        .iter()
        .map(|&image_view| {
            let attachments = &[image_view];
            let framebuffer_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass)
                .attachments(attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            unsafe {
                device
                    .device
                    .create_framebuffer(&framebuffer_info, None)
                    .context("failed to create framebuffer")
            }
        })
        .collect()
}

/// Create the textured-quad pipeline from SPIR-V files on disk.
///
/// The shader modules only live for the duration of this call.
pub fn create_graphics_pipeline(
    device: &VulkanDevice,
    render_pass: vk::RenderPass,
    descriptor_set_layout: vk::DescriptorSetLayout,
    vert_path: &Path,
    frag_path: &Path,
) -> Result<(vk::Pipeline, vk::PipelineLayout)> {
    let vert_shader = shader::load_shader_module(device, vert_path)?;
    let frag_shader = match shader::load_shader_module(device, frag_path) {
        Ok(module) => module,
        Err(e) => {
            unsafe { device.device.destroy_shader_module(vert_shader, None) };
            return Err(e);
        }
    };

    let result = build_pipeline(device, render_pass, descriptor_set_layout, vert_shader, frag_shader);

    unsafe {
        device.device.destroy_shader_module(frag_shader, None);
        device.device.destroy_shader_module(vert_shader, None);
    }

    result
}

fn build_pipeline(
    device: &VulkanDevice,
    render_pass: vk::RenderPass,
    descriptor_set_layout: vk::DescriptorSetLayout,
    vert_shader: vk::ShaderModule,
    frag_shader: vk::ShaderModule,
) -> Result<(vk::Pipeline, vk::PipelineLayout)> {
    let entry_point = c"main";

    let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::VERTEX)
        .module(vert_shader)
        .name(entry_point)
        .build();

    let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::FRAGMENT)
        .module(frag_shader)
        .name(entry_point)
        .build();

    let shader_stages = &[vert_stage, frag_stage];

    // Vertex input
    let bindings = [Vertex::binding_description()];
    let attributes = Vertex::attribute_descriptions();
    let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    // Viewport and scissor are set while recording
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&DYNAMIC_STATES);
    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewport_count(1)
        .scissor_count(1);

    let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .depth_bias_enable(false);

    let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    // Opaque, no blending
    let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)
        .build();

    let color_blend_attachments = &[color_blend_attachment];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .attachments(color_blend_attachments);

    let set_layouts = &[descriptor_set_layout];
    let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(set_layouts);

    let pipeline_layout = unsafe {
        device
            .device
            .create_pipeline_layout(&layout_info, None)
            .context("failed to create pipeline layout")?
    };

    let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(shader_stages)
        .vertex_input_state(&vertex_input_info)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .color_blend_state(&color_blending)
        .dynamic_state(&dynamic_state)
        .layout(pipeline_layout)
        .render_pass(render_pass)
        .subpass(0)
        .build();

    let pipelines = unsafe {
        device
            .device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
            .map_err(|(_, e)| e)
    };

    match pipelines {
        Ok(pipelines) => Ok((pipelines[0], pipeline_layout)),
        Err(e) => {
            unsafe { device.device.destroy_pipeline_layout(pipeline_layout, None) };
            Err(e).context("failed to create graphics pipeline")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_and_scissor_are_dynamic() {
        assert!(DYNAMIC_STATES.contains(&vk::DynamicState::VIEWPORT));
        assert!(DYNAMIC_STATES.contains(&vk::DynamicState::SCISSOR));
    }

    #[test]
    fn test_subpass_dependency_orders_color_writes() {
        let dep = subpass_dependency();
        assert_eq!(dep.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dep.dst_subpass, 0);
        assert_eq!(dep.src_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(dep.dst_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(dep.dst_access_mask, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
    }
}
