// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. The shaders are compiled ahead of time by
// build.rs (glslc) and read from disk at startup.

use anyhow::{Context, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;
use super::VulkanDevice;

/// Split SPIR-V bytes into aligned 32-bit words (byte-swapped if the magic
/// number says so)
pub fn spirv_words(code: &[u8]) -> Result<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(code)).context("Invalid SPIR-V bytecode")
}

/// Create a shader module from SPIR-V bytes
pub fn create_shader_module(device: &VulkanDevice, code: &[u8]) -> Result<vk::ShaderModule> {
    let words = spirv_words(code)?;
    let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);

    unsafe {
        device
            .device
            .create_shader_module(&create_info, None)
            .context("failed to create shader module")
    }
}

/// Read a compiled shader from disk and create its module
pub fn load_shader_module(device: &VulkanDevice, path: &Path) -> Result<vk::ShaderModule> {
    let code = std::fs::read(path)
        .with_context(|| format!("failed to open shader file {:?} (is glslc installed?)", path))?;
    log::debug!("Loaded shader {:?} ({} bytes)", path, code.len());

    create_shader_module(device, &code)
        .with_context(|| format!("while loading shader {:?}", path))
}
