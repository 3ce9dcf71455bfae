// Backend module - Vulkan abstraction layer
//
// Thin wrappers around ash: each module creates one kind of Vulkan object
// and knows how to destroy it.

pub mod buffer;
pub mod cleanup;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use device::VulkanDevice;
pub use swapchain::Swapchain;
