// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with optional validation layers
// - Window surface creation
// - Physical device selection (queue families, extensions, swapchain support)
// - Logical device + graphics/present queues
// - Memory allocator setup

use anyhow::{Context, Result};
use ash::extensions::{ext::DebugUtils, khr};
use ash::{vk, Entry};
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use parking_lot::Mutex;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::collections::BTreeSet;
use std::ffi::{CStr, CString};
use std::mem::ManuallyDrop;
use std::sync::Arc;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Device extensions the renderer cannot run without
fn required_device_extensions() -> [&'static CStr; 1] {
    [khr::Swapchain::name()]
}

/// Queue family lookup result; both families may be the same index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Scan families in order, keeping the first graphics-capable family and
    /// the first family that can present to the surface.
    pub fn find(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: impl FnMut(u32) -> Result<bool>,
    ) -> Result<Self> {
        let mut indices = Self::default();

        for (i, family) in families.iter().enumerate() {
            let i = i as u32;
            if indices.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(i);
            }
            if indices.present.is_none() && supports_present(i)? {
                indices.present = Some(i);
            }
            if indices.is_complete() {
                break;
            }
        }

        Ok(indices)
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Distinct family indices, one queue gets created per entry
    pub fn unique(&self) -> Vec<u32> {
        let set: BTreeSet<u32> = self.graphics.into_iter().chain(self.present).collect();
        set.into_iter().collect()
    }
}

/// Names in `required` that do not appear in `available`
pub fn missing_extensions<'a>(
    required: &[&'a CStr],
    available: &[vk::ExtensionProperties],
) -> Vec<&'a CStr> {
    required
        .iter()
        .copied()
        .filter(|name| {
            !available
                .iter()
                .any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == *name)
        })
        .collect()
}

/// Layers in `required` that the loader does not provide
pub fn missing_layers<'a>(required: &[&'a CStr], available: &[vk::LayerProperties]) -> Vec<&'a CStr> {
    required
        .iter()
        .copied()
        .filter(|name| {
            !available
                .iter()
                .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == *name)
        })
        .collect()
}

/// Preference order among suitable devices
pub fn device_type_score(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        _ => 1,
    }
}

/// Vulkan device wrapper with automatic cleanup.
///
/// Owns everything up to and including the logical device: instance, debug
/// messenger, window surface, queues and the memory allocator.
pub struct VulkanDevice {
    pub allocator: ManuallyDrop<Mutex<Allocator>>,
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: ash::Instance,
    _entry: Entry,

    pub surface: vk::SurfaceKHR,
    pub surface_loader: khr::Surface,

    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,
    pub present_queue: vk::Queue,
    pub present_queue_family: u32,

    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,

    pub properties: vk::PhysicalDeviceProperties,
}

impl VulkanDevice {
    /// Create the Vulkan device for a window.
    ///
    /// # Arguments
    /// * `app_name` - Application name reported to the driver
    /// * `enable_validation` - Enable Khronos validation layers
    /// * `window` - Window the surface is created for
    pub fn new<W>(app_name: &str, enable_validation: bool, window: &W) -> Result<Arc<Self>>
    where
        W: HasRawDisplayHandle + HasRawWindowHandle,
    {
        log::info!("Creating Vulkan device: {}", app_name);

        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        let display_handle = window.raw_display_handle();
        let instance = Self::create_instance(&entry, app_name, enable_validation, display_handle)?;

        let debug_utils = if enable_validation {
            Some(Self::setup_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        let surface = unsafe {
            ash_window::create_surface(
                &entry,
                &instance,
                display_handle,
                window.raw_window_handle(),
                None,
            )
        }
        .context("failed to create window surface")?;
        let surface_loader = khr::Surface::new(&entry, &instance);

        let (physical_device, families) =
            Self::pick_physical_device(&instance, &surface_loader, surface)?;
        let graphics_queue_family = families.graphics.context("graphics family missing")?;
        let present_queue_family = families.present.context("present family missing")?;

        let (device, graphics_queue, present_queue) =
            Self::create_logical_device(&instance, physical_device, &families, enable_validation)?;

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );
        log::info!(
            "Queue families: graphics={} present={}",
            graphics_queue_family,
            present_queue_family
        );

        let allocator = Self::create_allocator(&instance, physical_device, &device)?;

        Ok(Arc::new(Self {
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            device,
            physical_device,
            instance,
            _entry: entry,
            surface,
            surface_loader,
            graphics_queue,
            graphics_queue_family,
            present_queue,
            present_queue_family,
            debug_utils,
            properties,
        }))
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        enable_validation: bool,
        display_handle: raw_window_handle::RawDisplayHandle,
    ) -> Result<ash::Instance> {
        if enable_validation {
            let available = entry.enumerate_instance_layer_properties()?;
            if !missing_layers(&[VALIDATION_LAYER], &available).is_empty() {
                anyhow::bail!("validation layers requested, but not available");
            }
        }

        let app_name_cstr = CString::new(app_name)?;
        let engine_name = c"No Engine";

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        // Window-system extensions for this platform
        let window_extensions = ash_window::enumerate_required_extensions(display_handle)
            .context("Failed to query window surface extensions")?;
        let mut extensions = window_extensions.to_vec();
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let available = entry.enumerate_instance_extension_properties(None)?;
        log::info!("Available Vulkan instance extensions: {}", available.len());
        log::info!("Required window extensions: {}", window_extensions.len());

        let layer_names = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        Ok(instance)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .context("failed to set up debug messenger")?;

        Ok((debug_utils, messenger))
    }

    fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
        let devices = unsafe { instance.enumerate_physical_devices() }?;

        if devices.is_empty() {
            anyhow::bail!("No Vulkan-capable GPU found");
        }

        let mut best_device = None;
        let mut best_score = 0;

        for device in devices {
            let Some(families) = Self::check_device(instance, surface_loader, surface, device)? else {
                continue;
            };

            let props = unsafe { instance.get_physical_device_properties(device) };
            let score = device_type_score(props.device_type);
            log::debug!(
                "Suitable GPU: {} (score {})",
                unsafe { CStr::from_ptr(props.device_name.as_ptr()) }.to_string_lossy(),
                score
            );

            if score > best_score {
                best_score = score;
                best_device = Some((device, families));
            }
        }

        best_device.ok_or_else(|| anyhow::anyhow!("No suitable GPU found"))
    }

    /// Queue families of `device` if it can run the renderer, `None` otherwise
    fn check_device(
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
        device: vk::PhysicalDevice,
    ) -> Result<Option<QueueFamilyIndices>> {
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };
        let families = QueueFamilyIndices::find(&queue_families, |index| unsafe {
            Ok(surface_loader.get_physical_device_surface_support(device, index, surface)?)
        })?;
        if !families.is_complete() {
            return Ok(None);
        }

        let available = unsafe { instance.enumerate_device_extension_properties(device) }?;
        if !missing_extensions(&required_device_extensions(), &available).is_empty() {
            return Ok(None);
        }

        let formats =
            unsafe { surface_loader.get_physical_device_surface_formats(device, surface) }?;
        let present_modes =
            unsafe { surface_loader.get_physical_device_surface_present_modes(device, surface) }?;
        if formats.is_empty() || present_modes.is_empty() {
            return Ok(None);
        }

        let features = unsafe { instance.get_physical_device_features(device) };
        if features.sampler_anisotropy != vk::TRUE {
            return Ok(None);
        }

        Ok(Some(families))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        families: &QueueFamilyIndices,
        enable_validation: bool,
    ) -> Result<(ash::Device, vk::Queue, vk::Queue)> {
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<_> = families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let features = vk::PhysicalDeviceFeatures::builder().sampler_anisotropy(true);

        let extensions: Vec<_> = required_device_extensions()
            .iter()
            .map(|name| name.as_ptr())
            .collect();

        // Device layers are ignored by modern loaders but older ones still read them
        let layer_names = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .context("failed to create logical device")?;

        let graphics_family = families.graphics.context("graphics family missing")?;
        let present_family = families.present.context("present family missing")?;
        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };

        Ok((device, graphics_queue, present_queue))
    }

    fn create_allocator(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: &ash::Device,
    ) -> Result<Allocator> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .context("Failed to create memory allocator")?;

        Ok(allocator)
    }

    /// Graphics and present families differ, so swapchain images are shared
    pub fn separate_present_queue(&self) -> bool {
        self.graphics_queue_family != self.present_queue_family
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        let _ = self.wait_idle();

        unsafe {
            // Allocator frees its memory blocks through the device
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

/// Errors and warnings keep their level; info and verbose chatter go to debug
pub fn validation_log_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::Level::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::Level::Warn
    } else {
        log::Level::Debug
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    log::log!(
        validation_log_level(message_severity),
        "[Vulkan] {}",
        message.to_string_lossy()
    );

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::raw::c_char;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn name_array(name: &CStr) -> [c_char; 256] {
        let mut out = [0 as c_char; 256];
        for (dst, &src) in out.iter_mut().zip(name.to_bytes()) {
            *dst = src as c_char;
        }
        out
    }

    fn extension(name: &CStr) -> vk::ExtensionProperties {
        vk::ExtensionProperties {
            extension_name: name_array(name),
            spec_version: 1,
        }
    }

    fn layer(name: &CStr) -> vk::LayerProperties {
        vk::LayerProperties {
            layer_name: name_array(name),
            ..Default::default()
        }
    }

    #[test]
    fn test_queue_families_shared() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
        let indices = QueueFamilyIndices::find(&families, |_| Ok(true)).unwrap();

        assert!(indices.is_complete());
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(0));
        assert_eq!(indices.unique(), vec![0]);
    }

    #[test]
    fn test_queue_families_split() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
        ];
        let indices = QueueFamilyIndices::find(&families, |i| Ok(i == 2)).unwrap();

        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(2));
        assert_eq!(indices.unique(), vec![1, 2]);
    }

    #[test]
    fn test_queue_families_keep_first_match() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let mut queried = Vec::new();
        let indices = QueueFamilyIndices::find(&families, |i| {
            queried.push(i);
            Ok(true)
        })
        .unwrap();

        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(0));
        // Search stops as soon as both are known
        assert_eq!(queried, vec![0]);
    }

    #[test]
    fn test_queue_families_incomplete() {
        let families = [family(vk::QueueFlags::COMPUTE)];
        let indices = QueueFamilyIndices::find(&families, |_| Ok(true)).unwrap();
        assert!(!indices.is_complete());
        assert_eq!(indices.unique(), vec![0]);

        let indices = QueueFamilyIndices::find(&[], |_| Ok(true)).unwrap();
        assert!(indices.unique().is_empty());
    }

    #[test]
    fn test_queue_family_errors_propagate() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let result = QueueFamilyIndices::find(&families, |_| anyhow::bail!("surface lost"));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_extensions() {
        let swapchain = khr::Swapchain::name();
        let available = [extension(c"VK_KHR_maintenance1"), extension(swapchain)];
        assert!(missing_extensions(&[swapchain], &available).is_empty());

        let missing = missing_extensions(&[swapchain], &[extension(c"VK_KHR_maintenance1")]);
        assert_eq!(missing, vec![swapchain]);
    }

    #[test]
    fn test_missing_layers() {
        let available = [layer(VALIDATION_LAYER)];
        assert!(missing_layers(&[VALIDATION_LAYER], &available).is_empty());
        assert_eq!(missing_layers(&[VALIDATION_LAYER], &[]), vec![VALIDATION_LAYER]);
    }

    #[test]
    fn test_validation_message_levels() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Severity;
        assert_eq!(validation_log_level(Severity::ERROR), log::Level::Error);
        assert_eq!(validation_log_level(Severity::WARNING), log::Level::Warn);
        assert_eq!(validation_log_level(Severity::INFO), log::Level::Debug);
        assert_eq!(validation_log_level(Severity::VERBOSE), log::Level::Debug);
    }

    #[test]
    fn test_device_type_preference() {
        let discrete = device_type_score(vk::PhysicalDeviceType::DISCRETE_GPU);
        let integrated = device_type_score(vk::PhysicalDeviceType::INTEGRATED_GPU);
        let cpu = device_type_score(vk::PhysicalDeviceType::CPU);
        assert!(discrete > integrated);
        assert!(integrated > cpu);
        assert!(cpu > 0);
    }
}
