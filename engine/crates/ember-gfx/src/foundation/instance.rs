use std::{
    ffi::{CStr, CString, c_char},
    rc::Rc,
};

use ash::vk;
use itertools::Itertools;
use raw_window_handle::RawDisplayHandle;

use crate::{
    error::{GfxError, GfxResult},
    foundation::{debug_messenger::GfxDebugMessenger, physical_device::GfxPhysicalDevice},
    settings::GfxSettings,
    vk_check,
};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan instance，持有 loader 的函数表
///
/// 所有 [`GfxPhysicalDevice`] 都持有 `Rc<GfxInstance>`，因此 instance 一定是最后销毁的。
pub struct GfxInstance {
    entry: ash::Entry,
    handle: ash::Instance,
    surface_loader: ash::khr::surface::Instance,

    api_version: u32,
    enabled_extensions: Vec<CString>,
    enabled_layers: Vec<CString>,
    available_extensions: Vec<CString>,
    available_layers: Vec<CString>,

    debug_messenger: Option<GfxDebugMessenger>,
}

// new & init
impl GfxInstance {
    /// 加载 loader，协商 layers 和 extensions，创建 vk instance
    ///
    /// `display` 不为空时，会启用创建 surface 所需的 extensions
    pub fn new(settings: &GfxSettings, display: Option<RawDisplayHandle>) -> GfxResult<Rc<Self>> {
        let _span = tracy_client::span!("GfxInstance::new");

        let entry = unsafe { ash::Entry::load()? };

        let loader_version = vk_check!(unsafe { entry.try_enumerate_instance_version() })?;
        let api_version = negotiate_api_version(loader_version);
        log::info!(
            "vulkan loader version: {}.{}.{}, request api version: {}.{}",
            vk::api_version_major(loader_version.unwrap_or(vk::API_VERSION_1_0)),
            vk::api_version_minor(loader_version.unwrap_or(vk::API_VERSION_1_0)),
            vk::api_version_patch(loader_version.unwrap_or(vk::API_VERSION_1_0)),
            vk::api_version_major(api_version),
            vk::api_version_minor(api_version),
        );

        let available_extensions = vk_check!(unsafe { entry.enumerate_instance_extension_properties(None) })?
            .iter()
            .filter_map(|p| p.extension_name_as_c_str().ok().map(CStr::to_owned))
            .collect_vec();
        let available_layers = vk_check!(unsafe { entry.enumerate_instance_layer_properties() })?
            .iter()
            .filter_map(|p| p.layer_name_as_c_str().ok().map(CStr::to_owned))
            .collect_vec();
        let available_ext_refs = available_extensions.iter().map(CString::as_c_str).collect_vec();
        let available_layer_refs = available_layers.iter().map(CString::as_c_str).collect_vec();

        // 窗口系统所需的 extensions 是必须的
        let mut required_exts: Vec<&CStr> = Vec::new();
        if let Some(display) = display {
            let window_exts = vk_check!(ash_window::enumerate_required_extensions(display))?;
            required_exts.extend(window_exts.iter().map(|p| unsafe { CStr::from_ptr(*p) }));
        }
        let (mut enabled_exts, missing) = split_supported(&available_ext_refs, &required_exts);
        if !missing.is_empty() {
            log::error!("required instance extensions are missing: {:?}", missing);
            return Err(GfxError::vk(vk::Result::ERROR_EXTENSION_NOT_PRESENT, "vkCreateInstance"));
        }

        let mut optional_exts =
            vec![ash::khr::get_physical_device_properties2::NAME, ash::khr::get_surface_capabilities2::NAME];
        let mut wanted_layers = Vec::new();
        if settings.enable_validation {
            optional_exts.push(ash::ext::debug_utils::NAME);
            wanted_layers.push(VALIDATION_LAYER);
        }
        let (optional_enabled, optional_missing) = split_supported(&available_ext_refs, &optional_exts);
        for ext in optional_missing {
            log::warn!("instance extension {:?} is not available, continue without it", ext);
        }
        enabled_exts.extend(optional_enabled);

        let (enabled_layers, missing_layers) = split_supported(&available_layer_refs, &wanted_layers);
        for layer in missing_layers {
            log::warn!("instance layer {:?} is not available, continue without it", layer);
        }

        log::info!("instance extensions: {}", enabled_exts.iter().map(|e| format!("\n\t{:?}", e)).join(""));
        log::info!("instance layers: {}", enabled_layers.iter().map(|e| format!("\n\t{:?}", e)).join(""));

        let app_name = CString::new(settings.app_name.as_str()).unwrap_or_default();
        let app_info = vk::ApplicationInfo::default()
            .api_version(api_version)
            .application_name(app_name.as_c_str())
            .application_version(settings.app_version)
            .engine_name(c"ember")
            .engine_version(vk::make_api_version(0, 0, 1, 0));

        let ext_ptrs: Vec<*const c_char> = enabled_exts.iter().map(|e| e.as_ptr()).collect();
        let layer_ptrs: Vec<*const c_char> = enabled_layers.iter().map(|l| l.as_ptr()).collect();
        let debug_utils_enabled = enabled_exts.contains(&ash::ext::debug_utils::NAME);

        let mut instance_ci = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&ext_ptrs)
            .enabled_layer_names(&layer_ptrs);

        // 让 instance 的创建与销毁过程也能被 debug messenger 覆盖
        let mut debug_utils_messenger_ci = GfxDebugMessenger::debug_utils_messenger_ci();
        if debug_utils_enabled {
            instance_ci = instance_ci.push_next(&mut debug_utils_messenger_ci);
        }

        let handle = vk_check!(unsafe { entry.create_instance(&instance_ci, None) })?;

        let debug_messenger = if debug_utils_enabled {
            match GfxDebugMessenger::new(&entry, &handle) {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    unsafe { handle.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        let surface_loader = ash::khr::surface::Instance::new(&entry, &handle);

        Ok(Rc::new(Self {
            entry,
            handle,
            surface_loader,
            api_version,
            enabled_extensions: enabled_exts.into_iter().map(CStr::to_owned).collect(),
            enabled_layers: enabled_layers.into_iter().map(CStr::to_owned).collect(),
            available_extensions,
            available_layers,
            debug_messenger,
        }))
    }
}

// getters
impl GfxInstance {
    #[inline]
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    #[inline]
    pub fn ash_instance(&self) -> &ash::Instance {
        &self.handle
    }

    #[inline]
    pub fn handle(&self) -> vk::Instance {
        self.handle.handle()
    }

    #[inline]
    pub fn surface_loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }

    /// 实际请求的 api 版本
    #[inline]
    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    #[inline]
    pub fn debug_utils_enabled(&self) -> bool {
        self.debug_messenger.is_some()
    }

    /// loader 是否支持某个 instance extension
    pub fn supports_extension(&self, name: &CStr) -> bool {
        self.available_extensions.iter().any(|e| e.as_c_str() == name)
    }

    pub fn supports_layer(&self, name: &CStr) -> bool {
        self.available_layers.iter().any(|l| l.as_c_str() == name)
    }

    /// 创建 instance 时是否启用了某个 extension
    pub fn is_extension_enabled(&self, name: &CStr) -> bool {
        self.enabled_extensions.iter().any(|e| e.as_c_str() == name)
    }

    pub fn is_layer_enabled(&self, name: &CStr) -> bool {
        self.enabled_layers.iter().any(|l| l.as_c_str() == name)
    }
}

// physical device
impl GfxInstance {
    pub fn enumerate_physical_devices(self: &Rc<Self>) -> GfxResult<Vec<Rc<GfxPhysicalDevice>>> {
        let handles = vk_check!(unsafe { self.handle.enumerate_physical_devices() })?;
        handles
            .into_iter()
            .map(|pdevice| GfxPhysicalDevice::new(self.clone(), pdevice).map(Rc::new))
            .collect()
    }

    /// 优先使用独立显卡，否则使用第一张显卡
    pub fn pick_physical_device(self: &Rc<Self>, prefer_discrete: bool) -> GfxResult<Rc<GfxPhysicalDevice>> {
        let pdevices = self.enumerate_physical_devices()?;
        let picked = if prefer_discrete {
            pdevices.into_iter().find_or_first(|p| p.is_discrete_gpu())
        } else {
            pdevices.into_iter().next()
        };
        let picked = picked.ok_or(GfxError::NoPhysicalDevice)?;
        log::info!("pick gpu: {}", picked.device_name());
        Ok(picked)
    }
}

impl Drop for GfxInstance {
    fn drop(&mut self) {
        // messenger 需要在 instance 之前销毁
        self.debug_messenger.take();

        log::info!("destroying instance");
        unsafe {
            self.handle.destroy_instance(None);
        }
    }
}

/// 请求 1.3，但不超过 loader 支持的版本
fn negotiate_api_version(loader_version: Option<u32>) -> u32 {
    let loader_version = loader_version.unwrap_or(vk::API_VERSION_1_0);
    let loader_minor =
        vk::make_api_version(0, vk::api_version_major(loader_version), vk::api_version_minor(loader_version), 0);
    loader_minor.min(vk::API_VERSION_1_3)
}

/// 将 `wanted` 分为 (受支持的, 不受支持的) 两部分，保持原有顺序
fn split_supported<'a>(available: &[&CStr], wanted: &[&'a CStr]) -> (Vec<&'a CStr>, Vec<&'a CStr>) {
    wanted.iter().copied().partition(|name| available.iter().any(|a| *a == *name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiate_api_version() {
        assert_eq!(negotiate_api_version(None), vk::API_VERSION_1_0);
        assert_eq!(negotiate_api_version(Some(vk::make_api_version(0, 1, 2, 189))), vk::API_VERSION_1_2);
        assert_eq!(negotiate_api_version(Some(vk::make_api_version(0, 1, 3, 250))), vk::API_VERSION_1_3);
        assert_eq!(negotiate_api_version(Some(vk::make_api_version(0, 1, 4, 300))), vk::API_VERSION_1_3);
    }

    #[test]
    fn test_split_supported() {
        let available = [c"VK_KHR_surface", c"VK_EXT_debug_utils"];
        let wanted = [c"VK_KHR_surface", c"VK_KHR_xcb_surface", c"VK_EXT_debug_utils"];
        let (ok, missing) = split_supported(&available, &wanted);
        assert_eq!(ok, vec![c"VK_KHR_surface", c"VK_EXT_debug_utils"]);
        assert_eq!(missing, vec![c"VK_KHR_xcb_surface"]);
    }

    #[test]
    fn test_split_supported_empty() {
        let (ok, missing) = split_supported(&[], &[VALIDATION_LAYER]);
        assert!(ok.is_empty());
        assert_eq!(missing, vec![VALIDATION_LAYER]);
    }
}
