use std::{
    ffi::{CStr, CString},
    rc::Rc,
};

use ash::vk;
use itertools::Itertools;

use crate::{
    error::{GfxError, GfxResult},
    foundation::{
        debug_messenger::DebugType, device::GfxDevice, instance::GfxInstance, queue_family::QueueFamilyAssignment,
    },
    vk_check,
};

/// 表示一张物理显卡
///
/// 所有属性都在枚举时查询并缓存，之后不会再变化。
pub struct GfxPhysicalDevice {
    instance: Rc<GfxInstance>,
    handle: vk::PhysicalDevice,

    basic_props: vk::PhysicalDeviceProperties,
    driver_name: Option<String>,
    features: vk::PhysicalDeviceFeatures,
    /// 当前 gpu 是否支持 synchronization2（需要 1.3）
    synchronization2: bool,
    mem_props: vk::PhysicalDeviceMemoryProperties,
    queue_family_props: Vec<vk::QueueFamilyProperties>,
    extensions: Vec<CString>,
}

// new & init
impl GfxPhysicalDevice {
    pub(crate) fn new(instance: Rc<GfxInstance>, pdevice: vk::PhysicalDevice) -> GfxResult<Self> {
        let ash_instance = instance.ash_instance();
        let basic_props = unsafe { ash_instance.get_physical_device_properties(pdevice) };
        let device_api = basic_props.api_version.min(instance.api_version());

        let device_name = basic_props.device_name_as_c_str().unwrap_or(c"unknown").to_string_lossy().to_string();
        log::info!(
            "found gpu: {:?}, type: {:?}, api: {}.{}.{}",
            device_name,
            basic_props.device_type,
            vk::api_version_major(basic_props.api_version),
            vk::api_version_minor(basic_props.api_version),
            vk::api_version_patch(basic_props.api_version),
        );

        // driver properties 是 1.2 的 core
        let driver_name = if device_api >= vk::API_VERSION_1_2 {
            let mut driver_props = vk::PhysicalDeviceDriverProperties::default();
            let mut props2 = vk::PhysicalDeviceProperties2::default().push_next(&mut driver_props);
            unsafe { ash_instance.get_physical_device_properties2(pdevice, &mut props2) };
            driver_props.driver_name_as_c_str().ok().map(|s| s.to_string_lossy().to_string())
        } else {
            None
        };

        let features = unsafe { ash_instance.get_physical_device_features(pdevice) };
        let synchronization2 = if device_api >= vk::API_VERSION_1_3 {
            let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
            let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut features13);
            unsafe { ash_instance.get_physical_device_features2(pdevice, &mut features2) };
            features13.synchronization2 == vk::TRUE
        } else {
            false
        };

        let extensions = vk_check!(unsafe { ash_instance.enumerate_device_extension_properties(pdevice) })?
            .iter()
            .filter_map(|ext| ext.extension_name_as_c_str().ok().map(CStr::to_owned))
            .collect_vec();
        log::debug!(
            "physical device supports extensions: {}",
            extensions.iter().map(|e| e.to_string_lossy()).join("\n")
        );

        let queue_family_props = unsafe { ash_instance.get_physical_device_queue_family_properties(pdevice) };
        log::info!("physical device: queue family props:\n{:#?}", queue_family_props);

        let mem_props = unsafe { ash_instance.get_physical_device_memory_properties(pdevice) };

        Ok(Self {
            instance,
            handle: pdevice,
            basic_props,
            driver_name,
            features,
            synchronization2,
            mem_props,
            queue_family_props,
            extensions,
        })
    }
}

// getters
impl GfxPhysicalDevice {
    #[inline]
    pub fn handle(&self) -> vk::PhysicalDevice {
        self.handle
    }

    #[inline]
    pub fn instance(&self) -> &Rc<GfxInstance> {
        &self.instance
    }

    #[inline]
    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.basic_props
    }

    #[inline]
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.basic_props.limits
    }

    #[inline]
    pub fn features(&self) -> &vk::PhysicalDeviceFeatures {
        &self.features
    }

    #[inline]
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.mem_props
    }

    #[inline]
    pub fn queue_family_properties(&self) -> &[vk::QueueFamilyProperties] {
        &self.queue_family_props
    }

    #[inline]
    pub fn queue_family_assignment(&self) -> QueueFamilyAssignment {
        QueueFamilyAssignment::from_properties(&self.queue_family_props)
    }

    pub fn device_name(&self) -> String {
        self.basic_props.device_name_as_c_str().unwrap_or(c"unknown").to_string_lossy().to_string()
    }

    #[inline]
    pub fn driver_name(&self) -> Option<&str> {
        self.driver_name.as_deref()
    }

    /// 设备 api 版本，不超过 instance 请求的版本
    #[inline]
    pub fn api_version(&self) -> u32 {
        self.basic_props.api_version.min(self.instance.api_version())
    }

    /// 当前 gpu 是否是独立显卡
    #[inline]
    pub fn is_discrete_gpu(&self) -> bool {
        self.basic_props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
    }

    #[inline]
    pub fn supports_synchronization2(&self) -> bool {
        self.synchronization2
    }

    pub fn supports_device_extension(&self, name: &CStr) -> bool {
        self.extensions.iter().any(|e| e.as_c_str() == name)
    }

    #[inline]
    pub fn extensions(&self) -> &[CString] {
        &self.extensions
    }
}

// tools
impl GfxPhysicalDevice {
    /// 找到第一个满足 features 要求的格式，没有时返回 `vk::Format::UNDEFINED`
    pub fn find_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> vk::Format {
        let instance = self.instance.ash_instance();
        find_format_by(candidates, tiling, features, |format| unsafe {
            instance.get_physical_device_format_properties(self.handle, format)
        })
    }

    /// 可以作为 depth stencil attachment 的格式
    pub fn find_depth_stencil_format(&self, candidates: &[vk::Format]) -> GfxResult<vk::Format> {
        match self.find_format(
            candidates,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        ) {
            vk::Format::UNDEFINED => Err(GfxError::NoSuitableFormat("depth stencil attachment")),
            format => Ok(format),
        }
    }

    pub fn surface_capabilities(&self, surface: vk::SurfaceKHR) -> GfxResult<vk::SurfaceCapabilitiesKHR> {
        vk_check!(unsafe {
            self.instance.surface_loader().get_physical_device_surface_capabilities(self.handle, surface)
        })
    }

    pub fn surface_formats(&self, surface: vk::SurfaceKHR) -> GfxResult<Vec<vk::SurfaceFormatKHR>> {
        vk_check!(unsafe { self.instance.surface_loader().get_physical_device_surface_formats(self.handle, surface) })
    }

    pub fn surface_present_modes(&self, surface: vk::SurfaceKHR) -> GfxResult<Vec<vk::PresentModeKHR>> {
        vk_check!(unsafe {
            self.instance.surface_loader().get_physical_device_surface_present_modes(self.handle, surface)
        })
    }

    pub fn surface_support(&self, queue_family: u32, surface: vk::SurfaceKHR) -> GfxResult<bool> {
        vk_check!(unsafe {
            self.instance.surface_loader().get_physical_device_surface_support(self.handle, queue_family, surface)
        })
    }

    /// 根据 instance 与 physical device 的能力自动选择 device extensions
    pub fn auto_device_extensions(&self) -> Vec<CString> {
        let instance_caps = InstanceCaps {
            properties2: self.instance.is_extension_enabled(ash::khr::get_physical_device_properties2::NAME),
            surface: self.instance.is_extension_enabled(ash::khr::surface::NAME),
            surface_capabilities2: self.instance.is_extension_enabled(ash::khr::get_surface_capabilities2::NAME),
        };
        let available = self.extensions.iter().map(CString::as_c_str).collect_vec();
        select_device_extensions(&available, instance_caps).into_iter().map(CStr::to_owned).collect()
    }
}

// device
impl GfxPhysicalDevice {
    pub fn create_device(self: &Rc<Self>, extension_names: &[&CStr]) -> GfxResult<Rc<GfxDevice>> {
        GfxDevice::new(self.clone(), extension_names)
    }

    /// 启用所有可用的 KHR/EXT device extensions
    pub fn create_device_auto(self: &Rc<Self>) -> GfxResult<Rc<GfxDevice>> {
        let exts = self.auto_device_extensions();
        let ext_refs = exts.iter().map(CString::as_c_str).collect_vec();
        self.create_device(&ext_refs)
    }
}

impl DebugType for GfxPhysicalDevice {
    fn debug_type_name() -> &'static str {
        "GfxPhysicalDevice"
    }

    fn vk_handle(&self) -> impl vk::Handle + Copy {
        self.handle
    }
}

/// 根据 tiling 选择对应的 feature 进行匹配
fn find_format_by(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    query: impl Fn(vk::Format) -> vk::FormatProperties,
) -> vk::Format {
    candidates
        .iter()
        .copied()
        .find(|format| {
            let props = query(*format);
            match tiling {
                vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
                _ => false,
            }
        })
        .unwrap_or(vk::Format::UNDEFINED)
}

/// 与 device extension 选择有关的 instance 能力
#[derive(Debug, Clone, Copy, Default)]
struct InstanceCaps {
    properties2: bool,
    surface: bool,
    surface_capabilities2: bool,
}

/// 选择所有 `VK_KHR_*`、`VK_EXT_*` 以及 `VK_AMD_shader_explicit_vertex_parameter`
///
/// `VK_EXT_full_screen_exclusive` 的前置条件不满足时会被剔除。
fn select_device_extensions<'a>(available: &[&'a CStr], caps: InstanceCaps) -> Vec<&'a CStr> {
    let has_swapchain = available.contains(&ash::khr::swapchain::NAME);
    let full_screen_ok = caps.properties2 && caps.surface && caps.surface_capabilities2 && has_swapchain;

    available
        .iter()
        .copied()
        .filter(|name| {
            let bytes = name.to_bytes();
            bytes.starts_with(b"VK_KHR_")
                || bytes.starts_with(b"VK_EXT_")
                || *name == vk::AMD_SHADER_EXPLICIT_VERTEX_PARAMETER_NAME
        })
        .filter(|name| full_screen_ok || *name != vk::EXT_FULL_SCREEN_EXCLUSIVE_NAME)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_caps() -> InstanceCaps {
        InstanceCaps {
            properties2: true,
            surface: true,
            surface_capabilities2: true,
        }
    }

    #[test]
    fn test_select_vendor_filter() {
        let available = [
            c"VK_KHR_swapchain",
            c"VK_EXT_debug_marker",
            c"VK_NV_ray_tracing",
            c"VK_AMD_shader_explicit_vertex_parameter",
            c"VK_AMD_buffer_marker",
        ];
        let selected = select_device_extensions(&available, all_caps());
        assert_eq!(
            selected,
            vec![c"VK_KHR_swapchain", c"VK_EXT_debug_marker", c"VK_AMD_shader_explicit_vertex_parameter"]
        );
    }

    #[test]
    fn test_full_screen_exclusive_kept_with_prerequisites() {
        let available = [c"VK_KHR_swapchain", c"VK_EXT_full_screen_exclusive"];
        let selected = select_device_extensions(&available, all_caps());
        assert!(selected.contains(&c"VK_EXT_full_screen_exclusive"));
    }

    #[test]
    fn test_full_screen_exclusive_dropped_without_prerequisites() {
        let available = [c"VK_KHR_swapchain", c"VK_EXT_full_screen_exclusive"];
        let mut caps = all_caps();
        caps.surface_capabilities2 = false;
        assert_eq!(select_device_extensions(&available, caps), vec![c"VK_KHR_swapchain"]);

        // 没有 swapchain 也不行
        let available = [c"VK_EXT_full_screen_exclusive"];
        assert!(select_device_extensions(&available, all_caps()).is_empty());
    }

    #[test]
    fn test_find_format_by_tiling() {
        let query = |format: vk::Format| match format {
            vk::Format::D32_SFLOAT_S8_UINT => vk::FormatProperties {
                linear_tiling_features: vk::FormatFeatureFlags::empty(),
                optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                ..Default::default()
            },
            vk::Format::D24_UNORM_S8_UINT => vk::FormatProperties {
                linear_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                ..Default::default()
            },
            _ => vk::FormatProperties::default(),
        };
        let candidates = [vk::Format::D32_SFLOAT_S8_UINT, vk::Format::D24_UNORM_S8_UINT];
        let feature = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;

        assert_eq!(
            find_format_by(&candidates, vk::ImageTiling::OPTIMAL, feature, query),
            vk::Format::D32_SFLOAT_S8_UINT
        );
        assert_eq!(
            find_format_by(&candidates, vk::ImageTiling::LINEAR, feature, query),
            vk::Format::D24_UNORM_S8_UINT
        );
        assert_eq!(
            find_format_by(&[vk::Format::D16_UNORM], vk::ImageTiling::OPTIMAL, feature, query),
            vk::Format::UNDEFINED
        );
    }
}
