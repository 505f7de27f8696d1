use std::ffi::CStr;

use ash::vk;

use crate::{error::GfxResult, vk_check};

/// debug utils messenger，由 [`GfxInstance`](crate::foundation::instance::GfxInstance) 持有
pub struct GfxDebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
}

impl GfxDebugMessenger {
    pub fn new(entry: &ash::Entry, instance: &ash::Instance) -> GfxResult<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let create_info = Self::debug_utils_messenger_ci();
        let handle = vk_check!(unsafe { loader.create_debug_utils_messenger(&create_info, None) })?;

        Ok(Self { loader, handle })
    }

    #[inline]
    pub fn loader(&self) -> &ash::ext::debug_utils::Instance {
        &self.loader
    }

    /// 用于创建 debug messenger 的结构体，也会被串到 instance 的创建参数中
    ///
    /// 接收所有 severity，由 log 的过滤级别决定是否输出
    pub fn debug_utils_messenger_ci() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
        vk::DebugUtilsMessengerCreateInfoEXT::default()
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
            .pfn_user_callback(Some(vk_debug_callback))
    }
}

impl Drop for GfxDebugMessenger {
    fn drop(&mut self) {
        log::info!("destroying debug messenger");
        unsafe {
            self.loader.destroy_debug_utils_messenger(self.handle, None);
        }
    }
}

/// 驱动的 severity 对应的日志级别
fn log_level_of(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::Level::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::Level::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::Level::Info
    } else {
        log::Level::Debug
    }
}

/// 部分 layer 输出的消息是 json，其中 MainMessage 字段带有换行符，需要单独输出
fn format_message(message_type: vk::DebugUtilsMessageTypeFlagsEXT, msg: &str) -> String {
    let mut json_value = serde_json::from_str::<serde_json::Value>(msg).ok();
    let json_obj = json_value.as_mut().and_then(|v| v.as_object_mut());

    match json_obj {
        Some(obj) => {
            let main_msg = obj.remove("MainMessage");
            let main_msg_str = main_msg.as_ref().and_then(|v| v.as_str()).unwrap_or_default();
            let total_msg_str = serde_json::to_string_pretty(obj).unwrap_or_else(|_| msg.to_string());
            format!("[{:?}]\n{}\n{}", message_type, total_msg_str, main_msg_str)
        }
        None => format!("[{:?}] {}", message_type, msg),
    }
}

/// debug messenger 的回调函数
///
/// # Safety
/// 由驱动调用，`p_callback_data` 在回调期间有效
unsafe extern "system" fn vk_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let level = log_level_of(message_severity);
    if p_callback_data.is_null() || !log::log_enabled!(level) {
        return vk::FALSE;
    }
    let callback_data = unsafe { *p_callback_data };

    let msg = if callback_data.p_message.is_null() {
        std::borrow::Cow::from("")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    log::log!(level, "{}", format_message(message_type, msg.as_ref()));

    // 只有 layer developer 才需要返回 True
    vk::FALSE
}

/// 可以设置 debug name 的 Vulkan 对象
pub trait DebugType {
    fn debug_type_name() -> &'static str;
    fn vk_handle(&self) -> impl vk::Handle + Copy;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_to_log_level() {
        assert_eq!(log_level_of(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR), log::Level::Error);
        assert_eq!(log_level_of(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING), log::Level::Warn);
        assert_eq!(log_level_of(vk::DebugUtilsMessageSeverityFlagsEXT::INFO), log::Level::Info);
        assert_eq!(log_level_of(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE), log::Level::Debug);
    }

    #[test]
    fn test_messenger_receives_every_severity() {
        let ci = GfxDebugMessenger::debug_utils_messenger_ci();
        for severity in [
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        ] {
            assert!(ci.message_severity.contains(severity), "{:?}", severity);
        }
        assert!(ci.pfn_user_callback.is_some());
    }

    #[test]
    fn test_format_plain_message() {
        let s = format_message(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION, "hello");
        assert!(s.ends_with("hello"));
        assert!(s.contains("VALIDATION"));
    }

    #[test]
    fn test_format_json_message_extracts_main_message() {
        let raw = r#"{"MainMessage": "line1\nline2", "MessageID": 42}"#;
        let s = format_message(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE, raw);
        assert!(s.ends_with("line1\nline2"));
        assert!(s.contains("\"MessageID\": 42"));
        assert!(!s.contains("MainMessage"));
    }
}
