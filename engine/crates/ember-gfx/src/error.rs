use ash::vk;

/// GFX 层所有可恢复错误
///
/// 驱动返回的错误码保存在 [`GfxError::Vk`] 里，`call` 是出错的调用原文，
/// 由 [`vk_check!`](crate::vk_check) 自动填写。
#[derive(thiserror::Error, Debug)]
pub enum GfxError {
    #[error("vulkan call `{call}` failed: {result:?}")]
    Vk { result: vk::Result, call: &'static str },

    #[error("failed to load vulkan loader: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("no vulkan physical device found")]
    NoPhysicalDevice,

    #[error("physical device has no queue family with GRAPHICS support")]
    NoUniversalQueue,

    #[error("no supported format for {0}")]
    NoSuitableFormat(&'static str),

    #[error("invalid SPIR-V bytecode: {0}")]
    InvalidShaderBytecode(String),

    #[error("shader compilation failed:\n{0}")]
    ShaderCompilation(String),

    /// 资源的 usage、格式或数据大小不满足操作的要求
    #[error("invalid usage: {0}")]
    InvalidUsage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("invalid settings: {0}")]
    Settings(#[from] toml::de::Error),

    #[error("window error: {0}")]
    Window(String),
}

impl GfxError {
    pub fn vk(result: vk::Result, call: &'static str) -> Self {
        Self::Vk { result, call }
    }

    /// 驱动返回的错误码，非 Vulkan 错误时为 None
    pub fn vk_result(&self) -> Option<vk::Result> {
        match self {
            Self::Vk { result, .. } => Some(*result),
            _ => None,
        }
    }
}

pub type GfxResult<T> = Result<T, GfxError>;

/// 把 `VkResult<T>` 转换为 [`GfxResult<T>`]，并记录出错的调用、文件和行号
///
/// ```ignore
/// let fence = vk_check!(unsafe { device.create_fence(&info, None) })?;
/// ```
#[macro_export]
macro_rules! vk_check {
    ($call:expr) => {
        ($call).map_err(|result: ::ash::vk::Result| {
            ::log::error!("{} failed with {:?} at {}:{}", stringify!($call), result, file!(), line!());
            $crate::error::GfxError::vk(result, stringify!($call))
        })
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing_call() -> ash::prelude::VkResult<u32> {
        Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
    }

    fn succeeding_call() -> ash::prelude::VkResult<u32> {
        Ok(7)
    }

    #[test]
    fn test_vk_check_keeps_result_code() {
        let err = vk_check!(failing_call()).unwrap_err();
        assert_eq!(err.vk_result(), Some(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        match err {
            GfxError::Vk { call, .. } => assert!(call.contains("failing_call")),
            _ => panic!("expected GfxError::Vk"),
        }
    }

    #[test]
    fn test_vk_check_passes_value() {
        assert_eq!(vk_check!(succeeding_call()).unwrap(), 7);
    }

    #[test]
    fn test_error_message() {
        let err = GfxError::vk(vk::Result::ERROR_DEVICE_LOST, "vkQueueSubmit");
        let msg = err.to_string();
        assert!(msg.contains("vkQueueSubmit"));
        assert!(msg.contains("ERROR_DEVICE_LOST"));
        assert_eq!(GfxError::NoPhysicalDevice.vk_result(), None);
    }
}
