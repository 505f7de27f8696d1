use std::path::Path;

use ash::vk;
use serde::Deserialize;

use crate::error::GfxResult;

/// 可以在配置文件中使用的深度格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum DepthFormat {
    #[serde(rename = "D32_SFLOAT_S8_UINT")]
    D32SfloatS8Uint,
    #[serde(rename = "D24_UNORM_S8_UINT")]
    D24UnormS8Uint,
    #[serde(rename = "D16_UNORM_S8_UINT")]
    D16UnormS8Uint,
    #[serde(rename = "D32_SFLOAT")]
    D32Sfloat,
    #[serde(rename = "D16_UNORM")]
    D16Unorm,
}

impl DepthFormat {
    #[inline]
    pub fn vk_format(self) -> vk::Format {
        match self {
            Self::D32SfloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
            Self::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
            Self::D16UnormS8Uint => vk::Format::D16_UNORM_S8_UINT,
            Self::D32Sfloat => vk::Format::D32_SFLOAT,
            Self::D16Unorm => vk::Format::D16_UNORM,
        }
    }
}

/// GFX 层的配置
///
/// 所有字段都有默认值，配置文件里只需要写需要覆盖的部分：
///
/// ```toml
/// app_name = "sandbox"
/// vsync = false
/// depth_format_candidates = ["D24_UNORM_S8_UINT"]
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GfxSettings {
    pub app_name: String,
    pub app_version: u32,
    /// 启用 `VK_LAYER_KHRONOS_validation` 以及 debug messenger
    pub enable_validation: bool,
    /// true 时使用 FIFO present mode
    pub vsync: bool,
    /// 期望的 swapchain image 数量，实际数量会被 surface 的能力截断
    pub swapchain_image_count: u32,
    pub prefer_discrete_gpu: bool,
    /// 按顺序查找第一个支持的深度格式
    pub depth_format_candidates: Vec<DepthFormat>,
    pub clear_color: [f32; 4],
}

impl Default for GfxSettings {
    fn default() -> Self {
        Self {
            app_name: "ember".to_string(),
            app_version: 1,
            enable_validation: cfg!(debug_assertions),
            vsync: true,
            swapchain_image_count: 3,
            prefer_discrete_gpu: true,
            depth_format_candidates: vec![
                DepthFormat::D32SfloatS8Uint,
                DepthFormat::D24UnormS8Uint,
                DepthFormat::D16UnormS8Uint,
            ],
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl GfxSettings {
    pub fn from_toml_str(s: &str) -> GfxResult<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> GfxResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let settings = Self::from_toml_str(&content)?;
        log::info!("load gfx settings from {:?}: {:#?}", path.as_ref(), settings);
        Ok(settings)
    }

    pub fn depth_formats(&self) -> Vec<vk::Format> {
        self.depth_format_candidates.iter().map(|f| f.vk_format()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GfxError;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let settings = GfxSettings::from_toml_str("").unwrap();
        assert_eq!(settings, GfxSettings::default());
        assert_eq!(settings.swapchain_image_count, 3);
        assert!(settings.vsync);
    }

    #[test]
    fn test_partial_override() {
        let settings = GfxSettings::from_toml_str(
            r#"
            app_name = "sandbox"
            vsync = false
            depth_format_candidates = ["D24_UNORM_S8_UINT", "D32_SFLOAT"]
            clear_color = [0.1, 0.2, 0.3, 1.0]
            "#,
        )
        .unwrap();

        assert_eq!(settings.app_name, "sandbox");
        assert!(!settings.vsync);
        assert_eq!(settings.swapchain_image_count, 3);
        assert_eq!(settings.depth_formats(), vec![vk::Format::D24_UNORM_S8_UINT, vk::Format::D32_SFLOAT]);
        assert_eq!(settings.clear_color, [0.1, 0.2, 0.3, 1.0]);
    }

    #[test]
    fn test_unknown_depth_format_is_error() {
        let err = GfxSettings::from_toml_str(r#"depth_format_candidates = ["R8_UNORM"]"#).unwrap_err();
        assert!(matches!(err, GfxError::Settings(_)));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = GfxSettings::load("/definitely/not/here/gfx.toml").unwrap_err();
        assert!(matches!(err, GfxError::Io(_)));
    }
}
