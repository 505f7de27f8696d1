//! vk::Format 相关的辅助函数

use ash::vk;

/// 根据格式推导 image aspect
pub fn infer_image_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

#[inline]
pub fn is_depth_format(format: vk::Format) -> bool {
    infer_image_aspect(format).contains(vk::ImageAspectFlags::DEPTH)
}

#[inline]
pub fn has_stencil(format: vk::Format) -> bool {
    infer_image_aspect(format).contains(vk::ImageAspectFlags::STENCIL)
}

/// 常用格式单个像素（或单个顶点属性）的字节数
///
/// 压缩格式和不常用的格式返回 None
pub fn format_size(format: vk::Format) -> Option<u32> {
    let size = match format {
        vk::Format::R8_UNORM | vk::Format::R8_SNORM | vk::Format::R8_UINT | vk::Format::R8_SINT | vk::Format::S8_UINT => {
            1
        }
        vk::Format::R8G8_UNORM
        | vk::Format::R8G8_UINT
        | vk::Format::R16_SFLOAT
        | vk::Format::R16_UINT
        | vk::Format::R16_SINT
        | vk::Format::R16_UNORM
        | vk::Format::D16_UNORM => 2,
        vk::Format::R8G8B8_UNORM | vk::Format::B8G8R8_UNORM | vk::Format::D16_UNORM_S8_UINT => 3,
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::R8G8B8A8_UINT
        | vk::Format::R8G8B8A8_SNORM
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB
        | vk::Format::A2B10G10R10_UNORM_PACK32
        | vk::Format::A2R10G10B10_UNORM_PACK32
        | vk::Format::R16G16_SFLOAT
        | vk::Format::R16G16_UINT
        | vk::Format::R32_SFLOAT
        | vk::Format::R32_UINT
        | vk::Format::R32_SINT
        | vk::Format::D32_SFLOAT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::X8_D24_UNORM_PACK32 => 4,
        vk::Format::D32_SFLOAT_S8_UINT => 5,
        vk::Format::R16G16B16_SFLOAT => 6,
        vk::Format::R16G16B16A16_SFLOAT
        | vk::Format::R16G16B16A16_UINT
        | vk::Format::R16G16B16A16_UNORM
        | vk::Format::R32G32_SFLOAT
        | vk::Format::R32G32_UINT
        | vk::Format::R32G32_SINT => 8,
        vk::Format::R32G32B32_SFLOAT | vk::Format::R32G32B32_UINT | vk::Format::R32G32B32_SINT => 12,
        vk::Format::R32G32B32A32_SFLOAT | vk::Format::R32G32B32A32_UINT | vk::Format::R32G32B32A32_SINT => 16,
        _ => return None,
    };
    Some(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_aspect() {
        assert_eq!(infer_image_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(infer_image_aspect(vk::Format::D16_UNORM), vk::ImageAspectFlags::DEPTH);
        assert_eq!(infer_image_aspect(vk::Format::S8_UINT), vk::ImageAspectFlags::STENCIL);
        assert_eq!(
            infer_image_aspect(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(infer_image_aspect(vk::Format::R8G8B8A8_UNORM), vk::ImageAspectFlags::COLOR);
        assert_eq!(infer_image_aspect(vk::Format::R16G16B16A16_SFLOAT), vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn test_depth_stencil_predicates() {
        assert!(is_depth_format(vk::Format::D32_SFLOAT_S8_UINT));
        assert!(has_stencil(vk::Format::D32_SFLOAT_S8_UINT));
        assert!(is_depth_format(vk::Format::D32_SFLOAT));
        assert!(!has_stencil(vk::Format::D32_SFLOAT));
        assert!(!is_depth_format(vk::Format::B8G8R8A8_UNORM));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(vk::Format::R32G32B32_SFLOAT), Some(12));
        assert_eq!(format_size(vk::Format::R32G32_SFLOAT), Some(8));
        assert_eq!(format_size(vk::Format::R8G8B8A8_UNORM), Some(4));
        assert_eq!(format_size(vk::Format::BC7_UNORM_BLOCK), None);
    }
}
