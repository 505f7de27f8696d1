use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::{
    commands::{fence::GfxFence, semaphore::GfxSemaphore},
    error::{GfxError, GfxResult},
    foundation::{debug_messenger::DebugType, device::GfxDevice},
    resources::{image::GfxImage, image_view::GfxImageView},
    swapchain::surface::GfxSurface,
    vk_check,
};

/// 按优先级排列的 swapchain 格式，color space 都是 SRGB_NONLINEAR
pub const PREFERRED_SURFACE_FORMATS: [vk::Format; 5] = [
    vk::Format::R8G8B8A8_UNORM,
    vk::Format::B8G8R8A8_UNORM,
    vk::Format::A2B10G10R10_UNORM_PACK32,
    vk::Format::A2R10G10B10_UNORM_PACK32,
    vk::Format::R16G16B16A16_SFLOAT,
];

/// 创建 swapchain 时的需求
#[derive(Copy, Clone, Debug)]
pub struct GfxSwapchainDesc {
    /// window 的 physical size
    pub window_extent: vk::Extent2D,
    pub image_count: u32,
    pub vsync: bool,
}

/// acquire 的结果
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AcquireResult {
    Acquired(u32),
    /// 可以继续使用，但应当在合适的时候重建 swapchain
    Suboptimal(u32),
    /// 必须重建 swapchain
    OutOfDate,
}

impl AcquireResult {
    #[inline]
    pub fn image_index(&self) -> Option<u32> {
        match self {
            Self::Acquired(idx) | Self::Suboptimal(idx) => Some(*idx),
            Self::OutOfDate => None,
        }
    }
}

// 选择策略，都是纯函数
pub mod select {
    use super::*;

    /// 如果 current_extent 是特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
    pub fn extent(caps: &vk::SurfaceCapabilitiesKHR, window_extent: vk::Extent2D) -> vk::Extent2D {
        let surface_extent = caps.current_extent;
        if surface_extent.width == u32::MAX || surface_extent.height == u32::MAX {
            vk::Extent2D {
                width: window_extent.width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
                height: window_extent.height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
            }
        } else {
            surface_extent
        }
    }

    /// max_image_count == 0，表示不限制 image 数量
    pub fn image_count(caps: &vk::SurfaceCapabilitiesKHR, requested: u32) -> u32 {
        let count = requested.max(caps.min_image_count);
        if caps.max_image_count == 0 { count } else { count.min(caps.max_image_count) }
    }

    /// 只有一个 UNDEFINED 表示任意格式都可以
    pub fn surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
        let srgb_nonlinear = |format| vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };

        if available.len() == 1 && available[0].format == vk::Format::UNDEFINED {
            return Some(srgb_nonlinear(PREFERRED_SURFACE_FORMATS[0]));
        }

        let preferred = PREFERRED_SURFACE_FORMATS.iter().find_map(|format| {
            available
                .iter()
                .find(|f| f.format == *format && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
                .copied()
        });
        if preferred.is_some() {
            return preferred;
        }

        let fallback = available.first().copied();
        if let Some(f) = fallback {
            log::warn!("no preferred surface format available, fall back to {:?}", f);
        }
        fallback
    }

    pub fn pre_transform(caps: &vk::SurfaceCapabilitiesKHR) -> vk::SurfaceTransformFlagsKHR {
        if caps.supported_transforms.contains(vk::SurfaceTransformFlagsKHR::IDENTITY) {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            caps.current_transform
        }
    }

    pub fn composite_alpha(caps: &vk::SurfaceCapabilitiesKHR) -> vk::CompositeAlphaFlagsKHR {
        [
            vk::CompositeAlphaFlagsKHR::INHERIT,
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
            vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        ]
        .into_iter()
        .find(|alpha| caps.supported_composite_alpha.contains(*alpha))
        .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
    }

    /// FIFO 一定受支持
    pub fn present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
        if vsync {
            vk::PresentModeKHR::FIFO
        } else {
            available.first().copied().unwrap_or(vk::PresentModeKHR::FIFO)
        }
    }
}

pub struct GfxSwapchain {
    device: Rc<GfxDevice>,
    surface: Rc<GfxSurface>,
    handle: vk::SwapchainKHR,

    /// 外部 image，不由我们释放
    images: Vec<Rc<GfxImage>>,
    image_views: Vec<Rc<GfxImageView>>,
    current_image_index: u32,

    surface_format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

// new & init
impl GfxSwapchain {
    /// old 用于提示驱动复用资源，调用方仍需要在之后销毁 old
    pub fn new(
        device: &Rc<GfxDevice>,
        surface: Rc<GfxSurface>,
        desc: &GfxSwapchainDesc,
        old: Option<&GfxSwapchain>,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxSwapchain::new");
        let physical_device = device.physical_device();
        let caps = physical_device.surface_capabilities(surface.handle())?;
        let formats = physical_device.surface_formats(surface.handle())?;
        let present_modes = physical_device.surface_present_modes(surface.handle())?;

        log::debug!("available surface formats: {}", describe_formats(&formats));

        let extent = select::extent(&caps, desc.window_extent);
        let image_count = select::image_count(&caps, desc.image_count);
        let surface_format = select::surface_format(&formats).ok_or(GfxError::NoSuitableFormat("swapchain"))?;
        let present_mode = select::present_mode(&present_modes, desc.vsync);
        log::info!(
            "create swapchain:
            surface current extent: {}x{}, min extent: {}x{}, max extent: {}x{}
            window physical extent: {}x{}
            final swapchain extent: {}x{}, image count: {}, format: {:?}, present mode: {:?}",
            caps.current_extent.width,
            caps.current_extent.height,
            caps.min_image_extent.width,
            caps.min_image_extent.height,
            caps.max_image_extent.width,
            caps.max_image_extent.height,
            desc.window_extent.width,
            desc.window_extent.height,
            extent.width,
            extent.height,
            image_count,
            surface_format.format,
            present_mode
        );

        let usage = vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST;
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            // TRANSFER_DST 用于 Nsight 分析
            .image_usage(usage)
            .pre_transform(select::pre_transform(&caps))
            .composite_alpha(select::composite_alpha(&caps))
            .present_mode(present_mode)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .clipped(true)
            .old_swapchain(old.map_or(vk::SwapchainKHR::null(), |s| s.handle));

        let loader = device.swapchain_loader();
        let handle = vk_check!(unsafe { loader.create_swapchain(&create_info, None) })?;
        device.set_object_debug_name(handle, "swapchain");

        let raw_images = match vk_check!(unsafe { loader.get_swapchain_images(handle) }) {
            Ok(images) => images,
            Err(e) => {
                unsafe { loader.destroy_swapchain(handle, None) };
                return Err(e);
            }
        };

        let mut swapchain = Self {
            device: device.clone(),
            surface,
            handle,
            images: Vec::with_capacity(raw_images.len()),
            image_views: Vec::with_capacity(raw_images.len()),
            current_image_index: 0,
            surface_format,
            extent,
            present_mode,
        };
        // 出错时由 Drop 销毁已经创建的部分
        for (idx, raw_image) in raw_images.into_iter().enumerate() {
            let image = GfxImage::from_external(
                device,
                raw_image,
                surface_format.format,
                extent,
                usage,
                &format!("swapchain-image-{}", idx),
            )?;
            let view = image.create_image_view_2d(0, 1, &format!("swapchain-image-view-{}", idx))?;
            swapchain.images.push(image);
            swapchain.image_views.push(view);
        }

        Ok(swapchain)
    }
}

// getters
impl GfxSwapchain {
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    #[inline]
    pub fn surface(&self) -> &Rc<GfxSurface> {
        &self.surface
    }

    #[inline]
    pub fn images(&self) -> &[Rc<GfxImage>] {
        &self.images
    }

    #[inline]
    pub fn image_views(&self) -> &[Rc<GfxImageView>] {
        &self.image_views
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn current_image_index(&self) -> u32 {
        self.current_image_index
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.surface_format.format
    }

    #[inline]
    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }
}

// update
impl GfxSwapchain {
    /// 唯一会修改 current image index 的地方
    ///
    /// timeout: nano seconds
    pub fn acquire_next_image(
        &mut self,
        semaphore: Option<&GfxSemaphore>,
        fence: Option<&GfxFence>,
        timeout: u64,
    ) -> GfxResult<AcquireResult> {
        let _span = tracy_client::span!("GfxSwapchain::acquire_next_image");
        let result = unsafe {
            self.device.swapchain_loader().acquire_next_image(
                self.handle,
                timeout,
                semaphore.map_or(vk::Semaphore::null(), |s| s.handle()),
                fence.map_or(vk::Fence::null(), |f| f.handle()),
            )
        };

        match result {
            Ok((image_index, is_suboptimal)) => {
                self.current_image_index = image_index;
                if is_suboptimal {
                    log::warn!("swapchain acquire image index {} is not optimal", image_index);
                    Ok(AcquireResult::Suboptimal(image_index))
                } else {
                    Ok(AcquireResult::Acquired(image_index))
                }
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("swapchain is out of date when acquire next image");
                Ok(AcquireResult::OutOfDate)
            }
            Err(e) => {
                log::error!("failed to acquire next swapchain image: {:?}", e);
                Err(GfxError::vk(e, "vkAcquireNextImageKHR"))
            }
        }
    }
}

impl Drop for GfxSwapchain {
    fn drop(&mut self) {
        // image view 需要先于 swapchain 销毁
        self.image_views.clear();
        self.images.clear();
        unsafe {
            self.device.swapchain_loader().destroy_swapchain(self.handle, None);
        }
    }
}

impl DebugType for GfxSwapchain {
    fn debug_type_name() -> &'static str {
        "GfxSwapchain"
    }

    fn vk_handle(&self) -> impl vk::Handle + Copy {
        self.handle
    }
}

/// 方便日志输出
pub fn describe_formats(formats: &[vk::SurfaceFormatKHR]) -> String {
    formats.iter().map(|f| format!("{:?}/{:?}", f.format, f.color_space)).join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32), count: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            min_image_count: count.0,
            max_image_count: count.1,
            ..Default::default()
        }
    }

    #[test]
    fn test_extent_uses_current_extent() {
        let caps = caps((800, 600), (1, 1), (4096, 4096), (2, 8));
        let extent = select::extent(&caps, vk::Extent2D { width: 1024, height: 768 });
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_extent_clamps_window_size() {
        let caps = caps((u32::MAX, u32::MAX), (64, 64), (1920, 1080), (2, 8));
        let extent = select::extent(&caps, vk::Extent2D { width: 2560, height: 32 });
        assert_eq!((extent.width, extent.height), (1920, 64));
    }

    #[test]
    fn test_image_count() {
        let bounded = caps((800, 600), (1, 1), (800, 600), (2, 3));
        assert_eq!(select::image_count(&bounded, 3), 3);
        assert_eq!(select::image_count(&bounded, 5), 3);
        assert_eq!(select::image_count(&bounded, 1), 2);

        let unbounded = caps((800, 600), (1, 1), (800, 600), (2, 0));
        assert_eq!(select::image_count(&unbounded, 6), 6);
    }

    #[test]
    fn test_surface_format() {
        let srgb = vk::ColorSpaceKHR::SRGB_NONLINEAR;
        let any = [vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: srgb,
        }];
        assert_eq!(select::surface_format(&any).map(|f| f.format), Some(vk::Format::R8G8B8A8_UNORM));

        let available = [
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: srgb,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::A2B10G10R10_UNORM_PACK32,
                color_space: srgb,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: srgb,
            },
        ];
        assert_eq!(select::surface_format(&available).map(|f| f.format), Some(vk::Format::B8G8R8A8_UNORM));

        let fallback = [vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: srgb,
        }];
        assert_eq!(select::surface_format(&fallback).map(|f| f.format), Some(vk::Format::B8G8R8A8_SRGB));
        assert_eq!(select::surface_format(&[]), None);
    }

    #[test]
    fn test_transform_and_alpha() {
        let mut c = caps((800, 600), (1, 1), (800, 600), (2, 3));
        c.supported_transforms = vk::SurfaceTransformFlagsKHR::ROTATE_90;
        c.current_transform = vk::SurfaceTransformFlagsKHR::ROTATE_90;
        assert_eq!(select::pre_transform(&c), vk::SurfaceTransformFlagsKHR::ROTATE_90);
        c.supported_transforms |= vk::SurfaceTransformFlagsKHR::IDENTITY;
        assert_eq!(select::pre_transform(&c), vk::SurfaceTransformFlagsKHR::IDENTITY);

        c.supported_composite_alpha = vk::CompositeAlphaFlagsKHR::OPAQUE;
        assert_eq!(select::composite_alpha(&c), vk::CompositeAlphaFlagsKHR::OPAQUE);
        c.supported_composite_alpha |= vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED;
        assert_eq!(select::composite_alpha(&c), vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED);
        c.supported_composite_alpha |= vk::CompositeAlphaFlagsKHR::INHERIT;
        assert_eq!(select::composite_alpha(&c), vk::CompositeAlphaFlagsKHR::INHERIT);
    }

    #[test]
    fn test_present_mode() {
        let modes = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
        assert_eq!(select::present_mode(&modes, true), vk::PresentModeKHR::FIFO);
        assert_eq!(select::present_mode(&modes, false), vk::PresentModeKHR::MAILBOX);
        assert_eq!(select::present_mode(&[], false), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_acquire_result_index() {
        assert_eq!(AcquireResult::Acquired(2).image_index(), Some(2));
        assert_eq!(AcquireResult::Suboptimal(0).image_index(), Some(0));
        assert_eq!(AcquireResult::OutOfDate.image_index(), None);
    }
}
