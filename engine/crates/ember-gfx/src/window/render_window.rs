use std::rc::Rc;

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::{
    commands::{command_buffer::GfxCommandBuffer, command_pool::GfxCommandPool},
    error::{GfxError, GfxResult},
    foundation::{device::GfxDevice, queue_family::QueueRole},
    pipelines::{
        framebuffer::GfxFramebuffer,
        render_pass::{GfxRenderPass, present_clear_values},
    },
    resources::{
        image::{GfxImage, GfxImageCreateInfo},
        image_view::GfxImageView,
    },
    settings::GfxSettings,
    swapchain::{
        surface::GfxSurface,
        swapchain::{AcquireResult, GfxSwapchain, GfxSwapchainDesc},
    },
    window::{
        event::{EventResponse, WindowEvent},
        frame::{FrameContext, FramePacer, FrameSlots, FrameSubmit, FrameSync},
    },
};

/// 窗口尺寸变化之后需要做的事情
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResizeAction {
    /// 宽或高为 0，跳过所有的帧，不重建
    Minimize,
    Rebuild(vk::Extent2D),
}

impl ResizeAction {
    fn of(width: u32, height: u32) -> Self {
        if width == 0 || height == 0 { Self::Minimize } else { Self::Rebuild(vk::Extent2D { width, height }) }
    }
}

/// 跟随 swapchain 一起重建的资源
struct PresentTargets {
    /// 数量和 swapchain image 相同
    framebuffers: Vec<GfxFramebuffer>,
    /// 数量和 swapchain image 相同，按 image index 使用
    command_buffers: Vec<GfxCommandBuffer>,
    render_pass: Rc<GfxRenderPass>,
    _depth_view: Rc<GfxImageView>,
    depth_format: vk::Format,
}

impl PresentTargets {
    fn new(
        device: &Rc<GfxDevice>,
        swapchain: &GfxSwapchain,
        command_pool: &Rc<GfxCommandPool>,
        depth_candidates: &[vk::Format],
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("PresentTargets::new");
        let extent = swapchain.extent();

        let depth_format = device.physical_device().find_depth_stencil_format(depth_candidates)?;
        let depth_image = GfxImage::new_device_local(
            device,
            &GfxImageCreateInfo::depth_stencil(extent, depth_format),
            "window-depth-stencil",
        )?;
        let depth_view = depth_image.create_image_view_2d(0, 1, "window-depth-stencil")?;

        let render_pass = Rc::new(GfxRenderPass::new_present(device, swapchain.format(), depth_format, "window")?);

        // 每个 swapchain image view 对应一个 framebuffer
        let framebuffers = swapchain
            .image_views()
            .iter()
            .enumerate()
            .map(|(idx, color_view)| {
                GfxFramebuffer::new(
                    device,
                    &render_pass,
                    &[color_view.clone(), depth_view.clone()],
                    extent,
                    &format!("window-{}", idx),
                )
            })
            .collect::<GfxResult<Vec<_>>>()?;

        let command_buffers =
            command_pool.allocate_many(vk::CommandBufferLevel::PRIMARY, swapchain.image_count() as u32, "window-frame")?;

        Ok(Self {
            framebuffers,
            command_buffers,
            render_pass,
            _depth_view: depth_view,
            depth_format,
        })
    }
}

/// 和一个窗口绑定的 present 逻辑：swapchain、默认 render pass、帧节奏
///
/// 每帧的使用方式：
/// ```ignore
/// if let Some(frame) = window.begin_frame()? {
///     window.begin_default_render_pass(frame);
///     let cmd = window.command_buffer(frame);
///     // 录制绘制命令...
///     cmd.end_render_pass();
///     window.end_frame(frame)?;
/// }
/// ```
pub struct RenderWindow {
    // 字段的声明顺序就是销毁顺序：framebuffer 持有 swapchain image view，需要先于 swapchain 销毁
    targets: PresentTargets,
    swapchain: GfxSwapchain,
    pacer: FramePacer<FrameSync>,
    command_pool: Rc<GfxCommandPool>,
    device: Rc<GfxDevice>,

    desc: GfxSwapchainDesc,
    depth_candidates: Vec<vk::Format>,
    clear_color: [f32; 4],

    /// 宽或高为 0，此时跳过所有的帧
    minimized: bool,
    /// acquire 或 present 报告了 suboptimal
    needs_rebuild: bool,
}

// new & init
impl RenderWindow {
    pub fn new(
        device: &Rc<GfxDevice>,
        settings: &GfxSettings,
        raw_display_handle: RawDisplayHandle,
        raw_window_handle: RawWindowHandle,
        window_extent: vk::Extent2D,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("RenderWindow::new");
        let surface = Rc::new(GfxSurface::new(device.instance(), raw_display_handle, raw_window_handle)?);

        let present_family = device.queue_family_index(QueueRole::Universal);
        if !device.physical_device().surface_support(present_family, surface.handle())? {
            return Err(GfxError::Window(format!("queue family {} can not present to the surface", present_family)));
        }

        let desc = GfxSwapchainDesc {
            window_extent,
            image_count: settings.swapchain_image_count,
            vsync: settings.vsync,
        };
        let swapchain = GfxSwapchain::new(device, surface, &desc, None)?;

        let command_pool = Rc::new(GfxCommandPool::new(
            device,
            present_family,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            "window",
        )?);
        let depth_candidates = settings.depth_formats();
        let targets = PresentTargets::new(device, &swapchain, &command_pool, &depth_candidates)?;

        let slots = FrameSlots::new(|slot| FrameSync::new(device, slot))?;
        let pacer = FramePacer::new(slots, swapchain.image_count());

        Ok(Self {
            targets,
            swapchain,
            pacer,
            command_pool,
            device: device.clone(),
            desc,
            depth_candidates,
            clear_color: settings.clear_color,
            minimized: ResizeAction::of(window_extent.width, window_extent.height) == ResizeAction::Minimize,
            needs_rebuild: false,
        })
    }

    /// 等待 GPU 空闲之后重建 swapchain 以及依赖它的所有资源
    fn rebuild(&mut self) -> GfxResult<()> {
        let _span = tracy_client::span!("RenderWindow::rebuild");
        self.device.wait_idle()?;
        // 重建失败时，下一次 begin_frame 会再次尝试
        self.needs_rebuild = true;

        // 先释放引用旧 swapchain image view 的 framebuffer
        self.targets.framebuffers.clear();
        self.targets.command_buffers.clear();

        let swapchain = GfxSwapchain::new(&self.device, self.swapchain.surface().clone(), &self.desc, Some(&self.swapchain))?;
        self.swapchain = swapchain;
        self.targets = PresentTargets::new(&self.device, &self.swapchain, &self.command_pool, &self.depth_candidates)?;
        self.pacer.reset_images(self.swapchain.image_count());

        self.needs_rebuild = false;
        log::info!(
            "window rebuilt: {}x{}, {} images",
            self.swapchain.extent().width,
            self.swapchain.extent().height,
            self.swapchain.image_count()
        );
        Ok(())
    }
}

// getters
impl RenderWindow {
    #[inline]
    pub fn swapchain(&self) -> &GfxSwapchain {
        &self.swapchain
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    #[inline]
    pub fn render_pass(&self) -> &Rc<GfxRenderPass> {
        &self.targets.render_pass
    }

    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.targets.depth_format
    }

    #[inline]
    pub fn framebuffer_count(&self) -> usize {
        self.targets.framebuffers.len()
    }

    #[inline]
    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.pacer.frame_id()
    }

    /// 当前帧使用的 command buffer，由 swapchain image index 决定
    #[inline]
    pub fn command_buffer(&self, frame: FrameContext) -> &GfxCommandBuffer {
        &self.targets.command_buffers[frame.image_index as usize]
    }

    #[inline]
    pub fn framebuffer(&self, frame: FrameContext) -> &GfxFramebuffer {
        &self.targets.framebuffers[frame.image_index as usize]
    }
}

// phase
impl RenderWindow {
    /// 返回 None 表示这一帧需要跳过：窗口最小化，或者 swapchain 刚刚被重建
    ///
    /// 返回的 command buffer 已经处于录制状态
    pub fn begin_frame(&mut self) -> GfxResult<Option<FrameContext>> {
        let _span = tracy_client::span!("RenderWindow::begin_frame");
        if self.minimized {
            return Ok(None);
        }
        if self.needs_rebuild {
            self.rebuild()?;
        }

        let slot = self.pacer.wait_slot()?;
        let acquired = self.swapchain.acquire_next_image(
            Some(&self.pacer.slot(slot).image_available),
            None,
            u64::MAX,
        )?;
        let image_index = match acquired {
            AcquireResult::Acquired(index) => index,
            // semaphore 已经被 signal，这一帧仍然需要提交
            AcquireResult::Suboptimal(index) => {
                self.needs_rebuild = true;
                index
            }
            AcquireResult::OutOfDate => {
                self.rebuild()?;
                return Ok(None);
            }
        };

        let frame = self.pacer.claim_image(image_index)?;
        let cmd = self.command_buffer(frame);
        // claim_image 已经等待了上一次使用这个 image 的提交
        cmd.mark_completed();
        cmd.reset()?;
        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, &format!("frame-{}", self.pacer.frame_id()))?;
        Ok(Some(frame))
    }

    /// 使用 settings 中的 clear color 开始默认的 render pass，并设置覆盖整个窗口的 viewport 和 scissor
    pub fn begin_default_render_pass(&self, frame: FrameContext) {
        let cmd = self.command_buffer(frame);
        let framebuffer = self.framebuffer(frame);
        let clear_values = present_clear_values(self.clear_color, 1.0, 0);
        cmd.begin_render_pass(
            &self.targets.render_pass,
            framebuffer,
            framebuffer.render_area(),
            &clear_values,
            vk::SubpassContents::INLINE,
        );
        cmd.set_full_viewport_scissor(framebuffer.extent(), false);
    }

    /// 结束录制，提交并 present
    pub fn end_frame(&mut self, frame: FrameContext) -> GfxResult<()> {
        let _span = tracy_client::span!("RenderWindow::end_frame");
        let cmd = self.command_buffer(frame);
        cmd.end()?;

        let sync = self.pacer.slot(frame.frame_slot);
        let submit = FrameSubmit::from_sync(sync);
        let queue = self.device.queue(QueueRole::Universal);
        queue.submit(&[cmd], &[(submit.wait, submit.wait_stage)], &[submit.signal], Some(&sync.in_flight))?;
        let presented = queue.present(&[&sync.render_complete], &[&self.swapchain], &[frame.image_index])?;

        self.pacer.advance();
        tracy_client::frame_mark();

        if !presented || self.needs_rebuild {
            self.rebuild()?;
        }
        Ok(())
    }

    /// 宽或高为 0 时只记录最小化状态，等到非 0 的尺寸再重建
    pub fn on_resized(&mut self, width: u32, height: u32) -> GfxResult<()> {
        match ResizeAction::of(width, height) {
            ResizeAction::Minimize => {
                log::info!("window minimized");
                self.minimized = true;
                Ok(())
            }
            ResizeAction::Rebuild(extent) => {
                self.minimized = false;
                self.desc.window_extent = extent;
                self.rebuild()
            }
        }
    }

    pub fn handle_event(&mut self, event: &WindowEvent) -> GfxResult<EventResponse> {
        match event {
            WindowEvent::Resized { width, height } => {
                self.on_resized(*width, *height)?;
                Ok(if self.minimized { EventResponse::None } else { EventResponse::Redraw })
            }
            WindowEvent::CloseRequested => Ok(EventResponse::Close),
            WindowEvent::RedrawRequested => Ok(EventResponse::Redraw),
            WindowEvent::Focused(focused) => {
                log::debug!("window focused: {}", focused);
                Ok(EventResponse::None)
            }
            _ => Ok(EventResponse::None),
        }
    }
}

impl Drop for RenderWindow {
    fn drop(&mut self) {
        // 所有 frame slot 的提交都需要执行完成
        if let Err(e) = self.device.wait_idle() {
            log::error!("failed to wait idle when destroying window: {}", e);
        }
        log::info!("destroy window, {} frames presented", self.pacer.frame_id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_action() {
        assert_eq!(ResizeAction::of(0, 0), ResizeAction::Minimize);
        assert_eq!(ResizeAction::of(1920, 0), ResizeAction::Minimize);
        assert_eq!(ResizeAction::of(0, 1080), ResizeAction::Minimize);
        assert_eq!(
            ResizeAction::of(1920, 1080),
            ResizeAction::Rebuild(vk::Extent2D {
                width: 1920,
                height: 1080
            })
        );
    }
}
