use std::path::Path;

use ash::vk;
use ember_gfx::{
    settings::GfxSettings,
    window::{
        app_context::{AppContext, WindowId},
        event::{EventResponse, KeyCode, WindowEvent},
        frame::FrameContext,
        render_window::RenderWindow,
    },
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::{
    application::ApplicationHandler,
    event::{DeviceEvent, DeviceId, StartCause},
    event_loop::ActiveEventLoop,
    window::Window,
};

use crate::winit_event_adapter::WinitEventAdapter;

/// 具体的应用逻辑，由 [`WinitApp`] 驱动
pub trait OuterApp {
    fn init(&mut self, _context: &AppContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// command buffer 已经处于录制状态，默认的 render pass 尚未开始
    fn draw(&mut self, window: &RenderWindow, frame: FrameContext);

    fn on_event(&mut self, _event: &WindowEvent) {}
}

pub struct WinitApp {
    outer_app: Box<dyn OuterApp>,
    settings: GfxSettings,

    // context 持有 surface，需要先于 window 销毁
    context: Option<AppContext>,
    window: Option<Window>,

    /// event loop 的回调中无法返回错误，暂存之后由 run 返回
    error: Option<anyhow::Error>,
}
// 总的 main 函数
impl WinitApp {
    /// 整个程序的入口，settings 文件不存在时使用默认配置
    pub fn run(outer_app: Box<dyn OuterApp>, settings_path: &Path) -> anyhow::Result<()> {
        ember_crate_tools::init_log::init_log();
        tracy_client::Client::start();
        tracy_client::set_thread_name!("MainThread");

        let settings = if settings_path.exists() {
            GfxSettings::load(settings_path)?
        } else {
            log::info!("settings file {:?} not found, use default settings", settings_path);
            GfxSettings::default()
        };

        let event_loop = winit::event_loop::EventLoop::new()?;
        let mut app = Self {
            outer_app,
            settings,
            context: None,
            window: None,
            error: None,
        };
        event_loop.run_app(&mut app)?;
        log::info!("end run.");

        match app.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
// new & init
impl WinitApp {
    /// 在 window 创建之后调用，初始化 AppContext 和 RenderWindow
    fn init_after_window(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let window_attr = Window::default_attributes()
            .with_title(self.settings.app_name.clone())
            .with_inner_size(winit::dpi::LogicalSize::new(1200.0, 800.0));
        let window = event_loop.create_window(window_attr)?;

        let raw_display_handle = window.display_handle()?.as_raw();
        let raw_window_handle = window.window_handle()?.as_raw();
        let size = window.inner_size();

        let mut context = AppContext::new(self.settings.clone(), Some(raw_display_handle))?;
        context.create_window(
            Self::window_id(&window),
            raw_display_handle,
            raw_window_handle,
            vk::Extent2D {
                width: size.width,
                height: size.height,
            },
        )?;
        self.outer_app.init(&context)?;

        self.context = Some(context);
        self.window = Some(window);
        Ok(())
    }

    #[inline]
    fn window_id(window: &Window) -> WindowId {
        WindowId(u64::from(window.id()))
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        self.error = Some(error);
        event_loop.exit();
    }
}
// update
impl WinitApp {
    fn redraw(&mut self, id: WindowId) -> anyhow::Result<()> {
        let _span = tracy_client::span!("WinitApp::redraw");
        let Some(window) = self.context.as_mut().and_then(|c| c.window_mut(id)) else {
            return Ok(());
        };

        if let Some(frame) = window.begin_frame()? {
            window.begin_default_render_pass(frame);
            self.outer_app.draw(window, frame);
            window.command_buffer(frame).end_render_pass();
            window.end_frame(frame)?;
        }
        Ok(())
    }

    fn handle_window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        id: WindowId,
        event: &WindowEvent,
    ) -> anyhow::Result<()> {
        self.outer_app.on_event(event);
        if let WindowEvent::KeyboardInput {
            key: KeyCode::Escape,
            pressed: true,
        } = event
        {
            event_loop.exit();
            return Ok(());
        }

        let Some(context) = self.context.as_mut() else {
            return Ok(());
        };
        match context.dispatch(id, event)? {
            EventResponse::Close => {
                context.remove_window(id);
                event_loop.exit();
            }
            EventResponse::Redraw => {
                if matches!(event, WindowEvent::RedrawRequested) {
                    self.redraw(id)?;
                } else if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            EventResponse::None => (),
        }
        Ok(())
    }
}
// 各种 winit 的事件处理
impl ApplicationHandler for WinitApp {
    fn new_events(&mut self, _event_loop: &ActiveEventLoop, _cause: StartCause) {}

    // 建议在这里创建 window 和 Renderer
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        log::info!("winit event: resumed");

        if let Err(e) = self.init_after_window(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: winit::window::WindowId,
        event: winit::event::WindowEvent,
    ) {
        let event = WinitEventAdapter::from_winit_event(&event);
        let id = WindowId(u64::from(window_id));
        if let Err(e) = self.handle_window_event(event_loop, id, &event) {
            self.fail(event_loop, e);
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, _event: DeviceEvent) {}

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        log::warn!("winit event: suspended");
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        log::info!("loop exiting");
        // surface 需要在 winit window 之前销毁
        self.context = None;
        self.window = None;
    }

    fn memory_warning(&mut self, _event_loop: &ActiveEventLoop) {
        log::warn!("memory warning");
    }
}
