use std::{collections::HashMap, rc::Rc};

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::{
    error::{GfxError, GfxResult},
    foundation::{device::GfxDevice, instance::GfxInstance},
    settings::GfxSettings,
    window::{
        event::{EventResponse, WindowEvent},
        render_window::RenderWindow,
    },
};

/// 窗口系统分配的窗口 id
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u64);

/// 应用的上下文，持有 instance、device 以及所有的窗口
///
/// 由应用显式创建并传递，不存在全局的窗口注册表
pub struct AppContext {
    // 窗口需要先于 device 销毁
    windows: HashMap<WindowId, RenderWindow>,
    device: Rc<GfxDevice>,
    instance: Rc<GfxInstance>,
    settings: GfxSettings,
}

// new & init
impl AppContext {
    /// `display` 为 None 时不会启用 surface 相关的 extensions，只能用于离屏的工作
    pub fn new(settings: GfxSettings, display: Option<RawDisplayHandle>) -> GfxResult<Self> {
        let _span = tracy_client::span!("AppContext::new");
        let instance = GfxInstance::new(&settings, display)?;
        let physical_device = instance.pick_physical_device(settings.prefer_discrete_gpu)?;
        let device = physical_device.create_device_auto()?;

        Ok(Self {
            windows: HashMap::new(),
            device,
            instance,
            settings,
        })
    }
}

// getters
impl AppContext {
    #[inline]
    pub fn instance(&self) -> &Rc<GfxInstance> {
        &self.instance
    }

    #[inline]
    pub fn device(&self) -> &Rc<GfxDevice> {
        &self.device
    }

    #[inline]
    pub fn settings(&self) -> &GfxSettings {
        &self.settings
    }

    #[inline]
    pub fn window(&self, id: WindowId) -> Option<&RenderWindow> {
        self.windows.get(&id)
    }

    #[inline]
    pub fn window_mut(&mut self, id: WindowId) -> Option<&mut RenderWindow> {
        self.windows.get_mut(&id)
    }

    pub fn window_ids(&self) -> Vec<WindowId> {
        let mut ids = self.windows.keys().copied().collect::<Vec<_>>();
        ids.sort();
        ids
    }
}

// windows
impl AppContext {
    /// 同一个 id 重复创建时，旧的窗口会被替换
    pub fn create_window(
        &mut self,
        id: WindowId,
        raw_display_handle: RawDisplayHandle,
        raw_window_handle: RawWindowHandle,
        extent: vk::Extent2D,
    ) -> GfxResult<&mut RenderWindow> {
        let window = RenderWindow::new(&self.device, &self.settings, raw_display_handle, raw_window_handle, extent)?;
        if self.windows.insert(id, window).is_some() {
            log::warn!("window {:?} is replaced", id);
        }
        log::info!("window {:?} created, {} windows in total", id, self.windows.len());
        self.windows.get_mut(&id).ok_or_else(|| GfxError::Window(format!("window {:?} not found", id)))
    }

    pub fn remove_window(&mut self, id: WindowId) -> Option<RenderWindow> {
        let window = self.windows.remove(&id);
        if window.is_some() {
            log::info!("window {:?} removed", id);
        }
        window
    }

    /// 将事件交给对应窗口处理，未知的窗口忽略
    pub fn dispatch(&mut self, id: WindowId, event: &WindowEvent) -> GfxResult<EventResponse> {
        match self.windows.get_mut(&id) {
            Some(window) => window.handle_event(event),
            None => {
                log::debug!("event {:?} for unknown window {:?}", event, id);
                Ok(EventResponse::None)
            }
        }
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::error!("failed to wait idle when destroying app context: {}", e);
        }
        self.windows.clear();
        log::info!("app context destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_id_ordering() {
        let mut ids = vec![WindowId(3), WindowId(1), WindowId(2)];
        ids.sort();
        assert_eq!(ids, vec![WindowId(1), WindowId(2), WindowId(3)]);
    }
}
