use std::rc::Rc;

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::{error::GfxResult, foundation::debug_messenger::DebugType, foundation::instance::GfxInstance, vk_check};

pub struct GfxSurface {
    instance: Rc<GfxInstance>,
    handle: vk::SurfaceKHR,
}

impl GfxSurface {
    pub fn new(
        instance: &Rc<GfxInstance>,
        raw_display_handle: RawDisplayHandle,
        raw_window_handle: RawWindowHandle,
    ) -> GfxResult<Self> {
        let handle = vk_check!(unsafe {
            ash_window::create_surface(
                instance.entry(),
                instance.ash_instance(),
                raw_display_handle,
                raw_window_handle,
                None,
            )
        })?;
        log::info!("surface created: {:?}", handle);

        Ok(Self {
            instance: instance.clone(),
            handle,
        })
    }
}

// getters
impl GfxSurface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    #[inline]
    pub fn instance(&self) -> &Rc<GfxInstance> {
        &self.instance
    }
}

impl Drop for GfxSurface {
    fn drop(&mut self) {
        unsafe { self.instance.surface_loader().destroy_surface(self.handle, None) }
    }
}

impl DebugType for GfxSurface {
    fn debug_type_name() -> &'static str {
        "GfxSurface"
    }

    fn vk_handle(&self) -> impl vk::Handle + Copy {
        self.handle
    }
}
