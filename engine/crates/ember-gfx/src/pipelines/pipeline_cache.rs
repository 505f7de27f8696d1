use std::{path::Path, rc::Rc};

use ash::vk;

use crate::{
    error::GfxResult,
    foundation::{debug_messenger::DebugType, device::GfxDevice},
    vk_check,
};

/// pipeline cache，内容是驱动相关的不透明数据，可以持久化到磁盘
pub struct GfxPipelineCache {
    device: Rc<GfxDevice>,
    handle: vk::PipelineCache,
}

impl GfxPipelineCache {
    /// initial_data 与当前驱动不匹配时，驱动会忽略它
    pub fn new(device: &Rc<GfxDevice>, initial_data: &[u8]) -> GfxResult<Self> {
        let create_info = vk::PipelineCacheCreateInfo::default().initial_data(initial_data);
        let handle = vk_check!(unsafe { device.ash_device().create_pipeline_cache(&create_info, None) })?;
        let cache = Self {
            device: device.clone(),
            handle,
        };
        device.set_debug_name(&cache, "pipeline-cache");
        Ok(cache)
    }

    /// 文件不存在时创建空的 cache
    pub fn load(device: &Rc<GfxDevice>, path: &Path) -> GfxResult<Self> {
        let data = match std::fs::read(path) {
            Ok(data) => {
                log::info!("load pipeline cache from {:?}, {} bytes", path, data.len());
                data
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("pipeline cache {:?} not found, create an empty one", path);
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        Self::new(device, &data)
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineCache {
        self.handle
    }

    pub fn data(&self) -> GfxResult<Vec<u8>> {
        vk_check!(unsafe { self.device.get_pipeline_cache_data(self.handle) })
    }

    pub fn save(&self, path: &Path) -> GfxResult<()> {
        let data = self.data()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &data)?;
        log::info!("save pipeline cache to {:?}, {} bytes", path, data.len());
        Ok(())
    }
}

impl Drop for GfxPipelineCache {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_cache(self.handle, None);
        }
    }
}

impl DebugType for GfxPipelineCache {
    fn debug_type_name() -> &'static str {
        "GfxPipelineCache"
    }

    fn vk_handle(&self) -> impl vk::Handle + Copy {
        self.handle
    }
}
