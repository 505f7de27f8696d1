use std::rc::Rc;

use ash::vk;

use crate::{
    descriptors::{descriptor_set::GfxDescriptorSet, descriptor_set_layout::GfxDescriptorSetLayout},
    error::GfxResult,
    foundation::{debug_messenger::DebugType, device::GfxDevice},
    vk_check,
};

/// 描述符池创建信息
///
/// 用于配置描述符池的创建参数，包括：
/// - 标志位
/// - 最大描述符集数量
/// - 每种类型描述符的最大数量
#[derive(Clone, Debug)]
pub struct GfxDescriptorPoolCreateInfo {
    pub flags: vk::DescriptorPoolCreateFlags,
    pub max_sets: u32,
    pub pool_sizes: Vec<vk::DescriptorPoolSize>,
}

impl GfxDescriptorPoolCreateInfo {
    /// 总是带有 FREE_DESCRIPTOR_SET，使描述符集可以单独释放
    #[inline]
    pub fn new(max_sets: u32, pool_sizes: Vec<vk::DescriptorPoolSize>) -> Self {
        Self {
            flags: vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET,
            max_sets,
            pool_sizes,
        }
    }

    #[inline]
    pub fn flags(mut self, flags: vk::DescriptorPoolCreateFlags) -> Self {
        self.flags |= flags;
        self
    }
}

/// 描述符池
///
/// 由这个池分配的 [`GfxDescriptorSet`] 持有池的引用计数，池会在所有描述符集释放之后才销毁。
pub struct GfxDescriptorPool {
    device: Rc<GfxDevice>,
    handle: vk::DescriptorPool,

    max_sets: u32,

    name: String,
}

impl DebugType for GfxDescriptorPool {
    fn debug_type_name() -> &'static str {
        "GfxDescriptorPool"
    }

    fn vk_handle(&self) -> impl vk::Handle + Copy {
        self.handle
    }
}

impl Drop for GfxDescriptorPool {
    fn drop(&mut self) {
        log::info!("destroying descriptor pool: {}", self.name);
        unsafe { self.device.destroy_descriptor_pool(self.handle, None) };
    }
}

impl GfxDescriptorPool {
    /// 创建新的描述符池
    ///
    /// # 参数
    /// - ci: 描述符池创建信息
    /// - name: 用于调试的名称
    pub fn new(device: &Rc<GfxDevice>, ci: &GfxDescriptorPoolCreateInfo, name: &str) -> GfxResult<Self> {
        let create_info =
            vk::DescriptorPoolCreateInfo::default().flags(ci.flags).max_sets(ci.max_sets).pool_sizes(&ci.pool_sizes);
        let handle = vk_check!(unsafe { device.ash_device().create_descriptor_pool(&create_info, None) })?;

        let pool = Self {
            device: device.clone(),
            handle,
            max_sets: ci.max_sets,
            name: name.to_string(),
        };
        device.set_debug_name(&pool, name);
        Ok(pool)
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.handle
    }

    #[inline]
    pub fn device(&self) -> &Rc<GfxDevice> {
        &self.device
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }

    /// 按照 layout 分配一个描述符集
    pub fn allocate(
        self: &Rc<Self>,
        layout: &Rc<GfxDescriptorSetLayout>,
        debug_name: impl AsRef<str>,
    ) -> GfxResult<GfxDescriptorSet> {
        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::default().descriptor_pool(self.handle).set_layouts(&layouts);
        let handles = vk_check!(unsafe { self.device.allocate_descriptor_sets(&alloc_info) })?;

        let set = GfxDescriptorSet::from_handle(self.clone(), layout.clone(), handles[0]);
        self.device.set_debug_name(&set, debug_name);
        Ok(set)
    }
}
