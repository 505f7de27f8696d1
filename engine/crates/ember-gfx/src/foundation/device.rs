use std::{
    ffi::{CStr, CString},
    mem::ManuallyDrop,
    ops::Deref,
    rc::Rc,
};

use ash::vk;
use itertools::Itertools;

use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::{
    commands::{
        command_buffer::GfxCommandBuffer, command_pool::GfxCommandPool, event::GfxEvent, fence::GfxFence,
        queue::GfxQueue, semaphore::GfxSemaphore,
    },
    descriptors::{
        descriptor_pool::{GfxDescriptorPool, GfxDescriptorPoolCreateInfo},
        descriptor_set_layout::GfxDescriptorSetLayout,
    },
    error::{GfxError, GfxResult},
    foundation::{
        debug_messenger::DebugType,
        instance::GfxInstance,
        physical_device::GfxPhysicalDevice,
        queue_family::{QueueFamilyAssignment, QueueRole},
    },
    pipelines::{
        framebuffer::GfxFramebuffer,
        pipeline::{GfxGraphicsPipelineCreateInfo, GfxPipeline},
        pipeline_cache::GfxPipelineCache,
        pipeline_layout::GfxPipelineLayout,
        render_pass::GfxRenderPass,
        shader::{GfxShader, GfxShaderModule},
    },
    resources::{
        buffer::{GfxBuffer, GfxBufferCreateInfo},
        buffer_view::GfxBufferView,
        image::{GfxImage, GfxImageCreateInfo},
        image_view::GfxImageView,
        sampler::GfxSampler,
    },
    swapchain::{
        surface::GfxSurface,
        swapchain::{GfxSwapchain, GfxSwapchainDesc},
    },
    vk_check,
};

/// Vulkan 逻辑设备
///
/// 持有设备函数表、扩展函数表、内存分配器、每种用途的队列以及一次性命令使用的 transient command pool。
/// 所有 GPU 资源都持有 `Rc<GfxDevice>`，设备不会反向引用任何资源。
///
/// # 扩展支持
/// - Swapchain (KHR)
/// - Debug Utils (EXT)，仅在 instance 启用时可用
pub struct GfxDevice {
    physical_device: Rc<GfxPhysicalDevice>,

    /// 核心 Vulkan 设备 API
    device: ash::Device,
    /// 交换链扩展 API
    swapchain: ash::khr::swapchain::Device,
    /// 调试工具扩展 API
    debug_utils: Option<ash::ext::debug_utils::Device>,

    /// 需要在 device 之前销毁
    allocator: ManuallyDrop<vk_mem::Allocator>,

    queue_families: QueueFamilyAssignment,
    /// 按 [`QueueRole::index`] 索引，缺失的用途使用 universal 队列
    queues: [vk::Queue; 3],
    /// 每个 family 一个 transient pool: (family, pool)
    transient_pools: Vec<(u32, vk::CommandPool)>,

    synchronization2: bool,
    enabled_extensions: Vec<CString>,
}

// new & init
impl GfxDevice {
    pub fn new(physical_device: Rc<GfxPhysicalDevice>, extension_names: &[&CStr]) -> GfxResult<Rc<Self>> {
        let _span = tracy_client::span!("GfxDevice::new");

        let queue_families = physical_device.queue_family_assignment();
        if !queue_families.has_universal() {
            return Err(GfxError::NoUniversalQueue);
        }
        log::info!("queue family assignment: {:?}", queue_families);

        let unsupported = extension_names
            .iter()
            .filter(|name| !physical_device.supports_device_extension(name))
            .collect_vec();
        if !unsupported.is_empty() {
            log::error!("device extensions are not supported: {:?}", unsupported);
            return Err(GfxError::vk(vk::Result::ERROR_EXTENSION_NOT_PRESENT, "vkCreateDevice"));
        }
        log::info!("device exts: {}", extension_names.iter().map(|e| format!("\n\t{:?}", e)).join(""));

        let priorities = [1.0_f32];
        let queue_cis = queue_families
            .distinct_families()
            .into_iter()
            .map(|family| vk::DeviceQueueCreateInfo::default().queue_family_index(family).queue_priorities(&priorities))
            .collect_vec();

        // 开启所有受支持的 core features
        let features = *physical_device.features();
        let synchronization2 = physical_device.supports_synchronization2();
        let mut features13 = vk::PhysicalDeviceVulkan13Features::default().synchronization2(synchronization2);
        let mut features2 = vk::PhysicalDeviceFeatures2::default().features(features);
        if physical_device.api_version() >= vk::API_VERSION_1_3 {
            features2 = features2.push_next(&mut features13);
        }

        let ext_ptrs = extension_names.iter().map(|e| e.as_ptr()).collect_vec();
        let device_ci = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_cis)
            .enabled_extension_names(&ext_ptrs)
            .push_next(&mut features2);

        let instance = physical_device.instance().clone();
        let ash_instance = instance.ash_instance();
        let device = vk_check!(unsafe { ash_instance.create_device(physical_device.handle(), &device_ci, None) })?;

        let mut vma_ci = vk_mem::AllocatorCreateInfo::new(ash_instance, &device, physical_device.handle());
        vma_ci.vulkan_api_version = physical_device.api_version();
        let allocator = match vk_check!(unsafe { vk_mem::Allocator::new(vma_ci) }) {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e);
            }
        };

        let queues = QueueRole::ALL.map(|role| unsafe { device.get_device_queue(queue_families.family(role), 0) });

        let mut transient_pools = Vec::new();
        for family in queue_families.distinct_families() {
            let pool_ci = vk::CommandPoolCreateInfo::default()
                .queue_family_index(family)
                .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            match vk_check!(unsafe { device.create_command_pool(&pool_ci, None) }) {
                Ok(pool) => transient_pools.push((family, pool)),
                Err(e) => {
                    unsafe {
                        for (_, pool) in transient_pools {
                            device.destroy_command_pool(pool, None);
                        }
                        drop(allocator);
                        device.destroy_device(None);
                    }
                    return Err(e);
                }
            }
        }

        let swapchain = ash::khr::swapchain::Device::new(ash_instance, &device);
        let debug_utils =
            instance.debug_utils_enabled().then(|| ash::ext::debug_utils::Device::new(ash_instance, &device));

        log::info!(
            "device created on {}, synchronization2: {}",
            physical_device.device_name(),
            synchronization2
        );

        let gfx_device = Rc::new(Self {
            physical_device,
            device,
            swapchain,
            debug_utils,
            allocator: ManuallyDrop::new(allocator),
            queue_families,
            queues,
            transient_pools,
            synchronization2,
            enabled_extensions: extension_names.iter().map(|e| (*e).to_owned()).collect(),
        });

        for role in QueueRole::ALL {
            gfx_device.set_object_debug_name(gfx_device.queues[role.index()], format!("{:?}-queue", role));
        }

        Ok(gfx_device)
    }
}

// getters
impl GfxDevice {
    #[inline]
    pub fn handle(&self) -> vk::Device {
        self.device.handle()
    }

    #[inline]
    pub fn ash_device(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn physical_device(&self) -> &Rc<GfxPhysicalDevice> {
        &self.physical_device
    }

    #[inline]
    pub fn instance(&self) -> &Rc<GfxInstance> {
        self.physical_device.instance()
    }

    #[inline]
    pub fn swapchain_loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain
    }

    #[inline]
    pub fn debug_utils(&self) -> Option<&ash::ext::debug_utils::Device> {
        self.debug_utils.as_ref()
    }

    #[inline]
    pub fn allocator(&self) -> &vk_mem::Allocator {
        &self.allocator
    }

    /// 是否可以使用 `vkCmdPipelineBarrier2` 等 synchronization2 接口
    #[inline]
    pub fn supports_synchronization2(&self) -> bool {
        self.synchronization2
    }

    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyAssignment {
        &self.queue_families
    }

    /// 该用途实际使用的 family，缺失的用途回落到 universal
    #[inline]
    pub fn queue_family_index(&self, role: QueueRole) -> u32 {
        self.queue_families.family(role)
    }

    pub fn is_extension_enabled(&self, name: &CStr) -> bool {
        self.enabled_extensions.iter().any(|e| e.as_c_str() == name)
    }

    /// 某个 memory type 的属性
    #[inline]
    pub fn memory_type_flags(&self, memory_type_index: u32) -> vk::MemoryPropertyFlags {
        self.physical_device.memory_properties().memory_types[memory_type_index as usize].property_flags
    }
}

// queues & pools
impl GfxDevice {
    /// 不同用途可能得到同一个队列，调用方不能假设队列互相独立
    pub fn queue(self: &Rc<Self>, role: QueueRole) -> GfxQueue {
        GfxQueue::new(self.clone(), self.queues[role.index()], self.queue_family_index(role), role)
    }

    /// 设备持有的 transient pool，用于一次性提交的命令
    pub fn transient_command_pool(self: &Rc<Self>, role: QueueRole) -> Rc<GfxCommandPool> {
        let family = self.queue_family_index(role);
        let pool = self
            .transient_pools
            .iter()
            .find(|(f, _)| *f == family)
            .map(|(_, pool)| *pool)
            .unwrap_or_default();
        Rc::new(GfxCommandPool::borrowed(
            self.clone(),
            pool,
            family,
            vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        ))
    }

    /// 录制一个一次性的 command buffer，提交到对应用途的队列并阻塞等待完成
    ///
    /// 只用于资源上传、读回等一次性的工作，不要在每帧的渲染中使用
    pub fn one_time_exec<F>(self: &Rc<Self>, role: QueueRole, func: F, name: &str) -> GfxResult<()>
    where
        F: FnOnce(&GfxCommandBuffer),
    {
        let _span = tracy_client::span!("GfxDevice::one_time_exec");
        let pool = self.transient_command_pool(role);
        let command_buffer = pool.allocate(vk::CommandBufferLevel::PRIMARY, name)?;

        command_buffer.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, name)?;
        func(&command_buffer);
        command_buffer.end()?;

        self.queue(role).submit_and_wait_for_completion(&[&command_buffer], &[], &[])
    }
}

// tools
impl GfxDevice {
    /// 仅在启用了 debug utils 时生效
    pub fn set_object_debug_name<T: vk::Handle + Copy>(&self, handle: T, name: impl AsRef<str>) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name.as_ref()) else {
            return;
        };
        let info = vk::DebugUtilsObjectNameInfoEXT::default().object_name(name.as_c_str()).object_handle(handle);
        if let Err(e) = unsafe { debug_utils.set_debug_utils_object_name(&info) } {
            log::warn!("failed to set debug name {:?}: {:?}", name, e);
        }
    }

    pub fn set_debug_name<T: DebugType>(&self, handle: &T, name: impl AsRef<str>) {
        self.set_object_debug_name(handle.vk_handle(), format!("{}::{}", T::debug_type_name(), name.as_ref()));
    }

    /// 等待所有队列完成，仅用于 resize 和销毁
    pub fn wait_idle(&self) -> GfxResult<()> {
        let _span = tracy_client::span!("GfxDevice::wait_idle");
        vk_check!(unsafe { self.device.device_wait_idle() })
    }
}

// factory
//
// 创建出来的对象都持有 `Rc<GfxDevice>`，可以在任意顺序释放
impl GfxDevice {
    pub fn create_buffer(self: &Rc<Self>, create_info: &GfxBufferCreateInfo, name: &str) -> GfxResult<Rc<GfxBuffer>> {
        GfxBuffer::new(self, create_info, name).map(Rc::new)
    }

    #[inline]
    pub fn create_uniform_buffer(
        self: &Rc<Self>,
        size: vk::DeviceSize,
        persistent_map: bool,
        name: &str,
    ) -> GfxResult<Rc<GfxBuffer>> {
        self.create_buffer(&GfxBufferCreateInfo::uniform(size, persistent_map), name)
    }

    #[inline]
    pub fn create_storage_buffer(self: &Rc<Self>, size: vk::DeviceSize, name: &str) -> GfxResult<Rc<GfxBuffer>> {
        self.create_buffer(&GfxBufferCreateInfo::storage(size), name)
    }

    #[inline]
    pub fn create_index_buffer(self: &Rc<Self>, size: vk::DeviceSize, name: &str) -> GfxResult<Rc<GfxBuffer>> {
        self.create_buffer(&GfxBufferCreateInfo::index(size), name)
    }

    #[inline]
    pub fn create_vertex_buffer(self: &Rc<Self>, size: vk::DeviceSize, name: &str) -> GfxResult<Rc<GfxBuffer>> {
        self.create_buffer(&GfxBufferCreateInfo::vertex(size), name)
    }

    #[inline]
    pub fn create_staging_buffer(self: &Rc<Self>, size: vk::DeviceSize, name: &str) -> GfxResult<Rc<GfxBuffer>> {
        self.create_buffer(&GfxBufferCreateInfo::staging(size), name)
    }

    pub fn create_buffer_view(
        &self,
        buffer: &Rc<GfxBuffer>,
        format: vk::Format,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
        name: &str,
    ) -> GfxResult<GfxBufferView> {
        GfxBufferView::new(buffer.clone(), format, offset, range, name)
    }

    pub fn create_image(
        self: &Rc<Self>,
        create_info: &GfxImageCreateInfo,
        alloc_info: &vk_mem::AllocationCreateInfo,
        name: &str,
    ) -> GfxResult<Rc<GfxImage>> {
        GfxImage::new(self, create_info, alloc_info, name)
    }

    pub fn create_texture_2d(
        self: &Rc<Self>,
        extent: vk::Extent2D,
        format: vk::Format,
        mip_levels: u32,
        name: &str,
    ) -> GfxResult<Rc<GfxImage>> {
        GfxImage::new_device_local(self, &GfxImageCreateInfo::texture_2d(extent, format, mip_levels), name)
    }

    pub fn create_depth_stencil_image(
        self: &Rc<Self>,
        extent: vk::Extent2D,
        format: vk::Format,
        name: &str,
    ) -> GfxResult<Rc<GfxImage>> {
        GfxImage::new_device_local(self, &GfxImageCreateInfo::depth_stencil(extent, format), name)
    }

    /// 包装外部创建的 image，生命周期由外部负责
    pub fn create_image_from_foreign_handle(
        self: &Rc<Self>,
        handle: vk::Image,
        format: vk::Format,
        extent: vk::Extent2D,
        usage: vk::ImageUsageFlags,
        name: &str,
    ) -> GfxResult<Rc<GfxImage>> {
        GfxImage::from_external(self, handle, format, extent, usage, name)
    }

    pub fn create_sampler(self: &Rc<Self>, create_info: &vk::SamplerCreateInfo, name: &str) -> GfxResult<GfxSampler> {
        GfxSampler::new(self, create_info, name)
    }

    pub fn create_shader_module(self: &Rc<Self>, shader: &GfxShader) -> GfxResult<Rc<GfxShaderModule>> {
        GfxShaderModule::new(self, shader).map(Rc::new)
    }

    pub fn create_graphics_pipeline(
        self: &Rc<Self>,
        create_info: &GfxGraphicsPipelineCreateInfo,
        layout: &Rc<GfxPipelineLayout>,
        cache: Option<&GfxPipelineCache>,
        name: &str,
    ) -> GfxResult<GfxPipeline> {
        GfxPipeline::new_graphics(self, create_info, layout.clone(), cache, name)
    }

    pub fn create_compute_pipeline(
        self: &Rc<Self>,
        shader: &GfxShaderModule,
        layout: &Rc<GfxPipelineLayout>,
        cache: Option<&GfxPipelineCache>,
        name: &str,
    ) -> GfxResult<GfxPipeline> {
        GfxPipeline::new_compute(self, shader, layout.clone(), cache, name)
    }

    pub fn create_pipeline_layout(
        self: &Rc<Self>,
        set_layouts: &[Rc<GfxDescriptorSetLayout>],
        push_constant_ranges: &[vk::PushConstantRange],
        name: &str,
    ) -> GfxResult<Rc<GfxPipelineLayout>> {
        GfxPipelineLayout::new(self, set_layouts, push_constant_ranges, name).map(Rc::new)
    }

    pub fn create_pipeline_cache(self: &Rc<Self>, initial_data: &[u8]) -> GfxResult<GfxPipelineCache> {
        GfxPipelineCache::new(self, initial_data)
    }

    pub fn create_descriptor_set_layout(
        self: &Rc<Self>,
        bindings: &[vk::DescriptorSetLayoutBinding<'static>],
        flags: vk::DescriptorSetLayoutCreateFlags,
        name: &str,
    ) -> GfxResult<Rc<GfxDescriptorSetLayout>> {
        GfxDescriptorSetLayout::new(self, bindings, flags, name).map(Rc::new)
    }

    pub fn create_descriptor_pool(
        self: &Rc<Self>,
        create_info: &GfxDescriptorPoolCreateInfo,
        name: &str,
    ) -> GfxResult<Rc<GfxDescriptorPool>> {
        GfxDescriptorPool::new(self, create_info, name).map(Rc::new)
    }

    pub fn create_render_pass(
        self: &Rc<Self>,
        attachments: &[vk::AttachmentDescription],
        subpasses: &[vk::SubpassDescription],
        dependencies: &[vk::SubpassDependency],
        name: &str,
    ) -> GfxResult<Rc<GfxRenderPass>> {
        GfxRenderPass::new(self, attachments, subpasses, dependencies, name).map(Rc::new)
    }

    pub fn create_framebuffer(
        self: &Rc<Self>,
        render_pass: &GfxRenderPass,
        attachments: &[Rc<GfxImageView>],
        extent: vk::Extent2D,
        name: &str,
    ) -> GfxResult<GfxFramebuffer> {
        GfxFramebuffer::new(self, render_pass, attachments, extent, name)
    }

    pub fn create_command_pool(
        self: &Rc<Self>,
        role: QueueRole,
        flags: vk::CommandPoolCreateFlags,
        name: &str,
    ) -> GfxResult<Rc<GfxCommandPool>> {
        GfxCommandPool::new(self, self.queue_family_index(role), flags, name).map(Rc::new)
    }

    #[inline]
    pub fn create_fence(self: &Rc<Self>, signaled: bool, name: &str) -> GfxResult<GfxFence> {
        GfxFence::new(self, signaled, name)
    }

    #[inline]
    pub fn create_semaphore(self: &Rc<Self>, name: &str) -> GfxResult<GfxSemaphore> {
        GfxSemaphore::new(self, name)
    }

    /// 包装外部创建的 semaphore，不负责销毁
    #[inline]
    pub fn create_foreign_semaphore(self: &Rc<Self>, handle: vk::Semaphore) -> GfxSemaphore {
        GfxSemaphore::from_foreign_handle(self, handle)
    }

    #[inline]
    pub fn create_event(self: &Rc<Self>, name: &str) -> GfxResult<GfxEvent> {
        GfxEvent::new(self, name)
    }

    pub fn create_surface(
        &self,
        raw_display_handle: RawDisplayHandle,
        raw_window_handle: RawWindowHandle,
    ) -> GfxResult<Rc<GfxSurface>> {
        GfxSurface::new(self.instance(), raw_display_handle, raw_window_handle).map(Rc::new)
    }

    pub fn create_swapchain(
        self: &Rc<Self>,
        surface: &Rc<GfxSurface>,
        desc: &GfxSwapchainDesc,
        old: Option<&GfxSwapchain>,
    ) -> GfxResult<GfxSwapchain> {
        GfxSwapchain::new(self, surface.clone(), desc, old)
    }
}

impl Deref for GfxDevice {
    type Target = ash::Device;
    fn deref(&self) -> &Self::Target {
        &self.device
    }
}

impl Drop for GfxDevice {
    fn drop(&mut self) {
        log::info!("destroying device");
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                log::error!("device wait idle failed before destroy: {:?}", e);
            }
            for (_, pool) in self.transient_pools.drain(..) {
                self.device.destroy_command_pool(pool, None);
            }
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
    }
}

impl DebugType for GfxDevice {
    fn debug_type_name() -> &'static str {
        "GfxDevice"
    }
    fn vk_handle(&self) -> impl vk::Handle + Copy {
        self.device.handle()
    }
}
