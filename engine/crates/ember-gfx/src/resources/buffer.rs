use std::{cell::RefCell, ptr, rc::Rc};

use ash::vk;
use vk_mem::Alloc;

use crate::{
    commands::barrier::{GfxBarrierMask, GfxBufferBarrier},
    error::{GfxError, GfxResult},
    foundation::{debug_messenger::DebugType, device::GfxDevice, queue_family::QueueRole},
    vk_check,
};

/// buffer 内存的期望位置，决定 vma 的 usage 和 host access
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GfxMemoryLocation {
    /// 优先 device local，host 不可直接访问
    GpuOnly,
    /// host 顺序写入，GPU 读取（uniform、staging）
    CpuToGpu,
    /// GPU 写入，host 随机读取（readback）
    GpuToCpu,
}

impl GfxMemoryLocation {
    fn allocation_ci(self) -> vk_mem::AllocationCreateInfo {
        match self {
            Self::GpuOnly => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                ..Default::default()
            },
            Self::CpuToGpu => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferHost,
                flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
                ..Default::default()
            },
            Self::GpuToCpu => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferHost,
                flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM,
                ..Default::default()
            },
        }
    }
}

/// host 与 buffer 之间传输数据的方式
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GfxTransferPath {
    /// host visible：直接 map；非 coherent 内存需要 flush / invalidate
    Mapped { non_coherent: bool },
    /// 通过临时 staging buffer 和一次性 command buffer
    Staged,
}

impl GfxTransferPath {
    pub fn of(memory_flags: vk::MemoryPropertyFlags) -> Self {
        if memory_flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            Self::Mapped {
                non_coherent: !memory_flags.contains(vk::MemoryPropertyFlags::HOST_COHERENT),
            }
        } else {
            Self::Staged
        }
    }

    /// 经过 staging 时，buffer 自身作为 copy 的源或目标，需要对应的 transfer usage
    pub fn required_usage(self, read: bool) -> vk::BufferUsageFlags {
        match (self, read) {
            (Self::Mapped { .. }, _) => vk::BufferUsageFlags::empty(),
            (Self::Staged, true) => vk::BufferUsageFlags::TRANSFER_SRC,
            (Self::Staged, false) => vk::BufferUsageFlags::TRANSFER_DST,
        }
    }
}

/// `[offset, offset + len)` 是否落在 size 之内，溢出时视为越界
#[inline]
pub fn range_in_bounds(offset: vk::DeviceSize, len: usize, size: vk::DeviceSize) -> bool {
    (len as vk::DeviceSize).checked_add(offset).is_some_and(|end| end <= size)
}

/// GPU only 的 buffer 需要能够通过 staging 写入和读回
const STAGED_TRANSFER: vk::BufferUsageFlags =
    vk::BufferUsageFlags::from_raw(vk::BufferUsageFlags::TRANSFER_SRC.as_raw() | vk::BufferUsageFlags::TRANSFER_DST.as_raw());

#[derive(Copy, Clone, Debug)]
pub struct GfxBufferCreateInfo {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub location: GfxMemoryLocation,
    /// 创建时 map，直到销毁时才 unmap
    pub persistent_map: bool,
    /// buffer 起始地址的对齐，默认对齐到 8 字节
    pub alignment: Option<vk::DeviceSize>,
}

// presets
impl GfxBufferCreateInfo {
    #[inline]
    pub fn new(size: vk::DeviceSize, usage: vk::BufferUsageFlags, location: GfxMemoryLocation) -> Self {
        Self {
            size,
            usage,
            location,
            persistent_map: false,
            alignment: None,
        }
    }

    /// uniform buffer 每帧都会被 host 改写，可以选择常驻 map
    #[inline]
    pub fn uniform(size: vk::DeviceSize, persistent_map: bool) -> Self {
        Self {
            persistent_map,
            ..Self::new(size, vk::BufferUsageFlags::UNIFORM_BUFFER, GfxMemoryLocation::CpuToGpu)
        }
    }

    #[inline]
    pub fn storage(size: vk::DeviceSize) -> Self {
        Self::new(
            size,
            vk::BufferUsageFlags::STORAGE_BUFFER | STAGED_TRANSFER,
            GfxMemoryLocation::GpuOnly,
        )
    }

    #[inline]
    pub fn index(size: vk::DeviceSize) -> Self {
        Self::new(
            size,
            vk::BufferUsageFlags::INDEX_BUFFER | STAGED_TRANSFER,
            GfxMemoryLocation::GpuOnly,
        )
    }

    #[inline]
    pub fn vertex(size: vk::DeviceSize) -> Self {
        Self::new(
            size,
            vk::BufferUsageFlags::VERTEX_BUFFER | STAGED_TRANSFER,
            GfxMemoryLocation::GpuOnly,
        )
    }

    #[inline]
    pub fn indirect(size: vk::DeviceSize) -> Self {
        Self::new(
            size,
            vk::BufferUsageFlags::INDIRECT_BUFFER | vk::BufferUsageFlags::STORAGE_BUFFER | STAGED_TRANSFER,
            GfxMemoryLocation::GpuOnly,
        )
    }

    #[inline]
    pub fn staging(size: vk::DeviceSize) -> Self {
        Self::new(size, vk::BufferUsageFlags::TRANSFER_SRC, GfxMemoryLocation::CpuToGpu)
    }

    /// 用于把 GPU 数据读回 host
    #[inline]
    pub fn readback(size: vk::DeviceSize) -> Self {
        Self::new(size, vk::BufferUsageFlags::TRANSFER_DST, GfxMemoryLocation::GpuToCpu)
    }

    #[inline]
    pub fn uniform_texel(size: vk::DeviceSize) -> Self {
        Self::new(
            size,
            vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER | STAGED_TRANSFER,
            GfxMemoryLocation::GpuOnly,
        )
    }

    #[inline]
    pub fn storage_texel(size: vk::DeviceSize) -> Self {
        Self::new(
            size,
            vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER | STAGED_TRANSFER,
            GfxMemoryLocation::GpuOnly,
        )
    }

    // builder
    #[inline]
    pub fn persistent_map(mut self, persistent_map: bool) -> Self {
        self.persistent_map = persistent_map;
        self
    }

    #[inline]
    pub fn alignment(mut self, alignment: vk::DeviceSize) -> Self {
        self.alignment = Some(alignment);
        self
    }
}

pub struct GfxBuffer {
    device: Rc<GfxDevice>,

    handle: vk::Buffer,
    /// vma 的 map / unmap 需要可变借用
    allocation: RefCell<vk_mem::Allocation>,

    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    memory_flags: vk::MemoryPropertyFlags,

    /// 在初始化阶段写死
    map_ptr: Option<*mut u8>,

    debug_name: String,
}

impl DebugType for GfxBuffer {
    fn debug_type_name() -> &'static str {
        "GfxBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle + Copy {
        self.handle
    }
}

impl Drop for GfxBuffer {
    fn drop(&mut self) {
        log::debug!("destroying buffer: {}", self.debug_name);
        let allocator = self.device.allocator();
        let allocation = self.allocation.get_mut();
        unsafe {
            if self.map_ptr.is_some() {
                allocator.unmap_memory(allocation);
            }
            allocator.destroy_buffer(self.handle, allocation);
        }
    }
}

// init & destroy
impl GfxBuffer {
    pub fn new(device: &Rc<GfxDevice>, create_info: &GfxBufferCreateInfo, debug_name: impl AsRef<str>) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxBuffer::new");
        assert!(create_info.size > 0, "buffer size must be greater than 0");

        let buffer_ci = vk::BufferCreateInfo::default()
            .size(create_info.size)
            .usage(create_info.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let alloc_ci = create_info.location.allocation_ci();

        let allocator = device.allocator();
        let align = create_info.alignment.unwrap_or(8);
        let (handle, mut allocation) =
            vk_check!(unsafe { allocator.create_buffer_with_alignment(&buffer_ci, &alloc_ci, align) })?;

        let memory_type = allocator.get_allocation_info(&allocation).memory_type;
        let memory_flags = device.memory_type_flags(memory_type);

        let mut map_ptr = None;
        if create_info.persistent_map {
            assert!(
                memory_flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE),
                "persistent map requires host visible memory"
            );
            match vk_check!(unsafe { allocator.map_memory(&mut allocation) }) {
                Ok(ptr) => map_ptr = Some(ptr),
                Err(e) => {
                    unsafe { allocator.destroy_buffer(handle, &mut allocation) };
                    return Err(e);
                }
            }
        }

        let buffer = Self {
            device: device.clone(),
            handle,
            allocation: RefCell::new(allocation),
            size: create_info.size,
            usage: create_info.usage,
            memory_flags,
            map_ptr,
            debug_name: debug_name.as_ref().to_string(),
        };
        device.set_debug_name(&buffer, debug_name);
        Ok(buffer)
    }

    #[inline]
    pub fn new_staging_buffer(device: &Rc<GfxDevice>, size: vk::DeviceSize, debug_name: impl AsRef<str>) -> GfxResult<Self> {
        Self::new(device, &GfxBufferCreateInfo::staging(size), debug_name)
    }
}

// getters
impl GfxBuffer {
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    #[inline]
    pub fn memory_flags(&self) -> vk::MemoryPropertyFlags {
        self.memory_flags
    }

    #[inline]
    pub fn is_host_visible(&self) -> bool {
        self.memory_flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }

    #[inline]
    pub fn device(&self) -> &Rc<GfxDevice> {
        &self.device
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.debug_name
    }

    /// 常驻 map 的指针，没有常驻 map 时为 None
    #[inline]
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        self.map_ptr
    }
}

// tools
impl GfxBuffer {
    /// 将 data 写入 buffer 的 offset 处
    ///
    /// host visible 的 buffer 直接 map 写入，否则通过 staging buffer 同步传输（会阻塞）
    pub fn write(&self, data: &[u8], offset: vk::DeviceSize) -> GfxResult<()> {
        let _span = tracy_client::span!("GfxBuffer::write");
        self.assert_range(offset, data.len());
        if data.is_empty() {
            return Ok(());
        }

        let path = GfxTransferPath::of(self.memory_flags);
        self.check_usage(path, false)?;
        match path {
            GfxTransferPath::Mapped { non_coherent } => {
                self.with_mapped(|ptr| unsafe {
                    ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset as usize), data.len());
                })?;
                if non_coherent {
                    self.flush(offset, data.len() as vk::DeviceSize)?;
                }
                Ok(())
            }
            GfxTransferPath::Staged => {
                let size = data.len() as vk::DeviceSize;
                let stage_buffer =
                    Self::new_staging_buffer(&self.device, size, format!("{}-stage-buffer", self.debug_name))?;
                stage_buffer.write(data, 0)?;

                self.device.one_time_exec(
                    QueueRole::Universal,
                    |cmd| {
                        cmd.copy_buffer(
                            &stage_buffer,
                            self,
                            &[vk::BufferCopy {
                                src_offset: 0,
                                dst_offset: offset,
                                size,
                            }],
                        );
                    },
                    &format!("{}-write", self.debug_name),
                )
            }
        }
    }

    /// 从 buffer 的 offset 处读取 dst.len() 个字节
    ///
    /// 非 host visible 的 buffer 会先等待之前所有的写入完成，再拷贝到 readback buffer（会阻塞）
    pub fn read(&self, dst: &mut [u8], offset: vk::DeviceSize) -> GfxResult<()> {
        let _span = tracy_client::span!("GfxBuffer::read");
        self.assert_range(offset, dst.len());
        if dst.is_empty() {
            return Ok(());
        }

        let path = GfxTransferPath::of(self.memory_flags);
        self.check_usage(path, true)?;
        match path {
            GfxTransferPath::Mapped { non_coherent } => {
                if non_coherent {
                    self.invalidate(offset, dst.len() as vk::DeviceSize)?;
                }
                self.with_mapped(|ptr| unsafe {
                    ptr::copy_nonoverlapping(ptr.add(offset as usize), dst.as_mut_ptr(), dst.len());
                })
            }
            GfxTransferPath::Staged => {
                let size = dst.len() as vk::DeviceSize;
                let readback = Self::new(
                    &self.device,
                    &GfxBufferCreateInfo::readback(size),
                    format!("{}-readback-buffer", self.debug_name),
                )?;

                self.device.one_time_exec(
                    QueueRole::Universal,
                    |cmd| {
                        cmd.set_memory_barrier(GfxBarrierMask::new(
                            vk::PipelineStageFlags2::ALL_COMMANDS,
                            vk::AccessFlags2::SHADER_WRITE | vk::AccessFlags2::MEMORY_WRITE,
                            vk::PipelineStageFlags2::TRANSFER,
                            vk::AccessFlags2::TRANSFER_READ,
                        ));
                        cmd.copy_buffer(
                            self,
                            &readback,
                            &[vk::BufferCopy {
                                src_offset: offset,
                                dst_offset: 0,
                                size,
                            }],
                        );
                        cmd.buffer_memory_barrier(
                            vk::DependencyFlags::empty(),
                            &[GfxBufferBarrier::new()
                                .buffer(readback.handle(), 0, size)
                                .src_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)
                                .dst_mask(vk::PipelineStageFlags2::HOST, vk::AccessFlags2::HOST_READ)],
                        );
                    },
                    &format!("{}-read", self.debug_name),
                )?;

                readback.read(dst, 0)
            }
        }
    }

    #[inline]
    pub fn write_pod<T: bytemuck::Pod>(&self, data: &[T], offset: vk::DeviceSize) -> GfxResult<()> {
        self.write(bytemuck::cast_slice(data), offset)
    }

    #[inline]
    pub fn read_pod<T: bytemuck::Pod>(&self, dst: &mut [T], offset: vk::DeviceSize) -> GfxResult<()> {
        self.read(bytemuck::cast_slice_mut(dst), offset)
    }

    /// 让 host 的写入对 device 可见，只在非 coherent 内存上需要
    pub fn flush(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> GfxResult<()> {
        let allocator = self.device.allocator();
        vk_check!(allocator.flush_allocation(&self.allocation.borrow(), offset, size))
    }

    /// 让 device 的写入对 host 可见，只在非 coherent 内存上需要
    pub fn invalidate(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> GfxResult<()> {
        let allocator = self.device.allocator();
        vk_check!(allocator.invalidate_allocation(&self.allocation.borrow(), offset, size))
    }

    /// 常驻 map 的 buffer 直接复用指针，否则临时 map，用完立即 unmap
    fn with_mapped<R>(&self, f: impl FnOnce(*mut u8) -> R) -> GfxResult<R> {
        if let Some(ptr) = self.map_ptr {
            return Ok(f(ptr));
        }

        let allocator = self.device.allocator();
        let mut allocation = self.allocation.borrow_mut();
        let ptr = vk_check!(unsafe { allocator.map_memory(&mut allocation) })?;
        let result = f(ptr);
        unsafe { allocator.unmap_memory(&mut allocation) };
        Ok(result)
    }

    fn check_usage(&self, path: GfxTransferPath, read: bool) -> GfxResult<()> {
        let required = path.required_usage(read);
        if self.usage.contains(required) {
            return Ok(());
        }
        Err(GfxError::InvalidUsage(format!(
            "buffer {} with usage {:?} can not be {} through staging, {:?} is required",
            self.debug_name,
            self.usage,
            if read { "read" } else { "written" },
            required
        )))
    }

    #[inline]
    fn assert_range(&self, offset: vk::DeviceSize, len: usize) {
        assert!(
            range_in_bounds(offset, len, self.size),
            "buffer {} access out of range: offset {} + len {} > size {}",
            self.debug_name,
            offset,
            len,
            self.size
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_path() {
        let device_local = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        assert_eq!(GfxTransferPath::of(device_local), GfxTransferPath::Staged);

        let coherent = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(GfxTransferPath::of(coherent), GfxTransferPath::Mapped { non_coherent: false });

        // resizable BAR
        let bar = device_local | vk::MemoryPropertyFlags::HOST_VISIBLE;
        assert_eq!(GfxTransferPath::of(bar), GfxTransferPath::Mapped { non_coherent: true });
    }

    #[test]
    fn test_buffer_presets() {
        let uniform = GfxBufferCreateInfo::uniform(256, true);
        assert!(uniform.persistent_map);
        assert_eq!(uniform.location, GfxMemoryLocation::CpuToGpu);
        assert!(uniform.usage.contains(vk::BufferUsageFlags::UNIFORM_BUFFER));

        let index = GfxBufferCreateInfo::index(64);
        assert!(index.usage.contains(vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST));
        assert_eq!(index.location, GfxMemoryLocation::GpuOnly);
        assert!(!index.persistent_map);

        let staging = GfxBufferCreateInfo::staging(16).alignment(64);
        assert_eq!(staging.usage, vk::BufferUsageFlags::TRANSFER_SRC);
        assert_eq!(staging.alignment, Some(64));
    }

    #[test]
    fn test_gpu_only_presets_support_staged_round_trip() {
        let presets = [
            GfxBufferCreateInfo::storage(64),
            GfxBufferCreateInfo::index(64),
            GfxBufferCreateInfo::vertex(64),
            GfxBufferCreateInfo::indirect(64),
            GfxBufferCreateInfo::uniform_texel(64),
            GfxBufferCreateInfo::storage_texel(64),
        ];
        for info in presets {
            assert_eq!(info.location, GfxMemoryLocation::GpuOnly);
            assert!(info.usage.contains(GfxTransferPath::Staged.required_usage(false)), "{:?}", info.usage);
            assert!(info.usage.contains(GfxTransferPath::Staged.required_usage(true)), "{:?}", info.usage);
        }
    }

    #[test]
    fn test_required_usage() {
        let mapped = GfxTransferPath::Mapped { non_coherent: true };
        assert_eq!(mapped.required_usage(true), vk::BufferUsageFlags::empty());
        assert_eq!(mapped.required_usage(false), vk::BufferUsageFlags::empty());
        assert_eq!(GfxTransferPath::Staged.required_usage(true), vk::BufferUsageFlags::TRANSFER_SRC);
        assert_eq!(GfxTransferPath::Staged.required_usage(false), vk::BufferUsageFlags::TRANSFER_DST);

        // 只能写入、不能读回的 buffer
        let upload_only = vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST;
        assert!(!upload_only.contains(GfxTransferPath::Staged.required_usage(true)));
    }

    #[test]
    fn test_range_in_bounds() {
        assert!(range_in_bounds(0, 64, 64));
        assert!(range_in_bounds(60, 4, 64));
        assert!(range_in_bounds(64, 0, 64));
        assert!(!range_in_bounds(61, 4, 64));
        assert!(!range_in_bounds(u64::MAX, 2, 64));
        assert!(!range_in_bounds(u64::MAX - 1, usize::MAX, u64::MAX));
    }
}
