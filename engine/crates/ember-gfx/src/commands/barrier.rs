//! pipeline barrier 的构建
//!
//! 所有 barrier 都以 synchronization2 的形式描述（`*Flags2`），
//! 设备不支持 synchronization2 时通过 `legacy()` 转换为旧版的结构体。
//!
//! 这一层不会推断 hazard，barrier 的位置由调用方决定。

use ash::vk;

/// 将 stage flags2 转换为旧版的 stage flags
///
/// 只存在于 flags2 中的 bit 会被映射到包含它的旧版 stage。
pub fn legacy_stage(stage: vk::PipelineStageFlags2) -> vk::PipelineStageFlags {
    // 低 32 位与旧版的定义一致
    let mut legacy = vk::PipelineStageFlags::from_raw((stage.as_raw() & 0xFFFF_FFFF) as u32);

    let transfer_like = vk::PipelineStageFlags2::COPY
        | vk::PipelineStageFlags2::BLIT
        | vk::PipelineStageFlags2::RESOLVE
        | vk::PipelineStageFlags2::CLEAR;
    if stage.intersects(transfer_like) {
        legacy |= vk::PipelineStageFlags::TRANSFER;
    }
    if stage.intersects(vk::PipelineStageFlags2::INDEX_INPUT | vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT) {
        legacy |= vk::PipelineStageFlags::VERTEX_INPUT;
    }
    if stage.intersects(vk::PipelineStageFlags2::PRE_RASTERIZATION_SHADERS) {
        legacy |= vk::PipelineStageFlags::VERTEX_SHADER
            | vk::PipelineStageFlags::TESSELLATION_CONTROL_SHADER
            | vk::PipelineStageFlags::TESSELLATION_EVALUATION_SHADER
            | vk::PipelineStageFlags::GEOMETRY_SHADER;
    }
    legacy
}

/// 将 access flags2 转换为旧版的 access flags
pub fn legacy_access(access: vk::AccessFlags2) -> vk::AccessFlags {
    let mut legacy = vk::AccessFlags::from_raw((access.as_raw() & 0xFFFF_FFFF) as u32);

    if access.intersects(vk::AccessFlags2::SHADER_SAMPLED_READ | vk::AccessFlags2::SHADER_STORAGE_READ) {
        legacy |= vk::AccessFlags::SHADER_READ;
    }
    if access.intersects(vk::AccessFlags2::SHADER_STORAGE_WRITE) {
        legacy |= vk::AccessFlags::SHADER_WRITE;
    }
    legacy
}

/// barrier 使用的 src 和 dst 访问 mask
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct GfxBarrierMask {
    pub src_stage: vk::PipelineStageFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_access: vk::AccessFlags2,
}

/// 旧版 barrier 使用的 mask
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxLegacyBarrierMask {
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
}

impl GfxBarrierMask {
    pub const fn new(
        src_stage: vk::PipelineStageFlags2,
        src_access: vk::AccessFlags2,
        dst_stage: vk::PipelineStageFlags2,
        dst_access: vk::AccessFlags2,
    ) -> Self {
        Self {
            src_stage,
            dst_stage,
            src_access,
            dst_access,
        }
    }

    /// 旧版的 stage mask 不允许为空，分别使用 TOP_OF_PIPE 和 BOTTOM_OF_PIPE 代替
    pub fn legacy(&self) -> GfxLegacyBarrierMask {
        let mut src_stage = legacy_stage(self.src_stage);
        if src_stage.is_empty() {
            src_stage = vk::PipelineStageFlags::TOP_OF_PIPE;
        }
        let mut dst_stage = legacy_stage(self.dst_stage);
        if dst_stage.is_empty() {
            dst_stage = vk::PipelineStageFlags::BOTTOM_OF_PIPE;
        }
        GfxLegacyBarrierMask {
            src_stage,
            dst_stage,
            src_access: legacy_access(self.src_access),
            dst_access: legacy_access(self.dst_access),
        }
    }
}

// 常用的 barrier
impl GfxBarrierMask {
    /// compute 写入之后，compute 读取
    pub const COMPUTE_WRITE_TO_COMPUTE_READ: Self = Self::new(
        vk::PipelineStageFlags2::COMPUTE_SHADER,
        vk::AccessFlags2::SHADER_WRITE,
        vk::PipelineStageFlags2::COMPUTE_SHADER,
        vk::AccessFlags2::SHADER_READ,
    );

    /// 只有执行依赖，用于 write-after-read
    pub const COMPUTE_TO_COMPUTE_EXECUTION: Self = Self::new(
        vk::PipelineStageFlags2::COMPUTE_SHADER,
        vk::AccessFlags2::NONE,
        vk::PipelineStageFlags2::COMPUTE_SHADER,
        vk::AccessFlags2::NONE,
    );

    /// compute 写入 index buffer 之后，作为 index 读取
    pub const COMPUTE_WRITE_TO_INDEX_READ: Self = Self::new(
        vk::PipelineStageFlags2::COMPUTE_SHADER,
        vk::AccessFlags2::SHADER_WRITE,
        vk::PipelineStageFlags2::INDEX_INPUT,
        vk::AccessFlags2::INDEX_READ,
    );

    /// compute 写入 indirect buffer 之后，作为 indirect draw 参数读取
    pub const COMPUTE_WRITE_TO_INDIRECT_READ: Self = Self::new(
        vk::PipelineStageFlags2::COMPUTE_SHADER,
        vk::AccessFlags2::SHADER_WRITE,
        vk::PipelineStageFlags2::DRAW_INDIRECT,
        vk::AccessFlags2::INDIRECT_COMMAND_READ,
    );

    /// compute 写入 storage image 之后，在 fragment shader 中采样
    pub const COMPUTE_WRITE_TO_FRAGMENT_SAMPLE: Self = Self::new(
        vk::PipelineStageFlags2::COMPUTE_SHADER,
        vk::AccessFlags2::SHADER_WRITE,
        vk::PipelineStageFlags2::FRAGMENT_SHADER,
        vk::AccessFlags2::SHADER_READ,
    );

    /// 所有 stage 之间的完整依赖，只用于排查同步问题
    #[cfg(debug_assertions)]
    pub fn full_pipeline() -> Self {
        let all_access = vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE;
        Self::new(
            vk::PipelineStageFlags2::ALL_COMMANDS,
            all_access,
            vk::PipelineStageFlags2::ALL_COMMANDS,
            all_access,
        )
    }
}

/// image barrier 的配方：mask + layout 变换
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxImageBarrierRecipe {
    pub mask: GfxBarrierMask,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
}

impl GfxImageBarrierRecipe {
    /// storage image 由 compute 写入后，转换为 fragment shader 采样的 layout
    pub const STORAGE_IMAGE_COMPUTE_TO_FRAGMENT_SAMPLE: Self = Self {
        mask: GfxBarrierMask::COMPUTE_WRITE_TO_FRAGMENT_SAMPLE,
        old_layout: vk::ImageLayout::GENERAL,
        new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    };

    /// 上传数据之前
    pub const UNDEFINED_TO_TRANSFER_DST: Self = Self {
        mask: GfxBarrierMask::new(
            vk::PipelineStageFlags2::ALL_COMMANDS,
            vk::AccessFlags2::NONE,
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
        ),
        old_layout: vk::ImageLayout::UNDEFINED,
        new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    };

    /// 上传数据之后，供 shader 读取
    pub const TRANSFER_DST_TO_SHADER_READ: Self = Self {
        mask: GfxBarrierMask::new(
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
            vk::PipelineStageFlags2::ALL_COMMANDS,
            vk::AccessFlags2::from_raw(vk::AccessFlags2::SHADER_READ.as_raw() | vk::AccessFlags2::MEMORY_READ.as_raw()),
        ),
        old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    };

    /// 生成 mip 时，上一层写完之后作为 blit 的源
    pub const TRANSFER_DST_TO_TRANSFER_SRC: Self = Self {
        mask: GfxBarrierMask::new(
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_READ,
        ),
        old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        new_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
    };

    /// blit 读取完成之后，供 shader 读取；读之后的读不需要 src access
    pub const TRANSFER_SRC_TO_SHADER_READ: Self = Self {
        mask: GfxBarrierMask::new(
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::NONE,
            vk::PipelineStageFlags2::ALL_COMMANDS,
            vk::AccessFlags2::from_raw(vk::AccessFlags2::SHADER_READ.as_raw() | vk::AccessFlags2::MEMORY_READ.as_raw()),
        ),
        old_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    };
}

/// 便捷创建 image memory barrier 的结构体
#[derive(Copy, Clone, Debug)]
pub struct GfxImageBarrier {
    inner: vk::ImageMemoryBarrier2<'static>,
}

impl Default for GfxImageBarrier {
    fn default() -> Self {
        Self {
            inner: vk::ImageMemoryBarrier2 {
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::UNDEFINED,
                src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_array_layer: 0,
                    layer_count: vk::REMAINING_ARRAY_LAYERS,
                    base_mip_level: 0,
                    level_count: vk::REMAINING_MIP_LEVELS,
                },
                ..Default::default()
            },
        }
    }
}

impl GfxImageBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_recipe(image: vk::Image, recipe: GfxImageBarrierRecipe, range: vk::ImageSubresourceRange) -> Self {
        Self::new().image(image).mask(recipe.mask).layout_transfer(recipe.old_layout, recipe.new_layout).range(range)
    }

    #[inline]
    pub fn inner(&self) -> &vk::ImageMemoryBarrier2<'static> {
        &self.inner
    }

    #[inline]
    pub fn barrier_mask(&self) -> GfxBarrierMask {
        GfxBarrierMask::new(
            self.inner.src_stage_mask,
            self.inner.src_access_mask,
            self.inner.dst_stage_mask,
            self.inner.dst_access_mask,
        )
    }

    pub fn legacy(&self) -> vk::ImageMemoryBarrier<'static> {
        let mask = self.barrier_mask().legacy();
        vk::ImageMemoryBarrier {
            src_access_mask: mask.src_access,
            dst_access_mask: mask.dst_access,
            old_layout: self.inner.old_layout,
            new_layout: self.inner.new_layout,
            src_queue_family_index: self.inner.src_queue_family_index,
            dst_queue_family_index: self.inner.dst_queue_family_index,
            image: self.inner.image,
            subresource_range: self.inner.subresource_range,
            ..Default::default()
        }
    }

    /// builder
    #[inline]
    pub fn queue_family_transfer(mut self, src_queue_family_index: u32, dst_queue_family_index: u32) -> Self {
        self.inner.src_queue_family_index = src_queue_family_index;
        self.inner.dst_queue_family_index = dst_queue_family_index;
        self
    }

    /// builder
    #[inline]
    pub fn layout_transfer(mut self, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> Self {
        self.inner.old_layout = old_layout;
        self.inner.new_layout = new_layout;
        self
    }

    /// builder
    #[inline]
    pub fn src_mask(mut self, src_stage_mask: vk::PipelineStageFlags2, src_access_mask: vk::AccessFlags2) -> Self {
        self.inner.src_stage_mask = src_stage_mask;
        self.inner.src_access_mask = src_access_mask;
        self
    }

    /// builder
    #[inline]
    pub fn dst_mask(mut self, dst_stage_mask: vk::PipelineStageFlags2, dst_access_mask: vk::AccessFlags2) -> Self {
        self.inner.dst_stage_mask = dst_stage_mask;
        self.inner.dst_access_mask = dst_access_mask;
        self
    }

    /// builder
    #[inline]
    pub fn mask(self, mask: GfxBarrierMask) -> Self {
        self.src_mask(mask.src_stage, mask.src_access).dst_mask(mask.dst_stage, mask.dst_access)
    }

    /// builder
    /// layer 和 miplevel 都使用默认值
    #[inline]
    pub fn image_aspect_flag(mut self, aspect_mask: vk::ImageAspectFlags) -> Self {
        self.inner.subresource_range.aspect_mask = aspect_mask;
        self
    }

    /// builder
    #[inline]
    pub fn range(mut self, range: vk::ImageSubresourceRange) -> Self {
        self.inner.subresource_range = range;
        self
    }

    /// builder
    #[inline]
    pub fn image(mut self, image: vk::Image) -> Self {
        self.inner.image = image;
        self
    }
}

#[derive(Copy, Clone, Debug)]
pub struct GfxBufferBarrier {
    inner: vk::BufferMemoryBarrier2<'static>,
}

impl Default for GfxBufferBarrier {
    fn default() -> Self {
        Self {
            inner: vk::BufferMemoryBarrier2 {
                src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                size: vk::WHOLE_SIZE,
                ..Default::default()
            },
        }
    }
}

impl GfxBufferBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn inner(&self) -> &vk::BufferMemoryBarrier2<'static> {
        &self.inner
    }

    #[inline]
    pub fn barrier_mask(&self) -> GfxBarrierMask {
        GfxBarrierMask::new(
            self.inner.src_stage_mask,
            self.inner.src_access_mask,
            self.inner.dst_stage_mask,
            self.inner.dst_access_mask,
        )
    }

    pub fn legacy(&self) -> vk::BufferMemoryBarrier<'static> {
        let mask = self.barrier_mask().legacy();
        vk::BufferMemoryBarrier {
            src_access_mask: mask.src_access,
            dst_access_mask: mask.dst_access,
            src_queue_family_index: self.inner.src_queue_family_index,
            dst_queue_family_index: self.inner.dst_queue_family_index,
            buffer: self.inner.buffer,
            offset: self.inner.offset,
            size: self.inner.size,
            ..Default::default()
        }
    }

    #[inline]
    pub fn src_mask(mut self, src_stage_mask: vk::PipelineStageFlags2, src_access_mask: vk::AccessFlags2) -> Self {
        self.inner.src_stage_mask = src_stage_mask;
        self.inner.src_access_mask = src_access_mask;
        self
    }

    #[inline]
    pub fn dst_mask(mut self, dst_stage_mask: vk::PipelineStageFlags2, dst_access_mask: vk::AccessFlags2) -> Self {
        self.inner.dst_stage_mask = dst_stage_mask;
        self.inner.dst_access_mask = dst_access_mask;
        self
    }

    #[inline]
    pub fn mask(self, mask: GfxBarrierMask) -> Self {
        self.src_mask(mask.src_stage, mask.src_access).dst_mask(mask.dst_stage, mask.dst_access)
    }

    #[inline]
    pub fn buffer(mut self, buffer: vk::Buffer, offset: vk::DeviceSize, size: vk::DeviceSize) -> Self {
        self.inner.buffer = buffer;
        self.inner.offset = offset;
        self.inner.size = size;
        self
    }
}

/// 全局 memory barrier
#[derive(Copy, Clone, Debug, Default)]
pub struct GfxMemoryBarrier {
    pub mask: GfxBarrierMask,
}

impl GfxMemoryBarrier {
    pub fn new(mask: GfxBarrierMask) -> Self {
        Self { mask }
    }

    pub fn inner(&self) -> vk::MemoryBarrier2<'static> {
        vk::MemoryBarrier2::default()
            .src_stage_mask(self.mask.src_stage)
            .src_access_mask(self.mask.src_access)
            .dst_stage_mask(self.mask.dst_stage)
            .dst_access_mask(self.mask.dst_access)
    }

    pub fn legacy(&self) -> vk::MemoryBarrier<'static> {
        let mask = self.mask.legacy();
        vk::MemoryBarrier::default().src_access_mask(mask.src_access).dst_access_mask(mask.dst_access)
    }
}

/// 旧版的 vkCmdPipelineBarrier 只有一组 stage mask，需要合并所有 barrier 的 stage
pub fn merge_legacy_stages(
    masks: impl IntoIterator<Item = GfxBarrierMask>,
) -> (vk::PipelineStageFlags, vk::PipelineStageFlags) {
    let (src, dst) = masks.into_iter().fold(
        (vk::PipelineStageFlags::empty(), vk::PipelineStageFlags::empty()),
        |(src, dst), mask| {
            let legacy = mask.legacy();
            (src | legacy.src_stage, dst | legacy.dst_stage)
        },
    );
    let src = if src.is_empty() { vk::PipelineStageFlags::TOP_OF_PIPE } else { src };
    let dst = if dst.is_empty() { vk::PipelineStageFlags::BOTTOM_OF_PIPE } else { dst };
    (src, dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_read_after_write() {
        let mask = GfxBarrierMask::COMPUTE_WRITE_TO_COMPUTE_READ;
        assert_eq!(mask.src_stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(mask.dst_stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(mask.src_access, vk::AccessFlags2::SHADER_WRITE);
        assert_eq!(mask.dst_access, vk::AccessFlags2::SHADER_READ);

        let legacy = mask.legacy();
        assert_eq!(legacy.src_stage, vk::PipelineStageFlags::COMPUTE_SHADER);
        assert_eq!(legacy.src_access, vk::AccessFlags::SHADER_WRITE);
        assert_eq!(legacy.dst_access, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn test_compute_execution_only() {
        let mask = GfxBarrierMask::COMPUTE_TO_COMPUTE_EXECUTION;
        assert!(mask.src_access.is_empty());
        assert!(mask.dst_access.is_empty());
        let legacy = mask.legacy();
        assert_eq!(legacy.src_stage, vk::PipelineStageFlags::COMPUTE_SHADER);
        assert_eq!(legacy.dst_stage, vk::PipelineStageFlags::COMPUTE_SHADER);
        assert!(legacy.src_access.is_empty());
    }

    #[test]
    fn test_compute_to_index_read_legacy_uses_vertex_input() {
        let mask = GfxBarrierMask::COMPUTE_WRITE_TO_INDEX_READ;
        assert_eq!(mask.dst_stage, vk::PipelineStageFlags2::INDEX_INPUT);
        assert_eq!(mask.dst_access, vk::AccessFlags2::INDEX_READ);

        let legacy = mask.legacy();
        assert_eq!(legacy.dst_stage, vk::PipelineStageFlags::VERTEX_INPUT);
        assert_eq!(legacy.dst_access, vk::AccessFlags::INDEX_READ);
    }

    #[test]
    fn test_compute_to_indirect() {
        let legacy = GfxBarrierMask::COMPUTE_WRITE_TO_INDIRECT_READ.legacy();
        assert_eq!(legacy.src_stage, vk::PipelineStageFlags::COMPUTE_SHADER);
        assert_eq!(legacy.dst_stage, vk::PipelineStageFlags::DRAW_INDIRECT);
        assert_eq!(legacy.src_access, vk::AccessFlags::SHADER_WRITE);
        assert_eq!(legacy.dst_access, vk::AccessFlags::INDIRECT_COMMAND_READ);
    }

    #[test]
    fn test_storage_image_to_fragment_sample() {
        let recipe = GfxImageBarrierRecipe::STORAGE_IMAGE_COMPUTE_TO_FRAGMENT_SAMPLE;
        assert_eq!(recipe.old_layout, vk::ImageLayout::GENERAL);
        assert_eq!(recipe.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(recipe.mask.src_stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(recipe.mask.dst_stage, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert_eq!(recipe.mask.src_access, vk::AccessFlags2::SHADER_WRITE);
        assert_eq!(recipe.mask.dst_access, vk::AccessFlags2::SHADER_READ);

        let range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 4,
            base_array_layer: 0,
            layer_count: 6,
        };
        let barrier = GfxImageBarrier::from_recipe(vk::Image::null(), recipe, range);
        assert_eq!(barrier.inner().subresource_range.level_count, 4);
        assert_eq!(barrier.inner().subresource_range.layer_count, 6);

        let legacy = barrier.legacy();
        assert_eq!(legacy.old_layout, vk::ImageLayout::GENERAL);
        assert_eq!(legacy.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(legacy.dst_access_mask, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn test_upload_recipes() {
        let before = GfxImageBarrierRecipe::UNDEFINED_TO_TRANSFER_DST;
        assert_eq!(before.mask.src_stage, vk::PipelineStageFlags2::ALL_COMMANDS);
        assert_eq!(before.mask.dst_access, vk::AccessFlags2::TRANSFER_WRITE);

        let after = GfxImageBarrierRecipe::TRANSFER_DST_TO_SHADER_READ;
        assert_eq!(after.mask.dst_access, vk::AccessFlags2::SHADER_READ | vk::AccessFlags2::MEMORY_READ);
        assert_eq!(after.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_mip_generation_recipes() {
        let to_src = GfxImageBarrierRecipe::TRANSFER_DST_TO_TRANSFER_SRC;
        assert_eq!(to_src.mask.src_stage, vk::PipelineStageFlags2::TRANSFER);
        assert_eq!(to_src.mask.src_access, vk::AccessFlags2::TRANSFER_WRITE);
        assert_eq!(to_src.mask.dst_stage, vk::PipelineStageFlags2::TRANSFER);
        assert_eq!(to_src.mask.dst_access, vk::AccessFlags2::TRANSFER_READ);
        assert_eq!(
            (to_src.old_layout, to_src.new_layout),
            (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
        );

        let to_read = GfxImageBarrierRecipe::TRANSFER_SRC_TO_SHADER_READ;
        assert_eq!(to_read.mask.src_access, vk::AccessFlags2::NONE);
        assert!(to_read.mask.dst_access.contains(vk::AccessFlags2::SHADER_READ));
        assert_eq!(
            (to_read.old_layout, to_read.new_layout),
            (vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        );
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_full_pipeline_barrier() {
        let mask = GfxBarrierMask::full_pipeline();
        assert_eq!(mask.src_stage, vk::PipelineStageFlags2::ALL_COMMANDS);
        assert_eq!(mask.dst_stage, vk::PipelineStageFlags2::ALL_COMMANDS);
        assert!(mask.src_access.contains(vk::AccessFlags2::MEMORY_WRITE));
        assert!(mask.dst_access.contains(vk::AccessFlags2::MEMORY_READ));
        assert_eq!(mask.legacy().src_stage, vk::PipelineStageFlags::ALL_COMMANDS);
    }

    #[test]
    fn test_legacy_conversion_of_new_bits() {
        assert_eq!(legacy_stage(vk::PipelineStageFlags2::COPY), vk::PipelineStageFlags::TRANSFER);
        assert_eq!(legacy_stage(vk::PipelineStageFlags2::BLIT), vk::PipelineStageFlags::TRANSFER);
        assert_eq!(
            legacy_stage(vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT),
            vk::PipelineStageFlags::VERTEX_INPUT
        );
        assert_eq!(legacy_access(vk::AccessFlags2::SHADER_SAMPLED_READ), vk::AccessFlags::SHADER_READ);
        assert_eq!(legacy_access(vk::AccessFlags2::SHADER_STORAGE_WRITE), vk::AccessFlags::SHADER_WRITE);
        assert_eq!(
            legacy_access(vk::AccessFlags2::TRANSFER_WRITE | vk::AccessFlags2::HOST_READ),
            vk::AccessFlags::TRANSFER_WRITE | vk::AccessFlags::HOST_READ
        );
    }

    #[test]
    fn test_legacy_empty_stage_uses_top_and_bottom() {
        let legacy = GfxBarrierMask::default().legacy();
        assert_eq!(legacy.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(legacy.dst_stage, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
    }

    #[test]
    fn test_merge_legacy_stages() {
        let (src, dst) = merge_legacy_stages([
            GfxBarrierMask::COMPUTE_WRITE_TO_INDEX_READ,
            GfxBarrierMask::COMPUTE_WRITE_TO_INDIRECT_READ,
        ]);
        assert_eq!(src, vk::PipelineStageFlags::COMPUTE_SHADER);
        assert_eq!(dst, vk::PipelineStageFlags::VERTEX_INPUT | vk::PipelineStageFlags::DRAW_INDIRECT);

        let (src, dst) = merge_legacy_stages(Vec::<GfxBarrierMask>::new());
        assert_eq!(src, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(dst, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
    }
}
