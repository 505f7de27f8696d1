use std::{cell::Cell, ffi::CString, rc::Rc};

use ash::vk;
use itertools::Itertools;

use crate::{
    basic::{color::LabelColor, format::infer_image_aspect},
    commands::{
        barrier::{
            GfxBarrierMask, GfxBufferBarrier, GfxImageBarrier, GfxImageBarrierRecipe, GfxMemoryBarrier,
            merge_legacy_stages,
        },
        command_pool::GfxCommandPool,
        event::GfxEvent,
    },
    error::GfxResult,
    foundation::{debug_messenger::DebugType, device::GfxDevice},
    pipelines::{
        framebuffer::GfxFramebuffer, pipeline::GfxPipeline, pipeline_layout::GfxPipelineLayout,
        render_pass::GfxRenderPass,
    },
    resources::{buffer::GfxBuffer, image::GfxImage},
    vk_check,
};

/// command buffer 的生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferState {
    Initial,
    Recording,
    Executable,
    /// 已经提交，GPU 可能还在执行
    Pending,
}

/// 状态转换，None 表示在当前状态下不允许该操作
impl CommandBufferState {
    /// Executable 状态下 begin 会隐式 reset，pool 需要带有 RESET_COMMAND_BUFFER
    #[inline]
    pub fn on_begin(self) -> Option<Self> {
        matches!(self, Self::Initial | Self::Executable).then_some(Self::Recording)
    }

    #[inline]
    pub fn on_end(self) -> Option<Self> {
        (self == Self::Recording).then_some(Self::Executable)
    }

    /// 没有 SIMULTANEOUS_USE，pending 的 command buffer 不能再次提交
    #[inline]
    pub fn on_submit(self) -> Option<Self> {
        (self == Self::Executable).then_some(Self::Pending)
    }

    /// GPU 执行完成，非 Pending 的状态保持不变
    #[inline]
    pub fn on_complete(self) -> Self {
        match self {
            Self::Pending => Self::Executable,
            other => other,
        }
    }

    /// 需要先确认执行完成
    #[inline]
    pub fn on_reset(self) -> Option<Self> {
        (self != Self::Pending).then_some(Self::Initial)
    }

    #[inline]
    pub fn can_record(self) -> bool {
        self == Self::Recording
    }
}

/// 命令缓冲封装
///
/// 持有 `Rc<GfxCommandPool>`，drop 时归还给 pool。
/// 录制命令时会检查状态，在 begin 与 end 之外录制属于编程错误。
///
/// # 使用示例
/// ```ignore
/// let cmd = pool.allocate(vk::CommandBufferLevel::PRIMARY, "my-pass")?;
/// cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, "my-pass")?;
/// cmd.bind_pipeline(&pipeline);
/// // 绘制命令...
/// cmd.end()?;
/// ```
pub struct GfxCommandBuffer {
    pool: Rc<GfxCommandPool>,
    handle: vk::CommandBuffer,
    level: vk::CommandBufferLevel,
    state: Cell<CommandBufferState>,
    /// begin 时是否压入了 debug label
    labeled: Cell<bool>,

    name: String,
}

// new & init
impl GfxCommandBuffer {
    pub(crate) fn from_handle(
        pool: Rc<GfxCommandPool>,
        handle: vk::CommandBuffer,
        level: vk::CommandBufferLevel,
        name: String,
    ) -> Self {
        let cmd = Self {
            pool,
            handle,
            level,
            state: Cell::new(CommandBufferState::Initial),
            labeled: Cell::new(false),
            name,
        };
        cmd.device().set_debug_name(&cmd, &cmd.name);
        cmd
    }

    pub fn new(pool: &Rc<GfxCommandPool>, debug_name: &str) -> GfxResult<Self> {
        pool.allocate(vk::CommandBufferLevel::PRIMARY, debug_name)
    }
}

impl Drop for GfxCommandBuffer {
    fn drop(&mut self) {
        debug_assert!(
            self.state.get() != CommandBufferState::Recording,
            "command buffer {} dropped while recording",
            self.name
        );
        unsafe {
            self.pool.device().free_command_buffers(self.pool.handle(), std::slice::from_ref(&self.handle));
        }
    }
}

// getters
impl GfxCommandBuffer {
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    #[inline]
    pub fn device(&self) -> &Rc<GfxDevice> {
        self.pool.device()
    }

    #[inline]
    pub fn pool(&self) -> &Rc<GfxCommandPool> {
        &self.pool
    }

    #[inline]
    pub fn level(&self) -> vk::CommandBufferLevel {
        self.level
    }

    #[inline]
    pub fn state(&self) -> CommandBufferState {
        self.state.get()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    fn assert_recording(&self) {
        assert!(
            self.state.get().can_record(),
            "command buffer {} is not recording, state: {:?}",
            self.name,
            self.state.get()
        );
    }

    /// 状态转换不合法属于编程错误
    #[inline]
    fn next_state(&self, op: &str, next: Option<CommandBufferState>) -> CommandBufferState {
        match next {
            Some(state) => state,
            None => panic!("command buffer {} can not {} in state {:?}", self.name, op, self.state.get()),
        }
    }
}

// Basic 命令
impl GfxCommandBuffer {
    /// 开始录制 command
    ///
    /// 自动设置 debug label。调用方需要保证上一次提交已经执行完成。
    pub fn begin(&self, usage_flag: vk::CommandBufferUsageFlags, debug_label_name: &str) -> GfxResult<()> {
        let next = self.next_state("begin", self.state.get().on_begin());
        vk_check!(unsafe {
            self.device().begin_command_buffer(self.handle, &vk::CommandBufferBeginInfo::default().flags(usage_flag))
        })?;
        self.state.set(next);

        if !debug_label_name.is_empty() {
            self.begin_label(debug_label_name, LabelColor::COLOR_CMD);
            self.labeled.set(true);
        }
        Ok(())
    }

    /// 用于 secondary command buffer
    pub fn begin_secondary(
        &self,
        usage_flag: vk::CommandBufferUsageFlags,
        inheritance: &vk::CommandBufferInheritanceInfo,
    ) -> GfxResult<()> {
        assert_eq!(self.level, vk::CommandBufferLevel::SECONDARY);
        let next = self.next_state("begin", self.state.get().on_begin());
        let begin_info = vk::CommandBufferBeginInfo::default().flags(usage_flag).inheritance_info(inheritance);
        vk_check!(unsafe { self.device().begin_command_buffer(self.handle, &begin_info) })?;
        self.state.set(next);
        Ok(())
    }

    /// 结束录制 command
    pub fn end(&self) -> GfxResult<()> {
        let next = self.next_state("end", self.state.get().on_end());
        if self.labeled.replace(false) {
            self.end_label();
        }
        vk_check!(unsafe { self.device().end_command_buffer(self.handle) })?;
        self.state.set(next);
        Ok(())
    }

    /// pool 需要带有 RESET_COMMAND_BUFFER；pending 的 command buffer 需要先 [`Self::mark_completed`]
    pub fn reset(&self) -> GfxResult<()> {
        debug_assert!(self.pool.flags().contains(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER));
        let next = self.next_state("reset", self.state.get().on_reset());
        vk_check!(unsafe { self.device().reset_command_buffer(self.handle, vk::CommandBufferResetFlags::empty()) })?;
        self.labeled.set(false);
        self.state.set(next);
        Ok(())
    }

    /// 由 queue 在提交之前调用
    #[inline]
    pub(crate) fn assert_submittable(&self) {
        self.next_state("submit", self.state.get().on_submit());
    }

    /// 由 queue 在提交成功之后调用
    pub(crate) fn mark_pending(&self) {
        let next = self.next_state("submit", self.state.get().on_submit());
        self.state.set(next);
    }

    /// 确认 GPU 执行完成之后调用
    #[inline]
    pub fn mark_completed(&self) {
        self.state.set(self.state.get().on_complete());
    }
}

// 数据传输类型
impl GfxCommandBuffer {
    /// - command type: action
    /// - supported queue types: transfer, graphics, compute
    #[inline]
    pub fn copy_buffer(&self, src: &GfxBuffer, dst: &GfxBuffer, regions: &[vk::BufferCopy]) {
        self.assert_recording();
        unsafe {
            self.device().cmd_copy_buffer(self.handle, src.handle(), dst.handle(), regions);
        }
    }

    /// - command type: action
    /// - supported queue types: transfer, graphics, compute
    #[inline]
    pub fn copy_image(
        &self,
        src: &GfxImage,
        src_layout: vk::ImageLayout,
        dst: &GfxImage,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageCopy],
    ) {
        self.assert_recording();
        unsafe {
            self.device().cmd_copy_image(self.handle, src.handle(), src_layout, dst.handle(), dst_layout, regions);
        }
    }

    /// - command type: action
    /// - supported queue types: transfer, graphics, compute
    #[inline]
    pub fn copy_buffer_to_image(
        &self,
        src: &GfxBuffer,
        dst: &GfxImage,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        self.assert_recording();
        unsafe {
            self.device().cmd_copy_buffer_to_image(self.handle, src.handle(), dst.handle(), dst_layout, regions);
        }
    }

    /// - command type: action
    /// - supported queue types: transfer, graphics, compute
    #[inline]
    pub fn copy_image_to_buffer(
        &self,
        src: &GfxImage,
        src_layout: vk::ImageLayout,
        dst: &GfxBuffer,
        regions: &[vk::BufferImageCopy],
    ) {
        self.assert_recording();
        unsafe {
            self.device().cmd_copy_image_to_buffer(self.handle, src.handle(), src_layout, dst.handle(), regions);
        }
    }

    /// - command type: action
    /// - supported queue types: graphics
    #[inline]
    pub fn blit_image(
        &self,
        src: &GfxImage,
        src_layout: vk::ImageLayout,
        dst: &GfxImage,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    ) {
        self.assert_recording();
        unsafe {
            self.device().cmd_blit_image(
                self.handle,
                src.handle(),
                src_layout,
                dst.handle(),
                dst_layout,
                regions,
                filter,
            );
        }
    }

    /// 将多重采样的 image 解析到单采样的 image
    ///
    /// - command type: action
    /// - supported queue types: graphics
    #[inline]
    pub fn resolve_image(
        &self,
        src: &GfxImage,
        src_layout: vk::ImageLayout,
        dst: &GfxImage,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageResolve],
    ) {
        self.assert_recording();
        unsafe {
            self.device().cmd_resolve_image(self.handle, src.handle(), src_layout, dst.handle(), dst_layout, regions);
        }
    }

    /// - command type: action
    /// - supported queue types: transfer, graphics, compute
    #[inline]
    pub fn fill_buffer(&self, buffer: &GfxBuffer, offset: vk::DeviceSize, size: vk::DeviceSize, data: u32) {
        self.assert_recording();
        unsafe {
            self.device().cmd_fill_buffer(self.handle, buffer.handle(), offset, size, data);
        }
    }

    /// 将 data 传输到 buffer 中，大小限制：65536Bytes=64KB
    ///
    /// 首先将 data copy 到 cmd buffer 中，然后再 transfer 到指定 buffer
    /// 中，这是一个  transfer op
    ///
    /// 需要在 render pass 之外进行，注意同步
    ///
    /// - command type: action
    /// - supported queue types: transfer, graphics, compute
    #[inline]
    pub fn update_buffer(&self, buffer: &GfxBuffer, offset: vk::DeviceSize, data: &[u8]) {
        self.assert_recording();
        debug_assert!(data.len() <= 65536 && data.len() % 4 == 0);
        unsafe { self.device().cmd_update_buffer(self.handle, buffer.handle(), offset, data) }
    }

    /// - command type: action
    /// - supported queue types: graphics, compute
    #[inline]
    pub fn clear_color_image(
        &self,
        image: &GfxImage,
        layout: vk::ImageLayout,
        color: &vk::ClearColorValue,
        ranges: &[vk::ImageSubresourceRange],
    ) {
        self.assert_recording();
        unsafe {
            self.device().cmd_clear_color_image(self.handle, image.handle(), layout, color, ranges);
        }
    }

    /// - command type: action
    /// - supported queue types: graphics
    #[inline]
    pub fn clear_depth_stencil_image(
        &self,
        image: &GfxImage,
        layout: vk::ImageLayout,
        value: &vk::ClearDepthStencilValue,
        ranges: &[vk::ImageSubresourceRange],
    ) {
        self.assert_recording();
        unsafe {
            self.device().cmd_clear_depth_stencil_image(self.handle, image.handle(), layout, value, ranges);
        }
    }

    /// 只能在 render pass 内部使用
    ///
    /// - command type: action
    /// - supported queue types: graphics
    #[inline]
    pub fn clear_attachments(&self, attachments: &[vk::ClearAttachment], rects: &[vk::ClearRect]) {
        self.assert_recording();
        unsafe {
            self.device().cmd_clear_attachments(self.handle, attachments, rects);
        }
    }

    /// - command type: state
    /// - supported queue types: graphics, compute
    #[inline]
    pub fn push_constants(&self, layout: &GfxPipelineLayout, stage: vk::ShaderStageFlags, offset: u32, data: &[u8]) {
        self.assert_recording();
        unsafe {
            self.device().cmd_push_constants(self.handle, layout.handle(), stage, offset, data);
        }
    }
}

// 绘制类型的命令
impl GfxCommandBuffer {
    /// - command type: action, state
    /// - supported queue types: graphics
    pub fn begin_render_pass(
        &self,
        render_pass: &GfxRenderPass,
        framebuffer: &GfxFramebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
        contents: vk::SubpassContents,
    ) {
        self.assert_recording();
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass.handle())
            .framebuffer(framebuffer.handle())
            .render_area(render_area)
            .clear_values(clear_values);
        unsafe {
            self.device().cmd_begin_render_pass(self.handle, &begin_info, contents);
        }
    }

    /// - command type: action, state
    /// - supported queue types: graphics
    #[inline]
    pub fn next_subpass(&self, contents: vk::SubpassContents) {
        self.assert_recording();
        unsafe {
            self.device().cmd_next_subpass(self.handle, contents);
        }
    }

    /// - command type: action, state
    /// - supported queue types: graphics
    #[inline]
    pub fn end_render_pass(&self) {
        self.assert_recording();
        unsafe {
            self.device().cmd_end_render_pass(self.handle);
        }
    }

    /// - command type: state
    /// - supported queue types: graphics, compute
    #[inline]
    pub fn bind_pipeline(&self, pipeline: &GfxPipeline) {
        self.assert_recording();
        unsafe {
            self.device().cmd_bind_pipeline(self.handle, pipeline.bind_point(), pipeline.handle());
        }
    }

    /// - command type: state
    /// - supported queue types: graphics, compute
    #[inline]
    pub fn bind_descriptor_sets(
        &self,
        bind_point: vk::PipelineBindPoint,
        layout: &GfxPipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        self.assert_recording();
        unsafe {
            self.device().cmd_bind_descriptor_sets(
                self.handle,
                bind_point,
                layout.handle(),
                first_set,
                descriptor_sets,
                dynamic_offsets,
            );
        }
    }

    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    pub fn bind_index_buffer(&self, buffer: &GfxBuffer, offset: vk::DeviceSize, index_type: vk::IndexType) {
        self.assert_recording();
        unsafe {
            self.device().cmd_bind_index_buffer(self.handle, buffer.handle(), offset, index_type);
        }
    }

    /// buffers 每个 vertex buffer 以及 offset
    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    pub fn bind_vertex_buffers(&self, first_binding: u32, buffers: &[&GfxBuffer], offsets: &[vk::DeviceSize]) {
        self.assert_recording();
        debug_assert_eq!(buffers.len(), offsets.len());
        let handles = buffers.iter().map(|b| b.handle()).collect_vec();
        unsafe {
            self.device().cmd_bind_vertex_buffers(self.handle, first_binding, &handles, offsets);
        }
    }

    /// - command type: action
    /// - supported queue types: graphics
    #[inline]
    pub fn draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.assert_recording();
        unsafe {
            self.device().cmd_draw(self.handle, vertex_count, instance_count, first_vertex, first_instance);
        }
    }

    /// - command type: action
    /// - supported queue types: graphics
    #[inline]
    pub fn draw_indexed(
        &self,
        index_count: u32,
        first_index: u32,
        instance_count: u32,
        first_instance: u32,
        vertex_offset: i32,
    ) {
        self.assert_recording();
        unsafe {
            self.device().cmd_draw_indexed(
                self.handle,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }

    /// - command type: action
    /// - supported queue types: graphics
    #[inline]
    pub fn draw_indirect(&self, buffer: &GfxBuffer, offset: vk::DeviceSize, draw_count: u32, stride: u32) {
        self.assert_recording();
        unsafe {
            self.device().cmd_draw_indirect(self.handle, buffer.handle(), offset, draw_count, stride);
        }
    }

    /// - command type: action
    /// - supported queue types: graphics
    #[inline]
    pub fn draw_indexed_indirect(&self, buffer: &GfxBuffer, offset: vk::DeviceSize, draw_count: u32, stride: u32) {
        self.assert_recording();
        unsafe {
            self.device().cmd_draw_indexed_indirect(self.handle, buffer.handle(), offset, draw_count, stride);
        }
    }

    /// 在 primary command buffer 中执行 secondary command buffers
    ///
    /// - command type: indirection
    /// - supported queue types: transfer, graphics, compute
    pub fn execute_commands(&self, secondaries: &[&GfxCommandBuffer]) {
        self.assert_recording();
        let handles = secondaries.iter().map(|c| c.handle()).collect_vec();
        unsafe {
            self.device().cmd_execute_commands(self.handle, &handles);
        }
    }
}

// compute 命令
impl GfxCommandBuffer {
    /// - command type: action
    /// - supported queue types: compute
    #[inline]
    pub fn dispatch(&self, group_count: glam::UVec3) {
        self.assert_recording();
        unsafe {
            self.device().cmd_dispatch(self.handle, group_count.x, group_count.y, group_count.z);
        }
    }

    /// - command type: action
    /// - supported queue types: compute
    #[inline]
    pub fn dispatch_base(&self, base_group: glam::UVec3, group_count: glam::UVec3) {
        self.assert_recording();
        unsafe {
            self.device().cmd_dispatch_base(
                self.handle,
                base_group.x,
                base_group.y,
                base_group.z,
                group_count.x,
                group_count.y,
                group_count.z,
            );
        }
    }

    /// - command type: action
    /// - supported queue types: compute
    #[inline]
    pub fn dispatch_indirect(&self, buffer: &GfxBuffer, offset: vk::DeviceSize) {
        self.assert_recording();
        unsafe {
            self.device().cmd_dispatch_indirect(self.handle, buffer.handle(), offset);
        }
    }
}

// 动态状态
impl GfxCommandBuffer {
    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    pub fn set_viewport(&self, first_viewport: u32, viewports: &[vk::Viewport]) {
        self.assert_recording();
        unsafe {
            self.device().cmd_set_viewport(self.handle, first_viewport, viewports);
        }
    }

    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    pub fn set_scissor(&self, first_scissor: u32, scissors: &[vk::Rect2D]) {
        self.assert_recording();
        unsafe {
            self.device().cmd_set_scissor(self.handle, first_scissor, scissors);
        }
    }

    /// 同时设置覆盖整个 extent 的 viewport 与 scissor
    ///
    /// viewport 的 y 轴翻转，使得 y 轴朝上
    pub fn set_full_viewport_scissor(&self, extent: vk::Extent2D, flip_y: bool) {
        let viewport = if flip_y {
            vk::Viewport {
                x: 0.0,
                y: extent.height as f32,
                width: extent.width as f32,
                height: -(extent.height as f32),
                min_depth: 0.0,
                max_depth: 1.0,
            }
        } else {
            vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            }
        };
        self.set_viewport(0, &[viewport]);
        self.set_scissor(0, &[extent.into()]);
    }

    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    pub fn set_line_width(&self, line_width: f32) {
        self.assert_recording();
        unsafe {
            self.device().cmd_set_line_width(self.handle, line_width);
        }
    }

    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    pub fn set_depth_bias(&self, constant_factor: f32, clamp: f32, slope_factor: f32) {
        self.assert_recording();
        unsafe {
            self.device().cmd_set_depth_bias(self.handle, constant_factor, clamp, slope_factor);
        }
    }

    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    pub fn set_blend_constants(&self, blend_constants: &[f32; 4]) {
        self.assert_recording();
        unsafe {
            self.device().cmd_set_blend_constants(self.handle, blend_constants);
        }
    }

    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    pub fn set_depth_bounds(&self, min_depth_bounds: f32, max_depth_bounds: f32) {
        self.assert_recording();
        unsafe {
            self.device().cmd_set_depth_bounds(self.handle, min_depth_bounds, max_depth_bounds);
        }
    }

    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    pub fn set_stencil_compare_mask(&self, face_mask: vk::StencilFaceFlags, compare_mask: u32) {
        self.assert_recording();
        unsafe {
            self.device().cmd_set_stencil_compare_mask(self.handle, face_mask, compare_mask);
        }
    }

    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    pub fn set_stencil_write_mask(&self, face_mask: vk::StencilFaceFlags, write_mask: u32) {
        self.assert_recording();
        unsafe {
            self.device().cmd_set_stencil_write_mask(self.handle, face_mask, write_mask);
        }
    }

    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    pub fn set_stencil_reference(&self, face_mask: vk::StencilFaceFlags, reference: u32) {
        self.assert_recording();
        unsafe {
            self.device().cmd_set_stencil_reference(self.handle, face_mask, reference);
        }
    }
}

// event
impl GfxCommandBuffer {
    /// - command type: synchronization
    /// - supported queue types: graphics, compute
    #[inline]
    pub fn set_event(&self, event: &GfxEvent, stage: vk::PipelineStageFlags) {
        self.assert_recording();
        unsafe {
            self.device().cmd_set_event(self.handle, event.handle(), stage);
        }
    }

    /// - command type: synchronization
    /// - supported queue types: graphics, compute
    #[inline]
    pub fn reset_event(&self, event: &GfxEvent, stage: vk::PipelineStageFlags) {
        self.assert_recording();
        unsafe {
            self.device().cmd_reset_event(self.handle, event.handle(), stage);
        }
    }

    /// - command type: synchronization
    /// - supported queue types: graphics, compute
    pub fn wait_events(
        &self,
        events: &[&GfxEvent],
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        memory_barriers: &[vk::MemoryBarrier],
    ) {
        self.assert_recording();
        let handles = events.iter().map(|e| e.handle()).collect_vec();
        unsafe {
            self.device().cmd_wait_events(self.handle, &handles, src_stage, dst_stage, memory_barriers, &[], &[]);
        }
    }
}

// 同步命令
impl GfxCommandBuffer {
    /// 旧版的 pipeline barrier
    ///
    /// - command type: synchronization
    /// - supported queue types: transfer, graphics, compute
    pub fn set_pipeline_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        dependency_flags: vk::DependencyFlags,
        memory_barriers: &[vk::MemoryBarrier],
        buffer_barriers: &[vk::BufferMemoryBarrier],
        image_barriers: &[vk::ImageMemoryBarrier],
    ) {
        self.assert_recording();
        unsafe {
            self.device().cmd_pipeline_barrier(
                self.handle,
                src_stage,
                dst_stage,
                dependency_flags,
                memory_barriers,
                buffer_barriers,
                image_barriers,
            );
        }
    }

    /// synchronization2 的 pipeline barrier，设备需要支持 synchronization2
    ///
    /// - command type: synchronization
    /// - supported queue types: transfer, graphics, compute
    pub fn set_pipeline_barrier2(
        &self,
        dependency_flags: vk::DependencyFlags,
        memory_barriers: &[vk::MemoryBarrier2],
        buffer_barriers: &[vk::BufferMemoryBarrier2],
        image_barriers: &[vk::ImageMemoryBarrier2],
    ) {
        self.assert_recording();
        debug_assert!(self.device().supports_synchronization2());
        let dependency_info = vk::DependencyInfo::default()
            .dependency_flags(dependency_flags)
            .memory_barriers(memory_barriers)
            .buffer_memory_barriers(buffer_barriers)
            .image_memory_barriers(image_barriers);
        unsafe {
            self.device().cmd_pipeline_barrier2(self.handle, &dependency_info);
        }
    }

    /// 根据设备能力选择 synchronization2 或者旧版的 barrier
    pub fn barrier(
        &self,
        dependency_flags: vk::DependencyFlags,
        memory_barriers: &[GfxMemoryBarrier],
        buffer_barriers: &[GfxBufferBarrier],
        image_barriers: &[GfxImageBarrier],
    ) {
        if self.device().supports_synchronization2() {
            let memory = memory_barriers.iter().map(|b| b.inner()).collect_vec();
            let buffers = buffer_barriers.iter().map(|b| *b.inner()).collect_vec();
            let images = image_barriers.iter().map(|b| *b.inner()).collect_vec();
            self.set_pipeline_barrier2(dependency_flags, &memory, &buffers, &images);
        } else {
            let (src_stage, dst_stage) = merge_legacy_stages(
                memory_barriers
                    .iter()
                    .map(|b| b.mask)
                    .chain(buffer_barriers.iter().map(|b| b.barrier_mask()))
                    .chain(image_barriers.iter().map(|b| b.barrier_mask())),
            );
            let memory = memory_barriers.iter().map(|b| b.legacy()).collect_vec();
            let buffers = buffer_barriers.iter().map(|b| b.legacy()).collect_vec();
            let images = image_barriers.iter().map(|b| b.legacy()).collect_vec();
            self.set_pipeline_barrier(src_stage, dst_stage, dependency_flags, &memory, &buffers, &images);
        }
    }

    #[inline]
    pub fn image_memory_barrier(&self, dependency_flags: vk::DependencyFlags, barriers: &[GfxImageBarrier]) {
        self.barrier(dependency_flags, &[], &[], barriers);
    }

    #[inline]
    pub fn buffer_memory_barrier(&self, dependency_flags: vk::DependencyFlags, barriers: &[GfxBufferBarrier]) {
        self.barrier(dependency_flags, &[], barriers, &[]);
    }

    #[inline]
    pub fn set_memory_barrier(&self, mask: GfxBarrierMask) {
        self.barrier(vk::DependencyFlags::empty(), &[GfxMemoryBarrier::new(mask)], &[], &[]);
    }

    /// compute 写入之后，compute 读取
    #[inline]
    pub fn compute_to_compute_read_after_write(&self) {
        self.set_memory_barrier(GfxBarrierMask::COMPUTE_WRITE_TO_COMPUTE_READ);
    }

    /// compute 之间只有执行依赖（write-after-read）
    #[inline]
    pub fn compute_to_compute_execution(&self) {
        self.set_memory_barrier(GfxBarrierMask::COMPUTE_TO_COMPUTE_EXECUTION);
    }

    /// compute 写入的 index buffer 用于绘制
    #[inline]
    pub fn compute_to_index_input(&self) {
        self.set_memory_barrier(GfxBarrierMask::COMPUTE_WRITE_TO_INDEX_READ);
    }

    /// compute 写入的 indirect buffer 用于绘制
    #[inline]
    pub fn compute_to_draw_indirect(&self) {
        self.set_memory_barrier(GfxBarrierMask::COMPUTE_WRITE_TO_INDIRECT_READ);
    }

    /// compute 写入的 storage image 在 fragment shader 中采样，覆盖所有 mip 和 layer
    pub fn storage_image_compute_to_fragment_sample(&self, image: &GfxImage) {
        let barrier = GfxImageBarrier::from_recipe(
            image.handle(),
            GfxImageBarrierRecipe::STORAGE_IMAGE_COMPUTE_TO_FRAGMENT_SAMPLE,
            image.full_subresource_range(),
        );
        self.image_memory_barrier(vk::DependencyFlags::empty(), &[barrier]);
    }

    /// 所有 stage、所有访问类型的 barrier，只用于排查同步问题
    #[cfg(debug_assertions)]
    pub fn set_full_pipeline_barrier(&self) {
        self.set_memory_barrier(GfxBarrierMask::full_pipeline());
    }

    /// image layout 变换的唯一入口
    ///
    /// range 为空时覆盖 image 的所有 mip 和 layer，aspect 由 image 的格式推导
    #[allow(clippy::too_many_arguments)]
    pub fn transit_layout(
        &self,
        image: &GfxImage,
        src_stage: vk::PipelineStageFlags2,
        dst_stage: vk::PipelineStageFlags2,
        src_access: vk::AccessFlags2,
        dst_access: vk::AccessFlags2,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        range: Option<vk::ImageSubresourceRange>,
    ) {
        let range = range.unwrap_or_else(|| image.full_subresource_range());
        let barrier = GfxImageBarrier::new()
            .image(image.handle())
            .src_mask(src_stage, src_access)
            .dst_mask(dst_stage, dst_access)
            .layout_transfer(old_layout, new_layout)
            .range(range);
        self.image_memory_barrier(vk::DependencyFlags::empty(), &[barrier]);
    }

    #[inline]
    pub fn transit_layout_by_recipe(
        &self,
        image: &GfxImage,
        recipe: GfxImageBarrierRecipe,
        range: Option<vk::ImageSubresourceRange>,
    ) {
        self.transit_layout(
            image,
            recipe.mask.src_stage,
            recipe.mask.dst_stage,
            recipe.mask.src_access,
            recipe.mask.dst_access,
            recipe.old_layout,
            recipe.new_layout,
            range,
        );
    }

    /// 只根据格式推导 aspect，不依赖 [`GfxImage`]
    pub fn full_range_of(format: vk::Format, mip_levels: u32, array_layers: u32) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: infer_image_aspect(format),
            base_mip_level: 0,
            level_count: mip_levels,
            base_array_layer: 0,
            layer_count: array_layers,
        }
    }
}

// debug label
impl GfxCommandBuffer {
    /// 仅在启用了 debug utils 时生效
    pub fn begin_label(&self, label_name: &str, label_color: glam::Vec4) {
        let Some(debug_utils) = self.device().debug_utils() else {
            return;
        };
        let Ok(name) = CString::new(label_name) else {
            return;
        };
        unsafe {
            debug_utils.cmd_begin_debug_utils_label(
                self.handle,
                &vk::DebugUtilsLabelEXT::default().label_name(name.as_c_str()).color(label_color.into()),
            );
        }
    }

    pub fn end_label(&self) {
        let Some(debug_utils) = self.device().debug_utils() else {
            return;
        };
        unsafe {
            debug_utils.cmd_end_debug_utils_label(self.handle);
        }
    }

    pub fn insert_label(&self, label_name: &str, label_color: glam::Vec4) {
        let Some(debug_utils) = self.device().debug_utils() else {
            return;
        };
        let Ok(name) = CString::new(label_name) else {
            return;
        };
        unsafe {
            debug_utils.cmd_insert_debug_utils_label(
                self.handle,
                &vk::DebugUtilsLabelEXT::default().label_name(name.as_c_str()).color(label_color.into()),
            );
        }
    }
}

impl DebugType for GfxCommandBuffer {
    fn debug_type_name() -> &'static str {
        "GfxCommandBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle + Copy {
        self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CommandBufferState::*;

    #[test]
    fn test_full_range_of_depth_stencil() {
        let range = GfxCommandBuffer::full_range_of(vk::Format::D32_SFLOAT_S8_UINT, 1, 1);
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL);
        assert_eq!(range.level_count, 1);
    }

    #[test]
    fn test_full_range_of_color_cube() {
        let range = GfxCommandBuffer::full_range_of(vk::Format::R8G8B8A8_UNORM, 9, 6);
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(range.base_mip_level, 0);
        assert_eq!(range.level_count, 9);
        assert_eq!(range.layer_count, 6);
    }

    #[test]
    fn test_state_lifecycle() {
        let state = Initial.on_begin().unwrap();
        assert_eq!(state, Recording);
        assert!(state.can_record());

        let state = state.on_end().unwrap();
        assert_eq!(state, Executable);
        let state = state.on_submit().unwrap();
        assert_eq!(state, Pending);
        let state = state.on_complete();
        assert_eq!(state, Executable);

        // 执行完成后可以再次提交，也可以直接重新录制
        assert_eq!(state.on_submit(), Some(Pending));
        assert_eq!(state.on_begin(), Some(Recording));
        assert_eq!(state.on_reset(), Some(Initial));
    }

    #[test]
    fn test_recording_only_inside_begin_end() {
        assert!(!Initial.can_record());
        assert!(!Executable.can_record());
        assert!(!Pending.can_record());
        assert_eq!(Initial.on_end(), None);
        assert_eq!(Executable.on_end(), None);
    }

    #[test]
    fn test_double_begin_is_rejected() {
        assert_eq!(Recording.on_begin(), None);
        assert_eq!(Pending.on_begin(), None);
    }

    #[test]
    fn test_submit_only_from_executable() {
        assert_eq!(Initial.on_submit(), None);
        assert_eq!(Recording.on_submit(), None);
        // 没有观察到执行完成之前不能再次提交
        assert_eq!(Pending.on_submit(), None);
    }

    #[test]
    fn test_reset_and_complete() {
        assert_eq!(Pending.on_reset(), None);
        assert_eq!(Recording.on_reset(), Some(Initial));
        assert_eq!(Initial.on_complete(), Initial);
        assert_eq!(Recording.on_complete(), Recording);
    }
}
