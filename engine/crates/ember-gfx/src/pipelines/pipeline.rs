use std::{convert::identity, rc::Rc};

use ash::vk;
use itertools::Itertools;

use crate::{
    basic::format::format_size,
    error::GfxResult,
    foundation::{debug_messenger::DebugType, device::GfxDevice},
    pipelines::{
        pipeline_cache::GfxPipelineCache, pipeline_layout::GfxPipelineLayout, render_pass::GfxRenderPass,
        shader::GfxShaderModule,
    },
    vk_check,
};

/// 根据顶点属性的格式依次排列 attribute，stride 为所有格式大小之和
///
/// location 从 first_location 开始递增
pub fn vertex_layout_from_formats(
    binding: u32,
    first_location: u32,
    formats: &[vk::Format],
    input_rate: vk::VertexInputRate,
) -> (vk::VertexInputBindingDescription, Vec<vk::VertexInputAttributeDescription>) {
    let mut offset = 0;
    let attributes = formats
        .iter()
        .enumerate()
        .map(|(idx, format)| {
            let Some(size) = format_size(*format) else {
                panic!("unsupported vertex attribute format: {:?}", format);
            };
            let attribute = vk::VertexInputAttributeDescription {
                location: first_location + idx as u32,
                binding,
                format: *format,
                offset,
            };
            offset += size;
            attribute
        })
        .collect_vec();

    let binding_desc = vk::VertexInputBindingDescription {
        binding,
        stride: offset,
        input_rate,
    };
    (binding_desc, attributes)
}

pub struct GfxGraphicsPipelineCreateInfo {
    shader_stages: Vec<Rc<GfxShaderModule>>,

    vertex_binding_desc: Vec<vk::VertexInputBindingDescription>,
    vertex_attribute_desc: Vec<vk::VertexInputAttributeDescription>,

    primitive_topology: vk::PrimitiveTopology,
    primitive_restart: bool,

    /// 只有存在 tessellation shader 时才会使用
    patch_control_points: u32,

    /// viewport 和 scissor 的数量，具体值由 dynamic state 决定
    viewport_count: u32,
    scissor_count: u32,

    rasterize_state_info: vk::PipelineRasterizationStateCreateInfo<'static>,

    msaa_sample: vk::SampleCountFlags,
    enable_sample_shading: bool,

    color_attach_blend_states: Vec<vk::PipelineColorBlendAttachmentState>,
    blend_info: vk::PipelineColorBlendStateCreateInfo<'static>,

    depth_stencil_info: vk::PipelineDepthStencilStateCreateInfo<'static>,

    dynamic_states: Vec<vk::DynamicState>,

    /// 传统 render pass；为 None 时使用 dynamic rendering
    render_pass: Option<(Rc<GfxRenderPass>, u32)>,

    /// dynamic render 需要的 framebuffer 信息
    color_attach_formats: Vec<vk::Format>,
    depth_attach_format: vk::Format,
    stencil_attach_format: vk::Format,
}

impl Default for GfxGraphicsPipelineCreateInfo {
    fn default() -> Self {
        Self {
            shader_stages: vec![],

            vertex_binding_desc: vec![],
            vertex_attribute_desc: vec![],

            primitive_topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart: false,
            patch_control_points: 3,

            viewport_count: 1,
            scissor_count: 1,

            rasterize_state_info: vk::PipelineRasterizationStateCreateInfo::default()
                .depth_clamp_enable(false)
                .rasterizer_discard_enable(false)
                .polygon_mode(vk::PolygonMode::FILL)
                .line_width(1.0)
                .cull_mode(vk::CullModeFlags::BACK)
                // 按照 OpenGL 的传统，将 CCW 视为 front face
                .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
                .depth_bias_enable(false),
            msaa_sample: vk::SampleCountFlags::TYPE_1,
            enable_sample_shading: false,

            color_attach_blend_states: vec![],
            blend_info: vk::PipelineColorBlendStateCreateInfo::default()
                .logic_op_enable(false)
                .blend_constants([0.0, 0.0, 0.0, 0.0]),

            depth_stencil_info: vk::PipelineDepthStencilStateCreateInfo::default()
                .depth_test_enable(true)
                .depth_write_enable(true)
                .depth_compare_op(vk::CompareOp::LESS)
                .depth_bounds_test_enable(false)
                .stencil_test_enable(false),
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],

            render_pass: None,

            color_attach_formats: vec![],
            // format = undefined 表示不使用这个 attachment
            depth_attach_format: vk::Format::UNDEFINED,
            stencil_attach_format: vk::Format::UNDEFINED,
        }
    }
}

// builder
impl GfxGraphicsPipelineCreateInfo {
    #[inline]
    pub fn shader_stage(&mut self, module: Rc<GfxShaderModule>) -> &mut Self {
        self.shader_stages.push(module);
        self
    }

    #[inline]
    pub fn shader_stages(&mut self, modules: Vec<Rc<GfxShaderModule>>) -> &mut Self {
        self.shader_stages = modules;
        self
    }

    #[inline]
    pub fn vertex_binding(&mut self, bindings: Vec<vk::VertexInputBindingDescription>) -> &mut Self {
        self.vertex_binding_desc = bindings;
        self
    }

    #[inline]
    pub fn vertex_attribute(&mut self, attributes: Vec<vk::VertexInputAttributeDescription>) -> &mut Self {
        self.vertex_attribute_desc = attributes;
        self
    }

    /// 追加一个 vertex binding，attribute 紧密排列，location 接在已有 attribute 之后
    pub fn add_vertex_binding_from_formats(
        &mut self,
        binding: u32,
        formats: &[vk::Format],
        input_rate: vk::VertexInputRate,
    ) -> &mut Self {
        let first_location = self.vertex_attribute_desc.len() as u32;
        let (binding_desc, attributes) = vertex_layout_from_formats(binding, first_location, formats, input_rate);
        self.vertex_binding_desc.push(binding_desc);
        self.vertex_attribute_desc.extend(attributes);
        self
    }

    #[inline]
    pub fn primitive_topology(&mut self, topology: vk::PrimitiveTopology, primitive_restart: bool) -> &mut Self {
        self.primitive_topology = topology;
        self.primitive_restart = primitive_restart;
        self
    }

    #[inline]
    pub fn patch_control_points(&mut self, points: u32) -> &mut Self {
        self.patch_control_points = points;
        self
    }

    #[inline]
    pub fn viewport_scissor_count(&mut self, viewport_count: u32, scissor_count: u32) -> &mut Self {
        self.viewport_count = viewport_count;
        self.scissor_count = scissor_count;
        self
    }

    #[inline]
    pub fn polygon_mode(&mut self, mode: vk::PolygonMode) -> &mut Self {
        self.rasterize_state_info.polygon_mode = mode;
        self
    }

    #[inline]
    pub fn cull_mode(&mut self, mode: vk::CullModeFlags, front_face: vk::FrontFace) -> &mut Self {
        self.rasterize_state_info.cull_mode = mode;
        self.rasterize_state_info.front_face = front_face;
        self
    }

    #[inline]
    pub fn depth_bias(&mut self, enable: bool) -> &mut Self {
        self.rasterize_state_info.depth_bias_enable = if enable { vk::TRUE } else { vk::FALSE };
        self
    }

    #[inline]
    pub fn msaa(&mut self, samples: vk::SampleCountFlags, sample_shading: bool) -> &mut Self {
        self.msaa_sample = samples;
        self.enable_sample_shading = sample_shading;
        self
    }

    /// 为每个 color attachment 指定 blend 操作
    #[inline]
    pub fn color_blend(
        &mut self,
        states: Vec<vk::PipelineColorBlendAttachmentState>,
        blend_constants: [f32; 4],
    ) -> &mut Self {
        self.color_attach_blend_states = states;
        self.blend_info.blend_constants = blend_constants;
        self.blend_info.logic_op_enable = vk::FALSE;
        self
    }

    /// logic op 和 blend op 是互斥的
    #[inline]
    pub fn blend_logic_op(&mut self, logic_op: vk::LogicOp) -> &mut Self {
        self.blend_info.logic_op = logic_op;
        self.blend_info.logic_op_enable = vk::TRUE;
        self
    }

    #[inline]
    pub fn depth_test(
        &mut self,
        depth_test_op: Option<vk::CompareOp>,
        depth_write: bool,
        depth_bounds_test: bool,
    ) -> &mut Self {
        self.depth_stencil_info.depth_test_enable = depth_test_op.map_or(vk::FALSE, |_| vk::TRUE);
        self.depth_stencil_info.depth_compare_op = depth_test_op.map_or(vk::CompareOp::NEVER, identity);
        self.depth_stencil_info.depth_write_enable = if depth_write { vk::TRUE } else { vk::FALSE };
        self.depth_stencil_info.depth_bounds_test_enable = if depth_bounds_test { vk::TRUE } else { vk::FALSE };
        self
    }

    #[inline]
    pub fn stencil_test(
        &mut self,
        enable: bool,
        front: vk::StencilOpState,
        back: vk::StencilOpState,
    ) -> &mut Self {
        self.depth_stencil_info.stencil_test_enable = if enable { vk::TRUE } else { vk::FALSE };
        self.depth_stencil_info.front = front;
        self.depth_stencil_info.back = back;
        self
    }

    /// 在 VIEWPORT 和 SCISSOR 之外追加的 dynamic state
    #[inline]
    pub fn dynamic_states(&mut self, states: &[vk::DynamicState]) -> &mut Self {
        for state in states {
            if !self.dynamic_states.contains(state) {
                self.dynamic_states.push(*state);
            }
        }
        self
    }

    #[inline]
    pub fn render_pass(&mut self, render_pass: Rc<GfxRenderPass>, subpass: u32) -> &mut Self {
        self.render_pass = Some((render_pass, subpass));
        self
    }

    /// dynamic rendering 使用的 attachment 格式
    #[inline]
    pub fn attach_info(
        &mut self,
        color_attach_formats: Vec<vk::Format>,
        depth_format: Option<vk::Format>,
        stencil_format: Option<vk::Format>,
    ) -> &mut Self {
        self.color_attach_formats = color_attach_formats;
        self.depth_attach_format = depth_format.unwrap_or(vk::Format::UNDEFINED);
        self.stencil_attach_format = stencil_format.unwrap_or(vk::Format::UNDEFINED);
        self
    }
}

// getters
impl GfxGraphicsPipelineCreateInfo {
    #[inline]
    pub fn vertex_bindings(&self) -> &[vk::VertexInputBindingDescription] {
        &self.vertex_binding_desc
    }

    #[inline]
    pub fn vertex_attributes(&self) -> &[vk::VertexInputAttributeDescription] {
        &self.vertex_attribute_desc
    }

    #[inline]
    pub fn get_dynamic_states(&self) -> &[vk::DynamicState] {
        &self.dynamic_states
    }

    /// 是否包含 tessellation control 或者 evaluation shader
    pub fn has_tessellation(&self) -> bool {
        self.shader_stages.iter().any(|s| {
            s.stage()
                .intersects(vk::ShaderStageFlags::TESSELLATION_CONTROL | vk::ShaderStageFlags::TESSELLATION_EVALUATION)
        })
    }
}

/// 关闭 blend，写入所有颜色通道
pub fn opaque_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(false)
        .color_write_mask(vk::ColorComponentFlags::RGBA)
}

/// 标准的 alpha blend：src * a + dst * (1 - a)
pub fn alpha_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(true)
        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .alpha_blend_op(vk::BlendOp::ADD)
        .color_write_mask(vk::ColorComponentFlags::RGBA)
}

/// graphics 或 compute pipeline
pub struct GfxPipeline {
    device: Rc<GfxDevice>,
    handle: vk::Pipeline,
    bind_point: vk::PipelineBindPoint,

    /// 因为多个 pipeline 可以使用同一个 pipeline layout，所以这里使用 Rc
    layout: Rc<GfxPipelineLayout>,
    _render_pass: Option<Rc<GfxRenderPass>>,
}

// new & init
impl GfxPipeline {
    pub fn new_graphics(
        device: &Rc<GfxDevice>,
        create_info: &GfxGraphicsPipelineCreateInfo,
        layout: Rc<GfxPipelineLayout>,
        cache: Option<&GfxPipelineCache>,
        debug_name: &str,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxPipeline::new_graphics");

        let shader_stages_info = create_info.shader_stages.iter().map(|s| s.stage_info()).collect_vec();

        // 顶点和 index
        let vertex_input_state_info = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&create_info.vertex_binding_desc)
            .vertex_attribute_descriptions(&create_info.vertex_attribute_desc);

        let input_assembly_info = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(create_info.primitive_topology)
            .primitive_restart_enable(create_info.primitive_restart);

        let tessellation_info =
            vk::PipelineTessellationStateCreateInfo::default().patch_control_points(create_info.patch_control_points);

        // viewport 和 scissor 具体值由 dynamic 决定，但是数量由该 create info 决定
        let viewport_info = vk::PipelineViewportStateCreateInfo {
            viewport_count: create_info.viewport_count,
            scissor_count: create_info.scissor_count,
            ..Default::default()
        };

        // MSAA 配置
        let msaa_info = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(create_info.enable_sample_shading)
            .rasterization_samples(create_info.msaa_sample);

        // 混合设置：需要为每个 color attachment 分别指定
        let color_blend_info = create_info.blend_info.attachments(&create_info.color_attach_blend_states);

        let dynamic_state_info =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&create_info.dynamic_states);

        // dynamic rendering 需要的 framebuffer 信息
        let mut attach_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&create_info.color_attach_formats)
            .depth_attachment_format(create_info.depth_attach_format)
            .stencil_attachment_format(create_info.stencil_attach_format);

        let mut pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages_info)
            .vertex_input_state(&vertex_input_state_info)
            .input_assembly_state(&input_assembly_info)
            .viewport_state(&viewport_info)
            .rasterization_state(&create_info.rasterize_state_info)
            .multisample_state(&msaa_info)
            .color_blend_state(&color_blend_info)
            .depth_stencil_state(&create_info.depth_stencil_info)
            .layout(layout.handle())
            .dynamic_state(&dynamic_state_info);
        if create_info.has_tessellation() {
            pipeline_info = pipeline_info.tessellation_state(&tessellation_info);
        }
        match &create_info.render_pass {
            Some((render_pass, subpass)) => {
                pipeline_info = pipeline_info.render_pass(render_pass.handle()).subpass(*subpass);
            }
            None => {
                pipeline_info = pipeline_info.push_next(&mut attach_info);
            }
        }

        let cache_handle = cache.map_or(vk::PipelineCache::null(), |c| c.handle());
        let pipelines = vk_check!(unsafe {
            device
                .create_graphics_pipelines(cache_handle, std::slice::from_ref(&pipeline_info), None)
                .map_err(|(_, result)| result)
        })?;

        let pipeline = Self {
            device: device.clone(),
            handle: pipelines[0],
            bind_point: vk::PipelineBindPoint::GRAPHICS,
            layout,
            _render_pass: create_info.render_pass.as_ref().map(|(rp, _)| rp.clone()),
        };
        device.set_debug_name(&pipeline, debug_name);
        Ok(pipeline)
    }

    pub fn new_compute(
        device: &Rc<GfxDevice>,
        shader: &GfxShaderModule,
        layout: Rc<GfxPipelineLayout>,
        cache: Option<&GfxPipelineCache>,
        debug_name: &str,
    ) -> GfxResult<Self> {
        debug_assert_eq!(shader.stage(), vk::ShaderStageFlags::COMPUTE);
        let pipeline_info = vk::ComputePipelineCreateInfo::default().stage(shader.stage_info()).layout(layout.handle());

        let cache_handle = cache.map_or(vk::PipelineCache::null(), |c| c.handle());
        let pipelines = vk_check!(unsafe {
            device
                .create_compute_pipelines(cache_handle, std::slice::from_ref(&pipeline_info), None)
                .map_err(|(_, result)| result)
        })?;

        let pipeline = Self {
            device: device.clone(),
            handle: pipelines[0],
            bind_point: vk::PipelineBindPoint::COMPUTE,
            layout,
            _render_pass: None,
        };
        device.set_debug_name(&pipeline, debug_name);
        Ok(pipeline)
    }
}

// getters
impl GfxPipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }

    #[inline]
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        self.bind_point
    }

    #[inline]
    pub fn layout(&self) -> &Rc<GfxPipelineLayout> {
        &self.layout
    }
}

impl Drop for GfxPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.handle, None);
        }
    }
}

impl DebugType for GfxPipeline {
    fn debug_type_name() -> &'static str {
        "GfxPipeline"
    }

    fn vk_handle(&self) -> impl vk::Handle + Copy {
        self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout_from_formats() {
        let (binding, attributes) = vertex_layout_from_formats(
            0,
            0,
            &[vk::Format::R32G32B32_SFLOAT, vk::Format::R32G32B32_SFLOAT, vk::Format::R32G32_SFLOAT],
            vk::VertexInputRate::VERTEX,
        );
        assert_eq!(binding.stride, 32);
        assert_eq!(attributes.iter().map(|a| a.offset).collect_vec(), vec![0, 12, 24]);
        assert_eq!(attributes.iter().map(|a| a.location).collect_vec(), vec![0, 1, 2]);
    }

    #[test]
    fn test_add_vertex_binding_continues_locations() {
        let mut ci = GfxGraphicsPipelineCreateInfo::default();
        ci.add_vertex_binding_from_formats(0, &[vk::Format::R32G32B32_SFLOAT], vk::VertexInputRate::VERTEX)
            .add_vertex_binding_from_formats(
                1,
                &[vk::Format::R32G32B32A32_SFLOAT, vk::Format::R8G8B8A8_UNORM],
                vk::VertexInputRate::INSTANCE,
            );

        assert_eq!(ci.vertex_bindings().len(), 2);
        assert_eq!(ci.vertex_bindings()[1].stride, 20);
        assert_eq!(ci.vertex_bindings()[1].input_rate, vk::VertexInputRate::INSTANCE);
        let instance_attrs = ci.vertex_attributes().iter().filter(|a| a.binding == 1).collect_vec();
        assert_eq!(instance_attrs.iter().map(|a| a.location).collect_vec(), vec![1, 2]);
        assert_eq!(instance_attrs[1].offset, 16);
    }

    #[test]
    fn test_extra_dynamic_states_are_deduplicated() {
        let mut ci = GfxGraphicsPipelineCreateInfo::default();
        ci.dynamic_states(&[vk::DynamicState::SCISSOR, vk::DynamicState::LINE_WIDTH]);
        assert_eq!(
            ci.get_dynamic_states(),
            &[vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR, vk::DynamicState::LINE_WIDTH]
        );
        assert!(!ci.has_tessellation());
    }

    #[test]
    #[should_panic]
    fn test_unknown_vertex_format_panics() {
        vertex_layout_from_formats(0, 0, &[vk::Format::BC1_RGB_UNORM_BLOCK], vk::VertexInputRate::VERTEX);
    }
}
