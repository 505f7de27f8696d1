use std::{
    ffi::{CStr, CString},
    io::Cursor,
    path::Path,
    rc::Rc,
};

use ash::vk;

use crate::{
    error::{GfxError, GfxResult},
    foundation::{debug_messenger::DebugType, device::GfxDevice},
    vk_check,
};

/// SPIR-V 的 magic number，也是唯一的合法性检查
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// 把 shader 源码编译为 SPIR-V 的外部工具，例如 shaderc 或 slangc
pub trait ShaderCompiler {
    /// 成功时返回 SPIR-V words，失败时返回编译日志
    fn compile(
        &self,
        source: &str,
        stage: vk::ShaderStageFlags,
        entry_point: &str,
        macros: &[(&str, Option<&str>)],
    ) -> Result<Vec<u32>, String>;
}

/// 编译好的 SPIR-V 以及它的 stage 和入口
#[derive(Clone, Debug)]
pub struct GfxShader {
    stage: vk::ShaderStageFlags,
    entry_point: CString,
    code: Vec<u32>,
    name: String,
}

// new & init
impl GfxShader {
    pub fn new(stage: vk::ShaderStageFlags, entry_point: &str, code: Vec<u32>, name: impl AsRef<str>) -> Self {
        Self {
            stage,
            // 入口名中不会有 \0
            entry_point: CString::new(entry_point).unwrap_or_else(|_| c"main".to_owned()),
            code,
            name: name.as_ref().to_string(),
        }
    }

    /// bytes 的长度需要是 4 的倍数，字节序由 magic number 判断
    pub fn from_spirv_bytes(
        bytes: &[u8],
        stage: vk::ShaderStageFlags,
        entry_point: &str,
        name: impl AsRef<str>,
    ) -> GfxResult<Self> {
        let code = ash::util::read_spv(&mut Cursor::new(bytes))
            .map_err(|e| GfxError::InvalidShaderBytecode(format!("{}: {}", name.as_ref(), e)))?;
        Ok(Self::new(stage, entry_point, code, name))
    }

    /// # param
    /// * path - spv shader 文件路径
    pub fn from_file(path: &Path, stage: vk::ShaderStageFlags, entry_point: &str) -> GfxResult<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_spirv_bytes(&bytes, stage, entry_point, path.to_string_lossy())
    }

    /// 通过外部编译器把源码编译为 SPIR-V，编译失败时返回编译日志
    pub fn compile(
        compiler: &dyn ShaderCompiler,
        source: &str,
        stage: vk::ShaderStageFlags,
        entry_point: &str,
        macros: &[(&str, Option<&str>)],
        name: impl AsRef<str>,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxShader::compile");
        match compiler.compile(source, stage, entry_point, macros) {
            Ok(code) => Ok(Self::new(stage, entry_point, code, name)),
            Err(log) => {
                log::error!("failed to compile shader {}:\n{}", name.as_ref(), log);
                Err(GfxError::ShaderCompilation(log))
            }
        }
    }
}

// getters
impl GfxShader {
    /// 第一个 word 是 SPIR-V 的 magic number
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.code.first() == Some(&SPIRV_MAGIC)
    }

    #[inline]
    pub fn stage(&self) -> vk::ShaderStageFlags {
        self.stage
    }

    #[inline]
    pub fn entry_point(&self) -> &CStr {
        &self.entry_point
    }

    #[inline]
    pub fn code(&self) -> &[u32] {
        &self.code
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub struct GfxShaderModule {
    device: Rc<GfxDevice>,
    handle: vk::ShaderModule,

    stage: vk::ShaderStageFlags,
    entry_point: CString,
}

impl GfxShaderModule {
    pub fn new(device: &Rc<GfxDevice>, shader: &GfxShader) -> GfxResult<Self> {
        if !shader.is_valid() {
            return Err(GfxError::InvalidShaderBytecode(format!("{}: bad magic number", shader.name())));
        }

        let shader_module_info = vk::ShaderModuleCreateInfo::default().code(shader.code());
        let handle = vk_check!(unsafe { device.ash_device().create_shader_module(&shader_module_info, None) })?;

        let shader_module = Self {
            device: device.clone(),
            handle,
            stage: shader.stage(),
            entry_point: shader.entry_point().to_owned(),
        };
        device.set_debug_name(&shader_module, shader.name());
        Ok(shader_module)
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }

    #[inline]
    pub fn stage(&self) -> vk::ShaderStageFlags {
        self.stage
    }

    #[inline]
    pub fn entry_point(&self) -> &CStr {
        &self.entry_point
    }

    /// pipeline 创建时使用的 stage 信息，引用 self 中的入口名
    #[inline]
    pub fn stage_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default().stage(self.stage).module(self.handle).name(&self.entry_point)
    }
}

impl Drop for GfxShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.handle, None);
        }
    }
}

impl DebugType for GfxShaderModule {
    fn debug_type_name() -> &'static str {
        "GfxShaderModule"
    }

    fn vk_handle(&self) -> impl vk::Handle + Copy {
        self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoCompiler;

    impl ShaderCompiler for EchoCompiler {
        fn compile(
            &self,
            source: &str,
            _stage: vk::ShaderStageFlags,
            _entry_point: &str,
            macros: &[(&str, Option<&str>)],
        ) -> Result<Vec<u32>, String> {
            if source.contains("error") {
                return Err(format!("1: syntax error, {} macros", macros.len()));
            }
            Ok(vec![SPIRV_MAGIC, 0x0001_0000, source.len() as u32])
        }
    }

    #[test]
    fn test_is_valid() {
        let shader = GfxShader::new(vk::ShaderStageFlags::VERTEX, "main", vec![SPIRV_MAGIC, 0], "ok");
        assert!(shader.is_valid());

        let shader = GfxShader::new(vk::ShaderStageFlags::VERTEX, "main", vec![0xdead_beef], "bad");
        assert!(!shader.is_valid());

        let shader = GfxShader::new(vk::ShaderStageFlags::VERTEX, "main", vec![], "empty");
        assert!(!shader.is_valid());
    }

    #[test]
    fn test_from_spirv_bytes() {
        let words = [SPIRV_MAGIC, 0x0001_0500, 0, 1, 0];
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        let shader = GfxShader::from_spirv_bytes(&bytes, vk::ShaderStageFlags::COMPUTE, "cs_main", "test").unwrap();
        assert!(shader.is_valid());
        assert_eq!(shader.code(), &words);
        assert_eq!(shader.entry_point(), c"cs_main");

        // 长度不是 4 的倍数
        let err = GfxShader::from_spirv_bytes(&bytes[..7], vk::ShaderStageFlags::COMPUTE, "main", "broken");
        assert!(matches!(err, Err(GfxError::InvalidShaderBytecode(_))));
    }

    #[test]
    fn test_compile_through_trait() {
        let shader =
            GfxShader::compile(&EchoCompiler, "void main() {}", vk::ShaderStageFlags::FRAGMENT, "main", &[], "frag")
                .unwrap();
        assert!(shader.is_valid());
        assert_eq!(shader.stage(), vk::ShaderStageFlags::FRAGMENT);

        let err = GfxShader::compile(
            &EchoCompiler,
            "error",
            vk::ShaderStageFlags::FRAGMENT,
            "main",
            &[("USE_SHADOW", Some("1"))],
            "frag",
        );
        match err {
            Err(GfxError::ShaderCompilation(log)) => assert!(log.contains("1 macros")),
            _ => panic!("expected compilation error"),
        }
    }
}
