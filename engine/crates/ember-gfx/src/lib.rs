//! Vulkan 设备、资源与同步的封装层
//!
//! 所有 GPU 对象都持有 `Rc<GfxDevice>` 并在 Drop 时释放自己，对象之间的引用只会指向更底层的对象
//! （view -> image -> device，framebuffer -> views，descriptor set -> pool / layout，pipeline -> layout）。
//! 错误通过 [`error::GfxResult`] 返回，驱动的错误码由 [`vk_check!`] 统一转换并记录日志。
//!
//! # 使用示例
//! ```ignore
//! let settings = GfxSettings::load("gfx.toml")?;
//! let mut app = AppContext::new(settings, Some(display_handle))?;
//! let window = app.create_window(WindowId(0), display_handle, window_handle, extent)?;
//! if let Some(frame) = window.begin_frame()? {
//!     window.begin_default_render_pass(frame);
//!     window.command_buffer(frame).end_render_pass();
//!     window.end_frame(frame)?;
//! }
//! ```

pub mod basic;
pub mod commands;
pub mod descriptors;
pub mod error;
pub mod foundation;
pub mod pipelines;
pub mod resources;
pub mod settings;
pub mod swapchain;
pub mod window;
