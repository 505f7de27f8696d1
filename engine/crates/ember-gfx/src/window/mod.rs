//! 窗口相关：事件、帧节奏、与窗口绑定的 present 逻辑

pub mod app_context;
pub mod event;
pub mod frame;
pub mod render_window;
