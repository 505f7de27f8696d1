// 参考 winit::MouseButton
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Back,
    Forward,
    Other(u16),
}

// 参考 winit::KeyCode，只保留用到的按键
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyCode {
    KeyW,
    KeyA,
    KeyS,
    KeyD,
    KeyE,
    KeyQ,
    Escape,
    Space,

    Other,
}

/// 窗口事件，由窗口系统的适配层转换而来
#[derive(Debug, Clone, PartialEq)]
pub enum WindowEvent {
    /// physical size
    Resized {
        width: u32,
        height: u32,
    },
    CloseRequested,
    Focused(bool),
    KeyboardInput {
        key: KeyCode,
        pressed: bool,
    },
    MouseButton {
        button: MouseButton,
        pressed: bool,
    },
    /// physical position
    MouseMoved {
        x: f64,
        y: f64,
    },
    /// 只考虑垂直滚动
    MouseWheel {
        delta: f64,
    },
    RedrawRequested,

    Other,
}

/// 窗口处理完事件之后，需要窗口系统配合的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventResponse {
    None,
    /// 需要重绘
    Redraw,
    /// 应当关闭窗口
    Close,
}

impl WindowEvent {
    /// 宽或高为 0 的 resize 表示窗口被最小化
    #[inline]
    pub fn is_minimize(&self) -> bool {
        matches!(self, Self::Resized { width, height } if *width == 0 || *height == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_minimize() {
        assert!(WindowEvent::Resized { width: 0, height: 600 }.is_minimize());
        assert!(WindowEvent::Resized { width: 800, height: 0 }.is_minimize());
        assert!(!WindowEvent::Resized { width: 800, height: 600 }.is_minimize());
        assert!(!WindowEvent::CloseRequested.is_minimize());
    }
}
