use ember_gfx::window::event::{KeyCode, MouseButton, WindowEvent};
use winit::event::{ElementState, KeyEvent, MouseScrollDelta};
use winit::keyboard::PhysicalKey;

pub struct WinitEventAdapter {}
impl WinitEventAdapter {
    pub fn from_winit_event(event: &winit::event::WindowEvent) -> WindowEvent {
        match event {
            winit::event::WindowEvent::Resized(physical_size) => WindowEvent::Resized {
                width: physical_size.width,
                height: physical_size.height,
            },
            winit::event::WindowEvent::CloseRequested => WindowEvent::CloseRequested,
            winit::event::WindowEvent::Focused(focused) => WindowEvent::Focused(*focused),
            winit::event::WindowEvent::RedrawRequested => WindowEvent::RedrawRequested,
            winit::event::WindowEvent::CursorMoved { position, .. } => WindowEvent::MouseMoved {
                x: position.x,
                y: position.y,
            },
            winit::event::WindowEvent::MouseWheel { delta, .. } => WindowEvent::MouseWheel {
                delta: Self::wheel_from_winit(*delta),
            },
            winit::event::WindowEvent::MouseInput { state, button, .. } => WindowEvent::MouseButton {
                button: Self::button_from_winit(*button),
                pressed: Self::pressed_from_winit(*state),
            },
            winit::event::WindowEvent::KeyboardInput { event, .. } => {
                if let KeyEvent {
                    physical_key: PhysicalKey::Code(key_code),
                    state,
                    ..
                } = event
                {
                    WindowEvent::KeyboardInput {
                        key: Self::key_from_winit(*key_code),
                        pressed: Self::pressed_from_winit(*state),
                    }
                } else {
                    WindowEvent::Other
                }
            }
            _ => WindowEvent::Other,
        }
    }

    /// 只考虑垂直滚动，像素滚动按 100 像素一行换算
    fn wheel_from_winit(delta: MouseScrollDelta) -> f64 {
        match delta {
            MouseScrollDelta::LineDelta(_, y) => y as f64,
            MouseScrollDelta::PixelDelta(pos) => pos.y / 100.0,
        }
    }

    fn button_from_winit(button: winit::event::MouseButton) -> MouseButton {
        match button {
            winit::event::MouseButton::Left => MouseButton::Left,
            winit::event::MouseButton::Right => MouseButton::Right,
            winit::event::MouseButton::Middle => MouseButton::Middle,
            winit::event::MouseButton::Back => MouseButton::Back,
            winit::event::MouseButton::Forward => MouseButton::Forward,
            winit::event::MouseButton::Other(code) => MouseButton::Other(code),
        }
    }

    fn key_from_winit(key: winit::keyboard::KeyCode) -> KeyCode {
        match key {
            winit::keyboard::KeyCode::KeyW => KeyCode::KeyW,
            winit::keyboard::KeyCode::KeyA => KeyCode::KeyA,
            winit::keyboard::KeyCode::KeyS => KeyCode::KeyS,
            winit::keyboard::KeyCode::KeyD => KeyCode::KeyD,
            winit::keyboard::KeyCode::KeyE => KeyCode::KeyE,
            winit::keyboard::KeyCode::KeyQ => KeyCode::KeyQ,
            winit::keyboard::KeyCode::Escape => KeyCode::Escape,
            winit::keyboard::KeyCode::Space => KeyCode::Space,
            _ => KeyCode::Other,
        }
    }

    #[inline]
    fn pressed_from_winit(state: ElementState) -> bool {
        state == ElementState::Pressed
    }
}

#[cfg(test)]
mod tests {
    use winit::dpi::{PhysicalPosition, PhysicalSize};

    use super::*;

    #[test]
    fn test_window_events() {
        let resized = winit::event::WindowEvent::Resized(PhysicalSize::new(800, 600));
        assert_eq!(
            WinitEventAdapter::from_winit_event(&resized),
            WindowEvent::Resized { width: 800, height: 600 }
        );
        assert_eq!(
            WinitEventAdapter::from_winit_event(&winit::event::WindowEvent::CloseRequested),
            WindowEvent::CloseRequested
        );
        assert_eq!(
            WinitEventAdapter::from_winit_event(&winit::event::WindowEvent::Focused(false)),
            WindowEvent::Focused(false)
        );
        assert_eq!(
            WinitEventAdapter::from_winit_event(&winit::event::WindowEvent::RedrawRequested),
            WindowEvent::RedrawRequested
        );
        assert_eq!(
            WinitEventAdapter::from_winit_event(&winit::event::WindowEvent::Destroyed),
            WindowEvent::Other
        );
    }

    #[test]
    fn test_wheel_delta() {
        assert_eq!(WinitEventAdapter::wheel_from_winit(MouseScrollDelta::LineDelta(0.0, 2.0)), 2.0);
        assert_eq!(
            WinitEventAdapter::wheel_from_winit(MouseScrollDelta::PixelDelta(PhysicalPosition::new(0.0, 50.0))),
            0.5
        );
    }

    #[test]
    fn test_buttons_and_keys() {
        assert_eq!(WinitEventAdapter::button_from_winit(winit::event::MouseButton::Left), MouseButton::Left);
        assert_eq!(WinitEventAdapter::button_from_winit(winit::event::MouseButton::Other(7)), MouseButton::Other(7));
        assert_eq!(WinitEventAdapter::key_from_winit(winit::keyboard::KeyCode::Escape), KeyCode::Escape);
        assert_eq!(WinitEventAdapter::key_from_winit(winit::keyboard::KeyCode::KeyZ), KeyCode::Other);
        assert!(WinitEventAdapter::pressed_from_winit(ElementState::Pressed));
        assert!(!WinitEventAdapter::pressed_from_winit(ElementState::Released));
    }
}
