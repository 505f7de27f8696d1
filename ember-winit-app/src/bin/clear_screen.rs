use std::path::Path;

use ember_gfx::window::{frame::FrameContext, render_window::RenderWindow};
use ember_winit_app::app::{OuterApp, WinitApp};

/// 只清屏，不绘制任何东西
#[derive(Default)]
struct ClearScreenApp {
    frames: u64,
}

impl OuterApp for ClearScreenApp {
    fn draw(&mut self, window: &RenderWindow, frame: FrameContext) {
        self.frames += 1;
        if self.frames % 1000 == 0 {
            let extent = window.extent();
            log::info!("{} frames, extent: {}x{}, image: {}", self.frames, extent.width, extent.height, frame.image_index);
        }
    }
}

fn main() -> anyhow::Result<()> {
    WinitApp::run(Box::new(ClearScreenApp::default()), Path::new("gfx.toml"))
}
