pub mod surface;
#[allow(clippy::module_inception)]
pub mod swapchain;
