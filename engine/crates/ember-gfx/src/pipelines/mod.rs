pub mod framebuffer;
pub mod pipeline;
pub mod pipeline_cache;
pub mod pipeline_layout;
pub mod render_pass;
pub mod shader;
