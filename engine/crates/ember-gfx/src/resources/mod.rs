pub mod buffer;
pub mod buffer_view;
pub mod image;
pub mod image_view;
pub mod sampler;
