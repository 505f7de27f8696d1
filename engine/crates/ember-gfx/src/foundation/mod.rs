pub mod debug_messenger;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod queue_family;
