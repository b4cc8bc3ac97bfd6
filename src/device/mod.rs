pub mod controller;
pub mod loop_worker;
pub mod pipeline;

pub use controller::DeviceController;
pub use pipeline::DevicePipeline;
