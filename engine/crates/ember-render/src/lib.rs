//! Ember 的帧组织层
//!
//! - [`frame`]：多个 frame slot 的资源以及 CPU/GPU 同步
//! - [`view`]：视图、视口与相机
//! - [`render_target`]：按视图并行录制命令并提交
//! - [`surface`]：跳帧计数、资源的延迟释放以及 swapchain 重建

pub mod frame;
pub mod partition;
pub mod render_key;
pub mod render_target;
pub mod resources;
pub mod settings;
pub mod surface;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;
