//! Ember 的 GFX 层
//!
//! 对 Vulkan 的薄封装：所有的设备调用都经过 [`foundation::backend::GfxBackend`]，
//! 上层只接触这里的 RAII 类型。

pub mod commands;
pub mod descriptors;
pub mod foundation;
pub mod gfx_error;
pub mod resources;
pub mod swapchain;
