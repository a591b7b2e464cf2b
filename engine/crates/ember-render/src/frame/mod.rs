//! 帧的组织结构
//!
//! 每一帧包含一个或多个视图，每个视图由一个或多个线程录制命令：
//! - Frame：fence、image available semaphore、primary command buffer
//!     - View：uniforms、descriptor pool、secondary command buffer 所在的 command pool
//!         - Thread：录制时引用到的资源
//!
//! 一帧所使用的资源，在这一帧的 fence signal 之前不会被重置或销毁。

pub mod frame_organizer;
pub mod frame_resources;
pub mod thread_resources;
pub mod uniform_layouts;
pub mod uniform_types;
pub mod view_resources;
