pub mod backend;
#[cfg(any(test, feature = "mock"))]
pub mod mock_backend;
pub mod vulkan_backend;
