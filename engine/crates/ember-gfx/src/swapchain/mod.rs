pub mod gfx_swapchain;
