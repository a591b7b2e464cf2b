pub mod render_view;
pub mod view_camera;
pub mod view_rect;
