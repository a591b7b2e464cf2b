pub mod buffer;
pub mod uniforms;
