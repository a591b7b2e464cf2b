use std::{ptr::NonNull, sync::Arc};

use ash::vk;

use crate::{
    foundation::backend::GfxBackend,
    gfx_error::{GfxError, GfxResult},
};

/// backend 创建 buffer 的结果
///
/// `mapped_ptr` 在 buffer 销毁之前一直有效
pub struct GfxBufferAllocation {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
    pub mapped_ptr: Option<NonNull<u8>>,
}

pub struct GfxBuffer {
    handle: vk::Buffer,
    size: vk::DeviceSize,

    /// 在初始化阶段写死
    map_ptr: Option<NonNull<u8>>,

    backend: Arc<dyn GfxBackend>,
    debug_name: String,
}

// SAFETY: map_ptr 指向的内存由 buffer 独占，CPU 访问只能通过 `&self` / `&mut self` 的 slice 进行
unsafe impl Send for GfxBuffer {}
unsafe impl Sync for GfxBuffer {}

// init & destroy
impl GfxBuffer {
    /// - mem_map: 是否持久映射到 CPU
    pub fn new(
        backend: Arc<dyn GfxBackend>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        mem_map: bool,
        name: &str,
    ) -> GfxResult<Self> {
        let allocation = backend.create_buffer(size, usage, mem_map, name)?;
        if mem_map && allocation.mapped_ptr.is_none() {
            backend.destroy_buffer(allocation.buffer);
            return Err(GfxError::NotMapped(name.to_string()));
        }

        Ok(Self {
            handle: allocation.buffer,
            size: allocation.size,
            map_ptr: allocation.mapped_ptr,
            backend,
            debug_name: name.to_string(),
        })
    }

    #[inline]
    pub fn new_uniform_buffer(backend: Arc<dyn GfxBackend>, size: vk::DeviceSize, name: &str) -> GfxResult<Self> {
        Self::new(backend, size, vk::BufferUsageFlags::UNIFORM_BUFFER, true, name)
    }
}

impl Drop for GfxBuffer {
    fn drop(&mut self) {
        self.backend.destroy_buffer(self.handle);
    }
}

// getter
impl GfxBuffer {
    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.map_ptr.is_some()
    }
}

// tools
impl GfxBuffer {
    pub fn mapped_bytes(&self) -> GfxResult<&[u8]> {
        let ptr = self.map_ptr.ok_or_else(|| GfxError::NotMapped(self.debug_name.clone()))?;
        // SAFETY: 映射区域覆盖整个 buffer，且生命周期和 self 绑定
        Ok(unsafe { std::slice::from_raw_parts(ptr.as_ptr(), self.size as usize) })
    }

    pub fn mapped_bytes_mut(&mut self) -> GfxResult<&mut [u8]> {
        let ptr = self.map_ptr.ok_or_else(|| GfxError::NotMapped(self.debug_name.clone()))?;
        // SAFETY: 同上，`&mut self` 保证独占
        Ok(unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), self.size as usize) })
    }

    #[inline]
    pub fn flush(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> GfxResult<()> {
        self.backend.flush_buffer(self.handle, offset, size)
    }

    /// 通过 mem map 的方式将 data 传入到 buffer 中
    pub fn transfer_data_by_mmap<T: bytemuck::Pod>(&mut self, data: &[T]) -> GfxResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let dst = self.mapped_bytes_mut()?;
        if bytes.len() > dst.len() {
            return Err(GfxError::OutOfRange {
                what: "buffer byte",
                index: bytes.len(),
                len: dst.len(),
            });
        }
        dst[..bytes.len()].copy_from_slice(bytes);
        self.flush(0, bytes.len() as vk::DeviceSize)
    }
}
