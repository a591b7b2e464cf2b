use std::{marker::PhantomData, ops::Range, sync::Arc};

use ash::vk;

use crate::{
    foundation::backend::GfxBackend,
    gfx_error::{GfxError, GfxResult},
    resources::buffer::GfxBuffer,
};

/// 可以放入 uniform buffer 的数据块
///
/// 对于 `UNIFORM_BUFFER_DYNAMIC`，`size_of::<Self>()` 需要是 `minUniformBufferOffsetAlignment` 的整数倍
pub trait GfxUniformBlock: bytemuck::Pod + Send + Sync {
    const BINDING: u32;
    const DESCRIPTOR_TYPE: vk::DescriptorType;

    fn layout_binding(stages: vk::ShaderStageFlags) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(Self::BINDING)
            .descriptor_type(Self::DESCRIPTOR_TYPE)
            .descriptor_count(1)
            .stage_flags(stages)
    }
}

/// 一个持久映射的 uniform buffer，以及描述它的描述符集
///
/// 元素 `i` 位于 `i * size_of::<T>()`。所有写入都需要可变借用，并且会检查是否超出了已经预留的容量：
/// 先 [`GfxUniforms::reserve`]，再 [`GfxUniforms::write`] 或 [`GfxUniforms::partition`]。
pub struct GfxUniforms<T: GfxUniformBlock> {
    buffer: GfxBuffer,
    num_elements: usize,
    descriptor_set: vk::DescriptorSet,

    backend: Arc<dyn GfxBackend>,
    name: String,
    _phantom: PhantomData<T>,
}

// new & init
impl<T: GfxUniformBlock> GfxUniforms<T> {
    pub fn new(
        backend: Arc<dyn GfxBackend>,
        descriptor_set: vk::DescriptorSet,
        initial_num_elements: usize,
        name: &str,
    ) -> GfxResult<Self> {
        if initial_num_elements == 0 {
            return Err(GfxError::InvalidArgument(format!("uniforms {} need at least one element", name)));
        }
        let buffer = Self::create_buffer(&backend, initial_num_elements, name)?;
        let uniforms = Self {
            buffer,
            num_elements: initial_num_elements,
            descriptor_set,
            backend,
            name: name.to_string(),
            _phantom: PhantomData,
        };
        uniforms.update_descriptor_set();
        Ok(uniforms)
    }

    fn create_buffer(backend: &Arc<dyn GfxBackend>, num_elements: usize, name: &str) -> GfxResult<GfxBuffer> {
        GfxBuffer::new_uniform_buffer(backend.clone(), (num_elements * size_of::<T>()) as vk::DeviceSize, name)
    }

    fn update_descriptor_set(&self) {
        let range = if T::DESCRIPTOR_TYPE == vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC {
            size_of::<T>() as vk::DeviceSize
        } else {
            vk::WHOLE_SIZE
        };
        self.backend.update_buffer_descriptor(
            self.descriptor_set,
            T::BINDING,
            T::DESCRIPTOR_TYPE,
            self.buffer.vk_buffer(),
            range,
        );
    }
}

// getters
impl<T: GfxUniformBlock> GfxUniforms<T> {
    #[inline]
    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    #[inline]
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }

    #[inline]
    pub fn buffer(&self) -> &GfxBuffer {
        &self.buffer
    }

    /// 元素的字节偏移，也就是绑定 dynamic uniform 时使用的 offset
    #[inline]
    pub fn offset_of(index: usize) -> u32 {
        (index * size_of::<T>()) as u32
    }
}

// tools
impl<T: GfxUniformBlock> GfxUniforms<T> {
    /// 容量不足时重新分配 buffer（旧数据不保留），并重新写入描述符集
    ///
    /// 返回是否发生了重新分配。`n <= num_elements()` 时没有任何效果
    ///
    /// # 前置条件
    /// GPU 不能还在使用旧的 buffer
    pub fn reserve(&mut self, n: usize) -> GfxResult<bool> {
        if n <= self.num_elements {
            return Ok(false);
        }
        log::info!("Growing uniforms {}: {} -> {}", self.name, self.num_elements, n);
        self.buffer = Self::create_buffer(&self.backend, n, &self.name)?;
        self.num_elements = n;
        self.update_descriptor_set();
        Ok(true)
    }

    /// 将 value 写入第 index 个元素，返回它的字节偏移
    pub fn write(&mut self, value: &T, index: usize) -> GfxResult<u32> {
        if index >= self.num_elements {
            return Err(GfxError::OutOfRange {
                what: "uniform",
                index,
                len: self.num_elements,
            });
        }
        let stride = size_of::<T>();
        let bytes = self.buffer.mapped_bytes_mut()?;
        bytes[index * stride..(index + 1) * stride].copy_from_slice(bytemuck::bytes_of(value));
        Ok(Self::offset_of(index))
    }

    /// 把 buffer 切分为互不重叠的区间，每个区间可以交给一个线程独立写入
    ///
    /// # 参数
    /// - ranges: 元素下标区间，必须按升序排列且互不重叠，并且都在已经预留的容量之内
    pub fn partition(&mut self, ranges: &[Range<usize>]) -> GfxResult<Vec<GfxUniformWriter<'_, T>>> {
        let num_elements = self.num_elements;
        let stride = size_of::<T>();

        let mut cursor = 0;
        for range in ranges {
            if range.start < cursor || range.end < range.start {
                return Err(GfxError::InvalidArgument(format!(
                    "uniform partition {:?} overlaps or is out of order (cursor: {})",
                    range, cursor
                )));
            }
            if range.end > num_elements {
                return Err(GfxError::OutOfRange {
                    what: "uniform partition",
                    index: range.end,
                    len: num_elements,
                });
            }
            cursor = range.end;
        }

        let bytes = self.buffer.mapped_bytes_mut()?;
        let mut rest = &mut bytes[..num_elements * stride];
        let mut cursor = 0;
        let mut writers = Vec::with_capacity(ranges.len());
        for range in ranges {
            let (_, tail) = std::mem::take(&mut rest).split_at_mut((range.start - cursor) * stride);
            let (bytes, tail) = tail.split_at_mut(range.len() * stride);
            rest = tail;
            cursor = range.end;
            writers.push(GfxUniformWriter {
                bytes,
                range: range.clone(),
                _phantom: PhantomData,
            });
        }
        Ok(writers)
    }

    /// 写入之后、提交之前必须调用，保证写入对 GPU 可见
    #[inline]
    pub fn flush(&self) -> GfxResult<()> {
        self.buffer.flush(0, vk::WHOLE_SIZE)
    }
}

/// uniform buffer 中一段连续元素的独占写入权
pub struct GfxUniformWriter<'a, T: GfxUniformBlock> {
    bytes: &'a mut [u8],
    range: Range<usize>,
    _phantom: PhantomData<T>,
}

impl<T: GfxUniformBlock> GfxUniformWriter<'_, T> {
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// `index` 是整个 buffer 中的下标，返回值和 [`GfxUniforms::write`] 相同
    pub fn write(&mut self, value: &T, index: usize) -> GfxResult<u32> {
        if !self.range.contains(&index) {
            return Err(GfxError::OutOfRange {
                what: "uniform partition",
                index,
                len: self.range.end,
            });
        }
        let stride = size_of::<T>();
        let local = index - self.range.start;
        self.bytes[local * stride..(local + 1) * stride].copy_from_slice(bytemuck::bytes_of(value));
        Ok(GfxUniforms::<T>::offset_of(index))
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;
    use bytemuck::{Pod, Zeroable};

    use super::*;
    use crate::foundation::mock_backend::{GfxMockBackend, GfxMockEvent, GfxObjectKind};

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    struct TestBlock {
        value: [u32; 4],
    }

    impl GfxUniformBlock for TestBlock {
        const BINDING: u32 = 0;
        const DESCRIPTOR_TYPE: vk::DescriptorType = vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC;
    }

    fn block(v: u32) -> TestBlock {
        TestBlock { value: [v; 4] }
    }

    fn read(uniforms: &GfxUniforms<TestBlock>, index: usize) -> TestBlock {
        let stride = size_of::<TestBlock>();
        let bytes = uniforms.buffer().mapped_bytes().unwrap();
        bytemuck::pod_read_unaligned(&bytes[index * stride..(index + 1) * stride])
    }

    fn descriptor_updates(mock: &GfxMockBackend) -> usize {
        mock.events().iter().filter(|e| matches!(e, GfxMockEvent::UpdateDescriptor { .. })).count()
    }

    #[test]
    fn test_write_offsets() {
        let mock = Arc::new(GfxMockBackend::new(2));
        let mut uniforms = GfxUniforms::<TestBlock>::new(mock.clone(), vk::DescriptorSet::from_raw(9), 4, "u").unwrap();

        assert_eq!(uniforms.write(&block(7), 0).unwrap(), 0);
        assert_eq!(uniforms.write(&block(8), 3).unwrap(), 48);
        assert_eq!(read(&uniforms, 0), block(7));
        assert_eq!(read(&uniforms, 3), block(8));

        let err = uniforms.write(&block(9), 4).unwrap_err();
        assert_eq!(
            err,
            GfxError::OutOfRange {
                what: "uniform",
                index: 4,
                len: 4
            }
        );
    }

    #[test]
    fn test_reserve_only_grows() {
        let mock = Arc::new(GfxMockBackend::new(2));
        let mut uniforms = GfxUniforms::<TestBlock>::new(mock.clone(), vk::DescriptorSet::from_raw(9), 4, "u").unwrap();
        assert_eq!(descriptor_updates(&mock), 1);

        assert!(!uniforms.reserve(2).unwrap());
        assert!(!uniforms.reserve(4).unwrap());
        assert_eq!(uniforms.num_elements(), 4);
        assert_eq!(descriptor_updates(&mock), 1);

        assert!(uniforms.reserve(10).unwrap());
        assert_eq!(uniforms.num_elements(), 10);
        assert_eq!(uniforms.buffer().size(), 10 * size_of::<TestBlock>() as u64);
        assert_eq!(descriptor_updates(&mock), 2);
        assert_eq!(mock.live_count(GfxObjectKind::Buffer), 1);

        assert_eq!(uniforms.write(&block(1), 9).unwrap(), 144);
    }

    #[test]
    fn test_partition_writers_are_disjoint() {
        let mock = Arc::new(GfxMockBackend::new(2));
        let mut uniforms = GfxUniforms::<TestBlock>::new(mock.clone(), vk::DescriptorSet::from_raw(9), 8, "u").unwrap();

        {
            let mut writers = uniforms.partition(&[0..3, 3..5, 5..8]).unwrap();
            assert_eq!(writers.len(), 3);
            assert_eq!(writers[1].write(&block(4), 4).unwrap(), 64);
            assert!(matches!(writers[1].write(&block(5), 5), Err(GfxError::OutOfRange { .. })));

            std::thread::scope(|s| {
                for writer in writers.iter_mut() {
                    s.spawn(move || {
                        for index in writer.range() {
                            writer.write(&block(index as u32 * 10), index).unwrap();
                        }
                    });
                }
            });
        }

        for index in 0..8 {
            assert_eq!(read(&uniforms, index), block(index as u32 * 10));
        }
    }

    #[test]
    fn test_partition_rejects_bad_ranges() {
        let mock = Arc::new(GfxMockBackend::new(2));
        let mut uniforms = GfxUniforms::<TestBlock>::new(mock.clone(), vk::DescriptorSet::from_raw(9), 4, "u").unwrap();

        assert!(matches!(uniforms.partition(&[0..2, 1..3]), Err(GfxError::InvalidArgument(_))));
        assert!(matches!(uniforms.partition(&[0..5]), Err(GfxError::OutOfRange { .. })));
        assert_eq!(uniforms.partition(&[0..0, 1..2]).unwrap().len(), 2);
    }
}
