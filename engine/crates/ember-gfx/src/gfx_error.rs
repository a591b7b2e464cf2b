use std::fmt::{Display, Formatter};

use ash::vk;

/// GFX 层的错误类型
///
/// 超时并不属于错误：fence / acquire 超时通过返回值表达，由上层决定跳过这一帧。
/// 这里的错误要么是设备层面的失败，要么是调用方违反了前置条件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GfxError {
    /// Vulkan 调用返回了失败
    Vk { call: &'static str, result: vk::Result },
    /// 参数不满足前置条件，在调用 GPU 之前就被拒绝
    InvalidArgument(String),
    /// 访问超出了已经预留的容量
    OutOfRange { what: &'static str, index: usize, len: usize },
    /// 对没有映射的 buffer 进行 CPU 访问
    NotMapped(String),
    /// acquire 得到的 image index 超出了 swapchain image 的数量
    AcquireIndexOutOfRange { index: u32, len: usize },
}

pub type GfxResult<T> = Result<T, GfxError>;

impl GfxError {
    #[inline]
    pub fn vk(call: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::Vk { call, result }
    }
}

impl Display for GfxError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vk { call, result } => write!(f, "{call} failed: {result:?}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::OutOfRange { what, index, len } => {
                write!(f, "{what} index {index} is out of range (len: {len})")
            }
            Self::NotMapped(name) => write!(f, "buffer {name} is not host mapped"),
            Self::AcquireIndexOutOfRange { index, len } => {
                write!(f, "acquired image index is out of range: {index} >= {len}")
            }
        }
    }
}

impl std::error::Error for GfxError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vk_error_message() {
        let err = GfxError::vk("vkCreateFence")(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        assert_eq!(err.to_string(), "vkCreateFence failed: ERROR_OUT_OF_DEVICE_MEMORY");
    }

    #[test]
    fn test_out_of_range_message() {
        let err = GfxError::OutOfRange {
            what: "uniform",
            index: 4,
            len: 2,
        };
        assert_eq!(err.to_string(), "uniform index 4 is out of range (len: 2)");
    }
}
