use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// 同时在 GPU 上飞行的帧数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Buffering {
    None,
    #[default]
    Double,
    Triple,
}

impl Buffering {
    #[inline]
    pub const fn num_frames(self) -> usize {
        match self {
            Self::None => 1,
            Self::Double => 2,
            Self::Triple => 3,
        }
    }
}

/// 渲染器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    pub buffering: Buffering,
    /// 等待 fence 以及 acquire swapchain image 的超时时间
    pub fence_timeout_ms: u64,
    /// 连续多少帧无法渲染之后，认为 surface 已经失效
    pub max_retry_count: u32,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            buffering: Buffering::Double,
            fence_timeout_ms: 5000,
            max_retry_count: 5,
        }
    }
}

impl RendererSettings {
    pub fn from_json_str(content: &str) -> anyhow::Result<Self> {
        serde_json::from_str(content).context("解析渲染器配置失败")
    }

    /// 从 JSON 文件加载配置，缺失的字段使用默认值
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).with_context(|| format!("读取配置文件失败: {:?}", path.as_ref()))?;
        Self::from_json_str(&content).with_context(|| format!("解析配置文件失败: {:?}", path.as_ref()))
    }

    #[inline]
    pub fn fence_timeout(&self) -> Duration {
        Duration::from_millis(self.fence_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = RendererSettings::default();
        assert_eq!(settings.buffering.num_frames(), 2);
        assert_eq!(settings.fence_timeout(), Duration::from_secs(5));
        assert_eq!(settings.max_retry_count, 5);
    }

    #[test]
    fn test_partial_json() {
        let settings = RendererSettings::from_json_str(r#"{ "buffering": "triple" }"#).unwrap();
        assert_eq!(settings.buffering, Buffering::Triple);
        assert_eq!(settings.buffering.num_frames(), 3);
        assert_eq!(settings.fence_timeout_ms, 5000);

        assert!(RendererSettings::from_json_str(r#"{ "buffering": "quad" }"#).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = RendererSettings::load("does/not/exist.json").unwrap_err();
        assert!(err.to_string().contains("读取配置文件失败"));
    }
}
