use std::{ops::ShlAssign, sync::Arc};

use crate::resources::render_objects::{GraphicsPipelineResources, MeshResources};

/// 一批被渲染操作引用的资源
///
/// 资源在这里只是被持有，真正的释放发生在最后一个 `Arc` 被 drop 时。
/// 从某一帧收集到的 collection，必须在那一帧的 fence signal 之后才能 drop。
#[derive(Default)]
pub struct ResourcesCollection {
    pipelines: Vec<Arc<GraphicsPipelineResources>>,
    meshes: Vec<Arc<MeshResources>>,
}

// new & init
impl ResourcesCollection {
    #[inline]
    pub fn with_capacity(n: usize) -> Self {
        Self {
            pipelines: Vec::with_capacity(n),
            meshes: Vec::with_capacity(n),
        }
    }
}

// getters
impl ResourcesCollection {
    #[inline]
    pub fn len(&self) -> usize {
        self.pipelines.len() + self.meshes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty() && self.meshes.is_empty()
    }

    #[inline]
    pub fn pipelines(&self) -> &[Arc<GraphicsPipelineResources>] {
        &self.pipelines
    }

    #[inline]
    pub fn meshes(&self) -> &[Arc<MeshResources>] {
        &self.meshes
    }

    /// 每一种资源都可以在不重新分配的情况下放入的数量
    #[inline]
    pub fn capacity(&self) -> usize {
        self.pipelines.capacity().min(self.meshes.capacity())
    }
}

// tools
impl ResourcesCollection {
    /// 保证每一种资源都至少可以放入 `n` 个
    pub fn reserve(&mut self, n: usize) {
        self.pipelines.reserve(n.saturating_sub(self.pipelines.len()));
        self.meshes.reserve(n.saturating_sub(self.meshes.len()));
    }

    #[inline]
    pub fn push_pipeline(&mut self, pipeline: Arc<GraphicsPipelineResources>) {
        self.pipelines.push(pipeline);
    }

    #[inline]
    pub fn push_mesh(&mut self, mesh: Arc<MeshResources>) {
        self.meshes.push(mesh);
    }

    #[inline]
    pub fn clear(&mut self) {
        self.pipelines.clear();
        self.meshes.clear();
    }
}

/// `previous <<= &mut current`：把 current 中的资源全部移动到 previous，current 变为空
impl ShlAssign<&mut ResourcesCollection> for ResourcesCollection {
    fn shl_assign(&mut self, other: &mut ResourcesCollection) {
        self.pipelines.append(&mut other.pipelines);
        self.meshes.append(&mut other.meshes);
    }
}
