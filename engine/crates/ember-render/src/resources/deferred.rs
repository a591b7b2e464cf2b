use crate::{render_key::RenderKey, resources::resources_collection::ResourcesCollection};

/// 延迟销毁队列
///
/// 每一批资源都记录了最后一次使用它们的渲染操作，只有在这个操作完成之后才会被释放
#[derive(Default)]
pub struct DeferredDestructionQueue {
    /// (最后一次使用的 key, 资源)
    pending: Vec<(RenderKey, ResourcesCollection)>,
}

impl DeferredDestructionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 空的 collection 不会入队
    pub fn enqueue(&mut self, key: RenderKey, collection: ResourcesCollection) {
        if collection.is_empty() {
            return;
        }
        self.pending.push((key, collection));
    }

    /// 释放所有 key 不晚于 `completed` 的资源，返回释放的批数
    pub fn release_completed(&mut self, completed: RenderKey) -> usize {
        let _span = tracy_client::span!("DeferredDestructionQueue::release_completed");

        let before = self.pending.len();
        self.pending.retain(|(key, _)| *key > completed);
        before - self.pending.len()
    }

    /// 释放所有资源，只能在设备空闲之后调用
    pub fn flush_all(&mut self) {
        self.pending.clear();
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
