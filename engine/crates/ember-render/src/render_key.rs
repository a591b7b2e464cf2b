/// 每次提交的渲染操作都有一个单调递增的 key
///
/// 可以用 key 的大小判断 "某个操作之前的所有操作是否已经完成"
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RenderKey(u64);

impl RenderKey {
    /// 不对应任何渲染操作
    pub const INVALID: Self = Self(0);
    /// 第一个有效的 key
    pub const INITIAL: Self = Self(1);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1).max(Self::INITIAL.0);
    }

    #[inline]
    pub fn next(self) -> Self {
        let mut next = self;
        next.increment();
        next
    }

    #[inline]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RenderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
