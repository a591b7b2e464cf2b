use std::ops::Range;

/// 将 `n` 个对象按线程切分，返回第 `thread_index` 个线程负责的区间
///
/// 前 `n % num_threads` 个线程各多分到一个对象。`num_threads` 为 0 时按 1 处理
#[inline]
pub fn thread_slice(n: usize, num_threads: usize, thread_index: usize) -> Range<usize> {
    let num_threads = num_threads.max(1);
    let per_thread = n / num_threads;
    let extra = n % num_threads;

    let start = thread_index * per_thread + thread_index.min(extra);
    let len = per_thread + usize::from(thread_index < extra);
    start.min(n)..(start + len).min(n)
}

/// 所有线程的区间，依次首尾相接地覆盖 `0..n`
pub fn thread_slices(n: usize, num_threads: usize) -> impl Iterator<Item = Range<usize>> {
    (0..num_threads.max(1)).map(move |thread_index| thread_slice(n, num_threads, thread_index))
}
