//! 随机数流
//!
//! 具体分布由外部模块提供；路由策略只依赖 `RandomStream` 这个能力。

/// 返回 `[0, 1)` 区间内的数
pub trait RandomStream: Send {
    fn next_number(&mut self) -> f64;
}

/// 一个简单、确定性的 64-bit mixing（splitmix64）。
pub(crate) fn mix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// 基于 splitmix64 的确定性随机流
#[derive(Debug, Clone)]
pub struct SplitMixStream {
    state: u64,
}

impl SplitMixStream {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }
}

impl RandomStream for SplitMixStream {
    fn next_number(&mut self) -> f64 {
        self.state = self.state.wrapping_add(0x9E3779B97F4A7C15);
        let bits = mix64(self.state) >> 11;
        bits as f64 / (1u64 << 53) as f64
    }
}
