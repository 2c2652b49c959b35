//! 单向链路：串行发送，先到先发，加上固定传播时延。

use super::id::NetId;
use crate::sim::SimTime;

/// 单向网络链路
#[derive(Debug, Clone)]
pub struct Link {
    pub from: NetId,
    pub to: NetId,
    pub latency: SimTime,
    pub bandwidth_bps: u64,
    pub busy_until: SimTime,
}

impl Link {
    /// 创建新链路
    pub fn new(from: NetId, to: NetId, latency: SimTime, bandwidth_bps: u64) -> Self {
        Self {
            from,
            to,
            latency,
            bandwidth_bps,
            busy_until: SimTime::ZERO,
        }
    }

    /// 串行化时间，向上取整到纳秒；带宽为 0 视为链路不可用
    pub(crate) fn tx_time(&self, bytes: u32) -> SimTime {
        let bps = self.bandwidth_bps as u128;
        if bps == 0 {
            return SimTime(u64::MAX / 4);
        }
        let bit_ns = bytes as u128 * 8 * 1_000_000_000;
        SimTime(u64::try_from(bit_ns.div_ceil(bps)).unwrap_or(u64::MAX))
    }

    /// 占用链路发送一个包，返回到达对端的时刻。
    pub(crate) fn transmit(&mut self, now: SimTime, bytes: u32) -> SimTime {
        let start = now.max(self.busy_until);
        let depart = start.after(self.tx_time(bytes));
        self.busy_until = depart;
        depart.after(self.latency)
    }
}
