//! 统计信息
//!
//! 定义网络仿真统计数据结构。

use serde::Serialize;

/// 网络统计信息
#[derive(Debug, Default, Clone, Serialize)]
pub struct Stats {
    pub delivered_pkts: u64,
    pub delivered_bytes: u64,
    pub forwarded_pkts: u64,
    /// 组播复制出的副本数
    pub replicated_pkts: u64,
    pub ttl_drops: u64,
    pub no_route_drops: u64,
    pub control_pkts: u64,
    /// 交给其它分区的数据包
    pub remote_out: u64,
    pub remote_in: u64,
}

impl Stats {
    pub fn dropped_pkts(&self) -> u64 {
        self.ttl_drops + self.no_route_drops
    }
}
