//! 标识符类型
//!
//! 定义网络实体与链路的唯一标识符。单播节点 id 与组播组 id 位于互不相交的区间：
//! `[0, MULTICAST_BASE)` 为单播，`[MULTICAST_BASE, u32::MAX]` 为组播。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

/// 组播 id 区间起点
pub const MULTICAST_BASE: u32 = 0x8000_0000;

/// 网络标识符（节点或组播组）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetId(pub u32);

impl NetId {
    /// 第 `index` 个组播组 id
    pub fn group(index: u32) -> NetId {
        NetId(MULTICAST_BASE.saturating_add(index))
    }

    pub fn is_multicast(self) -> bool {
        self.0 >= MULTICAST_BASE
    }
}

impl fmt::Display for NetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_multicast() {
            write!(f, "g{}", self.0 - MULTICAST_BASE)
        } else {
            write!(f, "n{}", self.0)
        }
    }
}

impl FromStr for NetId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u32>().map(NetId)
    }
}

/// 链路标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub usize);

/// 网络 id 分配器：节点 id 与组 id 各自单调递增。
#[derive(Debug)]
pub struct NetIdAllocator {
    next_node: AtomicU32,
    next_group: AtomicU32,
}

impl Default for NetIdAllocator {
    fn default() -> Self {
        Self {
            next_node: AtomicU32::new(1),
            next_group: AtomicU32::new(0),
        }
    }
}

impl NetIdAllocator {
    pub fn node(&self) -> NetId {
        NetId(self.next_node.fetch_add(1, Ordering::SeqCst))
    }

    pub fn group(&self) -> NetId {
        NetId::group(self.next_group.fetch_add(1, Ordering::SeqCst))
    }
}
