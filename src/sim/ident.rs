//! 进程与 worker 标识符
//!
//! pid 由发起方分配：高 32 位是发起方的 worker id（manager 为 0），
//! 低 32 位是发起方本地单调递增的计数器，因此全局唯一。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// 仿真进程标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(pub u64);

impl Pid {
    pub fn new(issuer: u32, local: u32) -> Pid {
        Pid(((issuer as u64) << 32) | local as u64)
    }

    /// 分配该 pid 的一方
    pub fn issuer(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn local(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.issuer(), self.local())
    }
}

/// worker 标识符；`WorkerId::MANAGER` 表示 manager 自身。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub i32);

impl WorkerId {
    pub const MANAGER: WorkerId = WorkerId(0);
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// 实体归属：本地实体或由某个 worker 持有的远程实体。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    Local,
    Remote(WorkerId),
}

/// pid 分配器（由所属进程的调度器持有，而不是全局计数器）。
#[derive(Debug)]
pub struct PidAllocator {
    issuer: AtomicU32,
    next: AtomicU32,
}

impl PidAllocator {
    pub fn new(issuer: u32) -> Self {
        Self {
            issuer: AtomicU32::new(issuer),
            next: AtomicU32::new(1),
        }
    }

    /// worker 在握手完成后才知道自己的 id。
    pub fn set_issuer(&self, issuer: u32) {
        self.issuer.store(issuer, Ordering::SeqCst);
    }

    pub fn issuer(&self) -> u32 {
        self.issuer.load(Ordering::SeqCst)
    }

    pub fn next(&self) -> Pid {
        let local = self.next.fetch_add(1, Ordering::SeqCst);
        Pid::new(self.issuer(), local)
    }
}

impl Default for PidAllocator {
    fn default() -> Self {
        Self::new(0)
    }
}
