//! 时间线
//!
//! 按绝对唤醒时间排列的进程队列。同一时刻的多个进程按插入顺序（FIFO）出队，
//! 从不按 pid 大小打破平局。每个 pid 在时间线上至多出现一次。

use std::collections::{BTreeMap, HashMap, VecDeque};

use super::ident::Pid;
use super::time::SimTime;

/// 时间线：`time -> [pid...]` 的有序桶，外加 `pid -> time` 反向索引。
#[derive(Debug, Default)]
pub struct Timeline {
    buckets: BTreeMap<SimTime, VecDeque<Pid>>,
    index: HashMap<Pid, SimTime>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// 把 `pid` 排在 `at`；若已在时间线上，先移除旧条目。
    pub fn schedule_at(&mut self, pid: Pid, at: SimTime) {
        self.cancel(pid);
        self.buckets.entry(at).or_default().push_back(pid);
        self.index.insert(pid, at);
    }

    /// 移除 `pid` 的条目，返回它原来的唤醒时间。
    pub fn cancel(&mut self, pid: Pid) -> Option<SimTime> {
        let at = self.index.remove(&pid)?;
        if let Some(bucket) = self.buckets.get_mut(&at) {
            if let Some(pos) = bucket.iter().position(|p| *p == pid) {
                bucket.remove(pos);
            }
            // 空桶立即剪掉，保证 first 查询总是有效
            if bucket.is_empty() {
                self.buckets.remove(&at);
            }
        }
        Some(at)
    }

    /// 弹出最早时刻桶中的第一个进程。
    pub fn remove_first(&mut self) -> Option<(SimTime, Pid)> {
        let mut entry = self.buckets.first_entry()?;
        let at = *entry.key();
        let pid = entry.get_mut().pop_front()?;
        if entry.get().is_empty() {
            entry.remove();
        }
        self.index.remove(&pid);
        Some((at, pid))
    }

    pub fn peek_first(&self) -> Option<(SimTime, Pid)> {
        self.buckets
            .first_key_value()
            .and_then(|(at, bucket)| bucket.front().map(|pid| (*at, *pid)))
    }

    pub fn scheduled_at(&self, pid: Pid) -> Option<SimTime> {
        self.index.get(&pid).copied()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.index.clear();
    }
}
