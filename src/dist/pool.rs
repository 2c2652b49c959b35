//! worker 池
//!
//! manager 为每个接受的连接分配 worker id；worker 发来 `addToPool`
//! 描述自己之后才算加入完成。

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::error::DistError;
use crate::link::WorkerLink;
use crate::sim::{WorkerId, lock};

#[derive(Debug, Clone)]
pub struct WorkerEntry {
    pub id: WorkerId,
    pub desc: Option<String>,
    /// 分发线程可能在链路登记之前就收到 addToPool，所以先占位
    pub link: Option<WorkerLink>,
}

#[derive(Debug)]
pub struct WorkerPool {
    next_id: AtomicI32,
    workers: Mutex<BTreeMap<WorkerId, WorkerEntry>>,
    changed: Condvar,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self {
            next_id: AtomicI32::new(1),
            workers: Mutex::new(BTreeMap::new()),
            changed: Condvar::new(),
        }
    }
}

impl WorkerPool {
    /// worker id 从 1 开始，0 留给 manager
    pub fn allocate_id(&self) -> WorkerId {
        WorkerId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// 为即将建立的链路占位
    pub fn reserve(&self, id: WorkerId) {
        lock(&self.workers).insert(
            id,
            WorkerEntry {
                id,
                desc: None,
                link: None,
            },
        );
    }

    pub fn attach(&self, id: WorkerId, link: WorkerLink) -> Result<(), DistError> {
        let mut workers = lock(&self.workers);
        let entry = workers.get_mut(&id).ok_or(DistError::UnknownWorker(id))?;
        entry.link = Some(link);
        drop(workers);
        self.changed.notify_all();
        Ok(())
    }

    /// addToPool：记录 worker 的描述
    pub fn describe(&self, id: WorkerId, desc: String) -> Result<(), DistError> {
        let mut workers = lock(&self.workers);
        let entry = workers.get_mut(&id).ok_or(DistError::UnknownWorker(id))?;
        info!(worker = %id, desc = %desc, "👷 worker 加入");
        entry.desc = Some(desc);
        drop(workers);
        self.changed.notify_all();
        Ok(())
    }

    pub fn remove(&self, id: WorkerId) -> Option<WorkerEntry> {
        let entry = lock(&self.workers).remove(&id);
        if entry.is_some() {
            debug!(worker = %id, "worker 移出池");
            self.changed.notify_all();
        }
        entry
    }

    pub fn link(&self, id: WorkerId) -> Result<WorkerLink, DistError> {
        lock(&self.workers)
            .get(&id)
            .and_then(|e| e.link.clone())
            .ok_or(DistError::UnknownWorker(id))
    }

    pub fn desc(&self, id: WorkerId) -> Option<String> {
        lock(&self.workers).get(&id).and_then(|e| e.desc.clone())
    }

    pub fn ids(&self) -> Vec<WorkerId> {
        lock(&self.workers).keys().copied().collect()
    }

    pub fn links(&self) -> Vec<(WorkerId, WorkerLink)> {
        lock(&self.workers)
            .values()
            .filter_map(|e| e.link.clone().map(|l| (e.id, l)))
            .collect()
    }

    /// 第 `index` 个 worker（按 id 排序），场景文件用下标指定 worker
    pub fn by_index(&self, index: usize) -> Option<WorkerId> {
        lock(&self.workers).keys().nth(index).copied()
    }

    pub fn len(&self) -> usize {
        lock(&self.workers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ready_count(workers: &BTreeMap<WorkerId, WorkerEntry>) -> usize {
        workers.values().filter(|e| e.desc.is_some()).count()
    }

    /// 等待 `expected` 个 worker 完成握手
    pub fn wait_ready(&self, expected: usize, timeout: Duration) -> Result<(), DistError> {
        let deadline = Instant::now() + timeout;
        let mut workers = lock(&self.workers);
        loop {
            let ready = Self::ready_count(&workers);
            if ready >= expected {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(DistError::NotReady { ready, expected });
            }
            workers = self
                .changed
                .wait_timeout(workers, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }
}
