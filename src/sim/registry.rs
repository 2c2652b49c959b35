//! 进程注册表
//!
//! 记录每个仿真进程的生命周期状态，并持有 pid -> 进程行为 的映射。

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use super::error::SchedError;
use super::ident::{Ownership, Pid, WorkerId};
use super::process::Process;
use super::time::SimTime;

/// 进程生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// 没有唤醒时间
    Idle,
    /// 已在时间线上
    Scheduled,
    /// 当前正在执行
    Running,
    /// 终态
    Terminated,
}

/// 单个进程的记录
pub struct ProcessRecord {
    pub pid: Pid,
    pub state: ProcessState,
    pub wakeup: Option<SimTime>,
    pub owner: Ownership,
    behavior: Option<Box<dyn Process>>,
}

impl fmt::Debug for ProcessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRecord")
            .field("pid", &self.pid)
            .field("state", &self.state)
            .field("wakeup", &self.wakeup)
            .field("owner", &self.owner)
            .field("behavior", &self.behavior.as_ref().map(|b| b.name().to_string()))
            .finish()
    }
}

/// 进程注册表。终止的进程会被移除，但留下墓碑以便拒绝后续调度。
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    records: HashMap<Pid, ProcessRecord>,
    terminated: HashSet<Pid>,
    running: BTreeSet<Pid>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        pid: Pid,
        owner: Ownership,
        behavior: Box<dyn Process>,
    ) -> Result<(), SchedError> {
        if self.terminated.contains(&pid) {
            return Err(SchedError::Terminated(pid));
        }
        if self.records.contains_key(&pid) {
            return Err(SchedError::DuplicatePid(pid));
        }
        self.records.insert(
            pid,
            ProcessRecord {
                pid,
                state: ProcessState::Idle,
                wakeup: None,
                owner,
                behavior: Some(behavior),
            },
        );
        Ok(())
    }

    fn record_mut(&mut self, pid: Pid) -> Result<&mut ProcessRecord, SchedError> {
        if self.terminated.contains(&pid) {
            return Err(SchedError::Terminated(pid));
        }
        self.records
            .get_mut(&pid)
            .ok_or(SchedError::UnknownProcess(pid))
    }

    pub fn get(&self, pid: Pid) -> Option<&ProcessRecord> {
        self.records.get(&pid)
    }

    pub fn state(&self, pid: Pid) -> Option<ProcessState> {
        if self.terminated.contains(&pid) {
            return Some(ProcessState::Terminated);
        }
        self.records.get(&pid).map(|r| r.state)
    }

    pub fn owner(&self, pid: Pid) -> Option<Ownership> {
        self.records.get(&pid).map(|r| r.owner)
    }

    /// 记录新的唤醒时间。运行中的进程保持 Running，等它让出后再转为 Scheduled。
    pub fn mark_scheduled(&mut self, pid: Pid, at: SimTime) -> Result<(), SchedError> {
        let rec = self.record_mut(pid)?;
        rec.wakeup = Some(at);
        if rec.state == ProcessState::Idle {
            rec.state = ProcessState::Scheduled;
        }
        Ok(())
    }

    pub fn mark_cancelled(&mut self, pid: Pid) -> Result<(), SchedError> {
        let rec = self.record_mut(pid)?;
        rec.wakeup = None;
        if rec.state == ProcessState::Scheduled {
            rec.state = ProcessState::Idle;
        }
        Ok(())
    }

    /// Scheduled -> Running；只有存在挂起的唤醒时间时才允许。
    pub fn resume(&mut self, pid: Pid) -> Result<(), SchedError> {
        let rec = self.record_mut(pid)?;
        if rec.state != ProcessState::Scheduled || rec.wakeup.is_none() {
            return Err(SchedError::NotRunnable {
                pid,
                state: rec.state,
            });
        }
        rec.state = ProcessState::Running;
        rec.wakeup = None;
        self.running.insert(pid);
        Ok(())
    }

    /// 进程让出：Running -> Scheduled/Idle，或者 finished 时直接终止。
    pub fn blocked_or_finished(
        &mut self,
        pid: Pid,
        finished: bool,
    ) -> Result<ProcessState, SchedError> {
        let rec = self.record_mut(pid)?;
        if rec.state != ProcessState::Running {
            return Err(SchedError::NotRunnable {
                pid,
                state: rec.state,
            });
        }
        self.running.remove(&pid);
        if finished {
            self.terminate(pid);
            return Ok(ProcessState::Terminated);
        }
        let rec = self.record_mut(pid)?;
        rec.state = if rec.wakeup.is_some() {
            ProcessState::Scheduled
        } else {
            ProcessState::Idle
        };
        Ok(rec.state)
    }

    /// 把一个运行中的进程抢占回去，返回它应重新挂上时间线的时刻。
    pub fn preempt(&mut self, pid: Pid) -> Option<SimTime> {
        self.running.remove(&pid);
        let rec = self.records.get_mut(&pid)?;
        if rec.state != ProcessState::Running {
            return None;
        }
        match rec.wakeup {
            Some(at) => {
                rec.state = ProcessState::Scheduled;
                Some(at)
            }
            None => {
                rec.state = ProcessState::Idle;
                None
            }
        }
    }

    pub fn running(&self) -> Vec<Pid> {
        self.running.iter().copied().collect()
    }

    pub fn running_except(&self, pid: Pid) -> Vec<Pid> {
        self.running.iter().copied().filter(|p| *p != pid).collect()
    }

    /// 移除记录并留下墓碑。返回被移除记录中的行为（若仍在）。
    pub fn terminate(&mut self, pid: Pid) -> Option<Box<dyn Process>> {
        self.running.remove(&pid);
        let rec = self.records.remove(&pid)?;
        self.terminated.insert(pid);
        rec.behavior
    }

    pub(crate) fn take_behavior(&mut self, pid: Pid) -> Option<Box<dyn Process>> {
        self.records.get_mut(&pid).and_then(|r| r.behavior.take())
    }

    /// 放回行为；若进程已在运行期间被终止，则把行为交还给调用者。
    pub(crate) fn put_behavior(
        &mut self,
        pid: Pid,
        behavior: Box<dyn Process>,
    ) -> Result<(), Box<dyn Process>> {
        match self.records.get_mut(&pid) {
            Some(rec) => {
                rec.behavior = Some(behavior);
                Ok(())
            }
            None => Err(behavior),
        }
    }

    pub fn pids(&self) -> Vec<Pid> {
        let mut pids: Vec<Pid> = self.records.keys().copied().collect();
        pids.sort();
        pids
    }

    pub fn owned_by(&self, worker: WorkerId) -> Vec<Pid> {
        let mut pids: Vec<Pid> = self
            .records
            .values()
            .filter(|r| r.owner == Ownership::Remote(worker))
            .map(|r| r.pid)
            .collect();
        pids.sort();
        pids
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
