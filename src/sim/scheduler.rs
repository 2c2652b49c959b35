//! 调度器
//!
//! 维护当前仿真时间、时间线与进程注册表，按绝对时间依次恢复进程。
//! 所有方法都只需要 `&self`：时间线和注册表各自由一把互斥锁保护，
//! 加锁顺序固定为 registry -> timeline。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, trace, warn};

use super::error::SchedError;
use super::ident::{Ownership, Pid, PidAllocator, WorkerId};
use super::process::{Process, ProcessCtx, Suspend};
use super::registry::{ProcessRegistry, ProcessState};
use super::time::SimTime;
use super::timeline::Timeline;
use super::world::World;

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 把本地进程的调度变化镜像到别处（worker 用它通知 manager）。
pub trait ActivationMirror: Send + Sync {
    fn activate_at(&self, pid: Pid, at: SimTime);
    fn blocked_or_finished(&self, pid: Pid, finished: bool);
}

/// 一次运行的汇总
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub resumed: u64,
    pub final_time: SimTime,
}

/// 协作式调度器：同一时刻只有一个进程是“当前”进程。
pub struct Scheduler {
    now: AtomicU64,
    started: AtomicBool,
    resumed: AtomicU64,
    pids: PidAllocator,
    timeline: Mutex<Timeline>,
    registry: Mutex<ProcessRegistry>,
    mirror: Option<Arc<dyn ActivationMirror>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Scheduler {
    pub fn new(issuer: u32) -> Self {
        Self {
            now: AtomicU64::new(0),
            started: AtomicBool::new(false),
            resumed: AtomicU64::new(0),
            pids: PidAllocator::new(issuer),
            timeline: Mutex::new(Timeline::new()),
            registry: Mutex::new(ProcessRegistry::new()),
            mirror: None,
        }
    }

    pub fn with_mirror(mut self, mirror: Arc<dyn ActivationMirror>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// 获取当前仿真时间
    pub fn now(&self) -> SimTime {
        SimTime(self.now.load(Ordering::SeqCst))
    }

    pub fn set_issuer(&self, issuer: u32) {
        self.pids.set_issuer(issuer);
    }

    pub fn issuer(&self) -> u32 {
        self.pids.issuer()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
    }

    pub fn resumed_count(&self) -> u64 {
        self.resumed.load(Ordering::SeqCst)
    }

    pub fn state(&self, pid: Pid) -> Option<ProcessState> {
        lock(&self.registry).state(pid)
    }

    pub fn owner(&self, pid: Pid) -> Option<Ownership> {
        lock(&self.registry).owner(pid)
    }

    pub fn wakeup(&self, pid: Pid) -> Option<SimTime> {
        lock(&self.registry).get(pid).and_then(|r| r.wakeup)
    }

    pub fn peek(&self) -> Option<(SimTime, Pid)> {
        lock(&self.timeline).peek_first()
    }

    /// 时间线上挂着的进程数
    pub fn pending(&self) -> usize {
        lock(&self.timeline).len()
    }

    pub fn process_count(&self) -> usize {
        lock(&self.registry).len()
    }

    pub fn owned_by(&self, worker: WorkerId) -> Vec<Pid> {
        lock(&self.registry).owned_by(worker)
    }

    /// 创建一个本地进程并排在 `at`
    pub fn spawn(&self, behavior: Box<dyn Process>, at: SimTime) -> Result<Pid, SchedError> {
        let pid = self.pids.next();
        let now = self.now();
        if at < now {
            return Err(SchedError::InvalidTime { pid, at, now });
        }
        debug!(%pid, name = behavior.name(), %at, "🧵 创建进程");
        lock(&self.registry).register(pid, Ownership::Local, behavior)?;
        self.schedule_at(pid, at)?;
        Ok(pid)
    }

    /// 创建一个空闲（未调度）的本地进程
    pub fn spawn_idle(&self, behavior: Box<dyn Process>) -> Result<Pid, SchedError> {
        let pid = self.pids.next();
        lock(&self.registry).register(pid, Ownership::Local, behavior)?;
        Ok(pid)
    }

    /// 登记一个由 worker 持有的远程进程（行为通常是代理）
    pub fn register_remote(
        &self,
        pid: Pid,
        worker: WorkerId,
        behavior: Box<dyn Process>,
    ) -> Result<(), SchedError> {
        debug!(%pid, %worker, "登记远程进程");
        lock(&self.registry).register(pid, Ownership::Remote(worker), behavior)
    }

    /// 调度进程在 `at` 唤醒；已有的条目会先被移除。
    #[tracing::instrument(level = "trace", skip(self), fields(now = %self.now()))]
    pub fn schedule_at(&self, pid: Pid, at: SimTime) -> Result<(), SchedError> {
        let now = self.now();
        if at < now {
            return Err(SchedError::InvalidTime { pid, at, now });
        }
        let owner = {
            let mut reg = lock(&self.registry);
            reg.mark_scheduled(pid, at)?;
            lock(&self.timeline).schedule_at(pid, at);
            reg.owner(pid)
        };
        trace!("进程已加入时间线");

        if owner == Some(Ownership::Local) {
            if let Some(m) = &self.mirror {
                m.activate_at(pid, at);
            }
        }
        Ok(())
    }

    /// 取消进程的唤醒；返回它是否在时间线上。
    pub fn cancel(&self, pid: Pid) -> bool {
        let mut reg = lock(&self.registry);
        let was = lock(&self.timeline).cancel(pid).is_some();
        if reg.mark_cancelled(pid).is_err() {
            trace!(%pid, "取消未知/已终止进程");
        }
        was
    }

    /// 终止单个进程
    pub fn terminate(&self, pid: Pid) -> Result<(), SchedError> {
        let behavior = {
            let mut reg = lock(&self.registry);
            match reg.state(pid) {
                None => return Err(SchedError::UnknownProcess(pid)),
                Some(ProcessState::Terminated) => return Err(SchedError::Terminated(pid)),
                Some(_) => {}
            }
            let behavior = reg.terminate(pid);
            lock(&self.timeline).cancel(pid);
            behavior
        };
        debug!(%pid, "进程被终止");
        if let Some(mut b) = behavior {
            b.on_terminate();
        }
        Ok(())
    }

    /// 强制把所有进程转入 Terminated 并停止运行循环。
    pub fn interrupt(&self) {
        self.stop();
        let drained: Vec<Box<dyn Process>> = {
            let mut reg = lock(&self.registry);
            let pids = reg.pids();
            let drained = pids.into_iter().filter_map(|p| reg.terminate(p)).collect();
            lock(&self.timeline).clear();
            drained
        };
        warn!(count = drained.len(), now = %self.now(), "⛔ 调度器被中断");
        for mut b in drained {
            b.on_terminate();
        }
    }

    /// 弹出并执行时间线上最早的一个进程；时间线为空时返回 `None`。
    pub fn step(&self, world: &mut dyn World) -> Result<Option<(SimTime, Pid)>, SchedError> {
        let Some((at, pid)) = lock(&self.timeline).remove_first() else {
            return Ok(None);
        };
        let now = self.now();
        if at < now {
            error!(%pid, %at, %now, "时间线上出现过去的时刻");
            return Err(SchedError::InvalidTime { pid, at, now });
        }
        self.now.store(at.0, Ordering::SeqCst);
        self.run_process(pid, world)?;
        Ok(Some((at, pid)))
    }

    /// 由外部驱动的恢复（worker 收到 resumeProcess 时使用）。
    pub fn resume_at(
        &self,
        pid: Pid,
        at: SimTime,
        world: &mut dyn World,
    ) -> Result<ProcessState, SchedError> {
        let now = self.now();
        if at < now {
            return Err(SchedError::InvalidTime { pid, at, now });
        }
        lock(&self.timeline).cancel(pid);
        self.now.store(at.0, Ordering::SeqCst);
        self.run_process(pid, world)
    }

    fn run_process(&self, pid: Pid, world: &mut dyn World) -> Result<ProcessState, SchedError> {
        let (owner, behavior) = {
            let mut reg = lock(&self.registry);
            for other in reg.running_except(pid) {
                if let Some(at) = reg.preempt(other) {
                    lock(&self.timeline).schedule_at(other, at);
                }
                debug!(pid = %other, "抢占先前运行的进程");
            }
            reg.resume(pid)?;
            (reg.owner(pid), reg.take_behavior(pid))
        };

        let suspend = match behavior {
            Some(mut behavior) => {
                trace!(%pid, name = behavior.name(), now = %self.now(), "▶️ 恢复进程");
                let suspend = {
                    let mut ctx = ProcessCtx {
                        pid,
                        sched: self,
                        world: &mut *world,
                    };
                    behavior.resume(&mut ctx)
                };
                self.resumed.fetch_add(1, Ordering::SeqCst);
                if lock(&self.registry).put_behavior(pid, behavior).is_err() {
                    debug!(%pid, "进程在运行期间被终止");
                    return Ok(ProcessState::Terminated);
                }
                suspend
            }
            None => {
                warn!(%pid, "进程没有可执行的行为，视为阻塞");
                Suspend::Block
            }
        };

        let state = self.apply_suspend(pid, suspend)?;
        if owner == Some(Ownership::Local) {
            if let Some(m) = &self.mirror {
                m.blocked_or_finished(pid, state == ProcessState::Terminated);
            }
        }
        world.on_tick(self);
        Ok(state)
    }

    fn apply_suspend(&self, pid: Pid, suspend: Suspend) -> Result<ProcessState, SchedError> {
        match suspend {
            Suspend::Sleep(d) => self.schedule_at(pid, self.now().after(d))?,
            Suspend::WakeAt(at) => self.schedule_at(pid, at)?,
            Suspend::Block | Suspend::Finish => {}
        }
        let finished = suspend == Suspend::Finish;
        let mut reg = lock(&self.registry);
        let state = reg.blocked_or_finished(pid, finished)?;
        if state == ProcessState::Terminated {
            lock(&self.timeline).cancel(pid);
        }
        trace!(%pid, ?suspend, ?state, "进程让出");
        Ok(state)
    }

    /// 运行直到时间线为空或调度器被停止。
    #[tracing::instrument(skip(self, world))]
    pub fn run(&self, world: &mut dyn World) -> Result<RunSummary, SchedError> {
        self.run_bounded(None, world)
    }

    /// 运行直到时间线为空或到达 `until`。
    pub fn run_until(
        &self,
        until: SimTime,
        world: &mut dyn World,
    ) -> Result<RunSummary, SchedError> {
        let summary = self.run_bounded(Some(until), world)?;
        let now = self.now().max(until);
        self.now.store(now.0, Ordering::SeqCst);
        Ok(RunSummary {
            final_time: now,
            ..summary
        })
    }

    fn run_bounded(
        &self,
        until: Option<SimTime>,
        world: &mut dyn World,
    ) -> Result<RunSummary, SchedError> {
        info!("▶️  开始运行仿真");
        debug!(now = %self.now(), queue_size = self.pending(), "初始状态");

        self.start();
        let before = self.resumed_count();
        let result = loop {
            if !self.is_started() {
                break Ok(());
            }
            if let (Some(until), Some((at, _))) = (until, self.peek()) {
                if at > until {
                    break Ok(());
                }
            }
            match self.step(world) {
                Ok(Some(_)) => {}
                Ok(None) => {
                    debug!("时间线为空");
                    break Ok(());
                }
                Err(e) => break Err(e),
            }
        };
        self.stop();

        if let Err(e) = result {
            error!(error = %e, now = %self.now(), "❌ 调度故障，运行中止");
            return Err(e);
        }
        let summary = RunSummary {
            resumed: self.resumed_count() - before,
            final_time: self.now(),
        };
        info!(
            resumed = summary.resumed,
            final_time = %summary.final_time,
            "✅ 仿真完成"
        );
        Ok(summary)
    }
}
