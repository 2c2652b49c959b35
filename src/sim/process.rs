//! 仿真进程
//!
//! 进程是显式的状态机：调度器轮到它时调用 `resume`，进程返回一个挂起点
//! （睡眠、定时唤醒、阻塞或结束）。同一时刻最多只有一个进程在执行。

use super::ident::Pid;
use super::scheduler::Scheduler;
use super::time::SimTime;
use super::world::World;

/// 进程让出控制权的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspend {
    /// 相对当前时间睡眠
    Sleep(SimTime),
    /// 在绝对时刻唤醒
    WakeAt(SimTime),
    /// 阻塞，直到别人为它调度唤醒
    Block,
    /// 结束
    Finish,
}

/// 进程执行时可见的上下文
pub struct ProcessCtx<'a> {
    pub pid: Pid,
    pub sched: &'a Scheduler,
    pub world: &'a mut dyn World,
}

impl ProcessCtx<'_> {
    pub fn now(&self) -> SimTime {
        self.sched.now()
    }
}

/// 仿真进程接口
pub trait Process: Send {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// 轮到该进程执行
    fn resume(&mut self, ctx: &mut ProcessCtx<'_>) -> Suspend;

    /// 进程被强制终止（interrupt / terminateProcess）时调用
    fn on_terminate(&mut self) {}
}

/// 用闭包实现的进程
pub struct FnProcess<F> {
    name: String,
    f: F,
}

impl<F> Process for FnProcess<F>
where
    F: FnMut(&mut ProcessCtx<'_>) -> Suspend + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, ctx: &mut ProcessCtx<'_>) -> Suspend {
        (self.f)(ctx)
    }
}

pub fn from_fn<F>(name: impl Into<String>, f: F) -> FnProcess<F>
where
    F: FnMut(&mut ProcessCtx<'_>) -> Suspend + Send,
{
    FnProcess {
        name: name.into(),
        f,
    }
}
