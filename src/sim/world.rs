//! 世界 trait
//!
//! 定义仿真世界接口。

use super::scheduler::Scheduler;
use std::any::Any;

/// 仿真世界：由业务层实现（例如网络拓扑/统计等）。
pub trait World: Any {
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// 每次有进程让出后调用
    fn on_tick(&mut self, _sched: &Scheduler) {}
}
