//! 仿真核心模块
//!
//! 此模块包含离散事件调度内核：仿真时间、时间线、进程注册表与调度器。

// 子模块声明
mod error;
mod ident;
mod process;
mod registry;
mod scheduler;
mod time;
mod timeline;
mod world;

// 重新导出公共接口
pub use error::SchedError;
pub use ident::{Ownership, Pid, PidAllocator, WorkerId};
pub use process::{FnProcess, Process, ProcessCtx, Suspend, from_fn};
pub use registry::{ProcessRecord, ProcessRegistry, ProcessState};
pub(crate) use scheduler::lock;
pub use scheduler::{ActivationMirror, RunSummary, Scheduler};
pub use time::SimTime;
pub use timeline::Timeline;
pub use world::World;
