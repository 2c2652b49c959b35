//! 调度错误

use thiserror::Error;

use super::ident::Pid;
use super::registry::ProcessState;
use super::time::SimTime;

/// 调度故障：对本地运行循环是致命的，不会重试。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedError {
    #[error("invalid wake-up time {at} for process {pid} (now = {now})")]
    InvalidTime { pid: Pid, at: SimTime, now: SimTime },
    #[error("process {0} is terminated")]
    Terminated(Pid),
    #[error("unknown process {0}")]
    UnknownProcess(Pid),
    #[error("process {0} is already registered")]
    DuplicatePid(Pid),
    #[error("process {pid} cannot be resumed from state {state:?}")]
    NotRunnable { pid: Pid, state: ProcessState },
}
