//! 命令分发
//!
//! 链路的分发线程把收到的请求交给 `CommandTarget` 执行，
//! 然后把结果包装成 ok / error 应答，用同一个 cmdId 回给对端。

use thiserror::Error;
use tracing::{debug, warn};

use super::action::ActionCode;
use super::command::Command;
use super::invoke::InvokeError;
use crate::link::ProxyError;
use crate::net::NetError;
use crate::sim::{SchedError, WorkerId};

/// 执行失败；以 error 应答的形式回给发起方
#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Sched(#[from] SchedError),
    #[error(transparent)]
    Net(#[from] NetError),
    #[error(transparent)]
    Invoke(#[from] InvokeError),
    #[error(transparent)]
    Remote(#[from] ProxyError),
    #[error("action {0} is not handled on this side")]
    Unsupported(ActionCode),
    #[error("unknown worker {0}")]
    UnknownWorker(WorkerId),
    #[error("unknown class `{0}`")]
    UnknownClass(String),
    #[error("bad arguments: {0}")]
    BadArgs(String),
}

/// 命令的执行方（worker 或 manager）
pub trait CommandTarget: Send + Sync {
    /// 执行一条请求命令；`from` 是信封上的 worker id
    fn execute(&self, from: WorkerId, cmd: Command) -> Result<Option<String>, ExecError>;

    /// 链路断开
    fn on_disconnect(&self, _worker: WorkerId) {}
}

/// 执行并包装成应答
#[tracing::instrument(skip(target, cmd), fields(action = %cmd.action()))]
pub fn run(target: &dyn CommandTarget, from: WorkerId, cmd: Command) -> Command {
    let action = cmd.action();
    match target.execute(from, cmd) {
        Ok(result) => {
            debug!(?result, "命令执行成功");
            Command::ok(result)
        }
        Err(e) => {
            warn!(%action, %from, error = %e, "命令执行失败");
            Command::error(e.to_string())
        }
    }
}
