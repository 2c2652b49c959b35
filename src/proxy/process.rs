//! 远程进程代理
//!
//! manager 的调度器里，worker 上的进程以代理的形式存在：轮到它时发送
//! `resumeProcess` 并等待应答，然后读取 worker 在应答之前用
//! `processBlockedOrFinished` 报告的结果。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, warn};

use crate::link::{ProxyError, WorkerLink};
use crate::proto::{Command, ResumeProcess, TerminateProcess};
use crate::sim::{Pid, Process, ProcessCtx, Suspend, lock};

/// worker 报告的进程让出结果（pid -> finished）
#[derive(Debug, Clone, Default)]
pub struct Outcomes(Arc<Mutex<HashMap<Pid, bool>>>);

impl Outcomes {
    pub fn record(&self, pid: Pid, finished: bool) {
        lock(&self.0).insert(pid, finished);
    }

    pub fn take(&self, pid: Pid) -> Option<bool> {
        lock(&self.0).remove(&pid)
    }
}

pub struct ProcessProxy {
    pid: Pid,
    link: WorkerLink,
    outcomes: Outcomes,
    name: String,
}

impl ProcessProxy {
    pub fn new(pid: Pid, link: WorkerLink, outcomes: Outcomes) -> Self {
        let name = format!("proxy:{}@{}", pid, link.worker_id());
        Self {
            pid,
            link,
            outcomes,
            name,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }
}

impl Process for ProcessProxy {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(skip(self, ctx), fields(pid = %self.pid, worker = %self.link.worker_id()))]
    fn resume(&mut self, ctx: &mut ProcessCtx<'_>) -> Suspend {
        let cmd = Command::ResumeProcess(ResumeProcess {
            pid: self.pid,
            new_time: ctx.now(),
        });
        match self.link.request(cmd) {
            Ok(_) => {}
            Err(ProxyError::Remote(message)) => {
                // 调度器按结束处理时不会调用 on_terminate，这里先让 worker 丢弃它
                error!(%message, "worker 拒绝恢复进程，终止远程进程");
                self.outcomes.take(self.pid);
                self.on_terminate();
                return Suspend::Finish;
            }
            Err(e) => {
                error!(error = %e, "远程恢复失败，视为结束");
                return Suspend::Finish;
            }
        }
        match self.outcomes.take(self.pid) {
            Some(true) => {
                debug!("远程进程结束");
                Suspend::Finish
            }
            Some(false) => Suspend::Block,
            None => {
                warn!("worker 没有报告进程状态，视为阻塞");
                Suspend::Block
            }
        }
    }

    fn on_terminate(&mut self) {
        let cmd = Command::TerminateProcess(TerminateProcess { pid: self.pid });
        if let Err(e) = self.link.send(cmd) {
            debug!(pid = %self.pid, error = %e, "无法通知 worker 终止进程");
        }
    }
}
