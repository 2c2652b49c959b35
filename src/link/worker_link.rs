//! manager 与 worker 之间的一条 TCP 链路
//!
//! 每条链路两个线程：
//! - 接收线程只负责解帧，把结果按序放进入站队列；
//! - 分发线程按序消费队列：请求交给 `CommandTarget` 执行并回复，
//!   应答则唤醒对应 cmdId 的等待者。
//!
//! 因为同一个分发线程先处理完对端在应答之前发来的所有命令，
//! 等待者被唤醒时这些命令的效果都已生效。

use std::collections::HashMap;
use std::io::BufReader;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, ThreadId};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info, trace, warn};

use super::error::{LinkError, ProxyError};
use crate::proto::{self, CmdId, CmdIdGen, Command, CommandTarget, Envelope, FrameError};
use crate::sim::{WorkerId, lock};

type Waiter = Sender<Result<Command, LinkError>>;

/// 入站队列中的条目
enum Inbound {
    Frame(Envelope),
    /// 头部可读但载荷无效，仍按 cmdId 回复错误
    Garbled { cmd_id: CmdId, message: String },
    Closed,
}

#[derive(Default)]
struct Pending {
    dead: bool,
    waiters: HashMap<CmdId, Waiter>,
}

struct LinkInner {
    peer: String,
    worker_id: AtomicI32,
    ids: CmdIdGen,
    writer: Mutex<TcpStream>,
    pending: Mutex<Pending>,
    dispatch_thread: OnceLock<ThreadId>,
}

/// 一条命令链路；克隆得到的是同一条链路的句柄
#[derive(Clone)]
pub struct WorkerLink {
    inner: Arc<LinkInner>,
}

impl std::fmt::Debug for WorkerLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerLink")
            .field("peer", &self.inner.peer)
            .field("worker_id", &self.worker_id())
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl WorkerLink {
    /// 接管一个已建立的连接并启动接收、分发线程。
    ///
    /// `worker` 为该链路对应的 worker id；worker 一侧在握手前不知道自己的 id，
    /// 传入 `WorkerId::MANAGER`，之后从入站信封中获知。
    pub fn spawn(
        stream: TcpStream,
        worker: WorkerId,
        target: Arc<dyn CommandTarget>,
    ) -> Result<WorkerLink, LinkError> {
        let io = |e: std::io::Error| LinkError::Io(e.to_string());
        stream.set_nodelay(true).map_err(io)?;
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "?".to_string());
        let reader = stream.try_clone().map_err(io)?;

        let link = WorkerLink {
            inner: Arc::new(LinkInner {
                peer,
                worker_id: AtomicI32::new(worker.0),
                ids: CmdIdGen::default(),
                writer: Mutex::new(stream),
                pending: Mutex::new(Pending::default()),
                dispatch_thread: OnceLock::new(),
            }),
        };

        let (tx, rx) = crossbeam_channel::unbounded();
        let name = format!("link-rx-{}", link.inner.peer);
        thread::Builder::new()
            .name(name)
            .spawn(move || receive_loop(reader, tx))
            .map_err(io)?;

        let dispatcher = link.clone();
        let name = format!("link-dispatch-{}", link.inner.peer);
        thread::Builder::new()
            .name(name)
            .spawn(move || {
                let _ = dispatcher.inner.dispatch_thread.set(thread::current().id());
                dispatcher.dispatch_loop(rx, target)
            })
            .map_err(io)?;

        info!(peer = %link.inner.peer, worker = %worker, "🔗 链路已建立");
        Ok(link)
    }

    pub fn peer(&self) -> &str {
        &self.inner.peer
    }

    pub fn worker_id(&self) -> WorkerId {
        WorkerId(self.inner.worker_id.load(Ordering::SeqCst))
    }

    pub fn set_worker_id(&self, worker: WorkerId) {
        self.inner.worker_id.store(worker.0, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        !lock(&self.inner.pending).dead
    }

    /// 当前线程是否是本链路的分发线程
    pub fn on_dispatch_thread(&self) -> bool {
        self.inner.dispatch_thread.get() == Some(&thread::current().id())
    }

    fn write(&self, cmd_id: CmdId, cmd: &Command) -> Result<(), LinkError> {
        let env = cmd
            .to_envelope(self.worker_id(), cmd_id)
            .map_err(|e| LinkError::Encode(e.to_string()))?;
        let mut w = lock(&self.inner.writer);
        match proto::write_frame(&mut *w, &env) {
            Ok(()) => {
                trace!(peer = %self.inner.peer, %cmd_id, action = %cmd.action(), "📤 发送命令");
                Ok(())
            }
            Err(FrameError::TooLarge(n)) => Err(LinkError::Encode(format!("frame too large: {n} bytes"))),
            Err(e) => {
                // 写失败后链路不可再用，关掉让接收线程收尾
                let _ = w.shutdown(Shutdown::Both);
                Err(LinkError::Io(e.to_string()))
            }
        }
    }

    /// 发送后不等待；应答只记日志。
    pub fn send(&self, cmd: Command) -> Result<CmdId, LinkError> {
        if !self.is_alive() {
            return Err(LinkError::Disconnected);
        }
        let cmd_id = self.inner.ids.next();
        self.write(cmd_id, &cmd)?;
        Ok(cmd_id)
    }

    /// 发送并阻塞等待对应 cmdId 的 ok / error。
    #[tracing::instrument(skip(self, cmd), fields(peer = %self.inner.peer, action = %cmd.action()))]
    pub fn request(&self, cmd: Command) -> Result<Option<String>, ProxyError> {
        if self.on_dispatch_thread() {
            error!("不能在分发线程上发起阻塞请求");
            return Err(LinkError::Reentrant.into());
        }
        let cmd_id = self.inner.ids.next();
        let (tx, rx) = crossbeam_channel::unbounded();
        {
            let mut pending = lock(&self.inner.pending);
            if pending.dead {
                return Err(LinkError::Disconnected.into());
            }
            pending.waiters.insert(cmd_id, tx);
        }
        if let Err(e) = self.write(cmd_id, &cmd) {
            lock(&self.inner.pending).waiters.remove(&cmd_id);
            return Err(e.into());
        }
        debug!(%cmd_id, "⏳ 等待应答");

        match rx.recv() {
            Ok(Ok(Command::Ok(reply))) => Ok(reply.result),
            Ok(Ok(Command::Error(failure))) => Err(ProxyError::Remote(failure.message)),
            Ok(Ok(other)) => Err(ProxyError::BadReply(other.action().to_string())),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(LinkError::Disconnected.into()),
        }
    }

    /// 关闭连接；接收线程随之结束，等待者收到 Disconnected。
    pub fn close(&self) {
        debug!(peer = %self.inner.peer, "关闭链路");
        let _ = lock(&self.inner.writer).shutdown(Shutdown::Both);
    }

    fn complete(&self, cmd_id: CmdId, outcome: Result<Command, LinkError>) {
        let waiter = lock(&self.inner.pending).waiters.remove(&cmd_id);
        match (waiter, outcome) {
            (Some(w), outcome) => {
                let _ = w.send(outcome);
            }
            (None, Ok(Command::Error(f))) => {
                warn!(peer = %self.inner.peer, %cmd_id, message = %f.message, "对端报告命令失败");
            }
            (None, Ok(_)) => trace!(%cmd_id, "收到应答"),
            (None, Err(e)) => warn!(%cmd_id, error = %e, "无法解析应答"),
        }
    }

    fn reply(&self, cmd_id: CmdId, reply: Command) {
        if let Err(e) = self.write(cmd_id, &reply) {
            warn!(peer = %self.inner.peer, %cmd_id, error = %e, "无法发送应答");
        }
    }

    fn dispatch_loop(self, rx: Receiver<Inbound>, target: Arc<dyn CommandTarget>) {
        let mut last_inbound: Option<CmdId> = None;
        loop {
            match rx.recv() {
                Ok(Inbound::Frame(env)) => self.handle(env, &mut last_inbound, target.as_ref()),
                Ok(Inbound::Garbled { cmd_id, message }) => {
                    self.reply(cmd_id, Command::error(message));
                }
                Ok(Inbound::Closed) | Err(_) => break,
            }
        }

        let waiters = {
            let mut pending = lock(&self.inner.pending);
            pending.dead = true;
            std::mem::take(&mut pending.waiters)
        };
        for (_, w) in waiters {
            let _ = w.send(Err(LinkError::Disconnected));
        }
        let worker = self.worker_id();
        warn!(peer = %self.inner.peer, %worker, "🔌 链路断开");
        target.on_disconnect(worker);
    }

    fn handle(&self, env: Envelope, last_inbound: &mut Option<CmdId>, target: &dyn CommandTarget) {
        if self.worker_id() == WorkerId::MANAGER && env.worker_id != WorkerId::MANAGER {
            debug!(worker = %env.worker_id, "从信封获知 worker id");
            self.set_worker_id(env.worker_id);
        }
        let cmd_id = env.cmd_id;
        let is_reply = proto::ActionCode::from_u8(env.action).is_some_and(|a| a.is_reply());

        let cmd = match Command::decode(&env) {
            Ok(cmd) => cmd,
            Err(e) if is_reply => {
                self.complete(cmd_id, Err(LinkError::Protocol(e.to_string())));
                return;
            }
            Err(e) => {
                warn!(peer = %self.inner.peer, %cmd_id, error = %e, "无法解码命令");
                self.reply(cmd_id, Command::error(e.to_string()));
                return;
            }
        };

        if cmd.is_reply() {
            self.complete(cmd_id, Ok(cmd));
            return;
        }

        if last_inbound.is_some_and(|last| cmd_id <= last) {
            warn!(peer = %self.inner.peer, %cmd_id, "cmdId 非递增");
            self.reply(cmd_id, Command::error(format!("cmdId collision: {cmd_id}")));
            return;
        }
        *last_inbound = Some(cmd_id);

        trace!(peer = %self.inner.peer, %cmd_id, action = %cmd.action(), "📥 处理命令");
        // manager 一侧以链路自身的 id 为准，不信任信封
        let reply = proto::run(target, self.worker_id(), cmd);
        self.reply(cmd_id, reply);
    }
}

fn receive_loop(stream: TcpStream, tx: Sender<Inbound>) {
    let mut reader = BufReader::new(stream);
    loop {
        let item = match proto::read_frame(&mut reader) {
            Ok(Some(env)) => Inbound::Frame(env),
            Ok(None) => {
                debug!("对端关闭连接");
                Inbound::Closed
            }
            Err(FrameError::BadUtf8 { cmd_id, .. }) => Inbound::Garbled {
                cmd_id,
                message: format!("payload of command {cmd_id} is not valid UTF-8"),
            },
            Err(e) => {
                debug!(error = %e, "读取失败，结束接收");
                Inbound::Closed
            }
        };
        let closed = matches!(item, Inbound::Closed);
        if tx.send(item).is_err() || closed {
            break;
        }
    }
}
