//! worker 一侧
//!
//! worker 持有一个分区的实体，不自己推进时间：manager 通过 `resumeProcess`
//! 驱动它的进程。本地调度变化经 `ActivationMirror` 报告给 manager，
//! 发往其它分区的数据包经 `RemoteSink` 交给 manager 转发。

use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex, OnceLock};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, instrument, warn};

use super::classes::ClassRegistry;
use super::error::DistError;
use crate::link::WorkerLink;
use crate::net::{NetId, Network, Packet, RemoteSink, Stats};
use crate::proto::{
    ActivateAt, AddToPool, BlockedOrFinished, Command, CommandTarget, CreatePayload, ExecError,
    MethodRegistry, PacketArrival,
};
use crate::proxy::RemoteAddr;
use crate::sim::{ActivationMirror, Pid, Scheduler, SimTime, WorkerId, lock};

type LinkSlot = Arc<OnceLock<WorkerLink>>;

/// 把本地调度变化转发给 manager
struct LinkMirror {
    link: LinkSlot,
}

impl ActivationMirror for LinkMirror {
    fn activate_at(&self, pid: Pid, at: SimTime) {
        let Some(link) = self.link.get() else {
            return;
        };
        if let Err(e) = link.send(Command::ActivateAt(ActivateAt { time: at, pid })) {
            warn!(%pid, error = %e, "无法报告 activateAt");
        }
    }

    fn blocked_or_finished(&self, pid: Pid, finished: bool) {
        let Some(link) = self.link.get() else {
            return;
        };
        let cmd = Command::ProcessBlockedOrFinished(BlockedOrFinished { pid, finished });
        if let Err(e) = link.send(cmd) {
            warn!(%pid, error = %e, "无法报告进程状态");
        }
    }
}

/// 跨分区的数据包交给 manager
struct LinkSink {
    link: LinkSlot,
}

impl RemoteSink for LinkSink {
    fn packet_arrival(&self, to: NetId, sent_at: SimTime, relative: SimTime, pkt: Packet) {
        let Some(link) = self.link.get() else {
            warn!(%to, "链路未就绪，丢弃跨分区数据包");
            return;
        };
        let arrival = PacketArrival::new(link.worker_id(), to, sent_at, relative, pkt);
        if let Err(e) = link.send(Command::PacketArrival(arrival)) {
            warn!(%to, error = %e, "无法发送 packetArrival");
        }
    }
}

struct WorkerShared {
    desc: String,
    sched: Scheduler,
    net: Mutex<Network>,
    methods: MethodRegistry,
    classes: ClassRegistry,
    link: LinkSlot,
    stop_tx: Mutex<Option<Sender<()>>>,
}

impl WorkerShared {
    /// 握手应答可能晚于 manager 的第一条命令，所以从信封上获知自己的 id
    fn adopt(&self, from: WorkerId) {
        if from == WorkerId::MANAGER || self.sched.issuer() != 0 {
            return;
        }
        debug!(worker = %from, "采用 manager 分配的 worker id");
        self.sched.set_issuer(from.0 as u32);
        lock(&self.net).set_issuer(from.0 as u32);
    }

    fn signal_stop(&self) {
        if let Some(tx) = lock(&self.stop_tx).take() {
            let _ = tx.send(());
        }
    }

    fn worker_id(&self) -> WorkerId {
        self.link
            .get()
            .map(WorkerLink::worker_id)
            .unwrap_or(WorkerId(self.sched.issuer() as i32))
    }

    fn create(&self, object: bool, p: CreatePayload) -> Result<Option<String>, ExecError> {
        let pid = {
            let mut net = lock(&self.net);
            if object {
                self.classes
                    .create_object(&p.class, p.net_id, &p.args, &mut net, &self.sched)?
            } else {
                self.classes
                    .create_node(&p.class, p.net_id, &p.args, &mut net, &self.sched)?
            }
        };
        let addr = RemoteAddr {
            worker_id: self.worker_id(),
            worker_desc: self.desc.clone(),
            net_id: p.net_id,
            pid,
        };
        Ok(addr.to_json())
    }
}

impl CommandTarget for WorkerShared {
    fn execute(&self, from: WorkerId, cmd: Command) -> Result<Option<String>, ExecError> {
        self.adopt(from);
        match cmd {
            Command::Create(p) => self.create(false, p),
            Command::CreateObject(p) => self.create(true, p),
            Command::Invoke(call) => {
                let mut net = lock(&self.net);
                Ok(self
                    .methods
                    .invoke(call.target, &call.method, &call.args, &mut net, &self.sched)?)
            }
            Command::StartSimulation => {
                self.sched.start();
                info!("▶️  worker 开始仿真");
                Ok(None)
            }
            Command::StopSimulation | Command::RemoveFromPool(_) => {
                self.sched.stop();
                info!("⏹️  worker 停止仿真");
                self.signal_stop();
                Ok(None)
            }
            Command::ResumeProcess(r) => {
                let mut net = lock(&self.net);
                let state = self.sched.resume_at(r.pid, r.new_time, &mut *net)?;
                Ok(Some(format!("{state:?}")))
            }
            Command::TerminateProcess(t) => {
                self.sched.terminate(t.pid)?;
                Ok(None)
            }
            Command::PacketArrival(a) => {
                let at = a.arrival_time();
                let mut net = lock(&self.net);
                let pid = net.accept_remote(a.to, at, a.packet, &self.sched)?;
                Ok(Some(pid.to_string()))
            }
            other => Err(ExecError::Unsupported(other.action())),
        }
    }

    fn on_disconnect(&self, worker: WorkerId) {
        warn!(%worker, "与 manager 的连接断开");
        self.sched.interrupt();
        self.signal_stop();
    }
}

/// 一个已连接到 manager 的 worker
pub struct Worker {
    shared: Arc<WorkerShared>,
    link: WorkerLink,
    stop_rx: Receiver<()>,
}

impl Worker {
    /// 连接 manager 并用 `addToPool` 完成握手
    #[instrument(skip(addr))]
    pub fn connect(addr: impl ToSocketAddrs, desc: &str) -> Result<Worker, DistError> {
        let stream = TcpStream::connect(addr)?;
        let slot: LinkSlot = Arc::new(OnceLock::new());
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);

        let sched = Scheduler::new(0).with_mirror(Arc::new(LinkMirror { link: slot.clone() }));
        let mut net = Network::new(0);
        net.set_remote(Arc::new(LinkSink { link: slot.clone() }));

        let shared = Arc::new(WorkerShared {
            desc: desc.to_string(),
            sched,
            net: Mutex::new(net),
            methods: MethodRegistry::standard(),
            classes: ClassRegistry::standard(),
            link: slot.clone(),
            stop_tx: Mutex::new(Some(stop_tx)),
        });

        let link = WorkerLink::spawn(stream, WorkerId::MANAGER, shared.clone())?;
        let _ = slot.set(link.clone());

        let reply = link.request(Command::AddToPool(AddToPool {
            description: desc.to_string(),
        }))?;
        let id: i32 = reply
            .as_deref()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| DistError::Handshake(format!("bad worker id {reply:?}")))?;
        let id = WorkerId(id);
        link.set_worker_id(id);
        shared.adopt(id);
        info!(worker = %id, desc, manager = link.peer(), "🤝 已加入 worker 池");

        Ok(Worker {
            shared,
            link,
            stop_rx,
        })
    }

    pub fn id(&self) -> WorkerId {
        self.link.worker_id()
    }

    pub fn description(&self) -> &str {
        &self.shared.desc
    }

    pub fn stats(&self) -> Stats {
        lock(&self.shared.net).stats.clone()
    }

    pub fn now(&self) -> SimTime {
        self.shared.sched.now()
    }

    /// 阻塞直到 manager 发来 stopSimulation / removeFromPool 或链路断开
    pub fn serve(&self) -> Stats {
        let _ = self.stop_rx.recv();
        let stats = self.stats();
        info!(
            worker = %self.id(),
            now = %self.now(),
            delivered_pkts = stats.delivered_pkts,
            "worker 退出"
        );
        stats
    }

    pub fn close(&self) {
        self.link.close();
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.link.is_alive() {
            self.link.close();
        }
    }
}
