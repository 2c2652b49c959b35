//! manager 一侧
//!
//! manager 持有权威的时间线：本地进程与 worker 上进程的代理排在同一个调度器里。
//! 每条 worker 链路有自己的分发线程，处理 worker 发来的 activateAt、
//! processBlockedOrFinished 与 packetArrival；这些处理从不获取网络锁，
//! 因此运行循环可以在整个运行期间持有它。

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use super::classes::ClassRegistry;
use super::error::DistError;
use super::pool::WorkerPool;
use crate::link::WorkerLink;
use crate::net::{DeliverPacket, NetError, NetId, NetIdAllocator, Network, Packet, RemoteSink, Stats};
use crate::proto::{
    ActivateAt, Command, CommandTarget, CreatePayload, ExecError, InvokeCall, MethodRegistry,
    PacketArrival, Target,
};
use crate::proxy::{GroupHandle, GroupProxy, NodeHandle, NodeProxy, Outcomes, ProcessProxy, RemoteAddr};
use crate::sim::{Ownership, Pid, RunSummary, Scheduler, SimTime, WorkerId, lock};

const MANAGER_DESC: &str = "manager";

struct ManagerShared {
    sched: Scheduler,
    net: Mutex<Network>,
    ids: NetIdAllocator,
    pool: WorkerPool,
    directory: Mutex<HashMap<NetId, Ownership>>,
    outcomes: Outcomes,
    methods: MethodRegistry,
    classes: ClassRegistry,
}

/// manager 本地节点发往 worker 节点的包
struct ManagerSink {
    shared: Weak<ManagerShared>,
}

impl RemoteSink for ManagerSink {
    fn packet_arrival(&self, to: NetId, sent_at: SimTime, relative: SimTime, pkt: Packet) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let arrival = PacketArrival::new(WorkerId::MANAGER, to, sent_at, relative, pkt);
        if let Err(e) = shared.relay(arrival) {
            warn!(%to, error = %e, "无法转发跨分区数据包");
        }
    }
}

impl ManagerShared {
    fn owner(&self, id: NetId) -> Option<Ownership> {
        lock(&self.directory).get(&id).copied()
    }

    fn link_of(&self, worker: WorkerId) -> Result<WorkerLink, ExecError> {
        self.pool
            .link(worker)
            .map_err(|_| ExecError::UnknownWorker(worker))
    }

    /// worker 上的进程被调度：第一次见到的 pid 登记为代理
    fn activate(&self, from: WorkerId, a: ActivateAt) -> Result<Option<String>, ExecError> {
        if self.sched.state(a.pid).is_none() {
            let link = self.link_of(from)?;
            let proxy = ProcessProxy::new(a.pid, link, self.outcomes.clone());
            self.sched.register_remote(a.pid, from, Box::new(proxy))?;
        }
        self.sched.schedule_at(a.pid, a.time)?;
        Ok(None)
    }

    /// 把包交给目的节点所在的分区
    #[instrument(skip(self, a), fields(to = %a.to, from = %a.from_worker))]
    fn relay(&self, a: PacketArrival) -> Result<Option<String>, ExecError> {
        match self.owner(a.to) {
            Some(Ownership::Local) => {
                let at = a.arrival_time();
                let pid = self
                    .sched
                    .spawn(Box::new(DeliverPacket::new(a.to, a.packet)), at)?;
                debug!(%pid, %at, "数据包到达 manager 本地节点");
                Ok(Some(pid.to_string()))
            }
            Some(Ownership::Remote(worker)) => {
                let link = self.link_of(worker)?;
                debug!(%worker, "转发 packetArrival");
                Ok(link.request(Command::PacketArrival(a))?)
            }
            None => Err(NetError::UnknownNode(a.to).into()),
        }
    }

    fn invoke_local(&self, target: Target, method: &str, args: &[String]) -> Result<Option<String>, ExecError> {
        let mut net = lock(&self.net);
        Ok(self.methods.invoke(target, method, args, &mut net, &self.sched)?)
    }
}

impl CommandTarget for ManagerShared {
    fn execute(&self, from: WorkerId, cmd: Command) -> Result<Option<String>, ExecError> {
        match cmd {
            Command::ActivateAt(a) => self.activate(from, a),
            Command::ProcessBlockedOrFinished(b) => {
                self.outcomes.record(b.pid, b.finished);
                Ok(None)
            }
            Command::PacketArrival(a) => self.relay(a),
            Command::AddToPool(p) => {
                self.pool
                    .describe(from, p.description)
                    .map_err(|_| ExecError::UnknownWorker(from))?;
                Ok(Some(from.0.to_string()))
            }
            Command::RemoveFromPool(r) => {
                if let Some(link) = self.pool.remove(r.worker_id).and_then(|e| e.link) {
                    link.close();
                }
                Ok(None)
            }
            Command::StopSimulation => {
                self.sched.stop();
                Ok(None)
            }
            other => Err(ExecError::Unsupported(other.action())),
        }
    }

    fn on_disconnect(&self, worker: WorkerId) {
        if let Some(link) = self.pool.remove(worker).and_then(|e| e.link) {
            link.close();
        }
        let orphaned: Vec<NetId> = {
            let mut dir = lock(&self.directory);
            let ids: Vec<NetId> = dir
                .iter()
                .filter(|(_, o)| **o == Ownership::Remote(worker))
                .map(|(id, _)| *id)
                .collect();
            for id in &ids {
                dir.remove(id);
            }
            ids
        };
        let pids = self.sched.owned_by(worker);
        for pid in &pids {
            if let Err(e) = self.sched.terminate(*pid) {
                debug!(%pid, error = %e, "终止远程进程失败");
            }
        }
        warn!(
            %worker,
            orphaned = orphaned.len(),
            terminated = pids.len(),
            "🔌 worker 断开，其实体与进程已作废"
        );
    }
}

/// 仿真的驱动方
pub struct Manager {
    shared: Arc<ManagerShared>,
    listener: Option<TcpListener>,
}

impl Manager {
    /// 不接受 worker 的纯本地 manager
    pub fn local() -> Manager {
        let shared = Arc::new_cyclic(|weak: &Weak<ManagerShared>| {
            let mut net = Network::new(0);
            net.set_remote(Arc::new(ManagerSink {
                shared: weak.clone(),
            }));
            ManagerShared {
                sched: Scheduler::new(0),
                net: Mutex::new(net),
                ids: NetIdAllocator::default(),
                pool: WorkerPool::default(),
                directory: Mutex::new(HashMap::new()),
                outcomes: Outcomes::default(),
                methods: MethodRegistry::standard(),
                classes: ClassRegistry::standard(),
            }
        });
        Manager {
            shared,
            listener: None,
        }
    }

    /// 监听 worker 连接
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Manager, DistError> {
        let listener = TcpListener::bind(addr)?;
        info!(addr = ?listener.local_addr().ok(), "📡 manager 开始监听");
        let mut manager = Manager::local();
        manager.listener = Some(listener);
        Ok(manager)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// 接受 `count` 个连接并等待它们都完成 addToPool 握手
    pub fn accept_workers(&self, count: usize, timeout: Duration) -> Result<Vec<WorkerId>, DistError> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| DistError::Handshake("manager is not listening".to_string()))?;
        for _ in 0..count {
            let (stream, peer) = listener.accept()?;
            let id = self.shared.pool.allocate_id();
            self.shared.pool.reserve(id);
            let link = WorkerLink::spawn(stream, id, self.shared.clone())?;
            debug!(worker = %id, %peer, "接受 worker 连接");
            self.shared.pool.attach(id, link)?;
        }
        self.shared.pool.wait_ready(count, timeout)?;
        Ok(self.shared.pool.ids())
    }

    pub fn workers(&self) -> Vec<WorkerId> {
        self.shared.pool.ids()
    }

    pub fn worker_by_index(&self, index: usize) -> Option<WorkerId> {
        self.shared.pool.by_index(index)
    }

    pub fn worker_desc(&self, worker: WorkerId) -> Option<String> {
        self.shared.pool.desc(worker)
    }

    pub fn sched(&self) -> &Scheduler {
        &self.shared.sched
    }

    pub fn now(&self) -> SimTime {
        self.shared.sched.now()
    }

    pub fn owner(&self, id: NetId) -> Option<Ownership> {
        self.shared.owner(id)
    }

    /// manager 本地分区的统计
    pub fn stats(&self) -> Stats {
        lock(&self.shared.net).stats.clone()
    }

    fn record(&self, id: NetId, owner: Ownership) {
        lock(&self.shared.directory).insert(id, owner);
    }

    /// 创建节点；`worker` 为空时建在 manager 本地
    #[instrument(skip(self, args))]
    pub fn create_node(
        &self,
        worker: Option<WorkerId>,
        class: &str,
        args: Vec<String>,
    ) -> Result<NodeHandle, DistError> {
        let id = self.shared.ids.node();
        let handle = match worker {
            None => {
                let mut net = lock(&self.shared.net);
                self.shared
                    .classes
                    .create_node(class, id, &args, &mut net, &self.shared.sched)?;
                NodeHandle::Local(id)
            }
            Some(w) => {
                let link = self.shared.pool.link(w)?;
                NodeHandle::Remote(NodeProxy::create(&link, class, id, args)?)
            }
        };
        self.record(id, handle.ownership());
        Ok(handle)
    }

    /// 创建组播组；给定 `router` 时为路由器感知组
    pub fn create_group(
        &self,
        worker: Option<WorkerId>,
        router: Option<NetId>,
    ) -> Result<GroupHandle, DistError> {
        let id = self.shared.ids.group();
        let (class, args) = match router {
            Some(r) => ("router_group", vec![r.0.to_string()]),
            None => ("group", Vec::new()),
        };
        let handle = match worker {
            None => {
                let mut net = lock(&self.shared.net);
                self.shared
                    .classes
                    .create_object(class, id, &args, &mut net, &self.shared.sched)?;
                GroupHandle::Local(id)
            }
            Some(w) => {
                let link = self.shared.pool.link(w)?;
                GroupHandle::Remote(GroupProxy::create(&link, class, id, args)?)
            }
        };
        self.record(id, handle.ownership());
        info!(group = %id, ?router, ?worker, "创建组播组");
        Ok(handle)
    }

    /// 通用的 createObject
    pub fn create_object(
        &self,
        worker: Option<WorkerId>,
        class: &str,
        net_id: NetId,
        args: Vec<String>,
    ) -> Result<RemoteAddr, DistError> {
        match worker {
            None => {
                let mut net = lock(&self.shared.net);
                let pid = self
                    .shared
                    .classes
                    .create_object(class, net_id, &args, &mut net, &self.shared.sched)?;
                Ok(RemoteAddr {
                    worker_id: WorkerId::MANAGER,
                    worker_desc: MANAGER_DESC.to_string(),
                    net_id,
                    pid,
                })
            }
            Some(w) => {
                let link = self.shared.pool.link(w)?;
                let cmd = Command::CreateObject(CreatePayload {
                    class: class.to_string(),
                    net_id,
                    args,
                });
                Ok(RemoteAddr::from_reply(link.request(cmd)?)?)
            }
        }
    }

    /// 在所有分区上建立链路，使每个分区都能基于全局拓扑计算路由
    pub fn connect(&self, from: NetId, to: NetId, latency: SimTime, bandwidth_bps: u64) -> Result<(), DistError> {
        let args = vec![
            from.0.to_string(),
            to.0.to_string(),
            latency.as_nanos().to_string(),
            bandwidth_bps.to_string(),
        ];
        self.invoke(Target::Network, "connect", args)?;
        Ok(())
    }

    /// 按名字调用方法；network 上的 connect 会广播给所有 worker
    pub fn invoke(&self, target: Target, method: &str, args: Vec<String>) -> Result<Option<String>, DistError> {
        let owner = match target {
            Target::Network => Ownership::Local,
            Target::Node(id) | Target::Group(id) => {
                self.owner(id).ok_or(DistError::UnknownEntity(id))?
            }
        };
        let result = match owner {
            Ownership::Local => self.shared.invoke_local(target, method, &args)?,
            Ownership::Remote(w) => self.shared.pool.link(w)?.request(Command::Invoke(InvokeCall {
                target,
                method: method.to_string(),
                args: args.clone(),
            }))?,
        };
        if target == Target::Network && method == "connect" {
            for (_, link) in self.shared.pool.links() {
                link.request(Command::Invoke(InvokeCall {
                    target,
                    method: method.to_string(),
                    args: args.clone(),
                }))?;
            }
        }
        Ok(result)
    }

    pub fn invoke_node(&self, node: &NodeHandle, method: &str, args: Vec<String>) -> Result<Option<String>, DistError> {
        let mut net = lock(&self.shared.net);
        Ok(node.invoke(method, args, &self.shared.methods, &mut net, &self.shared.sched)?)
    }

    pub fn join(&self, group: &GroupHandle, node: NetId) -> Result<bool, DistError> {
        match group {
            GroupHandle::Local(id) => {
                let mut net = lock(&self.shared.net);
                Ok(net.join_group(*id, node, &self.shared.sched)?)
            }
            GroupHandle::Remote(p) => Ok(p.join(node)?),
        }
    }

    pub fn leave(&self, group: &GroupHandle, node: NetId) -> Result<bool, DistError> {
        match group {
            GroupHandle::Local(id) => {
                let mut net = lock(&self.shared.net);
                Ok(net.leave_group(*id, node, &self.shared.sched)?)
            }
            GroupHandle::Remote(p) => Ok(p.leave(node)?),
        }
    }

    pub fn members(&self, group: &GroupHandle) -> Result<Vec<NetId>, DistError> {
        match group {
            GroupHandle::Local(id) => Ok(lock(&self.shared.net).group_members(*id)?),
            GroupHandle::Remote(p) => Ok(p.members()?),
        }
    }

    /// 所有分区的送达包总数
    pub fn delivered_total(&self) -> Result<u64, DistError> {
        let mut total = self.stats().delivered_pkts;
        for (_, link) in self.shared.pool.links() {
            let reply = link.request(Command::Invoke(InvokeCall {
                target: Target::Network,
                method: "delivered_pkts".to_string(),
                args: Vec::new(),
            }))?;
            total += reply.as_deref().and_then(|s| s.parse().ok()).unwrap_or(0);
        }
        Ok(total)
    }

    /// 通知所有 worker 开始
    pub fn start(&self) -> Result<(), DistError> {
        self.shared.sched.start();
        for (_, link) in self.shared.pool.links() {
            link.request(Command::StartSimulation)?;
        }
        Ok(())
    }

    /// 运行时间线；`until` 为空时直到时间线耗尽
    pub fn run(&self, until: Option<SimTime>) -> Result<RunSummary, DistError> {
        let mut net = lock(&self.shared.net);
        let summary = match until {
            Some(t) => self.shared.sched.run_until(t, &mut *net)?,
            None => self.shared.sched.run(&mut *net)?,
        };
        Ok(summary)
    }

    /// 终止单个进程（本地或代理）
    pub fn terminate(&self, pid: Pid) -> Result<(), DistError> {
        Ok(self.shared.sched.terminate(pid)?)
    }

    /// 通知所有 worker 停止并断开
    pub fn stop(&self) {
        self.shared.sched.stop();
        for (id, link) in self.shared.pool.links() {
            if let Err(e) = link.request(Command::StopSimulation) {
                warn!(worker = %id, error = %e, "worker 未确认停止");
            }
            self.shared.pool.remove(id);
            link.close();
        }
        info!(now = %self.now(), "⏹️  仿真已停止");
    }
}
