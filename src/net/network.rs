//! 网络拓扑管理
//!
//! 一个分区内的网络：本地节点、链路、路由表、组表与统计信息。
//! 链路表保存的是全局拓扑（manager 会把每条链路广播给所有分区），
//! 因此路由表可以在本地算出跨分区的最短路径；下一跳不在本分区时，
//! 数据包交给 `RemoteSink` 送往拥有该节点的分区。

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

use super::algorithm::RouteCtx;
use super::deliver_packet::DeliverPacket;
use super::engine::RoutingEngine;
use super::error::NetError;
use super::group::{GroupKind, GroupTable};
use super::id::{LinkId, NetId};
use super::link::Link;
use super::node::{Host, Node, NodeKind, Router};
use super::packet::Packet;
use super::routing::RoutingTable;
use super::stats::Stats;
use crate::sim::{Pid, SchedError, Scheduler, SimTime, World};

/// 跨分区的数据包出口
pub trait RemoteSink: Send + Sync {
    /// `sent_at + relative` 为到达 `to` 的绝对时刻
    fn packet_arrival(&self, to: NetId, sent_at: SimTime, relative: SimTime, pkt: Packet);
}

/// 一个分区的网络
pub struct Network {
    issuer: u32,
    nodes: BTreeMap<NetId, Option<Box<dyn Node>>>,
    links: Vec<Link>,
    edges: HashMap<(NetId, NetId), LinkId>,
    adj: BTreeMap<NetId, Vec<NetId>>,
    pub routes: RoutingTable,
    pub groups: GroupTable,
    pkt_seq: u64,
    pub stats: Stats,
    remote: Option<Arc<dyn RemoteSink>>,
}

impl Default for Network {
    fn default() -> Self {
        Self::new(0)
    }
}

impl World for Network {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// 从调度世界中取出网络
pub fn network_mut(world: &mut dyn World) -> &mut Network {
    world
        .as_any_mut()
        .downcast_mut::<Network>()
        .expect("world must be Network")
}

impl Network {
    pub fn new(issuer: u32) -> Self {
        Self {
            issuer,
            nodes: BTreeMap::new(),
            links: Vec::new(),
            edges: HashMap::new(),
            adj: BTreeMap::new(),
            routes: RoutingTable::new(issuer as u64),
            groups: GroupTable::default(),
            pkt_seq: 0,
            stats: Stats::default(),
            remote: None,
        }
    }

    /// packet id 的高位是分区编号
    pub fn set_issuer(&mut self, issuer: u32) {
        self.issuer = issuer;
    }

    pub fn set_remote(&mut self, sink: Arc<dyn RemoteSink>) {
        self.remote = Some(sink);
    }

    fn insert_node(&mut self, id: NetId, node: Box<dyn Node>) -> Result<(), NetError> {
        if id.is_multicast() {
            return Err(NetError::NotUnicast(id));
        }
        if self.nodes.contains_key(&id) {
            return Err(NetError::DuplicateNode(id));
        }
        self.nodes.insert(id, Some(node));
        self.adj.entry(id).or_default();
        self.routes.mark_dirty();
        Ok(())
    }

    /// 添加主机节点
    pub fn add_host(&mut self, id: NetId, name: impl Into<String>) -> Result<(), NetError> {
        self.insert_node(id, Box::new(Host::new(id, name)))
    }

    /// 添加路由器节点
    pub fn add_router(
        &mut self,
        id: NetId,
        name: impl Into<String>,
        engine: RoutingEngine,
    ) -> Result<(), NetError> {
        self.insert_node(id, Box::new(Router::new(id, name, engine)))
    }

    pub fn contains_node(&self, id: NetId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_ids(&self) -> Vec<NetId> {
        self.nodes.keys().copied().collect()
    }

    fn node(&self, id: NetId) -> Option<&dyn Node> {
        self.nodes.get(&id).and_then(|n| n.as_deref())
    }

    pub fn node_name(&self, id: NetId) -> Option<&str> {
        self.node(id).map(|n| n.name())
    }

    pub fn node_kind(&self, id: NetId) -> Option<NodeKind> {
        self.node(id).map(|n| n.kind())
    }

    pub fn inbox(&self, id: NetId) -> Option<&[Packet]> {
        self.node(id).map(|n| n.inbox())
    }

    /// 路由器的 (单播, 组播) 算法名；不是路由器时为 None
    pub fn router_algorithms(&mut self, id: NetId) -> Option<(String, String)> {
        let router = self.nodes.get_mut(&id)?.as_deref_mut()?.as_router_mut()?;
        Some((
            router.engine.unicast_name().to_string(),
            router.engine.multicast_name().to_string(),
        ))
    }

    /// 连接两个节点（创建单向链路）；重复连接会替换原链路参数。
    pub fn connect(&mut self, from: NetId, to: NetId, latency: SimTime, bandwidth_bps: u64) -> LinkId {
        let link = Link::new(from, to, latency, bandwidth_bps);
        if let Some(id) = self.edges.get(&(from, to)).copied() {
            self.links[id.0] = link;
            return id;
        }
        let id = LinkId(self.links.len());
        self.links.push(link);
        self.edges.insert((from, to), id);
        let nbrs = self.adj.entry(from).or_default();
        nbrs.push(to);
        self.adj.entry(to).or_default();
        self.routes.mark_dirty();
        id
    }

    pub fn link(&self, from: NetId, to: NetId) -> Option<&Link> {
        self.edges.get(&(from, to)).map(|id| &self.links[id.0])
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn neighbors(&self, id: NetId) -> &[NetId] {
        self.adj.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 相邻路由器；不在本分区的邻居也算在内（由对端分区决定如何处理）。
    pub fn peer_routers(&self, id: NetId) -> Vec<NetId> {
        self.neighbors(id)
            .iter()
            .copied()
            .filter(|n| match self.node_kind(*n) {
                Some(kind) => kind == NodeKind::Router,
                None => !self.nodes.contains_key(n),
            })
            .collect()
    }

    pub fn rebuild_routes(&mut self) {
        self.routes.mark_dirty();
        self.routes.ensure_built(&self.adj);
    }

    pub(crate) fn route_ctx(&mut self, router: NetId) -> RouteCtx<'_> {
        self.routes.ensure_built(&self.adj);
        let peer_routers = self.peer_routers(router);
        RouteCtx {
            router,
            table: &mut self.routes,
            groups: &self.groups,
            peer_routers,
        }
    }

    /// 创建数据包
    pub fn make_packet(&mut self, src: NetId, dst: NetId, size_bytes: u32, ttl: u8) -> Packet {
        self.pkt_seq = self.pkt_seq.wrapping_add(1);
        let id = ((self.issuer as u64) << 40) | self.pkt_seq;
        Packet::new(id, src, dst, size_bytes, ttl)
    }

    /// 暂时把节点取出来，避免 &mut self 与 &mut node 的重叠借用。
    fn with_node<R>(&mut self, id: NetId, f: impl FnOnce(&mut dyn Node, &mut Network) -> R) -> Option<R> {
        let mut node = self.nodes.get_mut(&id)?.take()?;
        let r = f(node.as_mut(), self);
        if let Some(slot) = self.nodes.get_mut(&id) {
            *slot = Some(node);
        }
        Some(r)
    }

    /// 从本地节点 `src` 发送一个新包，返回 packet id。
    pub fn send(
        &mut self,
        src: NetId,
        dst: NetId,
        size_bytes: u32,
        ttl: u8,
        sched: &Scheduler,
    ) -> Result<u64, NetError> {
        if !self.contains_node(src) {
            return Err(NetError::UnknownNode(src));
        }
        let pkt = self.make_packet(src, dst, size_bytes, ttl);
        let id = pkt.id;
        debug!(pkt_id = id, %src, %dst, size_bytes, ttl, "📤 发送数据包");
        self.with_node(src, |node, net| node.originate(pkt, sched, net));
        Ok(id)
    }

    /// 将数据包交付给节点处理
    #[tracing::instrument(skip(self, sched), fields(pkt_id = pkt.id, to = %to))]
    pub fn deliver(&mut self, to: NetId, pkt: Packet, sched: &Scheduler) {
        debug!("📬 将数据包交付给节点处理");
        if self.contains_node(to) {
            if self.with_node(to, |node, net| node.on_packet(pkt, sched, net)).is_none() {
                error!("节点正在处理另一个包，无法重入");
            }
            return;
        }
        // 不在本分区：立即交给对端
        self.hand_off(to, sched.now(), SimTime::ZERO, pkt);
    }

    fn hand_off(&mut self, to: NetId, sent_at: SimTime, relative: SimTime, pkt: Packet) {
        match &self.remote {
            Some(sink) => {
                trace!(%to, %relative, "交给远程分区");
                self.stats.remote_out += 1;
                sink.packet_arrival(to, sent_at, relative, pkt);
            }
            None => {
                warn!(%to, pkt_id = pkt.id, "目的节点不在本分区且没有远程出口，丢弃");
                self.stats.no_route_drops += 1;
            }
        }
    }

    /// 沿链路 `from -> to` 发送，调度到达事件。
    #[tracing::instrument(skip(self, sched), fields(pkt_id = pkt.id, from = %from, to = %to))]
    pub fn forward_from(
        &mut self,
        from: NetId,
        to: NetId,
        pkt: Packet,
        sched: &Scheduler,
    ) -> Result<(), NetError> {
        let link_id = *self
            .edges
            .get(&(from, to))
            .ok_or(NetError::NoLink { from, to })?;
        let now = sched.now();
        let link = &mut self.links[link_id.0];
        let arrive = link.transmit(now, pkt.size_bytes);
        trace!(%now, %arrive, latency = %link.latency, "计算传输时间");
        self.stats.forwarded_pkts += 1;

        if self.contains_node(to) {
            debug!(%arrive, "🚀 调度数据包到达");
            if let Err(e) = sched.spawn(Box::new(DeliverPacket::new(to, pkt)), arrive) {
                error!(error = %e, "无法调度数据包到达");
            }
        } else {
            self.hand_off(to, now, arrive.since(now), pkt);
        }
        Ok(())
    }

    /// 接收其它分区送来的包，在 `at` 交付
    pub fn accept_remote(
        &mut self,
        to: NetId,
        at: SimTime,
        pkt: Packet,
        sched: &Scheduler,
    ) -> Result<Pid, SchedError> {
        self.stats.remote_in += 1;
        sched.spawn(Box::new(DeliverPacket::new(to, pkt)), at)
    }

    /// 数据包送达目的地时的处理
    pub(crate) fn on_delivered(&mut self, at: NetId, pkt: &Packet) {
        info!(pkt_id = pkt.id, node = %at, "✅ 数据包送达目的地");
        self.stats.delivered_pkts += 1;
        self.stats.delivered_bytes += pkt.size_bytes as u64;
        trace!(delivered_pkts = self.stats.delivered_pkts, "更新统计信息");
    }

    pub fn create_group(&mut self, id: NetId, kind: GroupKind) -> Result<(), NetError> {
        if let GroupKind::RouterAware { router } = kind {
            if self.node_kind(router) != Some(NodeKind::Router) {
                return Err(NetError::NotARouter(router));
            }
        }
        self.groups.create(id, kind)?;
        debug!(group = %id, ?kind, "创建组播组");
        Ok(())
    }

    pub fn group_members(&self, id: NetId) -> Result<Vec<NetId>, NetError> {
        self.groups
            .members(id)
            .map(<[NetId]>::to_vec)
            .ok_or(NetError::UnknownGroup(id))
    }

    /// 加入组；成员已存在时返回 false 且不通知路由器。
    pub fn join_group(&mut self, group: NetId, member: NetId, sched: &Scheduler) -> Result<bool, NetError> {
        let changed = self.groups.join(group, member)?;
        if changed {
            self.notify_router(group, member, true, sched);
        }
        Ok(changed)
    }

    /// 离开组；不是成员时返回 false。
    pub fn leave_group(&mut self, group: NetId, member: NetId, sched: &Scheduler) -> Result<bool, NetError> {
        let changed = self.groups.leave(group, member)?;
        if changed {
            self.notify_router(group, member, false, sched);
        }
        Ok(changed)
    }

    fn notify_router(&mut self, group: NetId, member: NetId, joined: bool, sched: &Scheduler) {
        let Some(GroupKind::RouterAware { router }) = self.groups.get(group).map(|g| g.kind()) else {
            return;
        };
        let notified = self.with_node(router, |node, net| {
            if let Some(r) = node.as_router_mut() {
                r.engine
                    .notify_membership(router, group, member, joined, sched, net);
            }
        });
        if notified.is_none() {
            warn!(%router, %group, "组所属路由器不在本分区");
        }
    }
}
