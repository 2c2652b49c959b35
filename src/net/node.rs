//! 节点类型
//!
//! 定义网络节点，包括节点 trait 和具体实现（主机、路由器）。

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use super::engine::{RoutingEngine, Verdict};
use super::id::NetId;
use super::network::Network;
use super::packet::Packet;
use crate::sim::Scheduler;

/// 节点种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Host,
    Router,
}

/// 节点接口
pub trait Node: Send {
    /// 获取节点标识符
    fn id(&self) -> NetId;

    /// 获取节点名称
    fn name(&self) -> &str;

    fn kind(&self) -> NodeKind;

    /// 处理到达的数据包
    fn on_packet(&mut self, pkt: Packet, sched: &Scheduler, net: &mut Network);

    /// 发送一个本节点产生的数据包
    fn originate(&mut self, pkt: Packet, sched: &Scheduler, net: &mut Network);

    /// 已送达本节点的数据包
    fn inbox(&self) -> &[Packet];

    fn as_router_mut(&mut self) -> Option<&mut Router> {
        None
    }
}

/// 主机节点：不参与路由，也不递减 TTL；非本机的包交给上行链路。
#[derive(Debug)]
pub struct Host {
    id: NetId,
    name: String,
    inbox: Vec<Packet>,
}

impl Host {
    /// 创建新主机
    pub fn new(id: NetId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            inbox: Vec::new(),
        }
    }

    fn uplink(&self, pkt: Packet, sched: &Scheduler, net: &mut Network) {
        let Some(up) = net.neighbors(self.id).first().copied() else {
            debug!(host = %self.id, pkt_id = pkt.id, "主机没有上行链路，丢弃");
            net.stats.no_route_drops += 1;
            return;
        };
        if let Err(e) = net.forward_from(self.id, up, pkt, sched) {
            debug!(error = %e, "上行转发失败");
            net.stats.no_route_drops += 1;
        }
    }
}

impl Node for Host {
    fn id(&self) -> NetId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Host
    }

    #[tracing::instrument(skip(self, sched, net), fields(node_name = %self.name(), node_id = %self.id(), pkt_id = pkt.id))]
    fn on_packet(&mut self, pkt: Packet, sched: &Scheduler, net: &mut Network) {
        debug!("🖥️  Host 处理数据包");
        trace!(src = %pkt.src, dst = %pkt.dst, ttl = pkt.ttl, "数据包信息");

        if pkt.kind.is_control() {
            trace!("主机忽略控制包");
            return;
        }
        // 路由器只把组播数据交给组成员
        if pkt.dst == self.id || pkt.is_multicast() {
            info!("已到达目的地，标记为已送达");
            net.on_delivered(self.id, &pkt);
            self.inbox.push(pkt);
        } else {
            debug!("未到达目的地，继续转发");
            self.uplink(pkt, sched, net);
        }
    }

    fn originate(&mut self, pkt: Packet, sched: &Scheduler, net: &mut Network) {
        if pkt.dst == self.id {
            net.on_delivered(self.id, &pkt);
            self.inbox.push(pkt);
            return;
        }
        self.uplink(pkt, sched, net);
    }

    fn inbox(&self) -> &[Packet] {
        &self.inbox
    }
}

/// 路由器节点
pub struct Router {
    id: NetId,
    name: String,
    pub engine: RoutingEngine,
    inbox: Vec<Packet>,
}

impl Router {
    pub fn new(id: NetId, name: impl Into<String>, engine: RoutingEngine) -> Self {
        Self {
            id,
            name: name.into(),
            engine,
            inbox: Vec::new(),
        }
    }

    fn settle(&mut self, verdict: Verdict, net: &mut Network) {
        if let Verdict::Delivered(pkt) = verdict {
            info!("已到达目的路由器");
            net.on_delivered(self.id, &pkt);
            self.inbox.push(pkt);
        } else {
            trace!(?verdict, "路由结果");
        }
    }
}

impl Node for Router {
    fn id(&self) -> NetId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Router
    }

    #[tracing::instrument(skip(self, sched, net), fields(node_name = %self.name(), node_id = %self.id(), pkt_id = pkt.id))]
    fn on_packet(&mut self, pkt: Packet, sched: &Scheduler, net: &mut Network) {
        debug!("🔀 Router 处理数据包");
        let verdict = self.engine.on_arrival(self.id, pkt, sched, net);
        self.settle(verdict, net);
    }

    fn originate(&mut self, pkt: Packet, sched: &Scheduler, net: &mut Network) {
        let verdict = self.engine.originate(self.id, pkt, sched, net);
        self.settle(verdict, net);
    }

    fn inbox(&self) -> &[Packet] {
        &self.inbox
    }

    fn as_router_mut(&mut self) -> Option<&mut Router> {
        Some(self)
    }
}
