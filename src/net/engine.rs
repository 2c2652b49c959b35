//! 路由引擎
//!
//! 数据包到达路由器时：
//! 1. TTL 已为 0 则直接丢弃，不调用路由算法；否则 TTL 减一（每跳恰好一次）；
//! 2. 发给本路由器的控制包交给算法的 `handle_control_packet`；
//! 3. 按目的地址区分单播/组播，询问对应算法的下一跳：
//!    0 个静默丢弃，1 个转发原包，多个则每跳一份独立副本。
//!
//! 复制顺序与算法返回的顺序一致，不另做排序。

use tracing::{debug, trace, warn};

use super::algorithm::{ControlMessage, RoutingAlgorithm};
use super::id::NetId;
use super::network::Network;
use super::packet::{Packet, PacketKind};
use crate::sim::Scheduler;

/// 控制包大小（字节）
pub const CONTROL_BYTES: u32 = 64;
/// 控制包初始 TTL
pub const CONTROL_TTL: u8 = 16;

/// 一次路由决策的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    TtlExpired,
    NoRoute,
    Control,
    Delivered(Packet),
    Forwarded(NetId),
    Replicated(Vec<NetId>),
}

/// 路由器持有的引擎：一个单播算法、一个组播算法。
pub struct RoutingEngine {
    unicast: Box<dyn RoutingAlgorithm>,
    multicast: Box<dyn RoutingAlgorithm>,
}

impl RoutingEngine {
    pub fn new(unicast: Box<dyn RoutingAlgorithm>, multicast: Box<dyn RoutingAlgorithm>) -> Self {
        Self { unicast, multicast }
    }

    pub fn unicast_name(&self) -> &str {
        self.unicast.name()
    }

    pub fn multicast_name(&self) -> &str {
        self.multicast.name()
    }

    /// 入口处理：TTL 检查与递减，然后路由。
    #[tracing::instrument(skip(self, pkt, sched, net), fields(pkt_id = pkt.id, ttl = pkt.ttl))]
    pub fn on_arrival(
        &mut self,
        router: NetId,
        mut pkt: Packet,
        sched: &Scheduler,
        net: &mut Network,
    ) -> Verdict {
        if pkt.ttl == 0 {
            debug!("⌛ TTL 耗尽，丢弃");
            net.stats.ttl_drops += 1;
            return Verdict::TtlExpired;
        }
        pkt.ttl -= 1;
        self.route(router, pkt, sched, net)
    }

    /// 本路由器产生的包，不经过入口 TTL 处理。
    pub fn originate(&mut self, router: NetId, pkt: Packet, sched: &Scheduler, net: &mut Network) -> Verdict {
        self.route(router, pkt, sched, net)
    }

    fn route(&mut self, router: NetId, mut pkt: Packet, sched: &Scheduler, net: &mut Network) -> Verdict {
        let control_for_me = match pkt.kind {
            PacketKind::Data => false,
            PacketKind::UnicastControl => pkt.dst == router,
            PacketKind::MulticastControl => true,
        };
        if control_for_me {
            net.stats.control_pkts += 1;
            let out = {
                let mut ctx = net.route_ctx(router);
                let alg = if pkt.kind == PacketKind::MulticastControl {
                    &mut self.multicast
                } else {
                    &mut self.unicast
                };
                alg.handle_control_packet(&mut ctx, pkt)
            };
            self.emit(router, out, sched, net);
            return Verdict::Control;
        }

        if !pkt.is_multicast() && pkt.dst == router {
            return Verdict::Delivered(pkt);
        }

        let hops = {
            let mut ctx = net.route_ctx(router);
            if pkt.is_multicast() {
                self.multicast.next_hops(&mut ctx, &pkt)
            } else {
                self.unicast.next_hops(&mut ctx, &pkt)
            }
        };
        trace!(?hops, "下一跳");

        match hops.as_slice() {
            [] => {
                debug!(dst = %pkt.dst, "没有下一跳，静默丢弃");
                net.stats.no_route_drops += 1;
                Verdict::NoRoute
            }
            [hop] => {
                let hop = *hop;
                pkt.src = router;
                Self::forward(router, hop, pkt, sched, net);
                Verdict::Forwarded(hop)
            }
            many => {
                // 副本沿用入口递减后的 TTL，保证每跳只减一次
                for hop in many {
                    Self::forward(router, *hop, pkt.replicate_from(router), sched, net);
                }
                net.stats.replicated_pkts += many.len() as u64;
                debug!(copies = many.len(), "组播复制");
                Verdict::Replicated(many.to_vec())
            }
        }
    }

    fn forward(router: NetId, hop: NetId, pkt: Packet, sched: &Scheduler, net: &mut Network) {
        if let Err(e) = net.forward_from(router, hop, pkt, sched) {
            warn!(error = %e, "转发失败，丢弃");
            net.stats.no_route_drops += 1;
        }
    }

    /// 发送算法产生的控制消息；它们作为未来事件到达，不在此处内联执行。
    fn emit(&mut self, router: NetId, msgs: Vec<ControlMessage>, sched: &Scheduler, net: &mut Network) {
        for m in msgs {
            let pkt = net
                .make_packet(router, m.dst, CONTROL_BYTES, CONTROL_TTL)
                .with_kind(m.kind)
                .with_payload(m.payload);
            Self::forward(router, m.via, pkt, sched, net);
        }
    }

    /// 路由器感知组的成员变化通知
    pub fn notify_membership(
        &mut self,
        router: NetId,
        group: NetId,
        member: NetId,
        joined: bool,
        sched: &Scheduler,
        net: &mut Network,
    ) {
        let out = {
            let mut ctx = net.route_ctx(router);
            self.multicast.on_membership_change(&mut ctx, group, member, joined)
        };
        debug!(%router, %group, %member, joined, messages = out.len(), "组成员变化已通知路由器");
        self.emit(router, out, sched, net);
    }
}
