//! 可插拔的路由算法
//!
//! 路由引擎只通过 `RoutingAlgorithm` 询问下一跳；表维护协议通过控制包
//! （`handle_control_packet`）和组成员变化通知（`on_membership_change`）驱动，
//! 它们产生的控制消息由引擎作为普通的未来事件发送，不会在调用点内联执行。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::NetError;
use super::group::GroupTable;
use super::id::NetId;
use super::packet::{Packet, PacketKind};
use super::random::{RandomStream, SplitMixStream};
use super::routing::RoutingTable;

/// 路由算法可见的上下文
pub struct RouteCtx<'a> {
    pub router: NetId,
    pub table: &'a mut RoutingTable,
    pub groups: &'a GroupTable,
    /// 相邻的路由器（控制消息扩散用）
    pub peer_routers: Vec<NetId>,
}

/// 算法要求引擎发出的控制消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    /// 第一跳
    pub via: NetId,
    pub dst: NetId,
    pub kind: PacketKind,
    pub payload: Vec<u8>,
}

/// 单播控制包载荷：安装一条路由
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteUpdate {
    pub dst: NetId,
    pub hops: Vec<NetId>,
}

/// 组播控制包载荷：成员变化通告
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipAnnounce {
    pub group: NetId,
    pub member: NetId,
    pub joined: bool,
}

pub trait RoutingAlgorithm: Send {
    fn name(&self) -> &str;

    /// 计算下一跳；空表示丢弃。
    fn next_hops(&mut self, ctx: &mut RouteCtx<'_>, pkt: &Packet) -> Vec<NetId>;

    fn handle_control_packet(&mut self, _ctx: &mut RouteCtx<'_>, _pkt: Packet) -> Vec<ControlMessage> {
        Vec::new()
    }

    fn on_membership_change(
        &mut self,
        _ctx: &mut RouteCtx<'_>,
        _group: NetId,
        _member: NetId,
        _joined: bool,
    ) -> Vec<ControlMessage> {
        Vec::new()
    }
}

fn install_route(ctx: &mut RouteCtx<'_>, pkt: &Packet) {
    match serde_json::from_slice::<RouteUpdate>(&pkt.payload) {
        Ok(update) => {
            debug!(router = %ctx.router, dst = %update.dst, hops = ?update.hops, "安装路由");
            ctx.table.insert(ctx.router, update.dst, update.hops);
        }
        Err(e) => warn!(router = %ctx.router, pkt_id = pkt.id, error = %e, "无法解析路由更新"),
    }
}

/// ECMP 候选的选择方式
pub enum EcmpMode {
    /// 按 packet id 做稳定 hash
    Hash,
    /// 由外部随机流决定
    Random(Box<dyn RandomStream>),
}

/// 最短跳数单播路由
pub struct ShortestPath {
    ecmp: EcmpMode,
}

impl ShortestPath {
    pub fn new(ecmp: EcmpMode) -> Self {
        Self { ecmp }
    }
}

impl Default for ShortestPath {
    fn default() -> Self {
        Self::new(EcmpMode::Hash)
    }
}

impl RoutingAlgorithm for ShortestPath {
    fn name(&self) -> &str {
        "shortest_path"
    }

    fn next_hops(&mut self, ctx: &mut RouteCtx<'_>, pkt: &Packet) -> Vec<NetId> {
        let Some(cands) = ctx.table.next_hops(ctx.router, pkt.dst) else {
            return Vec::new();
        };
        if cands.len() == 1 {
            return vec![cands[0]];
        }
        let hop = match &mut self.ecmp {
            EcmpMode::Hash => ctx.table.pick_ecmp_with_key(ctx.router, pkt.dst, pkt.id, cands),
            EcmpMode::Random(stream) => {
                let idx = (stream.next_number() * cands.len() as f64) as usize;
                cands[idx.min(cands.len() - 1)]
            }
        };
        vec![hop]
    }

    fn handle_control_packet(&mut self, ctx: &mut RouteCtx<'_>, pkt: Packet) -> Vec<ControlMessage> {
        install_route(ctx, &pkt);
        Vec::new()
    }
}

/// 只使用显式安装的路由；一个键对应多个下一跳时即组播复制。
#[derive(Debug, Default)]
pub struct StaticRoutes;

impl RoutingAlgorithm for StaticRoutes {
    fn name(&self) -> &str {
        "static"
    }

    fn next_hops(&mut self, ctx: &mut RouteCtx<'_>, pkt: &Packet) -> Vec<NetId> {
        ctx.table
            .pinned_hops(ctx.router, pkt.dst)
            .map(<[NetId]>::to_vec)
            .unwrap_or_default()
    }

    fn handle_control_packet(&mut self, ctx: &mut RouteCtx<'_>, pkt: Packet) -> Vec<ControlMessage> {
        install_route(ctx, &pkt);
        Vec::new()
    }
}

/// 基于最短路径树的组播：对每个成员取朝向它的下一跳，去重后复制。
///
/// 只有当本路由器位于上一跳到该成员的路径上时才负责该成员，避免重复投递。
/// 组不在本地组表中时，使用通过组播控制通告学到的成员。
#[derive(Debug, Default)]
pub struct MulticastTree {
    learned: BTreeMap<NetId, Vec<NetId>>,
}

impl MulticastTree {
    pub fn learned_members(&self, group: NetId) -> &[NetId] {
        self.learned.get(&group).map(Vec::as_slice).unwrap_or(&[])
    }

    fn learn(&mut self, group: NetId, member: NetId, joined: bool) -> bool {
        let members = self.learned.entry(group).or_default();
        let known = members.contains(&member);
        match (joined, known) {
            (true, false) => {
                members.push(member);
                true
            }
            (false, true) => {
                members.retain(|m| *m != member);
                true
            }
            _ => false,
        }
    }

    fn pick(ctx: &RouteCtx<'_>, from: NetId, member: NetId, group: NetId) -> Option<NetId> {
        let cands = ctx.table.next_hops(from, member)?;
        Some(ctx.table.pick_ecmp_with_key(from, member, group.0 as u64, cands))
    }

    fn flood(ctx: &RouteCtx<'_>, except: Option<NetId>, announce: &MembershipAnnounce) -> Vec<ControlMessage> {
        let payload = match serde_json::to_vec(announce) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "无法编码成员通告");
                return Vec::new();
            }
        };
        ctx.peer_routers
            .iter()
            .copied()
            .filter(|r| Some(*r) != except)
            .map(|via| ControlMessage {
                via,
                dst: announce.group,
                kind: PacketKind::MulticastControl,
                payload: payload.clone(),
            })
            .collect()
    }
}

impl RoutingAlgorithm for MulticastTree {
    fn name(&self) -> &str {
        "multicast_tree"
    }

    fn next_hops(&mut self, ctx: &mut RouteCtx<'_>, pkt: &Packet) -> Vec<NetId> {
        let group = pkt.dst;
        let members: Vec<NetId> = match ctx.groups.members(group) {
            Some(m) => m.to_vec(),
            None => self.learned_members(group).to_vec(),
        };

        let mut hops = Vec::new();
        for member in members {
            if member == ctx.router {
                continue;
            }
            // 上一跳到该成员的路径不经过本路由器时，由别的分支负责
            if let Some(prev_choice) = Self::pick(ctx, pkt.src, member, group) {
                if prev_choice != ctx.router {
                    continue;
                }
            }
            let Some(hop) = Self::pick(ctx, ctx.router, member, group) else {
                continue;
            };
            if hop != pkt.src && !hops.contains(&hop) {
                hops.push(hop);
            }
        }
        hops
    }

    fn handle_control_packet(&mut self, ctx: &mut RouteCtx<'_>, pkt: Packet) -> Vec<ControlMessage> {
        let announce = match serde_json::from_slice::<MembershipAnnounce>(&pkt.payload) {
            Ok(a) => a,
            Err(e) => {
                warn!(router = %ctx.router, pkt_id = pkt.id, error = %e, "无法解析成员通告");
                return Vec::new();
            }
        };
        if !self.learn(announce.group, announce.member, announce.joined) {
            return Vec::new();
        }
        debug!(router = %ctx.router, group = %announce.group, member = %announce.member, joined = announce.joined, "学到组成员变化");
        Self::flood(ctx, Some(pkt.src), &announce)
    }

    fn on_membership_change(
        &mut self,
        ctx: &mut RouteCtx<'_>,
        group: NetId,
        member: NetId,
        joined: bool,
    ) -> Vec<ControlMessage> {
        self.learn(group, member, joined);
        Self::flood(ctx, None, &MembershipAnnounce { group, member, joined })
    }
}

/// 按名字构造算法（用于 create 命令与场景配置）
pub fn algorithm_by_name(name: &str, seed: u64) -> Result<Box<dyn RoutingAlgorithm>, NetError> {
    match name {
        "shortest_path" => Ok(Box::new(ShortestPath::default())),
        "ecmp_random" => Ok(Box::new(ShortestPath::new(EcmpMode::Random(Box::new(
            SplitMixStream::new(seed),
        ))))),
        "multicast_tree" => Ok(Box::new(MulticastTree::default())),
        "static" => Ok(Box::new(StaticRoutes)),
        other => Err(NetError::UnknownAlgorithm(other.to_string())),
    }
}
