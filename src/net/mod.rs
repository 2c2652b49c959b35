//! 网络模拟模块
//!
//! 此模块包含网络模拟的核心组件：节点、链路、数据包、组播组、
//! 路由表与可插拔的路由算法。

// 子模块声明
mod algorithm;
mod deliver_packet;
mod engine;
mod error;
mod group;
mod id;
mod link;
mod network;
mod node;
mod packet;
mod random;
mod routing;
mod source;
mod stats;

// 重新导出公共接口
pub use algorithm::{
    ControlMessage, EcmpMode, MembershipAnnounce, MulticastTree, RouteCtx, RouteUpdate,
    RoutingAlgorithm, ShortestPath, StaticRoutes, algorithm_by_name,
};
pub use deliver_packet::DeliverPacket;
pub use engine::{CONTROL_BYTES, CONTROL_TTL, RoutingEngine, Verdict};
pub use error::NetError;
pub use group::{Group, GroupKind, GroupTable};
pub use id::{LinkId, MULTICAST_BASE, NetId, NetIdAllocator};
pub use link::Link;
pub use network::{Network, RemoteSink, network_mut};
pub use node::{Host, Node, NodeKind, Router};
pub use packet::{Packet, PacketKind};
pub use random::{RandomStream, SplitMixStream};
pub use routing::RoutingTable;
pub use source::PacketSource;
pub use stats::Stats;
