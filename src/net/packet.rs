//! 数据包类型
//!
//! 定义网络数据包及其相关操作。

use serde::{Deserialize, Serialize};

use super::id::NetId;

/// 数据包类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketKind {
    Data,
    /// 发给某个路由器自身的控制包
    UnicastControl,
    /// 发往组播组、由沿途路由器处理的控制包
    MulticastControl,
}

impl PacketKind {
    pub fn is_control(self) -> bool {
        !matches!(self, PacketKind::Data)
    }

    /// 跨进程传输时使用的类别名
    pub fn class_name(self) -> &'static str {
        match self {
            PacketKind::Data => "data",
            PacketKind::UnicastControl => "unicast_control",
            PacketKind::MulticastControl => "multicast_control",
        }
    }
}

/// 网络数据包
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub id: u64,
    pub src: NetId,
    /// 单播节点 id 或组播组 id
    pub dst: NetId,
    pub kind: PacketKind,
    pub size_bytes: u32,
    /// 剩余跳数，每经过一个路由器减一
    pub ttl: u8,
    #[serde(default)]
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(id: u64, src: NetId, dst: NetId, size_bytes: u32, ttl: u8) -> Self {
        Self {
            id,
            src,
            dst,
            kind: PacketKind::Data,
            size_bytes,
            ttl,
            payload: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: PacketKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn is_multicast(&self) -> bool {
        self.dst.is_multicast()
    }

    /// 为下一跳生成一份独立副本：payload 深拷贝，源地址改写为转发路由器。
    pub fn replicate_from(&self, router: NetId) -> Packet {
        Packet {
            src: router,
            ..self.clone()
        }
    }
}
