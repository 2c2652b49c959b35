//! 数据包交付进程
//!
//! 链路到达被建模为一个一次性的仿真进程：在到达时刻被恢复，把包交给节点后结束。

use super::id::NetId;
use super::network::network_mut;
use super::packet::Packet;
use crate::sim::{Process, ProcessCtx, Suspend};
use tracing::{debug, trace};

/// 把一个 packet 交给某个节点处理。
#[derive(Debug)]
pub struct DeliverPacket {
    to: NetId,
    pkt: Option<Packet>,
}

impl DeliverPacket {
    pub fn new(to: NetId, pkt: Packet) -> Self {
        Self { to, pkt: Some(pkt) }
    }
}

impl Process for DeliverPacket {
    fn name(&self) -> &str {
        "deliver_packet"
    }

    #[tracing::instrument(skip(self, ctx), fields(to = %self.to, pid = %ctx.pid))]
    fn resume(&mut self, ctx: &mut ProcessCtx<'_>) -> Suspend {
        if let Some(pkt) = self.pkt.take() {
            debug!(pkt_id = pkt.id, now = %ctx.now(), "📨 数据包到达节点");
            let sched = ctx.sched;
            network_mut(&mut *ctx.world).deliver(self.to, pkt, sched);
        }
        trace!("DeliverPacket 完成");
        Suspend::Finish
    }
}
