//! 流量源进程：按固定间隔从一个节点发包。

use super::id::NetId;
use super::network::network_mut;
use crate::sim::{Process, ProcessCtx, SimTime, Suspend};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct PacketSource {
    pub src: NetId,
    pub dst: NetId,
    pub remaining: u64,
    pub gap: SimTime,
    pub size_bytes: u32,
    pub ttl: u8,
}

impl Process for PacketSource {
    fn name(&self) -> &str {
        "packet_source"
    }

    fn resume(&mut self, ctx: &mut ProcessCtx<'_>) -> Suspend {
        if self.remaining == 0 {
            return Suspend::Finish;
        }
        let sched = ctx.sched;
        let net = network_mut(&mut *ctx.world);
        if let Err(e) = net.send(self.src, self.dst, self.size_bytes, self.ttl, sched) {
            warn!(error = %e, src = %self.src, "流量源无法发包");
            return Suspend::Finish;
        }
        self.remaining -= 1;
        if self.remaining > 0 {
            Suspend::Sleep(self.gap)
        } else {
            Suspend::Finish
        }
    }
}
