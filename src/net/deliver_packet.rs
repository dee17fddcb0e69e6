//! 数据包交付事件
//!
//! 定义网络模拟中的数据包交付事件（传播时延结束，包抵达下游节点入口）。

use super::id::NodeId;
use super::net_world::NetWorld;
use super::packet::Packet;
use crate::sim::{Event, Simulator, World};
use tracing::trace;

/// 事件：把一个 packet 交给某个节点处理。
#[derive(Debug)]
pub struct DeliverPacket {
    pub to: NodeId,
    pub pkt: Packet,
}

impl Event for DeliverPacket {
    #[tracing::instrument(skip(self, sim, world), fields(pkt_id = self.pkt.id, flow_id = self.pkt.flow_id, to = ?self.to))]
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let DeliverPacket { to, pkt } = *self;

        trace!(now = ?sim.now(), "📨 数据包到达节点");

        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        w.net.deliver(to, pkt, sim);
    }
}
