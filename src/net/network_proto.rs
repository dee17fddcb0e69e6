//! 网络层到传输层的分发挂钩

use crate::sim::Simulator;
use crate::trace::PacketEvent;
use tracing::debug;

use super::{Network, NodeId, Packet, Transport};

impl Network {
    /// 数据包送达目的地时的处理
    #[tracing::instrument(skip(self, sim), fields(pkt_id = pkt.id, flow_id = pkt.flow_id))]
    pub(crate) fn on_delivered(&mut self, at: NodeId, pkt: Packet, sim: &mut Simulator) {
        debug!("✅ 数据包送达目的地");

        let ev = PacketEvent {
            t: sim.now(),
            flow_id: pkt.flow_id,
            pkt_id: pkt.id,
            size_bytes: pkt.size_bytes,
            sent_at: pkt.sent_at,
            queue_bytes: 0,
        };
        self.emit_receive(&ev);

        // 传输层处理（TCP：目的端产生 ACK、源端处理 ACK 驱动继续发送）。
        // UDP 只计入统计，没有传输层响应。
        if let Transport::Tcp(seg) = pkt.transport {
            let conn_id = pkt.flow_id;
            // 规避同时借用 `self` 与 `self.tcp`
            let mut tcp = std::mem::take(&mut self.tcp);
            tcp.on_tcp_segment(conn_id, at, seg, sim, self);
            self.tcp = tcp;
        }
    }
}
