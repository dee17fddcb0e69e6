//! 网络拓扑管理
//!
//! 定义网络拓扑结构，包含节点、链路、静态路由、存储转发与统计挂钩。
//!
//! 转发模型：packet 先进入出口链路的队列（RED/DropTail 准入判定在这里发生），
//! 链路空闲时出队开始序列化；序列化结束时刻触发 `LinkReady` 驱动下一个出队，
//! 并在再经过一个传播时延后由 `DeliverPacket` 把包交给下游节点。

use std::collections::HashMap;

use super::deliver_packet::DeliverPacket;
use super::id::{LinkId, NodeId};
use super::link::Link;
use super::link_ready::LinkReady;
use super::node::{Host, Node, Router};
use super::packet::Packet;
use super::routing::RoutingTable;
use crate::app::AppSet;
use crate::proto::tcp::TcpStack;
use crate::queue::PacketQueue;
use crate::sim::{SimTime, Simulator};
use crate::trace::{PacketEvent, StatsCollector, TraceLogger, TraceSink};
use tracing::{debug, trace};

/// 网络拓扑
#[derive(Default)]
pub struct Network {
    nodes: Vec<Option<Box<dyn Node>>>,
    links: Vec<Link>,
    edges: HashMap<(NodeId, NodeId), LinkId>,
    adj: Vec<Vec<NodeId>>,
    rev_adj: Vec<Vec<NodeId>>,
    routing: RoutingTable,
    next_pkt_id: u64,
    /// 内建的每流统计收集器
    pub stats: StatsCollector,
    /// 可选的逐包 trace 记录器（由调用方落盘为 JSON）
    pub trace: Option<TraceLogger>,
    /// 可选的外部观测 sink
    pub sink: Option<Box<dyn TraceSink>>,
    pub tcp: TcpStack,
    pub apps: AppSet,
}

impl Network {
    /// 添加主机节点
    pub fn add_host(&mut self, name: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Box::new(Host::new(id, name))));
        self.adj.push(Vec::new());
        self.rev_adj.push(Vec::new());
        id
    }

    /// 添加路由器节点
    pub fn add_router(&mut self, name: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Box::new(Router::new(id, name))));
        self.adj.push(Vec::new());
        self.rev_adj.push(Vec::new());
        id
    }

    /// 连接两个节点（创建单向链路）
    pub fn connect(
        &mut self,
        from: NodeId,
        to: NodeId,
        latency: SimTime,
        bandwidth_bps: u64,
    ) -> LinkId {
        let id = LinkId(self.links.len());
        self.links.push(Link::new(from, to, latency, bandwidth_bps));
        self.edges.insert((from, to), id);
        self.adj[from.0].push(to);
        self.rev_adj[to.0].push(from);
        self.routing.mark_dirty();
        id
    }

    /// 替换某条链路的出口队列（例如换成 RED 或限容 DropTail）
    pub fn set_link_queue(&mut self, from: NodeId, to: NodeId, queue: Box<dyn PacketQueue>) {
        let link_id = *self
            .edges
            .get(&(from, to))
            .unwrap_or_else(|| panic!("no link from {:?} to {:?}", from, to));
        self.links[link_id.0].queue = queue;
    }

    pub fn link_id(&self, from: NodeId, to: NodeId) -> Option<LinkId> {
        self.edges.get(&(from, to)).copied()
    }

    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id.0]
    }

    /// 构建静态路由表。必须在事件循环开始之前调用，运行期间不再重算。
    pub fn build_routes(&mut self) {
        self.routing.ensure_built(&self.adj, &self.rev_adj);
    }

    /// 创建数据包。`now` 记录为源端发出时刻。
    pub fn make_packet(
        &mut self,
        flow_id: u64,
        size_bytes: u32,
        src: NodeId,
        dst: NodeId,
        now: SimTime,
    ) -> Packet {
        let id = self.next_pkt_id;
        self.next_pkt_id = self.next_pkt_id.wrapping_add(1);
        Packet {
            id,
            flow_id,
            size_bytes,
            src,
            dst,
            sent_at: now,
            transport: Default::default(),
        }
    }

    /// 将数据包交付给节点处理
    #[tracing::instrument(skip(self, sim), fields(pkt_id = pkt.id, to = ?to))]
    pub fn deliver(&mut self, to: NodeId, pkt: Packet, sim: &mut Simulator) {
        trace!("📬 将数据包交付给节点处理");

        // 暂时把节点取出来，避免 &mut self 与 &mut node 的重叠借用。
        let mut node = self.nodes[to.0].take().expect("node exists");
        node.on_packet(pkt, sim, self);
        self.nodes[to.0] = Some(node);
    }

    /// 从指定节点沿静态路由转发数据包
    #[tracing::instrument(skip(self, sim), fields(pkt_id = pkt.id, from = ?from, flow_id = pkt.flow_id))]
    pub fn forward_from(&mut self, from: NodeId, pkt: Packet, sim: &mut Simulator) {
        assert!(
            !self.routing.is_dirty(),
            "routing table not built: call build_routes() before the event loop"
        );

        let to = self
            .routing
            .next_hop(from, pkt.dst)
            .unwrap_or_else(|| panic!("no route from {:?} to {:?}", from, pkt.dst));
        let link_id = *self
            .edges
            .get(&(from, to))
            .unwrap_or_else(|| panic!("no link from {:?} to {:?}", from, to));

        if from == pkt.src {
            let ev = PacketEvent {
                t: sim.now(),
                flow_id: pkt.flow_id,
                pkt_id: pkt.id,
                size_bytes: pkt.size_bytes,
                sent_at: pkt.sent_at,
                queue_bytes: self.links[link_id.0].queue.bytes(),
            };
            self.emit_send(&ev);
        }

        let link = &mut self.links[link_id.0];
        trace!(link_id = ?link_id, to = ?to, "查找下一跳");

        match link.queue.enqueue(pkt) {
            Ok(()) => {
                if !link.busy {
                    self.start_tx(link_id, sim);
                }
            }
            Err(dropped) => {
                // 静默丢弃：不通知发送端，丢包由 TCP 通过缺失/重复 ACK 发现
                let q_bytes = link.queue.bytes();
                debug!(
                    pkt_id = dropped.id,
                    flow_id = dropped.flow_id,
                    q_bytes,
                    "📉 队列丢弃数据包"
                );
                let ev = PacketEvent {
                    t: sim.now(),
                    flow_id: dropped.flow_id,
                    pkt_id: dropped.id,
                    size_bytes: dropped.size_bytes,
                    sent_at: dropped.sent_at,
                    queue_bytes: q_bytes,
                };
                self.emit_drop(&ev);
            }
        }
    }

    /// 出队并开始序列化发送下一个 packet（若有）。
    fn start_tx(&mut self, link_id: LinkId, sim: &mut Simulator) {
        let link = &mut self.links[link_id.0];
        let Some(pkt) = link.queue.dequeue() else {
            link.busy = false;
            return;
        };
        link.busy = true;

        let now = sim.now();
        let tx_time = link.tx_time(pkt.size_bytes);
        let depart = now.saturating_add(tx_time);
        let arrive = depart.saturating_add(link.latency);
        let to = link.to;

        trace!(
            link_id = ?link_id,
            tx_time = ?tx_time,
            depart = ?depart,
            arrive = ?arrive,
            "开始序列化发送"
        );

        sim.schedule(depart, LinkReady { link_id });
        sim.schedule(arrive, DeliverPacket { to, pkt });
    }

    /// 链路完成一次序列化发送：尝试发送队列中的下一个 packet。
    pub(crate) fn on_link_ready(&mut self, link_id: LinkId, sim: &mut Simulator) {
        self.links[link_id.0].busy = false;
        self.start_tx(link_id, sim);
    }

    pub(crate) fn emit_send(&mut self, ev: &PacketEvent) {
        self.stats.on_send(ev);
        if let Some(t) = &mut self.trace {
            t.on_send(ev);
        }
        if let Some(sink) = &mut self.sink {
            sink.on_send(ev);
        }
    }

    pub(crate) fn emit_receive(&mut self, ev: &PacketEvent) {
        self.stats.on_receive(ev);
        if let Some(t) = &mut self.trace {
            t.on_receive(ev);
        }
        if let Some(sink) = &mut self.sink {
            sink.on_receive(ev);
        }
    }

    pub(crate) fn emit_drop(&mut self, ev: &PacketEvent) {
        self.stats.on_drop(ev);
        if let Some(t) = &mut self.trace {
            t.on_drop(ev);
        }
        if let Some(sink) = &mut self.sink {
            sink.on_drop(ev);
        }
    }
}
