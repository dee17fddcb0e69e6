//! 每流统计收集器

use std::collections::BTreeMap;

use serde::Serialize;

use super::{PacketEvent, TraceSink};

/// 单条流的运行期计数。
#[derive(Debug, Default, Clone)]
struct FlowCounters {
    packets_tx: u64,
    packets_rx: u64,
    packets_lost: u64,
    bytes_tx: u64,
    bytes_rx: u64,
    delay_sum_ns: u128,
}

/// 运行结束后的每流摘要。
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FlowSummary {
    pub flow_id: u64,
    pub packets_tx: u64,
    pub packets_rx: u64,
    pub packets_lost: u64,
    pub bytes_tx: u64,
    pub bytes_rx: u64,
    /// 平均端到端时延（纳秒；没有收到任何包时为 0）
    pub mean_delay_ns: u64,
}

/// 内建统计收集器：按 flow_id 聚合，另保留全网合计。
#[derive(Debug, Default)]
pub struct StatsCollector {
    flows: BTreeMap<u64, FlowCounters>,
    pub delivered_pkts: u64,
    pub delivered_bytes: u64,
    pub dropped_pkts: u64,
    pub dropped_bytes: u64,
}

impl StatsCollector {
    pub fn flow_rx_bytes(&self, flow_id: u64) -> u64 {
        self.flows.get(&flow_id).map(|f| f.bytes_rx).unwrap_or(0)
    }

    pub fn flow_rx_pkts(&self, flow_id: u64) -> u64 {
        self.flows.get(&flow_id).map(|f| f.packets_rx).unwrap_or(0)
    }

    pub fn flow_lost_pkts(&self, flow_id: u64) -> u64 {
        self.flows
            .get(&flow_id)
            .map(|f| f.packets_lost)
            .unwrap_or(0)
    }

    /// 产出每流摘要，按 flow_id 升序。
    pub fn finalize(&self) -> Vec<FlowSummary> {
        self.flows
            .iter()
            .map(|(&flow_id, c)| FlowSummary {
                flow_id,
                packets_tx: c.packets_tx,
                packets_rx: c.packets_rx,
                packets_lost: c.packets_lost,
                bytes_tx: c.bytes_tx,
                bytes_rx: c.bytes_rx,
                mean_delay_ns: if c.packets_rx == 0 {
                    0
                } else {
                    (c.delay_sum_ns / c.packets_rx as u128) as u64
                },
            })
            .collect()
    }
}

impl TraceSink for StatsCollector {
    fn on_send(&mut self, ev: &PacketEvent) {
        let f = self.flows.entry(ev.flow_id).or_default();
        f.packets_tx += 1;
        f.bytes_tx += ev.size_bytes as u64;
    }

    fn on_receive(&mut self, ev: &PacketEvent) {
        let f = self.flows.entry(ev.flow_id).or_default();
        f.packets_rx += 1;
        f.bytes_rx += ev.size_bytes as u64;
        f.delay_sum_ns += ev.t.saturating_sub(ev.sent_at).0 as u128;
        self.delivered_pkts += 1;
        self.delivered_bytes += ev.size_bytes as u64;
    }

    fn on_drop(&mut self, ev: &PacketEvent) {
        let f = self.flows.entry(ev.flow_id).or_default();
        f.packets_lost += 1;
        self.dropped_pkts += 1;
        self.dropped_bytes += ev.size_bytes as u64;
    }
}
