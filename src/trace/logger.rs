//! 逐包 trace 记录器（可序列化为 JSON）

use serde::Serialize;

use super::{PacketEvent, TraceSink};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TraceRecordKind {
    Send,
    Receive,
    Drop,
}

/// 一条 trace 记录。
#[derive(Debug, Clone, Serialize)]
pub struct TraceRecord {
    pub t_ns: u64,
    pub kind: TraceRecordKind,
    pub flow_id: u64,
    pub pkt_id: u64,
    pub size_bytes: u32,
    pub q_bytes: u64,
}

/// 把所有包事件按发生顺序记录在内存里；是否落盘由调用方决定。
#[derive(Debug, Default)]
pub struct TraceLogger {
    pub records: Vec<TraceRecord>,
}

impl TraceLogger {
    fn push(&mut self, kind: TraceRecordKind, ev: &PacketEvent) {
        self.records.push(TraceRecord {
            t_ns: ev.t.0,
            kind,
            flow_id: ev.flow_id,
            pkt_id: ev.pkt_id,
            size_bytes: ev.size_bytes,
            q_bytes: ev.queue_bytes,
        });
    }
}

impl TraceSink for TraceLogger {
    fn on_send(&mut self, ev: &PacketEvent) {
        self.push(TraceRecordKind::Send, ev);
    }

    fn on_receive(&mut self, ev: &PacketEvent) {
        self.push(TraceRecordKind::Receive, ev);
    }

    fn on_drop(&mut self, ev: &PacketEvent) {
        self.push(TraceRecordKind::Drop, ev);
    }
}
