//! 统计与观测挂钩
//!
//! 核心在包发送/接收/丢弃时调用窄接口 `TraceSink`；持久化（trace 文件、日志）
//! 属于外部协作者。内建两个实现：
//! - `StatsCollector`：每流计数与平均时延，运行结束后 `finalize` 输出摘要；
//! - `TraceLogger`：可序列化的逐包记录，由调用方决定是否落盘为 JSON。

mod logger;
mod stats;

pub use logger::{TraceLogger, TraceRecord, TraceRecordKind};
pub use stats::{FlowSummary, StatsCollector};

use crate::sim::SimTime;

/// 一次包事件的观测快照。
#[derive(Debug, Clone, Copy)]
pub struct PacketEvent {
    /// 事件发生时刻
    pub t: SimTime,
    pub flow_id: u64,
    pub pkt_id: u64,
    pub size_bytes: u32,
    /// 源端发出时刻（receive 事件据此计算端到端时延）
    pub sent_at: SimTime,
    /// 事件发生时相关队列的占用（字节）
    pub queue_bytes: u64,
}

/// 观测 sink：核心只依赖这三个挂钩。
pub trait TraceSink: Send {
    fn on_send(&mut self, ev: &PacketEvent);
    fn on_receive(&mut self, ev: &PacketEvent);
    fn on_drop(&mut self, ev: &PacketEvent);
}
