//! 队列策略（Queue disciplines）
//!
//! 提供 DropTail（尾丢弃）与 RED（随机早期检测）两种队列。
//! 丢弃是静默的：不产生任何通知包，丢包由 TCP 端通过缺失 ACK/重复 ACK 发现。

use crate::net::Packet;

mod drop_tail;
mod red;

pub use drop_tail::DropTailQueue;
pub use red::{RedParams, RedQueue};

pub const DEFAULT_PKT_BYTES: u64 = 1500;

pub fn mem_from_pkt(pkts: u64) -> u64 {
    pkts.saturating_mul(DEFAULT_PKT_BYTES)
}

/// Packet 队列抽象
pub trait PacketQueue: std::fmt::Debug + Send {
    /// 入队：成功返回 Ok；若被丢弃则返回 Err(pkt)
    fn enqueue(&mut self, pkt: Packet) -> Result<(), Packet>;
    /// 出队：按队列策略返回下一个 packet
    fn dequeue(&mut self) -> Option<Packet>;

    fn len(&self) -> usize;
    fn bytes(&self) -> u64;
    fn capacity_bytes(&self) -> u64;
}
