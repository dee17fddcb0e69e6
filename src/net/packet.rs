//! 数据包类型
//!
//! 定义网络数据包。包一经创建不再修改：所有权从发送端转移到链路再到接收端。

use super::id::NodeId;
use super::transport::Transport;
use crate::sim::SimTime;

/// 网络数据包
#[derive(Debug, Clone)]
pub struct Packet {
    pub id: u64,
    pub flow_id: u64,
    pub size_bytes: u32,
    pub src: NodeId,
    pub dst: NodeId,
    /// 源端发出时刻（用于端到端时延统计）
    pub sent_at: SimTime,
    pub transport: Transport,
}
