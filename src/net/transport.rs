//! 传输层标签
//!
//! Packet 是网络层载体；传输层语义通过标签携带，避免网络层与协议实现耦合。

/// 数据包携带的传输层元数据。
#[derive(Debug, Clone, Default)]
pub enum Transport {
    /// 无传输层元数据（默认）
    #[default]
    None,
    /// 裸 UDP 数据报（on/off 源、攻击突发）
    Udp,
    /// TCP 段（简化）
    Tcp(TcpSegment),
}

/// TCP 段（仿真所需的最小字段集）。
#[derive(Debug, Clone)]
pub enum TcpSegment {
    /// 数据段：`seq` 为字节序号，`len` 为载荷字节数
    Data { seq: u64, len: u32 },
    /// 累计 ACK：`ack` 为期待的下一个字节
    Ack { ack: u64 },
    /// FIN：发送端没有更多数据
    Fin,
    /// 对 FIN 的确认
    FinAck,
}
