//! 传输层/协议模块
//!
//! 包含 TCP（NewReno 风格）的简化实现，用于 LDoS 仿真实验。
//! UDP 没有协议状态机：on/off 源直接发裸包，见 `crate::app`。

pub mod tcp;
