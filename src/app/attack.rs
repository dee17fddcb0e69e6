//! LDoS 攻击脉冲生成器
//!
//! 周期 T 内只在开头的 on-duration t 以速率 R 发送 UDP 突发。
//! 初始处于 OFF 状态：首个突发出现在 `start + (T - t)`，
//! 与受害 TCP 流的 RTO 恢复窗口相位对齐，提高突发命中恢复期的概率。

use super::onoff::OnOffConfig;
use crate::sim::SimTime;

#[derive(Debug, Clone)]
pub struct AttackPulseConfig {
    /// 攻击周期 T
    pub period: SimTime,
    /// 每周期的突发时长 t（必须小于 T）
    pub on_dur: SimTime,
    /// 突发速率 R（bits/s）
    pub rate_bps: u64,
    /// 突发包大小（字节）
    pub pkt_bytes: u32,
}

impl AttackPulseConfig {
    pub fn off_dur(&self) -> SimTime {
        self.period.saturating_sub(self.on_dur)
    }

    /// 攻击成本 `(t/T)·(R/瓶颈带宽)`：衡量攻击者为造成损害付出的平均带宽比。
    pub fn cost(&self, bottleneck_bps: u64) -> f64 {
        if self.period == SimTime::ZERO || bottleneck_bps == 0 {
            return 0.0;
        }
        let duty = self.on_dur.0 as f64 / self.period.0 as f64;
        duty * (self.rate_bps as f64 / bottleneck_bps as f64)
    }

    pub(crate) fn to_onoff(&self) -> OnOffConfig {
        OnOffConfig {
            rate_bps: self.rate_bps,
            pkt_bytes: self.pkt_bytes,
            on_dur: self.on_dur,
            off_dur: self.off_dur(),
            start_in_off: true,
        }
    }
}
