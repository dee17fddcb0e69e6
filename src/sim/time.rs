//! 仿真时间类型
//!
//! 定义仿真时间及其单位转换。整数纳秒，避免浮点漂移。

/// 仿真时间（纳秒）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct SimTime(pub u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    pub fn from_micros(us: u64) -> SimTime {
        SimTime(us.saturating_mul(1_000))
    }

    pub fn from_millis(ms: u64) -> SimTime {
        SimTime(ms.saturating_mul(1_000_000))
    }

    pub fn from_secs(s: u64) -> SimTime {
        SimTime(s.saturating_mul(1_000_000_000))
    }

    /// 从秒（浮点）转换；仅用于配置入口，内部一律整数纳秒。
    pub fn from_secs_f64(s: f64) -> SimTime {
        if s <= 0.0 {
            return SimTime::ZERO;
        }
        SimTime((s * 1_000_000_000.0).round() as u64)
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }

    pub fn saturating_add(self, rhs: SimTime) -> SimTime {
        SimTime(self.0.saturating_add(rhs.0))
    }

    pub fn saturating_sub(self, rhs: SimTime) -> SimTime {
        SimTime(self.0.saturating_sub(rhs.0))
    }
}
