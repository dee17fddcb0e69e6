//! 类型化的场景配置与校验

use thiserror::Error;

use crate::app::AttackPulseConfig;
use crate::proto::tcp::TcpConfig;
use crate::queue::{mem_from_pkt, RedParams};
use crate::sim::SimTime;

/// 单段链路参数。
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub rate_bps: u64,
    pub delay: SimTime,
}

/// 攻击者参数。
#[derive(Debug, Clone)]
pub struct AttackConfig {
    pub start: SimTime,
    pub stop: SimTime,
    pub pulse: AttackPulseConfig,
}

/// 三路由器 LDoS 场景的完整配置面。
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    /// 正常 TCP 收发对数量（T_i -> S_i，跨越全部三个路由器）
    pub tcp_pairs: u32,
    /// 背景 TCP 收发对数量（BT_i -> BS_i，终止于 r2）
    pub btcp_pairs: u32,
    /// 背景 UDP 源数量（指向 r3，常开）
    pub budp_sources: u32,

    /// 接入链路（主机-路由器、r1-r2）
    pub access: LinkConfig,
    /// 瓶颈链路（r2-r3）：速率更低、时延更高
    pub bottleneck: LinkConfig,

    /// 路由器间链路的 RED 参数
    pub red: RedParams,
    /// 路由器间链路的队列容量（字节）
    pub router_queue_bytes: u64,

    /// 全局起止时间
    pub start: SimTime,
    pub stop: SimTime,
    /// 客户端（TCP/UDP 源）相对 start 的启动延迟
    pub client_start_offset: SimTime,

    /// TCP 参数（所有 TCP 流共用）
    pub tcp: TcpConfig,
    /// 有界 bulk 流的数据量；None 表示发送到仿真结束
    pub tcp_total_bytes: Option<u64>,

    /// 背景 UDP 源速率（bits/s）与包大小
    pub budp_rate_bps: u64,
    pub budp_pkt_bytes: u32,

    /// 攻击者；None 表示不安装攻击者（对照组）
    pub attack: Option<AttackConfig>,

    /// 是否记录逐包 trace
    pub tracing: bool,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        // 经典 LDoS 实验参数：100Mbps/30ms 接入，10Mbps/15ms 瓶颈，
        // 605s 运行，客户端 +1s，攻击者 +5s、T=1s、t=0.1s、R=20Mbps
        let start = SimTime::ZERO;
        let stop = SimTime::from_secs(605);
        Self {
            tcp_pairs: 10,
            btcp_pairs: 5,
            budp_sources: 5,
            access: LinkConfig {
                rate_bps: 100_000_000,
                delay: SimTime::from_millis(30),
            },
            bottleneck: LinkConfig {
                rate_bps: 10_000_000,
                delay: SimTime::from_millis(15),
            },
            red: RedParams::default(),
            router_queue_bytes: mem_from_pkt(25),
            start,
            stop,
            client_start_offset: SimTime::from_secs(1),
            tcp: TcpConfig::default(),
            tcp_total_bytes: None,
            budp_rate_bps: 1_000_000,
            budp_pkt_bytes: 512,
            attack: Some(AttackConfig {
                start: start.saturating_add(SimTime::from_secs(5)),
                stop,
                pulse: AttackPulseConfig {
                    period: SimTime::from_secs(1),
                    on_dur: SimTime::from_millis(100),
                    rate_bps: 20_000_000,
                    pkt_bytes: 1500,
                },
            }),
            tracing: false,
        }
    }
}

/// 配置错误：在事件循环开始前检出，指明违规参数。
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("tcp_pairs must be at least 1, got {0}")]
    NoTcpPairs(u32),
    #[error("{name} link rate must be positive")]
    ZeroLinkRate { name: &'static str },
    #[error("RED max_threshold ({max_th} bytes) must exceed min_threshold ({min_th} bytes)")]
    RedThresholds { min_th: u64, max_th: u64 },
    #[error("RED max drop probability must be in (0, 1], got {0}")]
    RedMaxProb(f64),
    #[error("RED EWMA weight must be in (0, 1], got {0}")]
    RedWeight(f64),
    #[error("router queue capacity must be positive")]
    ZeroQueueCapacity,
    #[error("stop time ({stop_ns} ns) must be after start time ({start_ns} ns)")]
    StopBeforeStart { start_ns: u64, stop_ns: u64 },
    #[error("attack on-duration ({on_ns} ns) must be positive and shorter than period ({period_ns} ns)")]
    AttackDutyCycle { on_ns: u64, period_ns: u64 },
    #[error("attack rate must be positive")]
    ZeroAttackRate,
    #[error("UDP source rate must be positive when budp_sources > 0")]
    ZeroUdpRate,
}

impl ScenarioConfig {
    /// 一次性校验；任何违规都阻止仿真启动。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tcp_pairs == 0 {
            return Err(ConfigError::NoTcpPairs(self.tcp_pairs));
        }
        if self.access.rate_bps == 0 {
            return Err(ConfigError::ZeroLinkRate { name: "access" });
        }
        if self.bottleneck.rate_bps == 0 {
            return Err(ConfigError::ZeroLinkRate { name: "bottleneck" });
        }
        if self.red.max_th_bytes <= self.red.min_th_bytes {
            return Err(ConfigError::RedThresholds {
                min_th: self.red.min_th_bytes,
                max_th: self.red.max_th_bytes,
            });
        }
        if !(self.red.max_p > 0.0 && self.red.max_p <= 1.0) {
            return Err(ConfigError::RedMaxProb(self.red.max_p));
        }
        if !(self.red.ewma_weight > 0.0 && self.red.ewma_weight <= 1.0) {
            return Err(ConfigError::RedWeight(self.red.ewma_weight));
        }
        if self.router_queue_bytes == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.stop <= self.start {
            return Err(ConfigError::StopBeforeStart {
                start_ns: self.start.0,
                stop_ns: self.stop.0,
            });
        }
        if self.budp_sources > 0 && self.budp_rate_bps == 0 {
            return Err(ConfigError::ZeroUdpRate);
        }
        if let Some(attack) = &self.attack {
            let pulse = &attack.pulse;
            if pulse.on_dur == SimTime::ZERO || pulse.on_dur >= pulse.period {
                return Err(ConfigError::AttackDutyCycle {
                    on_ns: pulse.on_dur.0,
                    period_ns: pulse.period.0,
                });
            }
            if pulse.rate_bps == 0 {
                return Err(ConfigError::ZeroAttackRate);
            }
        }
        Ok(())
    }
}
