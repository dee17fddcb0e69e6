//! 流量生成器
//!
//! 三种生成器共用一个安装接口（tagged variant，按模式匹配分发）：
//! - `Bulk`：TCP 大块发送，受拥塞窗口驱动（见 `crate::proto::tcp`）；
//! - `OnOff`：恒定速率 on/off UDP 源（off 时长为 0 即持续发送）；
//! - `AttackPulse`：LDoS 攻击脉冲，on/off 的特化——初始处于 OFF，
//!   首个突发因此与受害流的恢复相位对齐。

mod attack;
mod onoff;

pub use attack::AttackPulseConfig;
pub use onoff::{AppEmit, AppSet, AppStart, AppToggle, OnOffApp, OnOffConfig};

use crate::net::{Network, NodeId};
use crate::proto::tcp::{TcpConfig, TcpConn, TcpStart};
use crate::sim::{SimTime, Simulator};

/// 应用标识：与其产生的 flow_id 一致。
pub type AppId = u64;

/// 生成器变体。
#[derive(Debug, Clone)]
pub enum AppKind {
    /// TCP bulk 发送；`total_bytes = None` 表示发送到仿真结束
    Bulk {
        total_bytes: Option<u64>,
        cfg: TcpConfig,
    },
    /// 恒定速率 on/off UDP 源
    OnOff(OnOffConfig),
    /// LDoS 攻击脉冲
    AttackPulse(AttackPulseConfig),
}

impl AppKind {
    /// 安装生成器：Bulk 在 `start` 时刻调度 `TcpStart`，
    /// on/off 系注册应用并调度 `AppStart`。
    pub fn install(
        self,
        flow_id: u64,
        src: NodeId,
        dst: NodeId,
        start: SimTime,
        stop: SimTime,
        sim: &mut Simulator,
        net: &mut Network,
    ) {
        match self {
            AppKind::Bulk { total_bytes, cfg } => {
                let conn = TcpConn::new(flow_id, src, dst, total_bytes, cfg);
                sim.schedule(start, TcpStart { conn });
            }
            AppKind::OnOff(cfg) => {
                net.apps
                    .insert(OnOffApp::new(flow_id, src, dst, cfg, start, stop));
                sim.schedule(start, AppStart { app_id: flow_id });
            }
            AppKind::AttackPulse(cfg) => {
                net.apps
                    .insert(OnOffApp::new(flow_id, src, dst, cfg.to_onoff(), start, stop));
                sim.schedule(start, AppStart { app_id: flow_id });
            }
        }
    }
}
