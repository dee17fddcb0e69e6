//! On/Off UDP 源
//!
//! ON 期间以恒定速率发固定大小的 UDP 包，OFF 期间静默；时长均为常量。
//! 周期行为通过事件自我重调度实现；
//! `cycle` 计数器充当 stale 检查：相位翻转后，仍在堆里的旧发包事件
//! 因 cycle 不匹配而变成 no-op。

use std::collections::HashMap;

use tracing::{debug, trace};

use super::AppId;
use crate::net::{NetWorld, Network, NodeId, Transport};
use crate::sim::{Event, SimTime, Simulator, World};

/// on/off 源参数。
#[derive(Debug, Clone)]
pub struct OnOffConfig {
    /// ON 期间的发送速率（bits/s）
    pub rate_bps: u64,
    /// 包大小（字节）
    pub pkt_bytes: u32,
    /// ON 时长
    pub on_dur: SimTime,
    /// OFF 时长；0 表示持续发送
    pub off_dur: SimTime,
    /// 是否从 OFF 状态开始（攻击脉冲用它做相位对齐）
    pub start_in_off: bool,
}

impl OnOffConfig {
    /// 包间隔：pkt_bytes 在 rate_bps 下的序列化时间。
    fn gap(&self) -> SimTime {
        if self.rate_bps == 0 {
            return SimTime(u64::MAX / 4);
        }
        let bits = (self.pkt_bytes as u128).saturating_mul(8);
        let nanos = (bits.saturating_mul(1_000_000_000u128) + (self.rate_bps as u128 - 1))
            / self.rate_bps as u128;
        SimTime(nanos.min(u64::MAX as u128) as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    On,
    Off,
}

#[derive(Debug)]
pub struct OnOffApp {
    pub id: AppId,
    pub src: NodeId,
    pub dst: NodeId,
    pub cfg: OnOffConfig,
    pub start: SimTime,
    pub stop: SimTime,
    phase: Phase,
    cycle: u64,
    pub packets_emitted: u64,
}

impl OnOffApp {
    pub fn new(
        id: AppId,
        src: NodeId,
        dst: NodeId,
        cfg: OnOffConfig,
        start: SimTime,
        stop: SimTime,
    ) -> Self {
        Self {
            id,
            src,
            dst,
            cfg,
            start,
            stop,
            phase: Phase::Idle,
            cycle: 0,
            packets_emitted: 0,
        }
    }

    pub fn is_on(&self) -> bool {
        self.phase == Phase::On
    }
}

/// on/off 应用集合，挂在 Network 上（与 TcpStack 同样的 take/put 用法）。
#[derive(Debug, Default)]
pub struct AppSet {
    apps: HashMap<AppId, OnOffApp>,
}

impl AppSet {
    pub fn insert(&mut self, app: OnOffApp) {
        self.apps.insert(app.id, app);
    }

    pub fn get(&self, id: AppId) -> Option<&OnOffApp> {
        self.apps.get(&id)
    }

    pub(crate) fn on_start(&mut self, id: AppId, sim: &mut Simulator, net: &mut Network) {
        let Some(app) = self.apps.get_mut(&id) else {
            return;
        };
        if sim.now() >= app.stop {
            return;
        }
        if app.cfg.start_in_off && app.cfg.off_dur > SimTime::ZERO {
            app.phase = Phase::Off;
            let at = sim.now().saturating_add(app.cfg.off_dur);
            debug!(app_id = id, first_on = ?at, "🕒 生成器以 OFF 状态启动");
            sim.schedule(at, AppToggle { app_id: id });
        } else {
            self.enter_on(id, sim, net);
        }
    }

    fn enter_on(&mut self, id: AppId, sim: &mut Simulator, net: &mut Network) {
        let Some(app) = self.apps.get_mut(&id) else {
            return;
        };
        app.phase = Phase::On;
        app.cycle = app.cycle.wrapping_add(1);
        let cycle = app.cycle;
        trace!(app_id = id, cycle, "进入 ON 相位");

        // off 时长为 0 的源持续发送，不再调度相位翻转
        if app.cfg.off_dur > SimTime::ZERO {
            let at = sim.now().saturating_add(app.cfg.on_dur);
            sim.schedule(at, AppToggle { app_id: id });
        }
        self.emit(id, cycle, sim, net);
    }

    pub(crate) fn on_toggle(&mut self, id: AppId, sim: &mut Simulator, net: &mut Network) {
        let Some(app) = self.apps.get_mut(&id) else {
            return;
        };
        match app.phase {
            Phase::On => {
                app.phase = Phase::Off;
                // 让仍在堆里的发包事件失效
                app.cycle = app.cycle.wrapping_add(1);
                if sim.now() < app.stop {
                    let at = sim.now().saturating_add(app.cfg.off_dur);
                    sim.schedule(at, AppToggle { app_id: id });
                } else {
                    app.phase = Phase::Idle;
                }
            }
            Phase::Off => {
                if sim.now() >= app.stop {
                    app.phase = Phase::Idle;
                    return;
                }
                self.enter_on(id, sim, net);
            }
            Phase::Idle => {}
        }
    }

    pub(crate) fn emit(&mut self, id: AppId, cycle: u64, sim: &mut Simulator, net: &mut Network) {
        let Some(app) = self.apps.get_mut(&id) else {
            return;
        };
        // stale 检查：相位已翻转的旧发包链直接作废
        if app.phase != Phase::On || app.cycle != cycle {
            return;
        }
        if sim.now() >= app.stop {
            app.phase = Phase::Idle;
            return;
        }

        let now = sim.now();
        let mut pkt = net.make_packet(app.id, app.cfg.pkt_bytes, app.src, app.dst, now);
        pkt.transport = Transport::Udp;
        app.packets_emitted += 1;
        let src = app.src;
        let next = now.saturating_add(app.cfg.gap());

        net.forward_from(src, pkt, sim);
        sim.schedule(next, AppEmit { app_id: id, cycle });
    }
}

/// 事件：生成器到达其配置的启动时刻。
#[derive(Debug)]
pub struct AppStart {
    pub app_id: AppId,
}

impl Event for AppStart {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let AppStart { app_id } = *self;
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        let mut apps = std::mem::take(&mut w.net.apps);
        apps.on_start(app_id, sim, &mut w.net);
        w.net.apps = apps;
    }
}

/// 事件：ON/OFF 相位翻转。
#[derive(Debug)]
pub struct AppToggle {
    pub app_id: AppId,
}

impl Event for AppToggle {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let AppToggle { app_id } = *self;
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        let mut apps = std::mem::take(&mut w.net.apps);
        apps.on_toggle(app_id, sim, &mut w.net);
        w.net.apps = apps;
    }
}

/// 事件：ON 相位内发出下一个 UDP 包。
#[derive(Debug)]
pub struct AppEmit {
    pub app_id: AppId,
    pub cycle: u64,
}

impl Event for AppEmit {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let AppEmit { app_id, cycle } = *self;
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        let mut apps = std::mem::take(&mut w.net.apps);
        apps.emit(app_id, cycle, sim, &mut w.net);
        w.net.apps = apps;
    }
}
