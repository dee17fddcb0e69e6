//! 三路由器 LDoS 拓扑构建
//!
//! 拓扑结构（r2-r3 为刻意设置的瓶颈）：
//!
//! ```text
//! t0..tN  ─┐                         ┌─ s0..sN
//! bt0..btM ├─ r1 ══════ r2 ══════ r3 ┤
//! bu0..buK ─┤   access     bottleneck
//! attacker ─┘              (RED 队列)
//!            bs0..bsM ─ r2
//! ```
//!
//! 正常 TCP 对跨越全部三个路由器；背景 TCP 终止于 r2；背景 UDP 与
//! 攻击突发都指向 r3，必经瓶颈。路由器间链路（双向）安装 RED 队列。

use tracing::info;

use crate::app::{AppKind, OnOffConfig};
use crate::net::{LinkId, NetWorld, NodeId};
use crate::queue::RedQueue;
use crate::scenario::{ConfigError, LinkConfig, ScenarioConfig};
use crate::sim::{SimTime, Simulator};
use crate::trace::TraceLogger;

/// 构建结果：节点与流的簿记，用于解读统计摘要。
#[derive(Debug)]
pub struct ThreeRouters {
    pub r1: NodeId,
    pub r2: NodeId,
    pub r3: NodeId,
    pub bottleneck: LinkId,
    /// 正常 TCP 流的 flow_id
    pub normal_tcp: Vec<u64>,
    /// 背景 TCP 流的 flow_id
    pub background_tcp: Vec<u64>,
    /// 背景 UDP 流的 flow_id
    pub background_udp: Vec<u64>,
    /// 攻击流的 flow_id（未安装攻击者时为 None）
    pub attack_flow: Option<u64>,
    /// 攻击成本 `(t/T)·(R/瓶颈带宽)`
    pub attack_cost: Option<f64>,
}

fn duplex(world: &mut NetWorld, a: NodeId, b: NodeId, link: &LinkConfig) {
    world.net.connect(a, b, link.delay, link.rate_bps);
    world.net.connect(b, a, link.delay, link.rate_bps);
}

/// 按配置构建拓扑并安装所有生成器。校验失败时不触碰 world。
pub fn build_three_routers(
    world: &mut NetWorld,
    sim: &mut Simulator,
    cfg: &ScenarioConfig,
) -> Result<ThreeRouters, ConfigError> {
    cfg.validate()?;

    info!(
        tcp_pairs = cfg.tcp_pairs,
        btcp_pairs = cfg.btcp_pairs,
        budp_sources = cfg.budp_sources,
        attack = cfg.attack.is_some(),
        "🏗️  构建三路由器拓扑"
    );

    let r1 = world.net.add_router("r1");
    let r2 = world.net.add_router("r2");
    let r3 = world.net.add_router("r3");

    let mut t_hosts = Vec::new();
    let mut s_hosts = Vec::new();
    for i in 0..cfg.tcp_pairs {
        let t = world.net.add_host(format!("t{i}"));
        let s = world.net.add_host(format!("s{i}"));
        duplex(world, t, r1, &cfg.access);
        duplex(world, s, r3, &cfg.access);
        t_hosts.push(t);
        s_hosts.push(s);
    }

    let mut bt_hosts = Vec::new();
    let mut bs_hosts = Vec::new();
    for i in 0..cfg.btcp_pairs {
        let bt = world.net.add_host(format!("bt{i}"));
        let bs = world.net.add_host(format!("bs{i}"));
        duplex(world, bt, r1, &cfg.access);
        duplex(world, bs, r2, &cfg.access);
        bt_hosts.push(bt);
        bs_hosts.push(bs);
    }

    let mut bu_hosts = Vec::new();
    for i in 0..cfg.budp_sources {
        let bu = world.net.add_host(format!("bu{i}"));
        duplex(world, bu, r1, &cfg.access);
        bu_hosts.push(bu);
    }

    let attacker = cfg.attack.as_ref().map(|_| {
        let a = world.net.add_host("attacker");
        duplex(world, a, r1, &cfg.access);
        a
    });

    // 路由器链：r1-r2 接入参数，r2-r3 瓶颈参数
    duplex(world, r1, r2, &cfg.access);
    duplex(world, r2, r3, &cfg.bottleneck);

    // 路由器间链路（双向）安装 RED 队列；种子来自链路 id，保证可重放
    for (from, to) in [(r1, r2), (r2, r1), (r2, r3), (r3, r2)] {
        let link_id = world.net.link_id(from, to).expect("router link exists");
        let seed = 0x1D05_u64 ^ ((link_id.0 as u64) << 8);
        world.net.set_link_queue(
            from,
            to,
            Box::new(RedQueue::new(cfg.router_queue_bytes, cfg.red.clone(), seed)),
        );
    }

    let bottleneck = world.net.link_id(r2, r3).expect("bottleneck link exists");

    world.net.build_routes();

    if cfg.tracing {
        world.net.trace = Some(TraceLogger::default());
    }

    // 生成器安装；flow_id 从 1 起连续分配
    let mut next_flow: u64 = 1;
    let client_start = cfg.start.saturating_add(cfg.client_start_offset);

    let mut normal_tcp = Vec::new();
    for i in 0..cfg.tcp_pairs as usize {
        let flow = next_flow;
        next_flow += 1;
        AppKind::Bulk {
            total_bytes: cfg.tcp_total_bytes,
            cfg: cfg.tcp.clone(),
        }
        .install(
            flow,
            t_hosts[i],
            s_hosts[i],
            client_start,
            cfg.stop,
            sim,
            &mut world.net,
        );
        normal_tcp.push(flow);
    }

    let mut background_tcp = Vec::new();
    for i in 0..cfg.btcp_pairs as usize {
        let flow = next_flow;
        next_flow += 1;
        AppKind::Bulk {
            total_bytes: cfg.tcp_total_bytes,
            cfg: cfg.tcp.clone(),
        }
        .install(
            flow,
            bt_hosts[i],
            bs_hosts[i],
            client_start,
            cfg.stop,
            sim,
            &mut world.net,
        );
        background_tcp.push(flow);
    }

    let mut background_udp = Vec::new();
    for &bu in &bu_hosts {
        let flow = next_flow;
        next_flow += 1;
        AppKind::OnOff(OnOffConfig {
            rate_bps: cfg.budp_rate_bps,
            pkt_bytes: cfg.budp_pkt_bytes,
            on_dur: SimTime::from_secs(1),
            off_dur: SimTime::ZERO,
            start_in_off: false,
        })
        .install(flow, bu, r3, client_start, cfg.stop, sim, &mut world.net);
        background_udp.push(flow);
    }

    let mut attack_flow = None;
    let mut attack_cost = None;
    if let (Some(attack), Some(a)) = (&cfg.attack, attacker) {
        let flow = next_flow;
        let cost = attack.pulse.cost(cfg.bottleneck.rate_bps);
        info!(cost, "⚔️  攻击成本 A");
        AppKind::AttackPulse(attack.pulse.clone()).install(
            flow,
            a,
            r3,
            attack.start,
            attack.stop,
            sim,
            &mut world.net,
        );
        attack_flow = Some(flow);
        attack_cost = Some(cost);
    }

    Ok(ThreeRouters {
        r1,
        r2,
        r3,
        bottleneck,
        normal_tcp,
        background_tcp,
        background_udp,
        attack_flow,
        attack_cost,
    })
}
