use crate::net::NetWorld;
use crate::scenario::ScenarioConfig;
use crate::sim::{SimTime, Simulator};
use crate::topo::{build_three_routers, ThreeRouters};

/// Scaled-down version of the stock scenario so the tests stay fast.
fn small_cfg(with_attack: bool) -> ScenarioConfig {
    let mut cfg = ScenarioConfig::default();
    cfg.tcp_pairs = 2;
    cfg.btcp_pairs = 1;
    cfg.budp_sources = 1;
    cfg.stop = SimTime::from_secs(30);
    if with_attack {
        let attack = cfg.attack.as_mut().expect("default has attacker");
        attack.start = SimTime::from_secs(2);
        attack.stop = cfg.stop;
    } else {
        cfg.attack = None;
    }
    cfg
}

fn run(cfg: &ScenarioConfig) -> (NetWorld, ThreeRouters) {
    let mut sim = Simulator::default();
    let mut world = NetWorld::default();
    let topo = build_three_routers(&mut world, &mut sim, cfg).expect("valid config");
    sim.run_until(cfg.stop, &mut world);
    (world, topo)
}

fn normal_tcp_rx_bytes(world: &NetWorld, topo: &ThreeRouters) -> u64 {
    topo.normal_tcp
        .iter()
        .map(|&f| world.net.stats.flow_rx_bytes(f))
        .sum()
}

#[test]
fn identical_runs_produce_identical_summaries() {
    let cfg = small_cfg(true);
    let (a, _) = run(&cfg);
    let (b, _) = run(&cfg);

    assert_eq!(a.net.stats.finalize(), b.net.stats.finalize());
    assert_eq!(a.net.stats.delivered_pkts, b.net.stats.delivered_pkts);
    assert_eq!(a.net.stats.dropped_pkts, b.net.stats.dropped_pkts);
}

#[test]
fn attack_degrades_normal_tcp_goodput() {
    let (baseline_world, baseline_topo) = run(&small_cfg(false));
    let (attacked_world, attacked_topo) = run(&small_cfg(true));

    let baseline = normal_tcp_rx_bytes(&baseline_world, &baseline_topo);
    let attacked = normal_tcp_rx_bytes(&attacked_world, &attacked_topo);

    assert!(baseline > 0, "baseline flows moved no data");
    assert!(
        attacked < baseline,
        "attack should reduce goodput: attacked={attacked} baseline={baseline}"
    );
    // The pulses themselves must be causing loss at the bottleneck.
    let attack_flow = attacked_topo.attack_flow.expect("attack installed");
    assert!(attacked_world.net.stats.flow_lost_pkts(attack_flow) > 0);
}

#[test]
fn bounded_bulk_flow_delivers_every_byte_in_order() {
    let mut cfg = ScenarioConfig::default();
    cfg.tcp_pairs = 1;
    cfg.btcp_pairs = 0;
    cfg.budp_sources = 0;
    cfg.attack = None;
    cfg.stop = SimTime::from_secs(30);
    cfg.tcp_total_bytes = Some(200_000);
    // Buffers large enough that nothing is ever dropped.
    cfg.router_queue_bytes = 50_000_000;
    cfg.red.min_th_bytes = 10_000_000;
    cfg.red.max_th_bytes = 20_000_000;

    let (world, topo) = run(&cfg);

    assert_eq!(world.net.stats.dropped_pkts, 0);

    let flow = topo.normal_tcp[0];
    let conn = world.net.tcp.get(flow).expect("tcp conn missing");
    assert!(conn.is_done(), "bulk flow did not finish");
    assert!(conn.is_closed(), "FIN handshake did not finish");
    assert_eq!(conn.received_contiguous(), 200_000);
    assert_eq!(world.net.stats.flow_lost_pkts(flow), 0);
}

#[test]
fn builder_reports_attack_cost_and_flow_bookkeeping() {
    let mut sim = Simulator::default();
    let mut world = NetWorld::default();
    let cfg = small_cfg(true);
    let topo = build_three_routers(&mut world, &mut sim, &cfg).expect("valid config");

    assert_eq!(topo.normal_tcp.len(), 2);
    assert_eq!(topo.background_tcp.len(), 1);
    assert_eq!(topo.background_udp.len(), 1);
    assert!(topo.attack_flow.is_some());

    // Stock pulse: t=0.1s, T=1s, R=20Mbps over a 10Mbps bottleneck.
    let cost = topo.attack_cost.expect("attack installed");
    assert!((cost - 0.2).abs() < 1e-9, "expected cost 0.2, got {cost}");

    // Without an attacker neither the flow nor the cost is reported.
    let mut sim = Simulator::default();
    let mut world = NetWorld::default();
    let topo = build_three_routers(&mut world, &mut sim, &small_cfg(false)).expect("valid config");
    assert_eq!(topo.attack_flow, None);
    assert_eq!(topo.attack_cost, None);
}

#[test]
fn builder_rejects_invalid_config_without_touching_the_world() {
    let mut sim = Simulator::default();
    let mut world = NetWorld::default();
    let mut cfg = small_cfg(false);
    cfg.tcp_pairs = 0;

    assert!(build_three_routers(&mut world, &mut sim, &cfg).is_err());
    // Nothing was installed: running produces no traffic at all.
    sim.run_until(SimTime::from_secs(1), &mut world);
    assert_eq!(world.net.stats.delivered_pkts, 0);
    assert_eq!(world.net.stats.dropped_pkts, 0);
}
