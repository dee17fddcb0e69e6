//! 三路由器 LDoS 攻击实验
//!
//! 周期性短促高速 UDP 突发瞄准瓶颈链路，与受害 TCP 流的 RTO 碰撞，
//! 反复把流打回慢启动。用 `--no-attack` 跑对照组，比较正常流的 goodput。

use clap::Parser;
use ldosim_rs::app::AttackPulseConfig;
use ldosim_rs::net::NetWorld;
use ldosim_rs::scenario::{AttackConfig, ScenarioConfig};
use ldosim_rs::sim::{SimTime, Simulator};
use ldosim_rs::topo::build_three_routers;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ldos", about = "三路由器拓扑上的 LDoS（低速率 DoS）攻击仿真")]
struct Args {
    /// 正常 TCP 收发对数量
    #[arg(long, default_value_t = 10)]
    tcp_n: u32,

    /// 背景 TCP 收发对数量
    #[arg(long, default_value_t = 5)]
    btcp_n: u32,

    /// 背景 UDP 源数量
    #[arg(long, default_value_t = 5)]
    bu_n: u32,

    /// 接入链路速率（Mbps）
    #[arg(long, default_value_t = 100)]
    access_rate_mbps: u64,

    /// 接入链路传播时延（毫秒）
    #[arg(long, default_value_t = 30)]
    access_delay_ms: u64,

    /// 瓶颈链路速率（Mbps）
    #[arg(long, default_value_t = 10)]
    bottleneck_rate_mbps: u64,

    /// 瓶颈链路传播时延（毫秒）
    #[arg(long, default_value_t = 15)]
    bottleneck_delay_ms: u64,

    /// 仿真结束时间（秒）
    #[arg(long, default_value_t = 605.0)]
    stop_s: f64,

    /// 不安装攻击者（对照组）
    #[arg(long, default_value_t = false)]
    no_attack: bool,

    /// 攻击开始时间（秒）
    #[arg(long, default_value_t = 5.0)]
    attack_start_s: f64,

    /// 攻击周期 T（秒）
    #[arg(long, default_value_t = 1.0)]
    attack_period_s: f64,

    /// 每周期突发时长 t（秒）
    #[arg(long, default_value_t = 0.1)]
    attack_dur_s: f64,

    /// 突发速率 R（Mbps）
    #[arg(long, default_value_t = 20.0)]
    attack_rate_mbps: f64,

    /// 每流统计摘要输出到 JSON 文件；不填则只打印
    #[arg(long)]
    stats_json: Option<PathBuf>,

    /// 逐包 trace 输出到 JSON 文件
    #[arg(long)]
    trace_json: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let args = Args::parse();

    let mbps = |m: u64| m.saturating_mul(1_000_000);
    let stop = SimTime::from_secs_f64(args.stop_s);

    let mut cfg = ScenarioConfig {
        tcp_pairs: args.tcp_n,
        btcp_pairs: args.btcp_n,
        budp_sources: args.bu_n,
        stop,
        tracing: args.trace_json.is_some(),
        ..ScenarioConfig::default()
    };
    cfg.access.rate_bps = mbps(args.access_rate_mbps);
    cfg.access.delay = SimTime::from_millis(args.access_delay_ms);
    cfg.bottleneck.rate_bps = mbps(args.bottleneck_rate_mbps);
    cfg.bottleneck.delay = SimTime::from_millis(args.bottleneck_delay_ms);
    cfg.attack = if args.no_attack {
        None
    } else {
        Some(AttackConfig {
            start: SimTime::from_secs_f64(args.attack_start_s),
            stop,
            pulse: AttackPulseConfig {
                period: SimTime::from_secs_f64(args.attack_period_s),
                on_dur: SimTime::from_secs_f64(args.attack_dur_s),
                rate_bps: (args.attack_rate_mbps * 1_000_000.0) as u64,
                pkt_bytes: 1500,
            },
        })
    };

    let mut sim = Simulator::default();
    let mut world = NetWorld::default();

    let topo = match build_three_routers(&mut world, &mut sim, &cfg) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    if let Some(cost) = topo.attack_cost {
        println!("attack cost A = {cost}");
    }

    sim.run_until(cfg.stop, &mut world);

    let summaries = world.net.stats.finalize();

    // 分组汇总 goodput（以接收端字节计）
    let run_secs = cfg.stop.saturating_sub(cfg.start).as_secs_f64();
    let group_mbps = |flows: &[u64]| {
        let bytes: u64 = flows
            .iter()
            .map(|&f| world.net.stats.flow_rx_bytes(f))
            .sum();
        (bytes as f64 * 8.0) / run_secs / 1_000_000.0
    };

    println!(
        "done @ {:?}\n  normal tcp goodput:     {:.3} Mbps ({} flows)\n  background tcp goodput: {:.3} Mbps ({} flows)\n  background udp goodput: {:.3} Mbps ({} flows)\n  net: delivered_pkts={}, delivered_bytes={}, dropped_pkts={}, dropped_bytes={}",
        sim.now(),
        group_mbps(&topo.normal_tcp),
        topo.normal_tcp.len(),
        group_mbps(&topo.background_tcp),
        topo.background_tcp.len(),
        group_mbps(&topo.background_udp),
        topo.background_udp.len(),
        world.net.stats.delivered_pkts,
        world.net.stats.delivered_bytes,
        world.net.stats.dropped_pkts,
        world.net.stats.dropped_bytes,
    );

    for s in &summaries {
        println!(
            "  flow {}: tx={} rx={} lost={} mean_delay={:.3}ms",
            s.flow_id,
            s.packets_tx,
            s.packets_rx,
            s.packets_lost,
            s.mean_delay_ns as f64 / 1_000_000.0
        );
    }

    if let Some(path) = args.stats_json {
        let json = serde_json::to_string_pretty(&summaries).expect("serialize flow summaries");
        fs::write(&path, json).expect("write stats json");
        eprintln!("wrote per-flow stats to {}", path.display());
    }

    if let Some(path) = args.trace_json {
        if let Some(t) = world.net.trace.take() {
            let json = serde_json::to_string_pretty(&t.records).expect("serialize trace records");
            fs::write(&path, json).expect("write trace json");
            eprintln!("wrote packet trace to {}", path.display());
        }
    }
}
