//! TCP（NewReno 风格）协议实现
//!
//! 支持 LDoS 实验所需的功能：
//! - 数据段/ACK 段/FIN；
//! - 慢启动 + 拥塞避免 + 3 dupACK 快速重传/快速恢复（NewReno 部分 ACK 处理）；
//! - RFC 6298 的 SRTT/RTTVAR/RTO 估计（带下限钳制与指数退避上限）；
//! - 超时回到慢启动（cwnd = 1 MSS）——这正是 LDoS 攻击利用的机制。
//!
//! 注意：这是仿真用途的"极简 TCP"，不实现握手/窗口通告/选择确认等。
//! RTT 采样遵循 Karn 规则：重传过的段不产生采样。

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, trace};

use crate::net::{NetWorld, Network, NodeId, TcpSegment, Transport};
use crate::sim::{Event, EventHandle, SimTime, Simulator, World};

/// 一个 TCP 连接的唯一标识（复用 `flow_id` 的语义）。
pub type TcpConnId = u64;

/// RFC 6298：alpha = 1/8, beta = 1/4，用整数移位实现。
const SRTT_SHIFT: u32 = 3;
const RTTVAR_SHIFT: u32 = 2;

#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// MSS（数据段载荷大小，字节）
    pub mss: u32,
    /// ACK/控制包大小（字节）
    pub ack_bytes: u32,
    /// 初始 cwnd（字节）
    pub init_cwnd_bytes: u64,
    /// 初始 ssthresh（字节）
    pub init_ssthresh_bytes: u64,
    /// 第一个 RTT 采样前使用的 RTO
    pub init_rto: SimTime,
    /// RTO 下限（钳制估计值）
    pub min_rto: SimTime,
    /// RTO 上限（退避封顶）
    pub max_rto: SimTime,
}

impl Default for TcpConfig {
    fn default() -> Self {
        let mss = 1460;
        Self {
            mss,
            ack_bytes: 64,
            init_cwnd_bytes: mss as u64,
            init_ssthresh_bytes: (mss as u64).saturating_mul(1_000),
            // ns-3 的 MinRto 默认 1s——LDoS 攻击周期 T 正是据此选取的
            init_rto: SimTime::from_secs(1),
            min_rto: SimTime::from_secs(1),
            max_rto: SimTime::from_secs(60),
        }
    }
}

/// 拥塞控制状态机。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    SlowStart,
    CongestionAvoidance,
    FastRecovery,
}

#[derive(Debug, Clone)]
struct SentSeg {
    len: u32,
    sent_at: SimTime,
    retransmitted: bool,
}

#[derive(Debug)]
pub struct TcpConn {
    pub id: TcpConnId,
    pub src: NodeId,
    pub dst: NodeId,
    /// None 表示无界 bulk 流（发送到仿真结束）
    pub total_bytes: Option<u64>,
    pub cfg: TcpConfig,

    // sender
    state: TcpState,
    next_seq: u64,
    last_acked: u64,
    cwnd_bytes: u64,
    ssthresh_bytes: u64,
    dup_acks: u32,
    /// FastRecovery 的恢复点（进入恢复时的 next_seq）
    recover: u64,
    inflight: BTreeMap<u64, SentSeg>, // seq -> segment

    // RFC 6298 估计器
    srtt: Option<SimTime>,
    rttvar: SimTime,
    rto: SimTime,

    // 重传定时器：句柄用于取消，代数用于 stale 检查
    rto_timer: Option<EventHandle>,
    rto_gen: u64,

    // receiver
    rcv_nxt: u64,
    rcv_ooo: BTreeMap<u64, u32>, // 乱序缓存 seq -> len

    // lifecycle
    fin_sent: bool,
    closed: bool,
    start_at: Option<SimTime>,
    done_at: Option<SimTime>,
}

impl TcpConn {
    pub fn new(
        id: TcpConnId,
        src: NodeId,
        dst: NodeId,
        total_bytes: Option<u64>,
        cfg: TcpConfig,
    ) -> Self {
        let init_rto = cfg.init_rto;
        let mss = cfg.mss as u64;
        // 不变量：cwnd 任何时刻不小于 1 MSS
        let cwnd = cfg.init_cwnd_bytes.max(mss);
        let ssthresh = cfg.init_ssthresh_bytes.max(2 * mss);
        Self {
            id,
            src,
            dst,
            total_bytes,
            cfg,
            state: TcpState::SlowStart,
            next_seq: 0,
            last_acked: 0,
            cwnd_bytes: cwnd,
            ssthresh_bytes: ssthresh,
            dup_acks: 0,
            recover: 0,
            inflight: BTreeMap::new(),
            srtt: None,
            rttvar: SimTime::ZERO,
            rto: init_rto,
            rto_timer: None,
            rto_gen: 0,
            rcv_nxt: 0,
            rcv_ooo: BTreeMap::new(),
            fin_sent: false,
            closed: false,
            start_at: None,
            done_at: None,
        }
    }

    pub fn state(&self) -> TcpState {
        self.state
    }

    pub fn cwnd_bytes(&self) -> u64 {
        self.cwnd_bytes
    }

    pub fn ssthresh_bytes(&self) -> u64 {
        self.ssthresh_bytes
    }

    pub fn rto(&self) -> SimTime {
        self.rto
    }

    pub fn srtt(&self) -> Option<SimTime> {
        self.srtt
    }

    pub fn bytes_acked(&self) -> u64 {
        match self.total_bytes {
            Some(t) => self.last_acked.min(t),
            None => self.last_acked,
        }
    }

    pub fn received_contiguous(&self) -> u64 {
        self.rcv_nxt
    }

    pub fn is_done(&self) -> bool {
        self.done_at.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn start_time(&self) -> Option<SimTime> {
        self.start_at
    }

    pub fn done_time(&self) -> Option<SimTime> {
        self.done_at
    }

    fn earliest_unacked_seq(&self) -> Option<u64> {
        self.inflight.keys().next().copied()
    }

    fn inflight_bytes(&self) -> u64 {
        self.inflight.values().map(|s| s.len as u64).sum()
    }

    fn remaining_bytes(&self) -> u64 {
        match self.total_bytes {
            Some(t) => t.saturating_sub(self.next_seq),
            None => u64::MAX,
        }
    }

    /// RFC 6298 的估计器更新；每个有效新采样后 RTO 重算并钳制到
    /// [min_rto, max_rto]，同时隐式复位退避。
    fn update_rtt(&mut self, sample: SimTime) {
        match self.srtt {
            None => {
                self.srtt = Some(sample);
                self.rttvar = SimTime(sample.0 / 2);
            }
            Some(srtt) => {
                let diff = if srtt >= sample {
                    srtt.0 - sample.0
                } else {
                    sample.0 - srtt.0
                };
                self.rttvar = SimTime(
                    (self.rttvar.0 - (self.rttvar.0 >> RTTVAR_SHIFT)) + (diff >> RTTVAR_SHIFT),
                );
                self.srtt = Some(SimTime(
                    (srtt.0 - (srtt.0 >> SRTT_SHIFT)) + (sample.0 >> SRTT_SHIFT),
                ));
            }
        }
        let srtt = self.srtt.expect("srtt set above");
        let candidate = srtt.saturating_add(SimTime(self.rttvar.0.saturating_mul(4)));
        self.rto = SimTime(candidate.0.clamp(self.cfg.min_rto.0, self.cfg.max_rto.0));
        trace!(
            conn_id = self.id,
            sample_ns = sample.0,
            srtt_ns = srtt.0,
            rttvar_ns = self.rttvar.0,
            rto_ns = self.rto.0,
            "RTT 采样更新"
        );
    }
}

/// 重新武装重传定时器：旧句柄取消，代数 +1，使已在堆里的旧事件变 stale。
fn arm_rto(conn: &mut TcpConn, sim: &mut Simulator) {
    if let Some(h) = conn.rto_timer.take() {
        sim.cancel(h);
    }
    conn.rto_gen = conn.rto_gen.wrapping_add(1);
    let at = sim.now().saturating_add(conn.rto);
    let handle = sim.schedule(
        at,
        TcpRto {
            conn_id: conn.id,
            r#gen: conn.rto_gen,
        },
    );
    conn.rto_timer = Some(handle);
}

fn disarm_rto(conn: &mut TcpConn, sim: &mut Simulator) {
    if let Some(h) = conn.rto_timer.take() {
        sim.cancel(h);
    }
    conn.rto_gen = conn.rto_gen.wrapping_add(1);
}

/// 重传最早未确认段。重传过的段不再产生 RTT 采样（Karn 规则）。
fn retransmit_earliest(conn: &mut TcpConn, sim: &mut Simulator, net: &mut Network) {
    let Some(seq) = conn.earliest_unacked_seq() else {
        return;
    };
    let now = sim.now();
    let len = {
        let seg = conn.inflight.get_mut(&seq).expect("earliest seg exists");
        seg.retransmitted = true;
        seg.sent_at = now;
        seg.len
    };
    debug!(conn_id = conn.id, seq, len, "🔁 重传数据段");
    let mut pkt = net.make_packet(conn.id, len, conn.src, conn.dst, now);
    pkt.transport = Transport::Tcp(TcpSegment::Data { seq, len });
    net.forward_from(conn.src, pkt, sim);
}

#[derive(Debug, Default)]
pub struct TcpStack {
    conns: HashMap<TcpConnId, TcpConn>,
}

impl TcpStack {
    pub fn insert(&mut self, conn: TcpConn) {
        self.conns.insert(conn.id, conn);
    }

    pub fn get(&self, id: TcpConnId) -> Option<&TcpConn> {
        self.conns.get(&id)
    }

    pub fn get_mut(&mut self, id: TcpConnId) -> Option<&mut TcpConn> {
        self.conns.get_mut(&id)
    }

    /// 插入连接并立即开始发送（连接已建立假设）。
    pub fn start_conn(&mut self, conn: TcpConn, sim: &mut Simulator, net: &mut Network) {
        let id = conn.id;
        self.insert(conn);
        self.send_data_if_possible(id, sim, net);
    }

    pub(crate) fn send_data_if_possible(
        &mut self,
        id: TcpConnId,
        sim: &mut Simulator,
        net: &mut Network,
    ) {
        let Some(conn) = self.conns.get_mut(&id) else {
            return;
        };
        if conn.closed || conn.fin_sent {
            return;
        }

        if conn.start_at.is_none() {
            conn.start_at = Some(sim.now());
        }

        // 发送窗口：inflight bytes < cwnd
        let mut avail = conn.cwnd_bytes.saturating_sub(conn.inflight_bytes());

        while avail > 0 && conn.remaining_bytes() > 0 {
            let len = (conn.cfg.mss as u64)
                .min(conn.remaining_bytes())
                .min(avail) as u32;
            if len == 0 {
                break;
            }
            let seq = conn.next_seq;
            conn.next_seq = conn.next_seq.saturating_add(len as u64);
            avail = avail.saturating_sub(len as u64);

            let now = sim.now();
            let mut pkt = net.make_packet(conn.id, len, conn.src, conn.dst, now);
            pkt.transport = Transport::Tcp(TcpSegment::Data { seq, len });

            conn.inflight.insert(
                seq,
                SentSeg {
                    len,
                    sent_at: now,
                    retransmitted: false,
                },
            );

            // 定时器只在未武装时启动（RFC 6298 5.1）
            if conn.rto_timer.is_none() {
                arm_rto(conn, sim);
            }

            trace!(conn_id = id, seq, len, cwnd = conn.cwnd_bytes, "发送数据段");
            net.forward_from(conn.src, pkt, sim);
        }
    }

    fn send_ctrl(
        &mut self,
        id: TcpConnId,
        from_dst_side: bool,
        seg: TcpSegment,
        sim: &mut Simulator,
        net: &mut Network,
    ) {
        let Some(conn) = self.conns.get(&id) else {
            return;
        };
        let (from, to) = if from_dst_side {
            (conn.dst, conn.src)
        } else {
            (conn.src, conn.dst)
        };
        let mut pkt = net.make_packet(conn.id, conn.cfg.ack_bytes, from, to, sim.now());
        pkt.transport = Transport::Tcp(seg);
        net.forward_from(from, pkt, sim);
    }

    pub fn on_tcp_segment(
        &mut self,
        conn_id: TcpConnId,
        at: NodeId,
        seg: TcpSegment,
        sim: &mut Simulator,
        net: &mut Network,
    ) {
        match seg {
            TcpSegment::Data { seq, len } => self.on_data(conn_id, at, seq, len, sim, net),
            TcpSegment::Ack { ack } => self.on_ack(conn_id, at, ack, sim, net),
            TcpSegment::Fin => {
                let Some(conn) = self.conns.get(&conn_id) else {
                    return;
                };
                if at != conn.dst {
                    return;
                }
                self.send_ctrl(conn_id, true, TcpSegment::FinAck, sim, net);
            }
            TcpSegment::FinAck => {
                let Some(conn) = self.conns.get_mut(&conn_id) else {
                    return;
                };
                if at != conn.src {
                    return;
                }
                conn.closed = true;
                disarm_rto(conn, sim);
                debug!(conn_id, "连接关闭");
            }
        }
    }

    /// 接收端：乱序段缓存，始终回累计 ACK（dupACK 体现为 ack 不前进）。
    fn on_data(
        &mut self,
        conn_id: TcpConnId,
        at: NodeId,
        seq: u64,
        len: u32,
        sim: &mut Simulator,
        net: &mut Network,
    ) {
        let Some(conn) = self.conns.get_mut(&conn_id) else {
            return;
        };
        if at != conn.dst {
            return;
        }

        if seq == conn.rcv_nxt {
            conn.rcv_nxt = conn.rcv_nxt.saturating_add(len as u64);
            // 乱序缓存里紧随其后的段也一并确认
            while let Some((&s, &l)) = conn.rcv_ooo.first_key_value() {
                if s > conn.rcv_nxt {
                    break;
                }
                let end = s.saturating_add(l as u64);
                if end > conn.rcv_nxt {
                    conn.rcv_nxt = end;
                }
                conn.rcv_ooo.remove(&s);
            }
        } else if seq > conn.rcv_nxt {
            conn.rcv_ooo.insert(seq, len);
        }
        // 过时的重复数据段直接丢掉（ACK 仍然要回）

        let ack = conn.rcv_nxt;
        self.send_ctrl(conn_id, true, TcpSegment::Ack { ack }, sim, net);
    }

    fn on_ack(
        &mut self,
        conn_id: TcpConnId,
        at: NodeId,
        ack: u64,
        sim: &mut Simulator,
        net: &mut Network,
    ) {
        let Some(conn) = self.conns.get_mut(&conn_id) else {
            return;
        };
        if at != conn.src || conn.closed {
            return;
        }

        let mss = conn.cfg.mss as u64;

        if ack > conn.last_acked {
            let newly_acked = ack - conn.last_acked;
            conn.last_acked = ack;

            // 移除已确认段；最后一个未重传段产生 RTT 采样（Karn 规则）
            let mut sample = None;
            let mut to_remove = Vec::new();
            for (&s, sent) in conn.inflight.iter() {
                let end = s.saturating_add(sent.len as u64);
                if end <= ack {
                    to_remove.push(s);
                    if !sent.retransmitted {
                        sample = Some(sim.now().saturating_sub(sent.sent_at));
                    }
                } else {
                    break;
                }
            }
            for s in to_remove {
                conn.inflight.remove(&s);
            }
            if let Some(s) = sample {
                conn.update_rtt(s);
            }

            match conn.state {
                TcpState::FastRecovery => {
                    if ack >= conn.recover {
                        // 恢复点被完整确认：收缩回 ssthresh，回到拥塞避免
                        conn.cwnd_bytes = conn.ssthresh_bytes.max(mss);
                        conn.state = TcpState::CongestionAvoidance;
                        conn.dup_acks = 0;
                        debug!(conn_id, cwnd = conn.cwnd_bytes, "退出快速恢复");
                    } else {
                        // 部分 ACK：重传下一个洞，按已确认量收缩再补一个 MSS
                        conn.cwnd_bytes = conn
                            .cwnd_bytes
                            .saturating_sub(newly_acked)
                            .saturating_add(mss)
                            .max(mss);
                        conn.dup_acks = 0;
                        retransmit_earliest(conn, sim, net);
                    }
                }
                TcpState::SlowStart => {
                    conn.dup_acks = 0;
                    conn.cwnd_bytes = conn.cwnd_bytes.saturating_add(mss);
                    if conn.cwnd_bytes >= conn.ssthresh_bytes {
                        conn.state = TcpState::CongestionAvoidance;
                        debug!(conn_id, cwnd = conn.cwnd_bytes, "进入拥塞避免");
                    }
                }
                TcpState::CongestionAvoidance => {
                    conn.dup_acks = 0;
                    // 每个 ACK 增加 mss²/cwnd（约等于每 RTT 一个 MSS）
                    let inc = (mss.saturating_mul(mss) / conn.cwnd_bytes.max(1)).max(1);
                    conn.cwnd_bytes = conn.cwnd_bytes.saturating_add(inc);
                }
            }
            conn.cwnd_bytes = conn.cwnd_bytes.max(mss);

            // 新 ACK 重启定时器；没有在途数据则停掉（RFC 6298 5.2/5.3）
            if conn.inflight.is_empty() {
                disarm_rto(conn, sim);
            } else {
                arm_rto(conn, sim);
            }

            // 完成判定：有界流在全部数据被累计确认后发 FIN
            if let Some(total) = conn.total_bytes {
                if conn.last_acked >= total && !conn.fin_sent {
                    conn.fin_sent = true;
                    conn.done_at = Some(sim.now());
                    debug!(conn_id, "所有数据已确认，发送 FIN");
                    self.send_ctrl(conn_id, false, TcpSegment::Fin, sim, net);
                    return;
                }
            }

            self.send_data_if_possible(conn_id, sim, net);
        } else if ack == conn.last_acked && !conn.inflight.is_empty() {
            // dupACK
            conn.dup_acks = conn.dup_acks.saturating_add(1);
            let dup = conn.dup_acks;
            if dup == 3 && conn.state != TcpState::FastRecovery {
                // 快速重传 + 进入快速恢复（NewReno：cwnd = ssthresh）
                conn.ssthresh_bytes = (conn.cwnd_bytes / 2).max(2 * mss);
                conn.cwnd_bytes = conn.ssthresh_bytes;
                conn.recover = conn.next_seq;
                conn.state = TcpState::FastRecovery;
                debug!(
                    conn_id,
                    ssthresh = conn.ssthresh_bytes,
                    recover = conn.recover,
                    "⚡ 3 dupACK：快速重传"
                );
                retransmit_earliest(conn, sim, net);
                arm_rto(conn, sim);
            } else if conn.state == TcpState::FastRecovery && dup > 3 {
                // 快速恢复期间每个额外 dupACK 使 cwnd 膨胀一个 MSS
                conn.cwnd_bytes = conn.cwnd_bytes.saturating_add(mss);
                self.send_data_if_possible(conn_id, sim, net);
            }
        }
    }

    /// RTO 到期：任何状态回到慢启动，cwnd 收缩到 1 MSS，RTO 指数退避。
    pub(crate) fn on_rto(
        &mut self,
        conn_id: TcpConnId,
        r#gen: u64,
        sim: &mut Simulator,
        net: &mut Network,
    ) {
        let Some(conn) = self.conns.get_mut(&conn_id) else {
            return;
        };
        // 定时器武装后又被 ACK 重置/取消过：stale no-op
        if conn.rto_gen != r#gen {
            trace!(conn_id, r#gen, "stale RTO 定时器，忽略");
            return;
        }
        conn.rto_timer = None;
        if conn.closed || conn.inflight.is_empty() {
            return;
        }

        let mss = conn.cfg.mss as u64;
        conn.ssthresh_bytes = (conn.cwnd_bytes / 2).max(2 * mss);
        conn.cwnd_bytes = mss;
        conn.dup_acks = 0;
        conn.state = TcpState::SlowStart;
        // 指数退避，封顶 max_rto；下一个有效采样会重算
        conn.rto = SimTime((conn.rto.0.saturating_mul(2)).min(conn.cfg.max_rto.0));

        debug!(
            conn_id,
            ssthresh = conn.ssthresh_bytes,
            rto_ns = conn.rto.0,
            "⏰ RTO 超时：回到慢启动"
        );

        retransmit_earliest(conn, sim, net);
        arm_rto(conn, sim);
    }
}

/// 启动一个 TCP 流（连接已建立假设）
#[derive(Debug)]
pub struct TcpStart {
    pub conn: TcpConn,
}

impl Event for TcpStart {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let TcpStart { conn } = *self;
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");

        // 规避同时借用 `w.net` 与 `w.net.tcp`
        let mut tcp = std::mem::take(&mut w.net.tcp);
        tcp.start_conn(conn, sim, &mut w.net);
        w.net.tcp = tcp;
    }
}

/// TCP RTO 事件：代数匹配时才触发超时重传，否则视为 stale。
#[derive(Debug)]
pub struct TcpRto {
    pub conn_id: TcpConnId,
    pub r#gen: u64,
}

impl Event for TcpRto {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let TcpRto { conn_id, r#gen } = *self;
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");

        let mut tcp = std::mem::take(&mut w.net.tcp);
        tcp.on_rto(conn_id, r#gen, sim, &mut w.net);
        w.net.tcp = tcp;
    }
}
