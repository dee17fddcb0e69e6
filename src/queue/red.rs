//! RED（Random Early Detection）队列
//!
//! 经典 Floyd/Jacobson 字节模式 RED：
//! - 每次到达用 EWMA 更新平均占用 `avg = (1-w)·avg + w·instant`；
//! - `avg < min_th` 入队；`avg >= max_th` 强制丢弃；
//! - 两者之间按线性概率 `p_b = max_p·(avg-min_th)/(max_th-min_th)` 丢弃，
//!   并用 `p_a = p_b / (1 - count·p_b)` 随已入队计数放大，避免连续丢包聚集。
//!
//! 随机数用每队列独立的 splitmix64 状态，保证两次运行丢包序列完全一致。

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::net::Packet;

use super::PacketQueue;

/// RED 参数（字节单位）。
#[derive(Debug, Clone)]
pub struct RedParams {
    pub min_th_bytes: u64,
    pub max_th_bytes: u64,
    /// 线性段最大丢弃概率（(0, 1]）
    pub max_p: f64,
    /// EWMA 权重 w（(0, 1]）
    pub ewma_weight: f64,
}

impl Default for RedParams {
    fn default() -> Self {
        // ns-3 RedQueueDisc 的默认阈值：min 5 pkt / max 15 pkt / qw 0.002 / LInterm 50
        Self {
            min_th_bytes: 5 * super::DEFAULT_PKT_BYTES,
            max_th_bytes: 15 * super::DEFAULT_PKT_BYTES,
            max_p: 0.02,
            ewma_weight: 0.002,
        }
    }
}

#[derive(Debug)]
pub struct RedQueue {
    params: RedParams,
    max_bytes: u64,
    cur_bytes: u64,
    avg_bytes: f64,
    /// 自上次丢弃以来入队的 packet 数
    count_since_drop: u64,
    rng_state: u64,
    q: VecDeque<Packet>,
}

impl RedQueue {
    pub fn new(max_bytes: u64, params: RedParams, seed: u64) -> Self {
        Self {
            params,
            max_bytes,
            cur_bytes: 0,
            avg_bytes: 0.0,
            count_since_drop: 0,
            rng_state: seed,
            q: VecDeque::new(),
        }
    }

    pub fn avg_bytes(&self) -> f64 {
        self.avg_bytes
    }

    /// 给定平均占用下的线性丢弃概率 p_b（min 之下为 0，max 之上为 1）。
    pub fn probability(params: &RedParams, avg_bytes: f64) -> f64 {
        if avg_bytes < params.min_th_bytes as f64 {
            0.0
        } else if avg_bytes >= params.max_th_bytes as f64 {
            1.0
        } else {
            let span = (params.max_th_bytes - params.min_th_bytes) as f64;
            params.max_p * (avg_bytes - params.min_th_bytes as f64) / span
        }
    }

    /// 当前平均占用下的线性丢弃概率。
    pub fn drop_probability(&self) -> f64 {
        Self::probability(&self.params, self.avg_bytes)
    }

    /// [0, 1) 上的确定性随机数（splitmix64）。
    fn next_uniform(&mut self) -> f64 {
        self.rng_state = self.rng_state.wrapping_add(0x9E3779B97F4A7C15);
        let mut z = self.rng_state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^= z >> 31;
        (z >> 11) as f64 / (1u64 << 53) as f64
    }

    fn admit(&mut self, pkt: Packet) -> Result<(), Packet> {
        let sz = pkt.size_bytes as u64;
        if self.cur_bytes.saturating_add(sz) > self.max_bytes {
            // 物理溢出：无条件丢弃
            self.count_since_drop = 0;
            return Err(pkt);
        }
        self.cur_bytes = self.cur_bytes.saturating_add(sz);
        self.q.push_back(pkt);
        Ok(())
    }
}

impl PacketQueue for RedQueue {
    fn enqueue(&mut self, pkt: Packet) -> Result<(), Packet> {
        let w = self.params.ewma_weight;
        self.avg_bytes = (1.0 - w) * self.avg_bytes + w * self.cur_bytes as f64;

        trace!(
            avg_bytes = self.avg_bytes,
            cur_bytes = self.cur_bytes,
            count = self.count_since_drop,
            "RED 到达"
        );

        if self.avg_bytes < self.params.min_th_bytes as f64 {
            self.count_since_drop = 0;
            return self.admit(pkt);
        }

        if self.avg_bytes >= self.params.max_th_bytes as f64 {
            debug!(avg_bytes = self.avg_bytes, "RED 强制丢弃（avg >= max_th）");
            self.count_since_drop = 0;
            return Err(pkt);
        }

        let p_b = self.drop_probability();
        // count 修正：使丢弃间隔更均匀
        let scaled = self.count_since_drop as f64 * p_b;
        let p_a = if scaled >= 1.0 { 1.0 } else { p_b / (1.0 - scaled) };

        if self.next_uniform() < p_a {
            debug!(p_b, p_a, avg_bytes = self.avg_bytes, "RED 早期丢弃");
            self.count_since_drop = 0;
            return Err(pkt);
        }

        self.count_since_drop = self.count_since_drop.saturating_add(1);
        self.admit(pkt)
    }

    fn dequeue(&mut self) -> Option<Packet> {
        let pkt = self.q.pop_front()?;
        self.cur_bytes = self.cur_bytes.saturating_sub(pkt.size_bytes as u64);
        Some(pkt)
    }

    fn len(&self) -> usize {
        self.q.len()
    }

    fn bytes(&self) -> u64 {
        self.cur_bytes
    }

    fn capacity_bytes(&self) -> u64 {
        self.max_bytes
    }
}
