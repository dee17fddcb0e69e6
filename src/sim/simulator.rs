//! 仿真器
//!
//! 定义事件驱动仿真器，维护当前时间与事件队列。
//!
//! 取消语义：`cancel` 只做标记（tombstone），不从堆中移除；
//! 被标记的事件在弹出时跳过。对已执行的 handle 调用 `cancel` 是 no-op。

use super::event::Event;
use super::scheduled_event::ScheduledEvent;
use super::time::SimTime;
use super::world::World;
use std::collections::{BinaryHeap, HashSet};
use tracing::{debug, info, trace};

/// 已调度事件的句柄，用于取消。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle {
    seq: u64,
}

/// 事件驱动仿真器：维护当前时间与事件队列。
#[derive(Default)]
pub struct Simulator {
    now: SimTime,
    next_seq: u64,
    q: BinaryHeap<ScheduledEvent>,
    cancelled: HashSet<u64>,
}

impl Simulator {
    /// 获取当前仿真时间
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// 调度事件在指定时间执行，返回可用于取消的句柄。
    ///
    /// 向过去调度是编程错误，直接 panic（见 ScheduledEvent 的排序约定）。
    #[tracing::instrument(skip(self, ev), fields(event_type = std::any::type_name::<E>(), schedule_at = ?at))]
    pub fn schedule<E: Event>(&mut self, at: SimTime, ev: E) -> EventHandle {
        assert!(
            at >= self.now,
            "scheduled into the past: at={:?} < now={:?} (event {})",
            at,
            self.now,
            std::any::type_name::<E>(),
        );

        let seq = self.next_seq;
        trace!(now = ?self.now, seq, "调度事件");

        self.next_seq = self.next_seq.wrapping_add(1);
        self.q.push(ScheduledEvent {
            at,
            seq,
            ev: Box::new(ev),
        });

        debug!(queue_size = self.q.len(), "事件已加入队列");
        EventHandle { seq }
    }

    /// 取消已调度的事件。若事件已执行则为 no-op。
    pub fn cancel(&mut self, handle: EventHandle) {
        trace!(seq = handle.seq, "取消事件");
        self.cancelled.insert(handle.seq);
    }

    /// 弹出下一个未被取消的事件。
    fn pop_live(&mut self) -> Option<ScheduledEvent> {
        while let Some(item) = self.q.pop() {
            if self.cancelled.remove(&item.seq) {
                trace!(seq = item.seq, "跳过已取消事件");
                continue;
            }
            return Some(item);
        }
        None
    }

    /// 运行直到事件队列为空或到达 `until`。
    pub fn run_until(&mut self, until: SimTime, world: &mut dyn World) {
        while let Some(top) = self.q.peek() {
            if top.at > until {
                break;
            }
            let item = self.q.pop().expect("peek then pop");
            if self.cancelled.remove(&item.seq) {
                trace!(seq = item.seq, "跳过已取消事件");
                continue;
            }
            self.now = item.at;
            item.ev.execute(self, world);
            world.on_tick(self);
        }
        self.now = self.now.max(until);
    }

    /// 运行所有事件直到队列为空。
    #[tracing::instrument(skip(self, world))]
    pub fn run(&mut self, world: &mut dyn World) {
        info!("▶️  开始运行仿真");
        debug!(now = ?self.now, queue_size = self.q.len(), "初始状态");

        let mut event_count = 0u64;
        while let Some(item) = self.pop_live() {
            event_count += 1;
            self.now = item.at;

            trace!(
                event_num = event_count,
                now = ?self.now,
                seq = item.seq,
                remaining_queue = self.q.len(),
                "执行事件"
            );

            item.ev.execute(self, world);
            world.on_tick(self);
        }

        info!(
            total_events = event_count,
            final_time = ?self.now,
            "✅ 仿真完成"
        );
    }
}
