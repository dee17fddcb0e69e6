//! 静态路由表
//!
//! 在事件循环开始前，对拓扑图做一次按最短跳数的预计算：
//! 对每个 dst 在反向图上 BFS 得到距离，然后为每个 (from, dst) 选出
//! 满足 `dist[next] = dist[from] - 1` 的下一跳。等价候选按邻接表插入顺序
//! 取第一个，保证确定性。运行期间不再重算。

use std::collections::{HashMap, VecDeque};

use super::id::NodeId;

#[derive(Debug, Default, Clone)]
pub struct RoutingTable {
    dirty: bool,
    /// (from, dst) -> 最短路径下一跳
    next_hop: HashMap<(NodeId, NodeId), NodeId>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self {
            dirty: true,
            next_hop: HashMap::new(),
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// 确保路由表基于当前拓扑是最新的。
    ///
    /// `adj[from]` 为从 `from` 出发的所有出边邻居；
    /// `rev_adj[to]` 为所有能到达 `to` 的前驱节点集合。
    pub fn ensure_built(&mut self, adj: &[Vec<NodeId>], rev_adj: &[Vec<NodeId>]) {
        if !self.dirty {
            return;
        }

        let n = adj.len();
        self.next_hop.clear();

        let mut dist: Vec<i32> = vec![i32::MAX; n];
        let mut q: VecDeque<NodeId> = VecDeque::new();

        for dst_idx in 0..n {
            dist.fill(i32::MAX);
            q.clear();

            let dst = NodeId(dst_idx);
            dist[dst_idx] = 0;
            q.push_back(dst);

            while let Some(v) = q.pop_front() {
                let dv = dist[v.0];
                for &pred in &rev_adj[v.0] {
                    if dist[pred.0] == i32::MAX {
                        dist[pred.0] = dv.saturating_add(1);
                        q.push_back(pred);
                    }
                }
            }

            for from_idx in 0..n {
                let from = NodeId(from_idx);
                if from == dst {
                    continue;
                }
                let df = dist[from_idx];
                if df == i32::MAX {
                    continue; // unreachable
                }
                for &nh in &adj[from_idx] {
                    if dist[nh.0] == df - 1 {
                        self.next_hop.insert((from, dst), nh);
                        break;
                    }
                }
            }
        }

        self.dirty = false;
    }

    /// 获取 (from, dst) 的下一跳。
    pub fn next_hop(&self, from: NodeId, dst: NodeId) -> Option<NodeId> {
        self.next_hop.get(&(from, dst)).copied()
    }
}
