//! 路由表（含 ECMP）
//!
//! `(from, dst) -> [下一跳...]` 的映射，每个键至多一个条目，重复插入即替换。
//! 条目来源有两种：
//! - 按链路邻接关系做“最短跳数” BFS 预计算，得到所有等价下一跳（ECMP 候选）；
//! - 显式插入（例如静态组播树、控制协议下发的路由），这类条目不会被重建覆盖。

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use super::id::NetId;
use super::random::mix64;

#[derive(Debug, Default, Clone)]
pub struct RoutingTable {
    dirty: bool,
    /// (from, dst) -> 下一跳集合
    next_hops: HashMap<(NetId, NetId), Vec<NetId>>,
    /// 显式插入、重建时保留的键
    pinned: HashSet<(NetId, NetId)>,
    /// 用于 ECMP hashing 的盐（保证稳定且可控）
    hash_salt: u64,
}

impl RoutingTable {
    pub fn new(hash_salt: u64) -> Self {
        Self {
            dirty: true,
            next_hops: HashMap::new(),
            pinned: HashSet::new(),
            hash_salt,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// 显式插入；已存在的条目被替换。
    pub fn insert(&mut self, from: NetId, dst: NetId, hops: Vec<NetId>) {
        self.pinned.insert((from, dst));
        self.next_hops.insert((from, dst), hops);
    }

    pub fn remove(&mut self, from: NetId, dst: NetId) -> Option<Vec<NetId>> {
        self.pinned.remove(&(from, dst));
        self.next_hops.remove(&(from, dst))
    }

    pub fn len(&self) -> usize {
        self.next_hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.next_hops.is_empty()
    }

    /// 确保路由表基于当前拓扑是最新的。
    ///
    /// `adj[from]` 为从 `from` 出发的所有出边邻居。
    pub fn ensure_built(&mut self, adj: &BTreeMap<NetId, Vec<NetId>>) {
        if !self.dirty {
            return;
        }

        let pinned = &self.pinned;
        self.next_hops.retain(|k, _| pinned.contains(k));

        // 反向邻接：rev[to] = 所有能一跳到达 to 的节点
        let mut rev: BTreeMap<NetId, Vec<NetId>> = BTreeMap::new();
        for (from, nbrs) in adj {
            rev.entry(*from).or_default();
            for to in nbrs {
                rev.entry(*to).or_default().push(*from);
            }
        }
        let all: Vec<NetId> = rev.keys().copied().collect();

        // 对每个 dst 在反向图上做 BFS，得到到 dst 的最短跳数距离 dist[*]。
        // 然后对每个 from，选出所有满足 dist[next] = dist[from] - 1 的 next 作为 ECMP 候选。
        let mut dist: HashMap<NetId, u32> = HashMap::new();
        let mut q: VecDeque<NetId> = VecDeque::new();
        for dst in &all {
            dist.clear();
            q.clear();
            dist.insert(*dst, 0);
            q.push_back(*dst);

            while let Some(v) = q.pop_front() {
                let dv = dist[&v];
                for pred in rev.get(&v).map(Vec::as_slice).unwrap_or(&[]) {
                    if !dist.contains_key(pred) {
                        dist.insert(*pred, dv.saturating_add(1));
                        q.push_back(*pred);
                    }
                }
            }

            for (from, nbrs) in adj {
                if from == dst || self.pinned.contains(&(*from, *dst)) {
                    continue;
                }
                let Some(df) = dist.get(from).copied() else {
                    continue; // unreachable
                };
                let cands: Vec<NetId> = nbrs
                    .iter()
                    .copied()
                    .filter(|nh| dist.get(nh).is_some_and(|d| *d + 1 == df))
                    .collect();
                if !cands.is_empty() {
                    self.next_hops.insert((*from, *dst), cands);
                }
            }
        }

        self.dirty = false;
    }

    /// 获取 (from, dst) 的下一跳候选集合。
    pub fn next_hops(&self, from: NetId, dst: NetId) -> Option<&[NetId]> {
        self.next_hops.get(&(from, dst)).map(|v| v.as_slice())
    }

    /// 只看显式插入的条目
    pub fn pinned_hops(&self, from: NetId, dst: NetId) -> Option<&[NetId]> {
        if !self.pinned.contains(&(from, dst)) {
            return None;
        }
        self.next_hops(from, dst)
    }

    /// 基于任意 key 的稳定 ECMP 选择。
    pub fn pick_ecmp_with_key(&self, from: NetId, dst: NetId, key: u64, cands: &[NetId]) -> NetId {
        debug_assert!(!cands.is_empty());
        let h = mix64(
            key ^ (from.0 as u64).wrapping_mul(0x9E3779B97F4A7C15)
                ^ (dst.0 as u64)
                ^ self.hash_salt,
        );
        let idx = (h as usize) % cands.len();
        cands[idx]
    }
}
