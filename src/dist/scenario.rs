//! 把场景部署到 manager 与 worker 上

use std::collections::BTreeMap;

use tracing::info;

use super::error::DistError;
use super::manager::Manager;
use crate::config::{ConfigError, ScenarioSpec};
use crate::net::{NetId, NodeKind};
use crate::proxy::{GroupHandle, NodeHandle, RemoteAddr};
use crate::sim::{Ownership, SimTime, WorkerId};

/// 部署结果：名字到句柄
#[derive(Debug, Default)]
pub struct Deployed {
    pub nodes: BTreeMap<String, NodeHandle>,
    pub groups: BTreeMap<String, GroupHandle>,
    pub sources: Vec<RemoteAddr>,
}

impl Deployed {
    pub fn node_id(&self, name: &str) -> Option<NetId> {
        self.nodes.get(name).map(NodeHandle::net_id)
    }

    fn resolve(&self, name: &str) -> Result<NetId, ConfigError> {
        self.nodes
            .get(name)
            .map(NodeHandle::net_id)
            .or_else(|| self.groups.get(name).map(GroupHandle::net_id))
            .ok_or_else(|| ConfigError::UnknownName(name.to_string()))
    }
}

fn placement(manager: &Manager, name: &str, index: Option<usize>) -> Result<Option<WorkerId>, ConfigError> {
    let Some(index) = index else {
        return Ok(None);
    };
    manager
        .worker_by_index(index)
        .map(Some)
        .ok_or_else(|| ConfigError::BadWorker {
            name: name.to_string(),
            index,
            available: manager.workers().len(),
        })
}

/// 依次创建节点、链路、组与流量源
pub fn deploy(manager: &Manager, spec: &ScenarioSpec) -> Result<Deployed, DistError> {
    spec.validate()?;
    let mut out = Deployed::default();

    for node in &spec.nodes {
        let worker = placement(manager, &node.name, node.worker)?;
        let handle = match node.kind() {
            NodeKind::Host => manager.create_node(worker, "host", vec![node.name.clone()])?,
            NodeKind::Router => {
                let mut args = vec![node.name.clone()];
                args.push(node.algorithm.clone().unwrap_or_else(|| "shortest_path".to_string()));
                args.push(node.multicast.clone().unwrap_or_else(|| "multicast_tree".to_string()));
                manager.create_node(worker, "router", args)?
            }
        };
        out.nodes.insert(node.name.clone(), handle);
    }

    for link in &spec.links {
        let a = out.resolve(&link.from)?;
        let b = out.resolve(&link.to)?;
        let latency = SimTime::from_micros(link.latency_us());
        manager.connect(a, b, latency, link.bandwidth_bps())?;
        if link.bidirectional() {
            manager.connect(b, a, latency, link.bandwidth_bps())?;
        }
    }

    for group in &spec.groups {
        let router = group.router.as_deref().map(|r| out.resolve(r)).transpose()?;
        // 路由器感知组必须和路由器在同一分区
        let worker = match router.and_then(|r| manager.owner(r)) {
            Some(Ownership::Remote(w)) => Some(w),
            Some(Ownership::Local) => None,
            None => placement(manager, &group.name, group.worker)?,
        };
        let handle = manager.create_group(worker, router)?;
        for member in &group.members {
            manager.join(&handle, out.resolve(member)?)?;
        }
        out.groups.insert(group.name.clone(), handle);
    }

    for t in &spec.traffic {
        let src = out.resolve(&t.src)?;
        let dst = out.resolve(&t.dst)?;
        let worker = match manager.owner(src) {
            Some(Ownership::Remote(w)) => Some(w),
            _ => None,
        };
        let args = vec![
            src.0.to_string(),
            dst.0.to_string(),
            t.pkts().to_string(),
            SimTime::from_micros(t.gap_us()).as_nanos().to_string(),
            t.size_bytes().to_string(),
            t.ttl().to_string(),
            SimTime::from_micros(t.start_us()).as_nanos().to_string(),
        ];
        let addr = manager.create_object(worker, "source", src, args)?;
        out.sources.push(addr);
    }

    info!(
        nodes = out.nodes.len(),
        links = spec.links.len(),
        groups = out.groups.len(),
        sources = out.sources.len(),
        "📦 场景部署完成"
    );
    Ok(out)
}
