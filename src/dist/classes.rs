//! 可远程创建的实体类
//!
//! create 创建节点（host / router），createObject 创建组播组与流量源。
//! 构造参数全是字符串，按位置解析。

use std::collections::HashMap;
use std::str::FromStr;

use tracing::info;

use crate::net::{
    GroupKind, NetId, Network, PacketSource, RoutingEngine, algorithm_by_name,
};
use crate::proto::ExecError;
use crate::sim::{Pid, Scheduler, SimTime};

/// 构造函数：返回对象附带的进程（若有）
pub type Ctor = fn(NetId, &[String], &mut Network, &Scheduler) -> Result<Option<Pid>, ExecError>;

const DEFAULT_UNICAST: &str = "shortest_path";
const DEFAULT_MULTICAST: &str = "multicast_tree";

fn arg<'a>(args: &'a [String], i: usize, name: &str) -> Result<&'a str, ExecError> {
    args.get(i)
        .map(String::as_str)
        .ok_or_else(|| ExecError::BadArgs(format!("missing argument `{name}`")))
}

fn parsed<T: FromStr>(args: &[String], i: usize, name: &str) -> Result<T, ExecError> {
    let raw = arg(args, i, name)?;
    raw.trim()
        .parse()
        .map_err(|_| ExecError::BadArgs(format!("argument `{name}`: cannot parse `{raw}`")))
}

fn create_host(id: NetId, args: &[String], net: &mut Network, _: &Scheduler) -> Result<Option<Pid>, ExecError> {
    let name = arg(args, 0, "name")?;
    net.add_host(id, name)?;
    info!(node = %id, name, "🖥️  创建主机");
    Ok(None)
}

fn create_router(id: NetId, args: &[String], net: &mut Network, _: &Scheduler) -> Result<Option<Pid>, ExecError> {
    let name = arg(args, 0, "name")?;
    let unicast = args.get(1).map(String::as_str).unwrap_or(DEFAULT_UNICAST);
    let multicast = args.get(2).map(String::as_str).unwrap_or(DEFAULT_MULTICAST);
    let seed = id.0 as u64;
    let engine = RoutingEngine::new(
        algorithm_by_name(unicast, seed)?,
        algorithm_by_name(multicast, seed)?,
    );
    net.add_router(id, name, engine)?;
    info!(node = %id, name, unicast, multicast, "🔀 创建路由器");
    Ok(None)
}

fn create_group(id: NetId, _: &[String], net: &mut Network, _: &Scheduler) -> Result<Option<Pid>, ExecError> {
    net.create_group(id, GroupKind::Abstract)?;
    Ok(None)
}

fn create_router_group(id: NetId, args: &[String], net: &mut Network, _: &Scheduler) -> Result<Option<Pid>, ExecError> {
    let router: NetId = parsed(args, 0, "router")?;
    net.create_group(id, GroupKind::RouterAware { router })?;
    Ok(None)
}

/// args: src, dst, pkts, gap_ns, size_bytes, ttl, start_ns
fn create_source(_: NetId, args: &[String], _: &mut Network, sched: &Scheduler) -> Result<Option<Pid>, ExecError> {
    let source = PacketSource {
        src: parsed(args, 0, "src")?,
        dst: parsed(args, 1, "dst")?,
        remaining: parsed(args, 2, "pkts")?,
        gap: SimTime::from_nanos(parsed(args, 3, "gap_ns")?),
        size_bytes: parsed(args, 4, "size_bytes")?,
        ttl: parsed(args, 5, "ttl")?,
    };
    let start = SimTime::from_nanos(parsed(args, 6, "start_ns")?);
    let pid = sched.spawn(Box::new(source), start)?;
    Ok(Some(pid))
}

/// 类名 -> 构造函数
#[derive(Clone)]
pub struct ClassRegistry {
    nodes: HashMap<&'static str, Ctor>,
    objects: HashMap<&'static str, Ctor>,
}

impl std::fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("objects", &self.objects.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl ClassRegistry {
    pub fn standard() -> Self {
        let mut nodes: HashMap<&'static str, Ctor> = HashMap::new();
        nodes.insert("host", create_host);
        nodes.insert("router", create_router);
        let mut objects: HashMap<&'static str, Ctor> = HashMap::new();
        objects.insert("group", create_group);
        objects.insert("router_group", create_router_group);
        objects.insert("source", create_source);
        Self { nodes, objects }
    }

    /// create
    pub fn create_node(
        &self,
        class: &str,
        id: NetId,
        args: &[String],
        net: &mut Network,
        sched: &Scheduler,
    ) -> Result<Option<Pid>, ExecError> {
        let ctor = self
            .nodes
            .get(class)
            .ok_or_else(|| ExecError::UnknownClass(class.to_string()))?;
        ctor(id, args, net, sched)
    }

    /// createObject
    pub fn create_object(
        &self,
        class: &str,
        id: NetId,
        args: &[String],
        net: &mut Network,
        sched: &Scheduler,
    ) -> Result<Option<Pid>, ExecError> {
        let ctor = self
            .objects
            .get(class)
            .ok_or_else(|| ExecError::UnknownClass(class.to_string()))?;
        ctor(id, args, net, sched)
    }
}
