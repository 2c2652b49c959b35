//! 方法调用
//!
//! `invoke` 按名字调用网络、节点或组上的方法。方法表在启动时显式构建，
//! 每个方法声明参数类型，字符串参数在调用前逐个转换。

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::net::{NetError, NetId, Network, NodeKind};
use crate::sim::{Scheduler, SimTime};

/// 调用目标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Target {
    Network,
    Node(NetId),
    Group(NetId),
}

impl Target {
    fn table(self) -> &'static str {
        match self {
            Target::Network => "network",
            Target::Node(_) => "node",
            Target::Group(_) => "group",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Network => f.write_str("network"),
            Target::Node(id) | Target::Group(id) => write!(f, "{} {}", self.table(), id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    UInt,
    Float,
    Bool,
    Str,
    NetId,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamKind::Int => "int",
            ParamKind::UInt => "uint",
            ParamKind::Float => "float",
            ParamKind::Bool => "bool",
            ParamKind::Str => "string",
            ParamKind::NetId => "net id",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Str(String),
    NetId(NetId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    pub kind: ParamKind,
}

const fn param(name: &'static str, kind: ParamKind) -> Param {
    Param { name, kind }
}

impl Param {
    /// 把字符串参数转换成声明的类型
    pub fn coerce(&self, raw: &str) -> Result<ArgValue, InvokeError> {
        let s = raw.trim();
        let value = match self.kind {
            ParamKind::Int => s.parse().ok().map(ArgValue::Int),
            ParamKind::UInt => s.parse().ok().map(ArgValue::UInt),
            ParamKind::Float => s.parse().ok().map(ArgValue::Float),
            ParamKind::Bool => match s {
                "true" | "1" => Some(ArgValue::Bool(true)),
                "false" | "0" => Some(ArgValue::Bool(false)),
                _ => None,
            },
            ParamKind::Str => Some(ArgValue::Str(raw.to_string())),
            ParamKind::NetId => s.parse().ok().map(ArgValue::NetId),
        };
        value.ok_or_else(|| InvokeError::ArgConversion {
            param: self.name.to_string(),
            value: raw.to_string(),
            kind: self.kind,
        })
    }
}

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("no method `{method}` on {table}")]
    NoSuchMethod { table: &'static str, method: String },
    #[error("unknown target {0}")]
    UnknownTarget(Target),
    #[error("method `{method}` takes {expected} argument(s), got {got}")]
    Arity {
        method: String,
        expected: usize,
        got: usize,
    },
    #[error("argument `{param}`: cannot convert `{value}` to {kind}")]
    ArgConversion {
        param: String,
        value: String,
        kind: ParamKind,
    },
    #[error(transparent)]
    Net(#[from] NetError),
}

/// 方法执行时可见的上下文
pub struct InvokeCtx<'a> {
    pub net: &'a mut Network,
    pub sched: &'a Scheduler,
    /// 节点或组的 id；对 network 目标无意义
    pub target: NetId,
}

pub type Handler = fn(&mut InvokeCtx<'_>, &[ArgValue]) -> Result<Option<String>, InvokeError>;

#[derive(Clone)]
pub struct Method {
    pub name: &'static str,
    pub params: &'static [Param],
    pub handler: Handler,
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

// ---------- 参数取值 ----------

fn uint(args: &[ArgValue], i: usize) -> u64 {
    match args.get(i) {
        Some(ArgValue::UInt(v)) => *v,
        _ => 0,
    }
}

fn net_id(args: &[ArgValue], i: usize) -> NetId {
    match args.get(i) {
        Some(ArgValue::NetId(v)) => *v,
        _ => NetId(0),
    }
}

fn text(args: &[ArgValue], i: usize) -> &str {
    match args.get(i) {
        Some(ArgValue::Str(v)) => v.as_str(),
        _ => "",
    }
}

fn some(v: impl ToString) -> Result<Option<String>, InvokeError> {
    Ok(Some(v.to_string()))
}

fn json<T: Serialize>(v: &T) -> Result<Option<String>, InvokeError> {
    Ok(serde_json::to_string(v).ok())
}

fn ids(list: &[NetId]) -> Vec<u32> {
    list.iter().map(|id| id.0).collect()
}

// ---------- network ----------

fn net_now(ctx: &mut InvokeCtx<'_>, _: &[ArgValue]) -> Result<Option<String>, InvokeError> {
    some(ctx.sched.now().as_nanos())
}

fn net_node_count(ctx: &mut InvokeCtx<'_>, _: &[ArgValue]) -> Result<Option<String>, InvokeError> {
    some(ctx.net.node_count())
}

fn net_connect(ctx: &mut InvokeCtx<'_>, args: &[ArgValue]) -> Result<Option<String>, InvokeError> {
    let latency = SimTime::from_nanos(uint(args, 2));
    let link = ctx.net.connect(net_id(args, 0), net_id(args, 1), latency, uint(args, 3));
    some(link.0)
}

fn net_send(ctx: &mut InvokeCtx<'_>, args: &[ArgValue]) -> Result<Option<String>, InvokeError> {
    let size = uint(args, 2);
    let size = u32::try_from(size).map_err(|_| InvokeError::ArgConversion {
        param: "size_bytes".to_string(),
        value: size.to_string(),
        kind: ParamKind::UInt,
    })?;
    let ttl = uint(args, 3);
    let ttl = u8::try_from(ttl).map_err(|_| InvokeError::ArgConversion {
        param: "ttl".to_string(),
        value: ttl.to_string(),
        kind: ParamKind::UInt,
    })?;
    let id = ctx
        .net
        .send(net_id(args, 0), net_id(args, 1), size, ttl, ctx.sched)?;
    some(id)
}

fn net_delivered(ctx: &mut InvokeCtx<'_>, _: &[ArgValue]) -> Result<Option<String>, InvokeError> {
    some(ctx.net.stats.delivered_pkts)
}

fn net_dropped(ctx: &mut InvokeCtx<'_>, _: &[ArgValue]) -> Result<Option<String>, InvokeError> {
    some(ctx.net.stats.dropped_pkts())
}

fn net_set_route(ctx: &mut InvokeCtx<'_>, args: &[ArgValue]) -> Result<Option<String>, InvokeError> {
    let csv = text(args, 2);
    let hops = csv
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.parse::<NetId>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| InvokeError::ArgConversion {
            param: "hops_csv".to_string(),
            value: csv.to_string(),
            kind: ParamKind::NetId,
        })?;
    ctx.net.routes.insert(net_id(args, 0), net_id(args, 1), hops);
    Ok(None)
}

fn net_rebuild_routes(ctx: &mut InvokeCtx<'_>, _: &[ArgValue]) -> Result<Option<String>, InvokeError> {
    ctx.net.rebuild_routes();
    some(ctx.net.routes.len())
}

fn net_stats(ctx: &mut InvokeCtx<'_>, _: &[ArgValue]) -> Result<Option<String>, InvokeError> {
    json(&ctx.net.stats)
}

// ---------- node ----------

fn node_name(ctx: &mut InvokeCtx<'_>, _: &[ArgValue]) -> Result<Option<String>, InvokeError> {
    let name = ctx.net.node_name(ctx.target).ok_or(NetError::UnknownNode(ctx.target))?;
    some(name)
}

fn node_id(ctx: &mut InvokeCtx<'_>, _: &[ArgValue]) -> Result<Option<String>, InvokeError> {
    some(ctx.target.0)
}

fn node_kind(ctx: &mut InvokeCtx<'_>, _: &[ArgValue]) -> Result<Option<String>, InvokeError> {
    let kind = match ctx.net.node_kind(ctx.target) {
        Some(NodeKind::Host) => "host",
        Some(NodeKind::Router) => "router",
        None => return Err(NetError::UnknownNode(ctx.target).into()),
    };
    some(kind)
}

fn node_algorithms(ctx: &mut InvokeCtx<'_>, _: &[ArgValue]) -> Result<Option<String>, InvokeError> {
    if !ctx.net.contains_node(ctx.target) {
        return Err(NetError::UnknownNode(ctx.target).into());
    }
    let (unicast, multicast) = ctx
        .net
        .router_algorithms(ctx.target)
        .ok_or(NetError::NotARouter(ctx.target))?;
    some(format!("{unicast},{multicast}"))
}

fn node_received(ctx: &mut InvokeCtx<'_>, _: &[ArgValue]) -> Result<Option<String>, InvokeError> {
    let inbox = ctx.net.inbox(ctx.target).ok_or(NetError::UnknownNode(ctx.target))?;
    some(inbox.len())
}

fn node_neighbors(ctx: &mut InvokeCtx<'_>, _: &[ArgValue]) -> Result<Option<String>, InvokeError> {
    json(&ids(ctx.net.neighbors(ctx.target)))
}

// ---------- group ----------

fn group_join(ctx: &mut InvokeCtx<'_>, args: &[ArgValue]) -> Result<Option<String>, InvokeError> {
    let joined = ctx.net.join_group(ctx.target, net_id(args, 0), ctx.sched)?;
    some(joined)
}

fn group_leave(ctx: &mut InvokeCtx<'_>, args: &[ArgValue]) -> Result<Option<String>, InvokeError> {
    let left = ctx.net.leave_group(ctx.target, net_id(args, 0), ctx.sched)?;
    some(left)
}

fn group_members(ctx: &mut InvokeCtx<'_>, _: &[ArgValue]) -> Result<Option<String>, InvokeError> {
    json(&ids(&ctx.net.group_members(ctx.target)?))
}

fn group_size(ctx: &mut InvokeCtx<'_>, _: &[ArgValue]) -> Result<Option<String>, InvokeError> {
    some(ctx.net.group_members(ctx.target)?.len())
}

fn group_contains(ctx: &mut InvokeCtx<'_>, args: &[ArgValue]) -> Result<Option<String>, InvokeError> {
    some(ctx.net.groups.is_member(ctx.target, net_id(args, 0)))
}

const NETWORK_METHODS: &[Method] = &[
    Method { name: "now", params: &[], handler: net_now },
    Method { name: "node_count", params: &[], handler: net_node_count },
    Method {
        name: "connect",
        params: &[
            param("from", ParamKind::NetId),
            param("to", ParamKind::NetId),
            param("latency_ns", ParamKind::UInt),
            param("bandwidth_bps", ParamKind::UInt),
        ],
        handler: net_connect,
    },
    Method {
        name: "send",
        params: &[
            param("src", ParamKind::NetId),
            param("dst", ParamKind::NetId),
            param("size_bytes", ParamKind::UInt),
            param("ttl", ParamKind::UInt),
        ],
        handler: net_send,
    },
    Method { name: "delivered_pkts", params: &[], handler: net_delivered },
    Method { name: "dropped_pkts", params: &[], handler: net_dropped },
    Method {
        name: "set_route",
        params: &[
            param("router", ParamKind::NetId),
            param("dst", ParamKind::NetId),
            param("hops_csv", ParamKind::Str),
        ],
        handler: net_set_route,
    },
    Method { name: "rebuild_routes", params: &[], handler: net_rebuild_routes },
    Method { name: "stats", params: &[], handler: net_stats },
];

const NODE_METHODS: &[Method] = &[
    Method { name: "name", params: &[], handler: node_name },
    Method { name: "id", params: &[], handler: node_id },
    Method { name: "kind", params: &[], handler: node_kind },
    Method { name: "algorithms", params: &[], handler: node_algorithms },
    Method { name: "received", params: &[], handler: node_received },
    Method { name: "neighbors", params: &[], handler: node_neighbors },
];

const GROUP_METHODS: &[Method] = &[
    Method { name: "join", params: &[param("node", ParamKind::NetId)], handler: group_join },
    Method { name: "leave", params: &[param("node", ParamKind::NetId)], handler: group_leave },
    Method { name: "members", params: &[], handler: group_members },
    Method { name: "size", params: &[], handler: group_size },
    Method { name: "contains", params: &[param("node", ParamKind::NetId)], handler: group_contains },
];

/// 三张方法表：network / node / group
#[derive(Debug, Clone, Default)]
pub struct MethodRegistry {
    network: HashMap<&'static str, Method>,
    node: HashMap<&'static str, Method>,
    group: HashMap<&'static str, Method>,
}

impl MethodRegistry {
    /// 内置方法
    pub fn standard() -> Self {
        let mut reg = Self::default();
        for m in NETWORK_METHODS {
            reg.register(Target::Network, m.clone());
        }
        for m in NODE_METHODS {
            reg.register(Target::Node(NetId(0)), m.clone());
        }
        for m in GROUP_METHODS {
            reg.register(Target::Group(NetId(0)), m.clone());
        }
        reg
    }

    fn table_mut(&mut self, target: Target) -> &mut HashMap<&'static str, Method> {
        match target {
            Target::Network => &mut self.network,
            Target::Node(_) => &mut self.node,
            Target::Group(_) => &mut self.group,
        }
    }

    /// 注册（或替换）一个方法；只看 target 的种类
    pub fn register(&mut self, target: Target, method: Method) {
        self.table_mut(target).insert(method.name, method);
    }

    pub fn lookup(&self, target: Target, name: &str) -> Option<&Method> {
        let table = match target {
            Target::Network => &self.network,
            Target::Node(_) => &self.node,
            Target::Group(_) => &self.group,
        };
        table.get(name)
    }

    /// 解析目标与方法、转换参数并执行
    pub fn invoke(
        &self,
        target: Target,
        method: &str,
        args: &[String],
        net: &mut Network,
        sched: &Scheduler,
    ) -> Result<Option<String>, InvokeError> {
        let target_id = match target {
            Target::Network => NetId(0),
            Target::Node(id) if net.contains_node(id) => id,
            Target::Group(id) if net.groups.get(id).is_some() => id,
            _ => return Err(InvokeError::UnknownTarget(target)),
        };
        let m = self
            .lookup(target, method)
            .ok_or_else(|| InvokeError::NoSuchMethod {
                table: target.table(),
                method: method.to_string(),
            })?;
        if m.params.len() != args.len() {
            return Err(InvokeError::Arity {
                method: method.to_string(),
                expected: m.params.len(),
                got: args.len(),
            });
        }
        let values = m
            .params
            .iter()
            .zip(args)
            .map(|(p, raw)| p.coerce(raw))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(%target, method, ?args, "调用方法");
        let mut ctx = InvokeCtx {
            net,
            sched,
            target: target_id,
        };
        (m.handler)(&mut ctx, &values)
    }
}
