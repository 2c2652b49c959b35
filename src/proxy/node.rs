//! 节点与组代理
//!
//! 代理只保存地址，不缓存任何仿真状态；每次操作都是一次远程请求。

use crate::link::{ProxyError, WorkerLink};
use crate::net::{NetId, Network};
use crate::proto::{Command, CreatePayload, ExecError, InvokeCall, MethodRegistry, Target};
use crate::sim::{Ownership, Scheduler};

use super::addr::RemoteAddr;

fn create(
    link: &WorkerLink,
    object: bool,
    class: &str,
    net_id: NetId,
    args: Vec<String>,
) -> Result<RemoteAddr, ProxyError> {
    let payload = CreatePayload {
        class: class.to_string(),
        net_id,
        args,
    };
    let cmd = if object {
        Command::CreateObject(payload)
    } else {
        Command::Create(payload)
    };
    RemoteAddr::from_reply(link.request(cmd)?)
}

fn invoke(
    link: &WorkerLink,
    target: Target,
    method: &str,
    args: Vec<String>,
) -> Result<Option<String>, ProxyError> {
    link.request(Command::Invoke(InvokeCall {
        target,
        method: method.to_string(),
        args,
    }))
}

fn flag(result: Option<String>) -> Result<bool, ProxyError> {
    match result.as_deref() {
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        other => Err(ProxyError::BadReply(format!("expected bool, got {other:?}"))),
    }
}

/// worker 上某个节点的代理
#[derive(Debug, Clone)]
pub struct NodeProxy {
    link: WorkerLink,
    addr: RemoteAddr,
}

impl NodeProxy {
    /// 两阶段创建：worker 成功创建后才有代理
    pub fn create(
        link: &WorkerLink,
        class: &str,
        net_id: NetId,
        args: Vec<String>,
    ) -> Result<NodeProxy, ProxyError> {
        let addr = create(link, false, class, net_id, args)?;
        Ok(NodeProxy {
            link: link.clone(),
            addr,
        })
    }

    pub fn addr(&self) -> &RemoteAddr {
        &self.addr
    }

    pub fn net_id(&self) -> NetId {
        self.addr.net_id
    }

    pub fn invoke(&self, method: &str, args: Vec<String>) -> Result<Option<String>, ProxyError> {
        invoke(&self.link, Target::Node(self.addr.net_id), method, args)
    }
}

/// worker 上某个组播组的代理
#[derive(Debug, Clone)]
pub struct GroupProxy {
    link: WorkerLink,
    addr: RemoteAddr,
}

impl GroupProxy {
    pub fn create(
        link: &WorkerLink,
        class: &str,
        net_id: NetId,
        args: Vec<String>,
    ) -> Result<GroupProxy, ProxyError> {
        let addr = create(link, true, class, net_id, args)?;
        Ok(GroupProxy {
            link: link.clone(),
            addr,
        })
    }

    pub fn addr(&self) -> &RemoteAddr {
        &self.addr
    }

    pub fn net_id(&self) -> NetId {
        self.addr.net_id
    }

    fn call(&self, method: &str, args: Vec<String>) -> Result<Option<String>, ProxyError> {
        invoke(&self.link, Target::Group(self.addr.net_id), method, args)
    }

    pub fn join(&self, node: NetId) -> Result<bool, ProxyError> {
        flag(self.call("join", vec![node.0.to_string()])?)
    }

    /// 不是成员时返回 false
    pub fn leave(&self, node: NetId) -> Result<bool, ProxyError> {
        flag(self.call("leave", vec![node.0.to_string()])?)
    }

    pub fn contains(&self, node: NetId) -> Result<bool, ProxyError> {
        flag(self.call("contains", vec![node.0.to_string()])?)
    }

    pub fn members(&self) -> Result<Vec<NetId>, ProxyError> {
        let text = self
            .call("members", Vec::new())?
            .ok_or_else(|| ProxyError::BadReply("members returned nothing".to_string()))?;
        let ids: Vec<u32> = serde_json::from_str(&text).map_err(|e| ProxyError::BadReply(e.to_string()))?;
        Ok(ids.into_iter().map(NetId).collect())
    }

    pub fn size(&self) -> Result<usize, ProxyError> {
        let text = self.call("size", Vec::new())?.unwrap_or_default();
        text.parse()
            .map_err(|_| ProxyError::BadReply(format!("expected size, got `{text}`")))
    }
}

/// 本地实体与远程代理的统一入口，按归属选择
#[derive(Debug, Clone)]
pub enum NodeHandle {
    Local(NetId),
    Remote(NodeProxy),
}

impl NodeHandle {
    pub fn net_id(&self) -> NetId {
        match self {
            NodeHandle::Local(id) => *id,
            NodeHandle::Remote(p) => p.net_id(),
        }
    }

    pub fn ownership(&self) -> Ownership {
        match self {
            NodeHandle::Local(_) => Ownership::Local,
            NodeHandle::Remote(p) => Ownership::Remote(p.addr().worker_id),
        }
    }

    /// 本地节点直接查表调用，远程节点走代理
    pub fn invoke(
        &self,
        method: &str,
        args: Vec<String>,
        methods: &MethodRegistry,
        net: &mut Network,
        sched: &Scheduler,
    ) -> Result<Option<String>, ExecError> {
        match self {
            NodeHandle::Local(id) => Ok(methods.invoke(Target::Node(*id), method, &args, net, sched)?),
            NodeHandle::Remote(p) => Ok(p.invoke(method, args)?),
        }
    }
}

/// 组播组的统一入口
#[derive(Debug, Clone)]
pub enum GroupHandle {
    Local(NetId),
    Remote(GroupProxy),
}

impl GroupHandle {
    pub fn net_id(&self) -> NetId {
        match self {
            GroupHandle::Local(id) => *id,
            GroupHandle::Remote(p) => p.net_id(),
        }
    }

    pub fn ownership(&self) -> Ownership {
        match self {
            GroupHandle::Local(_) => Ownership::Local,
            GroupHandle::Remote(p) => Ownership::Remote(p.addr().worker_id),
        }
    }
}
