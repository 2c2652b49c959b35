use serde::{Deserialize, Serialize};

use crate::link::ProxyError;
use crate::net::NetId;
use crate::sim::{Pid, WorkerId};

/// 远程实体的地址；create / createObject 成功时以 JSON 返回
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAddr {
    pub worker_id: WorkerId,
    pub worker_desc: String,
    pub net_id: NetId,
    /// 对象类实体（例如流量源）附带的进程
    #[serde(default)]
    pub pid: Option<Pid>,
}

impl RemoteAddr {
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    pub fn from_reply(result: Option<String>) -> Result<RemoteAddr, ProxyError> {
        let text = result.ok_or_else(|| ProxyError::BadReply("create returned no address".to_string()))?;
        serde_json::from_str(&text).map_err(|e| ProxyError::BadReply(format!("{e}: {text}")))
    }
}
