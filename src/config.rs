//! 场景配置
//!
//! JSON 场景文件描述节点、链路、组播组与流量；节点和组可以指定放在哪个
//! worker 上（按加入顺序的下标），不指定则放在 manager 本地。

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::net::NodeKind;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid scenario JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unsupported schema_version {0} (expected {SCHEMA_VERSION})")]
    Schema(u32),
    #[error("name `{0}` is defined twice")]
    DuplicateName(String),
    #[error("unknown name `{0}`")]
    UnknownName(String),
    #[error("`{0}` is not a router")]
    NotARouter(String),
    #[error("`{name}` refers to worker #{index}, but only {available} worker(s) joined")]
    BadWorker {
        name: String,
        index: usize,
        available: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub schema_version: u32,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub links: Vec<LinkSpec>,
    #[serde(default)]
    pub groups: Vec<GroupSpec>,
    #[serde(default)]
    pub traffic: Vec<TrafficSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    #[serde(default)]
    pub kind: Option<NodeKind>,
    /// worker 下标；缺省为 manager 本地
    #[serde(default)]
    pub worker: Option<usize>,
    /// 单播算法名（仅路由器）
    #[serde(default)]
    pub algorithm: Option<String>,
    /// 组播算法名（仅路由器）
    #[serde(default)]
    pub multicast: Option<String>,
}

impl NodeSpec {
    pub fn kind(&self) -> NodeKind {
        self.kind.unwrap_or(NodeKind::Host)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSpec {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub latency_us: Option<u64>,
    #[serde(default)]
    pub gbps: Option<f64>,
    /// 缺省为双向
    #[serde(default)]
    pub bidirectional: Option<bool>,
}

impl LinkSpec {
    pub fn latency_us(&self) -> u64 {
        self.latency_us.unwrap_or(1)
    }

    pub fn bandwidth_bps(&self) -> u64 {
        (self.gbps.unwrap_or(10.0) * 1e9) as u64
    }

    pub fn bidirectional(&self) -> bool {
        self.bidirectional.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSpec {
    pub name: String,
    #[serde(default)]
    pub worker: Option<usize>,
    /// 路由器感知组的所属路由器
    #[serde(default)]
    pub router: Option<String>,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficSpec {
    pub src: String,
    /// 节点名或组名
    pub dst: String,
    #[serde(default)]
    pub start_us: Option<u64>,
    #[serde(default)]
    pub pkts: Option<u64>,
    #[serde(default)]
    pub gap_us: Option<u64>,
    #[serde(default)]
    pub size_bytes: Option<u32>,
    #[serde(default)]
    pub ttl: Option<u8>,
}

impl TrafficSpec {
    pub fn start_us(&self) -> u64 {
        self.start_us.unwrap_or(0)
    }

    pub fn pkts(&self) -> u64 {
        self.pkts.unwrap_or(1)
    }

    pub fn gap_us(&self) -> u64 {
        self.gap_us.unwrap_or(1)
    }

    pub fn size_bytes(&self) -> u32 {
        self.size_bytes.unwrap_or(1000)
    }

    pub fn ttl(&self) -> u8 {
        self.ttl.unwrap_or(64)
    }
}

impl ScenarioSpec {
    pub fn from_path(path: impl AsRef<Path>) -> Result<ScenarioSpec, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<ScenarioSpec, ConfigError> {
        let spec: ScenarioSpec = serde_json::from_str(text)?;
        spec.validate()?;
        Ok(spec)
    }

    fn node(&self, name: &str) -> Result<&NodeSpec, ConfigError> {
        self.nodes
            .iter()
            .find(|n| n.name == name)
            .ok_or_else(|| ConfigError::UnknownName(name.to_string()))
    }

    /// 名字唯一且所有引用都能解析
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ConfigError::Schema(self.schema_version));
        }
        let mut names = HashSet::new();
        let all = self
            .nodes
            .iter()
            .map(|n| &n.name)
            .chain(self.groups.iter().map(|g| &g.name));
        for name in all {
            if !names.insert(name.as_str()) {
                return Err(ConfigError::DuplicateName(name.clone()));
            }
        }

        for link in &self.links {
            self.node(&link.from)?;
            self.node(&link.to)?;
        }
        for group in &self.groups {
            if let Some(router) = &group.router {
                if self.node(router)?.kind() != NodeKind::Router {
                    return Err(ConfigError::NotARouter(router.clone()));
                }
            }
            for member in &group.members {
                self.node(member)?;
            }
        }
        for t in &self.traffic {
            self.node(&t.src)?;
            if !names.contains(t.dst.as_str()) {
                return Err(ConfigError::UnknownName(t.dst.clone()));
            }
        }
        Ok(())
    }
}
