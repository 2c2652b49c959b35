//! 网络层错误

use thiserror::Error;

use super::id::NetId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetError {
    #[error("unknown node {0}")]
    UnknownNode(NetId),
    #[error("node {0} already exists")]
    DuplicateNode(NetId),
    #[error("{0} is not a router")]
    NotARouter(NetId),
    #[error("{0} is not in the unicast id range")]
    NotUnicast(NetId),
    #[error("{0} is not in the multicast id range")]
    NotMulticast(NetId),
    #[error("unknown group {0}")]
    UnknownGroup(NetId),
    #[error("group {0} already exists")]
    DuplicateGroup(NetId),
    #[error("no link from {from} to {to}")]
    NoLink { from: NetId, to: NetId },
    #[error("unknown routing algorithm `{0}`")]
    UnknownAlgorithm(String),
}
