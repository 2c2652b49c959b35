//! 分布式层错误

use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::link::{LinkError, ProxyError};
use crate::net::{NetError, NetId};
use crate::proto::{ExecError, InvokeError};
use crate::sim::{SchedError, WorkerId};

#[derive(Debug, Error)]
pub enum DistError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Proxy(#[from] ProxyError),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error(transparent)]
    Sched(#[from] SchedError),
    #[error(transparent)]
    Net(#[from] NetError),
    #[error(transparent)]
    Invoke(#[from] InvokeError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unknown worker {0}")]
    UnknownWorker(WorkerId),
    #[error("no entity with id {0}")]
    UnknownEntity(NetId),
    #[error("only {ready} of {expected} workers joined the pool")]
    NotReady { ready: usize, expected: usize },
    #[error("handshake failed: {0}")]
    Handshake(String),
}
