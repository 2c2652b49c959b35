//! 链路错误

use thiserror::Error;

/// 链路故障；断开时会发给每一个等待中的请求
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("link disconnected")]
    Disconnected,
    #[error("link I/O error: {0}")]
    Io(String),
    #[error("cannot encode command: {0}")]
    Encode(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    /// 分发线程上发起阻塞请求会等不到自己的应答
    #[error("blocking request issued from the link's dispatch thread")]
    Reentrant,
}

/// 远程调用失败：链路故障，或对端返回的错误信息
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProxyError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("remote error: {0}")]
    Remote(String),
    #[error("unexpected reply: {0}")]
    BadReply(String),
}
