//! 命令链路
//!
//! 对 TCP 连接的封装：收发命令帧、按 cmdId 关联请求与应答。

mod error;
mod worker_link;

pub use error::{LinkError, ProxyError};
pub use worker_link::WorkerLink;
