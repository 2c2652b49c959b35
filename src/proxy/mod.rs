//! manager 一侧的远程实体代理

mod addr;
mod node;
mod process;

pub use addr::RemoteAddr;
pub use node::{GroupHandle, GroupProxy, NodeHandle, NodeProxy};
pub use process::{Outcomes, ProcessProxy};
