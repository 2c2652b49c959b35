//! 远程命令协议
//!
//! manager 与 worker 之间交换的命令：动作码、带类型的载荷、帧编解码、
//! 方法调用表以及把命令交给执行方的分发逻辑。

mod action;
mod command;
mod dispatch;
mod frame;
mod invoke;

pub use action::ActionCode;
pub use command::{
    ActivateAt, AddToPool, BlockedOrFinished, Command, CreatePayload, DecodeError, Empty, Failure,
    InvokeCall, PacketArrival, RemoveFromPool, Reply, ResumeProcess, TerminateProcess,
};
pub use dispatch::{CommandTarget, ExecError, run};
pub use frame::{CmdId, CmdIdGen, Envelope, FrameError, MAX_FRAME, read_frame, write_frame};
pub use invoke::{
    ArgValue, Handler, InvokeCtx, InvokeError, Method, MethodRegistry, Param, ParamKind, Target,
};
