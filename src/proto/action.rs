//! 动作码
//!
//! 线上每个命令用一个字节标识动作；取值固定，两端共享同一张表。

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ActionCode {
    ActivateAt = 1,
    Create = 2,
    CreateObject = 3,
    Invoke = 4,
    StartSimulation = 5,
    StopSimulation = 6,
    AddToPool = 7,
    RemoveFromPool = 8,
    ResumeProcess = 9,
    ProcessBlockedOrFinished = 10,
    TerminateProcess = 11,
    PacketArrival = 12,
    Ok = 13,
    Error = 14,
}

impl ActionCode {
    pub const ALL: [ActionCode; 14] = [
        ActionCode::ActivateAt,
        ActionCode::Create,
        ActionCode::CreateObject,
        ActionCode::Invoke,
        ActionCode::StartSimulation,
        ActionCode::StopSimulation,
        ActionCode::AddToPool,
        ActionCode::RemoveFromPool,
        ActionCode::ResumeProcess,
        ActionCode::ProcessBlockedOrFinished,
        ActionCode::TerminateProcess,
        ActionCode::PacketArrival,
        ActionCode::Ok,
        ActionCode::Error,
    ];

    pub fn from_u8(code: u8) -> Option<ActionCode> {
        Self::ALL.iter().copied().find(|a| *a as u8 == code)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// ok / error 是对先前命令的应答
    pub fn is_reply(self) -> bool {
        matches!(self, ActionCode::Ok | ActionCode::Error)
    }

    pub fn name(self) -> &'static str {
        match self {
            ActionCode::ActivateAt => "activateAt",
            ActionCode::Create => "create",
            ActionCode::CreateObject => "createObject",
            ActionCode::Invoke => "invoke",
            ActionCode::StartSimulation => "startSimulation",
            ActionCode::StopSimulation => "stopSimulation",
            ActionCode::AddToPool => "addToPool",
            ActionCode::RemoveFromPool => "removeFromPool",
            ActionCode::ResumeProcess => "resumeProcess",
            ActionCode::ProcessBlockedOrFinished => "processBlockedOrFinished",
            ActionCode::TerminateProcess => "terminateProcess",
            ActionCode::PacketArrival => "packetArrival",
            ActionCode::Ok => "ok",
            ActionCode::Error => "error",
        }
    }
}

impl fmt::Display for ActionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
