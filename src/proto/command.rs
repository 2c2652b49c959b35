//! 命令与载荷
//!
//! 每个动作对应一个带类型的变体；载荷以 JSON 对象文本编码在信封里。
//! 命令一旦构造就不再修改。

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::action::ActionCode;
use super::frame::{CmdId, Envelope};
use super::invoke::Target;
use crate::net::{NetId, Packet};
use crate::sim::{Pid, SimTime, WorkerId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateAt {
    pub time: SimTime,
    pub pid: Pid,
}

/// create / createObject 共用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePayload {
    pub class: String,
    pub net_id: NetId,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeCall {
    pub target: Target,
    pub method: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddToPool {
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveFromPool {
    pub worker_id: WorkerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeProcess {
    pub pid: Pid,
    pub new_time: SimTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedOrFinished {
    pub pid: Pid,
    pub finished: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminateProcess {
    pub pid: Pid,
}

/// 跨分区的数据包；到达时刻为 `sent_at + relative_time`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketArrival {
    pub from_worker: WorkerId,
    pub to: NetId,
    pub sent_at: SimTime,
    pub relative_time: SimTime,
    pub packet: Packet,
    pub packet_class: String,
}

impl PacketArrival {
    pub fn new(from_worker: WorkerId, to: NetId, sent_at: SimTime, relative_time: SimTime, packet: Packet) -> Self {
        let packet_class = packet.kind.class_name().to_string();
        Self {
            from_worker,
            to,
            sent_at,
            relative_time,
            packet,
            packet_class,
        }
    }

    pub fn arrival_time(&self) -> SimTime {
        self.sent_at.after(self.relative_time)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default)]
    pub result: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ActivateAt(ActivateAt),
    Create(CreatePayload),
    CreateObject(CreatePayload),
    Invoke(InvokeCall),
    StartSimulation,
    StopSimulation,
    AddToPool(AddToPool),
    RemoveFromPool(RemoveFromPool),
    ResumeProcess(ResumeProcess),
    ProcessBlockedOrFinished(BlockedOrFinished),
    TerminateProcess(TerminateProcess),
    PacketArrival(PacketArrival),
    Ok(Reply),
    Error(Failure),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown action code {0}")]
    UnknownAction(u8),
    #[error("malformed {action} payload: {source}")]
    Malformed {
        action: ActionCode,
        #[source]
        source: serde_json::Error,
    },
    #[error("packet class `{class}` does not match packet kind `{kind}`")]
    PacketClass { class: String, kind: String },
}

fn parse<T: DeserializeOwned>(action: ActionCode, payload: &str) -> Result<T, DecodeError> {
    // 没有字段的动作允许空载荷
    let text = if payload.trim().is_empty() { "{}" } else { payload };
    serde_json::from_str(text).map_err(|source| DecodeError::Malformed { action, source })
}

impl Command {
    pub fn ok(result: Option<String>) -> Command {
        Command::Ok(Reply { result })
    }

    pub fn error(message: impl Into<String>) -> Command {
        Command::Error(Failure {
            message: message.into(),
        })
    }

    pub fn action(&self) -> ActionCode {
        match self {
            Command::ActivateAt(_) => ActionCode::ActivateAt,
            Command::Create(_) => ActionCode::Create,
            Command::CreateObject(_) => ActionCode::CreateObject,
            Command::Invoke(_) => ActionCode::Invoke,
            Command::StartSimulation => ActionCode::StartSimulation,
            Command::StopSimulation => ActionCode::StopSimulation,
            Command::AddToPool(_) => ActionCode::AddToPool,
            Command::RemoveFromPool(_) => ActionCode::RemoveFromPool,
            Command::ResumeProcess(_) => ActionCode::ResumeProcess,
            Command::ProcessBlockedOrFinished(_) => ActionCode::ProcessBlockedOrFinished,
            Command::TerminateProcess(_) => ActionCode::TerminateProcess,
            Command::PacketArrival(_) => ActionCode::PacketArrival,
            Command::Ok(_) => ActionCode::Ok,
            Command::Error(_) => ActionCode::Error,
        }
    }

    pub fn is_reply(&self) -> bool {
        self.action().is_reply()
    }

    /// 载荷的 JSON 文本
    pub fn payload(&self) -> Result<String, serde_json::Error> {
        match self {
            Command::ActivateAt(p) => serde_json::to_string(p),
            Command::Create(p) | Command::CreateObject(p) => serde_json::to_string(p),
            Command::Invoke(p) => serde_json::to_string(p),
            Command::StartSimulation | Command::StopSimulation => serde_json::to_string(&Empty {}),
            Command::AddToPool(p) => serde_json::to_string(p),
            Command::RemoveFromPool(p) => serde_json::to_string(p),
            Command::ResumeProcess(p) => serde_json::to_string(p),
            Command::ProcessBlockedOrFinished(p) => serde_json::to_string(p),
            Command::TerminateProcess(p) => serde_json::to_string(p),
            Command::PacketArrival(p) => serde_json::to_string(p),
            Command::Ok(p) => serde_json::to_string(p),
            Command::Error(p) => serde_json::to_string(p),
        }
    }

    pub fn to_envelope(&self, worker_id: WorkerId, cmd_id: CmdId) -> Result<Envelope, serde_json::Error> {
        Ok(Envelope {
            worker_id,
            cmd_id,
            action: self.action().as_u8(),
            payload: self.payload()?,
        })
    }

    /// 按动作码查表并解析对应载荷
    pub fn decode(env: &Envelope) -> Result<Command, DecodeError> {
        let action = ActionCode::from_u8(env.action).ok_or(DecodeError::UnknownAction(env.action))?;
        let p = env.payload.as_str();
        let cmd = match action {
            ActionCode::ActivateAt => Command::ActivateAt(parse(action, p)?),
            ActionCode::Create => Command::Create(parse(action, p)?),
            ActionCode::CreateObject => Command::CreateObject(parse(action, p)?),
            ActionCode::Invoke => Command::Invoke(parse(action, p)?),
            ActionCode::StartSimulation => {
                parse::<Empty>(action, p)?;
                Command::StartSimulation
            }
            ActionCode::StopSimulation => {
                parse::<Empty>(action, p)?;
                Command::StopSimulation
            }
            ActionCode::AddToPool => Command::AddToPool(parse(action, p)?),
            ActionCode::RemoveFromPool => Command::RemoveFromPool(parse(action, p)?),
            ActionCode::ResumeProcess => Command::ResumeProcess(parse(action, p)?),
            ActionCode::ProcessBlockedOrFinished => Command::ProcessBlockedOrFinished(parse(action, p)?),
            ActionCode::TerminateProcess => Command::TerminateProcess(parse(action, p)?),
            ActionCode::PacketArrival => {
                let arrival: PacketArrival = parse(action, p)?;
                let kind = arrival.packet.kind.class_name();
                if arrival.packet_class != kind {
                    return Err(DecodeError::PacketClass {
                        class: arrival.packet_class,
                        kind: kind.to_string(),
                    });
                }
                Command::PacketArrival(arrival)
            }
            ActionCode::Ok => Command::Ok(parse(action, p)?),
            ActionCode::Error => Command::Error(parse(action, p)?),
        };
        Ok(cmd)
    }
}
