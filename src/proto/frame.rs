//! 命令帧编解码
//!
//! ```text
//! [u32 len][i32 worker_id][i32 cmd_id][u8 action][payload: UTF-8 JSON]
//! ```
//!
//! 所有整数均为大端序；`len` 不含自身，等于 `9 + payload.len()`。

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicI32, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sim::WorkerId;

/// 单帧上限
pub const MAX_FRAME: usize = 16 * 1024 * 1024;

const HEADER_LEN: usize = 4 + 4 + 1;

/// 命令编号；每个发送端单调递增
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CmdId(pub i32);

impl fmt::Display for CmdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// cmdId 生成器，由链路的一端持有
#[derive(Debug)]
pub struct CmdIdGen {
    next: AtomicI32,
}

impl Default for CmdIdGen {
    fn default() -> Self {
        Self {
            next: AtomicI32::new(1),
        }
    }
}

impl CmdIdGen {
    pub fn next(&self) -> CmdId {
        CmdId(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

/// 一帧解出的原始信封；payload 尚未按动作解析
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub worker_id: WorkerId,
    pub cmd_id: CmdId,
    pub action: u8,
    pub payload: String,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("frame too large: {0} bytes")]
    TooLarge(usize),
    #[error("frame too short: {0} bytes")]
    TooShort(usize),
    /// 头部完整但 payload 不是合法 UTF-8；仍可按 cmd_id 回复错误
    #[error("payload of command {cmd_id} is not valid UTF-8")]
    BadUtf8 { worker_id: WorkerId, cmd_id: CmdId },
}

impl Envelope {
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let body = HEADER_LEN + self.payload.len();
        if body > MAX_FRAME {
            return Err(FrameError::TooLarge(body));
        }
        let mut buf = Vec::with_capacity(4 + body);
        buf.extend_from_slice(&(body as u32).to_be_bytes());
        buf.extend_from_slice(&self.worker_id.0.to_be_bytes());
        buf.extend_from_slice(&self.cmd_id.0.to_be_bytes());
        buf.push(self.action);
        buf.extend_from_slice(self.payload.as_bytes());
        Ok(buf)
    }
}

/// 写出一帧并 flush
pub fn write_frame<W: Write>(w: &mut W, env: &Envelope) -> Result<(), FrameError> {
    let buf = env.encode()?;
    w.write_all(&buf)?;
    w.flush()?;
    Ok(())
}

/// 读取一帧；对端在帧边界关闭时返回 `Ok(None)`。
pub fn read_frame<R: Read>(r: &mut R) -> Result<Option<Envelope>, FrameError> {
    let mut len_bytes = [0u8; 4];
    match r.read_exact(&mut len_bytes) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME {
        return Err(FrameError::TooLarge(len));
    }
    if len < HEADER_LEN {
        return Err(FrameError::TooShort(len));
    }

    let mut body = vec![0u8; len];
    r.read_exact(&mut body)?;
    let worker_id = WorkerId(i32::from_be_bytes([body[0], body[1], body[2], body[3]]));
    let cmd_id = CmdId(i32::from_be_bytes([body[4], body[5], body[6], body[7]]));
    let action = body[8];
    body.drain(..HEADER_LEN);
    let payload =
        String::from_utf8(body).map_err(|_| FrameError::BadUtf8 { worker_id, cmd_id })?;
    Ok(Some(Envelope {
        worker_id,
        cmd_id,
        action,
        payload,
    }))
}
