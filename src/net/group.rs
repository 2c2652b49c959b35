//! 组播组
//!
//! 组 id 取自组播保留区间，分配后不可变；成员列表有序且不重复。
//! join/leave 立即生效（没有仿真时延），并且是幂等的。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::NetError;
use super::id::NetId;

/// 组的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GroupKind {
    /// 纯成员关系
    Abstract,
    /// 成员变化时同步通知所属路由器
    RouterAware { router: NetId },
}

#[derive(Debug, Clone)]
pub struct Group {
    id: NetId,
    kind: GroupKind,
    members: Vec<NetId>,
}

impl Group {
    pub fn new(id: NetId, kind: GroupKind) -> Result<Self, NetError> {
        if !id.is_multicast() {
            return Err(NetError::NotMulticast(id));
        }
        Ok(Self {
            id,
            kind,
            members: Vec::new(),
        })
    }

    pub fn id(&self) -> NetId {
        self.id
    }

    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    pub fn members(&self) -> &[NetId] {
        &self.members
    }

    pub fn contains(&self, member: NetId) -> bool {
        self.members.contains(&member)
    }

    /// 加入；已是成员时不做任何事并返回 false。
    pub fn join(&mut self, member: NetId) -> bool {
        if self.contains(member) {
            return false;
        }
        self.members.push(member);
        true
    }

    /// 离开；不是成员时返回 false。
    pub fn leave(&mut self, member: NetId) -> bool {
        match self.members.iter().position(|m| *m == member) {
            Some(pos) => {
                self.members.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// 组表
#[derive(Debug, Default, Clone)]
pub struct GroupTable {
    groups: BTreeMap<NetId, Group>,
}

impl GroupTable {
    pub fn create(&mut self, id: NetId, kind: GroupKind) -> Result<(), NetError> {
        if self.groups.contains_key(&id) {
            return Err(NetError::DuplicateGroup(id));
        }
        self.groups.insert(id, Group::new(id, kind)?);
        Ok(())
    }

    pub fn get(&self, id: NetId) -> Option<&Group> {
        self.groups.get(&id)
    }

    pub fn members(&self, id: NetId) -> Option<&[NetId]> {
        self.groups.get(&id).map(Group::members)
    }

    pub fn is_member(&self, id: NetId, member: NetId) -> bool {
        self.groups.get(&id).is_some_and(|g| g.contains(member))
    }

    pub fn join(&mut self, id: NetId, member: NetId) -> Result<bool, NetError> {
        self.groups
            .get_mut(&id)
            .map(|g| g.join(member))
            .ok_or(NetError::UnknownGroup(id))
    }

    pub fn leave(&mut self, id: NetId, member: NetId) -> Result<bool, NetError> {
        self.groups
            .get_mut(&id)
            .map(|g| g.leave(member))
            .ok_or(NetError::UnknownGroup(id))
    }

    pub fn remove(&mut self, id: NetId) -> Option<Group> {
        self.groups.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
